//! Coverage model: which tests exercise a mutant.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mutant::{Mutant, MutantId};

/// Opaque identifier of one test case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    /// Create a test id from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Test name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A set of tests: either a finite (possibly empty) set or every test of the suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSet {
    /// Finite set of tests. Empty means "no coverage".
    Tests(BTreeSet<TestId>),
    /// Every test of the suite, never materialized.
    Every,
}

impl Default for TestSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl TestSet {
    /// Set with no tests.
    pub fn empty() -> Self {
        Self::Tests(BTreeSet::new())
    }

    /// Sentinel covering every test.
    pub fn every() -> Self {
        Self::Every
    }

    /// True if `test` belongs to the set.
    pub fn contains(&self, test: &TestId) -> bool {
        match self {
            Self::Tests(tests) => tests.contains(test),
            Self::Every => true,
        }
    }

    /// Distinct test count, `None` for [`TestSet::Every`].
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::Tests(tests) => Some(tests.len()),
            Self::Every => None,
        }
    }

    /// True for a finite set without members.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Tests(tests) if tests.is_empty())
    }

    /// True for the every-test sentinel.
    pub fn is_every(&self) -> bool {
        matches!(self, Self::Every)
    }

    /// True if the two sets share at least one test.
    ///
    /// `Every` intersects any non-empty set.
    pub fn intersects(&self, other: &TestSet) -> bool {
        match (self, other) {
            (Self::Tests(a), Self::Tests(b)) => {
                let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
                small.iter().any(|t| large.contains(t))
            }
            (Self::Every, other) | (other, Self::Every) => !other.is_empty(),
        }
    }

    /// True if every member of `self` is contained in `other`.
    pub fn is_covered_by(&self, other: &TestSet) -> bool {
        match (self, other) {
            (_, Self::Every) => true,
            (Self::Every, Self::Tests(_)) => false,
            (Self::Tests(a), Self::Tests(b)) => a.is_subset(b),
        }
    }

    /// First test shared with `other`, in test order.
    pub fn first_common(&self, other: &TestSet) -> Option<TestId> {
        match (self, other) {
            (Self::Tests(a), Self::Tests(b)) => a.iter().find(|t| b.contains(t)).cloned(),
            (Self::Tests(a), Self::Every) | (Self::Every, Self::Tests(a)) => a.first().cloned(),
            (Self::Every, Self::Every) => None,
        }
    }

    /// Add all tests of `other` to `self`.
    pub fn merge(&mut self, other: &TestSet) {
        match other {
            Self::Every => *self = Self::Every,
            Self::Tests(b) => {
                if let Self::Tests(a) = self {
                    a.extend(b.iter().cloned());
                }
            }
        }
    }

    /// Insert one test.
    pub fn insert(&mut self, test: TestId) {
        if let Self::Tests(tests) = self {
            tests.insert(test);
        }
    }

    /// Iterate the finite members; empty for `Every`.
    pub fn iter(&self) -> impl Iterator<Item = &TestId> {
        let tests = match self {
            Self::Tests(tests) => Some(tests.iter()),
            Self::Every => None,
        };
        tests.into_iter().flatten()
    }
}

impl FromIterator<TestId> for TestSet {
    fn from_iter<I: IntoIterator<Item = TestId>>(iter: I) -> Self {
        Self::Tests(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for TestSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self::Tests(iter.into_iter().map(TestId::new).collect())
    }
}

/// Result of the coverage-capture step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Whether the suite passed without any mutation active.
    pub control_run_succeeded: bool,
    /// Diagnostic for a failed control run.
    #[serde(default)]
    pub control_run_message: Option<String>,
    /// Covering tests per mutant. Missing entries mean no coverage.
    #[serde(default)]
    pub covering_tests: BTreeMap<MutantId, TestSet>,
}

impl CoverageReport {
    /// Report of a successful control run.
    pub fn passed(covering_tests: BTreeMap<MutantId, TestSet>) -> Self {
        Self {
            control_run_succeeded: true,
            control_run_message: None,
            covering_tests,
        }
    }

    /// Report of a failed control run.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            control_run_succeeded: false,
            control_run_message: Some(message.into()),
            covering_tests: BTreeMap::new(),
        }
    }

    /// Covering tests recorded for `id`, empty if none.
    pub fn tests_for(&self, id: MutantId) -> TestSet {
        self.covering_tests.get(&id).cloned().unwrap_or_default()
    }
}

/// Coverage capture failures.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// The capture process could not run.
    #[error("coverage capture failed: {0}")]
    Capture(String),
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coverage capture collaborator.
pub trait CoverageProvider {
    /// Run the baseline suite and report per-mutant coverage.
    fn capture(&self, mutants: &[Mutant]) -> Result<CoverageReport, CoverageError>;
}

/// Provider returning a precomputed report.
#[derive(Debug, Clone, Default)]
pub struct StaticCoverage {
    report: CoverageReport,
}

impl StaticCoverage {
    /// Wrap an already captured report.
    pub fn new(report: CoverageReport) -> Self {
        Self { report }
    }
}

impl CoverageProvider for StaticCoverage {
    fn capture(&self, _mutants: &[Mutant]) -> Result<CoverageReport, CoverageError> {
        Ok(self.report.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> TestSet {
        names.iter().copied().collect()
    }

    #[test]
    fn every_answers_membership_without_members() {
        let every = TestSet::every();
        assert!(every.contains(&TestId::new("anything")));
        assert_eq!(every.count(), None);
        assert!(!every.is_empty());
        assert_eq!(every.iter().count(), 0);
    }

    #[test]
    fn empty_set_is_empty_and_intersects_nothing() {
        let empty = TestSet::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.count(), Some(0));
        assert!(!empty.intersects(&TestSet::every()));
        assert!(!TestSet::every().intersects(&empty));
        assert!(empty.is_covered_by(&set(&["a"])));
    }

    #[test]
    fn intersection_and_cover_checks() {
        let ab = set(&["a", "b"]);
        let bc = set(&["b", "c"]);
        let cd = set(&["c", "d"]);
        assert!(ab.intersects(&bc));
        assert!(!ab.intersects(&cd));
        assert_eq!(ab.first_common(&bc), Some(TestId::new("b")));
        assert!(set(&["a"]).is_covered_by(&ab));
        assert!(!bc.is_covered_by(&ab));
        assert!(TestSet::every().is_covered_by(&TestSet::every()));
        assert!(!TestSet::every().is_covered_by(&ab));
    }

    #[test]
    fn merge_grows_finite_sets_and_absorbs_into_every() {
        let mut acc = set(&["a"]);
        acc.merge(&set(&["b", "a"]));
        assert_eq!(acc.count(), Some(2));
        acc.merge(&TestSet::every());
        assert!(acc.is_every());
        acc.merge(&set(&["z"]));
        assert!(acc.is_every());
    }

    #[test]
    fn serde_shape_is_tagged() {
        let json = serde_json::to_string(&set(&["t1"])).expect("test set should serialize");
        assert_eq!(json, r#"{"tests":["t1"]}"#);
        let every: TestSet =
            serde_json::from_str(r#""every""#).expect("every sentinel should deserialize");
        assert!(every.is_every());
    }

    #[test]
    fn report_defaults_missing_mutants_to_empty() {
        let report = CoverageReport::passed(BTreeMap::from([(MutantId(1), set(&["a"]))]));
        assert_eq!(report.tests_for(MutantId(1)).count(), Some(1));
        assert!(report.tests_for(MutantId(2)).is_empty());
        assert!(!CoverageReport::failed("boom").control_run_succeeded);
    }
}
