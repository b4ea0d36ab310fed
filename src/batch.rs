//! Grouping of mutants into test-execution batches.
//!
//! Two mutants can share one test run only when no single test result could indict both of
//! them, i.e. when their covering tests are disjoint. Mutants that must run against the whole
//! suite always get a batch of their own.

use std::cmp::Reverse;
use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::MutationConfig;
use crate::coverage::TestSet;
use crate::mutant::{Mutant, MutantId};

/// Sequential batch number, assigned in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub usize);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutants scheduled for one test-suite pass. The batch owns its mutants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    id: BatchId,
    mutants: Vec<Mutant>,
}

impl Batch {
    /// Assemble a batch from already grouped mutants.
    pub fn new(id: BatchId, mutants: Vec<Mutant>) -> Self {
        Self { id, mutants }
    }

    /// Batch number.
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Mutants in the batch.
    pub fn mutants(&self) -> &[Mutant] {
        &self.mutants
    }

    /// Ids of the mutants in the batch.
    pub fn mutant_ids(&self) -> Vec<MutantId> {
        self.mutants.iter().map(|m| m.id).collect()
    }

    /// Number of mutants.
    pub fn len(&self) -> usize {
        self.mutants.len()
    }

    /// True if the batch holds no mutant.
    pub fn is_empty(&self) -> bool {
        self.mutants.is_empty()
    }

    /// Mutable access to one mutant of the batch.
    pub fn get_mut(&mut self, id: MutantId) -> Option<&mut Mutant> {
        self.mutants.iter_mut().find(|m| m.id == id)
    }

    /// Mutable access to every mutant of the batch.
    pub fn mutants_mut(&mut self) -> impl Iterator<Item = &mut Mutant> {
        self.mutants.iter_mut()
    }

    /// Union of the tests needed to assess every mutant of the batch.
    pub fn tests(&self) -> TestSet {
        let mut tests = TestSet::empty();
        for mutant in &self.mutants {
            tests.merge(&mutant.assessing_tests());
        }
        tests
    }

    /// Give the mutants back.
    pub fn into_mutants(self) -> Vec<Mutant> {
        self.mutants
    }
}

/// Builds the batch sequence for a mutant population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBuilder {
    batching: bool,
}

impl BatchBuilder {
    /// Builder with batching on or off.
    pub fn new(batching: bool) -> Self {
        Self { batching }
    }

    /// Builder following `config.batching`.
    pub fn from_config(config: &MutationConfig) -> Self {
        Self::new(config.batching)
    }

    /// Plan the batches for `mutants`. Batches are produced lazily.
    pub fn build(self, mutants: Vec<Mutant>) -> Batches {
        if !self.batching {
            return Batches {
                exempt: mutants.into(),
                pool: VecDeque::new(),
                total_tests: 0,
                next_id: 0,
            };
        }

        let (exempt, mut pool): (Vec<Mutant>, Vec<Mutant>) = mutants
            .into_iter()
            .partition(|m| m.must_run_against_all_tests || m.covering_tests.is_every());

        let mut all_tests = TestSet::empty();
        for mutant in &pool {
            all_tests.merge(&mutant.covering_tests);
        }
        let total_tests = all_tests.count().unwrap_or(0);

        pool.sort_by_key(|m| (Reverse(m.covering_tests.count().unwrap_or(0)), m.id));

        Batches {
            exempt: exempt.into(),
            pool: pool.into(),
            total_tests,
            next_id: 0,
        }
    }
}

/// Lazy, finite, non-restartable sequence of batches.
#[derive(Debug)]
pub struct Batches {
    exempt: VecDeque<Mutant>,
    pool: VecDeque<Mutant>,
    total_tests: usize,
    next_id: usize,
}

impl Batches {
    /// Distinct tests covering the groupable mutants (`T`).
    pub fn total_tests(&self) -> usize {
        self.total_tests
    }

    /// Mutants not yet placed in an emitted batch.
    pub fn remaining(&self) -> usize {
        self.exempt.len() + self.pool.len()
    }

    fn next_id(&mut self) -> BatchId {
        let id = BatchId(self.next_id);
        self.next_id += 1;
        id
    }

    fn next_group(&mut self) -> Option<Vec<Mutant>> {
        let seed = self.pool.pop_front()?;
        let mut used = seed.covering_tests.clone();
        let mut used_count = used.count().unwrap_or(0);
        let mut group = vec![seed];

        let mut rest = VecDeque::with_capacity(self.pool.len());
        for candidate in self.pool.drain(..) {
            let count = candidate.covering_tests.count().unwrap_or(0);
            if count + used_count <= self.total_tests && !candidate.covering_tests.intersects(&used)
            {
                used.merge(&candidate.covering_tests);
                used_count += count;
                group.push(candidate);
            } else {
                rest.push_back(candidate);
            }
        }
        self.pool = rest;
        Some(group)
    }
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let group = match self.exempt.pop_front() {
            Some(mutant) => vec![mutant],
            None => self.next_group()?,
        };
        let id = self.next_id();
        Some(Batch::new(id, group))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining.min(1), Some(remaining))
    }
}
