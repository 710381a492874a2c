//! Selection of the lemmas that still need to be queried

use crate::{table::PriorOutput, Lemma};
use std::collections::HashSet;

/// Lemmas to be queried by the current run
///
/// This is the set of input lemmas minus the lemmas that already have
/// complete statistics in the previous output. Each lemma appears once, in
/// order of first appearance in the input, so that successive runs with the
/// same inputs process (and log) lemmas in the same order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WorkSet(Vec<Lemma>);
//
impl WorkSet {
    /// Work out which input lemmas are not done yet
    ///
    /// Previous records with missing statistics don't count as done, so the
    /// corresponding lemmas are queried again.
    pub fn plan(input: &[Lemma], prior: &PriorOutput) -> Self {
        let done = prior.completed_lemmas();
        let mut seen = HashSet::with_capacity(input.len());
        let pending = input
            .iter()
            .filter(|lemma| !done.contains(&***lemma) && seen.insert(&***lemma))
            .cloned()
            .collect::<Vec<_>>();
        log::info!(
            "{} of {} input lemma(s) still need to be queried",
            pending.len(),
            input.len()
        );
        Self(pending)
    }

    /// Number of lemmas to be queried
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Truth that there is nothing left to do
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lemmas to be queried, in processing order
    pub fn lemmas(&self) -> &[Lemma] {
        &self.0[..]
    }
}
