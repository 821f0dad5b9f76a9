use anyhow::{anyhow, Result};
use rustfst::fst_impls::VectorFst;
use rustfst::semirings::Semiring;
use rustfst::utils::decode_linear_fst;
use rustfst::{Label, SymbolTable};
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::model::Model;
use crate::semiring::LogProb;

/// Forward probabilities: column `i` maps each state to the log
/// probability of all state paths that end in it after emitting the
/// first `i + 1` observations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardLattice {
    columns: Vec<HashMap<Label, LogProb>>,
}

impl ForwardLattice {
    /// Number of observations covered
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, step: usize) -> Option<&HashMap<Label, LogProb>> {
        self.columns.get(step)
    }

    pub fn columns(&self) -> impl Iterator<Item = &HashMap<Label, LogProb>> {
        self.columns.iter()
    }

    /// α at `step` for `state`; log-zero outside the lattice.
    pub fn alpha(&self, step: usize, state: Label) -> LogProb {
        self.columns
            .get(step)
            .and_then(|column| column.get(&state))
            .copied()
            .unwrap_or_default()
    }

    /// log2 P(observations | model).  The empty sequence has probability one.
    pub fn total(&self) -> LogProb {
        match self.columns.last() {
            Some(column) => {
                // fixed order so repeated calls agree bit for bit
                let mut alphas: Vec<_> = column.iter().collect();
                alphas.sort_by_key(|(state, _)| **state);
                alphas.into_iter().map(|(_, alpha)| alpha).sum()
            }
            None => LogProb::one(),
        }
    }
}

/// Runs the forward algorithm against a borrowed model.
#[derive(Debug, Clone, Copy)]
pub struct ForwardEngine<'a> {
    model: &'a Model,
}

impl<'a> ForwardEngine<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    /// Forward lattice for a sequence of emitted tokens.  Tokens the
    /// model never emits have probability zero in every state.
    pub fn run<S: AsRef<str>>(&self, observations: &[S]) -> ForwardLattice {
        let labels: Vec<Option<Label>> = observations
            .iter()
            .map(|token| self.model.token_label(token.as_ref()))
            .collect();
        self.run_labels(&labels)
    }

    /// Forward lattice for a linear acceptor whose labels come from `syms`.
    /// Epsilon arcs are skipped, so the lattice has one column per
    /// non-epsilon label.
    pub fn run_fst<W: Semiring>(
        &self,
        fst: &VectorFst<W>,
        syms: &SymbolTable,
    ) -> Result<ForwardLattice> {
        let path = decode_linear_fst(fst)?;
        let labels = path
            .ilabels
            .iter()
            .map(|&label| {
                syms.get_symbol(label)
                    .map(|token| self.model.token_label(token))
                    .ok_or_else(|| anyhow!("label {} is not in the symbol table", label))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.run_labels(&labels))
    }

    /// Forward lattice for observations already resolved against the
    /// model's token symbols; `None` stands for an unknown token.
    pub fn run_labels(&self, observations: &[Option<Label>]) -> ForwardLattice {
        let states = self.model.states();
        let mut columns = Vec::with_capacity(observations.len());
        // α of the previous step, aligned with `states`
        let mut prev: Vec<LogProb> = Vec::new();
        let mut dead = false;

        for (i, &token) in observations.iter().enumerate() {
            let alphas: Vec<LogProb> = states
                .iter()
                .map(|&state| {
                    let reach = if i == 0 {
                        self.model.transition(self.model.start(), state)
                    } else {
                        self.reach(&prev, state)
                    };
                    reach.log_product(self.emission(state, token))
                })
                .collect();

            trace!(step = i, "computed forward column");
            if !dead && alphas.iter().all(LogProb::is_zero) {
                debug!(step = i, "no state path has non-zero probability");
                dead = true;
            }

            columns.push(states.iter().copied().zip(alphas.iter().copied()).collect());
            prev = alphas;
        }

        ForwardLattice { columns }
    }

    /// Probability mass flowing into `state` from every previous state.
    fn reach(&self, prev: &[LogProb], state: Label) -> LogProb {
        self.model
            .states()
            .iter()
            .zip(prev)
            .map(|(&from, alpha)| alpha.log_product(self.model.transition(from, state)))
            .sum()
    }

    fn emission(&self, state: Label, token: Option<Label>) -> LogProb {
        match token {
            Some(token) => self.model.emission(state, token),
            None => LogProb::zero(),
        }
    }
}
