//! Forward probabilities for Hidden Markov Models, computed entirely in
//! base-2 log space so that long observation sequences do not
//! underflow.
//!
//! ```no_run
//! use rustfst_hmm::{ForwardEngine, Model};
//!
//! let model = Model::read("trans_prob.txt", "emis_prob.txt").unwrap();
//! let lattice = ForwardEngine::new(&model).run(&["a", "b"]);
//! println!("log2 P = {}", lattice.total());
//! ```
use anyhow::{bail, Result};
use rustfst::fst_impls::VectorFst;
use rustfst::semirings::TropicalWeight;
use rustfst::utils::acceptor;
use rustfst::Semiring;
use rustfst::{Label, SymbolTable, EPS_LABEL};
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;

/// rustfst does not define this but we will
pub type StdVectorFst = VectorFst<TropicalWeight>;

/// Format errors raised while loading a model
pub mod error;
/// The forward algorithm
pub mod forward;
/// HMM parameters and their text loaders
pub mod model;
/// Log-space probability arithmetic
pub mod semiring;

pub use error::FormatError;
pub use forward::{ForwardEngine, ForwardLattice};
pub use model::Model;
pub use semiring::{LogProb, LOG_BASE};

/// Read observation sequences, one per line, as whitespace-separated
/// tokens.  Each sequence becomes a linear acceptor over the returned
/// symbol table; a blank line is the empty sequence.  The table's
/// epsilon symbol cannot be used as a token.
pub fn read_observations<P: AsRef<Path>>(input: P) -> Result<(Vec<StdVectorFst>, SymbolTable)> {
    let input = input.as_ref();
    let fh = File::open(input)?;
    let mut syms = SymbolTable::new();
    let mut data = Vec::new();
    for (i, line) in BufReader::new(fh).lines().enumerate() {
        let labels: Vec<Label> = line?
            .split_whitespace()
            .map(|s| syms.add_symbol(s))
            .collect();
        if labels.contains(&EPS_LABEL) {
            bail!(
                "line {} of {} uses the reserved epsilon symbol {:?}",
                i + 1,
                input.display(),
                syms.get_symbol(EPS_LABEL).unwrap_or_default()
            );
        }
        data.push(acceptor(&labels, TropicalWeight::one()));
    }
    Ok((data, syms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfst::utils::decode_linear_fst;

    #[test]
    fn it_reads_observations() {
        let (data, syms) = read_observations("testdata/observations.txt").unwrap();
        assert_eq!(data.len(), 4);
        for token in ["a", "b", "z"] {
            assert!(syms.contains_symbol(token));
        }
        let path = decode_linear_fst(&data[1]).unwrap();
        let tokens: Vec<&str> = path
            .olabels
            .into_iter()
            .map(|label| syms.get_symbol(label))
            .flatten()
            .collect();
        assert_eq!("b b a a", tokens.join(" "));
        assert!(decode_linear_fst(&data[2]).unwrap().olabels.is_empty());
    }

    #[test]
    fn it_rejects_the_epsilon_symbol() {
        let err = read_observations("testdata/observations_eps.txt").err().unwrap();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn it_fails_on_a_missing_file() {
        assert!(read_observations("testdata/no_such_file").is_err());
    }
}
