use std::fmt;
use thiserror::Error;

/// Which probability source a line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    Transition,
    Emission,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Table::Transition => write!(f, "transition probabilities"),
            Table::Emission => write!(f, "emission probabilities"),
        }
    }
}

/// Malformed model source.  Line numbers are 1-based and count blank
/// lines.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("line {line} of the {table} source has an invalid format: expected 3 fields, found {found}")]
    FieldCount { table: Table, line: usize, found: usize },

    #[error("on line {line} of the {table} source, {value:?} is not a valid probability")]
    InvalidProbability {
        table: Table,
        line: usize,
        value: String,
    },

    #[error("line {line} of the transition probabilities source has a transition to the start token {start:?}")]
    TransitionToStart { line: usize, start: String },

    #[error("line {line} of the {table} source repeats the pair ({from:?}, {to:?})")]
    Duplicate {
        table: Table,
        line: usize,
        from: String,
        to: String,
    },

    #[error("the {table} source is empty")]
    Empty { table: Table },
}

impl FormatError {
    /// The offending line, if the error is tied to one
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::FieldCount { line, .. }
            | Self::InvalidProbability { line, .. }
            | Self::TransitionToStart { line, .. }
            | Self::Duplicate { line, .. } => Some(*line),
            Self::Empty { .. } => None,
        }
    }
}
