use anyhow::{Context, Result};
use rustfst::{Label, SymbolTable};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{FormatError, Table};
use crate::semiring::LogProb;

/// Log probabilities keyed by a pair of labels.  Pairs that were never
/// inserted have probability zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProbTable {
    entries: HashMap<(Label, Label), LogProb>,
}

/// P(to | from), keyed by state labels
pub type TransitionTable = ProbTable;
/// P(token | state), keyed by state label then token label
pub type EmissionTable = ProbTable;

impl ProbTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probability of a pair, log-zero if absent.
    pub fn get(&self, from: Label, to: Label) -> LogProb {
        self.entries.get(&(from, to)).copied().unwrap_or_default()
    }

    /// Returns false if the pair was already present (and leaves it untouched).
    fn insert(&mut self, from: Label, to: Label, prob: LogProb) -> bool {
        if self.entries.contains_key(&(from, to)) {
            return false;
        }
        self.entries.insert((from, to), prob);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in label order.
    pub fn iter(&self) -> impl Iterator<Item = ((Label, Label), LogProb)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(k, _)| *k);
        entries.into_iter()
    }

    /// Rescale so that the entries sharing a first label sum to one.
    /// Rows whose mass is zero are left alone.
    fn normalized(&self) -> Self {
        let mut totals: HashMap<Label, LogProb> = HashMap::new();
        for ((from, _), prob) in self.iter() {
            let total = totals.entry(from).or_default();
            *total = total.log_sum(prob);
        }
        let entries = self
            .iter()
            .map(|((from, to), prob)| {
                let scaled = match (prob.value(), totals[&from].value()) {
                    (Some(p), Some(total)) => LogProb::from_log2(p - total),
                    _ => prob,
                };
                ((from, to), scaled)
            })
            .collect();
        Self { entries }
    }
}

/// One non-blank line of a probability source, split into its fields.
struct Line<'a> {
    number: usize,
    from: &'a str,
    to: &'a str,
    prob: &'a str,
}

/// Split `line` into exactly three fields, or None if it is blank.
fn split_line(table: Table, number: usize, line: &str) -> Result<Option<Line<'_>>, FormatError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields[..] {
        [] => Ok(None),
        [from, to, prob] => Ok(Some(Line {
            number,
            from,
            to,
            prob,
        })),
        _ => Err(FormatError::FieldCount {
            table,
            line: number,
            found: fields.len(),
        }),
    }
}

fn parse_probability(table: Table, line: &Line) -> Result<LogProb, FormatError> {
    match line.prob.parse::<f64>() {
        Ok(p) if (0.0..=1.0).contains(&p) => Ok(LogProb::from_probability(p)),
        _ => Err(FormatError::InvalidProbability {
            table,
            line: line.number,
            value: line.prob.to_string(),
        }),
    }
}

/// Transition table, ordered state set (without the start token) and
/// start token label, as read by [`parse_transitions`].
#[derive(Debug)]
pub struct Transitions {
    pub table: TransitionTable,
    pub states: Vec<Label>,
    pub start: Label,
}

/// Read `"<from> <to> <prob>"` lines.  The origin of the first non-blank
/// line is the start token; no line may lead back to it.
pub fn parse_transitions<R: BufRead>(reader: R, syms: &mut SymbolTable) -> Result<Transitions> {
    let table_kind = Table::Transition;
    let mut table = TransitionTable::new();
    let mut states = Vec::<Label>::new();
    let mut start: Option<Label> = None;

    for (i, text) in reader.lines().enumerate() {
        let text = text?;
        let line = match split_line(table_kind, i + 1, &text)? {
            Some(line) => line,
            None => continue,
        };
        let start_label = *start.get_or_insert_with(|| syms.add_symbol(line.from));
        let from = syms.add_symbol(line.from);
        let to = syms.add_symbol(line.to);
        if to == start_label {
            return Err(FormatError::TransitionToStart {
                line: line.number,
                start: line.to.to_string(),
            }
            .into());
        }
        let prob = parse_probability(table_kind, &line)?;
        if !table.insert(from, to, prob) {
            return Err(FormatError::Duplicate {
                table: table_kind,
                line: line.number,
                from: line.from.to_string(),
                to: line.to.to_string(),
            }
            .into());
        }
        for label in [from, to] {
            if label != start_label && !states.contains(&label) {
                states.push(label);
            }
        }
    }

    match start {
        Some(start) => Ok(Transitions {
            table,
            states,
            start,
        }),
        None => Err(FormatError::Empty { table: table_kind }.into()),
    }
}

/// Read `"<state> <token> <prob>"` lines.  States are interned in
/// `state_syms` (which usually already holds the transition states),
/// tokens in `token_syms`.
pub fn parse_emissions<R: BufRead>(
    reader: R,
    state_syms: &mut SymbolTable,
    token_syms: &mut SymbolTable,
) -> Result<EmissionTable> {
    let table_kind = Table::Emission;
    let mut table = EmissionTable::new();
    let mut empty = true;

    for (i, text) in reader.lines().enumerate() {
        let text = text?;
        let line = match split_line(table_kind, i + 1, &text)? {
            Some(line) => line,
            None => continue,
        };
        empty = false;
        let prob = parse_probability(table_kind, &line)?;
        let state = state_syms.add_symbol(line.from);
        let token = token_syms.add_symbol(line.to);
        if !table.insert(state, token, prob) {
            return Err(FormatError::Duplicate {
                table: table_kind,
                line: line.number,
                from: line.from.to_string(),
                to: line.to.to_string(),
            }
            .into());
        }
    }

    if empty {
        return Err(FormatError::Empty { table: table_kind }.into());
    }
    Ok(table)
}

/// An immutable Hidden Markov Model.
///
/// States and emitted tokens are interned in two separate symbol
/// tables; all probabilities are stored as [`LogProb`].
#[derive(Debug, Clone)]
pub struct Model {
    /// Symbols for states, including the start token
    state_syms: Arc<SymbolTable>,
    /// Symbols for emitted tokens
    token_syms: Arc<SymbolTable>,
    /// Start token label
    start: Label,
    /// States in order of first appearance, start token excluded
    states: Vec<Label>,
    transitions: TransitionTable,
    emissions: EmissionTable,
}

impl Model {
    /// Build a model from transition and emission sources.
    pub fn from_readers<T: BufRead, E: BufRead>(transitions: T, emissions: E) -> Result<Self> {
        let mut state_syms = SymbolTable::new();
        let mut token_syms = SymbolTable::new();
        let Transitions {
            table: transitions,
            states,
            start,
        } = parse_transitions(transitions, &mut state_syms)?;
        let emissions = parse_emissions(emissions, &mut state_syms, &mut token_syms)?;
        debug!(
            states = states.len(),
            transitions = transitions.len(),
            emissions = emissions.len(),
            "loaded HMM"
        );
        Ok(Self {
            state_syms: Arc::new(state_syms),
            token_syms: Arc::new(token_syms),
            start,
            states,
            transitions,
            emissions,
        })
    }

    /// Build a model from transition and emission files.
    pub fn read<P: AsRef<Path>, Q: AsRef<Path>>(transitions: P, emissions: Q) -> Result<Self> {
        let open = |path: &Path| {
            File::open(path)
                .map(BufReader::new)
                .with_context(|| format!("cannot open {}", path.display()))
        };
        let trans = open(transitions.as_ref())?;
        let emis = open(emissions.as_ref())?;
        Self::from_readers(trans, emis)
    }

    pub fn start(&self) -> Label {
        self.start
    }

    pub fn start_symbol(&self) -> &str {
        self.state_symbol(self.start).unwrap_or_default()
    }

    /// Hidden states, start token excluded.
    pub fn states(&self) -> &[Label] {
        &self.states
    }

    pub fn state_label(&self, state: &str) -> Option<Label> {
        self.state_syms.get_label(state)
    }

    pub fn state_symbol(&self, label: Label) -> Option<&str> {
        self.state_syms.get_symbol(label)
    }

    /// Label of an emitted token, None if the model never emits it.
    pub fn token_label(&self, token: &str) -> Option<Label> {
        self.token_syms.get_label(token)
    }

    pub fn transition(&self, from: Label, to: Label) -> LogProb {
        self.transitions.get(from, to)
    }

    pub fn emission(&self, state: Label, token: Label) -> LogProb {
        self.emissions.get(state, token)
    }

    /// Transition probability by state name; unknown names are log-zero.
    pub fn transition_by_name(&self, from: &str, to: &str) -> LogProb {
        match (self.state_label(from), self.state_label(to)) {
            (Some(from), Some(to)) => self.transition(from, to),
            _ => LogProb::zero(),
        }
    }

    /// Emission probability by name; unknown names are log-zero.
    pub fn emission_by_name(&self, state: &str, token: &str) -> LogProb {
        match (self.state_label(state), self.token_label(token)) {
            (Some(state), Some(token)) => self.emission(state, token),
            _ => LogProb::zero(),
        }
    }

    /// A copy whose outgoing transitions, and emissions, of every state
    /// sum to one.
    pub fn normalized(&self) -> Self {
        debug!("normalizing HMM");
        Self {
            state_syms: Arc::clone(&self.state_syms),
            token_syms: Arc::clone(&self.token_syms),
            start: self.start,
            states: self.states.clone(),
            transitions: self.transitions.normalized(),
            emissions: self.emissions.normalized(),
        }
    }
}
