//! Shared aliases and error types used across the crate.

pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type HashSet<T> = rustc_hash::FxHashSet<T>;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for this crate. `Grammar` errors are fatal and abort
/// state-table construction; `Parse` errors are the rare internal-invariant
/// case inside `pfsearch` (see SPEC_FULL.md §10.2) and are not raised for
/// ordinary unrecognised input, which is represented by an empty `ParseResult`.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
  #[error(transparent)]
  Grammar(#[from] GrammarError),
  #[error(transparent)]
  Parse(#[from] ParseError),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum GrammarError {
  #[error("unknown symbol referenced: {0}")]
  UnknownSymbol(String),
  #[error("symbol {0} is defined but never produced or referenced")]
  UnusedSymbol(String),
  #[error("semantic function {0} is defined but never referenced by a rule")]
  UnusedSemantic(String),
  #[error("rule for {lhs} has an empty right-hand side")]
  EmptyRhs { lhs: String },
  #[error("rule for {lhs} has a right-hand side of length {len}, max is 2")]
  RhsTooLong { lhs: String, len: usize },
  #[error("insertion rule for {lhs} has insertedSymIdx {idx} but no text")]
  InsertionWithoutText { lhs: String, idx: usize },
  #[error("term-sequence rule for {lhs} mixes a term-sequence child with a semantic-producing child")]
  IllFormedTermSequence { lhs: String },
  #[error("integer symbol {name} has min {min} greater than max {max}")]
  InvalidIntRange { name: String, min: i64, max: i64 },
  #[error("start symbol {0} is not defined in ruleSets")]
  MissingStartSymbol(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseError {
  #[error("pfsearch reached a node with no subnodes: {0}")]
  NodeWithNoSubnodes(String),
  #[error("conjugation rule referenced a form with no matching entry: {0}")]
  FailedConjugation(String),
  #[error("semantic function {0} violated its arity bounds")]
  IllFormedSemantic(String),
}
