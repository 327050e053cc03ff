//! Semantic algebra (SPEC_FULL.md §4.1): represent, normalise, merge, and
//! compare semantic trees.
//!
//! A semantic tree is a `SemanticArray`, a sorted and deduplicated list of
//! `SemanticNode`s, each either a function `Apply`ed to a child array or a
//! leaf `Arg`. Every array and node that survives construction is routed
//! through a `SemanticInterner`, modelled on the thread-local hash-consing
//! the teacher uses for grammatical-category strings (`nlu::tense::Interned`)
//! but generalised to tree-shaped values and scoped to one grammar instance
//! rather than a thread-local singleton, since a process may load more than
//! one grammar. After interning, `Rc::ptr_eq` is a correct equality check
//! (SPEC_FULL.md invariant ii).

use crate::lib::intern::Interner;
use std::rc::Rc;

/// A semantic function: a named operation with an arity range and the two
/// optional predicates the spec calls out (`unique`, and pairing with a
/// logical negation).
#[derive(Debug)]
pub struct Func {
  pub name: Rc<str>,
  pub cost: f32,
  pub min_arity: u8,
  pub max_arity: u8,
  /// At most one application of this function may appear among the children
  /// of a given parent; a second, differently-argued application conflicts.
  pub unique: bool,
  /// True for a unary function ("not") whose single child may not coexist
  /// with that same child as a sibling (SPEC_FULL.md §4.1).
  pub is_negation: bool,
}

impl PartialEq for Func {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
  }
}
impl Eq for Func {}
impl std::hash::Hash for Func {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.name.hash(state);
  }
}
impl PartialOrd for Func {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for Func {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.name.cmp(&other.name)
  }
}

/// A leaf argument: an entity id resolved by the entity index, or an
/// integer captured from a numeric token or an int-range symbol.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Arg {
  Entity(u32),
  Int(i64),
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum SemanticNode {
  Apply(Rc<Func>, Rc<SemanticArray>),
  Leaf(Arg),
}

impl SemanticNode {
  fn rank(&self) -> u8 {
    match self {
      SemanticNode::Leaf(_) => 0,
      SemanticNode::Apply(..) => 1,
    }
  }
}

// Total order: leaves before applications, then by (name, children) so that
// two structurally equal trees always sort identically, which is what makes
// post-sort deduplication correct (SPEC_FULL.md §4.1 ordering invariant).
impl PartialOrd for SemanticNode {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for SemanticNode {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    match (self, other) {
      (SemanticNode::Leaf(a), SemanticNode::Leaf(b)) => a.cmp(b),
      (SemanticNode::Apply(f1, c1), SemanticNode::Apply(f2, c2)) => {
        f1.name.cmp(&f2.name).then_with(|| c1.0.cmp(&c2.0))
      }
      _ => self.rank().cmp(&other.rank()),
    }
  }
}

impl std::hash::Hash for SemanticNode {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    match self {
      SemanticNode::Leaf(a) => {
        0u8.hash(state);
        a.hash(state);
      }
      SemanticNode::Apply(f, children) => {
        1u8.hash(state);
        f.name.hash(state);
        children.0.hash(state);
      }
    }
  }
}

/// A sorted, deduplicated list of semantic nodes: a full "semantic tree" in
/// the spec's vocabulary, always handled behind an `Rc` once interned.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Default)]
pub struct SemanticArray(pub Vec<SemanticNode>);

impl SemanticArray {
  pub fn empty() -> Self {
    SemanticArray(vec![])
  }

  fn normalised(mut nodes: Vec<SemanticNode>) -> Self {
    nodes.sort();
    nodes.dedup();
    SemanticArray(nodes)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Conflict {
  DuplicateUnique(Rc<str>),
  NegationClash(Rc<str>),
}

pub type MergeResult = Result<Rc<SemanticArray>, Conflict>;

/// Owns the two hash-consing tables for nodes and arrays. One instance is
/// created per grammar (or per parse, if leaf args are query-specific) and
/// threaded through every call that builds semantic trees.
#[derive(Default)]
pub struct SemanticInterner {
  nodes: Interner<SemanticNode>,
  arrays: Interner<SemanticArray>,
}

impl SemanticInterner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn intern_leaf(&mut self, arg: Arg) -> Rc<SemanticNode> {
    self.nodes.intern(SemanticNode::Leaf(arg))
  }

  pub fn intern_array(&mut self, nodes: Vec<SemanticNode>) -> Rc<SemanticArray> {
    self.arrays.intern(SemanticArray::normalised(nodes))
  }

  pub fn singleton(&mut self, node: SemanticNode) -> Rc<SemanticArray> {
    self.intern_array(vec![node])
  }

  /// `reduce(function, children)`: apply `func` to `children`, failing if the
  /// function's arity bounds are violated.
  pub fn reduce(
    &mut self,
    func: Rc<Func>,
    children: Rc<SemanticArray>,
  ) -> Result<SemanticNode, crate::lib::base::ParseError> {
    let len = children.0.len() as u8;
    if len < func.min_arity || len > func.max_arity {
      return Err(crate::lib::base::ParseError::IllFormedSemantic(func.name.to_string()));
    }
    Ok(SemanticNode::Apply(func, children))
  }

  /// `insertSemantic(lhs, rhs)`: attach `rhs` as the children of `lhs`,
  /// producing a reduced node. Unlike `reduce`, `lhs` already names its
  /// function; this is the path used when a rule contributes a non-reduced
  /// LHS semantic that later absorbs its RHS siblings (SPEC_FULL.md §4.6).
  pub fn insert_semantic(
    &mut self,
    lhs: Rc<Func>,
    rhs: Rc<SemanticArray>,
  ) -> Result<SemanticNode, crate::lib::base::ParseError> {
    self.reduce(lhs, rhs)
  }

  pub fn arrays_equal(a: &Rc<SemanticArray>, b: &Rc<SemanticArray>) -> bool {
    Rc::ptr_eq(a, b) || a == b
  }

  pub fn nodes_equal(a: &SemanticNode, b: &SemanticNode) -> bool {
    a == b
  }

  /// `mergeRHS(a, b)`: concatenate and re-sort two semantic arrays, failing
  /// with a `Conflict` if the result is ill-formed per SPEC_FULL.md §4.1.
  pub fn merge_rhs(&mut self, a: &Rc<SemanticArray>, b: &Rc<SemanticArray>) -> MergeResult {
    let mut combined: Vec<SemanticNode> = a.0.iter().cloned().chain(b.0.iter().cloned()).collect();
    combined.sort();
    combined.dedup();

    for node in &combined {
      if let SemanticNode::Apply(f, _) = node {
        if f.unique {
          let count = combined
            .iter()
            .filter(|n| matches!(n, SemanticNode::Apply(g, _) if g.name == f.name))
            .count();
          if count > 1 {
            return Err(Conflict::DuplicateUnique(Rc::clone(&f.name)));
          }
        }
        if f.is_negation {
          if let Some(inner) = node_negation_target(node) {
            if combined.iter().any(|n| n != node && *n == inner) {
              return Err(Conflict::NegationClash(Rc::clone(&f.name)));
            }
          }
        }
      }
    }
    Ok(self.intern_array(combined))
  }
}

fn node_negation_target(node: &SemanticNode) -> Option<SemanticNode> {
  if let SemanticNode::Apply(_, children) = node {
    if children.0.len() == 1 {
      return Some(children.0[0].clone());
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn func(name: &str, unique: bool, is_negation: bool) -> Rc<Func> {
    Rc::new(Func { name: Rc::from(name), cost: 0.0, min_arity: 0, max_arity: 8, unique, is_negation })
  }

  #[test]
  fn interning_makes_equal_trees_the_same_pointer() {
    let mut interner = SemanticInterner::new();
    let a1 = interner.intern_array(vec![SemanticNode::Leaf(Arg::Entity(1))]);
    let a2 = interner.intern_array(vec![SemanticNode::Leaf(Arg::Entity(1))]);
    assert!(Rc::ptr_eq(&a1, &a2));
  }

  #[test]
  fn arrays_are_sorted_and_deduplicated() {
    let mut interner = SemanticInterner::new();
    let nodes =
      vec![SemanticNode::Leaf(Arg::Entity(2)), SemanticNode::Leaf(Arg::Entity(1)), SemanticNode::Leaf(Arg::Entity(1))];
    let arr = interner.intern_array(nodes);
    assert_eq!(arr.0, vec![SemanticNode::Leaf(Arg::Entity(1)), SemanticNode::Leaf(Arg::Entity(2))]);
  }

  #[test]
  fn merge_rhs_is_commutative() {
    let mut interner = SemanticInterner::new();
    let a = interner.intern_array(vec![SemanticNode::Leaf(Arg::Entity(1))]);
    let b = interner.intern_array(vec![SemanticNode::Leaf(Arg::Entity(2))]);
    let ab = interner.merge_rhs(&a, &b).unwrap();
    let ba = interner.merge_rhs(&b, &a).unwrap();
    assert!(Rc::ptr_eq(&ab, &ba));
  }

  #[test]
  fn duplicate_unique_function_is_a_conflict() {
    let mut interner = SemanticInterner::new();
    let author = func("author", true, false);
    let child_a = interner.intern_array(vec![SemanticNode::Leaf(Arg::Entity(1))]);
    let child_b = interner.intern_array(vec![SemanticNode::Leaf(Arg::Entity(2))]);
    let a = interner.singleton(SemanticNode::Apply(Rc::clone(&author), child_a));
    let b = interner.singleton(SemanticNode::Apply(Rc::clone(&author), child_b));
    assert_eq!(interner.merge_rhs(&a, &b), Err(Conflict::DuplicateUnique(Rc::from("author"))));
  }

  #[test]
  fn not_x_alongside_x_is_a_conflict() {
    let mut interner = SemanticInterner::new();
    let not_fn = func("not", false, true);
    let inner = SemanticNode::Leaf(Arg::Entity(7));
    let not_children = interner.intern_array(vec![inner.clone()]);
    let not_node = interner.singleton(SemanticNode::Apply(not_fn, not_children));
    let plain = interner.singleton(inner);
    assert!(interner.merge_rhs(&not_node, &plain).is_err());
  }

  #[test]
  fn reduce_rejects_arity_violations() {
    let mut interner = SemanticInterner::new();
    let strict = Rc::new(Func { name: Rc::from("pair"), cost: 0.0, min_arity: 2, max_arity: 2, unique: false, is_negation: false });
    let one_child = interner.intern_array(vec![SemanticNode::Leaf(Arg::Entity(1))]);
    assert!(interner.reduce(strict, one_child).is_err());
  }
}
