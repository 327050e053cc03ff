//! Heuristic pre-pass (SPEC_FULL.md §4.5): annotate every forest node with
//! an admissible `min_cost` lower bound, and flatten term-sequence subnodes
//! into synthetic terminal-like ones carrying merged display text.

use crate::forest::{Forest, Node, NodeId, Sub};
use crate::grammar::TextPiece;
use crate::lib::base::HashMap;
use crate::state_table::Reduction;

/// Bottom-up, memoised by node: `min_cost(n) = min over n's subnodes of
/// (subnode's own rule cost + sum of child min_costs)` (SPEC_FULL.md §4.5).
pub fn compute_min_costs(forest: &mut Forest) {
  let order = topological_order(forest);
  for id in order {
    let cost = min_cost_of(forest, id);
    forest.nodes.get_mut(id).min_cost = Some(cost);
  }
}

fn min_cost_of(forest: &Forest, id: NodeId) -> f32 {
  let node = forest.nodes.get(id);
  node
    .subs
    .iter()
    .map(|sub| sub_cost(forest, sub))
    .fold(f32::INFINITY, f32::min)
}

fn sub_cost(forest: &Forest, sub: &Sub) -> f32 {
  match sub {
    Sub::Terminal { props } => props.cost,
    Sub::Unary { child, reduction } => reduction.min_cost() + child_min_cost(forest, *child),
    Sub::Binary { child, next, reduction } => {
      reduction.min_cost() + child_min_cost(forest, *child) + child_min_cost(forest, *next)
    }
  }
}

fn child_min_cost(forest: &Forest, id: NodeId) -> f32 {
  forest.nodes.get(id).min_cost.unwrap_or(0.0)
}

/// Nodes only reference earlier-built nodes (children were interned before
/// their parents during the shift-reduce sweep), so arena insertion order is
/// already a valid bottom-up topological order — no separate DFS needed.
fn topological_order(forest: &Forest) -> Vec<NodeId> {
  forest.nodes.iter().map(|(id, _)| id).collect()
}

/// A subnode rewritten by term-sequence flattening: merged display text plus
/// the input tense recorded from any verb leaf it absorbed, so an ancestor
/// with a matching `accepted_tense` can honour it (SPEC_FULL.md §4.5).
pub struct FlattenedText {
  pub text: Vec<TextPiece>,
  pub tense: Option<String>,
}

/// Walks every node's term-sequence subnodes and merges the text of their
/// matched leaves into a single flattened fragment, memoised by node so a
/// shared subtree is only merged once.
pub fn flatten_term_sequences(forest: &Forest) -> HashMap<NodeId, FlattenedText> {
  let mut cache: HashMap<NodeId, FlattenedText> = HashMap::default();
  for (id, node) in forest.nodes.iter() {
    if node_is_term_sequence(node) {
      let flattened = flatten_node(forest, id, &mut cache);
      cache.insert(id, flattened);
    }
  }
  cache
}

fn node_is_term_sequence(node: &Node) -> bool {
  node.subs.iter().any(|sub| match sub {
    Sub::Unary { reduction, .. } | Sub::Binary { reduction, .. } => reduction_is_term_sequence(reduction),
    Sub::Terminal { .. } => false,
  })
}

fn reduction_is_term_sequence(reduction: &Reduction) -> bool {
  match reduction {
    Reduction::Single(p) => p.is_term_sequence,
    Reduction::Packed(p) => p.props.first().map(|p| p.is_term_sequence).unwrap_or(false),
  }
}

fn flatten_node(forest: &Forest, id: NodeId, cache: &mut HashMap<NodeId, FlattenedText>) -> FlattenedText {
  if let Some(cached) = cache.get(&id) {
    return FlattenedText { text: cached.text.clone(), tense: cached.tense.clone() };
  }
  let node = forest.nodes.get(id);
  let best = node
    .subs
    .iter()
    .map(|sub| flatten_sub(forest, sub, cache))
    .min_by(|a, b| text_len(a).cmp(&text_len(b)))
    .unwrap_or(FlattenedText { text: vec![], tense: None });
  best
}

fn text_len(f: &FlattenedText) -> usize {
  f.text.len()
}

fn flatten_sub(forest: &Forest, sub: &Sub, cache: &mut HashMap<NodeId, FlattenedText>) -> FlattenedText {
  match sub {
    Sub::Terminal { props } => FlattenedText { text: props.text.clone().unwrap_or_default(), tense: props.tense.clone() },
    Sub::Unary { child, reduction } => {
      let inner = flatten_node(forest, *child, cache);
      let mut text = rule_text(reduction).unwrap_or_default();
      text.extend(inner.text);
      FlattenedText { text, tense: inner.tense.or_else(|| rule_tense(reduction)) }
    }
    Sub::Binary { child, next, reduction } => {
      let left = flatten_node(forest, *child, cache);
      let right = flatten_node(forest, *next, cache);
      let mut text = left.text;
      text.extend(rule_text(reduction).unwrap_or_default());
      text.extend(right.text);
      FlattenedText { text, tense: left.tense.or(right.tense).or_else(|| rule_tense(reduction)) }
    }
  }
}

fn rule_text(reduction: &Reduction) -> Option<Vec<TextPiece>> {
  match reduction {
    Reduction::Single(p) => p.text.clone(),
    Reduction::Packed(p) => p.props.first().and_then(|p| p.text.clone()),
  }
}

fn rule_tense(reduction: &Reduction) -> Option<String> {
  match reduction {
    Reduction::Single(p) => p.tense.clone(),
    Reduction::Packed(p) => p.props.first().and_then(|p| p.tense.clone()),
  }
}
