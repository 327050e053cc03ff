//! Best-first enumerator (SPEC_FULL.md §4.6): enumerate up to k complete
//! derivations of a forest in non-decreasing cost order, conjugating
//! display text and accumulating semantic trees as each path expands,
//! discarding paths that hit a semantic conflict or a failed conjugation.
//!
//! Path state is built from `Rc`-shared cons cells rather than flat vectors,
//! mirroring the teacher's `Rc<Derivation>` / `Child` sharing discipline
//! (SPEC_FULL.md §9): forking a path to try a different subnode only clones
//! a handful of `Rc`s, never the whole frontier.

use crate::forest::{Forest, NodeId, Sub};
use crate::grammar::{Conjugation, GramProps, PersonNumber, TextPiece};
use crate::heuristic::FlattenedText;
use crate::lib::base::HashMap;
use crate::semantic::{Func, SemanticArray, SemanticInterner};
use crate::state_table::{Reduction, RuleProps};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

struct ConsCell<T> {
  head: T,
  tail: Link<T>,
}
type Link<T> = Option<Rc<ConsCell<T>>>;

fn push<T>(head: T, tail: &Link<T>) -> Link<T> {
  Some(Rc::new(ConsCell { head, tail: tail.clone() }))
}

fn pop<T: Clone>(link: &Link<T>) -> Option<(T, Link<T>)> {
  link.as_ref().map(|cell| (cell.head.clone(), cell.tail.clone()))
}

#[derive(Clone)]
enum Obligation {
  Node(NodeId),
  Text { piece: Rc<TextPiece>, tense: Option<String> },
  PushPersonNumber(PersonNumber),
  PushGramProps(GramProps),
  PopGramProps,
  FrameTick,
}

/// A pending application of a non-reduced LHS semantic: opened when a rule's
/// semantic is a template (`semantic_is_reduced == false`), and finalised
/// once `remaining` RHS positions flagged as semantic-producing have each
/// fully expanded (SPEC_FULL.md §4.6).
#[derive(Clone)]
struct Frame {
  func: Rc<Func>,
  acc: Rc<SemanticArray>,
  remaining: u32,
}

/// One partial (or complete) derivation on the search heap.
#[derive(Clone)]
struct Path {
  cur_node: Option<NodeId>,
  remaining: Link<Obligation>,
  cost: f32,
  min_cost: f32,
  text: Link<String>,
  person_number: Link<PersonNumber>,
  gram_props: Link<GramProps>,
  frames: Link<Frame>,
  semantic: Option<Rc<SemanticArray>>,
  seq: u64,
}

impl PartialEq for Path {
  fn eq(&self, other: &Self) -> bool {
    self.min_cost == other.min_cost && self.seq == other.seq
  }
}
impl Eq for Path {}
impl PartialOrd for Path {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for Path {
  fn cmp(&self, other: &Self) -> Ordering {
    // BinaryHeap is a max-heap; reverse so the cheapest `min_cost` is
    // popped first, breaking ties by earlier insertion order (SPEC_FULL.md
    // §9 "heap tie-breaks").
    other
      .min_cost
      .partial_cmp(&self.min_cost)
      .unwrap_or(Ordering::Equal)
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

pub struct Derivation {
  pub text: String,
  pub semantic: Rc<SemanticArray>,
  pub cost: f32,
}

pub struct SearchResult {
  pub trees: Vec<Derivation>,
  pub path_count: usize,
  pub ambiguous_tree_count: usize,
  pub truncated: bool,
}

pub struct SearchConfig {
  pub k: usize,
  pub max_paths: usize,
}

fn node_min_cost(forest: &Forest, id: NodeId) -> f32 {
  forest.nodes.get(id).min_cost.unwrap_or(0.0)
}

/// Pops leading non-`Node` obligations off `remaining` — resolving text
/// against the active conjugation context, pushing/popping person-number and
/// grammatical-property contexts, and ticking pending semantic frames closed
/// — until the next `Node` obligation or the stack is empty. Returns `None`
/// for `cur_node` when the frontier is complete (SPEC_FULL.md §4.6
/// "cur_node").
#[allow(clippy::type_complexity)]
fn pull_next(
  mut remaining: Link<Obligation>,
  mut text: Link<String>,
  mut person_number: Link<PersonNumber>,
  mut gram_props: Link<GramProps>,
  mut frames: Link<Frame>,
  mut semantic: Option<Rc<SemanticArray>>,
  interner: &mut SemanticInterner,
) -> Result<
  (
    Option<NodeId>,
    Link<Obligation>,
    Link<String>,
    Link<PersonNumber>,
    Link<GramProps>,
    Link<Frame>,
    Option<Rc<SemanticArray>>,
  ),
  (),
> {
  loop {
    match pop(&remaining) {
      None => return Ok((None, None, text, person_number, gram_props, frames, semantic)),
      Some((Obligation::Node(id), rest)) => return Ok((Some(id), rest, text, person_number, gram_props, frames, semantic)),
      Some((Obligation::Text { piece, tense }, rest)) => {
        let resolved = resolve_text(&piece, tense.as_deref(), &gram_props, &mut person_number).ok_or(())?;
        text = push(resolved, &text);
        remaining = rest;
      }
      Some((Obligation::PushPersonNumber(pn), rest)) => {
        person_number = push(pn, &person_number);
        remaining = rest;
      }
      Some((Obligation::PushGramProps(gp), rest)) => {
        gram_props = push(gp, &gram_props);
        remaining = rest;
      }
      Some((Obligation::PopGramProps, rest)) => {
        gram_props = pop(&gram_props).map(|(_, tail)| tail).unwrap_or(None);
        remaining = rest;
      }
      Some((Obligation::FrameTick, rest)) => {
        let (new_frames, new_semantic) = tick_frame(frames, semantic, interner)?;
        frames = new_frames;
        semantic = new_semantic;
        remaining = rest;
      }
    }
  }
}

/// Resolves one text piece: a literal passes through unchanged; a
/// conjugation resolves against (a) the producing rule's own `tense` only
/// when it matches the active `accepted_tense`, (b) the active `form`, and
/// (c) the next unconsumed person-number entry (SPEC_FULL.md §4.6 steps
/// a–c).
fn resolve_text(piece: &TextPiece, tense: Option<&str>, gram_props: &Link<GramProps>, person_number: &mut Link<PersonNumber>) -> Option<String> {
  match piece {
    TextPiece::Literal(s) => Some(s.clone()),
    TextPiece::Conjugated(conj) => {
      let active = gram_props.as_ref().map(|cell| &cell.head);
      let accepted_tense = active.and_then(|gp| gp.accepted_tense.as_deref());
      let effective_tense = match (accepted_tense, tense) {
        (Some(accepted), Some(actual)) if accepted == actual => Some(actual),
        _ => None,
      };
      let form = active.and_then(|gp| gp.form.as_deref());
      let person_number_val = match pop(person_number) {
        Some((pn, rest)) => {
          *person_number = rest;
          Some(pn)
        }
        None => None,
      };
      resolve_conjugation(conj, effective_tense, form, person_number_val)
    }
  }
}

fn resolve_conjugation(conj: &Conjugation, tense: Option<&str>, form: Option<&str>, person_number: Option<PersonNumber>) -> Option<String> {
  conj.resolve(tense, form, person_number).map(|s| s.to_string())
}

fn render_text(text: &Link<String>) -> String {
  let mut parts = Vec::new();
  let mut cur = text.clone();
  while let Some((piece, rest)) = pop(&cur) {
    parts.push(piece);
    cur = rest;
  }
  parts.reverse();
  parts.retain(|s| !s.is_empty());
  parts.join(" ")
}

fn rule_props_ref(reduction: &Reduction) -> Option<&Rc<RuleProps>> {
  match reduction {
    Reduction::Single(p) => Some(p),
    Reduction::Packed(p) => p.props.first(),
  }
}

/// Pattern-matches a non-reduced LHS semantic template — a one-node array
/// wrapping `Apply(func, [])` — and extracts the pending function
/// (SPEC_FULL.md §4.6).
fn extract_func_template(semantic: &Rc<SemanticArray>) -> Option<Rc<Func>> {
  if semantic.0.len() != 1 {
    return None;
  }
  match &semantic.0[0] {
    crate::semantic::SemanticNode::Apply(f, _) => Some(Rc::clone(f)),
    _ => None,
  }
}

/// What a rule's own `semantic`/`inserted_semantic` annotations contribute:
/// either an immediate merge into the enclosing scope, or a brand new
/// pending frame this rule's semantic-producing RHS positions must fill
/// before it can merge upward (SPEC_FULL.md §4.6).
struct RuleSemantics {
  open_frame: Option<(Rc<Func>, u32)>,
  immediate_merges: Vec<Rc<SemanticArray>>,
  first_produces: bool,
  second_produces: bool,
}

fn rule_semantics_from(props: Option<&RuleProps>, is_binary: bool) -> RuleSemantics {
  let mut immediate_merges = Vec::new();
  let mut open_frame = None;
  let mut first_produces = false;
  let mut second_produces = false;

  if let Some(p) = props {
    if let Some(semantic) = &p.semantic {
      if p.semantic_is_reduced {
        immediate_merges.push(Rc::clone(semantic));
      } else if let Some(func) = extract_func_template(semantic) {
        let mut remaining = 0u32;
        if p.rhs_can_produce_semantic {
          remaining += 1;
        }
        if is_binary && p.second_rhs_can_produce_semantic {
          remaining += 1;
        }
        open_frame = Some((func, remaining));
      }
    }
    if let Some(inserted) = &p.inserted_semantic {
      immediate_merges.push(Rc::clone(inserted));
    }
    first_produces = p.rhs_can_produce_semantic;
    second_produces = is_binary && p.second_rhs_can_produce_semantic;
  }

  RuleSemantics { open_frame, immediate_merges, first_produces, second_produces }
}

struct SubResult {
  remaining: Link<Obligation>,
  cost: f32,
  semantics: RuleSemantics,
}

/// Builds the obligation stack for one subnode of `cur_node`, pushed onto
/// the existing `remaining` so ancestor/sibling obligations survive. The
/// push order brackets each child's `Node` obligation with its
/// grammatical-property context and, for semantic-producing positions, a
/// trailing `FrameTick` that fires only once that child's whole subtree has
/// drained (SPEC_FULL.md §4.6).
fn subnode_obligations(sub: &Sub, remaining: &Link<Obligation>) -> SubResult {
  match sub {
    Sub::Terminal { props } => {
      let semantics = rule_semantics_from(Some(props), false);
      let mut next = remaining.clone();
      if let Some(text) = &props.text {
        for piece in text.iter().rev() {
          next = push(Obligation::Text { piece: Rc::new(piece.clone()), tense: props.tense.clone() }, &next);
        }
      }
      if let Some(pn) = props.person_number {
        next = push(Obligation::PushPersonNumber(pn), &next);
      }
      SubResult { remaining: next, cost: props.cost, semantics }
    }
    Sub::Unary { child, reduction } => {
      let props = rule_props_ref(reduction).map(|p| p.as_ref());
      let semantics = rule_semantics_from(props, false);
      let gp_child = props.and_then(|p| p.gram_props.get(0).cloned().flatten());
      let person_number = props.and_then(|p| p.person_number);
      let tense = props.and_then(|p| p.tense.clone());
      let text = props.and_then(|p| p.text.clone());

      let mut next = remaining.clone();
      if semantics.first_produces {
        next = push(Obligation::FrameTick, &next);
      }
      if let Some(text) = &text {
        for piece in text.iter().rev() {
          next = push(Obligation::Text { piece: Rc::new(piece.clone()), tense: tense.clone() }, &next);
        }
      }
      if let Some(pn) = person_number {
        next = push(Obligation::PushPersonNumber(pn), &next);
      }
      if gp_child.is_some() {
        next = push(Obligation::PopGramProps, &next);
      }
      next = push(Obligation::Node(*child), &next);
      if let Some(gp) = gp_child {
        next = push(Obligation::PushGramProps(gp), &next);
      }

      SubResult { remaining: next, cost: reduction.min_cost(), semantics }
    }
    Sub::Binary { child, next: right, reduction } => {
      let props = rule_props_ref(reduction).map(|p| p.as_ref());
      let semantics = rule_semantics_from(props, true);
      let gp_child = props.and_then(|p| p.gram_props.get(0).cloned().flatten());
      let gp_next = props.and_then(|p| p.gram_props.get(1).cloned().flatten());
      let person_number = props.and_then(|p| p.person_number);
      let tense = props.and_then(|p| p.tense.clone());
      let text = props.and_then(|p| p.text.clone());

      let mut next = remaining.clone();
      if semantics.second_produces {
        next = push(Obligation::FrameTick, &next);
      }
      if gp_next.is_some() {
        next = push(Obligation::PopGramProps, &next);
      }
      next = push(Obligation::Node(*right), &next);
      if let Some(gp) = gp_next {
        next = push(Obligation::PushGramProps(gp), &next);
      }
      if semantics.first_produces {
        next = push(Obligation::FrameTick, &next);
      }
      if let Some(text) = &text {
        for piece in text.iter().rev() {
          next = push(Obligation::Text { piece: Rc::new(piece.clone()), tense: tense.clone() }, &next);
        }
      }
      if let Some(pn) = person_number {
        next = push(Obligation::PushPersonNumber(pn), &next);
      }
      if gp_child.is_some() {
        next = push(Obligation::PopGramProps, &next);
      }
      next = push(Obligation::Node(*child), &next);
      if let Some(gp) = gp_child {
        next = push(Obligation::PushGramProps(gp), &next);
      }

      SubResult { remaining: next, cost: reduction.min_cost(), semantics }
    }
  }
}

/// Decrements the top pending frame's countdown; once it reaches zero,
/// finalises it with `insert_semantic` and merges the resulting singleton
/// array up into the next-enclosing frame (or the root semantic, if none).
fn tick_frame(frames: Link<Frame>, semantic: Option<Rc<SemanticArray>>, interner: &mut SemanticInterner) -> Result<(Link<Frame>, Option<Rc<SemanticArray>>), ()> {
  let Some((mut frame, rest)) = pop(&frames) else {
    return Ok((frames, semantic));
  };
  frame.remaining = frame.remaining.saturating_sub(1);
  if frame.remaining == 0 {
    let node = interner.insert_semantic(Rc::clone(&frame.func), Rc::clone(&frame.acc)).map_err(|_| ())?;
    let singleton = interner.singleton(node);
    merge_into_scope(rest, semantic, singleton, interner)
  } else {
    Ok((push(frame, &rest), semantic))
  }
}

/// Merges `piece` into whatever scope is currently active: the top pending
/// frame's accumulator, or the root semantic if no frame is open.
fn merge_into_scope(frames: Link<Frame>, semantic: Option<Rc<SemanticArray>>, piece: Rc<SemanticArray>, interner: &mut SemanticInterner) -> Result<(Link<Frame>, Option<Rc<SemanticArray>>), ()> {
  match pop(&frames) {
    Some((mut top, rest)) => {
      top.acc = interner.merge_rhs(&top.acc, &piece).map_err(|_| ())?;
      Ok((push(top, &rest), semantic))
    }
    None => {
      let merged = match &semantic {
        None => piece,
        Some(existing) => interner.merge_rhs(existing, &piece).map_err(|_| ())?,
      };
      Ok((frames, Some(merged)))
    }
  }
}

/// Folds one subnode's `RuleSemantics` into the path's frame/semantic state:
/// opens a new pending frame (seeding it with any immediate merges) when the
/// rule contributes a non-reduced LHS semantic, otherwise merges its
/// immediate contributions straight into the active scope.
fn fold_rule_semantics(
  semantics: &RuleSemantics,
  mut frames: Link<Frame>,
  mut semantic: Option<Rc<SemanticArray>>,
  interner: &mut SemanticInterner,
) -> Result<(Link<Frame>, Option<Rc<SemanticArray>>), ()> {
  if let Some((func, remaining)) = &semantics.open_frame {
    let mut acc = interner.intern_array(vec![]);
    for piece in &semantics.immediate_merges {
      acc = interner.merge_rhs(&acc, piece).map_err(|_| ())?;
    }
    frames = push(Frame { func: Rc::clone(func), acc, remaining: *remaining }, &frames);
    if *remaining == 0 {
      let (f2, s2) = tick_frame(frames, semantic, interner)?;
      frames = f2;
      semantic = s2;
    }
  } else {
    for piece in &semantics.immediate_merges {
      let (f2, s2) = merge_into_scope(frames, semantic, Rc::clone(piece), interner)?;
      frames = f2;
      semantic = s2;
    }
  }
  Ok((frames, semantic))
}

/// Runs `pfsearch` over `forest` starting from `root`, producing up to
/// `config.k` cheapest legal derivations. `flattened` carries the
/// term-sequence nodes the heuristic pre-pass collapsed into a single
/// display-text fragment (SPEC_FULL.md §4.5); such a node is treated as one
/// synthetic terminal-like transition instead of being expanded sub by sub.
pub fn search(forest: &Forest, root: NodeId, interner: &mut SemanticInterner, flattened: &HashMap<NodeId, FlattenedText>, config: &SearchConfig) -> SearchResult {
  let mut heap: BinaryHeap<Path> = BinaryHeap::new();
  let mut seq = 0u64;
  let mut path_count = 0usize;
  let mut ambiguous_tree_count = 0usize;
  let mut trees: Vec<Derivation> = Vec::new();
  let mut seen_semantics: Vec<Rc<SemanticArray>> = Vec::new();
  let mut truncated = false;

  heap.push(Path {
    cur_node: Some(root),
    remaining: None,
    cost: 0.0,
    min_cost: node_min_cost(forest, root),
    text: None,
    person_number: None,
    gram_props: None,
    frames: None,
    semantic: None,
    seq,
  });
  seq += 1;

  while let Some(path) = heap.pop() {
    if trees.len() >= config.k {
      break;
    }
    path_count += 1;
    if path_count > config.max_paths {
      truncated = true;
      break;
    }

    let Some(cur_node) = path.cur_node else {
      let semantic = path.semantic.clone().unwrap_or_else(|| interner.intern_array(vec![]));
      if seen_semantics.iter().any(|s| SemanticInterner::arrays_equal(s, &semantic)) {
        ambiguous_tree_count += 1;
        continue;
      }
      seen_semantics.push(Rc::clone(&semantic));
      trees.push(Derivation { text: render_text(&path.text), semantic, cost: path.cost });
      continue;
    };

    if let Some(flat) = flattened.get(&cur_node) {
      let mut next_remaining = path.remaining.clone();
      for piece in flat.text.iter().rev() {
        next_remaining = push(Obligation::Text { piece: Rc::new(piece.clone()), tense: flat.tense.clone() }, &next_remaining);
      }
      let Ok((next_cur, remaining, text, person_number, gram_props, frames, semantic)) = pull_next(
        next_remaining,
        path.text.clone(),
        path.person_number.clone(),
        path.gram_props.clone(),
        path.frames.clone(),
        path.semantic.clone(),
        interner,
      ) else {
        continue;
      };

      let cost = path.cost + node_min_cost(forest, cur_node);
      let frontier_min_cost = next_cur.map(|id| node_min_cost(forest, id)).unwrap_or(0.0) + remaining_min_cost(forest, &remaining);

      heap.push(Path {
        cur_node: next_cur,
        remaining,
        cost,
        min_cost: cost + frontier_min_cost,
        text,
        person_number,
        gram_props,
        frames,
        semantic,
        seq,
      });
      seq += 1;
      continue;
    }

    let node = forest.nodes.get(cur_node);
    for sub in &node.subs {
      let sub_result = subnode_obligations(sub, &path.remaining);

      let Ok((frames, semantic)) = fold_rule_semantics(&sub_result.semantics, path.frames.clone(), path.semantic.clone(), interner) else {
        continue;
      };

      let Ok((cur_node, remaining, text, person_number, gram_props, frames, semantic)) =
        pull_next(sub_result.remaining, path.text.clone(), path.person_number.clone(), path.gram_props.clone(), frames, semantic, interner)
      else {
        continue;
      };

      let cost = path.cost + sub_result.cost;
      let frontier_min_cost = cur_node.map(|id| node_min_cost(forest, id)).unwrap_or(0.0) + remaining_min_cost(forest, &remaining);

      heap.push(Path {
        cur_node,
        remaining,
        cost,
        min_cost: cost + frontier_min_cost,
        text,
        person_number,
        gram_props,
        frames,
        semantic,
        seq,
      });
      seq += 1;
    }
  }

  SearchResult { trees, path_count, ambiguous_tree_count, truncated }
}

fn remaining_min_cost(forest: &Forest, remaining: &Link<Obligation>) -> f32 {
  let mut total = 0.0;
  let mut cur = remaining.clone();
  while let Some((ob, rest)) = pop(&cur) {
    if let Obligation::Node(id) = ob {
      total += node_min_cost(forest, id);
    }
    cur = rest;
  }
  total
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::forest::Node;
  use crate::grammar::TextPiece;
  use crate::semantic::{Arg, SemanticNode};
  use crate::symbol::{NonterminalId, Term, TerminalId};

  fn base_props(cost: f32, text: &str) -> RuleProps {
    RuleProps {
      cost,
      semantic: None,
      semantic_is_reduced: false,
      inserted_semantic: None,
      inserted_sym_idx: None,
      text: Some(vec![TextPiece::Literal(text.to_string())]),
      gram_props: vec![],
      person_number: None,
      anaphora_person_number: None,
      is_transposition: false,
      tense: None,
      rhs_can_produce_semantic: false,
      second_rhs_can_produce_semantic: false,
      rhs_does_not_produce_text: false,
      is_term_sequence: false,
      rhs_term_sequence_indexes: vec![],
      rhs_no_text_indexes: vec![],
      is_placeholder: false,
    }
  }

  fn props(cost: f32, text: &str) -> Rc<RuleProps> {
    Rc::new(base_props(cost, text))
  }

  fn no_flattened() -> HashMap<NodeId, FlattenedText> {
    HashMap::default()
  }

  #[test]
  fn finds_cheapest_single_path_tree() {
    let mut forest = Forest::new(1);
    let leaf = forest.nodes.alloc(Node { symbol: Term::Terminal(TerminalId(0)), size: 1, start: 0, subs: vec![Sub::Terminal { props: props(0.0, "hello") }], min_cost: Some(0.0) });
    let root = forest.nodes.alloc(Node {
      symbol: Term::Symbol(NonterminalId(0)),
      size: 1,
      start: 0,
      subs: vec![Sub::Unary { child: leaf, reduction: Reduction::Single(props(0.0, "")) }],
      min_cost: Some(0.0),
    });

    let mut interner = SemanticInterner::new();
    let result = search(&forest, root, &mut interner, &no_flattened(), &SearchConfig { k: 1, max_paths: 1000 });
    assert_eq!(result.trees.len(), 1);
    assert_eq!(result.trees[0].text, "hello");
  }

  #[test]
  fn prefers_cheaper_of_two_subnodes() {
    let mut forest = Forest::new(1);
    let leaf = forest.nodes.alloc(Node { symbol: Term::Terminal(TerminalId(0)), size: 1, start: 0, subs: vec![Sub::Terminal { props: props(0.0, "x") }], min_cost: Some(0.0) });
    let root = forest.nodes.alloc(Node {
      symbol: Term::Symbol(NonterminalId(0)),
      size: 1,
      start: 0,
      subs: vec![
        Sub::Unary { child: leaf, reduction: Reduction::Single(props(5.0, "expensive")) },
        Sub::Unary { child: leaf, reduction: Reduction::Single(props(1.0, "cheap")) },
      ],
      min_cost: Some(1.0),
    });

    let mut interner = SemanticInterner::new();
    let result = search(&forest, root, &mut interner, &no_flattened(), &SearchConfig { k: 2, max_paths: 1000 });
    assert_eq!(result.trees[0].text, "cheap x");
    assert_eq!(result.trees[0].cost, 1.0);
  }

  #[test]
  fn builds_nested_semantic_application_from_a_pending_frame() {
    let mut interner = SemanticInterner::new();
    let entity_semantic = interner.singleton(SemanticNode::Leaf(Arg::Entity(1)));
    let not_func = Rc::new(Func { name: Rc::from("not"), cost: 0.0, min_arity: 1, max_arity: 1, unique: false, is_negation: true });
    let template = interner.singleton(SemanticNode::Apply(Rc::clone(&not_func), interner.intern_array(vec![])));

    let mut leaf_props = base_props(0.0, "bush");
    leaf_props.semantic = Some(entity_semantic.clone());
    leaf_props.semantic_is_reduced = true;

    let mid_props = base_props(0.0, "");

    let mut root_props = base_props(0.0, "not");
    root_props.semantic = Some(template);
    root_props.semantic_is_reduced = false;
    root_props.rhs_can_produce_semantic = true;

    let mut forest = Forest::new(1);
    let leaf = forest.nodes.alloc(Node {
      symbol: Term::Terminal(TerminalId(0)),
      size: 1,
      start: 0,
      subs: vec![Sub::Terminal { props: Rc::new(leaf_props) }],
      min_cost: Some(0.0),
    });
    let mid = forest.nodes.alloc(Node {
      symbol: Term::Symbol(NonterminalId(0)),
      size: 1,
      start: 0,
      subs: vec![Sub::Unary { child: leaf, reduction: Reduction::Single(Rc::new(mid_props)) }],
      min_cost: Some(0.0),
    });
    let root = forest.nodes.alloc(Node {
      symbol: Term::Symbol(NonterminalId(1)),
      size: 1,
      start: 0,
      subs: vec![Sub::Unary { child: mid, reduction: Reduction::Single(Rc::new(root_props)) }],
      min_cost: Some(0.0),
    });

    let result = search(&forest, root, &mut interner, &no_flattened(), &SearchConfig { k: 1, max_paths: 1000 });
    assert_eq!(result.trees.len(), 1);
    let tree_semantic = &result.trees[0].semantic;
    assert_eq!(tree_semantic.0.len(), 1);
    match &tree_semantic.0[0] {
      SemanticNode::Apply(f, children) => {
        assert_eq!(f.name.as_ref(), "not");
        assert_eq!(children.0, vec![SemanticNode::Leaf(Arg::Entity(1))]);
      }
      other => panic!("expected a nested Apply node, got {:?}", other),
    }
  }
}
