//! Forest builder (SPEC_FULL.md §4.4): drive the state table over candidate
//! terminal matches to build a packed parse forest, using a Tomita-style
//! graph-structured stack (vertices + zNodes) so that ambiguous shifts and
//! reductions share structure instead of branching into separate stacks.
//!
//! Nodes, subnodes, vertices, and zNodes all live in flat `Arena`s addressed
//! by `u32` ids, the same indexed-arena discipline the rest of the crate
//! uses in place of the teacher's raw-pointer bump allocator.

use crate::lib::arena::{Arena, Id};
use crate::lib::base::HashMap;
use crate::state_table::{Reduction, RuleProps, StateId, StateTable};
use crate::symbol::Term;
use std::rc::Rc;

pub type NodeId = Id<Node>;
pub type VertexId = Id<Vertex>;
pub type ZNodeId = Id<ZNode>;

pub enum Sub {
  /// A leaf produced directly by the terminal matcher: no children, just the
  /// match's own cost/text/semantic annotations.
  Terminal { props: Rc<RuleProps> },
  Unary { child: NodeId, reduction: Reduction },
  Binary { child: NodeId, next: NodeId, reduction: Reduction },
}

/// Uniquely identified by `(symbol, size, start)` (SPEC_FULL.md §3). `symbol`
/// is a `Term` so the same arena holds both terminal leaf nodes (built by
/// the terminal matcher) and nonterminal nodes (built by reduction).
pub struct Node {
  pub symbol: Term,
  pub size: u32,
  pub start: u32,
  pub subs: Vec<Sub>,
  /// Filled in by the heuristic pre-pass (§4.5); `None` until then.
  pub min_cost: Option<f32>,
}

pub struct Vertex {
  pub state: StateId,
  pub index: u32,
  pub znodes: Vec<ZNodeId>,
}

pub struct ZNode {
  pub node: NodeId,
  pub owner_vertex: VertexId,
  pub prev_vertices: Vec<VertexId>,
}

/// One matched terminal span handed to the forest builder by the terminal
/// matcher (SPEC_FULL.md §4.3): a leaf node plus the index it ends at.
pub struct TerminalMatch {
  pub start: usize,
  pub end: usize,
  pub node: NodeId,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ForestOutcome {
  Root(NodeId),
  ReachedNoStartSymbol,
}

/// Per-parse mutable state (SPEC_FULL.md §3 lifecycle: allocated at the
/// start of `parse`, retained across the fallback reparse except for the
/// vertex/zNode/reduction structures which the facade resets).
pub struct Forest {
  pub nodes: Arena<Node>,
  vertices: Arena<Vertex>,
  znodes: Arena<ZNode>,
  node_table: Vec<HashMap<Term, Vec<NodeId>>>,
  vertices_at: Vec<Vec<VertexId>>,
  vertex_by_state: Vec<HashMap<StateId, VertexId>>,
  /// Dedups `intern_terminal_leaf` calls by `(term, start, size, cost bits)`,
  /// kept across `reset_stack_for_fallback` so the fallback reparse's
  /// re-matching doesn't emit duplicate subnodes for spans it already found
  /// at the same cost (SPEC_FULL.md §4.3 step 7 / §4.7 fallback idempotence).
  /// A deletion-expanded match costs more on the fallback pass than on the
  /// strict first pass, so it gets a different key and is correctly kept as
  /// a new, costlier alternative rather than deduped away.
  interned_terminals: HashMap<(Term, u32, u32, u32), NodeId>,
}

impl Forest {
  pub fn new(token_count: usize) -> Self {
    let width = token_count + 2; // + blank index + one past end for safety
    Forest {
      nodes: Arena::new(),
      vertices: Arena::new(),
      znodes: Arena::new(),
      node_table: (0..width).map(|_| HashMap::default()).collect(),
      vertices_at: (0..width).map(|_| Vec::new()).collect(),
      vertex_by_state: (0..width).map(|_| HashMap::default()).collect(),
      interned_terminals: HashMap::default(),
    }
  }

  /// Resets per-parse GSS bookkeeping while keeping every node already built
  /// (the fallback reparse retains the node table; SPEC_FULL.md §3, §4.7).
  pub fn reset_stack_for_fallback(&mut self) {
    for v in self.vertices_at.iter_mut() {
      v.clear();
    }
    for m in self.vertex_by_state.iter_mut() {
      m.clear();
    }
    self.vertices = Arena::new();
    self.znodes = Arena::new();
  }

  fn alloc_node(&mut self, symbol: Term, size: u32, start: u32, index: usize, sub: Sub) -> NodeId {
    if let Some(existing) = self.find_node(index, symbol, size) {
      return existing;
    }
    let id = self.nodes.alloc(Node { symbol, size, start, subs: vec![sub], min_cost: None });
    self.node_table[index].entry(symbol).or_default().push(id);
    id
  }

  fn find_node(&self, index: usize, symbol: Term, size: u32) -> Option<NodeId> {
    self.node_table[index]
      .get(&symbol)
      .into_iter()
      .flatten()
      .copied()
      .find(|&id| self.nodes.get(id).size == size)
  }

  /// `add_sub` (SPEC_FULL.md §4.4): create the node for `(symbol, size)` at
  /// `index` if absent; otherwise append `sub`, deduplicating nonterminal
  /// subnodes by `(child, next)` and always appending terminal subnodes.
  fn add_sub(&mut self, symbol: Term, size: u32, start: u32, index: usize, sub: Sub) -> Option<NodeId> {
    match self.find_node(index, symbol, size) {
      None => {
        let id = self.nodes.alloc(Node { symbol, size, start, subs: vec![sub], min_cost: None });
        self.node_table[index].entry(symbol).or_default().push(id);
        Some(id)
      }
      Some(id) => {
        let is_new_terminal = matches!(sub, Sub::Terminal { .. });
        let node = self.nodes.get_mut(id);
        let duplicate = !is_new_terminal
          && node.subs.iter().any(|existing| match (existing, &sub) {
            (Sub::Unary { child: c1, .. }, Sub::Unary { child: c2, .. }) => c1 == c2,
            (Sub::Binary { child: c1, next: n1, .. }, Sub::Binary { child: c2, next: n2, .. }) => c1 == c2 && n1 == n2,
            _ => false,
          });
        if duplicate {
          None
        } else {
          node.subs.push(sub);
          Some(id)
        }
      }
    }
  }

  fn node_size(&self, id: NodeId) -> u32 {
    self.nodes.get(id).size
  }

  fn node_start(&self, id: NodeId) -> u32 {
    self.nodes.get(id).start
  }

  fn get_or_create_vertex(&mut self, index: usize, state: StateId) -> VertexId {
    if let Some(&id) = self.vertex_by_state[index].get(&state) {
      return id;
    }
    let id = self.vertices.alloc(Vertex { state, index: index as u32, znodes: vec![] });
    self.vertex_by_state[index].insert(state, id);
    self.vertices_at[index].push(id);
    id
  }

  fn find_or_create_znode(&mut self, dest_vertex: VertexId, node: NodeId, from_vertex: VertexId) -> ZNodeId {
    let existing = self.vertices.get(dest_vertex).znodes.iter().copied().find(|&zid| self.znodes.get(zid).node == node);
    match existing {
      Some(zid) => {
        let z = self.znodes.get_mut(zid);
        if !z.prev_vertices.contains(&from_vertex) {
          z.prev_vertices.push(from_vertex);
        }
        zid
      }
      None => {
        let zid = self.znodes.alloc(ZNode { node, owner_vertex: dest_vertex, prev_vertices: vec![from_vertex] });
        self.vertices.get_mut(dest_vertex).znodes.push(zid);
        zid
      }
    }
  }

  fn shift(&mut self, table: &StateTable, term: Term, from_vertex: VertexId, node: NodeId, index: usize, queue: &mut Vec<ZNodeId>) {
    let from_state = self.vertices.get(from_vertex).state;
    let Some(&dest_state) = table.state(from_state).shifts.get(&term) else { return };
    let dest_vertex = self.get_or_create_vertex(index, dest_state);
    let zid = self.find_or_create_znode(dest_vertex, node, from_vertex);
    if !table.state(dest_state).reductions.is_empty() {
      queue.push(zid);
    }
  }

  /// Runs the full shift-reduce sweep for indices `0..=token_count` (the
  /// last index is the end-anchored blank), returning the forest root or a
  /// `ReachedNoStartSymbol` outcome (SPEC_FULL.md §4.4 start-node detection).
  pub fn run(&mut self, table: &StateTable, token_count: usize, matches_ending_at: impl Fn(usize) -> Vec<TerminalMatch>) -> ForestOutcome {
    let start_vertex = self.get_or_create_vertex(0, table.start_state());
    let _ = start_vertex;

    for index in 0..=token_count {
      let mut queue: Vec<ZNodeId> = Vec::new();

      for m in matches_ending_at(index) {
        let term = self.nodes.get(m.node).symbol;
        let preceding: Vec<VertexId> = self.vertices_at[m.start].clone();
        for v in preceding {
          self.shift(table, term, v, m.node, index, &mut queue);
        }
      }

      while let Some(zid) = queue.pop() {
        let z = self.znodes.get(zid);
        let owner_vertex = z.owner_vertex;
        let node = z.node;
        let prev_vertices = z.prev_vertices.clone();
        let state = self.vertices.get(owner_vertex).state;
        let reductions_count = table.state(state).reductions.len();

        for r in 0..reductions_count {
          let (lhs, is_binary, reduction) = {
            let red = &table.state(state).reductions[r];
            (red.lhs, red.is_binary, red.reduction.clone())
          };
          let symbol = Term::Symbol(lhs);

          if !is_binary {
            let size = self.node_size(node);
            let start = self.node_start(node);
            for &pv in &prev_vertices {
              let sub = Sub::Unary { child: node, reduction: reduction.clone() };
              if let Some(new_node) = self.add_sub(symbol, size, start, index, sub) {
                self.shift(table, symbol, pv, new_node, index, &mut queue);
              } else if let Some(existing) = self.find_node(index, symbol, size) {
                self.shift(table, symbol, pv, existing, index, &mut queue);
              }
            }
          } else {
            for &pv in &prev_vertices {
              let deeper_znodes: Vec<ZNodeId> = self.vertices.get(pv).znodes.clone();
              for z2id in deeper_znodes {
                let z2 = self.znodes.get(z2id);
                let (left, left_prevs) = (z2.node, z2.prev_vertices.clone());
                let right = node;
                let (child, next) = if reduction_is_transposition(&reduction) { (right, left) } else { (left, right) };
                let size = self.node_size(left) + self.node_size(right);
                let start = self.node_start(left);
                for &dv in &left_prevs {
                  let sub = Sub::Binary { child, next, reduction: reduction.clone() };
                  if let Some(new_node) = self.add_sub(symbol, size, start, index, sub) {
                    self.shift(table, symbol, dv, new_node, index, &mut queue);
                  } else if let Some(existing) = self.find_node(index, symbol, size) {
                    self.shift(table, symbol, dv, existing, index, &mut queue);
                  }
                }
              }
            }
          }
        }
      }
    }

    self.find_start_node(table, token_count)
  }

  fn find_start_node(&self, table: &StateTable, token_count: usize) -> ForestOutcome {
    for index in [token_count, token_count.saturating_sub(1)] {
      if let Some(&vid) = self.vertices_at[index].iter().find(|&&v| table.state(self.vertices.get(v).state).accepting) {
        if let Some(&zid) = self.vertices.get(vid).znodes.first() {
          return ForestOutcome::Root(self.znodes.get(zid).node);
        }
      }
    }
    ForestOutcome::ReachedNoStartSymbol
  }

  /// Creates (or retrieves) the leaf node for a single terminal match,
  /// keyed by `(Term::Terminal(terminal), size, start)` per SPEC_FULL.md
  /// §4.3 invariant (i). Re-interning the same `(terminal, start, size,
  /// cost)` — as happens when the fallback reparse re-runs the matcher —
  /// returns the existing node instead of appending a duplicate subnode.
  pub fn intern_terminal_leaf(&mut self, terminal: Term, start: u32, size: u32, end_index: usize, props: Rc<RuleProps>) -> NodeId {
    let key = (terminal, start, size, props.cost.to_bits());
    if let Some(&existing) = self.interned_terminals.get(&key) {
      return existing;
    }
    let id = self
      .add_sub(terminal, size, start, end_index, Sub::Terminal { props })
      .unwrap_or_else(|| self.find_node(end_index, terminal, size).expect("terminal leaf just inserted"));
    self.interned_terminals.insert(key, id);
    id
  }
}

fn reduction_is_transposition(reduction: &Reduction) -> bool {
  match reduction {
    Reduction::Single(p) => p.is_transposition,
    Reduction::Packed(p) => p.props.first().map(|p| p.is_transposition).unwrap_or(false),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::{GrammarDoc, GrammarRule, IntSymbol};
  use crate::lib::base::HashSet;
  use crate::symbol::SymbolTable;

  fn tiny_grammar() -> GrammarDoc {
    GrammarDoc {
      rule_sets: vec![
        ("start".to_string(), vec![GrammarRule::nonterminal(vec!["greeting"], 0.0)]),
        ("greeting".to_string(), vec![GrammarRule::nonterminal(vec!["hello", "world"], 0.0)]),
        ("hello".to_string(), vec![GrammarRule::terminal("hello", 0.0)]),
        ("world".to_string(), vec![GrammarRule::terminal("world", 0.0)]),
      ],
      semantics: vec![],
      entity_sets: vec![],
      int_symbols: Vec::<IntSymbol>::new(),
      deletables: HashSet::default(),
      start_symbol: "start".to_string(),
      blank_symbol: "blank".to_string(),
    }
  }

  #[test]
  fn shifts_and_reduces_two_literal_tokens_into_the_start_symbol() {
    let grammar = tiny_grammar();
    let mut symbols = SymbolTable::new();
    let table = crate::state_table::build(&grammar, &mut symbols).unwrap();
    let hello = symbols.lookup_terminal("hello").unwrap();
    let world = symbols.lookup_terminal("world").unwrap();

    let mut forest = Forest::new(2);
    let hello_props = Rc::new(RuleProps {
      cost: 0.0,
      semantic: None,
      semantic_is_reduced: false,
      inserted_semantic: None,
      inserted_sym_idx: None,
      text: None,
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
    });
    let world_props = Rc::clone(&hello_props);

    let hello_node = forest.intern_terminal_leaf(Term::Terminal(hello), 0, 1, 1, hello_props);
    let world_node = forest.intern_terminal_leaf(Term::Terminal(world), 1, 1, 2, world_props);

    let matches = vec![
      TerminalMatch { start: 0, end: 1, node: hello_node },
      TerminalMatch { start: 1, end: 2, node: world_node },
    ];

    let outcome = forest.run(&table, 2, |index| matches.iter().filter(|m| m.end == index).map(|m| TerminalMatch { start: m.start, end: m.end, node: m.node }).collect());

    assert!(matches!(outcome, ForestOutcome::Root(_)));
  }

  fn terminal_props(cost: f32) -> Rc<RuleProps> {
    Rc::new(RuleProps {
      cost,
      semantic: None,
      semantic_is_reduced: false,
      inserted_semantic: None,
      inserted_sym_idx: None,
      text: None,
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
    })
  }

  #[test]
  fn reinterning_the_same_terminal_span_and_cost_does_not_duplicate_subs() {
    let mut forest = Forest::new(1);
    let term = Term::Terminal(crate::symbol::TerminalId(0));
    let first = forest.intern_terminal_leaf(term, 0, 1, 1, terminal_props(0.0));

    forest.reset_stack_for_fallback();
    let second = forest.intern_terminal_leaf(term, 0, 1, 1, terminal_props(0.0));

    assert_eq!(first, second);
    assert_eq!(forest.nodes.get(first).subs.len(), 1);
  }

  #[test]
  fn reinterning_at_a_different_cost_adds_a_new_sub() {
    let mut forest = Forest::new(1);
    let term = Term::Terminal(crate::symbol::TerminalId(0));
    let first = forest.intern_terminal_leaf(term, 0, 1, 1, terminal_props(0.0));

    forest.reset_stack_for_fallback();
    let second = forest.intern_terminal_leaf(term, 0, 1, 1, terminal_props(1.5));

    assert_eq!(first, second);
    assert_eq!(forest.nodes.get(first).subs.len(), 2);
  }
}
