//! Terminal matcher (SPEC_FULL.md §4.3): tokenise the raw query and emit
//! candidate terminal leaf nodes — literal words, entity references, integer
//! ranges, and deletion-extended spans — for the forest builder to shift.

use crate::entity::EntityIndex;
use crate::forest::{Forest, TerminalMatch};
use crate::grammar::GrammarDoc;
use crate::semantic::{Arg, SemanticInterner, SemanticNode};
use crate::state_table::RuleProps;
use crate::symbol::{SymbolTable, Term, TerminalKind};
use std::rc::Rc;

const DELETABLE_COST: f32 = 1.0;
const UNRECOGNISED_COST: f32 = 3.0;

/// Lowercase, whitespace-split, trailing-punctuation-stripped tokens
/// (SPEC_FULL.md §4.3 step 1, and the tokenisation round-trip property in
/// §8).
pub fn tokenize(query: &str) -> Vec<String> {
  query
    .trim()
    .split_whitespace()
    .map(|tok| tok.to_lowercase())
    .map(|tok| tok.trim_end_matches(|c: char| ".,!?;:".contains(c)).to_string())
    .filter(|tok| !tok.is_empty())
    .collect()
}

/// A cleaned numeric token: the parsed integer plus the canonical display
/// text the matcher attaches to integer-range matches.
fn clean_numeric(token: &str) -> Option<(i64, String)> {
  if let Some(hex) = token.strip_prefix("0x") {
    return i64::from_str_radix(hex, 16).ok().map(|n| (n, n.to_string()));
  }
  if let Ok(f) = token.parse::<f64>() {
    if f.is_finite() {
      let n = f.round() as i64;
      return Some((n, n.to_string()));
    }
  }
  None
}

fn is_numeric(token: &str) -> bool {
  token.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
}

struct Deletion {
  /// Cumulative cost of deleting the whole maximal run starting here.
  cost: f32,
  length: usize,
}

/// `deletions[i]`: the cumulative cost and run-length of the maximal
/// deletable span starting at token `i` (SPEC_FULL.md §4.3 step 3), computed
/// right to left so a run's cost and length already fold in everything
/// after it.
fn compute_deletions(tokens: &[String], grammar: &GrammarDoc, extra_deletable_cost: Option<f32>) -> Vec<Option<Deletion>> {
  let mut out: Vec<Option<Deletion>> = vec![None; tokens.len()];
  for i in (0..tokens.len()).rev() {
    let token = &tokens[i];
    let own_cost = if grammar.deletables.contains(token) {
      Some(DELETABLE_COST)
    } else if !is_recognised(token, grammar) {
      Some(UNRECOGNISED_COST)
    } else {
      extra_deletable_cost
    };
    if let Some(cost) = own_cost {
      match out.get(i + 1).and_then(|d| d.as_ref()) {
        Some(next) => out[i] = Some(Deletion { cost: cost + next.cost, length: 1 + next.length }),
        None => out[i] = Some(Deletion { cost, length: 1 }),
      }
    }
  }
  out
}

/// The maximal deletable run ending exactly before token `p` (covering
/// `[run_start, p)`), if one exists — used for backward deletion expansion.
fn run_ending_at(deletions: &[Option<Deletion>], p: usize) -> Option<(usize, f32)> {
  if p == 0 || deletions[p - 1].is_none() {
    return None;
  }
  let mut start = p - 1;
  while start > 0 && deletions[start - 1].is_some() {
    start -= 1;
  }
  let cost = single_token_cost(deletions, start).max(0.0);
  let total = deletions[start].as_ref().map(|d| d.cost).unwrap_or(cost) - deletions.get(p).and_then(|d| d.as_ref()).map(|d| d.cost).unwrap_or(0.0);
  Some((start, total))
}

fn single_token_cost(deletions: &[Option<Deletion>], i: usize) -> f32 {
  match (&deletions[i], deletions.get(i + 1).and_then(|d| d.as_ref())) {
    (Some(d), Some(next)) => d.cost - next.cost,
    (Some(d), None) => d.cost,
    (None, _) => 0.0,
  }
}

/// Greedily matches `record`'s token sequence starting at `start`, skipping
/// over any deletable token in between (SPEC_FULL.md §4.3 step 5) — e.g.
/// `["jeb", "bush"]` matches `"jeb and bush"` by deleting `"and"`. Returns
/// the end index and the cumulative deletion cost, or `None` if a wanted
/// token never shows up or a non-deletable token blocks the gap.
fn match_entity_with_gaps(record: &crate::grammar::EntityRecord, tokens: &[&str], start: usize, deletions: &[Option<Deletion>]) -> Option<(usize, f32)> {
  let mut pos = start;
  let mut cost = 0.0;
  for want in &record.tokens {
    while pos < tokens.len() && tokens[pos] != want.as_str() {
      if deletions[pos].is_some() {
        cost += single_token_cost(deletions, pos);
        pos += 1;
      } else {
        return None;
      }
    }
    if pos >= tokens.len() || tokens[pos] != want.as_str() {
      return None;
    }
    pos += 1;
  }
  Some((pos, cost))
}

fn is_recognised(token: &str, grammar: &GrammarDoc) -> bool {
  if is_numeric(token) {
    return true;
  }
  grammar.entity_sets.iter().any(|(_, records)| records.iter().any(|r| r.tokens.contains(&token.to_string())))
}

pub struct MatcherOutcome {
  pub matches_by_end: Vec<Vec<TerminalMatch>>,
  pub fallback_triggered: bool,
}

/// Runs steps 1–6 of SPEC_FULL.md §4.3 against a tokenised query, populating
/// `forest`'s terminal leaf nodes and returning the matches grouped by end
/// index, ready for `Forest::run`.
pub struct TerminalMatcher<'g> {
  grammar: &'g GrammarDoc,
  entities: &'g EntityIndex,
}

impl<'g> TerminalMatcher<'g> {
  pub fn new(grammar: &'g GrammarDoc, entities: &'g EntityIndex) -> Self {
    TerminalMatcher { grammar, entities }
  }

  /// `fallback_extra_cost`, when set, is added to every otherwise-recognised
  /// token's deletion cost so the aggressive fallback pass can delete past
  /// tokens the strict first pass wouldn't (SPEC_FULL.md §4.3 step 7); the
  /// caller derives it from `ParseLimits::fallback_deletion_base_cost` and
  /// `fallback_deletion_cost_step` (SPEC_FULL.md §10.3).
  pub fn run(
    &self,
    tokens: &[String],
    forest: &mut Forest,
    symbols: &mut SymbolTable,
    semantics: &mut SemanticInterner,
    fallback_extra_cost: Option<f32>,
  ) -> MatcherOutcome {
    let n = tokens.len();
    let mut matches_by_end: Vec<Vec<TerminalMatch>> = (0..=n + 1).map(|_| Vec::new()).collect();
    let token_refs: Vec<&str> = tokens.iter().map(|s| s.as_str()).collect();
    let deletions = compute_deletions(tokens, self.grammar, fallback_extra_cost);

    for i in 0..n {
      let token = &tokens[i];

      if is_numeric(token) {
        if let Some((value, text)) = clean_numeric(token) {
          if let Some(plain) = symbols.lookup_terminal(token) {
            self.emit_plain(plain, i, forest, &mut matches_by_end, 0.0, None, None);
          }
          for int_symbol in &self.grammar.int_symbols {
            if value < int_symbol.min {
              break;
            }
            if value <= int_symbol.max {
              if let Some(tid) = symbols.lookup_terminal(&int_symbol.name) {
                let semantic = semantics.singleton(SemanticNode::Leaf(Arg::Int(value)));
                self.emit_plain(tid, i, forest, &mut matches_by_end, 0.0, Some(semantic), Some(text.clone()));
              }
            }
          }
        }
      } else if let Some(tid) = symbols.lookup_terminal(token) {
        self.emit_plain(tid, i, forest, &mut matches_by_end, 0.0, None, None);
      }

      for record in self.entities.candidates_at(&token_refs, i) {
        if let Some(tid) = symbols.lookup_terminal(&record.category) {
          let end = i + record.tokens.len();
          let semantic = semantics.singleton(SemanticNode::Leaf(Arg::Entity(record.id)));
          let props = Rc::new(leaf_props(0.0, Some(record.text.clone()), Some(semantic)));
          let node = forest.intern_terminal_leaf(Term::Terminal(tid), i as u32, (end - i) as u32, end, props);
          matches_by_end[end].push(TerminalMatch { start: i, end, node });
        }
      }

      for record in self.entities.candidates_starting_with(&token_refs, i) {
        if let Some((end, gap_cost)) = match_entity_with_gaps(record, &token_refs, i, &deletions) {
          if gap_cost > 0.0 {
            if let Some(tid) = symbols.lookup_terminal(&record.category) {
              let semantic = semantics.singleton(SemanticNode::Leaf(Arg::Entity(record.id)));
              let props = Rc::new(leaf_props(gap_cost, Some(record.text.clone()), Some(semantic)));
              let node = forest.intern_terminal_leaf(Term::Terminal(tid), i as u32, (end - i) as u32, end, props);
              matches_by_end[end].push(TerminalMatch { start: i, end, node });
            }
          }
        }
      }
    }

    self.apply_deletion_expansions(n, &deletions, forest, &mut matches_by_end);

    if let Some(blank) = symbols.lookup_terminal(&self.grammar.blank_symbol) {
      let props = Rc::new(leaf_props(0.0, None, None));
      let node = forest.intern_terminal_leaf(Term::Terminal(blank), n as u32, 0, n, props);
      matches_by_end[n].push(TerminalMatch { start: n, end: n, node });
    }

    MatcherOutcome { matches_by_end, fallback_triggered: fallback_extra_cost.is_some() }
  }

  fn emit_plain(
    &self,
    tid: crate::symbol::TerminalId,
    start: usize,
    forest: &mut Forest,
    matches_by_end: &mut [Vec<TerminalMatch>],
    cost: f32,
    semantic: Option<Rc<crate::semantic::SemanticArray>>,
    text: Option<String>,
  ) {
    let end = start + 1;
    let props = Rc::new(leaf_props(cost, text, semantic));
    let node = forest.intern_terminal_leaf(Term::Terminal(tid), start as u32, 1, end, props);
    matches_by_end[end].push(TerminalMatch { start, end, node });
  }

  /// Step 4: for every single-token match, add a subnode extending its span
  /// backward over any deletable run immediately preceding its start, and —
  /// only when the run reaches end of input — forward over a trailing
  /// deletable run too.
  fn apply_deletion_expansions(
    &self,
    n: usize,
    deletions: &[Option<Deletion>],
    forest: &mut Forest,
    matches_by_end: &mut [Vec<TerminalMatch>],
  ) {
    let base_matches: Vec<(usize, TerminalMatch)> = matches_by_end
      .iter()
      .enumerate()
      .flat_map(|(end, ms)| ms.iter().map(move |m| (end, TerminalMatch { start: m.start, end: m.end, node: m.node })))
      .collect();

    let mut extra: Vec<(usize, TerminalMatch)> = Vec::new();

    for (end, m) in &base_matches {
      let term = forest.nodes.get(m.node).symbol;
      let base_props = forest_terminal_props(forest, m.node);

      if let Some((run_start, cost)) = run_ending_at(deletions, m.start) {
        let new_start = run_start;
        let new_size = (*end - new_start) as u32;
        let props = Rc::new(extend_cost(&base_props, cost));
        let node = forest.intern_terminal_leaf(term, new_start as u32, new_size, *end, props);
        extra.push((*end, TerminalMatch { start: new_start, end: *end, node }));
      }

      if *end < n {
        if let Some(trailing) = &deletions.get(*end).and_then(|d| d.as_ref()) {
          if end + trailing.length == n {
            let new_size = (end + trailing.length - m.start) as u32;
            let props = Rc::new(extend_cost(&base_props, trailing.cost));
            let node = forest.intern_terminal_leaf(term, m.start as u32, new_size, n, props);
            extra.push((n, TerminalMatch { start: m.start, end: n, node }));
          }
        }
      }
    }

    for (end, m) in extra {
      matches_by_end[end].push(m);
    }
  }
}

fn forest_terminal_props(forest: &Forest, node: crate::forest::NodeId) -> RuleProps {
  match &forest.nodes.get(node).subs[0] {
    crate::forest::Sub::Terminal { props } => (**props).clone(),
    _ => unreachable!("terminal leaf node must carry a Terminal subnode"),
  }
}

fn extend_cost(base: &RuleProps, added: f32) -> RuleProps {
  let mut next = base.clone();
  next.cost += added;
  next
}

fn leaf_props(cost: f32, text: Option<String>, semantic: Option<Rc<crate::semantic::SemanticArray>>) -> RuleProps {
  let is_placeholder = semantic.is_some();
  RuleProps {
    cost,
    semantic,
    semantic_is_reduced: true,
    inserted_semantic: None,
    inserted_sym_idx: None,
    text: text.map(|t| vec![crate::grammar::TextPiece::Literal(t)]),
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
    is_placeholder,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::EntityIndex;
  use crate::grammar::EntityRecord;
  use crate::lib::base::HashSet;

  #[test]
  fn tokenizer_lowercases_and_strips_trailing_punctuation() {
    assert_eq!(tokenize("People I Follow."), vec!["people", "i", "follow"]);
  }

  #[test]
  fn tokenizer_collapses_whitespace_runs() {
    assert_eq!(tokenize("  a   b  "), vec!["a", "b"]);
  }

  #[test]
  fn cleans_hex_and_float_tokens() {
    assert_eq!(clean_numeric("0x10"), Some((16, "16".to_string())));
    assert_eq!(clean_numeric("2.7"), Some((3, "3".to_string())));
    assert_eq!(clean_numeric("02"), Some((2, "2".to_string())));
  }

  #[test]
  fn entity_match_can_span_a_deleted_token() {
    let mut deletables = HashSet::default();
    deletables.insert("and".to_string());
    let grammar = GrammarDoc {
      rule_sets: vec![],
      semantics: vec![],
      entity_sets: vec![(
        "person".to_string(),
        vec![EntityRecord { id: 1, category: "person".to_string(), tokens: vec!["jeb".to_string(), "bush".to_string()], text: "Jeb Bush".to_string(), size: 1, anaphora_person_number: None }],
      )],
      int_symbols: vec![],
      deletables,
      start_symbol: "start".to_string(),
      blank_symbol: "blank".to_string(),
    };
    let entities = EntityIndex::build(&grammar);
    let matcher = TerminalMatcher::new(&grammar, &entities);
    let tokens = tokenize("jeb and bush");
    let mut symbols = SymbolTable::new();
    symbols.intern_terminal("person", TerminalKind::EntityCategory);
    let mut semantics = SemanticInterner::new();
    let mut forest = Forest::new(tokens.len());
    let outcome = matcher.run(&tokens, &mut forest, &mut symbols, &mut semantics, None);
    let merged = outcome.matches_by_end[3].iter().find(|m| m.start == 0 && m.end == 3);
    assert!(merged.is_some());
  }
}
