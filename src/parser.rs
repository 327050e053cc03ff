//! Parser facade (SPEC_FULL.md §4.7): a thin orchestrator over the state
//! table, terminal matcher, forest builder, heuristic pre-pass, and
//! `pfsearch`, analogous to the teacher's `Parser`/`Corrector` split.

use crate::entity::EntityIndex;
use crate::forest::{Forest, ForestOutcome, TerminalMatch};
use crate::grammar::GrammarDoc;
use crate::heuristic;
use crate::pfsearch::{self, SearchConfig};
use crate::semantic::SemanticInterner;
use crate::state_table::{self, StateTable};
use crate::symbol::SymbolTable;
use crate::terminal_matcher::{tokenize, TerminalMatcher};
use log::{debug, warn};

/// Search-breadth knobs a caller can tune per parse (SPEC_FULL.md §10.3),
/// mirroring the teacher's `Parser::set_skip_count`/`set_skip_penalty`
/// builder-style configuration.
#[derive(Clone, Copy, Debug)]
pub struct ParseLimits {
  pub max_paths: usize,
  pub k: usize,
  pub fallback_deletion_base_cost: f32,
  pub fallback_deletion_cost_step: f32,
}

impl Default for ParseLimits {
  fn default() -> Self {
    ParseLimits { max_paths: 10_000, k: 5, fallback_deletion_base_cost: 10.0, fallback_deletion_cost_step: 0.01 }
  }
}

pub struct ParsedTree {
  pub text: String,
  pub semantic: std::rc::Rc<crate::semantic::SemanticArray>,
  pub cost: f32,
}

/// `{ trees?, path_count, ambiguous_tree_count, failed_init_start_sym,
/// failed_init_legal_trees }` (SPEC_FULL.md §6.2).
pub struct ParseResult {
  pub trees: Vec<ParsedTree>,
  pub path_count: usize,
  pub ambiguous_tree_count: usize,
  pub failed_init_start_sym: bool,
  pub failed_init_legal_trees: bool,
  pub truncated: bool,
}

/// Owns the immutable, shareable compiled grammar: a `StateTable` plus the
/// symbol table and entity index it was built against. Multiple `Parser`
/// instances may share one `Grammar` across threads (SPEC_FULL.md §5).
pub struct Grammar {
  doc: GrammarDoc,
  symbols: SymbolTable,
  table: StateTable,
  entities: EntityIndex,
}

impl Grammar {
  pub fn compile(doc: GrammarDoc) -> crate::lib::base::Result<Self> {
    let mut symbols = SymbolTable::new();
    let table = state_table::build(&doc, &mut symbols)?;
    debug!("state table built: {} symbols, {} states", symbols.nonterminal_count() + symbols.terminal_count(), table.len());
    let entities = EntityIndex::build(&doc);
    Ok(Grammar { doc, symbols, table, entities })
  }
}

/// Per-parse mutable state: a fresh `Parser` is created for each concurrent
/// query sharing a `Grammar` (SPEC_FULL.md §5).
pub struct Parser<'g> {
  grammar: &'g Grammar,
  limits: ParseLimits,
}

impl<'g> Parser<'g> {
  pub fn new(grammar: &'g Grammar, limits: ParseLimits) -> Self {
    Parser { grammar, limits }
  }

  pub fn parse(&self, query: &str) -> ParseResult {
    let tokens = tokenize(query);
    let mut symbols = clone_lookup_symbols(&self.grammar.symbols);
    let mut semantics = SemanticInterner::new();
    let mut forest = Forest::new(tokens.len());

    let attempt = self.attempt(&tokens, &mut forest, &mut symbols, &mut semantics, false);
    match attempt {
      Attempt::NoStartSymbol => {
        warn!("initial parse reached no start symbol, triggering fallback reparse");
        self.retry_with_fallback(&tokens, &mut forest, &mut symbols, &mut semantics)
      }
      Attempt::Trees(result) if result.trees.is_empty() => {
        warn!("initial parse produced no legal trees, triggering fallback reparse");
        self.retry_with_fallback(&tokens, &mut forest, &mut symbols, &mut semantics)
      }
      Attempt::Trees(result) => into_parse_result(result, false, false),
    }
  }

  /// Runs the terminal matcher, forest builder, heuristic pre-pass, and
  /// `pfsearch` once against the current forest/symbol/semantic state.
  fn attempt(&self, tokens: &[String], forest: &mut Forest, symbols: &mut SymbolTable, semantics: &mut SemanticInterner, fallback: bool) -> Attempt {
    let matcher = TerminalMatcher::new(&self.grammar.doc, &self.grammar.entities);
    let fallback_extra_cost =
      fallback.then(|| self.limits.fallback_deletion_base_cost + self.limits.fallback_deletion_cost_step * tokens.len() as f32);
    let outcome = matcher.run(tokens, forest, symbols, semantics, fallback_extra_cost);
    debug!(
      "terminal matcher finished: {} tokens, {} matches, fallback={}",
      tokens.len(),
      outcome.matches_by_end.iter().map(Vec::len).sum::<usize>(),
      fallback
    );

    let forest_outcome = forest.run(&self.grammar.table, tokens.len(), |index| {
      outcome.matches_by_end[index].iter().map(|m| TerminalMatch { start: m.start, end: m.end, node: m.node }).collect()
    });

    let root = match forest_outcome {
      ForestOutcome::ReachedNoStartSymbol => return Attempt::NoStartSymbol,
      ForestOutcome::Root(root) => root,
    };

    heuristic::compute_min_costs(forest);
    let flattened = heuristic::flatten_term_sequences(forest);
    let result = pfsearch::search(forest, root, semantics, &flattened, &SearchConfig { k: self.limits.k, max_paths: self.limits.max_paths });
    Attempt::Trees(result)
  }

  fn retry_with_fallback(&self, tokens: &[String], forest: &mut Forest, symbols: &mut SymbolTable, semantics: &mut SemanticInterner) -> ParseResult {
    forest.reset_stack_for_fallback();
    match self.attempt(tokens, forest, symbols, semantics, true) {
      Attempt::NoStartSymbol => {
        warn!("fallback reparse also reached no start symbol");
        empty_result(true, false)
      }
      Attempt::Trees(result) if result.trees.is_empty() => {
        warn!("fallback reparse produced no legal trees");
        empty_result(false, true)
      }
      Attempt::Trees(result) => into_parse_result(result, false, false),
    }
  }
}

enum Attempt {
  NoStartSymbol,
  Trees(pfsearch::SearchResult),
}

fn empty_result(failed_init_start_sym: bool, failed_init_legal_trees: bool) -> ParseResult {
  ParseResult { trees: vec![], path_count: 0, ambiguous_tree_count: 0, failed_init_start_sym, failed_init_legal_trees, truncated: false }
}

fn into_parse_result(result: pfsearch::SearchResult, failed_init_start_sym: bool, failed_init_legal_trees: bool) -> ParseResult {
  ParseResult {
    trees: result.trees.into_iter().map(|t| ParsedTree { text: t.text, semantic: t.semantic, cost: t.cost }).collect(),
    path_count: result.path_count,
    ambiguous_tree_count: result.ambiguous_tree_count,
    failed_init_start_sym,
    failed_init_legal_trees,
    truncated: result.truncated,
  }
}

/// `SymbolTable` is immutable after grammar compilation; the per-query
/// matcher only ever looks names up, never interns new ones, so handing it a
/// fresh lookup-only copy keeps `Grammar` cheaply shareable across parsers
/// without wrapping the table in a lock.
fn clone_lookup_symbols(symbols: &SymbolTable) -> SymbolTable {
  let mut copy = SymbolTable::new();
  for i in 0..symbols.nonterminal_count() {
    let name = &symbols.nonterminal(crate::symbol::NonterminalId(i as u32)).name;
    copy.intern_nonterminal(name);
  }
  for i in 0..symbols.terminal_count() {
    let sym = symbols.terminal(crate::symbol::TerminalId(i as u32));
    copy.intern_terminal(&sym.name, sym.kind.clone());
  }
  copy
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::{GrammarDoc, GrammarRule, IntSymbol, TextPiece};
  use crate::lib::base::HashSet;

  fn tiny_grammar() -> GrammarDoc {
    GrammarDoc {
      rule_sets: vec![
        ("start".to_string(), vec![GrammarRule::nonterminal(vec!["greeting"], 0.0)]),
        ("greeting".to_string(), vec![GrammarRule::nonterminal(vec!["hello", "world"], 0.0).with_text(vec![])]),
        ("hello".to_string(), vec![GrammarRule::terminal("hello", 0.0).with_text(vec![TextPiece::Literal("hello".to_string())])]),
        ("world".to_string(), vec![GrammarRule::terminal("world", 0.0).with_text(vec![TextPiece::Literal("world".to_string())])]),
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
  fn parses_a_recognised_query_without_fallback() {
    let grammar = Grammar::compile(tiny_grammar()).unwrap();
    let parser = Parser::new(&grammar, ParseLimits::default());
    let result = parser.parse("hello world");
    assert!(!result.failed_init_start_sym);
    assert_eq!(result.trees.first().map(|t| t.text.as_str()), Some("hello world"));
  }

  #[test]
  fn unrecognised_query_triggers_fallback_and_still_fails_cleanly() {
    let grammar = Grammar::compile(tiny_grammar()).unwrap();
    let parser = Parser::new(&grammar, ParseLimits::default());
    let result = parser.parse("goodbye");
    assert!(result.failed_init_start_sym || result.failed_init_legal_trees || result.trees.is_empty());
  }
}
