//! State-table construction (SPEC_FULL.md §4.2): compile a `GrammarDoc` into
//! a shift-reduce (LR(0)-style) automaton the forest builder can drive one
//! token at a time.

use crate::grammar::{GramProps, GrammarDoc, GrammarRule, PersonNumber, Text};
use crate::lib::base::{GrammarError, HashMap, Result};
use crate::semantic::{Func, SemanticArray, SemanticInterner, SemanticNode};
use crate::symbol::{NonterminalId, SymbolTable, Term, TerminalId, TerminalKind};
use std::collections::BTreeSet;
use std::rc::Rc;

/// The compact, parser-facing projection of a `GrammarRule`: every authoring
/// annotation the forest builder or `pfsearch` actually consumes, with the
/// authoring-only `rhs`/`is_terminal` fields stripped (SPEC_FULL.md §4.2
/// step 2).
#[derive(Debug, Clone)]
pub struct RuleProps {
  pub cost: f32,
  pub semantic: Option<Rc<crate::semantic::SemanticArray>>,
  pub semantic_is_reduced: bool,
  pub inserted_semantic: Option<Rc<crate::semantic::SemanticArray>>,
  pub inserted_sym_idx: Option<u8>,
  pub text: Option<Text>,
  pub gram_props: Vec<Option<GramProps>>,
  pub person_number: Option<PersonNumber>,
  pub anaphora_person_number: Option<PersonNumber>,
  pub is_transposition: bool,
  pub tense: Option<String>,
  pub rhs_can_produce_semantic: bool,
  pub second_rhs_can_produce_semantic: bool,
  pub rhs_does_not_produce_text: bool,
  pub is_term_sequence: bool,
  pub rhs_term_sequence_indexes: Vec<u8>,
  pub rhs_no_text_indexes: Vec<u8>,
  pub is_placeholder: bool,
}

impl RuleProps {
  fn from_authored(rule: &GrammarRule) -> Self {
    RuleProps {
      cost: rule.cost,
      semantic: rule.semantic.clone(),
      semantic_is_reduced: rule.semantic_is_reduced,
      inserted_semantic: rule.inserted_semantic.clone(),
      inserted_sym_idx: rule.inserted_sym_idx,
      text: rule.text.clone(),
      gram_props: rule.gram_props.clone(),
      person_number: rule.person_number,
      anaphora_person_number: rule.anaphora_person_number,
      is_transposition: rule.is_transposition,
      tense: rule.tense.clone(),
      rhs_can_produce_semantic: rule.rhs_can_produce_semantic,
      second_rhs_can_produce_semantic: rule.second_rhs_can_produce_semantic,
      rhs_does_not_produce_text: rule.rhs_does_not_produce_text,
      is_term_sequence: rule.is_term_sequence,
      rhs_term_sequence_indexes: rule.rhs_term_sequence_indexes.clone(),
      rhs_no_text_indexes: rule.rhs_no_text_indexes.clone(),
      is_placeholder: rule.is_placeholder,
    }
  }
}

/// Two or more insertion rules sharing lhs and non-inserted rhs collapse to
/// one shift-reduce action; the packed list is sorted ascending by cost and
/// its minimum cached so the heuristic pre-pass never has to re-scan it.
pub struct PackedRuleProps {
  pub props: Vec<Rc<RuleProps>>,
  pub min_cost: f32,
}

#[derive(Clone)]
pub enum Reduction {
  Single(Rc<RuleProps>),
  Packed(Rc<PackedRuleProps>),
}

impl Reduction {
  pub fn min_cost(&self) -> f32 {
    match self {
      Reduction::Single(p) => p.cost,
      Reduction::Packed(p) => p.min_cost,
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StateId(pub u32);

pub struct StateReduction {
  pub lhs: NonterminalId,
  pub rhs_len: u8,
  pub is_binary: bool,
  pub reduction: Reduction,
}

#[derive(Default)]
pub struct State {
  pub reductions: Vec<StateReduction>,
  pub shifts: HashMap<Term, StateId>,
  pub accepting: bool,
}

pub struct StateTable {
  states: Vec<State>,
  start_state: StateId,
  pub start_symbol: NonterminalId,
  pub blank_terminal: TerminalId,
}

impl StateTable {
  pub fn state(&self, id: StateId) -> &State {
    &self.states[id.0 as usize]
  }

  pub fn start_state(&self) -> StateId {
    self.start_state
  }

  pub fn len(&self) -> usize {
    self.states.len()
  }
}

/// A grammar rule reduced to its shift-reduce shape: lhs plus the sequence
/// of terms consumed to recognise it. `rhs` has already had any inserted
/// position removed, since an inserted child is never present in the input
/// stream the forest builder walks.
struct CompiledRule {
  lhs: NonterminalId,
  rhs: Vec<Term>,
  reduction: Reduction,
}

pub fn build(grammar: &GrammarDoc, symbols: &mut SymbolTable) -> Result<StateTable> {
  for (name, _) in &grammar.rule_sets {
    symbols.intern_nonterminal(name);
  }
  let start_symbol = symbols
    .lookup_nonterminal(&grammar.start_symbol)
    .map_err(|_| GrammarError::MissingStartSymbol(grammar.start_symbol.clone()))?;
  let blank_terminal = symbols.intern_terminal(&grammar.blank_symbol, TerminalKind::Blank);

  // Intern each grammar-declared semantic function once so rules that name
  // the same function by name share one `Rc<Func>` (SPEC_FULL.md §4.1).
  let funcs: HashMap<String, Rc<Func>> = grammar
    .semantics
    .iter()
    .map(|(name, spec)| {
      (
        name.clone(),
        Rc::new(Func { name: Rc::from(name.as_str()), cost: spec.cost, min_arity: spec.min_arity, max_arity: spec.max_arity, unique: spec.unique, is_negation: spec.is_negation }),
      )
    })
    .collect();
  let mut build_interner = SemanticInterner::new();

  let compiled = compile_rules(grammar, symbols, &funcs, &mut build_interner)?;
  let rules_by_lhs = index_by_lhs(&compiled);

  let start_items = closure(initial_items(start_symbol, &rules_by_lhs), &compiled, &rules_by_lhs);
  let mut states: Vec<State> = Vec::new();
  let mut index_of: HashMap<Vec<(usize, usize)>, StateId> = HashMap::default();
  let mut worklist: Vec<(StateId, BTreeSet<(usize, usize)>)> = Vec::new();

  let start_key = canonical_key(&start_items);
  let start_state = StateId(0);
  index_of.insert(start_key, start_state);
  states.push(State::default());
  worklist.push((start_state, start_items));

  while let Some((state_id, items)) = worklist.pop() {
    let mut by_term: HashMap<Term, BTreeSet<(usize, usize)>> = HashMap::default();
    let mut reductions = Vec::new();

    for &(rule_idx, dot) in &items {
      let rule = &compiled[rule_idx];
      if dot < rule.rhs.len() {
        by_term.entry(rule.rhs[dot]).or_default().insert((rule_idx, dot + 1));
      } else {
        reductions.push(StateReduction {
          lhs: rule.lhs,
          rhs_len: rule.rhs.len() as u8,
          is_binary: rule.rhs.len() == 2,
          reduction: rule.reduction.clone(),
        });
      }
    }

    let mut shifts = HashMap::default();
    for (term, kernel) in by_term {
      let goto_items = closure(kernel, &compiled, &rules_by_lhs);
      let key = canonical_key(&goto_items);
      let dest = if let Some(&existing) = index_of.get(&key) {
        existing
      } else {
        let id = StateId(states.len() as u32);
        index_of.insert(key, id);
        states.push(State::default());
        worklist.push((id, goto_items));
        id
      };
      shifts.insert(term, dest);
    }

    let accepting = reductions.iter().any(|r| r.lhs == start_symbol);
    states[state_id.0 as usize] = State { reductions, shifts, accepting };
  }

  Ok(StateTable { states, start_state, start_symbol, blank_terminal })
}

fn initial_items(start_symbol: NonterminalId, rules_by_lhs: &HashMap<NonterminalId, Vec<usize>>) -> BTreeSet<(usize, usize)> {
  rules_by_lhs.get(&start_symbol).into_iter().flatten().map(|&r| (r, 0)).collect()
}

fn closure(
  mut items: BTreeSet<(usize, usize)>,
  rules: &[CompiledRule],
  rules_by_lhs: &HashMap<NonterminalId, Vec<usize>>,
) -> BTreeSet<(usize, usize)> {
  let mut changed = true;
  while changed {
    changed = false;
    let snapshot: Vec<_> = items.iter().cloned().collect();
    for (rule_idx, dot) in snapshot {
      let rule = &rules[rule_idx];
      if dot < rule.rhs.len() {
        if let Term::Symbol(nt) = rule.rhs[dot] {
          for &next in rules_by_lhs.get(&nt).into_iter().flatten() {
            if items.insert((next, 0)) {
              changed = true;
            }
          }
        }
      }
    }
  }
  items
}

fn canonical_key(items: &BTreeSet<(usize, usize)>) -> Vec<(usize, usize)> {
  items.iter().cloned().collect()
}

fn index_by_lhs(compiled: &[CompiledRule]) -> HashMap<NonterminalId, Vec<usize>> {
  let mut map: HashMap<NonterminalId, Vec<usize>> = HashMap::default();
  for (idx, rule) in compiled.iter().enumerate() {
    map.entry(rule.lhs).or_default().push(idx);
  }
  map
}

fn terminal_kind_for(name: &str, grammar: &GrammarDoc, is_placeholder: bool) -> TerminalKind {
  if name == grammar.blank_symbol {
    TerminalKind::Blank
  } else if grammar.int_symbols.iter().any(|sym| sym.name == name) {
    TerminalKind::Integer
  } else if is_placeholder {
    TerminalKind::EntityCategory
  } else {
    TerminalKind::Literal
  }
}

fn compile_rules(
  grammar: &GrammarDoc,
  symbols: &mut SymbolTable,
  funcs: &HashMap<String, Rc<Func>>,
  interner: &mut SemanticInterner,
) -> Result<Vec<CompiledRule>> {
  let mut singles: Vec<CompiledRule> = Vec::new();
  // Grouped by (lhs, effective rhs terms) so insertion rules sharing a
  // non-inserted child collapse into one packed action.
  let mut packed_groups: HashMap<(NonterminalId, Vec<Term>), Vec<Rc<RuleProps>>> = HashMap::default();
  let mut packed_order: Vec<(NonterminalId, Vec<Term>)> = Vec::new();

  for (lhs_name, rules) in &grammar.rule_sets {
    let lhs = symbols.intern_nonterminal(lhs_name);
    for rule in rules {
      if rule.rhs.is_empty() {
        return Err(GrammarError::EmptyRhs { lhs: lhs_name.clone() }.into());
      }
      if !rule.is_terminal && rule.rhs.len() > 2 {
        return Err(GrammarError::RhsTooLong { lhs: lhs_name.clone(), len: rule.rhs.len() }.into());
      }
      if rule.inserted_sym_idx.is_some() && rule.text.is_none() {
        return Err(GrammarError::InsertionWithoutText {
          lhs: lhs_name.clone(),
          idx: rule.inserted_sym_idx.unwrap() as usize,
        }
        .into());
      }

      let terms: Vec<Term> = if rule.is_terminal {
        let kind = terminal_kind_for(&rule.rhs[0], grammar, rule.is_placeholder);
        vec![Term::Terminal(symbols.intern_terminal(&rule.rhs[0], kind))]
      } else {
        rule.rhs.iter().map(|name| Term::Symbol(symbols.intern_nonterminal(name))).collect()
      };

      let effective_terms: Vec<Term> = match rule.inserted_sym_idx {
        Some(idx) => terms.iter().enumerate().filter(|(i, _)| *i != idx as usize).map(|(_, t)| *t).collect(),
        None => terms.clone(),
      };

      let props = Rc::new(canonicalize_rule_props(RuleProps::from_authored(rule), funcs, interner));

      if rule.inserted_sym_idx.is_some() {
        let key = (lhs, effective_terms.clone());
        if !packed_groups.contains_key(&key) {
          packed_order.push(key.clone());
        }
        packed_groups.entry(key).or_default().push(props);
      } else {
        singles.push(CompiledRule { lhs, rhs: effective_terms, reduction: Reduction::Single(props) });
      }
    }
  }

  for key in packed_order {
    let mut props = packed_groups.remove(&key).unwrap();
    props.sort_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal));
    let min_cost = props.first().map(|p| p.cost).unwrap_or(0.0);
    let (lhs, rhs) = key;
    singles.push(CompiledRule { lhs, rhs, reduction: Reduction::Packed(Rc::new(PackedRuleProps { props, min_cost })) });
  }

  if !grammar.rule_sets.iter().any(|(name, _)| name == &grammar.start_symbol) {
    return Err(GrammarError::MissingStartSymbol(grammar.start_symbol.clone()).into());
  }

  Ok(singles)
}

/// Rewrites every `Rc<Func>` embedded in a rule's semantic arrays to the
/// grammar's canonical instance for that name, so two rules naming the same
/// function end up sharing one `Func` object (SPEC_FULL.md §4.1).
fn canonicalize_rule_props(mut props: RuleProps, funcs: &HashMap<String, Rc<Func>>, interner: &mut SemanticInterner) -> RuleProps {
  props.semantic = props.semantic.as_ref().map(|array| canonicalize_semantic(array, funcs, interner));
  props.inserted_semantic = props.inserted_semantic.as_ref().map(|array| canonicalize_semantic(array, funcs, interner));
  props
}

fn canonicalize_semantic(array: &Rc<SemanticArray>, funcs: &HashMap<String, Rc<Func>>, interner: &mut SemanticInterner) -> Rc<SemanticArray> {
  let nodes: Vec<SemanticNode> = array.0.iter().map(|node| canonicalize_node(node, funcs, interner)).collect();
  interner.intern_array(nodes)
}

fn canonicalize_node(node: &SemanticNode, funcs: &HashMap<String, Rc<Func>>, interner: &mut SemanticInterner) -> SemanticNode {
  match node {
    SemanticNode::Leaf(arg) => SemanticNode::Leaf(*arg),
    SemanticNode::Apply(f, children) => {
      let canonical = funcs.get(f.name.as_ref()).cloned().unwrap_or_else(|| Rc::clone(f));
      SemanticNode::Apply(canonical, canonicalize_semantic(children, funcs, interner))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::IntSymbol;
  use crate::lib::base::HashSet;

  fn tiny_grammar() -> GrammarDoc {
    // start -> greeting ; greeting -> "hello" "world"
    GrammarDoc {
      rule_sets: vec![
        ("start".to_string(), vec![GrammarRule::nonterminal(vec!["greeting"], 0.0)]),
        (
          "greeting".to_string(),
          vec![GrammarRule::nonterminal(vec!["hello", "world"], 0.0)],
        ),
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
  fn builds_a_state_for_every_reachable_item_set() {
    let grammar = tiny_grammar();
    let mut symbols = SymbolTable::new();
    let table = build(&grammar, &mut symbols).unwrap();
    assert!(table.len() >= 4);
    assert!(table.state(table.start_state()).shifts.len() >= 1);
  }

  #[test]
  fn accepting_state_is_reachable_by_shifting_the_start_symbol() {
    let grammar = tiny_grammar();
    let mut symbols = SymbolTable::new();
    let table = build(&grammar, &mut symbols).unwrap();
    let greeting = symbols.lookup_nonterminal("greeting").unwrap();
    let dest = *table.state(table.start_state()).shifts.get(&Term::Symbol(greeting)).unwrap();
    assert!(table.state(dest).accepting);
  }

  #[test]
  fn missing_start_symbol_is_a_grammar_error() {
    let mut grammar = tiny_grammar();
    grammar.start_symbol = "nope".to_string();
    let mut symbols = SymbolTable::new();
    assert!(build(&grammar, &mut symbols).is_err());
  }

  #[test]
  fn rules_naming_the_same_function_share_one_interned_func() {
    use crate::grammar::SemanticFuncSpec;
    use crate::semantic::{Arg, SemanticArray, SemanticNode};

    let distinct_wrap = |name: &str| Rc::new(Func { name: Rc::from(name), cost: 0.0, min_arity: 1, max_arity: 1, unique: false, is_negation: false });
    let semantic_a = Rc::new(SemanticArray(vec![SemanticNode::Apply(distinct_wrap("wrap"), Rc::new(SemanticArray(vec![SemanticNode::Leaf(Arg::Entity(1))])))]));
    let semantic_b = Rc::new(SemanticArray(vec![SemanticNode::Apply(distinct_wrap("wrap"), Rc::new(SemanticArray(vec![SemanticNode::Leaf(Arg::Entity(2))])))]));
    assert!(!Rc::ptr_eq(
      match &semantic_a.0[0] {
        SemanticNode::Apply(f, _) => f,
        _ => unreachable!(),
      },
      match &semantic_b.0[0] {
        SemanticNode::Apply(f, _) => f,
        _ => unreachable!(),
      },
    ));

    let mut grammar = tiny_grammar();
    grammar.semantics = vec![("wrap".to_string(), SemanticFuncSpec { cost: 0.0, min_arity: 1, max_arity: 1, unique: false, is_negation: false })];
    grammar.rule_sets.push(("a".to_string(), vec![GrammarRule::terminal("a", 0.0).with_semantic(semantic_a, true)]));
    grammar.rule_sets.push(("b".to_string(), vec![GrammarRule::terminal("b", 0.0).with_semantic(semantic_b, true)]));

    let mut symbols = SymbolTable::new();
    let funcs: HashMap<String, Rc<Func>> = grammar
      .semantics
      .iter()
      .map(|(name, spec)| (name.clone(), Rc::new(Func { name: Rc::from(name.as_str()), cost: spec.cost, min_arity: spec.min_arity, max_arity: spec.max_arity, unique: spec.unique, is_negation: spec.is_negation })))
      .collect();
    let mut interner = SemanticInterner::new();
    let compiled = compile_rules(&grammar, &mut symbols, &funcs, &mut interner).unwrap();

    let extract_func = |rule: &CompiledRule| -> Rc<Func> {
      let props = match &rule.reduction {
        Reduction::Single(p) => p,
        Reduction::Packed(p) => p.props.first().unwrap(),
      };
      match &props.semantic.as_ref().unwrap().0[0] {
        SemanticNode::Apply(f, _) => Rc::clone(f),
        _ => unreachable!(),
      }
    };

    let rule_a = compiled.iter().find(|r| r.lhs == symbols.lookup_nonterminal("a").unwrap()).unwrap();
    let rule_b = compiled.iter().find(|r| r.lhs == symbols.lookup_nonterminal("b").unwrap()).unwrap();
    assert!(Rc::ptr_eq(&extract_func(rule_a), &extract_func(rule_b)));
  }
}
