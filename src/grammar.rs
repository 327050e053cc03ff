//! The grammar model (SPEC_FULL.md §3, §6.1): the finalised, immutable
//! document the core consumes. Authoring (parsing a textual grammar DSL into
//! this shape, the way the teacher's `nlu::fantasy::parse` turns `.gr` text
//! into an AST) is out of scope; callers construct a `GrammarDoc` directly,
//! typically by deserialising a compiled artifact produced by that external
//! front end.

use crate::lib::base::HashSet;
use crate::semantic::SemanticArray;
use std::rc::Rc;

/// First/third singular or plural, the three person-number contexts the
/// spec's conjugation resolution switches on (SPEC_FULL.md §4.6).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PersonNumber {
  FirstSingular,
  ThirdSingular,
  Plural,
}

/// Per-rhs-index conjugation directives (SPEC_FULL.md §3).
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct GramProps {
  pub form: Option<String>,
  pub accepted_tense: Option<String>,
}

/// A single grammatically-varying slot of display text, resolved by
/// `pfsearch`'s conjugation step against the active tense/form/person-number
/// context (SPEC_FULL.md §4.6).
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Conjugation {
  pub by_tense: Vec<(String, String)>,
  pub by_form: Vec<(String, String)>,
  pub by_person_number: Vec<(PersonNumber, String)>,
  pub default: Option<String>,
}

impl Conjugation {
  pub fn resolve(&self, tense: Option<&str>, form: Option<&str>, person_number: Option<PersonNumber>) -> Option<&str> {
    if let Some(tense) = tense {
      if let Some((_, text)) = self.by_tense.iter().find(|(t, _)| t == tense) {
        return Some(text);
      }
    }
    if let Some(form) = form {
      if let Some((_, text)) = self.by_form.iter().find(|(f, _)| f == form) {
        return Some(text);
      }
    }
    if let Some(pn) = person_number {
      if let Some((_, text)) = self.by_person_number.iter().find(|(p, _)| *p == pn) {
        return Some(text);
      }
    }
    self.default.as_deref()
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TextPiece {
  Literal(String),
  Conjugated(Conjugation),
}

pub type Text = Vec<TextPiece>;

/// A semantic function's definition, as consumed from the grammar document
/// (SPEC_FULL.md §6.1 `semantics` map); interned into `semantic::Func` by the
/// state-table builder.
pub struct SemanticFuncSpec {
  pub cost: f32,
  pub min_arity: u8,
  pub max_arity: u8,
  pub unique: bool,
  pub is_negation: bool,
}

pub struct IntSymbol {
  pub name: String,
  pub min: i64,
  pub max: i64,
}

/// `{ id, category, tokens, surface text, size, anaphoraPersonNumber }`
/// (SPEC_FULL.md §3). Several records may share an `id` when an entity has
/// multiple aliases.
pub struct EntityRecord {
  pub id: u32,
  pub category: String,
  pub tokens: Vec<String>,
  pub text: String,
  pub size: usize,
  pub anaphora_person_number: Option<PersonNumber>,
}

/// An authored rule, keyed implicitly by the `rule_sets` map it lives under
/// (its lhs name). Matches every annotation enumerated in SPEC_FULL.md §3.
pub struct GrammarRule {
  pub rhs: Vec<String>,
  pub is_terminal: bool,
  pub is_placeholder: bool,
  pub cost: f32,
  pub semantic: Option<Rc<SemanticArray>>,
  pub semantic_is_reduced: bool,
  pub inserted_semantic: Option<Rc<SemanticArray>>,
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
}

impl GrammarRule {
  pub fn terminal(rhs: &str, cost: f32) -> Self {
    GrammarRule {
      rhs: vec![rhs.to_string()],
      is_terminal: true,
      is_placeholder: false,
      cost,
      semantic: None,
      semantic_is_reduced: false,
      inserted_semantic: None,
      inserted_sym_idx: None,
      text: None,
      gram_props: vec![None],
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
    }
  }

  pub fn nonterminal(rhs: Vec<&str>, cost: f32) -> Self {
    let n = rhs.len();
    GrammarRule {
      rhs: rhs.into_iter().map(|x| x.to_string()).collect(),
      is_terminal: false,
      is_placeholder: false,
      cost,
      semantic: None,
      semantic_is_reduced: false,
      inserted_semantic: None,
      inserted_sym_idx: None,
      text: None,
      gram_props: vec![None; n],
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
    }
  }

  pub fn with_semantic(mut self, semantic: Rc<SemanticArray>, reduced: bool) -> Self {
    self.semantic = Some(semantic);
    self.semantic_is_reduced = reduced;
    self
  }

  pub fn with_text(mut self, text: Text) -> Self {
    self.text = Some(text);
    self
  }
}

/// The finalised grammar document (SPEC_FULL.md §6.1): everything the
/// state-table builder needs, with authoring concerns already resolved.
pub struct GrammarDoc {
  pub rule_sets: Vec<(String, Vec<GrammarRule>)>,
  pub semantics: Vec<(String, SemanticFuncSpec)>,
  pub entity_sets: Vec<(String, Vec<EntityRecord>)>,
  pub int_symbols: Vec<IntSymbol>,
  pub deletables: HashSet<String>,
  pub start_symbol: String,
  pub blank_symbol: String,
}

impl GrammarDoc {
  pub fn rules_for(&self, lhs: &str) -> Option<&[GrammarRule]> {
    self.rule_sets.iter().find(|(name, _)| name == lhs).map(|(_, rules)| rules.as_slice())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn conjugation_prefers_tense_then_form_then_person_number() {
    let conj = Conjugation {
      by_tense: vec![("past".to_string(), "followed".to_string())],
      by_form: vec![("infinitive".to_string(), "follow".to_string())],
      by_person_number: vec![(PersonNumber::ThirdSingular, "follows".to_string())],
      default: Some("follow".to_string()),
    };
    assert_eq!(conj.resolve(Some("past"), Some("infinitive"), None), Some("followed"));
    assert_eq!(conj.resolve(None, Some("infinitive"), Some(PersonNumber::ThirdSingular)), Some("follow"));
    assert_eq!(conj.resolve(None, None, Some(PersonNumber::ThirdSingular)), Some("follows"));
    assert_eq!(conj.resolve(None, None, None), Some("follow"));
  }
}
