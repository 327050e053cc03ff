//! Entity index (SPEC_FULL.md §3, §4.3): maps input tokens to the entity
//! records that token could be the start of, so the terminal matcher can
//! recognise multi-token entity spans without scanning the whole grammar.

use crate::grammar::{EntityRecord, GrammarDoc};
use crate::lib::base::HashMap;

/// Indexes a grammar's entity sets by their first token, so lookups during
/// tokenisation are O(1) per token rather than O(entities).
pub struct EntityIndex {
  by_first_token: HashMap<String, Vec<EntityRecord>>,
}

impl EntityIndex {
  pub fn build(grammar: &GrammarDoc) -> Self {
    let mut by_first_token: HashMap<String, Vec<EntityRecord>> = HashMap::default();
    for (_, records) in &grammar.entity_sets {
      for record in records {
        if let Some(first) = record.tokens.first() {
          by_first_token.entry(first.clone()).or_default().push(EntityRecord {
            id: record.id,
            category: record.category.clone(),
            tokens: record.tokens.clone(),
            text: record.text.clone(),
            size: record.size,
            anaphora_person_number: record.anaphora_person_number,
          });
        }
      }
    }
    for records in by_first_token.values_mut() {
      // Longest match first: multi-token aliases must be tried before the
      // single-token alias that happens to share their first word.
      records.sort_by(|a, b| b.tokens.len().cmp(&a.tokens.len()));
    }
    EntityIndex { by_first_token }
  }

  /// Entities whose token sequence could begin at `tokens[start..]`, longest
  /// candidate span first.
  pub fn candidates_at<'a>(&'a self, tokens: &[&str], start: usize) -> Vec<&'a EntityRecord> {
    let Some(first) = tokens.get(start) else { return vec![] };
    let Some(candidates) = self.by_first_token.get(*first) else { return vec![] };
    candidates.iter().filter(|record| matches_span(record, tokens, start)).collect()
  }

  /// Multi-token entities whose first token is `tokens[start]`, without
  /// requiring the rest of the entity's tokens to appear contiguously — the
  /// candidate set the gap-tolerant matcher scans for deletion-spanned
  /// entities (SPEC_FULL.md §4.3 step 5).
  pub fn candidates_starting_with<'a>(&'a self, tokens: &[&str], start: usize) -> Vec<&'a EntityRecord> {
    let Some(first) = tokens.get(start) else { return vec![] };
    let Some(candidates) = self.by_first_token.get(*first) else { return vec![] };
    candidates.iter().filter(|record| record.tokens.len() > 1).collect()
  }
}

fn matches_span(record: &EntityRecord, tokens: &[&str], start: usize) -> bool {
  if start + record.tokens.len() > tokens.len() {
    return false;
  }
  record.tokens.iter().enumerate().all(|(i, tok)| tok == tokens[start + i])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::IntSymbol;
  use crate::lib::base::HashSet;

  fn doc_with(entities: Vec<EntityRecord>) -> GrammarDoc {
    GrammarDoc {
      rule_sets: vec![],
      semantics: vec![],
      entity_sets: vec![("person".to_string(), entities)],
      int_symbols: Vec::<IntSymbol>::new(),
      deletables: HashSet::default(),
      start_symbol: "start".to_string(),
      blank_symbol: "blank".to_string(),
    }
  }

  #[test]
  fn longer_alias_is_tried_before_shorter_one_sharing_a_prefix() {
    let doc = doc_with(vec![
      EntityRecord { id: 1, category: "person".to_string(), tokens: vec!["new".to_string()], text: "New".to_string(), size: 1, anaphora_person_number: None },
      EntityRecord { id: 2, category: "place".to_string(), tokens: vec!["new".to_string(), "york".to_string()], text: "New York".to_string(), size: 1, anaphora_person_number: None },
    ]);
    let index = EntityIndex::build(&doc);
    let tokens = ["new", "york", "city"];
    let candidates = index.candidates_at(&tokens, 0);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].tokens.len(), 2);
  }

  #[test]
  fn candidates_starting_with_ignores_single_token_entities() {
    let doc = doc_with(vec![
      EntityRecord { id: 1, category: "person".to_string(), tokens: vec!["jeb".to_string()], text: "Jeb".to_string(), size: 1, anaphora_person_number: None },
      EntityRecord { id: 2, category: "person".to_string(), tokens: vec!["jeb".to_string(), "bush".to_string()], text: "Jeb Bush".to_string(), size: 1, anaphora_person_number: None },
    ]);
    let index = EntityIndex::build(&doc);
    let tokens = ["jeb", "and", "bush"];
    let candidates = index.candidates_starting_with(&tokens, 0);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].tokens, vec!["jeb".to_string(), "bush".to_string()]);
  }

  #[test]
  fn no_candidates_when_token_does_not_start_any_entity() {
    let doc = doc_with(vec![EntityRecord {
      id: 1,
      category: "person".to_string(),
      tokens: vec!["alice".to_string()],
      text: "Alice".to_string(),
      size: 1,
      anaphora_person_number: None,
    }]);
    let index = EntityIndex::build(&doc);
    let tokens = ["bob"];
    assert!(index.candidates_at(&tokens, 0).is_empty());
  }
}
