// A small hash-consing table. Grammar symbol names and semantic trees are
// both "intern once at load time, then compare by identity forever after"
// structures (see SPEC_FULL.md §4.1, §9), so this module factors out the
// common thread-local table-of-interned-values pattern.
//
// Unlike a process-global interner, each `Interner<T>` instance owns its own
// table, so a grammar's semantic interner and a second grammar's semantic
// interner in the same process don't collide.

use super::base::HashMap;
use std::rc::Rc;

pub struct Interner<T: Eq + std::hash::Hash> {
  by_value: HashMap<Rc<T>, Rc<T>>,
}

impl<T: Eq + std::hash::Hash> Interner<T> {
  pub fn new() -> Self {
    Self { by_value: HashMap::default() }
  }

  /// Returns the canonical `Rc<T>` for `value`: an existing one if an equal
  /// value was interned before, or `value` itself (newly owned) otherwise.
  pub fn intern(&mut self, value: T) -> Rc<T> {
    let value = Rc::new(value);
    if let Some(existing) = self.by_value.get(&value) {
      return Rc::clone(existing);
    }
    self.by_value.insert(Rc::clone(&value), Rc::clone(&value));
    value
  }

  pub fn len(&self) -> usize {
    self.by_value.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_value.is_empty()
  }
}

impl<T: Eq + std::hash::Hash> Default for Interner<T> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn equal_values_intern_to_the_same_pointer() {
    let mut interner: Interner<String> = Interner::new();
    let a = interner.intern("follow".to_string());
    let b = interner.intern("follow".to_string());
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(interner.len(), 1);
  }

  #[test]
  fn distinct_values_intern_separately() {
    let mut interner: Interner<String> = Interner::new();
    let a = interner.intern("follow".to_string());
    let b = interner.intern("followers".to_string());
    assert!(!Rc::ptr_eq(&a, &b));
    assert_eq!(interner.len(), 2);
  }
}
