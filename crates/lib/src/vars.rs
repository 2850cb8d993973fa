//! Scoped task variables.
//!
//! Each scope (root, module, project) owns its own [`TaskVars`], created by
//! cloning the parent's set. Mutating a child never affects its parent or its
//! siblings. Names are case-insensitive; the most recently used spelling is
//! what the task runner sees.

use std::collections::BTreeMap;

/// Case-insensitive variable set handed to the task runner as its environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskVars {
  /// Lowercased name -> (name as set, value).
  vars: BTreeMap<String, (String, String)>,
}

impl TaskVars {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set a variable, replacing any value stored under the same name in any case.
  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    self.vars.insert(name.to_lowercase(), (name, value.into()));
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.get(&name.to_lowercase()).map(|(_, value)| value.as_str())
  }

  pub fn remove(&mut self, name: &str) -> Option<String> {
    self.vars.remove(&name.to_lowercase()).map(|(_, value)| value)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.vars.contains_key(&name.to_lowercase())
  }

  /// Iterate `(name, value)` pairs in case-insensitive name order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.vars.values().map(|(name, value)| (name.as_str(), value.as_str()))
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_ignores_case() {
    let mut vars = TaskVars::new();
    vars.set("MODULE_NAME", "core");

    assert_eq!(vars.get("module_name"), Some("core"));
    assert!(vars.contains("Module_Name"));
  }

  #[test]
  fn set_replaces_other_spellings() {
    let mut vars = TaskVars::new();
    vars.set("Head_Sha", "aaa");
    vars.set("HEAD_SHA", "bbb");

    assert_eq!(vars.len(), 1);
    assert_eq!(vars.iter().collect::<Vec<_>>(), vec![("HEAD_SHA", "bbb")]);
  }

  #[test]
  fn clones_are_independent() {
    let mut root = TaskVars::new();
    root.set("BUILD_DIR", "/b");

    let mut module_a = root.clone();
    let mut module_b = root.clone();
    module_a.set("MODULE_NAME", "a");
    module_b.set("MODULE_NAME", "b");
    module_b.remove("BUILD_DIR");

    assert_eq!(root.get("MODULE_NAME"), None);
    assert_eq!(root.get("BUILD_DIR"), Some("/b"));
    assert_eq!(module_a.get("MODULE_NAME"), Some("a"));
    assert_eq!(module_a.get("BUILD_DIR"), Some("/b"));
    assert_eq!(module_b.get("BUILD_DIR"), None);
  }
}
