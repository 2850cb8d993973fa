//! Dependency closure over modules.
//!
//! Change detection flags modules whose own projects changed. Any module with
//! a project referencing a project of an outdated module is outdated as well,
//! and so on until no module is added. Rebuilds are module-wide: once a module
//! is outdated, every one of its projects counts as outdated for the modules
//! referencing it.

use std::collections::HashSet;

use tracing::info;

/// The reference-relevant view of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectRefs {
  pub name: String,
  /// Names other projects may reference this one by.
  pub aliases: Vec<String>,
  /// Names of projects this one references.
  pub references: Vec<String>,
  /// Whether the project's own sources changed.
  pub changed: bool,
}

/// The reference-relevant view of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDependencies {
  pub module: String,
  pub projects: Vec<ProjectRefs>,
}

impl ModuleDependencies {
  pub fn has_changes(&self) -> bool {
    self.projects.iter().any(|p| p.changed)
  }

  /// References to projects outside this module, in project order.
  pub fn external_references(&self) -> Vec<&str> {
    let own: HashSet<&str> = self
      .projects
      .iter()
      .flat_map(|p| p.aliases.iter().map(String::as_str))
      .collect();

    let mut seen = HashSet::new();
    self
      .projects
      .iter()
      .flat_map(|p| p.references.iter().map(String::as_str))
      .filter(|r| !own.contains(r) && seen.insert(*r))
      .collect()
  }

  /// Names of the projects whose own sources changed.
  pub fn changed_projects(&self) -> Vec<String> {
    self.projects.iter().filter(|p| p.changed).map(|p| p.name.clone()).collect()
  }

  fn changed_project_aliases(&self) -> impl Iterator<Item = &str> {
    self
      .projects
      .iter()
      .filter(|p| p.changed)
      .flat_map(|p| p.aliases.iter().map(String::as_str))
  }

  fn all_project_aliases(&self) -> impl Iterator<Item = &str> {
    self.projects.iter().flat_map(|p| p.aliases.iter().map(String::as_str))
  }
}

/// Why a module is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutdatedReason {
  /// The named projects changed.
  SourceChanged { projects: Vec<String> },
  /// It references projects of outdated modules.
  DependsOnOutdated { references: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedModule {
  pub module: String,
  pub reason: OutdatedReason,
}

/// Modules selected for rebuild in this run, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutdatedSet {
  entries: Vec<OutdatedModule>,
}

impl OutdatedSet {
  /// Expand the directly changed modules to everything that depends on them.
  ///
  /// Terminates on any reference graph, cyclic ones included: every pass
  /// either adds a module from the finite remaining pool or stops.
  pub fn resolve(modules: &[ModuleDependencies]) -> Self {
    let mut outdated: Vec<bool> = modules.iter().map(ModuleDependencies::has_changes).collect();
    let mut entries: Vec<OutdatedModule> = modules
      .iter()
      .filter(|m| m.has_changes())
      .map(|m| OutdatedModule {
        module: m.module.clone(),
        reason: OutdatedReason::SourceChanged {
          projects: m.changed_projects(),
        },
      })
      .collect();

    let mut outdated_names: HashSet<&str> = modules
      .iter()
      .filter(|m| m.has_changes())
      .flat_map(ModuleDependencies::changed_project_aliases)
      .collect();

    loop {
      let dependants: Vec<(usize, Vec<String>)> = modules
        .iter()
        .enumerate()
        .filter(|(i, _)| !outdated[*i])
        .filter_map(|(i, m)| {
          let matched: Vec<String> = m
            .external_references()
            .into_iter()
            .filter(|r| outdated_names.contains(r))
            .map(str::to_string)
            .collect();
          (!matched.is_empty()).then_some((i, matched))
        })
        .collect();

      if dependants.is_empty() {
        break;
      }

      for (i, references) in dependants {
        let module = &modules[i];
        info!(
          module = %module.module,
          references = ?references,
          "module OUTDATED because it depends on out-of-date modules"
        );

        outdated[i] = true;
        outdated_names.extend(module.all_project_aliases());
        entries.push(OutdatedModule {
          module: module.module.clone(),
          reason: OutdatedReason::DependsOnOutdated { references },
        });
      }
    }

    Self { entries }
  }

  pub fn contains(&self, module: &str) -> bool {
    self.entries.iter().any(|e| e.module == module)
  }

  pub fn get(&self, module: &str) -> Option<&OutdatedModule> {
    self.entries.iter().find(|e| e.module == module)
  }

  pub fn modules(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|e| e.module.as_str())
  }

  pub fn entries(&self) -> &[OutdatedModule] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }
}
