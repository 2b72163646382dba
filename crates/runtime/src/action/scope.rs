//! The scope calculations see while an action is applied.

use std::collections::HashMap;

use creature_core::{Scope, ScopeEntry};

use super::types::TaskResult;

/// Creature variables overlaid with every result's scope changes, in order.
///
/// `scope` entries overwrite. `push_scope` entries stack over the current
/// entry, and each `pop_scope` name restores the entry below its top, or
/// removes the name when nothing was below.
pub fn effective_scope(variables: &Scope, results: &[TaskResult]) -> Scope {
    let mut scope = variables.clone();
    let mut stacks: HashMap<String, Vec<Option<ScopeEntry>>> = HashMap::new();
    for result in results {
        for (name, entry) in result.scope.iter() {
            scope.insert(name.clone(), entry.clone());
        }
        for (name, entry) in result.push_scope.iter() {
            let previous = scope.insert(name.clone(), entry.clone());
            stacks.entry(name.clone()).or_default().push(previous);
        }
        for name in &result.pop_scope {
            match stacks.get_mut(name).and_then(Vec::pop) {
                Some(Some(previous)) => {
                    scope.insert(name.clone(), previous);
                }
                Some(None) | None => {
                    scope.remove(name);
                }
            }
        }
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pushed(name: &str, value: f64) -> TaskResult {
        let mut result = TaskResult::default();
        result.push_scope.set_value(name, value);
        result
    }

    fn popped(names: &[&str]) -> TaskResult {
        TaskResult {
            pop_scope: names.iter().map(|name| name.to_string()).collect(),
            ..TaskResult::default()
        }
    }

    #[test]
    fn pushes_stack_and_pops_restore() {
        let mut variables = Scope::new();
        variables.set_value("slotLevel", 1.0);
        let results = vec![pushed("slotLevel", 3.0), pushed("slotLevel", 5.0)];
        assert_eq!(effective_scope(&variables, &results).number("slotLevel"), Some(5.0));

        let mut results = results;
        results.push(popped(&["slotLevel"]));
        assert_eq!(effective_scope(&variables, &results).number("slotLevel"), Some(3.0));

        results.push(popped(&["slotLevel"]));
        assert_eq!(effective_scope(&variables, &results).number("slotLevel"), Some(1.0));
    }

    #[test]
    fn popping_a_fresh_name_removes_it() {
        let results = vec![pushed("~attackHit", 1.0), popped(&["~attackHit"])];
        assert!(!effective_scope(&Scope::new(), &results).contains("~attackHit"));
    }

    #[test]
    fn plain_scope_entries_persist() {
        let mut result = TaskResult::default();
        result.scope.set_value("rolled", 12.0);
        let scope = effective_scope(&Scope::new(), &[result, popped(&["rolled"])]);
        assert!(!scope.contains("rolled"));

        let mut result = TaskResult::default();
        result.scope.set_value("rolled", 12.0);
        let scope = effective_scope(&Scope::new(), &[result]);
        assert_eq!(scope.number("rolled"), Some(12.0));
    }
}
