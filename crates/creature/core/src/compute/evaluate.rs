//! The graph walk and the calculated-field and inline-text nodes.

use super::aggregate::{Contribution, EffectStack};
use super::fields::Formulas;
use super::graph::{DependencyGraph, EdgeKind, NodeKey};
use super::writeback::ComputeError;
use crate::formula::{
    CalculationError, Context, NoDice, Node, Overlay, ResolveLevel, Scope, ScopeEntry, Value,
    inline, resolve,
};
use crate::property::{
    CalculationOutcome, InlineOutcome, Property, PropertyId, PropertyKind, PropertyTree,
    PropertyType,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Visit {
    New,
    Visiting,
    Done,
}

/// State of one compute pass while the graph is walked.
pub(super) struct Computation {
    pub(super) tree: PropertyTree,
    pub(super) graph: DependencyGraph,
    pub(super) formulas: Formulas,
    pub(super) scope: Scope,
    pub(super) errors: Vec<ComputeError>,
    visits: Vec<Visit>,
    path: Vec<usize>,
}

impl Computation {
    pub(super) fn new(tree: PropertyTree, graph: DependencyGraph, formulas: Formulas) -> Self {
        let visits = vec![Visit::New; graph.len()];
        Self {
            tree,
            graph,
            formulas,
            scope: Scope::new(),
            errors: Vec::new(),
            visits,
            path: Vec::new(),
        }
    }

    /// Computes every node once, dependencies first, in node order.
    pub(super) fn run(&mut self) {
        for i in 0..self.graph.len() {
            if self.visits[i] == Visit::New {
                self.visit(i);
            }
        }
    }

    fn visit(&mut self, i: usize) {
        self.visits[i] = Visit::Visiting;
        self.path.push(i);
        let dependencies: Vec<usize> = self.graph.dependencies(i).iter().map(|(j, _)| *j).collect();
        for j in dependencies {
            match self.visits[j] {
                Visit::New => self.visit(j),
                Visit::Visiting => self.record_loop(j),
                Visit::Done => {}
            }
        }
        self.path.pop();
        self.visits[i] = Visit::Done;
        self.compute_node(i);
    }

    fn record_loop(&mut self, reentered: usize) {
        let start = self
            .path
            .iter()
            .position(|&k| k == reentered)
            .unwrap_or_default();
        let mut names: Vec<String> = self.path[start..]
            .iter()
            .map(|&k| self.graph.key(k).to_string())
            .collect();
        names.push(self.graph.key(reentered).to_string());
        let error =
            ComputeError::dependency_loop(format!("Dependency loop: {}", names.join(" -> ")));
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    fn compute_node(&mut self, i: usize) {
        match self.graph.key(i).clone() {
            NodeKey::Property(id) => self.compute_property(&id),
            NodeKey::Variable(name) => self.compute_variable(i, &name),
            NodeKey::Calculation { prop_id, path } => self.compute_calculation(i, &prop_id, &path),
            NodeKey::Text { prop_id, field } => self.compute_text(&prop_id, &field),
        }
    }

    // ===== shared helpers =====

    pub(super) fn is_active(&self, id: &str) -> bool {
        self.tree.get(id).is_some_and(Property::is_active)
    }

    /// Active properties node `i` depends on through `kind` edges, in link order.
    pub(super) fn linked_active(&self, i: usize, kind: EdgeKind) -> Vec<PropertyId> {
        self.graph
            .linked(i, kind)
            .filter_map(|key| match key {
                NodeKey::Property(id) if self.is_active(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub(super) fn proficiency_bonus(&self) -> f64 {
        self.scope.number("proficiencyBonus").unwrap_or_default()
    }

    pub(super) fn effect_stack(
        &self,
        effects: &[PropertyId],
        proficiencies: &[PropertyId],
    ) -> EffectStack {
        effect_stack(&self.tree, effects, proficiencies)
    }

    fn ancestor_scope<'n>(
        &self,
        prop_id: &str,
        nodes: impl IntoIterator<Item = &'n Node>,
    ) -> Scope {
        ancestor_scope(&self.tree, prop_id, nodes)
    }

    // ===== calculation and text nodes =====

    fn compute_calculation(&mut self, i: usize, prop_id: &str, path: &str) {
        let parsed = match self.formulas.get(prop_id, path) {
            Some(Ok(node)) => Ok(node.clone()),
            Some(Err(error)) => Err(CalculationError::parse(error)),
            None => return,
        };
        let mut outcome = CalculationOutcome::default();
        match parsed {
            Err(error) => outcome.errors.push(error),
            Ok(node) => {
                let mut context = Context::new();
                let ancestors = self.ancestor_scope(prop_id, [&node]);
                let compiled = resolve(
                    ResolveLevel::Compile,
                    &node,
                    &Overlay::new(&ancestors, &self.scope),
                    &mut context,
                    &mut NoDice,
                );
                let effects = self.linked_active(i, EdgeKind::Effect);
                let proficiencies = self.linked_active(i, EdgeKind::Proficiency);
                let result = if effects.is_empty() && proficiencies.is_empty() {
                    compiled
                } else {
                    let stack = self.effect_stack(&effects, &proficiencies);
                    outcome.unaffected = Some(node_value(&compiled));
                    outcome.advantage = stack.advantage();
                    outcome.disadvantage = stack.disadvantage();
                    outcome.fail = stack.fail();
                    outcome.conditional = stack.conditional();
                    outcome.effect_ids = effects;
                    outcome.proficiency_ids = proficiencies;
                    fold(&stack.apply(compiled, self.proficiency_bonus()), &mut context)
                };
                store_result(&mut outcome, result);
                outcome.errors = context.errors;
            }
        }
        if let Some(property) = self.tree.get_mut(prop_id) {
            property
                .derived
                .calculations
                .insert(path.to_owned(), outcome);
        }
    }

    fn compute_text(&mut self, prop_id: &str, field: &str) {
        let Some(text) = self.tree.get(prop_id).and_then(|property| {
            property
                .kind
                .texts()
                .into_iter()
                .find(|(name, _)| *name == field)
                .map(|(_, text)| text.text.clone())
        }) else {
            return;
        };
        let nodes = inline::calculations(&text);
        let ancestors = self.ancestor_scope(prop_id, &nodes);
        let mut context = Context::new();
        let value = inline::render(
            &text,
            ResolveLevel::Compile,
            &Overlay::new(&ancestors, &self.scope),
            &mut context,
            &mut NoDice,
        );
        if let Some(property) = self.tree.get_mut(prop_id) {
            property.derived.texts.insert(
                field.to_owned(),
                InlineOutcome {
                    value,
                    errors: context.errors,
                },
            );
        }
    }
}

/// Stack of the given effects and proficiencies, in tree order.
pub(super) fn effect_stack(
    tree: &PropertyTree,
    effects: &[PropertyId],
    proficiencies: &[PropertyId],
) -> EffectStack {
    let mut stack = EffectStack::new();
    for property in effects.iter().filter_map(|id| tree.get(id)) {
        let PropertyKind::Effect(effect) = &property.kind else {
            continue;
        };
        let amount = property.calculation("amount").and_then(CalculationOutcome::node);
        let text = || {
            effect
                .text
                .clone()
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| property.title())
        };
        if let Some(contribution) = Contribution::from_effect(effect.operation, amount, text) {
            stack.push(contribution);
        }
    }
    for property in proficiencies.iter().filter_map(|id| tree.get(id)) {
        if let PropertyKind::Proficiency(proficiency) = &property.kind {
            stack.proficient(proficiency.value);
        }
    }
    stack
}

/// Entries for every `#type` name the nodes read, from the nearest ancestor
/// of that type.
pub(super) fn ancestor_scope<'n>(
    tree: &PropertyTree,
    prop_id: &str,
    nodes: impl IntoIterator<Item = &'n Node>,
) -> Scope {
    let mut ancestors = Scope::new();
    for node in nodes {
        for name in node.referenced_symbols() {
            let Some(type_name) = name.strip_prefix('#') else {
                continue;
            };
            let Ok(kind) = type_name.parse::<PropertyType>() else {
                continue;
            };
            if let Some(ancestor) = tree.nearest_ancestor_of_type(prop_id, kind) {
                ancestors.insert(name.clone(), property_entry(ancestor));
            }
        }
    }
    ancestors
}

/// Folds constants in a tree whose names are already substituted.
pub(super) fn fold(node: &Node, context: &mut Context) -> Node {
    resolve(ResolveLevel::Compile, node, &Scope::new(), context, &mut NoDice)
}

/// A constant's value, or the expression rendered as text.
fn node_value(node: &Node) -> Value {
    match node.as_constant() {
        Some(value) => value.clone(),
        None => Value::Text(node.to_string()),
    }
}

fn store_result(outcome: &mut CalculationOutcome, result: Node) {
    if result.is_error() {
        return;
    }
    match result.as_constant() {
        Some(value) => outcome.value = Some(value.clone()),
        None => {
            outcome.value = Some(Value::Text(result.to_string()));
            outcome.value_node = Some(result);
        }
    }
}

/// Scope entry describing a property for `#type` references: its outputs,
/// then its numeric calculated fields by path.
pub(super) fn property_entry(property: &Property) -> ScopeEntry {
    let mut entry = ScopeEntry::default().with_prop(property.id.clone());
    entry.value = property.output("value").cloned();
    for (key, value) in &property.derived.outputs {
        entry.fields.insert(key.clone(), value.clone());
    }
    for (path, outcome) in &property.derived.calculations {
        if let Some(value) = &outcome.value {
            entry
                .fields
                .entry(path.clone())
                .or_insert_with(|| value.clone());
        }
    }
    entry
}
