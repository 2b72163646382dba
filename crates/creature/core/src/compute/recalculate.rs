//! Recompiling one calculated field outside a compute pass.
//!
//! The action engine evaluates fields against a scope the compute pass never
//! sees: `slotLevel`, `~attackRoll`, attributes damaged earlier in the same
//! action. It starts again from the stored formula, resolves it against that
//! scope and re-applies the effects and proficiencies the last pass linked.

use super::evaluate::{ancestor_scope, effect_stack, fold};
use crate::formula::{
    CalculationError, Context, NoDice, Node, Overlay, ResolveLevel, SymbolTable, parse, resolve,
};
use crate::property::{Property, PropertyTree};

/// Compiles `property`'s field at `path` against `scope`.
///
/// `tree` is the owning creature's tree, used for `#type` ancestors and the
/// linked effects. Returns `None` when the property has no such field. A
/// formula that does not parse comes back as an error node with the parse
/// error recorded on `context`.
///
/// # Example
/// ```
/// # use creature_core::compute::recalculate;
/// # use creature_core::property::{DamageProp, PropertyKind};
/// # use creature_core::{Context, Property, PropertyTree, Scope};
/// let damage = Property::new(
///     "scorch",
///     PropertyKind::Damage(DamageProp {
///         amount: Some("slotLevel * 3".into()),
///         ..DamageProp::default()
///     }),
/// );
/// let tree = PropertyTree::new(vec![damage.clone()]).unwrap();
/// let mut scope = Scope::new();
/// scope.set_value("slotLevel", 2.0);
///
/// let node = recalculate(&tree, &damage, "amount", &scope, &mut Context::new()).unwrap();
/// assert_eq!(node.to_string(), "6");
/// ```
pub fn recalculate(
    tree: &PropertyTree,
    property: &Property,
    path: &str,
    scope: &dyn SymbolTable,
    context: &mut Context,
) -> Option<Node> {
    let text = property
        .kind
        .calculations()
        .into_iter()
        .find(|(field, _)| field == path)
        .map(|(_, calculation)| calculation.calculation.clone())?;
    let node = match parse(&text) {
        Ok(node) => node,
        Err(error) => {
            let error = CalculationError::parse(&error);
            let node = Node::error(error.message.clone());
            context.push(error);
            return Some(node);
        }
    };

    let ancestors = ancestor_scope(tree, &property.id, [&node]);
    let overlay = Overlay::new(&ancestors, scope);
    let compiled = resolve(ResolveLevel::Compile, &node, &overlay, context, &mut NoDice);

    let Some(outcome) = property.calculation(path) else {
        return Some(compiled);
    };
    if outcome.effect_ids.is_empty() && outcome.proficiency_ids.is_empty() {
        return Some(compiled);
    }
    let stack = effect_stack(tree, &outcome.effect_ids, &outcome.proficiency_ids);
    let bonus = overlay
        .entry("proficiencyBonus")
        .and_then(|entry| entry.value.as_ref())
        .and_then(|value| value.as_number())
        .unwrap_or_default();
    Some(fold(&stack.apply(compiled, bonus), context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use crate::compute::compute;
    use crate::formula::{Scope, Value};
    use crate::property::{
        AttributeProp, AttributeType, DamageProp, EffectOperation, EffectProp, PropertyKind,
    };
    use crate::tags::TagTargeting;

    fn computed(properties: Vec<Property>) -> PropertyTree {
        let outcome = compute(properties, None, &EngineConfig::default()).expect("valid tree");
        PropertyTree::new(outcome.properties).expect("tree")
    }

    fn damage(formula: &str) -> Property {
        Property::new(
            "hit",
            PropertyKind::Damage(DamageProp {
                amount: Some(formula.into()),
                ..DamageProp::default()
            }),
        )
    }

    #[test]
    fn names_missing_at_compute_time_resolve_later() {
        let tree = computed(vec![damage("slotLevel * 3")]);
        let hit = tree.get("hit").expect("hit");
        assert!(!hit.calculation("amount").expect("outcome").errors.is_empty());

        let mut scope = Scope::new();
        scope.set_value("slotLevel", 2.0);
        let mut context = Context::new();
        let node = recalculate(&tree, hit, "amount", &scope, &mut context).expect("field");
        assert_eq!(node.as_constant(), Some(&Value::Number(6.0)));
        assert!(context.errors.is_empty());
    }

    #[test]
    fn linked_effects_are_applied_again() {
        let strength = Property::new(
            "str",
            PropertyKind::Attribute(AttributeProp {
                variable_name: "strength".into(),
                attribute_type: AttributeType::Ability,
                base_value: Some("10".into()),
                ..AttributeProp::default()
            }),
        );
        let plus = Property::new(
            "plus",
            PropertyKind::Effect(EffectProp {
                operation: EffectOperation::Add,
                amount: Some("2".into()),
                target_by_tags: true,
                targeting: TagTargeting::tags(["weapon"]),
                ..EffectProp::default()
            }),
        );
        let tree = computed(vec![
            strength,
            damage("~bonus + 1").tagged(["weapon"]),
            plus,
        ]);
        let hit = tree.get("hit").expect("hit");
        assert_eq!(
            hit.calculation("amount").expect("outcome").effect_ids,
            vec!["plus".to_owned()]
        );

        let mut scope = Scope::new();
        scope.set_value("~bonus", 4.0);
        let node = recalculate(&tree, hit, "amount", &scope, &mut Context::new()).expect("field");
        assert_eq!(node.as_constant(), Some(&Value::Number(7.0)));
    }

    #[test]
    fn unknown_fields_are_none() {
        let tree = computed(vec![damage("1")]);
        let hit = tree.get("hit").expect("hit");
        let scope = Scope::new();
        assert!(recalculate(&tree, hit, "condition", &scope, &mut Context::new()).is_none());
    }
}
