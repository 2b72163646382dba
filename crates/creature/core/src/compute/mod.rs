//! The compute pass.
//!
//! A pass is a pure function of a creature's stored properties: it rebuilds
//! the tree, flags inactive properties, builds the dependency graph, walks it
//! once in dependency order and diffs the result against what was stored.
//!
//! ```text
//! properties ─► PropertyTree ─► activation ─► Formulas ─► DependencyGraph
//!                                                              │
//!        ComputeOutcome ◄─ diff ◄─ trigger links ◄─ walk ◄─────┘
//! ```

mod activation;
mod aggregate;
mod evaluate;
mod fields;
mod graph;
mod recalculate;
mod triggers;
mod types;
mod writeback;

use std::collections::HashMap;

pub use activation::{apply_activation, deactivate_by_toggle};
pub use aggregate::{Contribution, EffectStack, proficiency_bonus};
pub use fields::Formulas;
pub use graph::{DependencyGraph, EdgeKind, NodeKey, multiplier_variable};
pub use recalculate::recalculate;
pub use triggers::link_triggers;
pub use writeback::{
    ComputeError, ComputeErrorKind, ComputeOutcome, diff_properties, diff_variables,
};

use crate::config::EngineConfig;
use crate::formula::Scope;
use crate::property::{DerivedState, Property, PropertyTree, TreeError};
use evaluate::Computation;

/// Computes every derived value of one creature.
///
/// `properties` are the creature's stored properties, derived layers
/// included; `stored_variables` is the last written variables snapshot. The
/// outcome holds only what changed against both.
///
/// Only a malformed tree is an `Err`. Formula problems land on the
/// calculations that raised them and dependency loops in
/// [`ComputeOutcome::compute_errors`].
pub fn compute(
    properties: Vec<Property>,
    stored_variables: Option<&Scope>,
    config: &EngineConfig,
) -> Result<ComputeOutcome, TreeError> {
    let stored: HashMap<String, DerivedState> = properties
        .iter()
        .filter(|property| !property.removed)
        .map(|property| (property.id.clone(), property.derived.clone()))
        .collect();

    let mut tree = PropertyTree::new(properties)?;
    for property in tree.iter_mut() {
        property.derived = DerivedState::default();
    }
    apply_activation(&mut tree);

    let formulas = Formulas::parse(&tree);
    let graph = DependencyGraph::build(&tree, &formulas);
    let mut computation = Computation::new(tree, graph, formulas);
    computation.run();

    let Computation {
        mut tree,
        scope,
        errors: loops,
        ..
    } = computation;
    link_triggers(&mut tree);

    let prop_count = tree.len();
    let mut compute_errors = Vec::new();
    if prop_count > config.max_props {
        compute_errors.push(ComputeError::too_many_properties(
            prop_count,
            config.max_props,
        ));
    }
    compute_errors.extend(loops);

    Ok(ComputeOutcome {
        property_updates: diff_properties(&stored, &tree),
        variables: diff_variables(stored_variables, &scope),
        compute_errors,
        prop_count,
        properties: tree.into_properties(),
        scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Value;
    use crate::property::{
        ActionProp, AttributeConsumed, AttributeProp, AttributeType, Calculation, ClassLevelProp,
        ClassProp, ConstantProp, DamageMultiplierProp, EffectOperation, EffectProp, InlineText,
        ItemConsumed, ItemProp, NoteProp, ProficiencyProp, PropertyKind, Resources, SkillProp,
        SkillType, ToggleProp,
    };
    use crate::tags::{ExtraTags, TagTargeting};

    fn attribute(id: &str, name: &str, base: &str) -> Property {
        Property::new(
            id,
            PropertyKind::Attribute(AttributeProp {
                variable_name: name.into(),
                attribute_type: AttributeType::Ability,
                base_value: Some(base.into()),
                ..AttributeProp::default()
            }),
        )
    }

    fn effect(id: &str, operation: EffectOperation, amount: &str, stats: &[&str]) -> Property {
        Property::new(
            id,
            PropertyKind::Effect(EffectProp {
                operation,
                amount: Some(amount.into()),
                stats: stats.iter().map(|s| s.to_string()).collect(),
                ..EffectProp::default()
            }),
        )
    }

    fn run(properties: Vec<Property>) -> ComputeOutcome {
        compute(properties, None, &EngineConfig::default()).expect("valid tree")
    }

    fn number(outcome: &ComputeOutcome, name: &str) -> Option<f64> {
        outcome.scope.number(name)
    }

    #[test]
    fn stat_effects_add_to_attributes() {
        let outcome = run(vec![
            attribute("str", "strength", "10"),
            effect("buff", EffectOperation::Add, "2", &["strength"]),
        ]);
        assert_eq!(number(&outcome, "strength"), Some(12.0));
        let modifier = outcome
            .scope
            .get("strength")
            .and_then(|entry| entry.field("modifier"))
            .cloned();
        assert_eq!(modifier, Some(Value::Number(1.0)));
        assert!(outcome.compute_errors.is_empty());
    }

    #[test]
    fn tag_targeted_multiplier_applies_to_each_match() {
        let doubling = EffectProp {
            operation: EffectOperation::Mul,
            amount: Some("2".into()),
            target_by_tags: true,
            targeting: TagTargeting::tags(["tag2"]),
            ..EffectProp::default()
        };
        let outcome = run(vec![
            attribute("a", "strength", "13").tagged(["tag2"]),
            attribute("b", "strength", "11").tagged(["tag2"]),
            Property::new("mul", PropertyKind::Effect(doubling)),
        ]);
        let doubled = |id: &str| {
            outcome
                .property(id)
                .and_then(|p| p.calculation("baseValue"))
                .and_then(|c| c.number())
        };
        assert_eq!(doubled("a"), Some(26.0));
        assert_eq!(doubled("b"), Some(22.0));
        assert_eq!(number(&outcome, "strength"), Some(26.0));
        let overridden = outcome.property("a").and_then(|p| p.output("overridden"));
        assert_eq!(overridden, Some(&Value::Bool(true)));
    }

    #[test]
    fn excluding_effects_reach_every_other_property() {
        let all_but_cursed = EffectProp {
            operation: EffectOperation::Add,
            amount: Some("2".into()),
            target_by_tags: true,
            targeting: TagTargeting::default().with_extra(ExtraTags::not(["cursed"])),
            ..EffectProp::default()
        };
        let outcome = run(vec![
            attribute("str", "strength", "10"),
            attribute("dex", "dexterity", "10").tagged(["cursed"]),
            Property::new("plus", PropertyKind::Effect(all_but_cursed)),
        ]);
        assert_eq!(number(&outcome, "strength"), Some(12.0));
        assert_eq!(number(&outcome, "dexterity"), Some(10.0));
    }

    #[test]
    fn base_effect_overrides_the_base_value() {
        let outcome = run(vec![
            attribute("str", "strength", "10"),
            effect("b1", EffectOperation::Base, "15", &["strength"]),
            effect("b2", EffectOperation::Base, "20", &["strength"]),
            effect("cap", EffectOperation::Max, "30", &["strength"]),
        ]);
        assert_eq!(number(&outcome, "strength"), Some(20.0));
    }

    #[test]
    fn unknown_names_read_as_zero_with_an_error() {
        let action = ActionProp {
            uses: Some("nonExistentProperty + 7".into()),
            uses_used: 5.0,
            ..ActionProp::default()
        };
        let outcome = run(vec![Property::new("act", PropertyKind::Action(action))]);
        let property = outcome.property("act").expect("action");
        let uses = property.calculation("uses").expect("uses computed");
        assert_eq!(uses.number(), Some(7.0));
        assert!(!uses.errors.is_empty());
        assert_eq!(property.output_number("usesLeft"), Some(2.0));
    }

    #[test]
    fn consumed_resources_report_availability() {
        let action = ActionProp {
            resources: Resources {
                items_consumed: vec![ItemConsumed {
                    item_id: Some("arrows".into()),
                    quantity: Some("1".into()),
                    ..ItemConsumed::default()
                }],
                attributes_consumed: vec![AttributeConsumed {
                    variable_name: Some("resourceVar".into()),
                    quantity: Some("10".into()),
                }],
            },
            ..ActionProp::default()
        };
        let outcome = run(vec![
            Property::new("act", PropertyKind::Action(action)),
            Property::new(
                "arrows",
                PropertyKind::Item(ItemProp {
                    quantity: 27.0,
                    equipped: true,
                    ..ItemProp::default()
                }),
            )
            .named("Arrow"),
            Property::new(
                "res",
                PropertyKind::Attribute(AttributeProp {
                    variable_name: "resourceVar".into(),
                    attribute_type: AttributeType::Resource,
                    base_value: Some("9".into()),
                    ..AttributeProp::default()
                }),
            )
            .named("Resource Var"),
        ]);
        let property = outcome.property("act").expect("action");
        let output = |key: &str| property.output(key).cloned();
        assert_eq!(
            output("resources.itemsConsumed.0.available"),
            Some(Value::Number(27.0))
        );
        assert_eq!(
            output("resources.itemsConsumed.0.itemName"),
            Some(Value::text("Arrow"))
        );
        assert_eq!(
            output("resources.attributesConsumed.0.available"),
            Some(Value::Number(9.0))
        );
        assert_eq!(
            output("resources.attributesConsumed.0.statName"),
            Some(Value::text("Resource Var"))
        );
        assert_eq!(output("insufficientResources"), Some(Value::Bool(true)));
    }

    #[test]
    fn inline_text_is_compiled_against_the_scope() {
        let note = NoteProp {
            summary: Some(InlineText::from("Strength is {strength}, dex {dexterity + 1}")),
            ..NoteProp::default()
        };
        let outcome = run(vec![
            attribute("str", "strength", "14"),
            Property::new("note", PropertyKind::Note(note)),
        ]);
        let summary = outcome.property("note").and_then(|p| p.text("summary"));
        assert_eq!(summary, Some("Strength is 14, dex 1"));
    }

    #[test]
    fn parse_errors_are_stored_on_the_calculation() {
        let outcome = run(vec![attribute("str", "strength", "10 +")]);
        let base = outcome
            .property("str")
            .and_then(|p| p.calculation("baseValue"))
            .expect("base value outcome");
        assert!(base.value.is_none());
        assert_eq!(base.errors.len(), 1);
        assert_eq!(number(&outcome, "strength"), Some(0.0));
    }

    #[test]
    fn dependency_loops_are_reported_once() {
        let outcome = run(vec![attribute("a", "strength", "strength")]);
        let loops: Vec<_> = outcome
            .compute_errors
            .iter()
            .filter(|error| error.kind == ComputeErrorKind::DependencyLoop)
            .collect();
        assert_eq!(loops.len(), 1);
        assert!(loops[0].details.starts_with("Dependency loop: "));
        assert!(loops[0].details.contains("a.baseValue"));
    }

    #[test]
    fn falsy_toggles_deactivate_their_descendants() {
        let toggle = ToggleProp {
            condition: Some(Calculation::new("0")),
            ..ToggleProp::default()
        };
        let outcome = run(vec![
            attribute("str", "strength", "10"),
            Property::new("toggle", PropertyKind::Toggle(toggle)),
            effect("buff", EffectOperation::Add, "5", &["strength"]).child_of("toggle"),
        ]);
        let buff = outcome.property("buff").expect("effect");
        assert!(buff.derived.deactivated_by_toggle());
        assert_eq!(buff.derived.deactivating_toggle_id.as_deref(), Some("toggle"));
        assert_eq!(number(&outcome, "strength"), Some(10.0));
    }

    #[test]
    fn skills_combine_ability_proficiency_and_effects() {
        let outcome = run(vec![
            attribute("dex", "dexterity", "14"),
            Property::new(
                "pb",
                PropertyKind::Constant(ConstantProp {
                    variable_name: "proficiencyBonus".into(),
                    calculation: "2".into(),
                }),
            ),
            Property::new(
                "stealth",
                PropertyKind::Skill(SkillProp {
                    variable_name: "stealth".into(),
                    ability: Some("dexterity".into()),
                    skill_type: SkillType::Skill,
                    ..SkillProp::default()
                }),
            ),
            Property::new(
                "expertise",
                PropertyKind::Proficiency(ProficiencyProp {
                    value: 2.0,
                    stats: vec!["stealth".into()],
                    ..ProficiencyProp::default()
                }),
            ),
            effect("cloak", EffectOperation::Advantage, "", &["stealth"]),
        ]);
        // 2 (dex) + 4 (expertise)
        assert_eq!(number(&outcome, "stealth"), Some(6.0));
        let entry = outcome.scope.get("stealth").expect("stealth entry");
        assert_eq!(entry.field("passive"), Some(&Value::Number(16.0)));
        assert_eq!(entry.field("advantage"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn class_levels_sum_into_level() {
        let class = |id: &str, name: &str| {
            Property::new(
                id,
                PropertyKind::Class(ClassProp {
                    variable_name: name.into(),
                }),
            )
        };
        let level = |id: &str, name: &str, level: u32, parent: &str| {
            Property::new(
                id,
                PropertyKind::ClassLevel(ClassLevelProp {
                    variable_name: name.into(),
                    level,
                }),
            )
            .child_of(parent)
        };
        let outcome = run(vec![
            class("wiz", "wizard"),
            level("w1", "wizard", 1, "wiz"),
            level("w2", "wizard", 2, "wiz"),
            class("ftr", "fighter"),
            level("f1", "fighter", 1, "ftr"),
        ]);
        assert_eq!(number(&outcome, "wizard"), Some(2.0));
        assert_eq!(number(&outcome, "fighter"), Some(1.0));
        assert_eq!(number(&outcome, "level"), Some(3.0));
    }

    #[test]
    fn damage_multipliers_resolve_per_type() {
        let multiplier = |id: &str, value: f64| {
            Property::new(
                id,
                PropertyKind::DamageMultiplier(DamageMultiplierProp {
                    damage_types: vec!["fire".into()],
                    value,
                }),
            )
        };
        let outcome = run(vec![multiplier("resist", 0.5)]);
        assert_eq!(number(&outcome, "fireMultiplier"), Some(0.5));
        let outcome = run(vec![multiplier("resist", 0.5), multiplier("weak", 2.0)]);
        assert_eq!(number(&outcome, "fireMultiplier"), Some(1.0));
        let outcome = run(vec![multiplier("weak", 2.0), multiplier("immune", 0.0)]);
        assert_eq!(number(&outcome, "fireMultiplier"), Some(0.0));
    }

    #[test]
    fn too_many_properties_warn() {
        let properties = (0..3)
            .map(|i| attribute(&format!("p{i}"), &format!("v{i}"), "1"))
            .collect();
        let outcome = compute(properties, None, &EngineConfig::with_max_props(2)).expect("tree");
        assert_eq!(
            outcome.compute_errors,
            vec![ComputeError::too_many_properties(3, 2)]
        );
        assert_eq!(outcome.prop_count, 3);
    }

    #[test]
    fn a_second_pass_over_written_data_changes_nothing() {
        let properties = vec![
            attribute("str", "strength", "10"),
            effect("buff", EffectOperation::Add, "2", &["strength"]),
            Property::new(
                "note",
                PropertyKind::Note(NoteProp {
                    summary: Some("{strength}".into()),
                    ..NoteProp::default()
                }),
            ),
        ];
        let first = run(properties);
        assert!(first.has_changes());

        let second = compute(
            first.properties.clone(),
            first.variables.as_ref(),
            &EngineConfig::default(),
        )
        .expect("tree");
        assert!(second.property_updates.is_empty());
        assert!(second.variables.is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = compute(
            vec![attribute("x", "a", "1"), attribute("x", "b", "2")],
            None,
            &EngineConfig::default(),
        );
        assert!(matches!(result, Err(TreeError::DuplicateId { .. })));
    }
}
