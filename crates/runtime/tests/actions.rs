use creature_core::property::{
    ActionProp, ActionTarget, AdjustmentOperation, AttributeProp, AttributeType, BuffProp,
    DamageProp, NoteProp, SpellProp, TargetMode,
};
use creature_core::{Property, PropertyKind, PropertyType};
use creature_runtime::action::{CastSpellTask, DamagePropTask, ResetTask};
use creature_runtime::api::{CastOptions, DecisionKind, DefaultInputProvider};
use creature_runtime::{
    Creature, Decision, EngineAction, InteractiveInputProvider, Runtime, Simulation, Task,
};

fn hit_points(id: &str, creature_id: &str, base: &str) -> Property {
    Property::new(
        id,
        PropertyKind::Attribute(AttributeProp {
            variable_name: "hitPoints".into(),
            attribute_type: AttributeType::HealthBar,
            base_value: Some(base.into()),
            ..AttributeProp::default()
        }),
    )
    .named("Hit Points")
    .in_creature(creature_id)
}

fn damage(id: &str, amount: &str) -> Property {
    Property::new(
        id,
        PropertyKind::Damage(DamageProp {
            amount: Some(amount.into()),
            target: TargetMode::Target,
            ..DamageProp::default()
        }),
    )
    .in_creature("caster")
}

async fn runtime_with(properties: Vec<Property>) -> Runtime {
    let runtime = Runtime::builder().build();
    let stores = runtime.stores();
    for id in ["caster", "goblin"] {
        stores
            .creatures
            .insert(Creature::new(id))
            .expect("creature inserted");
    }
    for property in properties {
        stores.properties.insert(property).expect("property inserted");
    }
    for id in ["caster", "goblin"] {
        runtime.compute_creature(id).await.expect("initial compute");
    }
    runtime
}

fn attribute(runtime: &Runtime, prop_id: &str) -> (f64, Option<f64>) {
    let property = runtime
        .stores()
        .properties
        .get(prop_id)
        .expect("get")
        .expect("property exists");
    let PropertyKind::Attribute(attribute) = &property.kind else {
        panic!("{prop_id} is not an attribute");
    };
    (attribute.damage, property.output_number("value"))
}

/// Damage rolled against a target is logged, spread onto its health bar,
/// written, and the target is recomputed.
#[tokio::test]
async fn damage_is_rolled_logged_and_written() {
    let runtime = runtime_with(vec![
        damage("sword", "1d12 + 7"),
        hit_points("goblinHp", "goblin", "30"),
    ])
    .await;

    runtime
        .submit_action(EngineAction::prop(
            "swing",
            "caster",
            "sword",
            vec!["goblin".into()],
        ))
        .expect("submit");
    let action = runtime
        .run_action(
            "swing",
            vec![Decision::RollDice {
                values: vec![vec![6]],
            }],
        )
        .await
        .expect("run");

    let lines: Vec<(Option<&str>, Option<&str>)> = action
        .contents()
        .map(|content| (content.name.as_deref(), content.value.as_deref()))
        .collect();
    assert_eq!(
        lines,
        vec![
            (Some("Damage"), Some("1d12 [6] + 7")),
            (Some("Health bar damaged"), Some("\u{2212}13 Hit Points")),
        ]
    );

    // ================================================================
    // Written and recomputed
    // ================================================================
    assert_eq!(attribute(&runtime, "goblinHp"), (13.0, Some(17.0)));
    let logs = runtime.logs("caster").expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].target_ids, vec!["goblin".to_owned()]);
    assert!(runtime.stores().actions.get("swing").expect("get").is_none());

    let goblin = runtime.creature("goblin").expect("get").expect("goblin");
    assert!(!goblin.dirty);
}

#[tokio::test]
async fn damage_never_takes_a_health_bar_below_zero() {
    let runtime = runtime_with(vec![
        damage("club", "20"),
        hit_points("goblinHp", "goblin", "7"),
    ])
    .await;

    runtime
        .submit_action(EngineAction::prop("bonk", "caster", "club", vec!["goblin".into()]))
        .expect("submit");
    let action = runtime.run_action("bonk", Vec::new()).await.expect("run");

    assert!(
        action
            .contents()
            .any(|content| content.value.as_deref() == Some("\u{2212}7 Hit Points"))
    );
    assert_eq!(attribute(&runtime, "goblinHp"), (7.0, Some(0.0)));
}

#[tokio::test]
async fn healing_restores_what_damage_took_and_no_more() {
    let mut heal = damage("cure", "30");
    if let PropertyKind::Damage(payload) = &mut heal.kind {
        payload.damage_type = "healing".into();
    }
    let runtime = runtime_with(vec![
        damage("club", "20"),
        heal,
        hit_points("goblinHp", "goblin", "7"),
    ])
    .await;

    runtime
        .submit_action(EngineAction::prop("bonk", "caster", "club", vec!["goblin".into()]))
        .expect("submit");
    runtime.run_action("bonk", Vec::new()).await.expect("run");
    assert_eq!(attribute(&runtime, "goblinHp"), (7.0, Some(0.0)));

    runtime
        .submit_action(EngineAction::prop("mend", "caster", "cure", vec!["goblin".into()]))
        .expect("submit");
    let action = runtime.run_action("mend", Vec::new()).await.expect("run");
    assert!(
        action
            .contents()
            .any(|content| content.name.as_deref() == Some("Health bar restored"))
    );
    assert_eq!(attribute(&runtime, "goblinHp"), (0.0, Some(7.0)));
}

fn scorch() -> Vec<Property> {
    let spell = Property::new(
        "scorch",
        PropertyKind::Spell(SpellProp {
            action: ActionProp {
                target: ActionTarget::SingleTarget,
                ..ActionProp::default()
            },
            level: 2,
            ..SpellProp::default()
        }),
    )
    .named("Scorch")
    .in_creature("caster");
    let burn = damage("burn", "slotLevel * 3").child_of("scorch");
    vec![spell, burn]
}

/// Children of a spell read the level it is cast at.
#[tokio::test]
async fn spell_children_see_the_spell_level() {
    let mut properties = scorch();
    properties.push(hit_points("goblinHp", "goblin", "30"));
    let runtime = runtime_with(properties).await;

    runtime
        .submit_action(EngineAction::prop("cast", "caster", "scorch", vec!["goblin".into()]))
        .expect("submit");
    runtime.run_action("cast", Vec::new()).await.expect("run");

    assert_eq!(attribute(&runtime, "goblinHp"), (6.0, Some(24.0)));
}

#[tokio::test]
async fn upcasting_spends_the_slot_and_raises_the_level() {
    let slot = Property::new(
        "slot3",
        PropertyKind::Attribute(AttributeProp {
            variable_name: "slotLevel3".into(),
            attribute_type: AttributeType::SpellSlot,
            base_value: Some("1".into()),
            spell_slot_level: Some("3".into()),
            ..AttributeProp::default()
        }),
    )
    .in_creature("caster");
    let mut properties = scorch();
    properties.push(slot);
    properties.push(hit_points("goblinHp", "goblin", "30"));
    let runtime = runtime_with(properties).await;

    runtime
        .submit_action(EngineAction::new(
            "cast",
            "caster",
            Task::CastSpell(CastSpellTask {
                spell_id: Some("scorch".into()),
                target_ids: vec!["goblin".into()],
            }),
        ))
        .expect("submit");
    let decisions = vec![Decision::CastSpell {
        options: CastOptions {
            spell_id: Some("scorch".into()),
            slot_id: Some("slot3".into()),
            ritual: false,
        },
    }];
    let action = runtime.run_action("cast", decisions).await.expect("run");

    assert!(
        action
            .contents()
            .any(|content| content.value.as_deref() == Some("Casting using a level 3 spell slot"))
    );
    assert_eq!(attribute(&runtime, "slot3"), (1.0, Some(0.0)));
    assert_eq!(attribute(&runtime, "goblinHp"), (9.0, Some(21.0)));
}

/// Only the attribute that defines a variable writes its new value back
/// into the action's scope.
#[tokio::test]
async fn overridden_attributes_leave_the_scope_alone() {
    let mut shadowed = hit_points("hpA", "caster", "10").ordered(1.0);
    if let PropertyKind::Attribute(attribute) = &mut shadowed.kind {
        attribute.ignore_lower_limit = true;
    }
    let defining = hit_points("hpB", "caster", "20").ordered(2.0);
    let runtime = runtime_with(vec![shadowed, defining]).await;
    let hit = |target: &str| {
        Task::DamageProp(DamagePropTask {
            target_ids: vec!["caster".into()],
            title: None,
            operation: AdjustmentOperation::Increment,
            value: 3.0,
            target_prop_id: Some(target.into()),
            stat: None,
            silent: false,
        })
    };
    let writes_scope = |action: &EngineAction| {
        action
            .results
            .iter()
            .any(|result| result.scope.contains("hitPoints"))
    };

    runtime
        .submit_action(EngineAction::new("shadowed", "caster", hit("hpA")))
        .expect("submit");
    let shadowed = runtime.run_action("shadowed", Vec::new()).await.expect("run");
    assert!(
        shadowed
            .contents()
            .any(|content| content.name.as_deref() == Some("Health bar damaged"))
    );
    assert!(!writes_scope(&shadowed));

    runtime
        .submit_action(EngineAction::new("defining", "caster", hit("hpB")))
        .expect("submit");
    let action = runtime.run_action("defining", Vec::new()).await.expect("run");
    assert!(writes_scope(&action));
}

#[tokio::test]
async fn buffs_are_copied_onto_their_targets() {
    let bless = Property::new(
        "bless",
        PropertyKind::Buff(BuffProp {
            target: TargetMode::Target,
            ..BuffProp::default()
        }),
    )
    .named("Bless")
    .in_creature("caster");
    let blessed = Property::new("blessed", PropertyKind::Note(NoteProp::default()))
        .named("Blessed")
        .child_of("bless")
        .in_creature("caster");
    let runtime = runtime_with(vec![bless, blessed, hit_points("goblinHp", "goblin", "10")]).await;

    runtime
        .submit_action(EngineAction::prop("cast", "caster", "bless", vec!["goblin".into()]))
        .expect("submit");
    runtime.run_action("cast", Vec::new()).await.expect("run");

    let goblin = runtime.stores().properties.for_root("goblin").expect("props");
    let buff = goblin
        .iter()
        .find(|property| property.property_type() == PropertyType::Buff)
        .expect("buff copied");
    assert_eq!(buff.name.as_deref(), Some("Bless"));
    assert_ne!(buff.id, "bless");
    assert_eq!(buff.parent_id, None);
    let note = goblin
        .iter()
        .find(|property| property.name.as_deref() == Some("Blessed"))
        .expect("child copied");
    assert_eq!(note.parent_id.as_ref(), Some(&buff.id));

    // The caster keeps the original.
    let caster = runtime.stores().properties.for_root("caster").expect("props");
    assert_eq!(caster.len(), 2);
}

#[tokio::test]
async fn a_long_rest_heals_what_resets_on_it() {
    let mut hp = hit_points("hp", "caster", "20");
    if let PropertyKind::Attribute(attribute) = &mut hp.kind {
        attribute.damage = 5.0;
        attribute.reset = Some("longRest".into());
    }
    let runtime = runtime_with(vec![hp]).await;
    assert_eq!(attribute(&runtime, "hp"), (5.0, Some(15.0)));

    runtime
        .submit_action(EngineAction::new(
            "rest",
            "caster",
            Task::Reset(ResetTask {
                event_name: "longRest".into(),
                target_ids: Vec::new(),
            }),
        ))
        .expect("submit");
    runtime.run_action("rest", Vec::new()).await.expect("run");

    assert_eq!(attribute(&runtime, "hp"), (0.0, Some(20.0)));
}

/// A simulation records its dice; running with that record writes exactly
/// what the simulation showed.
#[tokio::test]
async fn running_a_simulation_replays_its_rolls() {
    let runtime = runtime_with(vec![
        damage("axe", "2d6 + 7"),
        hit_points("goblinHp", "goblin", "40"),
    ])
    .await;
    runtime
        .submit_action(EngineAction::prop("chop", "caster", "axe", vec!["goblin".into()]))
        .expect("submit");

    let simulation = runtime
        .simulate_action("chop", &DefaultInputProvider::predictable())
        .await
        .expect("simulate");
    let Simulation::Complete(simulated) = simulation else {
        panic!("the default provider never stops for input");
    };
    assert!(simulated.is_simulation);
    assert_eq!(
        simulated.decisions,
        vec![Decision::RollDice {
            values: vec![vec![3, 4]],
        }]
    );
    assert!(
        simulated
            .contents()
            .any(|content| content.value.as_deref() == Some("2d6 [3, 4] + 7"))
    );
    // Simulating writes nothing.
    assert_eq!(attribute(&runtime, "goblinHp"), (0.0, Some(40.0)));

    let applied = runtime
        .run_action("chop", simulated.decisions.clone())
        .await
        .expect("run");
    let simulated_lines: Vec<_> = simulated.contents().collect();
    let applied_lines: Vec<_> = applied.contents().collect();
    assert_eq!(simulated_lines, applied_lines);
    assert_eq!(attribute(&runtime, "goblinHp"), (14.0, Some(26.0)));
}

#[tokio::test]
async fn interactive_simulations_stop_at_the_first_question() {
    let runtime = runtime_with(vec![
        damage("axe", "2d6 + 7"),
        hit_points("goblinHp", "goblin", "40"),
    ])
    .await;
    runtime
        .submit_action(EngineAction::prop("chop", "caster", "axe", vec!["goblin".into()]))
        .expect("submit");

    let simulation = runtime
        .simulate_action("chop", &InteractiveInputProvider)
        .await
        .expect("simulate");
    let Simulation::NeedsInput { request, decisions } = simulation else {
        panic!("an interactive provider has to ask for the dice");
    };
    assert_eq!(request.kind(), DecisionKind::RollDice);
    assert!(decisions.is_empty());
}

#[tokio::test]
async fn actions_cannot_be_written_twice() {
    let runtime = runtime_with(vec![
        damage("club", "3"),
        hit_points("goblinHp", "goblin", "10"),
    ])
    .await;
    runtime
        .submit_action(EngineAction::prop("bonk", "caster", "club", vec!["goblin".into()]))
        .expect("submit");
    let action = runtime.run_action("bonk", Vec::new()).await.expect("run");

    let error = runtime
        .write_action_results(&action)
        .await
        .expect_err("already written");
    assert!(matches!(
        error,
        creature_runtime::RuntimeError::ActionNotFound(_)
    ));
    assert_eq!(attribute(&runtime, "goblinHp"), (3.0, Some(7.0)));
}
