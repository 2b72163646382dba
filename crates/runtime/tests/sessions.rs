use std::time::Duration;

use creature_core::property::{AttributeProp, AttributeType, NoteProp};
use creature_core::{Property, PropertyKind, PropertyType};
use creature_runtime::{ChangeEvent, Creature, Runtime, RuntimeConfig, RuntimeError, Topic};

fn strength(base: &str) -> Property {
    Property::new(
        "str",
        PropertyKind::Attribute(AttributeProp {
            variable_name: "strength".into(),
            attribute_type: AttributeType::Ability,
            base_value: Some(base.into()),
            ..AttributeProp::default()
        }),
    )
    .in_creature("c1")
}

fn runtime() -> Runtime {
    let runtime = Runtime::builder()
        .config(RuntimeConfig::default().with_recompute_debounce(Duration::from_millis(100)))
        .build();
    runtime
        .stores()
        .creatures
        .insert(Creature::new("c1"))
        .expect("creature inserted");
    runtime
        .stores()
        .properties
        .insert(strength("10"))
        .expect("property inserted");
    runtime
}

/// Lets spawned watchers drain their receivers.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn rewrite_strength(runtime: &Runtime, base: &str) {
    let mut property = strength(base);
    property.dirty = true;
    runtime
        .stores()
        .properties
        .update(property)
        .expect("property updated");
}

async fn next_clean_creature(events: &mut tokio::sync::broadcast::Receiver<ChangeEvent>) {
    loop {
        match events.recv().await.expect("feed open") {
            ChangeEvent::Creature(event) if !event.creature.dirty => return,
            _ => {}
        }
    }
}

/// Each dirty write pushes the recompute back; one pass runs once writes stop.
#[tokio::test(start_paused = true)]
async fn dirty_writes_recompute_once_quiet() {
    let runtime = runtime();
    let handle = runtime.acquire("c1").await.expect("acquire");
    let mut creatures = runtime.subscribe(Topic::Creatures);
    settle().await;

    rewrite_strength(&runtime, "12");
    settle().await;
    tokio::time::advance(Duration::from_millis(60)).await;
    rewrite_strength(&runtime, "16");
    settle().await;
    tokio::time::advance(Duration::from_millis(60)).await;
    settle().await;

    // 120ms after the first write, 60ms after the last: nothing yet.
    assert!(runtime.variables("c1").expect("get").is_none());

    next_clean_creature(&mut creatures).await;
    let variables = runtime.variables("c1").expect("get").expect("computed");
    assert_eq!(variables.number("strength"), Some(16.0));

    settle().await;
    assert_eq!(handle.variables().number("strength"), Some(16.0));
    assert!(!handle.creature().dirty);
    runtime.release(handle).expect("release");
    runtime.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn releasing_the_last_hold_cancels_the_pending_recompute() {
    let runtime = runtime();
    let handle = runtime.acquire("c1").await.expect("acquire");
    settle().await;

    rewrite_strength(&runtime, "18");
    settle().await;
    runtime.release(handle).expect("release");
    assert!(!runtime.sessions().is_loaded("c1"));

    tokio::time::advance(Duration::from_millis(500)).await;
    settle().await;
    assert!(runtime.variables("c1").expect("get").is_none());
}

#[tokio::test]
async fn holds_are_counted() {
    let runtime = runtime();
    let first = runtime.acquire("c1").await.expect("first");
    let second = runtime.acquire("c1").await.expect("second");
    assert_eq!(runtime.sessions().holds("c1"), 2);
    assert_ne!(first.id(), second.id());

    let again = first.clone();
    runtime.release(first).expect("release first");
    assert!(runtime.sessions().is_loaded("c1"));
    let error = runtime.release(again).expect_err("released twice");
    assert!(matches!(error, RuntimeError::SessionReleased(_)));

    runtime.release(second).expect("release second");
    assert!(!runtime.sessions().is_loaded("c1"));
}

#[tokio::test]
async fn unknown_creatures_cannot_be_loaded() {
    let runtime = runtime();
    let error = runtime.acquire("ghost").await.err().expect("missing");
    assert!(matches!(error, RuntimeError::CreatureNotFound(_)));
    assert!(!runtime.sessions().is_loaded("ghost"));
}

#[tokio::test]
async fn reads_follow_store_writes() {
    let runtime = runtime();
    let handle = runtime.acquire("c1").await.expect("acquire");
    assert_eq!(handle.properties().len(), 1);

    let note = Property::new("n1", PropertyKind::Note(NoteProp::default()))
        .child_of("str")
        .in_creature("c1");
    runtime
        .stores()
        .properties
        .insert(note)
        .expect("note inserted");
    settle().await;

    assert!(handle.property("n1").is_some());
    let children: Vec<String> = handle
        .children("str")
        .into_iter()
        .map(|child| child.id)
        .collect();
    assert_eq!(children, vec!["n1".to_owned()]);
    assert_eq!(handle.ancestors("n1")[0].id, "str");
    assert_eq!(handle.descendants("str").len(), 1);
    assert_eq!(handle.properties_of_type(PropertyType::Note).len(), 1);

    runtime
        .stores()
        .properties
        .remove_subtree("str")
        .expect("removed");
    settle().await;
    assert!(handle.properties().is_empty());
    runtime.release(handle).expect("release");
}
