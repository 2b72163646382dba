//! Runs compute passes against the stores.
//!
//! The pass itself is pure and synchronous, so it runs on the blocking pool.
//! A pass that panics or rejects the tree still writes a `crash` error onto
//! the creature, together with the property count, so the sheet shows why it
//! stopped updating.

use std::any::Any;

use creature_core::{ComputeError, CreatureId, EngineConfig, compute};
use tracing::{debug, warn};

use crate::api::{Result, RuntimeError};
use crate::repository::{CreatureUpdate, Stores};

/// What one pass wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComputeSummary {
    pub creature_id: CreatureId,
    pub prop_count: usize,
    pub property_updates: usize,
    pub variables_written: bool,
    pub compute_errors: Vec<ComputeError>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "compute pass panicked".to_owned()
    }
}

/// Recomputes one creature and writes back only what changed.
pub async fn compute_creature(
    stores: &Stores,
    config: &EngineConfig,
    creature_id: &str,
) -> Result<ComputeSummary> {
    if stores.creatures.get(creature_id)?.is_none() {
        return Err(RuntimeError::CreatureNotFound(creature_id.to_owned()));
    }
    let properties = stores.properties.for_root(creature_id)?;
    let stored_variables = stores.variables.get(creature_id)?;
    let prop_count = properties.len();

    let pass_config = config.clone();
    let joined = tokio::task::spawn_blocking(move || {
        compute(properties, stored_variables.as_ref(), &pass_config)
    })
    .await;

    let outcome = match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(error)) => {
            warn!(
                target: "runtime::compute",
                creature_id,
                %error,
                "compute pass rejected the tree"
            );
            return write_crash(stores, creature_id, prop_count, error.to_string());
        }
        Err(error) if error.is_panic() => {
            let message = panic_message(error.into_panic().as_ref());
            warn!(target: "runtime::compute", creature_id, %message, "compute pass panicked");
            return write_crash(stores, creature_id, prop_count, message);
        }
        Err(error) => return Err(RuntimeError::WorkerJoin(error)),
    };

    // Cleared first so the writes below are not read as fresh changes.
    stores.properties.clear_dirty(creature_id)?;
    for update in &outcome.property_updates {
        stores.properties.apply_update(update)?;
    }
    let variables_written = outcome.variables.is_some();
    if let Some(variables) = outcome.variables.clone() {
        stores.variables.put(creature_id, variables)?;
    }
    stores.creatures.apply_update(
        creature_id,
        &CreatureUpdate::new(outcome.compute_errors.clone(), outcome.prop_count),
    )?;

    debug!(
        target: "runtime::compute",
        creature_id,
        prop_count = outcome.prop_count,
        diffs = outcome.property_updates.len(),
        variables_written,
        "creature computed"
    );
    Ok(ComputeSummary {
        creature_id: creature_id.to_owned(),
        prop_count: outcome.prop_count,
        property_updates: outcome.property_updates.len(),
        variables_written,
        compute_errors: outcome.compute_errors,
    })
}

fn write_crash(
    stores: &Stores,
    creature_id: &str,
    prop_count: usize,
    message: String,
) -> Result<ComputeSummary> {
    let errors = vec![ComputeError::crash(message)];
    stores
        .creatures
        .apply_update(creature_id, &CreatureUpdate::new(errors.clone(), prop_count))?;
    Ok(ComputeSummary {
        creature_id: creature_id.to_owned(),
        prop_count,
        property_updates: 0,
        variables_written: false,
        compute_errors: errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeFeed;
    use crate::repository::Creature;
    use creature_core::property::{AttributeProp, AttributeType};
    use creature_core::{ComputeErrorKind, Property, PropertyKind};

    fn strength() -> Property {
        Property::new(
            "str",
            PropertyKind::Attribute(AttributeProp {
                variable_name: "strength".into(),
                attribute_type: AttributeType::Ability,
                base_value: Some("14".into()),
                ..AttributeProp::default()
            }),
        )
        .in_creature("c1")
    }

    fn stores() -> Stores {
        let stores = Stores::in_memory(&ChangeFeed::new());
        stores.creatures.insert(Creature::new("c1")).expect("creature");
        stores.properties.insert(strength()).expect("property");
        stores
    }

    #[tokio::test]
    async fn writes_variables_and_clears_dirty() {
        let stores = stores();
        let summary = compute_creature(&stores, &EngineConfig::default(), "c1")
            .await
            .expect("compute");
        assert_eq!(summary.prop_count, 1);
        assert!(summary.variables_written);

        let variables = stores.variables.get("c1").expect("get").expect("variables");
        assert_eq!(variables.number("strength"), Some(14.0));
        let creature = stores.creatures.get("c1").expect("get").expect("creature");
        assert!(!creature.dirty);
        assert_eq!(creature.prop_count, 1);
        assert!(creature.compute_errors.is_empty());
    }

    #[tokio::test]
    async fn a_second_pass_writes_nothing() {
        let stores = stores();
        let config = EngineConfig::default();
        compute_creature(&stores, &config, "c1").await.expect("first");
        let summary = compute_creature(&stores, &config, "c1").await.expect("second");
        assert_eq!(summary.property_updates, 0);
        assert!(!summary.variables_written);
    }

    #[tokio::test]
    async fn too_many_properties_is_a_warning() {
        let stores = stores();
        let summary = compute_creature(&stores, &EngineConfig::with_max_props(0), "c1")
            .await
            .expect("compute");
        assert_eq!(summary.compute_errors.len(), 1);
        assert_eq!(summary.compute_errors[0].kind, ComputeErrorKind::Warning);
    }

    #[tokio::test]
    async fn unknown_creatures_are_rejected() {
        let stores = stores();
        let error = compute_creature(&stores, &EngineConfig::default(), "nobody")
            .await
            .expect_err("missing");
        assert!(matches!(error, RuntimeError::CreatureNotFound(_)));
    }
}
