//! Entry points: apply an action, simulate it, and write its results.
//!
//! Applying never touches a store. A simulation records every answer the
//! provider gave; running the action replays those answers, so the written
//! results are the ones the player saw.

use std::collections::BTreeSet;

use chrono::Utc;
use creature_core::{CreatureId, EngineConfig, PropertyTree, Scope};
use tracing::{debug, info};

use super::engine::{ActionEngine, CreatureSnapshot, CreatureSource};
use super::error::{ActionError, Result};
use super::types::EngineAction;
use crate::api::{
    Decision, DecisionRequest, InputProvider, RecordingInputProvider, ReplayInputProvider,
    RuntimeError,
};
use crate::compute::{ComputeSummary, compute_creature};
use crate::repository::{LogEntry, RepositoryError, Stores};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Record the provider's answers onto the action.
    pub simulate: bool,
    /// Call the provider's `next_step` before every task.
    pub step_through: bool,
}

/// How a simulation ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Simulation {
    Complete(EngineAction),
    /// The provider stopped to ask; `decisions` were answered before it did.
    NeedsInput {
        request: DecisionRequest,
        decisions: Vec<Decision>,
    },
}

/// Reads creatures straight from the stores.
pub struct StoreSource<'a> {
    stores: &'a Stores,
}

impl<'a> StoreSource<'a> {
    pub fn new(stores: &'a Stores) -> Self {
        Self { stores }
    }
}

impl CreatureSource for StoreSource<'_> {
    fn snapshot(&self, creature_id: &str) -> Result<CreatureSnapshot> {
        if self.stores.creatures.get(creature_id)?.is_none() {
            return Err(ActionError::CreatureNotFound(creature_id.to_owned()));
        }
        let properties = self.stores.properties.for_root(creature_id)?;
        let variables = self.stores.variables.get(creature_id)?.unwrap_or_else(Scope::new);
        Ok(CreatureSnapshot {
            creature_id: creature_id.to_owned(),
            tree: PropertyTree::new(properties)?,
            variables,
        })
    }
}

/// Applies the action's task tree, replacing any earlier results.
pub async fn apply_action(
    action: &mut EngineAction,
    provider: &dyn InputProvider,
    source: &dyn CreatureSource,
    options: ApplyOptions,
    max_tasks: usize,
) -> Result<()> {
    if options.step_through && !options.simulate {
        return Err(ActionError::StepThroughRequiresSimulation);
    }
    action.task_count = 0;
    action.results.clear();
    action.is_simulation = options.simulate;
    action.step_through = options.step_through;

    if !options.simulate {
        return ActionEngine::new(action, provider, source, max_tasks).run().await;
    }
    let recorder = RecordingInputProvider::new(provider);
    let outcome = ActionEngine::new(action, &recorder, source, max_tasks)
        .run()
        .await;
    action.decisions = recorder.decisions();
    outcome
}

/// Simulates a stored action without writing anything.
pub async fn simulate_action(
    stores: &Stores,
    action_id: &str,
    provider: &dyn InputProvider,
    max_tasks: usize,
) -> std::result::Result<Simulation, RuntimeError> {
    let mut action = stores
        .actions
        .get(action_id)?
        .ok_or_else(|| RuntimeError::ActionNotFound(action_id.to_owned()))?;
    let source = StoreSource::new(stores);
    let options = ApplyOptions {
        simulate: true,
        step_through: false,
    };
    match apply_action(&mut action, provider, &source, options, max_tasks).await {
        Ok(()) => Ok(Simulation::Complete(action)),
        Err(ActionError::InputRequested(request)) => Ok(Simulation::NeedsInput {
            request: *request,
            decisions: action.decisions,
        }),
        Err(error) => Err(error.into()),
    }
}

/// Replays a stored action with recorded decisions, then writes it.
pub async fn run_action(
    stores: &Stores,
    config: &EngineConfig,
    action_id: &str,
    decisions: Vec<Decision>,
    max_tasks: usize,
) -> std::result::Result<EngineAction, RuntimeError> {
    let mut action = stores
        .actions
        .get(action_id)?
        .ok_or_else(|| RuntimeError::ActionNotFound(action_id.to_owned()))?;
    let provider = ReplayInputProvider::new(decisions);
    let source = StoreSource::new(stores);
    apply_action(
        &mut action,
        &provider,
        &source,
        ApplyOptions::default(),
        max_tasks,
    )
    .await?;
    write_action_results(stores, config, &action).await?;
    Ok(action)
}

/// Persists an applied action and recomputes every creature it touched.
///
/// The action must still be in the action store; it is removed first, so a
/// second write of the same action fails.
pub async fn write_action_results(
    stores: &Stores,
    config: &EngineConfig,
    action: &EngineAction,
) -> std::result::Result<Vec<ComputeSummary>, RuntimeError> {
    if stores.actions.remove(&action.id)?.is_none() {
        return Err(RuntimeError::ActionNotFound(action.id.clone()));
    }

    let mut touched: Vec<CreatureId> = vec![action.creature_id.clone()];
    let mut logged_targets = BTreeSet::new();
    let (mut updates, mut removals, mut inserts) = (0, 0, 0);
    for mutation in action.mutations() {
        for target_id in &mutation.target_ids {
            if !touched.contains(target_id) {
                touched.push(target_id.clone());
            }
            if !mutation.contents.is_empty() {
                logged_targets.insert(target_id.clone());
            }
        }
        for update in &mutation.updates {
            let mut property = stores
                .properties
                .get(&update.prop_id)?
                .ok_or_else(|| RepositoryError::PropertyNotFound(update.prop_id.clone()))?;
            update.apply_to(&mut property).map_err(ActionError::from)?;
            property.dirty = true;
            stores.properties.update(property)?;
            updates += 1;
        }
        for removal in &mutation.removals {
            removals += stores.properties.remove_subtree(&removal.prop_id)?;
        }
        for insert in &mutation.inserts {
            let mut property = insert.clone();
            property.dirty = true;
            stores.properties.insert(property)?;
            inserts += 1;
        }
    }

    stores.logs.append(LogEntry {
        creature_id: action.creature_id.clone(),
        tabletop_id: action.tabletop_id.clone(),
        action_id: Some(action.id.clone()),
        content: action.contents().cloned().collect(),
        target_ids: logged_targets.into_iter().collect(),
        date: Utc::now(),
    })?;
    info!(
        target: "runtime::action",
        action_id = %action.id,
        updates,
        removals,
        inserts,
        creatures = touched.len(),
        "action written"
    );

    let mut summaries = Vec::with_capacity(touched.len());
    for creature_id in &touched {
        if stores.creatures.get(creature_id)?.is_none() {
            debug!(
                target: "runtime::action",
                creature_id = %creature_id,
                "skipping unknown creature"
            );
            continue;
        }
        stores.creatures.mark_dirty(creature_id)?;
        summaries.push(compute_creature(stores, config, creature_id).await?);
    }
    Ok(summaries)
}
