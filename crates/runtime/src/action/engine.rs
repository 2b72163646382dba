//! Task interpreter.
//!
//! [`ActionEngine`] walks an action's task tree depth first, appending a
//! [`TaskResult`] for everything it logs, pushes or mutates. Mutations are
//! buffered on the action and mirrored onto the engine's working copy of each
//! creature, so later tasks see earlier damage while nothing reaches a store
//! until the action is written.

use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::pin::Pin;

use creature_core::compute::recalculate;
use creature_core::formula::{inline, pending_rolls};
use creature_core::property::{ActionTarget, TriggerTiming};
use creature_core::{
    CalculationError, Context, CreatureId, DiceRequest, Node, NoDice, Property, PropertyId,
    PropertyTree, PropertyType, QueuedRolls, ResolveLevel, Scope, ScopeEntry, TriggerFamily, Value,
    resolve,
};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use super::error::{ActionError, Result};
use super::scope::effective_scope;
use super::types::{DamagePropTask, EngineAction, LogContent, Mutation, PropTask, Task, TaskResult};
use crate::api::InputProvider;

pub(crate) type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// One creature as an action sees it.
#[derive(Clone, Debug)]
pub struct CreatureSnapshot {
    pub creature_id: CreatureId,
    pub tree: PropertyTree,
    pub variables: Scope,
}

/// Loads the creatures an action touches.
pub trait CreatureSource: Send + Sync {
    fn snapshot(&self, creature_id: &str) -> Result<CreatureSnapshot>;
}

/// A calculation rolled and reduced.
#[derive(Clone, Debug)]
pub(crate) struct Rolled {
    /// The tree after rolling, printed as the roll's working.
    pub rolled: Node,
    pub value: Option<Value>,
    pub errors: Vec<CalculationError>,
}

impl Rolled {
    fn failed(errors: Vec<CalculationError>) -> Self {
        Self {
            rolled: Node::error("calculation failed"),
            value: None,
            errors,
        }
    }

    pub fn number(&self) -> Option<f64> {
        self.value.as_ref().and_then(Value::as_number)
    }

    pub fn is_truthy(&self) -> bool {
        self.value.as_ref().is_some_and(Value::is_truthy)
    }

    pub fn text(&self) -> String {
        self.rolled.to_string()
    }
}

pub struct ActionEngine<'a> {
    pub(super) action: &'a mut EngineAction,
    pub(super) provider: &'a dyn InputProvider,
    source: &'a dyn CreatureSource,
    creatures: HashMap<CreatureId, CreatureSnapshot>,
    max_tasks: usize,
    /// Names pushed by the task currently running.
    pushed: Vec<String>,
    inserted: u64,
}

impl<'a> ActionEngine<'a> {
    pub fn new(
        action: &'a mut EngineAction,
        provider: &'a dyn InputProvider,
        source: &'a dyn CreatureSource,
        max_tasks: usize,
    ) -> Self {
        Self {
            action,
            provider,
            source,
            creatures: HashMap::new(),
            max_tasks,
            pushed: Vec::new(),
            inserted: 0,
        }
    }

    /// Applies the action's root task.
    pub async fn run(mut self) -> Result<()> {
        let creature_id = self.action.creature_id.clone();
        self.load(&creature_id)?;
        self.ask_for_targets().await?;
        let task = self.action.task.clone();
        for target_id in task.target_ids() {
            self.load(target_id)?;
        }
        debug!(
            target: "runtime::action",
            action_id = %self.action.id,
            creature_id = %creature_id,
            targets = task.target_ids().len(),
            "applying action"
        );
        self.apply_task(task).await?;
        debug!(
            target: "runtime::action",
            action_id = %self.action.id,
            tasks = self.action.task_count,
            results = self.action.results.len(),
            "action applied"
        );
        Ok(())
    }

    async fn ask_for_targets(&mut self) -> Result<()> {
        if self.action.tabletop_id.is_none() {
            return Ok(());
        }
        let Task::Prop(task) = &self.action.task else {
            return Ok(());
        };
        if !task.target_ids.is_empty() {
            return Ok(());
        }
        let prop_id = task.prop_id.clone();
        let Some(target) = self
            .property(&prop_id)
            .and_then(|property| property.kind.action())
            .map(|action| action.target)
        else {
            return Ok(());
        };
        if target == ActionTarget::Caster {
            return Ok(());
        }
        let target_ids = self.provider.target_ids(&prop_id, target).await?;
        if let Task::Prop(task) = &mut self.action.task {
            task.target_ids = target_ids;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Creatures
    // ------------------------------------------------------------------

    pub(super) fn load(&mut self, creature_id: &str) -> Result<()> {
        if !self.creatures.contains_key(creature_id) {
            let snapshot = self.source.snapshot(creature_id)?;
            trace!(
                target: "runtime::action",
                creature_id,
                properties = snapshot.tree.len(),
                "loaded creature"
            );
            self.creatures.insert(creature_id.to_owned(), snapshot);
        }
        Ok(())
    }

    pub(super) fn creature(&mut self, creature_id: &str) -> Result<&CreatureSnapshot> {
        self.load(creature_id)?;
        self.creatures
            .get(creature_id)
            .ok_or_else(|| ActionError::CreatureNotFound(creature_id.to_owned()))
    }

    /// The creature owning `prop_id`, preferring the acting creature.
    fn owner_of(&self, prop_id: &str) -> Option<&CreatureSnapshot> {
        self.creatures
            .get(&self.action.creature_id)
            .filter(|snapshot| snapshot.tree.contains(prop_id))
            .or_else(|| {
                self.creatures
                    .values()
                    .find(|snapshot| snapshot.tree.contains(prop_id))
            })
    }

    pub(super) fn property(&self, prop_id: &str) -> Option<&Property> {
        self.owner_of(prop_id)?.tree.get(prop_id)
    }

    pub(super) fn require(&self, prop_id: &str) -> Result<Property> {
        self.property(prop_id)
            .cloned()
            .ok_or_else(|| ActionError::PropertyNotFound(prop_id.to_owned()))
    }

    fn property_mut(&mut self, prop_id: &str) -> Option<&mut Property> {
        let owner = self.owner_of(prop_id)?.creature_id.clone();
        self.creatures.get_mut(&owner)?.tree.get_mut(prop_id)
    }

    /// A loaded creature's working tree.
    pub(super) fn tree(&self, creature_id: &str) -> Option<&PropertyTree> {
        self.creatures.get(creature_id).map(|snapshot| &snapshot.tree)
    }

    pub(super) fn owner_id(&self, prop_id: &str) -> Option<CreatureId> {
        self.owner_of(prop_id).map(|snapshot| snapshot.creature_id.clone())
    }

    /// A property followed by its descendants, in tree order.
    pub(super) fn subtree(&self, prop_id: &str) -> Vec<Property> {
        let Some(snapshot) = self.owner_of(prop_id) else {
            return Vec::new();
        };
        snapshot
            .tree
            .get(prop_id)
            .into_iter()
            .chain(snapshot.tree.descendants(prop_id))
            .cloned()
            .collect()
    }

    pub(super) fn nearest_ancestor_of_type(
        &self,
        prop_id: &str,
        kind: PropertyType,
    ) -> Option<Property> {
        self.owner_of(prop_id)?
            .tree
            .nearest_ancestor_of_type(prop_id, kind)
            .cloned()
    }

    /// Active children of a property, in tree order.
    pub(super) fn active_children(&self, prop_id: &str) -> Vec<PropertyId> {
        self.owner_of(prop_id)
            .map(|snapshot| {
                snapshot
                    .tree
                    .children(prop_id)
                    .into_iter()
                    .filter(|child| child.is_active())
                    .map(|child| child.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// The acting creature's variables overlaid with every result so far.
    pub(super) fn scope(&self) -> Scope {
        match self.creatures.get(&self.action.creature_id) {
            Some(snapshot) => effective_scope(&snapshot.variables, &self.action.results),
            None => effective_scope(&Scope::new(), &self.action.results),
        }
    }

    pub(super) fn new_result(&mut self, prop_id: Option<&str>, target_ids: &[CreatureId]) -> usize {
        self.action
            .results
            .push(TaskResult::new(prop_id.map(str::to_owned), target_ids.to_vec()));
        self.action.results.len() - 1
    }

    pub(super) fn log(&mut self, index: usize, content: LogContent, target_ids: &[CreatureId]) {
        if let Some(result) = self.action.results.get_mut(index) {
            result.append_log(content, target_ids.to_vec());
        }
    }

    /// Logs every calculation error as its own error line.
    pub(super) fn log_errors(
        &mut self,
        index: usize,
        errors: &[CalculationError],
        target_ids: &[CreatureId],
    ) {
        for error in errors {
            self.log(index, LogContent::error(error.message.clone()), target_ids);
        }
    }

    /// Records a mutation and mirrors it onto the working creatures.
    pub(super) fn mutate(&mut self, index: usize, mutation: Mutation) -> Result<()> {
        for update in &mutation.updates {
            if let Some(property) = self.property_mut(&update.prop_id) {
                update.apply_to(property)?;
            }
        }
        for removal in &mutation.removals {
            let Some(owner) = self.owner_of(&removal.prop_id).map(|s| s.creature_id.clone())
            else {
                continue;
            };
            if let Some(snapshot) = self.creatures.get_mut(&owner) {
                let ids: Vec<PropertyId> = std::iter::once(removal.prop_id.clone())
                    .chain(
                        snapshot
                            .tree
                            .descendants(&removal.prop_id)
                            .iter()
                            .map(|property| property.id.clone()),
                    )
                    .collect();
                for id in ids {
                    if let Some(property) = snapshot.tree.get_mut(&id) {
                        property.removed = true;
                    }
                }
            }
        }
        if let Some(result) = self.action.results.get_mut(index) {
            result.mutations.push(mutation);
        }
        Ok(())
    }

    /// Stacks `entry` over `name` until the running task finishes.
    pub(super) fn push_scope(&mut self, index: usize, name: &str, entry: ScopeEntry) {
        if let Some(result) = self.action.results.get_mut(index)
            && result.push_scope.insert(name, entry).is_none()
        {
            self.pushed.push(name.to_owned());
        }
    }

    /// Writes `entry` over `name` for the rest of the action.
    pub(super) fn set_scope(&mut self, index: usize, name: &str, entry: ScopeEntry) {
        if let Some(result) = self.action.results.get_mut(index) {
            result.scope.insert(name, entry);
        }
    }

    /// Pops everything the running task pushed so far, in a result of its own.
    pub(super) fn pop_pushed(&mut self, prop_id: Option<&str>, target_ids: &[CreatureId]) -> usize {
        let mut pushed = mem::take(&mut self.pushed);
        pushed.reverse();
        let index = self.new_result(prop_id, target_ids);
        if let Some(result) = self.action.results.get_mut(index) {
            result.pop_scope = pushed;
        }
        index
    }

    /// A deterministic id for a property copied by this action.
    pub(super) fn fresh_id(&mut self, source_id: &str, target_id: &str) -> PropertyId {
        self.inserted += 1;
        let digest = Sha256::new()
            .chain_update(self.action.id.as_bytes())
            .chain_update(self.inserted.to_be_bytes())
            .chain_update(source_id.as_bytes())
            .chain_update(target_id.as_bytes())
            .finalize();
        hex::encode(&digest[..9])
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Applies one task and, once it finishes, pops whatever it pushed.
    pub(super) fn apply_task(&mut self, task: Task) -> TaskFuture<'_> {
        Box::pin(async move {
            self.begin_task(&task).await?;
            let frame = mem::take(&mut self.pushed);
            let prop_id = task.prop_id().map(str::to_owned);
            let outcome = match task {
                Task::Prop(task) => self.apply_prop(task).await,
                Task::DamageProp(task) => self.damage_prop_body(task).await.map(drop),
                Task::ItemAsAmmo(task) => self.item_as_ammo(task).await,
                Task::Check(task) => self.check(task).await,
                Task::Reset(task) => self.reset(task).await,
                Task::CastSpell(task) => self.cast_spell(task).await,
            };
            let pushed = mem::replace(&mut self.pushed, frame);
            self.close_scope(prop_id, pushed);
            outcome
        })
    }

    /// Runs a damage task and returns the increment it applied.
    pub(super) async fn damage_prop(&mut self, task: DamagePropTask) -> Result<f64> {
        self.begin_task(&Task::DamageProp(task.clone())).await?;
        let frame = mem::take(&mut self.pushed);
        let prop_id = task.target_prop_id.clone();
        let outcome = self.damage_prop_body(task).await;
        let pushed = mem::replace(&mut self.pushed, frame);
        self.close_scope(prop_id, pushed);
        outcome
    }

    async fn begin_task(&mut self, task: &Task) -> Result<()> {
        self.action.task_count += 1;
        if self.action.task_count > self.max_tasks {
            return Err(ActionError::TaskLimitExceeded {
                limit: self.max_tasks,
            });
        }
        trace!(
            target: "runtime::action",
            task_count = self.action.task_count,
            prop_id = ?task.prop_id(),
            "task"
        );
        if self.action.step_through {
            self.provider.next_step(task).await?;
        }
        Ok(())
    }

    fn close_scope(&mut self, prop_id: Option<PropertyId>, mut pushed: Vec<String>) {
        if pushed.is_empty() {
            return;
        }
        pushed.reverse();
        let mut result = TaskResult::new(prop_id, Vec::new());
        result.pop_scope = pushed;
        self.action.results.push(result);
    }

    async fn apply_prop(&mut self, task: PropTask) -> Result<()> {
        let property = self.require(&task.prop_id)?;
        for target_id in &task.target_ids {
            self.load(target_id)?;
        }
        self.apply_triggers(
            &property,
            TriggerFamily::Prop,
            TriggerTiming::Before,
            &task.target_ids,
        )
        .await?;
        trace!(
            target: "runtime::action",
            prop_id = %property.id,
            kind = property.property_type().as_ref(),
            "applying property"
        );
        self.apply_property(property, task.target_ids).await
    }

    /// After triggers, children, then after-children triggers.
    pub(super) async fn default_tail(
        &mut self,
        property: &Property,
        target_ids: &[CreatureId],
    ) -> Result<()> {
        self.apply_triggers(property, TriggerFamily::Prop, TriggerTiming::After, target_ids)
            .await?;
        self.apply_children(&property.id, target_ids).await?;
        self.apply_triggers(
            property,
            TriggerFamily::Prop,
            TriggerTiming::AfterChildren,
            target_ids,
        )
        .await
    }

    pub(super) async fn apply_children(
        &mut self,
        prop_id: &str,
        target_ids: &[CreatureId],
    ) -> Result<()> {
        for child_id in self.active_children(prop_id) {
            // A sibling may have removed this one.
            if !self.property(&child_id).is_some_and(Property::is_active) {
                continue;
            }
            self.apply_task(Task::Prop(PropTask {
                prop_id: child_id,
                target_ids: target_ids.to_vec(),
            }))
            .await?;
        }
        Ok(())
    }

    /// Fires the linked triggers of one family and timing whose condition holds.
    pub(super) async fn apply_triggers(
        &mut self,
        property: &Property,
        family: TriggerFamily,
        timing: TriggerTiming,
        target_ids: &[CreatureId],
    ) -> Result<()> {
        let Some(ids) = property.derived.triggers(family) else {
            return Ok(());
        };
        let ids = match timing {
            TriggerTiming::Before => ids.before.clone(),
            TriggerTiming::After => ids.after.clone(),
            TriggerTiming::AfterChildren => ids.after_children.clone(),
        };
        for trigger_id in ids {
            let Some(trigger) = self.property(&trigger_id).filter(|t| t.is_active()).cloned()
            else {
                continue;
            };
            if trigger.calculation("condition").is_some() {
                let condition = self.roll_calculation(&trigger, "condition").await?;
                if !condition.is_some_and(|condition| condition.is_truthy()) {
                    continue;
                }
            }
            self.apply_task(Task::Prop(PropTask {
                prop_id: trigger_id,
                target_ids: target_ids.to_vec(),
            }))
            .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Calculations
    // ------------------------------------------------------------------

    /// Compiles a calculated field from its formula against the action scope,
    /// with the effects the last compute linked to it applied again.
    fn calculation_node(
        &self,
        property: &Property,
        path: &str,
        scope: &Scope,
        context: &mut Context,
    ) -> Option<Node> {
        match self.owner_of(&property.id) {
            Some(snapshot) => recalculate(&snapshot.tree, property, path, scope, context),
            None => property.calculation(path)?.node(),
        }
    }

    /// Rolls and reduces a calculated field against the action scope.
    pub(super) async fn roll_calculation(
        &mut self,
        property: &Property,
        path: &str,
    ) -> Result<Option<Rolled>> {
        let scope = self.scope();
        let mut context = Context::new();
        let Some(compiled) = self.calculation_node(property, path, &scope, &mut context) else {
            return Ok(None);
        };
        if compiled.is_error() {
            return Ok(Some(Rolled::failed(context.errors)));
        }
        self.roll_compiled(compiled, &scope, context).await.map(Some)
    }

    async fn roll_compiled(
        &mut self,
        compiled: Node,
        scope: &Scope,
        mut context: Context,
    ) -> Result<Rolled> {
        let requests = pending_rolls(&compiled);
        let outcomes = self.roll_dice(&requests).await?;
        let mut dice = QueuedRolls::new(&requests, outcomes);
        let rolled = resolve(ResolveLevel::Roll, &compiled, scope, &mut context, &mut dice);
        let reduced = resolve(ResolveLevel::Reduce, &rolled, scope, &mut context, &mut NoDice);
        Ok(Rolled {
            value: reduced.as_constant().cloned(),
            rolled,
            errors: context.errors,
        })
    }

    /// Compiles a calculated field without rolling, as its text.
    pub(super) fn compile_calculation(&self, property: &Property, path: &str) -> Option<String> {
        let scope = self.scope();
        let compiled = self.calculation_node(property, path, &scope, &mut Context::new())?;
        (!compiled.is_error()).then(|| compiled.to_string())
    }

    pub(super) async fn roll_dice(&mut self, requests: &[DiceRequest]) -> Result<Vec<Vec<i64>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        self.provider.roll_dice(requests).await
    }

    /// Renders an inline text field with its calculations reduced.
    pub(super) async fn render_text(
        &mut self,
        property: &Property,
        field: &str,
    ) -> Result<Option<String>> {
        let text = property
            .kind
            .texts()
            .into_iter()
            .find(|(name, _)| *name == field)
            .map(|(_, text)| text.text.clone());
        match text {
            Some(text) if !text.is_empty() => self.render_inline(&text).await.map(Some),
            _ => Ok(None),
        }
    }

    pub(super) async fn render_inline(&mut self, text: &str) -> Result<String> {
        let scope = self.scope();
        let mut requests = Vec::new();
        for node in inline::calculations(text) {
            let compiled = resolve(
                ResolveLevel::Compile,
                &node,
                &scope,
                &mut Context::new(),
                &mut NoDice,
            );
            requests.extend(pending_rolls(&compiled));
        }
        let outcomes = self.roll_dice(&requests).await?;
        let mut dice = QueuedRolls::new(&requests, outcomes);
        Ok(inline::render(
            text,
            ResolveLevel::Reduce,
            &scope,
            &mut Context::new(),
            &mut dice,
        ))
    }
}
