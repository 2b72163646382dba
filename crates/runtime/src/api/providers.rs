//! Asynchronous abstraction for the choices an action needs.
//!
//! Runtime users plug in [`InputProvider`] implementations so actions can be
//! applied with seeded dice, asked of a person, or replayed from a record.
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use creature_core::property::ActionTarget;
use creature_core::{CreatureId, DiceRequest, PropertyId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::decisions::{
    Advantage, CastOptions, CheckParams, Decision, DecisionKind, DecisionRequest,
};
use crate::action::{ActionError, Result, Task};

/// Trait for answering the questions an action asks while it is applied.
///
/// Different implementations can handle:
/// - Seeded dice and suggested answers ([`DefaultInputProvider`])
/// - Stopping to ask a person ([`InteractiveInputProvider`])
/// - Replaying recorded answers ([`ReplayInputProvider`])
/// - Recording another provider's answers ([`RecordingInputProvider`])
#[async_trait]
pub trait InputProvider: Send + Sync {
    /// One outcome list per request, each as long as the request's dice count.
    async fn roll_dice(&self, requests: &[DiceRequest]) -> Result<Vec<Vec<i64>>>;

    /// Between `min` and `max` of `options`.
    async fn choose(&self, options: &[PropertyId], min: usize, max: usize)
    -> Result<Vec<PropertyId>>;

    /// Targets for a property that targets other creatures.
    async fn target_ids(&self, prop_id: &str, target: ActionTarget) -> Result<Vec<CreatureId>>;

    async fn advantage(&self, suggested: Advantage) -> Result<Advantage>;

    async fn check(&self, suggested: CheckParams) -> Result<CheckParams>;

    async fn cast_spell(&self, suggested: CastOptions) -> Result<CastOptions>;

    /// Called before every task when stepping through.
    async fn next_step(&self, task: &Task) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Dice {
    Seeded(Mutex<StdRng>),
    /// Die `i` of `NdS` shows `((ceil(S/2) - 1 + i) mod S) + 1`.
    Predictable,
}

/// Seeded dice, first-N choices, no targets, suggested answers.
pub struct DefaultInputProvider {
    dice: Dice,
}

impl DefaultInputProvider {
    /// Dice seeded from the action id, so an action always rolls the same.
    pub fn for_action(action_id: &str) -> Self {
        let digest = Sha256::digest(action_id.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        Self {
            dice: Dice::Seeded(Mutex::new(StdRng::from_seed(seed))),
        }
    }

    /// Dice that count up from the middle face.
    pub fn predictable() -> Self {
        Self {
            dice: Dice::Predictable,
        }
    }

    fn roll(&self, request: DiceRequest) -> Vec<i64> {
        let size = i64::from(request.dice_size.max(1));
        match &self.dice {
            Dice::Seeded(rng) => {
                let mut rng = lock(rng);
                (0..request.number).map(|_| rng.gen_range(1..=size)).collect()
            }
            Dice::Predictable => {
                let start = (size + 1) / 2 - 1;
                (0..i64::from(request.number))
                    .map(|i| (start + i) % size + 1)
                    .collect()
            }
        }
    }
}

#[async_trait]
impl InputProvider for DefaultInputProvider {
    async fn roll_dice(&self, requests: &[DiceRequest]) -> Result<Vec<Vec<i64>>> {
        Ok(requests.iter().map(|request| self.roll(*request)).collect())
    }

    async fn choose(
        &self,
        options: &[PropertyId],
        min: usize,
        max: usize,
    ) -> Result<Vec<PropertyId>> {
        Ok(options.iter().take(min.max(1).min(max)).cloned().collect())
    }

    async fn target_ids(&self, _prop_id: &str, _target: ActionTarget) -> Result<Vec<CreatureId>> {
        Ok(Vec::new())
    }

    async fn advantage(&self, suggested: Advantage) -> Result<Advantage> {
        Ok(suggested)
    }

    async fn check(&self, suggested: CheckParams) -> Result<CheckParams> {
        Ok(suggested)
    }

    async fn cast_spell(&self, suggested: CastOptions) -> Result<CastOptions> {
        Ok(suggested)
    }

    async fn next_step(&self, _task: &Task) -> Result<()> {
        Ok(())
    }
}

/// Stops at every decision with [`ActionError::InputRequested`].
#[derive(Clone, Copy, Debug, Default)]
pub struct InteractiveInputProvider;

fn ask<T>(request: DecisionRequest) -> Result<T> {
    Err(ActionError::InputRequested(Box::new(request)))
}

#[async_trait]
impl InputProvider for InteractiveInputProvider {
    async fn roll_dice(&self, requests: &[DiceRequest]) -> Result<Vec<Vec<i64>>> {
        ask(DecisionRequest::RollDice {
            requests: requests.to_vec(),
        })
    }

    async fn choose(
        &self,
        options: &[PropertyId],
        min: usize,
        max: usize,
    ) -> Result<Vec<PropertyId>> {
        ask(DecisionRequest::Choose {
            options: options.to_vec(),
            min,
            max,
        })
    }

    async fn target_ids(&self, prop_id: &str, target: ActionTarget) -> Result<Vec<CreatureId>> {
        ask(DecisionRequest::TargetIds {
            prop_id: prop_id.to_owned(),
            target,
        })
    }

    async fn advantage(&self, suggested: Advantage) -> Result<Advantage> {
        ask(DecisionRequest::Advantage { suggested })
    }

    async fn check(&self, suggested: CheckParams) -> Result<CheckParams> {
        ask(DecisionRequest::Check { suggested })
    }

    async fn cast_spell(&self, suggested: CastOptions) -> Result<CastOptions> {
        ask(DecisionRequest::CastSpell { suggested })
    }

    async fn next_step(&self, _task: &Task) -> Result<()> {
        ask(DecisionRequest::NextStep)
    }
}

/// Answers from recorded decisions, in order.
///
/// Once the record runs out, questions go to the fallback provider when one
/// is set, and fail with [`ActionError::DecisionsExhausted`] otherwise.
pub struct ReplayInputProvider {
    decisions: Mutex<VecDeque<Decision>>,
    fallback: Option<Box<dyn InputProvider>>,
}

impl ReplayInputProvider {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl InputProvider + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Decisions not consumed yet.
    pub fn remaining(&self) -> usize {
        lock(&self.decisions).len()
    }

    fn next(&self, expected: DecisionKind) -> Result<Option<Decision>> {
        let mut decisions = lock(&self.decisions);
        match decisions.front().map(Decision::kind) {
            None if self.fallback.is_some() => Ok(None),
            None => Err(ActionError::DecisionsExhausted(expected)),
            Some(found) if found != expected => {
                Err(ActionError::DecisionMismatch { expected, found })
            }
            Some(_) => Ok(decisions.pop_front()),
        }
    }

    fn fallback(&self, expected: DecisionKind) -> Result<&dyn InputProvider> {
        self.fallback
            .as_deref()
            .ok_or(ActionError::DecisionsExhausted(expected))
    }
}

/// Recorded dice must answer every request with its count of faces in range.
fn check_dice(requests: &[DiceRequest], values: &[Vec<i64>]) -> Result<()> {
    if requests.len() != values.len() {
        return Err(ActionError::DiceMismatch(format!(
            "{} rolls recorded for {} requested",
            values.len(),
            requests.len()
        )));
    }
    for (request, rolled) in requests.iter().zip(values) {
        let faces = i64::from(request.dice_size);
        if rolled.len() != request.number as usize
            || rolled.iter().any(|value| !(1..=faces).contains(value))
        {
            return Err(ActionError::DiceMismatch(format!(
                "{rolled:?} for {}d{}",
                request.number, request.dice_size
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl InputProvider for ReplayInputProvider {
    async fn roll_dice(&self, requests: &[DiceRequest]) -> Result<Vec<Vec<i64>>> {
        match self.next(DecisionKind::RollDice)? {
            Some(Decision::RollDice { values }) => {
                check_dice(requests, &values)?;
                Ok(values)
            }
            _ => self.fallback(DecisionKind::RollDice)?.roll_dice(requests).await,
        }
    }

    async fn choose(
        &self,
        options: &[PropertyId],
        min: usize,
        max: usize,
    ) -> Result<Vec<PropertyId>> {
        match self.next(DecisionKind::Choose)? {
            Some(Decision::Choose { chosen }) => Ok(chosen),
            _ => self.fallback(DecisionKind::Choose)?.choose(options, min, max).await,
        }
    }

    async fn target_ids(&self, prop_id: &str, target: ActionTarget) -> Result<Vec<CreatureId>> {
        match self.next(DecisionKind::TargetIds)? {
            Some(Decision::TargetIds { target_ids }) => Ok(target_ids),
            _ => {
                self.fallback(DecisionKind::TargetIds)?
                    .target_ids(prop_id, target)
                    .await
            }
        }
    }

    async fn advantage(&self, suggested: Advantage) -> Result<Advantage> {
        match self.next(DecisionKind::Advantage)? {
            Some(Decision::Advantage { advantage }) => Ok(advantage),
            _ => self.fallback(DecisionKind::Advantage)?.advantage(suggested).await,
        }
    }

    async fn check(&self, suggested: CheckParams) -> Result<CheckParams> {
        match self.next(DecisionKind::Check)? {
            Some(Decision::Check { params }) => Ok(params),
            _ => self.fallback(DecisionKind::Check)?.check(suggested).await,
        }
    }

    async fn cast_spell(&self, suggested: CastOptions) -> Result<CastOptions> {
        match self.next(DecisionKind::CastSpell)? {
            Some(Decision::CastSpell { options }) => Ok(options),
            _ => self.fallback(DecisionKind::CastSpell)?.cast_spell(suggested).await,
        }
    }

    async fn next_step(&self, task: &Task) -> Result<()> {
        match self.next(DecisionKind::NextStep)? {
            Some(_) => Ok(()),
            None => self.fallback(DecisionKind::NextStep)?.next_step(task).await,
        }
    }
}

/// Wraps a provider and records each answer it gives.
pub struct RecordingInputProvider<'a> {
    inner: &'a dyn InputProvider,
    recorded: Mutex<Vec<Decision>>,
}

impl<'a> RecordingInputProvider<'a> {
    pub fn new(inner: &'a dyn InputProvider) -> Self {
        Self {
            inner,
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Answers so far, in the order they were given.
    pub fn decisions(&self) -> Vec<Decision> {
        lock(&self.recorded).clone()
    }

    fn record(&self, decision: Decision) {
        lock(&self.recorded).push(decision);
    }
}

#[async_trait]
impl InputProvider for RecordingInputProvider<'_> {
    async fn roll_dice(&self, requests: &[DiceRequest]) -> Result<Vec<Vec<i64>>> {
        let values = self.inner.roll_dice(requests).await?;
        self.record(Decision::RollDice {
            values: values.clone(),
        });
        Ok(values)
    }

    async fn choose(
        &self,
        options: &[PropertyId],
        min: usize,
        max: usize,
    ) -> Result<Vec<PropertyId>> {
        let chosen = self.inner.choose(options, min, max).await?;
        self.record(Decision::Choose {
            chosen: chosen.clone(),
        });
        Ok(chosen)
    }

    async fn target_ids(&self, prop_id: &str, target: ActionTarget) -> Result<Vec<CreatureId>> {
        let target_ids = self.inner.target_ids(prop_id, target).await?;
        self.record(Decision::TargetIds {
            target_ids: target_ids.clone(),
        });
        Ok(target_ids)
    }

    async fn advantage(&self, suggested: Advantage) -> Result<Advantage> {
        let advantage = self.inner.advantage(suggested).await?;
        self.record(Decision::Advantage { advantage });
        Ok(advantage)
    }

    async fn check(&self, suggested: CheckParams) -> Result<CheckParams> {
        let params = self.inner.check(suggested).await?;
        self.record(Decision::Check {
            params: params.clone(),
        });
        Ok(params)
    }

    async fn cast_spell(&self, suggested: CastOptions) -> Result<CastOptions> {
        let options = self.inner.cast_spell(suggested).await?;
        self.record(Decision::CastSpell {
            options: options.clone(),
        });
        Ok(options)
    }

    async fn next_step(&self, task: &Task) -> Result<()> {
        self.inner.next_step(task).await?;
        self.record(Decision::NextStep);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(number: u32, dice_size: u32) -> DiceRequest {
        DiceRequest { number, dice_size }
    }

    #[tokio::test]
    async fn predictable_dice_count_up_from_the_middle() {
        let provider = DefaultInputProvider::predictable();
        let rolls = provider
            .roll_dice(&[d(1, 12), d(2, 6), d(1, 13), d(1, 20), d(10, 6)])
            .await
            .expect("roll");
        assert_eq!(rolls[0], vec![6]);
        assert_eq!(rolls[1], vec![3, 4]);
        assert_eq!(rolls[2], vec![7]);
        assert_eq!(rolls[3], vec![10]);
        assert_eq!(rolls[4], vec![3, 4, 5, 6, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn seeded_dice_repeat_per_action() {
        let first = DefaultInputProvider::for_action("action-1");
        let second = DefaultInputProvider::for_action("action-1");
        let request = [d(8, 20)];
        let a = first.roll_dice(&request).await.expect("roll");
        let b = second.roll_dice(&request).await.expect("roll");
        assert_eq!(a, b);
        assert!(a[0].iter().all(|&value| (1..=20).contains(&value)));
    }

    #[tokio::test]
    async fn replay_checks_kinds_and_exhaustion() {
        let replay = ReplayInputProvider::new(vec![Decision::Advantage {
            advantage: Advantage::Disadvantage,
        }]);
        let mismatch = replay.roll_dice(&[d(1, 20)]).await;
        assert!(matches!(
            mismatch,
            Err(ActionError::DecisionMismatch {
                expected: DecisionKind::RollDice,
                found: DecisionKind::Advantage,
            })
        ));
        let advantage = replay.advantage(Advantage::None).await.expect("recorded");
        assert_eq!(advantage, Advantage::Disadvantage);
        assert!(matches!(
            replay.advantage(Advantage::None).await,
            Err(ActionError::DecisionsExhausted(DecisionKind::Advantage))
        ));
    }

    #[tokio::test]
    async fn replay_rejects_dice_that_do_not_fit() {
        let replay = ReplayInputProvider::new(vec![
            Decision::RollDice { values: vec![vec![7, 2]] },
            Decision::RollDice { values: vec![vec![21]] },
            Decision::RollDice { values: vec![] },
            Decision::RollDice { values: vec![vec![4]] },
        ]);
        for _ in 0..3 {
            assert!(matches!(
                replay.roll_dice(&[d(1, 20)]).await,
                Err(ActionError::DiceMismatch(_))
            ));
        }
        assert_eq!(replay.roll_dice(&[d(1, 20)]).await.expect("roll"), vec![vec![4]]);
    }

    #[tokio::test]
    async fn default_choice_stays_within_the_maximum() {
        let options: Vec<PropertyId> = vec!["a".into(), "b".into(), "c".into()];
        let provider = DefaultInputProvider::predictable();
        assert_eq!(provider.choose(&options, 0, 3).await.expect("choose"), vec!["a".to_owned()]);
        assert_eq!(provider.choose(&options, 2, 3).await.expect("choose").len(), 2);
        assert!(provider.choose(&options, 1, 0).await.expect("choose").is_empty());
    }

    #[tokio::test]
    async fn replay_falls_back_once_exhausted() {
        let replay = ReplayInputProvider::new(Vec::new())
            .with_fallback(DefaultInputProvider::predictable());
        assert_eq!(replay.roll_dice(&[d(1, 20)]).await.expect("roll"), vec![vec![10]]);
    }

    #[tokio::test]
    async fn recorder_replays_identically() {
        let inner = DefaultInputProvider::for_action("seed");
        let recorder = RecordingInputProvider::new(&inner);
        let rolled = recorder.roll_dice(&[d(3, 6)]).await.expect("roll");
        recorder.advantage(Advantage::Advantage).await.expect("advantage");

        let replay = ReplayInputProvider::new(recorder.decisions());
        assert_eq!(replay.roll_dice(&[d(3, 6)]).await.expect("replayed"), rolled);
        assert_eq!(
            replay.advantage(Advantage::None).await.expect("replayed"),
            Advantage::Advantage
        );
        assert_eq!(replay.remaining(), 0);
    }

    #[tokio::test]
    async fn interactive_asks_for_everything() {
        let error = InteractiveInputProvider
            .advantage(Advantage::None)
            .await
            .expect_err("asks");
        assert_eq!(
            error.input_request().map(DecisionRequest::kind),
            Some(DecisionKind::Advantage)
        );
    }
}
