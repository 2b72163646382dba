//! Decisions an action asks its input provider for, and the recorded answers.
//!
//! A simulation records every answer as a [`Decision`]; running the action
//! later replays them in order. Applying the same task stack asks the same
//! questions in the same order, which is what makes replay exact.

use std::fmt;

use creature_core::property::ActionTarget;
use creature_core::{CreatureId, DiceRequest, PropertyId};
use serde::{Deserialize, Serialize};

/// Roll mode for a d20.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Advantage {
    #[default]
    None,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Advantage and disadvantage cancel out.
    pub fn from_counts(advantage: u32, disadvantage: u32) -> Self {
        match (advantage > 0, disadvantage > 0) {
            (true, false) => Self::Advantage,
            (false, true) => Self::Disadvantage,
            _ => Self::None,
        }
    }

    /// Number of d20s rolled.
    pub fn dice(self) -> u32 {
        match self {
            Self::None => 1,
            Self::Advantage | Self::Disadvantage => 2,
        }
    }

    /// Log title suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Advantage => " (Advantage)",
            Self::Disadvantage => " (Disadvantage)",
        }
    }
}

/// A check or saving throw about to be rolled.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckParams {
    pub creature_id: CreatureId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_id: Option<PropertyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_variable: Option<String>,
    pub label: String,
    pub modifier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<f64>,
    #[serde(default)]
    pub advantage: Advantage,
}

/// Which spell to cast and which slot pays for it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell_id: Option<PropertyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<PropertyId>,
    #[serde(default)]
    pub ritual: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionKind {
    RollDice,
    Choose,
    TargetIds,
    Advantage,
    Check,
    CastSpell,
    NextStep,
}

impl DecisionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RollDice => "rollDice",
            Self::Choose => "choose",
            Self::TargetIds => "targetIds",
            Self::Advantage => "advantage",
            Self::Check => "check",
            Self::CastSpell => "castSpell",
            Self::NextStep => "nextStep",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A question the engine needs answered before it can continue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DecisionRequest {
    RollDice {
        requests: Vec<DiceRequest>,
    },
    Choose {
        options: Vec<PropertyId>,
        min: usize,
        max: usize,
    },
    TargetIds {
        prop_id: PropertyId,
        target: ActionTarget,
    },
    Advantage {
        suggested: Advantage,
    },
    Check {
        suggested: CheckParams,
    },
    CastSpell {
        suggested: CastOptions,
    },
    NextStep,
}

impl DecisionRequest {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::RollDice { .. } => DecisionKind::RollDice,
            Self::Choose { .. } => DecisionKind::Choose,
            Self::TargetIds { .. } => DecisionKind::TargetIds,
            Self::Advantage { .. } => DecisionKind::Advantage,
            Self::Check { .. } => DecisionKind::Check,
            Self::CastSpell { .. } => DecisionKind::CastSpell,
            Self::NextStep => DecisionKind::NextStep,
        }
    }
}

/// One recorded answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Decision {
    RollDice { values: Vec<Vec<i64>> },
    Choose { chosen: Vec<PropertyId> },
    TargetIds { target_ids: Vec<CreatureId> },
    Advantage { advantage: Advantage },
    Check { params: CheckParams },
    CastSpell { options: CastOptions },
    NextStep,
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::RollDice { .. } => DecisionKind::RollDice,
            Self::Choose { .. } => DecisionKind::Choose,
            Self::TargetIds { .. } => DecisionKind::TargetIds,
            Self::Advantage { .. } => DecisionKind::Advantage,
            Self::Check { .. } => DecisionKind::Check,
            Self::CastSpell { .. } => DecisionKind::CastSpell,
            Self::NextStep => DecisionKind::NextStep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advantage_and_disadvantage_cancel() {
        assert_eq!(Advantage::from_counts(1, 0), Advantage::Advantage);
        assert_eq!(Advantage::from_counts(0, 2), Advantage::Disadvantage);
        assert_eq!(Advantage::from_counts(1, 1), Advantage::None);
        assert_eq!(Advantage::Advantage.dice(), 2);
    }

    #[test]
    fn decisions_round_trip_through_json() {
        let decisions = vec![
            Decision::RollDice {
                values: vec![vec![15, 9]],
            },
            Decision::Advantage {
                advantage: Advantage::Advantage,
            },
            Decision::NextStep,
        ];
        let json = serde_json::to_string(&decisions).expect("serialize");
        assert!(json.contains(r#""kind":"rollDice""#));
        let back: Vec<Decision> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, decisions);
    }
}
