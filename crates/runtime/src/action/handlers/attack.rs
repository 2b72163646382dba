use creature_core::formula::signed_number;
use creature_core::{DiceRequest, EngineConfig, Property, ScopeEntry};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::LogContent;
use crate::api::Advantage;

/// The d20 of an attack or check, after advantage picked its die.
pub(super) struct D20 {
    pub value: f64,
    /// `[ 15, ~~9~~ ]` style working, without the modifier.
    pub dice_text: String,
}

impl D20 {
    pub fn from_rolls(advantage: Advantage, rolls: &[i64]) -> Self {
        let first = rolls.first().copied().unwrap_or(1);
        let second = rolls.get(1).copied().unwrap_or(first);
        let keep_first = match advantage {
            Advantage::None => {
                return Self {
                    value: first as f64,
                    dice_text: format!("[{first}]"),
                };
            }
            Advantage::Advantage => first >= second,
            Advantage::Disadvantage => first <= second,
        };
        let (value, dice_text) = if keep_first {
            (first, format!("[ {first}, ~~{second}~~ ]"))
        } else {
            (second, format!("[ ~~{first}~~, {second} ]"))
        };
        Self {
            value: value as f64,
            dice_text,
        }
    }
}

const ATTACK_NAMES: [&str; 6] = [
    "~attackHit",
    "~attackMiss",
    "~criticalHit",
    "~criticalMiss",
    "~attackRoll",
    "~attackDiceRoll",
];

impl ActionEngine<'_> {
    /// Rolls a d20 in the given mode through the provider.
    pub(super) async fn roll_d20(&mut self, advantage: Advantage) -> Result<D20> {
        let rolls = self
            .roll_dice(&[DiceRequest {
                number: advantage.dice(),
                dice_size: 20,
            }])
            .await?;
        let rolls = rolls.into_iter().next().unwrap_or_default();
        Ok(D20::from_rolls(advantage, &rolls))
    }

    /// Rolls the attack against one target, or against no one.
    pub(super) async fn apply_attack(
        &mut self,
        property: &Property,
        target_id: Option<&String>,
    ) -> Result<()> {
        let silent = property.kind.is_silent();
        let targets: Vec<String> = target_id.cloned().into_iter().collect();
        let index = self.new_result(Some(&property.id), &targets);
        for name in ATTACK_NAMES {
            self.push_scope(index, name, ScopeEntry::default());
        }

        let suggested = property
            .calculation("attackRoll")
            .map(|outcome| Advantage::from_counts(outcome.advantage, outcome.disadvantage))
            .unwrap_or_default();
        let modifier = match self.roll_calculation(property, "attackRoll").await? {
            Some(rolled) => {
                self.log_errors(index, &rolled.errors, &targets);
                rolled.number().unwrap_or_default()
            }
            None => 0.0,
        };
        let advantage = self.provider.advantage(suggested).await?;
        let d20 = self.roll_d20(advantage).await?;
        let result = d20.value + modifier;
        let working = format!("1d20 {} {}", d20.dice_text, signed_number(modifier, true));
        self.push_scope(index, "~attackDiceRoll", ScopeEntry::new(d20.value));
        self.push_scope(index, "~attackRoll", ScopeEntry::new(result));

        let scope = self.scope();
        let hit_target = scope
            .number("~criticalHitTarget")
            .filter(|n| n.is_finite())
            .unwrap_or(EngineConfig::DEFAULT_CRITICAL_HIT_TARGET);
        let miss_target = scope
            .number("~criticalMissTarget")
            .filter(|n| n.is_finite())
            .unwrap_or(EngineConfig::DEFAULT_CRITICAL_MISS_TARGET);
        let critical_hit = d20.value >= hit_target;
        let critical_miss = d20.value <= miss_target;
        if critical_hit {
            self.push_scope(index, "~criticalHit", ScopeEntry::new(true));
        } else if critical_miss {
            self.push_scope(index, "~criticalMiss", ScopeEntry::new(true));
        }

        let value = format!("{working}\n**{}**", creature_core::formula::format_number(result));
        let armor = match target_id {
            Some(target_id) => {
                let target_id = target_id.clone();
                Some(self.creature(&target_id)?.variables.number("armor"))
            }
            None => None,
        };
        match armor {
            Some(Some(armor)) => {
                let name = if critical_hit {
                    "Critical Hit!"
                } else if critical_miss {
                    "Critical Miss!"
                } else if result >= armor {
                    "Hit!"
                } else {
                    "Miss!"
                };
                if critical_miss || result < armor {
                    self.push_scope(index, "~attackMiss", ScopeEntry::new(true));
                } else {
                    self.push_scope(index, "~attackHit", ScopeEntry::new(true));
                }
                let content = LogContent::named(format!("{name}{}", advantage.suffix()))
                    .with_value(value)
                    .inline()
                    .silenced(silent);
                self.log(index, content, &targets);
            }
            Some(None) => {
                self.log(
                    index,
                    LogContent::error("Target has no `armor`").inline().silenced(silent),
                    &targets,
                );
                let name = crit_name(critical_hit, critical_miss);
                self.log(
                    index,
                    LogContent::named(name).with_value(value).inline().silenced(silent),
                    &targets,
                );
            }
            None => {
                if !critical_miss {
                    self.push_scope(index, "~attackHit", ScopeEntry::new(true));
                }
                if !critical_hit {
                    self.push_scope(index, "~attackMiss", ScopeEntry::new(true));
                }
                let name = format!(
                    "{}{}",
                    crit_name(critical_hit, critical_miss),
                    advantage.suffix()
                );
                self.log(
                    index,
                    LogContent::named(name).with_value(value).inline().silenced(silent),
                    &targets,
                );
            }
        }
        Ok(())
    }
}

fn crit_name(critical_hit: bool, critical_miss: bool) -> &'static str {
    if critical_hit {
        "Critical Hit!"
    } else if critical_miss {
        "Critical Miss!"
    } else {
        "To Hit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advantage_keeps_the_higher_die() {
        let d20 = D20::from_rolls(Advantage::Advantage, &[15, 9]);
        assert_eq!(d20.value, 15.0);
        assert_eq!(d20.dice_text, "[ 15, ~~9~~ ]");

        let d20 = D20::from_rolls(Advantage::Advantage, &[4, 11]);
        assert_eq!(d20.value, 11.0);
        assert_eq!(d20.dice_text, "[ ~~4~~, 11 ]");
    }

    #[test]
    fn disadvantage_keeps_the_lower_die() {
        let d20 = D20::from_rolls(Advantage::Disadvantage, &[15, 9]);
        assert_eq!(d20.value, 9.0);
        assert_eq!(d20.dice_text, "[ ~~15~~, 9 ]");
    }

    #[test]
    fn a_single_die_prints_bare() {
        let d20 = D20::from_rolls(Advantage::None, &[7]);
        assert_eq!(d20.value, 7.0);
        assert_eq!(d20.dice_text, "[7]");
    }
}
