//! Effect and proficiency aggregation following a fixed stack order.
//!
//! Contributions fold onto the unaffected expression in this order:
//! base → proficiency bonus → add → mul → min → max → set.
//!
//! The stack builds a new expression tree rather than a number, so dice in
//! the unaffected value or in an effect amount survive into the result
//! (`1d8 + 3` with a `+1d4` effect stays `1d8 + 3 + 1d4`). Advantage,
//! disadvantage, fail, passive bonuses and conditional notes are collected
//! alongside and never folded into the value.

use crate::formula::{BinaryOp, Node};
use crate::property::EffectOperation;

/// One effect's contribution to a field.
#[derive(Clone, Debug, PartialEq)]
pub enum Contribution {
    /// Replaces the unaffected value; the last one in tree order wins.
    Base(Node),
    Add(Node),
    Mul(Node),
    /// Lower bound: the result is at least this.
    Min(Node),
    /// Upper bound: the result is at most this.
    Max(Node),
    /// Final override; the last one in tree order wins.
    Set(Node),
    Advantage,
    Disadvantage,
    PassiveAdd(Node),
    Fail,
    Conditional(String),
}

impl Contribution {
    /// Builds the contribution of an effect operation, or `None` when the
    /// operation needs an amount and has none.
    pub fn from_effect(
        operation: EffectOperation,
        amount: Option<Node>,
        text: impl FnOnce() -> String,
    ) -> Option<Self> {
        let contribution = match operation {
            EffectOperation::Advantage => Self::Advantage,
            EffectOperation::Disadvantage => Self::Disadvantage,
            EffectOperation::Fail => Self::Fail,
            EffectOperation::Conditional => Self::Conditional(text()),
            EffectOperation::Base => Self::Base(amount?),
            EffectOperation::Add => Self::Add(amount?),
            EffectOperation::Mul => Self::Mul(amount?),
            EffectOperation::Min => Self::Min(amount?),
            EffectOperation::Max => Self::Max(amount?),
            EffectOperation::Set => Self::Set(amount?),
            EffectOperation::PassiveAdd => Self::PassiveAdd(amount?),
        };
        Some(contribution)
    }
}

/// Proficiency bonus granted by a proficiency fraction.
///
/// `0.49` rounds half the bonus down, `0.5` rounds it up; any other fraction
/// scales the bonus directly.
pub fn proficiency_bonus(fraction: f64, bonus: f64) -> f64 {
    if fraction == 0.49 {
        (bonus / 2.0).floor()
    } else if fraction == 0.5 {
        (bonus / 2.0).ceil()
    } else {
        fraction * bonus
    }
}

/// Contributions targeting one field, applied in a fixed order.
///
/// # Example
/// ```
/// # use creature_core::compute::{Contribution, EffectStack};
/// # use creature_core::formula::Node;
/// let mut stack = EffectStack::new();
/// stack.push(Contribution::Mul(Node::number(2.0)));
/// stack.push(Contribution::Add(Node::number(3.0)));
/// stack.push(Contribution::Max(Node::number(20.0)));
///
/// // min((10 + 3) * 2, 20)
/// let node = stack.apply(Node::number(10.0), 0.0);
/// assert_eq!(node.to_string(), "min((10 + 3) * 2, 20)");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectStack {
    contributions: Vec<Contribution>,
    proficiency: f64,
}

impl EffectStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, contribution: Contribution) {
        self.contributions.push(contribution);
    }

    /// Keeps the highest proficiency fraction seen.
    pub fn proficient(&mut self, fraction: f64) {
        if fraction > self.proficiency {
            self.proficiency = fraction;
        }
    }

    pub fn proficiency(&self) -> f64 {
        self.proficiency
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty() && self.proficiency == 0.0
    }

    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    fn amounts<'a>(
        &'a self,
        pick: impl Fn(&'a Contribution) -> Option<&'a Node> + 'a,
    ) -> impl Iterator<Item = &'a Node> + 'a {
        self.contributions.iter().filter_map(pick)
    }

    /// Folds every numeric contribution onto `unaffected`.
    ///
    /// The result is unsimplified; resolve it at compile level to fold constants.
    pub fn apply(&self, unaffected: Node, proficiency_bonus_value: f64) -> Node {
        // Base: last one wins
        let mut node = self
            .amounts(|c| match c {
                Contribution::Base(n) => Some(n),
                _ => None,
            })
            .last()
            .cloned()
            .unwrap_or(unaffected);

        // Proficiency bonus
        let bonus = proficiency_bonus(self.proficiency, proficiency_bonus_value);
        if bonus != 0.0 {
            node = Node::binary(BinaryOp::Add, node, Node::number(bonus));
        }

        // Add
        for amount in self.amounts(|c| match c {
            Contribution::Add(n) => Some(n),
            _ => None,
        }) {
            node = Node::binary(BinaryOp::Add, node, amount.clone());
        }

        // Mul
        for amount in self.amounts(|c| match c {
            Contribution::Mul(n) => Some(n),
            _ => None,
        }) {
            node = Node::binary(BinaryOp::Multiply, Node::parenthesis(node), amount.clone());
        }

        // Min: a floor
        for amount in self.amounts(|c| match c {
            Contribution::Min(n) => Some(n),
            _ => None,
        }) {
            node = Node::call("max", vec![node, amount.clone()]);
        }

        // Max: a ceiling
        for amount in self.amounts(|c| match c {
            Contribution::Max(n) => Some(n),
            _ => None,
        }) {
            node = Node::call("min", vec![node, amount.clone()]);
        }

        // Set: last one wins
        self.amounts(|c| match c {
            Contribution::Set(n) => Some(n),
            _ => None,
        })
        .last()
        .cloned()
        .unwrap_or(node)
    }

    pub fn advantage(&self) -> u32 {
        self.count(|c| matches!(c, Contribution::Advantage))
    }

    pub fn disadvantage(&self) -> u32 {
        self.count(|c| matches!(c, Contribution::Disadvantage))
    }

    pub fn fail(&self) -> u32 {
        self.count(|c| matches!(c, Contribution::Fail))
    }

    fn count(&self, matches: impl Fn(&Contribution) -> bool) -> u32 {
        self.contributions.iter().filter(|c| matches(c)).count() as u32
    }

    /// Sum of passive bonuses that reduce to numbers.
    pub fn passive_add(&self) -> f64 {
        self.amounts(|c| match c {
            Contribution::PassiveAdd(n) => Some(n),
            _ => None,
        })
        .filter_map(Node::as_number)
        .sum()
    }

    pub fn conditional(&self) -> Vec<String> {
        self.contributions
            .iter()
            .filter_map(|c| match c {
                Contribution::Conditional(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Context, NoDice, ResolveLevel, Scope, parse, resolve};

    fn folded(node: &Node) -> Node {
        resolve(
            ResolveLevel::Compile,
            node,
            &Scope::new(),
            &mut Context::new(),
            &mut NoDice,
        )
    }

    fn number(stack: &EffectStack, base: f64, bonus: f64) -> Option<f64> {
        folded(&stack.apply(Node::number(base), bonus)).as_number()
    }

    #[test]
    fn order_is_base_add_mul_clamp_set() {
        let mut stack = EffectStack::new();
        stack.push(Contribution::Mul(Node::number(2.0)));
        stack.push(Contribution::Add(Node::number(1.0)));
        stack.push(Contribution::Base(Node::number(5.0)));
        assert_eq!(number(&stack, 100.0, 0.0), Some(12.0));

        stack.push(Contribution::Max(Node::number(10.0)));
        assert_eq!(number(&stack, 100.0, 0.0), Some(10.0));

        stack.push(Contribution::Min(Node::number(11.0)));
        // Floor applies before the ceiling.
        assert_eq!(number(&stack, 100.0, 0.0), Some(10.0));

        stack.push(Contribution::Set(Node::number(3.0)));
        assert_eq!(number(&stack, 100.0, 0.0), Some(3.0));
    }

    #[test]
    fn last_base_wins() {
        let mut stack = EffectStack::new();
        stack.push(Contribution::Base(Node::number(8.0)));
        stack.push(Contribution::Base(Node::number(15.0)));
        assert_eq!(number(&stack, 10.0, 0.0), Some(15.0));
    }

    #[test]
    fn proficiency_fractions_round_as_named() {
        assert_eq!(proficiency_bonus(0.49, 3.0), 1.0);
        assert_eq!(proficiency_bonus(0.5, 3.0), 2.0);
        assert_eq!(proficiency_bonus(1.0, 3.0), 3.0);
        assert_eq!(proficiency_bonus(2.0, 3.0), 6.0);

        let mut stack = EffectStack::new();
        stack.proficient(0.5);
        stack.proficient(1.0);
        stack.proficient(0.49);
        assert_eq!(stack.proficiency(), 1.0);
        assert_eq!(number(&stack, 2.0, 3.0), Some(5.0));
    }

    #[test]
    fn dice_survive_aggregation() {
        let mut stack = EffectStack::new();
        stack.push(Contribution::Add(Node::number(2.0)));
        let unaffected = parse("1d8 + 3").expect("parses");
        assert_eq!(folded(&stack.apply(unaffected, 0.0)).to_string(), "1d8 + 5");
    }

    #[test]
    fn annotations_are_counted_not_folded() {
        let mut stack = EffectStack::new();
        stack.push(Contribution::Advantage);
        stack.push(Contribution::Advantage);
        stack.push(Contribution::Fail);
        stack.push(Contribution::PassiveAdd(Node::number(5.0)));
        stack.push(Contribution::Conditional("+2 against undead".into()));
        assert_eq!(stack.advantage(), 2);
        assert_eq!(stack.disadvantage(), 0);
        assert_eq!(stack.fail(), 1);
        assert_eq!(stack.passive_add(), 5.0);
        assert_eq!(stack.conditional(), vec!["+2 against undead".to_string()]);
        assert_eq!(number(&stack, 10.0, 0.0), Some(10.0));
    }
}
