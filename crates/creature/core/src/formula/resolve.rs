//! Three-level evaluation of calculation trees.
//!
//! - **Compile** substitutes known names, folds constant sub-trees and leaves
//!   dice as roll nodes. Transient `~` names that are not in scope stay symbolic.
//! - **Roll** additionally turns every roll node into concrete outcomes drawn
//!   from the [`DiceSource`].
//! - **Reduce** additionally sums rolled dice so the tree settles on a constant
//!   or an error node.
//!
//! Names that cannot be found record ``Variable `name` not found`` and evaluate
//! as `0`, so a calculation like `nonExistentProperty + 7` still yields `7`.
//! Type mismatches, division by zero and bad calls become error nodes that
//! absorb every operator above them.

use super::dice::{DiceSource, dice_request};
use super::error::Context;
use super::functions;
use super::node::{BinaryOp, Keep, Node, RolledDice, UnaryOp};
use super::scope::SymbolTable;
use super::value::{Value, format_number};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum ResolveLevel {
    Compile,
    Roll,
    Reduce,
}

/// Resolves `node` to `level`, recording non-fatal problems in `context`.
pub fn resolve(
    level: ResolveLevel,
    node: &Node,
    scope: &dyn SymbolTable,
    context: &mut Context,
    dice: &mut dyn DiceSource,
) -> Node {
    Resolver {
        level,
        scope,
        context,
        dice,
    }
    .resolve(node)
}

struct Resolver<'a> {
    level: ResolveLevel,
    scope: &'a dyn SymbolTable,
    context: &'a mut Context,
    dice: &'a mut dyn DiceSource,
}

impl Resolver<'_> {
    fn resolve(&mut self, node: &Node) -> Node {
        match node {
            Node::Constant { .. } | Node::Error { .. } => node.clone(),
            Node::Rolled { dice } => {
                if self.level == ResolveLevel::Reduce {
                    Node::number(dice.total() as f64)
                } else {
                    node.clone()
                }
            }
            Node::Symbol { name } => self.symbol(name, node),
            Node::Accessor { name, path } => self.accessor(name, path, node),
            Node::Index { target, index } => self.index(target, index),
            Node::Array { values } => Node::Array {
                values: values.iter().map(|value| self.resolve(value)).collect(),
            },
            Node::Call { function, args } => {
                let level = self.level;
                if functions::takes_dice(function) {
                    self.level = level.min(ResolveLevel::Roll);
                }
                let args = args.iter().map(|arg| self.resolve(arg)).collect();
                self.level = level;
                functions::call(level, function, args, self.context)
            }
            Node::Operator {
                operator,
                left,
                right,
            } => self.operator(*operator, left, right),
            Node::Unary { operator, operand } => self.unary(*operator, operand),
            Node::Ternary {
                condition,
                consequent,
                alternative,
            } => self.ternary(condition, consequent, alternative),
            Node::Parenthesis { content } => {
                let content = self.resolve(content);
                if content.is_constant() || content.is_error() {
                    content
                } else {
                    Node::parenthesis(content)
                }
            }
            Node::Roll { count, size, keep } => {
                let count = self.resolve(count);
                let size = self.resolve(size);
                self.roll(count, size, *keep)
            }
        }
    }

    fn error(&mut self, message: String) -> Node {
        self.context.error(message.clone());
        Node::error(message)
    }

    fn keeps_transient(&self, name: &str) -> bool {
        self.level == ResolveLevel::Compile && name.starts_with('~')
    }

    fn not_found(&mut self, name: &str) -> Node {
        self.context.error(format!("Variable `{name}` not found"));
        Node::number(0.0)
    }

    fn symbol(&mut self, name: &str, original: &Node) -> Node {
        match self.scope.entry(name).map(|entry| entry.value.clone()) {
            Some(Some(value)) => Node::constant(value),
            _ if self.keeps_transient(name) => original.clone(),
            _ => self.not_found(name),
        }
    }

    fn accessor(&mut self, name: &str, path: &[String], original: &Node) -> Node {
        let key = path.join(".");
        let found = self
            .scope
            .entry(name)
            .map(|entry| entry.field(&key).cloned());
        match found {
            Some(Some(value)) => Node::constant(value),
            Some(None) => {
                self.context.error(format!("`{name}.{key}` not found"));
                Node::number(0.0)
            }
            None if self.keeps_transient(name) => original.clone(),
            None => self.not_found(name),
        }
    }

    /// Arrays index from 1; out-of-range indices clamp to the nearest end.
    fn index(&mut self, target: &Node, index: &Node) -> Node {
        let target = self.resolve(target);
        let index = self.resolve(index);
        if target.is_error() {
            return target;
        }
        if index.is_error() {
            return index;
        }
        match (&target, index.as_constant()) {
            (Node::Array { values }, Some(value)) => {
                let Some(position) = value.as_number() else {
                    return self.error(format!("Can't index an array with a {}", value.type_name()));
                };
                if values.is_empty() {
                    return self.error("Can't index an empty array".to_owned());
                }
                let last = values.len() - 1;
                let at = (position.floor().max(1.0) as usize - 1).min(last);
                self.resolve(&values[at])
            }
            (Node::Constant { value }, Some(_)) => {
                self.error(format!("Can't index a {}", value.type_name()))
            }
            _ => Node::Index {
                target: Box::new(target),
                index: Box::new(index),
            },
        }
    }

    fn operator(&mut self, operator: BinaryOp, left: &Node, right: &Node) -> Node {
        let left = self.resolve(left);
        let right = self.resolve(right);
        if left.is_error() {
            return left;
        }
        if right.is_error() {
            return right;
        }
        match (left.as_constant(), right.as_constant()) {
            (Some(a), Some(b)) => match apply_binary(operator, a, b) {
                Ok(value) => Node::constant(value),
                Err(message) => self.error(message),
            },
            _ => fold_additive(operator, left, right),
        }
    }

    fn unary(&mut self, operator: UnaryOp, operand: &Node) -> Node {
        let operand = self.resolve(operand);
        if operand.is_error() {
            return operand;
        }
        let Some(value) = operand.as_constant() else {
            return Node::Unary {
                operator,
                operand: Box::new(operand),
            };
        };
        match operator {
            UnaryOp::Not => Node::constant(!value.is_truthy()),
            UnaryOp::Negate => match value.as_number() {
                Some(n) => Node::number(-n),
                None => self.error(format!("Can't negate a {}", value.type_name())),
            },
        }
    }

    fn ternary(&mut self, condition: &Node, consequent: &Node, alternative: &Node) -> Node {
        let condition = self.resolve(condition);
        if condition.is_error() {
            return condition;
        }
        match condition.as_constant() {
            Some(value) if value.is_truthy() => self.resolve(consequent),
            Some(_) => self.resolve(alternative),
            None => Node::Ternary {
                condition: Box::new(condition),
                consequent: Box::new(self.resolve(consequent)),
                alternative: Box::new(self.resolve(alternative)),
            },
        }
    }

    fn roll(&mut self, count: Node, size: Node, keep: Option<Keep>) -> Node {
        if count.is_error() {
            return count;
        }
        if size.is_error() {
            return size;
        }
        let unrolled = |count: Node, size: Node| Node::Roll {
            count: Box::new(count),
            size: Box::new(size),
            keep,
        };
        if self.level == ResolveLevel::Compile {
            return unrolled(count, size);
        }
        let (Some(n), Some(s)) = (count.as_number(), size.as_number()) else {
            return if self.level == ResolveLevel::Reduce {
                self.error(format!("Can't roll {}", unrolled(count, size)))
            } else {
                unrolled(count, size)
            };
        };
        let Some(request) = dice_request(n, s) else {
            return self.error(format!(
                "Invalid dice: {}d{}",
                format_number(n),
                format_number(s)
            ));
        };
        let Some(values) = self.dice.roll(request) else {
            return if self.level == ResolveLevel::Reduce {
                self.error(format!("Can't roll {}", unrolled(count, size)))
            } else {
                unrolled(count, size)
            };
        };
        let mut dice = RolledDice::new(request.dice_size, values);
        match keep {
            Some(Keep::Highest(k)) => dice.keep_extreme(k as usize, true),
            Some(Keep::Lowest(k)) => dice.keep_extreme(k as usize, false),
            None => {}
        }
        if self.level == ResolveLevel::Reduce {
            Node::number(dice.total() as f64)
        } else {
            Node::Rolled { dice }
        }
    }
}

/// Folds `x ± a ± b` into `x ± c` so partially known sums render compactly.
fn fold_additive(operator: BinaryOp, left: Node, right: Node) -> Node {
    let outer_sign = match operator {
        BinaryOp::Add => 1.0,
        BinaryOp::Subtract => -1.0,
        _ => return Node::binary(operator, left, right),
    };
    let Some(b) = right.as_number() else {
        return Node::binary(operator, left, right);
    };
    match left {
        Node::Operator {
            operator: inner @ (BinaryOp::Add | BinaryOp::Subtract),
            left: base,
            right: inner_right,
        } if inner_right.as_number().is_some() => {
            let a = inner_right.as_number().unwrap_or_default();
            let inner_sign = if inner == BinaryOp::Add { 1.0 } else { -1.0 };
            let total = inner_sign * a + outer_sign * b;
            if total == 0.0 {
                *base
            } else if total > 0.0 {
                Node::binary(BinaryOp::Add, *base, Node::number(total))
            } else {
                Node::binary(BinaryOp::Subtract, *base, Node::number(-total))
            }
        }
        left => Node::binary(operator, left, right),
    }
}

fn apply_binary(operator: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    use BinaryOp::*;

    match operator {
        Add => {
            if matches!(a, Value::Text(_)) || matches!(b, Value::Text(_)) {
                return Ok(Value::Text(format!("{a}{b}")));
            }
            arithmetic(operator, a, b)
        }
        Subtract | Multiply | Divide | Remainder | Power => arithmetic(operator, a, b),
        Less | Greater | LessEqual | GreaterEqual => compare(operator, a, b),
        Equal | NotEqual => {
            let equal = match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => a.to_string() == b.to_string(),
            };
            Ok(Value::Bool(equal == (operator == Equal)))
        }
        StrictEqual => Ok(Value::Bool(a == b)),
        StrictNotEqual => Ok(Value::Bool(a != b)),
        And => Ok(if a.is_truthy() { b.clone() } else { a.clone() }),
        Or => Ok(if a.is_truthy() { a.clone() } else { b.clone() }),
    }
}

fn arithmetic(operator: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
        return Err(format!(
            "Can't apply `{}` to {} and {}",
            operator.symbol(),
            a.type_name(),
            b.type_name()
        ));
    };
    let result = match operator {
        BinaryOp::Add => x + y,
        BinaryOp::Subtract => x - y,
        BinaryOp::Multiply => x * y,
        BinaryOp::Divide | BinaryOp::Remainder if y == 0.0 => {
            return Err("Can't divide by zero".to_owned());
        }
        BinaryOp::Divide => x / y,
        BinaryOp::Remainder => x % y,
        _ => x.powf(y),
    };
    Ok(Value::Number(result))
}

fn compare(operator: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    let ordering = match (a, b) {
        (Value::Text(x), Value::Text(y)) => x.partial_cmp(y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => {
                return Err(format!(
                    "Can't compare {} and {}",
                    a.type_name(),
                    b.type_name()
                ));
            }
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match operator {
        BinaryOp::Less => ordering.is_lt(),
        BinaryOp::Greater => ordering.is_gt(),
        BinaryOp::LessEqual => ordering.is_le(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::dice::{DiceRequest, NoDice};
    use crate::formula::parser::parse;
    use crate::formula::scope::{Scope, ScopeEntry};

    /// Die `i` of `NdS` rolls `((ceil(S/2) - 1 + i) mod S) + 1`.
    fn midpoint_dice(request: DiceRequest) -> Vec<i64> {
        let size = i64::from(request.dice_size);
        let start = (size + 1) / 2 - 1;
        (0..i64::from(request.number))
            .map(|i| (start + i) % size + 1)
            .collect()
    }

    fn scope() -> Scope {
        let mut scope = Scope::new();
        scope.insert(
            "strength",
            ScopeEntry::new(14.0).with_field("modifier", 2.0),
        );
        scope.set_value("level", 5.0);
        scope
    }

    fn at(level: ResolveLevel, text: &str) -> (Node, Context) {
        let mut context = Context::new();
        let node = parse(text).expect("valid calculation");
        let mut dice = midpoint_dice;
        let node = resolve(level, &node, &scope(), &mut context, &mut dice);
        (node, context)
    }

    #[test]
    fn compile_substitutes_names_and_keeps_dice() {
        let (node, context) = at(ResolveLevel::Compile, "1d12 + strength.modifier + level");
        assert_eq!(node.to_string(), "1d12 + 7");
        assert!(context.is_empty());
    }

    #[test]
    fn roll_renders_outcomes() {
        let (node, _) = at(ResolveLevel::Roll, "1d12 + 7");
        assert_eq!(node.to_string(), "1d12 [6] + 7");
        let (node, _) = at(ResolveLevel::Roll, "(1d13 + 3 + 1) * 2");
        assert_eq!(node.to_string(), "(1d13 [7] + 4) * 2");
    }

    #[test]
    fn reduce_settles_on_a_constant() {
        let (node, _) = at(ResolveLevel::Reduce, "(1d13 + 3 + 1) * 2");
        assert_eq!(node, Node::number(22.0));
        let (node, _) = at(ResolveLevel::Reduce, "dropLowest(10d6, 3)");
        assert_eq!(node, Node::number(33.0));
    }

    #[test]
    fn unknown_names_count_as_zero() {
        let (node, context) = at(ResolveLevel::Compile, "nonExistentProperty + 7");
        assert_eq!(node, Node::number(7.0));
        assert_eq!(context.errors[0].message, "Variable `nonExistentProperty` not found");
    }

    #[test]
    fn transient_names_survive_compile() {
        let (node, context) = at(ResolveLevel::Compile, "~attackRoll + 2");
        assert_eq!(node.to_string(), "~attackRoll + 2");
        assert!(context.is_empty());
        let (node, context) = at(ResolveLevel::Reduce, "~attackRoll + 2");
        assert_eq!(node, Node::number(2.0));
        assert_eq!(context.errors.len(), 1);
    }

    #[test]
    fn errors_propagate_through_operators() {
        let (node, context) = at(ResolveLevel::Reduce, "(level / 0) + 3");
        assert_eq!(node, Node::error("Can't divide by zero"));
        assert_eq!(context.errors.len(), 1);
        let (node, _) = at(ResolveLevel::Reduce, "\"a\" * 2");
        assert!(node.is_error());
    }

    #[test]
    fn strings_concatenate_and_compare() {
        let (node, _) = at(ResolveLevel::Reduce, "\"level \" + level");
        assert_eq!(node, Node::constant("level 5"));
        let (node, _) = at(ResolveLevel::Reduce, "level >= 5 ? \"high\" : \"low\"");
        assert_eq!(node, Node::constant("high"));
    }

    #[test]
    fn keep_highest_applies_on_roll() {
        let (node, _) = at(ResolveLevel::Roll, "2d20kh1");
        assert_eq!(node.to_string(), "2d20 [~~10~~, 11]");
    }

    #[test]
    fn no_dice_leaves_rolls_until_reduce() {
        let node = parse("1d6 + 1").expect("valid");
        let mut context = Context::new();
        let rolled = resolve(ResolveLevel::Roll, &node, &Scope::new(), &mut context, &mut NoDice);
        assert_eq!(rolled.to_string(), "1d6 + 1");
        let reduced = resolve(
            ResolveLevel::Reduce,
            &node,
            &Scope::new(),
            &mut context,
            &mut NoDice,
        );
        assert!(reduced.is_error());
    }
}
