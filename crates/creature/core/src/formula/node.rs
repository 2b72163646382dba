use core::fmt;

use super::value::{Value, format_number};

/// Parsed calculation tree.
///
/// Every resolve level consumes a `Node` and produces a new one; a level never
/// mutates its input, so a compiled tree can be rolled several times.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "parseType", rename_all = "camelCase"))]
pub enum Node {
    Constant {
        value: Value,
    },
    /// Bare name: `strength`, `~attackRoll`, `#spellList`.
    Symbol {
        name: String,
    },
    /// Field access on a named entry: `strength.modifier`.
    Accessor {
        name: String,
        path: Vec<String>,
    },
    Index {
        target: Box<Node>,
        index: Box<Node>,
    },
    Array {
        values: Vec<Node>,
    },
    Call {
        function: String,
        args: Vec<Node>,
    },
    Operator {
        operator: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Node>,
    },
    Ternary {
        condition: Box<Node>,
        consequent: Box<Node>,
        alternative: Box<Node>,
    },
    Parenthesis {
        content: Box<Node>,
    },
    /// Dice not yet rolled.
    Roll {
        count: Box<Node>,
        size: Box<Node>,
        keep: Option<Keep>,
    },
    /// Dice with concrete outcomes.
    Rolled {
        dice: RolledDice,
    },
    Error {
        message: String,
    },
}

impl Node {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant {
            value: value.into(),
        }
    }

    pub fn number(value: f64) -> Self {
        Self::Constant {
            value: Value::Number(value),
        }
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol { name: name.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn binary(operator: BinaryOp, left: Node, right: Node) -> Self {
        Self::Operator {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn parenthesis(content: Node) -> Self {
        Self::Parenthesis {
            content: Box::new(content),
        }
    }

    pub fn call(function: impl Into<String>, args: Vec<Node>) -> Self {
        Self::Call {
            function: function.into(),
            args,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Self::Constant { value } => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Constant {
                value: Value::Number(n),
            } => Some(*n),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The constant value if there is one, otherwise the rendered expression.
    ///
    /// Error nodes have no primitive and yield `None`.
    pub fn to_primitive_or_text(&self) -> Option<Value> {
        match self {
            Self::Constant { value } => Some(value.clone()),
            Self::Error { .. } => None,
            other => Some(Value::Text(other.to_string())),
        }
    }

    /// Visits every node depth-first, parents before children, left to right.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        match self {
            Self::Index { target, index } => {
                target.walk(visit);
                index.walk(visit);
            }
            Self::Array { values } | Self::Call { args: values, .. } => {
                for value in values {
                    value.walk(visit);
                }
            }
            Self::Operator { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Self::Unary { operand, .. } => operand.walk(visit),
            Self::Ternary {
                condition,
                consequent,
                alternative,
            } => {
                condition.walk(visit);
                consequent.walk(visit);
                alternative.walk(visit);
            }
            Self::Parenthesis { content } => content.walk(visit),
            Self::Roll { count, size, .. } => {
                count.walk(visit);
                size.walk(visit);
            }
            Self::Constant { .. }
            | Self::Symbol { .. }
            | Self::Accessor { .. }
            | Self::Rolled { .. }
            | Self::Error { .. } => {}
        }
    }

    /// Root names of every variable the tree reads, in first-use order.
    ///
    /// `strength.modifier` reads `strength`; `#spellList.dc` reads `#spellList`.
    pub fn referenced_symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        self.walk(&mut |node| {
            let name = match node {
                Self::Symbol { name } | Self::Accessor { name, .. } => name,
                _ => return,
            };
            if !names.iter().any(|existing| existing == name) {
                names.push(name.clone());
            }
        });
        names
    }
}

/// Binary operators in the calculation grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    And,
    Or,
}

impl BinaryOp {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
            Self::Power => "^",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::StrictEqual => "===",
            Self::StrictNotEqual => "!==",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum UnaryOp {
    Negate,
    Not,
}

/// Keep-highest / keep-lowest suffix on a dice term (`4d6kh3`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

/// Concrete dice outcomes, in roll order, with the dice that count marked.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RolledDice {
    pub size: u32,
    pub values: Vec<i64>,
    pub kept: Vec<bool>,
}

impl RolledDice {
    pub fn new(size: u32, values: Vec<i64>) -> Self {
        let kept = vec![true; values.len()];
        Self { size, values, kept }
    }

    pub fn total(&self) -> i64 {
        self.values
            .iter()
            .zip(&self.kept)
            .filter(|(_, kept)| **kept)
            .map(|(value, _)| value)
            .sum()
    }

    /// Drops `n` of the currently kept dice, lowest first or highest first.
    ///
    /// Ties are broken by roll order so the first of equal dice goes first.
    pub fn drop_extreme(&mut self, n: usize, lowest: bool) {
        let mut order: Vec<usize> = (0..self.values.len()).filter(|&i| self.kept[i]).collect();
        order.sort_by(|&a, &b| {
            let by_value = self.values[a].cmp(&self.values[b]);
            let by_value = if lowest { by_value } else { by_value.reverse() };
            by_value.then(a.cmp(&b))
        });
        for index in order.into_iter().take(n) {
            self.kept[index] = false;
        }
    }

    /// Keeps only the `n` highest or lowest of the currently kept dice.
    pub fn keep_extreme(&mut self, n: usize, highest: bool) {
        let kept_count = self.kept.iter().filter(|kept| **kept).count();
        if n < kept_count {
            self.drop_extreme(kept_count - n, highest);
        }
    }
}

impl fmt::Display for RolledDice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{} [", self.values.len(), self.size)?;
        for (i, (value, kept)) in self.values.iter().zip(&self.kept).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if *kept {
                write!(f, "{value}")?;
            } else {
                write!(f, "~~{value}~~")?;
            }
        }
        f.write_str("]")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { value } => match value {
                Value::Text(text) => write!(f, "\"{text}\""),
                Value::Number(n) => f.write_str(&format_number(*n)),
                Value::Bool(b) => write!(f, "{b}"),
            },
            Self::Symbol { name } => f.write_str(name),
            Self::Accessor { name, path } => {
                f.write_str(name)?;
                for segment in path {
                    write!(f, ".{segment}")?;
                }
                Ok(())
            }
            Self::Index { target, index } => write!(f, "{target}[{index}]"),
            Self::Array { values } => {
                f.write_str("[")?;
                write_list(f, values)?;
                f.write_str("]")
            }
            Self::Call { function, args } => {
                write!(f, "{function}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::Operator {
                operator,
                left,
                right,
            } => write!(f, "{left} {} {right}", operator.symbol()),
            Self::Unary { operator, operand } => match operator {
                UnaryOp::Negate => write!(f, "-{operand}"),
                UnaryOp::Not => write!(f, "!{operand}"),
            },
            Self::Ternary {
                condition,
                consequent,
                alternative,
            } => write!(f, "{condition} ? {consequent} : {alternative}"),
            Self::Parenthesis { content } => write!(f, "({content})"),
            Self::Roll { count, size, keep } => {
                write!(f, "{count}d{size}")?;
                match keep {
                    Some(Keep::Highest(n)) => write!(f, "kh{n}"),
                    Some(Keep::Lowest(n)) => write!(f, "kl{n}"),
                    None => Ok(()),
                }
            }
            Self::Rolled { dice } => write!(f, "{dice}"),
            Self::Error { message } => f.write_str(message),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{node}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolled_dice_strike_through_dropped_values() {
        let mut dice = RolledDice::new(6, vec![3, 4, 5, 6, 1, 2, 3, 4, 5, 6]);
        dice.drop_extreme(3, true);
        assert_eq!(
            dice.to_string(),
            "10d6 [~~3~~, 4, 5, 6, ~~1~~, ~~2~~, 3, 4, 5, 6]"
        );
        assert_eq!(dice.total(), 33);
    }

    #[test]
    fn keep_highest_drops_the_rest() {
        let mut dice = RolledDice::new(20, vec![15, 9]);
        dice.keep_extreme(1, true);
        assert_eq!(dice.total(), 15);
        assert_eq!(dice.to_string(), "2d20 [15, ~~9~~]");
    }

    #[test]
    fn referenced_symbols_are_unique_roots() {
        let node = Node::binary(
            BinaryOp::Add,
            Node::Accessor {
                name: "strength".into(),
                path: vec!["modifier".into()],
            },
            Node::binary(BinaryOp::Multiply, Node::symbol("strength"), Node::symbol("level")),
        );
        assert_eq!(node.referenced_symbols(), vec!["strength", "level"]);
    }
}
