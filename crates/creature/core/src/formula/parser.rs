//! Calculation text to [`Node`] trees.
//!
//! A hand-written lexer and recursive-descent parser. Dice terms are recognised
//! from identifier shapes (`d20`, `d6kh3`) so `2d6`, `d20` and `(level)d8` all
//! parse without reserving `d` as a keyword.

use super::error::FormulaError;
use super::node::{BinaryOp, Keep, Node, UnaryOp};
use super::value::Value;

// ============================================================================
// Lexer
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Tilde,
    Hash,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Question,
    Colon,
    Bang,
    And,
    Or,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number `{n}`"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::Ident(name) => format!("`{name}`"),
            other => format!("`{}`", other.text()),
        }
    }

    fn text(&self) -> &'static str {
        match self {
            Self::Tilde => "~",
            Self::Hash => "#",
            Self::Dot => ".",
            Self::Comma => ",",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Caret => "^",
            Self::Question => "?",
            Self::Colon => ":",
            Self::Bang => "!",
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::StrictEq => "===",
            Self::NotEq => "!=",
            Self::StrictNotEq => "!==",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEq => "<=",
            Self::GreaterEq => ">=",
            Self::Number(_) | Self::Str(_) | Self::Ident(_) => "",
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |at: usize| chars.get(at).map(|(_, c)| *c);

    while let Some(&(position, c)) = chars.get(i) {
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while peek(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            if peek(i) == Some('.') && peek(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
                while peek(i).is_some_and(|c| c.is_ascii_digit()) {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let number = text
                .parse::<f64>()
                .map_err(|_| FormulaError::UnexpectedCharacter { found: c, position })?;
            tokens.push((Token::Number(number), position));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while peek(i).is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let token = match word.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Bang,
                _ => Token::Ident(word),
            };
            tokens.push((token, position));
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                match peek(i) {
                    Some(next) if next == quote => break,
                    Some(next) => {
                        text.push(next);
                        i += 1;
                    }
                    None => return Err(FormulaError::UnterminatedString { position }),
                }
            }
            i += 1;
            tokens.push((Token::Str(text), position));
            continue;
        }

        let next = peek(i + 1);
        let after = peek(i + 2);
        let (token, width) = match (c, next, after) {
            ('=', Some('='), Some('=')) => (Token::StrictEq, 3),
            ('!', Some('='), Some('=')) => (Token::StrictNotEq, 3),
            ('=', Some('='), _) => (Token::Eq, 2),
            ('!', Some('='), _) => (Token::NotEq, 2),
            ('<', Some('='), _) => (Token::LessEq, 2),
            ('>', Some('='), _) => (Token::GreaterEq, 2),
            ('&', Some('&'), _) => (Token::And, 2),
            ('|', Some('|'), _) => (Token::Or, 2),
            ('&', _, _) => (Token::And, 1),
            ('|', _, _) => (Token::Or, 1),
            ('<', _, _) => (Token::Less, 1),
            ('>', _, _) => (Token::Greater, 1),
            ('!', _, _) => (Token::Bang, 1),
            ('~', _, _) => (Token::Tilde, 1),
            ('#', _, _) => (Token::Hash, 1),
            ('.', _, _) => (Token::Dot, 1),
            (',', _, _) => (Token::Comma, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            ('[', _, _) => (Token::LBracket, 1),
            (']', _, _) => (Token::RBracket, 1),
            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', _, _) => (Token::Star, 1),
            ('/', _, _) => (Token::Slash, 1),
            ('%', _, _) => (Token::Percent, 1),
            ('^', _, _) => (Token::Caret, 1),
            ('?', _, _) => (Token::Question, 1),
            (':', _, _) => (Token::Colon, 1),
            _ => return Err(FormulaError::UnexpectedCharacter { found: c, position }),
        };
        tokens.push((token, position));
        i += width;
    }

    Ok(tokens)
}

// ============================================================================
// Dice identifiers
// ============================================================================

/// Shape of a dice identifier: `d`, `d20`, `d6kh3`, `d20kl1`.
struct DiceSuffix {
    size: Option<u32>,
    keep: Option<Keep>,
}

fn dice_suffix(ident: &str) -> Option<DiceSuffix> {
    let rest = ident.strip_prefix('d')?;
    if rest.is_empty() {
        return Some(DiceSuffix {
            size: None,
            keep: None,
        });
    }
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let size = rest[..digits_end].parse().ok()?;
    let tail = &rest[digits_end..];
    let keep = if tail.is_empty() {
        None
    } else if let Some(n) = tail.strip_prefix("kh") {
        Some(Keep::Highest(n.parse().ok()?))
    } else if let Some(n) = tail.strip_prefix("kl") {
        Some(Keep::Lowest(n.parse().ok()?))
    } else {
        return None;
    };
    Some(DiceSuffix {
        size: Some(size),
        keep,
    })
}

// ============================================================================
// Parser
// ============================================================================

/// Parses calculation text into a tree.
///
/// # Errors
///
/// Returns [`FormulaError`] for any structurally invalid input, including an
/// empty or dangling expression such as `"15 + "`.
pub fn parse(input: &str) -> Result<Node, FormulaError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.expression()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(node),
        Some((token, position)) => Err(FormulaError::UnexpectedToken {
            found: token.describe(),
            expected: "end of input",
            position: *position,
        }),
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, description: &'static str) -> Result<(), FormulaError> {
        if self.eat(&expected) {
            return Ok(());
        }
        Err(self.unexpected(description))
    }

    fn unexpected(&self, expected: &'static str) -> FormulaError {
        match self.tokens.get(self.pos) {
            Some((token, position)) => FormulaError::UnexpectedToken {
                found: token.describe(),
                expected,
                position: *position,
            },
            None => FormulaError::UnexpectedEnd { expected },
        }
    }

    fn expression(&mut self) -> Result<Node, FormulaError> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<Node, FormulaError> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let consequent = self.expression()?;
        self.expect(Token::Colon, "`:`")?;
        let alternative = self.expression()?;
        Ok(Node::Ternary {
            condition: Box::new(condition),
            consequent: Box::new(consequent),
            alternative: Box::new(alternative),
        })
    }

    fn or(&mut self) -> Result<Node, FormulaError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Node::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Node, FormulaError> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = Node::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Node, FormulaError> {
        let mut left = self.comparison()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Eq) => BinaryOp::Equal,
                Some(Token::NotEq) => BinaryOp::NotEqual,
                Some(Token::StrictEq) => BinaryOp::StrictEqual,
                Some(Token::StrictNotEq) => BinaryOp::StrictNotEqual,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.comparison()?;
            left = Node::binary(operator, left, right);
        }
    }

    fn comparison(&mut self) -> Result<Node, FormulaError> {
        let mut left = self.additive()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Less) => BinaryOp::Less,
                Some(Token::Greater) => BinaryOp::Greater,
                Some(Token::LessEq) => BinaryOp::LessEqual,
                Some(Token::GreaterEq) => BinaryOp::GreaterEqual,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Node::binary(operator, left, right);
        }
    }

    fn additive(&mut self) -> Result<Node, FormulaError> {
        let mut left = self.multiplicative()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Node::binary(operator, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Node, FormulaError> {
        let mut left = self.unary()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                Some(Token::Percent) => BinaryOp::Remainder,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Node::binary(operator, left, right);
        }
    }

    fn unary(&mut self) -> Result<Node, FormulaError> {
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            if let Some(n) = operand.as_number() {
                return Ok(Node::number(-n));
            }
            return Ok(Node::Unary {
                operator: UnaryOp::Negate,
                operand: Box::new(operand),
            });
        }
        if self.eat(&Token::Bang) {
            let operand = self.unary()?;
            return Ok(Node::Unary {
                operator: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.power()
    }

    fn power(&mut self) -> Result<Node, FormulaError> {
        let base = self.dice()?;
        if self.eat(&Token::Caret) {
            let exponent = self.unary()?;
            return Ok(Node::binary(BinaryOp::Power, base, exponent));
        }
        Ok(base)
    }

    fn dice(&mut self) -> Result<Node, FormulaError> {
        let mut node = self.postfix()?;
        while let Some(Token::Ident(name)) = self.peek() {
            let Some(suffix) = dice_suffix(name) else {
                break;
            };
            self.pos += 1;
            node = self.finish_roll(node, suffix)?;
        }
        Ok(node)
    }

    fn finish_roll(&mut self, count: Node, suffix: DiceSuffix) -> Result<Node, FormulaError> {
        let size = match suffix.size {
            Some(size) => Node::number(f64::from(size)),
            None => self.postfix()?,
        };
        Ok(Node::Roll {
            count: Box::new(count),
            size: Box::new(size),
            keep: suffix.keep,
        })
    }

    fn postfix(&mut self) -> Result<Node, FormulaError> {
        let mut node = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let field = match self.peek() {
                    Some(Token::Ident(field)) => field.clone(),
                    _ => return Err(self.unexpected("a field name")),
                };
                self.pos += 1;
                node = match node {
                    Node::Symbol { name } => Node::Accessor {
                        name,
                        path: vec![field],
                    },
                    Node::Accessor { name, mut path } => {
                        path.push(field);
                        Node::Accessor { name, path }
                    }
                    _ => return Err(self.unexpected("a variable before `.`")),
                };
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(Token::RBracket, "`]`")?;
                node = Node::Index {
                    target: Box::new(node),
                    index: Box::new(index),
                };
            } else {
                return Ok(node);
            }
        }
    }

    fn primary(&mut self) -> Result<Node, FormulaError> {
        let Some(token) = self.advance() else {
            return Err(FormulaError::UnexpectedEnd {
                expected: "an expression",
            });
        };
        match token {
            Token::Number(n) => Ok(Node::number(n)),
            Token::Str(text) => Ok(Node::constant(Value::Text(text))),
            Token::LParen => {
                let content = self.expression()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(Node::parenthesis(content))
            }
            Token::LBracket => {
                let values = self.list(Token::RBracket, "`]`")?;
                Ok(Node::Array { values })
            }
            Token::Tilde => self.prefixed_name('~'),
            Token::Hash => self.prefixed_name('#'),
            Token::Ident(name) => {
                match name.as_str() {
                    "true" => return Ok(Node::constant(true)),
                    "false" => return Ok(Node::constant(false)),
                    _ => {}
                }
                if let Some(suffix) = dice_suffix(&name) {
                    return self.finish_roll(Node::number(1.0), suffix);
                }
                if self.eat(&Token::LParen) {
                    let args = self.list(Token::RParen, "`)`")?;
                    return Ok(Node::call(name, args));
                }
                Ok(Node::symbol(name))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("an expression"))
            }
        }
    }

    fn prefixed_name(&mut self, prefix: char) -> Result<Node, FormulaError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(Node::symbol(format!("{prefix}{name}"))),
            Some(_) => {
                self.pos -= 1;
                Err(self.unexpected("a name"))
            }
            None => Err(FormulaError::UnexpectedEnd { expected: "a name" }),
        }
    }

    fn list(&mut self, close: Token, description: &'static str) -> Result<Vec<Node>, FormulaError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(close, description)?;
            return Ok(items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) -> String {
        parse(text).expect("valid calculation").to_string()
    }

    #[test]
    fn parses_dice_terms() {
        assert_eq!(round_trip("2d6 + 7"), "2d6 + 7");
        assert_eq!(round_trip("d20"), "1d20");
        assert_eq!(round_trip("4d6kh3"), "4d6kh3");
        assert_eq!(round_trip("(level)d8"), "(level)d8");
    }

    #[test]
    fn respects_precedence() {
        let node = parse("1 + 2 * 3").expect("valid");
        let Node::Operator { operator, right, .. } = node else {
            panic!("expected operator");
        };
        assert_eq!(operator, BinaryOp::Add);
        assert!(matches!(
            *right,
            Node::Operator {
                operator: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn parses_accessors_and_prefixes() {
        assert_eq!(
            round_trip("strength.modifier + #spellList.dc"),
            "strength.modifier + #spellList.dc"
        );
        assert_eq!(round_trip("~attackRoll >= armor"), "~attackRoll >= armor");
    }

    #[test]
    fn parses_calls_ternaries_and_arrays() {
        assert_eq!(round_trip("max(1, 2, level)"), "max(1, 2, level)");
        assert_eq!(round_trip("level > 4 ? 2 : 1"), "level > 4 ? 2 : 1");
        assert_eq!(round_trip("[1, 2, 3][2]"), "[1, 2, 3][2]");
    }

    #[test]
    fn identifiers_starting_with_d_are_not_dice() {
        assert_eq!(parse("dexterity").expect("valid"), Node::symbol("dexterity"));
        assert_eq!(parse("dc").expect("valid"), Node::symbol("dc"));
    }

    #[test]
    fn dangling_operator_is_a_parse_error() {
        assert_eq!(
            parse("15 + "),
            Err(FormulaError::UnexpectedEnd {
                expected: "an expression"
            })
        );
        assert!(matches!(
            parse("1 $ 2"),
            Err(FormulaError::UnexpectedCharacter { found: '$', .. })
        ));
    }
}
