use core::fmt;

/// A fully reduced scalar: the only thing a calculation can settle on.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn number(value: impl Into<f64>) -> Self {
        Self::Number(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Numeric view of the value. Booleans count as 0/1, text never converts.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(text) => !text.is_empty(),
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Formats a number the way sheets print it: integers without a decimal point,
/// everything else in shortest round-trip form (`0.25`, `12.5`).
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Formats a signed number with a typographic minus: `+3`, `−13`.
///
/// With `spaced`, the sign is separated from the magnitude (`+ 3`, `− 13`), which is
/// how roll modifiers are appended to dice text.
pub fn signed_number(n: f64, spaced: bool) -> String {
    let sign = if n < 0.0 { '\u{2212}' } else { '+' };
    let magnitude = format_number(n.abs());
    if spaced {
        format!("{sign} {magnitude}")
    } else {
        format!("{sign}{magnitude}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_without_trailing_zeroes() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn signed_numbers_use_unicode_minus() {
        assert_eq!(signed_number(-13.0, false), "\u{2212}13");
        assert_eq!(signed_number(5.0, true), "+ 5");
    }

    #[test]
    fn truthiness_follows_sheet_rules() {
        assert!(Value::Number(2.0).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::text("").is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }
}
