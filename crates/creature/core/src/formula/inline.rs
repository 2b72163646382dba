//! Text with embedded `{calculation}` segments.

use super::dice::DiceSource;
use super::error::{CalculationError, Context};
use super::node::Node;
use super::parser::parse;
use super::resolve::{ResolveLevel, resolve};
use super::scope::SymbolTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Calculation(&'a str),
}

/// Splits text on `{...}`. An unclosed brace is kept as literal text.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        if open > 0 {
            out.push(Segment::Text(&rest[..open]));
        }
        out.push(Segment::Calculation(&rest[open + 1..open + close]));
        rest = &rest[open + close + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    out
}

/// Parsed calculations of a text, in order. Unparseable segments are skipped.
pub fn calculations(text: &str) -> Vec<Node> {
    segments(text)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Calculation(source) => parse(source).ok(),
            Segment::Text(_) => None,
        })
        .collect()
}

/// Renders every segment at `level`.
///
/// Constants print bare (`12`, `0.25`); anything left symbolic prints as an
/// expression. A segment that fails to parse is kept verbatim with its braces.
pub fn render(
    text: &str,
    level: ResolveLevel,
    scope: &dyn SymbolTable,
    context: &mut Context,
    dice: &mut dyn DiceSource,
) -> String {
    let mut rendered = String::with_capacity(text.len());
    for segment in segments(text) {
        match segment {
            Segment::Text(literal) => rendered.push_str(literal),
            Segment::Calculation(source) => match parse(source) {
                Ok(node) => {
                    let node = resolve(level, &node, scope, context, dice);
                    match node.as_constant() {
                        Some(value) => rendered.push_str(&value.to_string()),
                        None => rendered.push_str(&node.to_string()),
                    }
                }
                Err(error) => {
                    context.push(CalculationError::parse(&error));
                    rendered.push('{');
                    rendered.push_str(source);
                    rendered.push('}');
                }
            },
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::dice::NoDice;
    use crate::formula::scope::Scope;

    #[test]
    fn splits_text_and_calculations() {
        assert_eq!(
            segments("deal {1d6 + 2} damage {unclosed"),
            vec![
                Segment::Text("deal "),
                Segment::Calculation("1d6 + 2"),
                Segment::Text(" damage {unclosed"),
            ]
        );
    }

    #[test]
    fn renders_numbers_without_trailing_zeroes() {
        let mut scope = Scope::new();
        scope.set_value("level", 3.0);
        let mut context = Context::new();
        let text = render(
            "test summary {level} and {level * 4} and {1 / 4}",
            ResolveLevel::Compile,
            &scope,
            &mut context,
            &mut NoDice,
        );
        assert_eq!(text, "test summary 3 and 12 and 0.25");
        assert!(context.is_empty());
    }

    #[test]
    fn unparseable_segments_stay_verbatim() {
        let mut context = Context::new();
        let text = render(
            "bad {1 +} text",
            ResolveLevel::Compile,
            &Scope::new(),
            &mut context,
            &mut NoDice,
        );
        assert_eq!(text, "bad {1 +} text");
        assert_eq!(context.errors.len(), 1);
    }
}
