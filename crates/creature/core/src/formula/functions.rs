//! Built-in calculation functions.

use super::error::Context;
use super::node::Node;
use super::resolve::ResolveLevel;
use super::value::Value;

/// Applies a built-in to arguments already resolved at `level`.
///
/// Calls whose arguments are not yet constant stay as calls until a later
/// level; at reduce level that is an error.
pub(super) fn call(
    level: ResolveLevel,
    function: &str,
    args: Vec<Node>,
    context: &mut Context,
) -> Node {
    if let Some(error) = args.iter().find(|arg| arg.is_error()) {
        return error.clone();
    }

    match function {
        "dropLowest" | "dropHighest" | "keepHighest" | "keepLowest" => {
            dice_function(level, function, args, context)
        }
        "tableLookup" => table_lookup(level, args, context),
        "abs" | "sqrt" | "floor" | "ceil" | "round" | "trunc" | "sign" => {
            unary_math(level, function, args, context)
        }
        "min" | "max" => extremum(level, function, args, context),
        _ => fail(context, format!("Unknown function `{function}`")),
    }
}

/// Roll-affecting functions see their arguments as rolled dice, never as totals.
pub(super) fn takes_dice(function: &str) -> bool {
    matches!(
        function,
        "dropLowest" | "dropHighest" | "keepHighest" | "keepLowest"
    )
}

fn fail(context: &mut Context, message: String) -> Node {
    context.error(message.clone());
    Node::error(message)
}

fn arity(function: &str, expected: usize, args: &[Node], context: &mut Context) -> Option<Node> {
    if args.len() == expected {
        return None;
    }
    let plural = if expected == 1 { "" } else { "s" };
    Some(fail(
        context,
        format!(
            "`{function}` takes {expected} argument{plural}, {} given",
            args.len()
        ),
    ))
}

fn deferred(level: ResolveLevel, function: &str, args: Vec<Node>, context: &mut Context) -> Node {
    if level == ResolveLevel::Reduce {
        return fail(context, format!("Could not evaluate `{function}`"));
    }
    Node::call(function, args)
}

fn number_arg(function: &str, arg: &Node, context: &mut Context) -> Result<Option<f64>, Node> {
    match arg.as_constant() {
        None => Ok(None),
        Some(value) => match value.as_number() {
            Some(n) => Ok(Some(n)),
            None => Err(fail(
                context,
                format!("`{function}` expects a number, got {}", value.type_name()),
            )),
        },
    }
}

fn unary_math(level: ResolveLevel, function: &str, args: Vec<Node>, context: &mut Context) -> Node {
    if let Some(error) = arity(function, 1, &args, context) {
        return error;
    }
    let n = match number_arg(function, &args[0], context) {
        Ok(Some(n)) => n,
        Ok(None) => return deferred(level, function, args, context),
        Err(error) => return error,
    };
    let result = match function {
        "abs" => n.abs(),
        "sqrt" => n.sqrt(),
        "floor" => n.floor(),
        "ceil" => n.ceil(),
        "round" => (n + 0.5).floor(),
        "trunc" => n.trunc(),
        _ => {
            if n > 0.0 {
                1.0
            } else if n < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
    };
    Node::number(result)
}

fn extremum(level: ResolveLevel, function: &str, args: Vec<Node>, context: &mut Context) -> Node {
    if args.is_empty() {
        return fail(context, format!("`{function}` takes at least 1 argument, 0 given"));
    }
    let mut numbers = Vec::with_capacity(args.len());
    for arg in &args {
        match number_arg(function, arg, context) {
            Ok(Some(n)) => numbers.push(n),
            Ok(None) => break,
            Err(error) => return error,
        }
    }
    if numbers.len() < args.len() {
        return deferred(level, function, args, context);
    }
    let pick = if function == "min" { f64::min } else { f64::max };
    let result = numbers.into_iter().reduce(pick).unwrap_or_default();
    Node::number(result)
}

/// `tableLookup([100, 300, 900], 350)` is 2: how many entries are at most the value.
fn table_lookup(level: ResolveLevel, args: Vec<Node>, context: &mut Context) -> Node {
    if let Some(error) = arity("tableLookup", 2, &args, context) {
        return error;
    }
    match lookup_count(&args[0], &args[1]) {
        Ok(Some(count)) => Node::number(count),
        Ok(None) => deferred(level, "tableLookup", args, context),
        Err(message) => fail(context, message.to_owned()),
    }
}

fn lookup_count(table: &Node, needle: &Node) -> Result<Option<f64>, &'static str> {
    let Node::Array { values } = table else {
        if table.is_constant() {
            return Err("`tableLookup` expects an array");
        }
        return Ok(None);
    };
    let needle = match needle.as_constant() {
        None => return Ok(None),
        Some(value) => value
            .as_number()
            .ok_or("`tableLookup` expects a number to look up")?,
    };
    let mut count = 0.0;
    for entry in values {
        match entry.as_constant().map(Value::as_number) {
            Some(Some(n)) if n <= needle => count += 1.0,
            Some(Some(_)) => break,
            Some(None) => return Err("`tableLookup` expects an array of numbers"),
            None => return Ok(None),
        }
    }
    Ok(Some(count))
}

fn dice_function(
    level: ResolveLevel,
    function: &str,
    args: Vec<Node>,
    context: &mut Context,
) -> Node {
    if let Some(error) = arity(function, 2, &args, context) {
        return error;
    }
    let n = match number_arg(function, &args[1], context) {
        Ok(Some(n)) => n.max(0.0) as usize,
        Ok(None) => return deferred(level, function, args, context),
        Err(error) => return error,
    };
    if args[0].is_constant() {
        return fail(context, format!("`{function}` expects dice as its first argument"));
    }
    let rolled = match &args[0] {
        Node::Rolled { dice } => Some(dice.clone()),
        _ => None,
    };
    let Some(mut dice) = rolled else {
        return deferred(level, function, args, context);
    };
    match function {
        "dropLowest" => dice.drop_extreme(n, true),
        "dropHighest" => dice.drop_extreme(n, false),
        "keepHighest" => dice.keep_extreme(n, true),
        _ => dice.keep_extreme(n, false),
    }
    if level == ResolveLevel::Reduce {
        Node::number(dice.total() as f64)
    } else {
        Node::Rolled { dice }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::node::RolledDice;

    fn numbers(values: &[f64]) -> Vec<Node> {
        values.iter().map(|n| Node::number(*n)).collect()
    }

    #[test]
    fn math_functions_fold_constants() {
        let mut context = Context::new();
        let compile = |function: &str, args: &[f64], context: &mut Context| {
            call(ResolveLevel::Compile, function, numbers(args), context)
        };
        assert_eq!(compile("floor", &[2.7], &mut context), Node::number(2.0));
        assert_eq!(compile("round", &[2.5], &mut context), Node::number(3.0));
        assert_eq!(compile("max", &[1.0, 7.0, 3.0], &mut context), Node::number(7.0));
        assert!(context.is_empty());
    }

    #[test]
    fn table_lookup_counts_entries_at_or_below() {
        let mut context = Context::new();
        let args = vec![
            Node::Array {
                values: numbers(&[100.0, 300.0, 900.0]),
            },
            Node::number(350.0),
        ];
        assert_eq!(
            call(ResolveLevel::Reduce, "tableLookup", args, &mut context),
            Node::number(2.0)
        );
    }

    #[test]
    fn unknown_functions_and_bad_arity_are_errors() {
        let mut context = Context::new();
        assert!(call(ResolveLevel::Compile, "explode", vec![], &mut context).is_error());
        assert!(call(ResolveLevel::Compile, "abs", numbers(&[1.0, 2.0]), &mut context).is_error());
        assert_eq!(context.errors.len(), 2);
        assert_eq!(context.errors[1].message, "`abs` takes 1 argument, 2 given");
    }

    #[test]
    fn drop_lowest_marks_rolled_dice() {
        let mut context = Context::new();
        let rolled = Node::Rolled {
            dice: RolledDice::new(6, vec![3, 4, 5, 6, 1, 2, 3, 4, 5, 6]),
        };
        let node = call(
            ResolveLevel::Roll,
            "dropLowest",
            vec![rolled, Node::number(3.0)],
            &mut context,
        );
        assert_eq!(node.to_string(), "10d6 [~~3~~, 4, 5, 6, ~~1~~, ~~2~~, 3, 4, 5, 6]");
    }
}
