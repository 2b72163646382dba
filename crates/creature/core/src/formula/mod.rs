//! Calculation language: parsing, scopes, dice and three-level resolution.

mod dice;
mod error;
mod functions;
pub mod inline;
mod node;
mod parser;
mod resolve;
mod scope;
mod value;

pub use dice::{DiceRequest, DiceSource, NoDice, QueuedRolls, pending_rolls};
pub use error::{CalculationError, CalculationErrorKind, Context, FormulaError};
pub use node::{BinaryOp, Keep, Node, RolledDice, UnaryOp};
pub use parser::parse;
pub use resolve::{ResolveLevel, resolve};
pub use scope::{Overlay, Scope, ScopeEntry, SymbolTable};
pub use value::{Value, format_number, signed_number};
