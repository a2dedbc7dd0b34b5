//! Target expressions: parsing, evaluation and the function registry.

mod evaluator;
mod functions;
mod parser;

pub use evaluator::Evaluator;
pub use functions::{FuncArg, FunctionRegistry, SeriesFunction};
pub use parser::{Expr, MAX_NESTING, parse};
