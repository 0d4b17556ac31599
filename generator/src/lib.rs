//! Generator runtime for macron: evaluates the scripts extracted from macro
//! headers and splices their output back into the residual document.

pub mod environment;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod runtime_value;

pub use error::{DiagnosticError, RuntimeError};
pub use evaluator::ScriptContext;
pub use executor::{expand_document, run_macro};
pub use runtime_value::RuntimeValue;
