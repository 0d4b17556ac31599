//! Core of the macron source-to-source macro expander: marker recognition,
//! block extraction, range algebra, template substitution, and the generator
//! script front end. Running extracted generators lives in the `generator`
//! crate; this crate is purely the document and language layer.

pub mod block;
pub mod error;
pub mod extract;
pub mod pattern;
pub mod range;
pub mod script;
pub mod template;

pub use block::Macro;
pub use error::{MacroError, MacroErrorKind};

/// The result of scanning a document: the macros found, in registration
/// order, and the residual document in which each captured body block has
/// been replaced by its placeholder line.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub macros: Vec<Macro>,
    pub residual: Vec<String>,
    /// File id of the scanned document in the caller's diagnostic database.
    pub source_id: usize,
}
