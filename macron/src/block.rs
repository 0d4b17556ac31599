/// A macro extracted from a document: a generator script (header) paired with
/// a code template (body). Either part may arrive in its own comment block;
/// the two are joined by name, or by adjacency for unnamed macros.
#[derive(Debug, Clone)]
pub struct Macro {
    /// Macro name, unique among named macros. Unnamed macros attach their
    /// body to the most recently registered macro.
    pub name: Option<String>,
    /// Generator script source lines, to be run by the generator crate.
    pub header: Vec<String>,
    /// Byte offset of the first header line in the source document, so
    /// script diagnostics can point at the real location.
    pub header_offset: usize,
    /// Template lines. `None` until a body block opens for this macro.
    pub body: Option<Vec<String>>,
}

impl Macro {
    pub fn new(name: Option<String>, header_offset: usize) -> Self {
        Macro {
            name,
            header: Vec::new(),
            header_offset,
            body: None,
        }
    }

    /// The synthetic line standing in for this macro's expansion in the
    /// residual document. `index` is the macro's position in extraction order.
    pub fn placeholder(index: usize) -> String {
        format!("<<< MACRO BODY {} >>>", index)
    }

    /// The header script as a single source string.
    pub fn header_source(&self) -> String {
        self.header.join("\n")
    }
}
