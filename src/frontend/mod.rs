//! Data handed to the core by the parser: the bound AST, interned names and
//! source positions. Scanning, parsing and name binding happen outside of this
//! crate.

pub mod ast;
pub mod intern;

/// A location in the source file, as reported by the scanner when a node was
/// built. Lines and columns are 1-based; the default position (0:0) means the
/// node was synthesized and has no source location.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
