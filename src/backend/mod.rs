//! The backend turns a type checked program into an x86-64 listing.
//!
//! Code generation is a single walk over the tree using a stack machine:
//! every expression leaves its value on top of the hardware stack and
//! operators pop their operands into a fixed set of scratch registers. The
//! resulting [`sink::Listing`] renders as GNU `as` source.

pub mod asm;
pub mod codegen;
pub mod pretty_print;
pub mod sink;

pub use codegen::generate_program;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Annotate the listing with comments naming the construct being emitted
    pub emit_comments: bool,
    /// Symbol of the program's entry point
    pub entry_symbol: String,
    /// Symbol called by WRITE and WRITELN
    pub printf_symbol: String,
    /// Prepended to user globals and routines so they can't clash with
    /// runtime symbols
    pub symbol_prefix: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            emit_comments: false,
            entry_symbol: "main".to_owned(),
            printf_symbol: "printf".to_owned(),
            symbol_prefix: "_".to_owned(),
        }
    }
}

impl CodegenOptions {
    pub fn symbol_name(&self, name: impl core::fmt::Display) -> String {
        format!("{}{name}", self.symbol_prefix)
    }
}
