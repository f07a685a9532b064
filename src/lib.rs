//! Semantic analysis and x86-64 code generation for a Pascal-family
//! language.
//!
//! The crate receives a syntax tree whose names the parser has already bound
//! to symbols in a [`middle::symbols::Registry`]. The parser calls
//! [`frontend::ast::Expression::resolve_type`] on every node as it builds it,
//! then the driver hands the finished [`frontend::ast::Program`] to
//! [`backend::generate_program`] and writes out the rendered listing.

pub mod backend;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;
