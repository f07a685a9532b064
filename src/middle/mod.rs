//! Everything between the bound tree and code generation: the types and
//! symbols the binder registers, and the resolver which types expressions.

pub mod symbols;
pub mod ty;
pub mod type_resolution;
