//! Renders listings as GNU `as` source in AT&T syntax.

use core::fmt;

use itertools::Itertools;

use crate::backend::{
    asm::{Instruction, Label, Operand},
    sink::{DataItem, DataKind, Listing},
};

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Local(id) => write!(f, ".L{id}"),
            Label::Global(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(register) => write!(f, "%{register}"),
            Operand::Immediate(value) => write!(f, "${value}"),
            Operand::Memory {
                base,
                index,
                displacement,
            } => {
                if *displacement != 0 {
                    write!(f, "{displacement}")?;
                }

                match index {
                    Some(index) => write!(f, "(%{base},%{index},1)"),
                    None => write!(f, "(%{base})"),
                }
            }
            Operand::Data(name) => write!(f, "{name}(%rip)"),
            Operand::Label(label) => write!(f, "{label}"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nullary(opcode) => write!(f, "    {opcode}"),
            Instruction::Unary(opcode, operand) => write!(f, "    {opcode} {operand}"),
            Instruction::Binary(opcode, source, destination) => {
                write!(f, "    {opcode} {source}, {destination}")
            }
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::Comment(comment) => write!(f, "    # {comment}"),
        }
    }
}

impl fmt::Display for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DataKind::Asciz(value) => {
                write!(f, "{}:\n    .asciz \"{}\"", self.label, escape_string(value))
            }
            DataKind::Zero(size) => {
                write!(f, "    .balign 8\n{}:\n    .zero {}", self.label, (*size).max(1))
            }
        }
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        indoc::writedoc!(
            f,
            "
                    .data
                {}
                    .text
                    .globl {}
                {}
            ",
            self.data.iter().join("\n"),
            self.entry_symbol,
            self.text.iter().join("\n"),
        )
    }
}

/// Escapes a string for an `.asciz` directive
fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for byte in value.bytes() {
        match byte {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            b'\n' => escaped.push_str("\\n"),
            b'\t' => escaped.push_str("\\t"),
            0x20..=0x7e => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{byte:03o}")),
        }
    }

    escaped
}
