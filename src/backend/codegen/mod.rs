//! Translation of a bound, type checked program into instructions.
//!
//! Every expression leaves exactly one quad on the stack: its value, or its
//! address when the value is an array or record. Expressions without a type
//! (assignments, procedure calls) leave nothing. Operators pop their operands
//! into scratch registers and push the result back.
//!
//! Routines use the following convention. The caller pushes the arguments
//! from last to first (addresses for VAR and aggregate parameters), reserves
//! a quad for the result of a function and calls. The callee finds the result
//! slot at `16(%rbp)` followed by the parameters. Once the callee returns the
//! caller pops the result, drops the arguments and pushes the result again.

use crate::{
    backend::{
        CodegenOptions,
        asm::{Label, Opcode::*, Operand, Register::*},
        sink::{Assembly, DataId, DataKind, Listing, Region},
    },
    error::{Error, Result},
    frontend::ast::{Program, StatementKind},
    middle::symbols::{Registry, SymbolId},
};

mod expr;
mod stmt;

#[cfg(test)]
mod tests;

/// Generates the listing of a whole program
pub fn generate_program(
    program: &Program,
    registry: &Registry,
    options: &CodegenOptions,
) -> Result<Listing> {
    log::debug!("generating program {}", program.name);

    let mut generator = CodeGenerator::new(registry, options);
    generator.program(program)?;
    generator.asm.finish(options)
}

struct Formats {
    integer: DataId,
    float: DataId,
    char: DataId,
    string: DataId,
    newline: DataId,
}

#[derive(Debug, Clone)]
struct LoopLabels {
    continue_label: Label,
    end_label: Label,
}

pub struct CodeGenerator<'a> {
    registry: &'a Registry,
    options: &'a CodegenOptions,
    asm: Assembly,
    formats: Formats,
    /// Innermost loop last
    loops: Vec<LoopLabels>,
    /// Routines being generated, innermost last. Empty in the main program.
    routines: Vec<SymbolId>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(registry: &'a Registry, options: &'a CodegenOptions) -> Self {
        let mut asm = Assembly::new();

        let formats = Formats {
            integer: asm.add_data("fmt_integer", DataKind::Asciz("%lld".to_owned())),
            float: asm.add_data("fmt_float", DataKind::Asciz("%lf".to_owned())),
            char: asm.add_data("fmt_char", DataKind::Asciz("%c".to_owned())),
            string: asm.add_data("fmt_string", DataKind::Asciz("%s".to_owned())),
            newline: asm.add_data("fmt_newline", DataKind::Asciz("\n".to_owned())),
        };

        Self {
            registry,
            options,
            asm,
            formats,
            loops: Vec::new(),
            routines: Vec::new(),
        }
    }

    fn program(&mut self, program: &Program) -> Result<()> {
        self.note(|| format!("program {}", program.name));
        self.asm
            .label(Label::Global(self.options.entry_symbol.clone()));
        self.main_prologue();

        // Initializers of global variables wait here until the first block
        self.asm.push_side_buffer();

        for part in &program.parts {
            let declaration = matches!(
                part.kind,
                StatementKind::Var(_)
                    | StatementKind::Type(_)
                    | StatementKind::Const(_)
                    | StatementKind::Routine(_)
            );

            if !declaration && self.asm.has_side_buffer() {
                self.asm.pop_side_buffer()?;
            }

            self.statement(part)?;
        }

        if self.asm.has_side_buffer() {
            self.asm.pop_side_buffer()?;
        }

        self.main_epilogue();
        self.asm.append_routines()
    }

    /// Runs `body` with `labels` as the innermost loop
    fn with_loop<T>(
        &mut self,
        labels: LoopLabels,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.loops.push(labels);
        let result = body(self);
        self.loops.pop();
        result
    }

    /// Runs `body` with `routine` as the innermost routine, emitting into the
    /// routine region
    fn with_routine<T>(
        &mut self,
        routine: SymbolId,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.routines.push(routine);
        let previous = self.asm.set_region(Region::Routines);

        let result = body(self);

        self.asm.set_region(previous);
        self.routines.pop();
        result
    }

    fn innermost_loop(&self, statement: &str) -> Result<&LoopLabels> {
        self.loops
            .last()
            .ok_or_else(|| Error::internal(format!("{statement} outside of a loop")))
    }

    fn note(&mut self, text: impl FnOnce() -> String) {
        if self.options.emit_comments {
            self.asm.comment(text());
        }
    }

    fn prologue(&mut self, frame_size: usize) {
        self.asm.unary(Pushq, Rbp);
        self.asm.binary(Movq, Rsp, Rbp);

        if frame_size > 0 {
            self.asm.binary(Subq, frame_size as i64, Rsp);
        }
    }

    fn epilogue(&mut self) {
        self.asm.binary(Movq, Rbp, Rsp);
        self.asm.unary(Popq, Rbp);
        self.asm.nullary(Ret);
    }

    /// `%rbx` belongs to the caller of main and is used as scratch space, so
    /// it is saved below the frame pointer
    fn main_prologue(&mut self) {
        self.prologue(0);
        self.asm.unary(Pushq, Rbx);
    }

    fn main_epilogue(&mut self) {
        self.asm.binary(Movq, Operand::at(Rbp, -8), Rbx);
        self.asm.binary(Movq, Rbp, Rsp);
        self.asm.unary(Popq, Rbp);
        self.asm.binary(Xorq, Rax, Rax);
        self.asm.nullary(Ret);
    }
}
