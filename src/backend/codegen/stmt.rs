use crate::{
    backend::{
        asm::{Label, Opcode::*, Operand, Register::*},
        sink::DataKind,
    },
    error::{Error, Result},
    frontend::ast::{
        Expression, ForDirection, RoutineDeclaration, Statement, StatementKind, VarDeclaration,
    },
    middle::{
        symbols::Storage,
        ty::{QUAD, TypeId},
    },
};

use super::{CodeGenerator, LoopLabels};

impl CodeGenerator<'_> {
    pub(super) fn statement(&mut self, statement: &Statement) -> Result<()> {
        match &statement.kind {
            StatementKind::Block(statements) => {
                for statement in statements {
                    self.statement(statement)?;
                }
            }
            StatementKind::Expression(expression) => {
                self.value(expression)?;

                if expression.resolve_type(self.registry)? != TypeId::NO_TYPE {
                    self.asm.binary(Addq, QUAD as i64, Rsp);
                }
            }
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.note(|| format!("if at {}", statement.position));

                let else_label = self.asm.new_label();
                self.jump_if_false(condition, &else_label)?;
                self.statement(then)?;

                match otherwise {
                    Some(otherwise) => {
                        let end_label = self.asm.new_label();
                        self.asm.unary(Jmp, end_label.clone());
                        self.asm.label(else_label);
                        self.statement(otherwise)?;
                        self.asm.label(end_label);
                    }
                    None => self.asm.label(else_label),
                }
            }
            StatementKind::While { condition, body } => {
                self.note(|| format!("while at {}", statement.position));

                let start_label = self.asm.new_label();
                let end_label = self.asm.new_label();

                self.asm.label(start_label.clone());
                self.jump_if_false(condition, &end_label)?;

                let labels = LoopLabels {
                    continue_label: start_label.clone(),
                    end_label: end_label.clone(),
                };
                self.with_loop(labels, |this| this.statement(body))?;

                self.asm.unary(Jmp, start_label);
                self.asm.label(end_label);
            }
            StatementKind::Repeat { body, condition } => {
                self.note(|| format!("repeat at {}", statement.position));

                let body_label = self.asm.new_label();
                let check_label = self.asm.new_label();
                let end_label = self.asm.new_label();

                self.asm.label(body_label.clone());

                let labels = LoopLabels {
                    continue_label: check_label.clone(),
                    end_label: end_label.clone(),
                };
                self.with_loop(labels, |this| {
                    body.iter().try_for_each(|statement| this.statement(statement))
                })?;

                self.asm.label(check_label);
                self.jump_if_false(condition, &body_label)?;
                self.asm.label(end_label);
            }
            StatementKind::For {
                variable,
                low,
                high,
                direction,
                body,
            } => {
                self.note(|| format!("for {direction} at {}", statement.position));
                self.for_loop(variable, low, high, *direction, body)?;
            }
            StatementKind::Break => {
                let target = self.innermost_loop("BREAK")?.end_label.clone();
                self.asm.unary(Jmp, target);
            }
            StatementKind::Continue => {
                let target = self.innermost_loop("CONTINUE")?.continue_label.clone();
                self.asm.unary(Jmp, target);
            }
            StatementKind::Var(declaration) => self.var_declaration(declaration)?,
            StatementKind::Type(_) | StatementKind::Const(_) => {}
            StatementKind::Routine(declaration) => self.routine(declaration)?,
        }

        Ok(())
    }

    fn jump_if_false(&mut self, condition: &Expression, target: &Label) -> Result<()> {
        self.value(condition)?;
        self.asm.unary(Popq, Rax);
        self.asm.binary(Testq, Rax, Rax);
        self.asm.unary(Jz, target.clone());
        Ok(())
    }

    /// The bounds are checked before the first iteration so that an empty
    /// range never runs the body. The upper bound is evaluated again before
    /// every further iteration.
    fn for_loop(
        &mut self,
        variable: &Expression,
        low: &Expression,
        high: &Expression,
        direction: ForDirection,
        body: &Statement,
    ) -> Result<()> {
        let (skip, done, step) = match direction {
            ForDirection::Ascending => (Jl, Jle, Addq),
            ForDirection::Descending => (Jg, Jge, Subq),
        };

        let body_label = self.asm.new_label();
        let continue_label = self.asm.new_label();
        let end_label = self.asm.new_label();

        // variable := low, then compare it against high
        self.value_as(low, TypeId::INTEGER)?;
        self.address(variable)?;
        self.value_as(high, TypeId::INTEGER)?;
        self.asm.unary(Popq, Rdx);
        self.asm.unary(Popq, Rcx);
        self.asm.unary(Popq, Operand::at(Rcx, 0));
        self.asm.binary(Movq, Operand::at(Rcx, 0), Rcx);
        self.asm.binary(Cmpq, Rcx, Rdx);
        self.asm.unary(skip, end_label.clone());

        self.asm.label(body_label.clone());

        let labels = LoopLabels {
            continue_label: continue_label.clone(),
            end_label: end_label.clone(),
        };
        self.with_loop(labels, |this| this.statement(body))?;

        self.asm.label(continue_label);
        self.value_as(high, TypeId::INTEGER)?;
        self.value(variable)?;
        self.asm.unary(Popq, Rdx);
        self.asm.unary(Popq, Rcx);
        self.asm.binary(Cmpq, Rdx, Rcx);
        self.asm.unary(done, end_label.clone());

        self.address(variable)?;
        self.asm.unary(Popq, Rax);
        self.asm.binary(step, 1_i64, Operand::at(Rax, 0));
        self.asm.unary(Jmp, body_label);

        self.asm.label(end_label);
        Ok(())
    }

    /// Globals get their storage in the data section. Initializers run where
    /// the declaration is generated: the side buffer for globals, the start
    /// of the body for locals.
    fn var_declaration(&mut self, declaration: &VarDeclaration) -> Result<()> {
        let registry = self.registry;

        for unit in &declaration.units {
            for &symbol in &unit.variables {
                let variable = registry.variable(symbol)?;

                if variable.storage == Storage::Global {
                    let label = self.global_label(symbol);
                    self.asm
                        .add_data(label, DataKind::Zero(registry.types().size_of(variable.ty)));
                }

                if let Some(initializer) = &unit.initializer {
                    self.value_as(initializer, variable.ty)?;
                    self.variable_address(symbol)?;
                    self.store(variable.ty);
                }
            }
        }

        Ok(())
    }

    fn routine(&mut self, declaration: &RoutineDeclaration) -> Result<()> {
        if declaration.is_forward() {
            return Ok(());
        }

        let registry = self.registry;
        let routine = registry.routine(declaration.symbol)?;
        let name = self.global_label(declaration.symbol);

        if let Some(return_type) = routine.return_type {
            if registry.types().is_aggregate(return_type) {
                return Err(Error::internal(format!(
                    "function \"{name}\" returns an aggregate"
                )));
            }
        }

        log::debug!(
            "generating routine {name} with a {} byte frame",
            routine.frame_size()
        );

        self.with_routine(declaration.symbol, |this| {
            this.note(|| format!("routine {}", registry.name_of(declaration.symbol)));
            this.asm.label(Label::Global(name));
            this.prologue(routine.frame_size());

            let mut nested = Vec::new();
            for part in &declaration.parts {
                match &part.kind {
                    StatementKind::Routine(inner) => nested.push(inner),
                    _ => this.statement(part)?,
                }
            }

            this.epilogue();

            nested.into_iter().try_for_each(|inner| this.routine(inner))
        })
    }
}
