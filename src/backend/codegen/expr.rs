use crate::{
    backend::{
        asm::{Label, Opcode, Opcode::*, Operand, Register::*},
        sink::DataId,
    },
    error::{Error, Result},
    frontend::{
        Position,
        ast::{
            AssignOperator, BinaryOperator, BinaryOperatorClass, Call, Expression, ExpressionKind,
            StringLiteral, UnaryOperator,
        },
    },
    middle::{
        symbols::{ConstantValue, FIRST_ARGUMENT_OFFSET, Predefined, Storage, SymbolId},
        ty::{QUAD, TypeId, row_major_strides},
    },
};

use super::CodeGenerator;

impl CodeGenerator<'_> {
    fn type_of(&self, expression: &Expression) -> Result<TypeId> {
        expression.resolve_type(self.registry)
    }

    /// Pushes the value of `expression`, or its address if it is an aggregate
    pub(super) fn value(&mut self, expression: &Expression) -> Result<()> {
        let registry = self.registry;

        match &expression.kind {
            ExpressionKind::Integer(value) => self.push_integer(*value),
            ExpressionKind::Float(value) => self.push_float(*value),
            ExpressionKind::String(literal) => self.string(literal),
            ExpressionKind::Constant(symbol) => match registry.constant(*symbol)? {
                ConstantValue::Integer(value) => self.push_integer(value),
                ConstantValue::Float(value) => self.push_float(value),
            },
            ExpressionKind::Variable(_)
            | ExpressionKind::ArrayAccess { .. }
            | ExpressionKind::RecordAccess { .. }
            | ExpressionKind::Unary {
                operator: UnaryOperator::Dereference,
                ..
            } => {
                let ty = self.type_of(expression)?;

                if registry.types().is_aggregate(ty) {
                    return self.address(expression);
                }

                if let Some(slot) = self.direct_slot(expression)? {
                    self.asm.unary(Pushq, slot);
                } else {
                    self.address(expression)?;
                    self.asm.unary(Popq, Rax);
                    self.asm.unary(Pushq, Operand::at(Rax, 0));
                }
            }
            ExpressionKind::Unary { operator, operand } => {
                let ty = self.type_of(expression)?;
                self.unary(*operator, operand, ty)?;
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                let ty = self.type_of(expression)?;
                self.binary(*operator, left, right, ty)?;
            }
            ExpressionKind::Assign {
                operator,
                target,
                value,
            } => self.assign(*operator, target, value)?,
            ExpressionKind::Call(call) => self.call(call, expression.position)?,
        }

        Ok(())
    }

    /// Pushes the value of `expression` converted to `target`
    pub(super) fn value_as(&mut self, expression: &Expression, target: TypeId) -> Result<()> {
        self.value(expression)?;

        let ty = self.type_of(expression)?;
        self.convert(ty, target);
        Ok(())
    }

    /// Converts the number on top of the stack between integer and float
    fn convert(&mut self, from: TypeId, to: TypeId) {
        match (from, to) {
            (TypeId::INTEGER, TypeId::FLOAT) => {
                self.asm.unary(Popq, Rax);
                self.asm.binary(Cvtsi2sdq, Rax, Xmm0);
                self.asm.binary(Movq, Xmm0, Rax);
                self.asm.unary(Pushq, Rax);
            }
            (TypeId::FLOAT, TypeId::INTEGER) => {
                self.asm.unary(Popq, Rax);
                self.asm.binary(Movq, Rax, Xmm0);
                self.asm.binary(Cvttsd2siq, Xmm0, Rax);
                self.asm.unary(Pushq, Rax);
            }
            _ => {}
        }
    }

    fn push_integer(&mut self, value: i64) {
        if i32::try_from(value).is_ok() {
            self.asm.unary(Pushq, value);
        } else {
            self.asm.binary(Movq, value, Rax);
            self.asm.unary(Pushq, Rax);
        }
    }

    fn push_float(&mut self, value: f64) {
        self.asm.binary(Movq, value.to_bits() as i64, Rax);
        self.asm.unary(Pushq, Rax);
    }

    fn string(&mut self, literal: &StringLiteral) {
        if literal.is_char() {
            let code = literal.value.chars().next().map_or(0, |c| c as i64);
            return self.push_integer(code);
        }

        let label = literal
            .storage
            .get_or_init(|| format!("str{}", literal.label_id));

        self.asm.add_string(label, &literal.value);
        self.asm.binary(Leaq, Operand::data(label.as_str()), Rax);
        self.asm.unary(Pushq, Rax);
    }

    /// The memory operand of a variable which can be read without computing
    /// its address first
    fn direct_slot(&self, expression: &Expression) -> Result<Option<Operand>> {
        let ExpressionKind::Variable(symbol) = &expression.kind else {
            return Ok(None);
        };

        Ok(match self.registry.variable(*symbol)?.storage {
            Storage::Global => Some(Operand::data(self.global_label(*symbol))),
            Storage::Frame {
                offset,
                indirect: false,
            } => Some(Operand::at(Rbp, offset)),
            Storage::Frame { indirect: true, .. } | Storage::Field { .. } => None,
        })
    }

    pub(super) fn global_label(&self, symbol: SymbolId) -> String {
        self.options.symbol_name(self.registry.name_of(symbol))
    }

    /// Pushes the address of a variable
    pub(super) fn variable_address(&mut self, symbol: SymbolId) -> Result<()> {
        match self.registry.variable(symbol)?.storage {
            Storage::Global => {
                let label = self.global_label(symbol);
                self.asm.binary(Leaq, Operand::data(label), Rax);
                self.asm.unary(Pushq, Rax);
            }
            Storage::Frame {
                offset,
                indirect: false,
            } => {
                self.asm.binary(Leaq, Operand::at(Rbp, offset), Rax);
                self.asm.unary(Pushq, Rax);
            }
            Storage::Frame {
                offset,
                indirect: true,
            } => self.asm.unary(Pushq, Operand::at(Rbp, offset)),
            Storage::Field { .. } => {
                return Err(Error::internal(format!(
                    "field \"{}\" used as a variable",
                    self.registry.name_of(symbol)
                )));
            }
        }

        Ok(())
    }

    /// Pushes the address of an lvalue, or of a routine
    pub(super) fn address(&mut self, expression: &Expression) -> Result<()> {
        let registry = self.registry;

        match &expression.kind {
            ExpressionKind::Variable(symbol) => self.variable_address(*symbol),
            ExpressionKind::ArrayAccess { array, indices } => self.element_address(array, indices),
            ExpressionKind::RecordAccess { record, field } => {
                let record_ty = self.type_of(record)?;
                let offset = registry
                    .types()
                    .record_fields(record_ty)
                    .and_then(|fields| fields.offset_of(*field))
                    .ok_or_else(|| {
                        Error::internal(format!(
                            "\"{}\" has no field \"{field}\"",
                            registry.types().name_of(record_ty)
                        ))
                    })?;

                self.address(record)?;
                if offset != 0 {
                    self.asm.unary(Popq, Rax);
                    self.asm.binary(Leaq, Operand::at(Rax, offset as i64), Rax);
                    self.asm.unary(Pushq, Rax);
                }

                Ok(())
            }
            ExpressionKind::Unary {
                operator: UnaryOperator::Dereference,
                operand,
            } => self.value(operand),
            ExpressionKind::Call(call) => {
                let name = self.global_label(call.routine);
                self.asm.binary(Leaq, Operand::data(name), Rax);
                self.asm.unary(Pushq, Rax);
                Ok(())
            }
            _ => Err(Error::internal(format!(
                "expression at {} has no address",
                expression.position
            ))),
        }
    }

    /// base + element size * sum((index - low) * stride)
    fn element_address(&mut self, array: &Expression, indices: &[Expression]) -> Result<()> {
        let types = self.registry.types();
        let array_ty = self.type_of(array)?;
        let (element, bounds) = types.array_parts(array_ty).ok_or_else(|| {
            Error::internal(format!("indexing non-array \"{}\"", types.name_of(array_ty)))
        })?;

        self.address(array)?;
        self.asm.unary(Pushq, 0_i64);

        let strides = row_major_strides(&bounds);
        for ((index, bound), stride) in indices.iter().zip(bounds.iter()).zip(strides) {
            self.value(index)?;
            self.asm.unary(Popq, Rax);

            if bound.low != 0 {
                self.asm.binary(Subq, bound.low, Rax);
            }

            if stride != 1 {
                self.asm.binary(Imulq, stride, Rax);
            }

            self.asm.binary(Addq, Rax, Operand::at(Rsp, 0));
        }

        self.asm.unary(Popq, Rax);
        self.asm.binary(Imulq, types.size_of(element) as i64, Rax);
        self.asm.unary(Popq, Rcx);
        self.asm.binary(Leaq, Operand::indexed(Rcx, Rax), Rax);
        self.asm.unary(Pushq, Rax);

        Ok(())
    }

    fn unary(&mut self, operator: UnaryOperator, operand: &Expression, ty: TypeId) -> Result<()> {
        match operator {
            UnaryOperator::Minus => {
                self.value(operand)?;
                self.asm.unary(Popq, Rax);

                if ty == TypeId::FLOAT {
                    self.asm.binary(Movq, Rax, Xmm1);
                    self.asm.binary(Xorpd, Xmm0, Xmm0);
                    self.asm.binary(Subsd, Xmm1, Xmm0);
                    self.asm.binary(Movq, Xmm0, Rax);
                } else {
                    self.asm.unary(Negq, Rax);
                }

                self.asm.unary(Pushq, Rax);
            }
            UnaryOperator::Not => {
                self.value(operand)?;
                self.asm.binary(Xorq, 1_i64, Operand::at(Rsp, 0));
            }
            UnaryOperator::AddressOf => self.address(operand)?,
            UnaryOperator::Dereference => {
                return Err(Error::internal("dereference generated as a plain operator"));
            }
        }

        Ok(())
    }

    fn binary(
        &mut self,
        operator: BinaryOperator,
        left: &Expression,
        right: &Expression,
        ty: TypeId,
    ) -> Result<()> {
        match operator.class() {
            BinaryOperatorClass::Arithmetic | BinaryOperatorClass::RealDivision => {
                self.value_as(left, ty)?;
                self.value_as(right, ty)?;
                self.arithmetic(operator, ty)
            }
            BinaryOperatorClass::Relational => {
                let float =
                    self.type_of(left)? == TypeId::FLOAT || self.type_of(right)? == TypeId::FLOAT;
                let operand_ty = if float { TypeId::FLOAT } else { TypeId::INTEGER };

                self.value_as(left, operand_ty)?;
                self.value_as(right, operand_ty)?;
                self.comparison(operator, float)
            }
            BinaryOperatorClass::Integer => match operator {
                BinaryOperator::And | BinaryOperator::Or => {
                    self.short_circuit(operator, left, right)
                }
                _ => {
                    self.value(left)?;
                    self.value(right)?;
                    self.integer_operation(operator)
                }
            },
        }
    }

    /// Combines the two operands on top of the stack. Both already have type
    /// `ty`.
    fn arithmetic(&mut self, operator: BinaryOperator, ty: TypeId) -> Result<()> {
        if ty == TypeId::FLOAT {
            let opcode = match operator {
                BinaryOperator::Add => Addsd,
                BinaryOperator::Subtract => Subsd,
                BinaryOperator::Multiply => Mulsd,
                BinaryOperator::Divide => Divsd,
                _ => return Err(unexpected_operator(operator)),
            };

            self.asm.unary(Popq, Rax);
            self.asm.binary(Movq, Rax, Xmm1);
            self.asm.unary(Popq, Rax);
            self.asm.binary(Movq, Rax, Xmm0);
            self.asm.binary(opcode, Xmm1, Xmm0);
            self.asm.binary(Movq, Xmm0, Rax);
        } else {
            let opcode = match operator {
                BinaryOperator::Add => Addq,
                BinaryOperator::Subtract => Subq,
                BinaryOperator::Multiply => Imulq,
                _ => return Err(unexpected_operator(operator)),
            };

            self.asm.unary(Popq, R10);
            self.asm.unary(Popq, Rax);
            self.asm.binary(opcode, R10, Rax);
        }

        self.asm.unary(Pushq, Rax);
        Ok(())
    }

    fn comparison(&mut self, operator: BinaryOperator, float: bool) -> Result<()> {
        let set = match (operator, float) {
            (BinaryOperator::Equal, _) => Sete,
            (BinaryOperator::NotEqual, _) => Setne,
            (BinaryOperator::Less, false) => Setl,
            (BinaryOperator::LessOrEqual, false) => Setle,
            (BinaryOperator::Greater, false) => Setg,
            (BinaryOperator::GreaterOrEqual, false) => Setge,
            (BinaryOperator::Less, true) => Setb,
            (BinaryOperator::LessOrEqual, true) => Setbe,
            (BinaryOperator::Greater, true) => Seta,
            (BinaryOperator::GreaterOrEqual, true) => Setae,
            _ => return Err(unexpected_operator(operator)),
        };

        if float {
            self.asm.unary(Popq, Rax);
            self.asm.binary(Movq, Rax, Xmm1);
            self.asm.unary(Popq, Rax);
            self.asm.binary(Movq, Rax, Xmm0);
            self.asm.binary(Xorq, Rax, Rax);
            self.asm.binary(Comisd, Xmm1, Xmm0);
        } else {
            self.asm.unary(Popq, R11);
            self.asm.unary(Popq, Rdx);
            self.asm.binary(Xorq, Rax, Rax);
            self.asm.binary(Cmpq, R11, Rdx);
        }

        self.asm.unary(set, Al);
        self.asm.unary(Pushq, Rax);
        Ok(())
    }

    /// AND and OR only evaluate their right operand when the left one does
    /// not decide the result
    fn short_circuit(
        &mut self,
        operator: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<()> {
        let (jump, decided, undecided) = match operator {
            BinaryOperator::And => (Jz, 0_i64, 1_i64),
            _ => (Jnz, 1, 0),
        };

        let decided_label = self.asm.new_label();
        let end_label = self.asm.new_label();

        for operand in [left, right] {
            self.value(operand)?;
            self.asm.unary(Popq, Rax);
            self.asm.binary(Testq, Rax, Rax);
            self.asm.unary(jump, decided_label.clone());
        }

        self.asm.unary(Pushq, undecided);
        self.asm.unary(Jmp, end_label.clone());
        self.asm.label(decided_label);
        self.asm.unary(Pushq, decided);
        self.asm.label(end_label);

        Ok(())
    }

    fn integer_operation(&mut self, operator: BinaryOperator) -> Result<()> {
        match operator {
            BinaryOperator::Xor => {
                self.asm.unary(Popq, Rbx);
                self.asm.unary(Popq, Rax);
                self.asm.binary(Xorq, Rbx, Rax);
            }
            BinaryOperator::Shl | BinaryOperator::Shr => {
                let opcode = if operator == BinaryOperator::Shl {
                    Shlq
                } else {
                    Shrq
                };

                self.asm.unary(Popq, Rcx);
                self.asm.unary(Popq, Rax);
                self.asm.binary(opcode, Cl, Rax);
            }
            BinaryOperator::IntegerDivide | BinaryOperator::Modulo => {
                self.asm.unary(Popq, Rbx);
                self.asm.unary(Popq, Rax);
                self.asm.nullary(Cqo);
                self.asm.unary(Idivq, Rbx);

                if operator == BinaryOperator::Modulo {
                    self.asm.binary(Movq, Rdx, Rax);
                }
            }
            _ => return Err(unexpected_operator(operator)),
        }

        self.asm.unary(Pushq, Rax);
        Ok(())
    }

    fn assign(
        &mut self,
        operator: AssignOperator,
        target: &Expression,
        value: &Expression,
    ) -> Result<()> {
        let target_ty = self.type_of(target)?;

        let Some(binary) = operator.binary_operator() else {
            self.value_as(value, target_ty)?;
            self.address(target)?;
            self.store(target_ty);
            return Ok(());
        };

        let value_ty = self.type_of(value)?;
        let ty = if binary == BinaryOperator::Divide {
            TypeId::FLOAT
        } else {
            self.registry
                .types()
                .widen(target_ty, value_ty)
                .ok_or_else(|| Error::internal("compound assignment on non-numbers"))?
        };

        // The target is evaluated once: its address stays on the stack
        // beneath the old value while the new one is computed
        self.address(target)?;
        self.asm.unary(Pushq, Operand::at(Rsp, 0));
        self.asm.unary(Popq, Rax);
        self.asm.unary(Pushq, Operand::at(Rax, 0));
        self.convert(target_ty, ty);

        self.value_as(value, ty)?;
        self.arithmetic(binary, ty)?;
        self.convert(ty, target_ty);

        self.asm.unary(Popq, Rcx);
        self.asm.unary(Popq, Rax);
        self.asm.binary(Movq, Rcx, Operand::at(Rax, 0));
        Ok(())
    }

    /// Pops a destination address, then the value to store there
    pub(super) fn store(&mut self, ty: TypeId) {
        let types = self.registry.types();

        if types.is_aggregate(ty) {
            self.asm.unary(Popq, Rdi);
            self.asm.unary(Popq, Rsi);
            self.asm.binary(Movq, types.size_of(ty) as i64, Rcx);
            self.asm.nullary(RepMovsb);
        } else {
            self.asm.unary(Popq, Rax);
            self.asm.unary(Popq, Rcx);
            self.asm.binary(Movq, Rcx, Operand::at(Rax, 0));
        }
    }

    fn call(&mut self, call: &Call, position: Position) -> Result<()> {
        let registry = self.registry;
        let types = registry.types();
        let routine = registry.routine(call.routine)?;

        if let Some(predefined) = routine.predefined {
            return self.predefined_call(predefined, call, position);
        }

        self.note(|| format!("call {}", registry.name_of(call.routine)));

        for (argument, formal) in call
            .arguments
            .iter()
            .zip(routine.parameter_types.iter())
            .rev()
        {
            if formal.by_reference {
                self.address(argument)?;
            } else {
                self.value_as(argument, formal.ty)?;
            }
        }

        if let Some(return_type) = routine.return_type {
            if types.is_aggregate(return_type) {
                return Err(Error::internal(format!(
                    "function \"{}\" returns an aggregate",
                    registry.name_of(call.routine)
                )));
            }

            self.asm.binary(Subq, QUAD as i64, Rsp);
        }

        let target = Label::Global(self.global_label(call.routine));
        self.asm.unary(Opcode::Call, target);

        let argument_bytes = (call.arguments.len() * QUAD) as i64;
        if routine.is_function() {
            self.asm.unary(Popq, Rax);
        }

        if argument_bytes > 0 {
            self.asm.binary(Addq, argument_bytes, Rsp);
        }

        if routine.is_function() {
            self.asm.unary(Pushq, Rax);
        }

        Ok(())
    }

    fn predefined_call(
        &mut self,
        predefined: Predefined,
        call: &Call,
        position: Position,
    ) -> Result<()> {
        match predefined {
            Predefined::Write | Predefined::Writeln => {
                for argument in &call.arguments {
                    let ty = self.type_of(argument)?;
                    self.value(argument)?;
                    self.print(ty)?;
                }

                if predefined == Predefined::Writeln {
                    let newline = self.format_label(self.formats.newline)?;
                    self.asm.binary(Leaq, Operand::data(newline), Rdi);
                    self.asm.binary(Xorq, Rax, Rax);
                    self.call_printf();
                }

                Ok(())
            }
            // Characters and integers are both quads
            Predefined::Ord | Predefined::Chr => match call.arguments.as_slice() {
                [argument] => self.value(argument),
                _ => Err(Error::internal(format!(
                    "{predefined} at {position} takes exactly one argument"
                ))),
            },
            Predefined::Exit => self.exit(call),
        }
    }

    fn format_label(&self, id: DataId) -> Result<String> {
        Ok(self.asm.data_label(id)?.to_owned())
    }

    /// Prints the value on top of the stack
    fn print(&mut self, ty: TypeId) -> Result<()> {
        let format = match ty {
            TypeId::INTEGER => self.formats.integer,
            TypeId::FLOAT => self.formats.float,
            TypeId::CHAR => self.formats.char,
            TypeId::STRING => self.formats.string,
            _ => {
                return Err(Error::internal(format!(
                    "can't print \"{}\"",
                    self.registry.types().name_of(ty)
                )));
            }
        };

        let format = Operand::data(self.format_label(format)?);

        // %al holds the number of vector registers used by the call
        if ty == TypeId::FLOAT {
            self.asm.unary(Popq, Rax);
            self.asm.binary(Movq, Rax, Xmm0);
            self.asm.binary(Leaq, format, Rdi);
            self.asm.binary(Movq, 1_i64, Rax);
        } else {
            self.asm.unary(Popq, Rsi);
            self.asm.binary(Leaq, format, Rdi);
            self.asm.binary(Xorq, Rax, Rax);
        }

        self.call_printf();
        Ok(())
    }

    /// The operand stack is only quad aligned, printf wants 16 bytes
    fn call_printf(&mut self) {
        self.asm.binary(Movq, Rsp, Rbx);
        self.asm.binary(Andq, -16_i64, Rsp);
        self.asm.unary(
            Opcode::Call,
            Label::Global(self.options.printf_symbol.clone()),
        );
        self.asm.binary(Movq, Rbx, Rsp);
    }

    fn exit(&mut self, call: &Call) -> Result<()> {
        let Some(&routine) = self.routines.last() else {
            self.note(|| "exit program".to_owned());
            self.main_epilogue();
            return Ok(());
        };

        let return_type = self.registry.routine(routine)?.return_type;
        if let (Some(return_type), Some(value)) = (return_type, call.arguments.first()) {
            self.value_as(value, return_type)?;
            self.asm.unary(Popq, Rax);
            self.asm
                .binary(Movq, Rax, Operand::at(Rbp, FIRST_ARGUMENT_OFFSET));
        }

        self.epilogue();
        Ok(())
    }
}

fn unexpected_operator(operator: BinaryOperator) -> Error {
    Error::internal(format!("unexpected operator \"{operator}\""))
}
