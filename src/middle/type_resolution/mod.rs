//! Static typing of expressions.
//!
//! The parser asks for the type of every expression as soon as it has built
//! it, so semantic errors surface in source order. Results are cached on the
//! node: once resolution succeeds, later queries (in particular the ones made
//! by the code generator) return the cached [`TypeId`] without redoing any
//! work. A failed resolution caches nothing.

use crate::{
    error::{Error, Result, SemanticErrorKind},
    frontend::{
        Position,
        ast::{
            BinaryOperator, BinaryOperatorClass, Call, Expression, ExpressionKind, UnaryOperator,
            VarDeclaration,
        },
    },
    middle::{
        symbols::{Predefined, Registry, SymbolId},
        ty::{TypeId, TypeTable},
    },
};


/// Whether a value of type `value` may be stored into a location of type
/// `target`: numbers convert freely, anything else must match exactly, except
/// that a procedure variable accepts a pointer to a routine of its type.
pub fn is_assignable(types: &TypeTable, target: TypeId, value: TypeId) -> bool {
    target == value
        || types.widen(target, value).is_some()
        || (types.is_callable(target) && types.pointee(value) == Some(target))
}

impl Expression {
    pub fn resolve_type(&self, registry: &Registry) -> Result<TypeId> {
        if let Some(ty) = self.ty.get() {
            return Ok(*ty);
        }

        let ty = self.compute_type(registry)?;
        log::trace!(
            "resolved expression at {} to {}",
            self.position,
            registry.types().name_of(ty)
        );

        Ok(*self.ty.get_or_init(|| ty))
    }

    fn compute_type(&self, registry: &Registry) -> Result<TypeId> {
        let types = registry.types();

        match &self.kind {
            ExpressionKind::Integer(_) => Ok(TypeId::INTEGER),
            ExpressionKind::Float(_) => Ok(TypeId::FLOAT),
            ExpressionKind::String(literal) => Ok(if literal.is_char() {
                TypeId::CHAR
            } else {
                TypeId::STRING
            }),
            ExpressionKind::Constant(symbol) => Ok(registry.constant(*symbol)?.ty()),
            ExpressionKind::Variable(symbol) => Ok(registry.variable(*symbol)?.ty),
            ExpressionKind::ArrayAccess { array, indices } => {
                let array_ty = array.resolve_type(registry)?;
                let Some((element, bounds)) = types.array_parts(array_ty) else {
                    return Err(self.error(SemanticErrorKind::NotAnArray {
                        actual: types.name_of(array_ty),
                    }));
                };

                if indices.len() != bounds.len() {
                    return Err(self.error(SemanticErrorKind::DimensionMismatch {
                        expected: bounds.len(),
                        actual: indices.len(),
                    }));
                }

                for (i, index) in indices.iter().enumerate() {
                    let index_ty = index.resolve_type(registry)?;

                    if index_ty != TypeId::INTEGER {
                        return Err(index.error(SemanticErrorKind::NonIntegerIndex {
                            index: i + 1,
                            actual: types.name_of(index_ty),
                        }));
                    }
                }

                Ok(element)
            }
            ExpressionKind::RecordAccess { record, field } => {
                let record_ty = record.resolve_type(registry)?;
                let symbol = types
                    .record_fields(record_ty)
                    .and_then(|fields| fields.lookup(*field))
                    .ok_or_else(|| {
                        Error::internal(format!(
                            "\"{}\" has no field \"{field}\"",
                            types.name_of(record_ty)
                        ))
                    })?;

                Ok(registry.variable(symbol)?.ty)
            }
            ExpressionKind::Unary { operator, operand } => {
                self.unary_type(registry, *operator, operand)
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                let left_ty = left.resolve_type(registry)?;
                let right_ty = right.resolve_type(registry)?;

                self.binary_type(types, *operator, left_ty, right_ty)
            }
            ExpressionKind::Assign {
                operator,
                target,
                value,
            } => {
                if !target.is_lvalue() {
                    return Err(target.error(SemanticErrorKind::NotAnLvalue));
                }

                let target_ty = target.resolve_type(registry)?;
                let value_ty = value.resolve_type(registry)?;

                if operator.binary_operator().is_some()
                    && !(types.is_arithmetic(target_ty) && types.is_arithmetic(value_ty))
                {
                    return Err(self.error(SemanticErrorKind::ArithmeticOperands {
                        operator: operator.to_string(),
                        left: types.name_of(target_ty),
                        right: types.name_of(value_ty),
                    }));
                }

                if !is_assignable(types, target_ty, value_ty) {
                    return Err(self.error(SemanticErrorKind::IncompatibleTypes {
                        expected: types.name_of(target_ty),
                        actual: types.name_of(value_ty),
                    }));
                }

                Ok(TypeId::NO_TYPE)
            }
            ExpressionKind::Call(call) => Ok(registry
                .routine(call.routine)?
                .return_type
                .unwrap_or(TypeId::NO_TYPE)),
        }
    }

    fn unary_type(
        &self,
        registry: &Registry,
        operator: UnaryOperator,
        operand: &Expression,
    ) -> Result<TypeId> {
        let types = registry.types();

        match operator {
            UnaryOperator::Minus => {
                let ty = operand.resolve_type(registry)?;

                if types.is_arithmetic(ty) {
                    Ok(ty)
                } else {
                    Err(self.error(SemanticErrorKind::NegationOperand {
                        actual: types.name_of(ty),
                    }))
                }
            }
            UnaryOperator::Dereference => {
                let ty = operand.resolve_type(registry)?;

                types.pointee(ty).ok_or_else(|| {
                    self.error(SemanticErrorKind::DereferenceOperand {
                        actual: types.name_of(ty),
                    })
                })
            }
            UnaryOperator::AddressOf => match &operand.kind {
                ExpressionKind::ArrayAccess { .. }
                | ExpressionKind::Variable(_)
                | ExpressionKind::Unary {
                    operator: UnaryOperator::Dereference,
                    ..
                } => Ok(types.pointer(operand.resolve_type(registry)?)),
                ExpressionKind::Call(call) => Ok(types.pointer(call.callable_type(registry)?)),
                _ => Err(self.error(SemanticErrorKind::AddressOfOperand)),
            },
            UnaryOperator::Not => {
                let ty = operand.resolve_type(registry)?;

                if ty == TypeId::INTEGER {
                    Ok(TypeId::INTEGER)
                } else {
                    Err(self.error(SemanticErrorKind::NotOperand {
                        actual: types.name_of(ty),
                    }))
                }
            }
        }
    }

    fn binary_type(
        &self,
        types: &TypeTable,
        operator: BinaryOperator,
        left: TypeId,
        right: TypeId,
    ) -> Result<TypeId> {
        let class = operator.class();

        if class == BinaryOperatorClass::Integer {
            if left == TypeId::INTEGER && right == TypeId::INTEGER {
                return Ok(TypeId::INTEGER);
            }

            return Err(self.error(SemanticErrorKind::IntegerOperands {
                operator: operator.to_string(),
                left: types.name_of(left),
                right: types.name_of(right),
            }));
        }

        if !(types.is_arithmetic(left) && types.is_arithmetic(right)) {
            return Err(self.error(SemanticErrorKind::ArithmeticOperands {
                operator: operator.to_string(),
                left: types.name_of(left),
                right: types.name_of(right),
            }));
        }

        let Some(common) = types.widen(left, right) else {
            return Err(self.error(SemanticErrorKind::NoCommonType {
                left: types.name_of(left),
                right: types.name_of(right),
            }));
        };

        Ok(match class {
            BinaryOperatorClass::Arithmetic => common,
            BinaryOperatorClass::RealDivision => TypeId::FLOAT,
            BinaryOperatorClass::Relational | BinaryOperatorClass::Integer => TypeId::INTEGER,
        })
    }

    /// Validates the arguments of a call expression. `enclosing` is the
    /// routine whose body contains the call, `None` in the main program.
    pub fn check_call_arguments(
        &self,
        registry: &Registry,
        enclosing: Option<SymbolId>,
    ) -> Result<()> {
        match &self.kind {
            ExpressionKind::Call(call) => call.check_arguments(registry, enclosing, self.position),
            _ => Err(Error::internal("argument check on a non-call expression")),
        }
    }

    fn error(&self, kind: SemanticErrorKind) -> Error {
        kind.at(self.position)
    }
}

impl Call {
    /// The procedure or function type of the called routine. Only computed
    /// when the routine's address is taken.
    pub fn callable_type(&self, registry: &Registry) -> Result<TypeId> {
        if let Some(ty) = self.callable_type.get() {
            return Ok(*ty);
        }

        let ty = registry.routine_type(self.routine)?;
        Ok(*self.callable_type.get_or_init(|| ty))
    }

    fn check_arguments(
        &self,
        registry: &Registry,
        enclosing: Option<SymbolId>,
        position: Position,
    ) -> Result<()> {
        let types = registry.types();
        let routine = registry.routine(self.routine)?;

        // A bare EXIT is accepted in functions too, it leaves whatever was
        // last assigned to the result
        let takes_argument = matches!(routine.predefined, Some(Predefined::Ord | Predefined::Chr));
        if routine.parameters.is_empty() && self.arguments.is_empty() && !takes_argument {
            return Ok(());
        }

        let argument_types = self
            .arguments
            .iter()
            .map(|argument| argument.resolve_type(registry))
            .collect::<Result<Vec<_>>>()?;

        if let Some(predefined) = routine.predefined {
            return check_predefined_arguments(registry, predefined, &argument_types, enclosing)
                .map_err(|kind| kind.at(position));
        }

        if routine.parameters.len() != self.arguments.len() {
            return Err(SemanticErrorKind::ArgumentCount {
                routine: registry.name_of(self.routine).to_string(),
                expected: routine.parameters.len(),
                actual: self.arguments.len(),
            }
            .at(position));
        }

        for (i, ((argument, actual), formal)) in self
            .arguments
            .iter()
            .zip(argument_types)
            .zip(routine.parameter_types.iter())
            .enumerate()
        {
            if formal.by_reference && !argument.is_lvalue() {
                return Err(argument.error(SemanticErrorKind::ArgumentNotLvalue { index: i + 1 }));
            }

            // A reference parameter aliases the argument, so the storage
            // layouts have to be identical
            let compatible = if formal.by_reference {
                actual == formal.ty
            } else {
                actual == formal.ty || types.widen(formal.ty, actual).is_some()
            };

            if !compatible {
                return Err(argument.error(SemanticErrorKind::ArgumentType {
                    index: i + 1,
                    expected: types.name_of(formal.ty),
                    actual: types.name_of(actual),
                }));
            }
        }

        Ok(())
    }
}

fn check_predefined_arguments(
    registry: &Registry,
    predefined: Predefined,
    arguments: &[TypeId],
    enclosing: Option<SymbolId>,
) -> core::result::Result<(), SemanticErrorKind> {
    let types = registry.types();

    match predefined {
        Predefined::Exit => {
            let return_type = match enclosing {
                Some(routine) => registry
                    .routine(routine)
                    .ok()
                    .and_then(|routine| routine.return_type),
                None => None,
            };

            let valid = match (return_type, arguments) {
                (None, []) => true,
                (Some(expected), [actual]) => *actual == expected,
                _ => false,
            };

            if valid {
                Ok(())
            } else {
                Err(SemanticErrorKind::ExitArguments)
            }
        }
        Predefined::Write | Predefined::Writeln => {
            for ty in arguments {
                let writable =
                    *ty == TypeId::CHAR || *ty == TypeId::STRING || types.is_arithmetic(*ty);

                if !writable {
                    return Err(SemanticErrorKind::Unwritable {
                        actual: types.name_of(*ty),
                    });
                }
            }

            Ok(())
        }
        Predefined::Ord | Predefined::Chr => {
            let [actual] = arguments else {
                return Err(SemanticErrorKind::ArgumentCount {
                    routine: predefined.to_string(),
                    expected: 1,
                    actual: arguments.len(),
                });
            };

            let (accepted, expected): (&[TypeId], TypeId) = match predefined {
                Predefined::Ord => (&[TypeId::CHAR, TypeId::INTEGER], TypeId::CHAR),
                _ => (&[TypeId::INTEGER], TypeId::INTEGER),
            };

            if accepted.contains(actual) {
                Ok(())
            } else {
                Err(SemanticErrorKind::ArgumentType {
                    index: 1,
                    expected: types.name_of(expected),
                    actual: types.name_of(*actual),
                })
            }
        }
    }
}

impl VarDeclaration {
    /// Checks every initializer against the variables it initializes
    pub fn check(&self, registry: &Registry) -> Result<()> {
        let types = registry.types();

        for unit in &self.units {
            let Some(initializer) = &unit.initializer else {
                continue;
            };

            let value_ty = initializer.resolve_type(registry)?;

            for variable in &unit.variables {
                let target_ty = registry.variable(*variable)?.ty;

                if !is_assignable(types, target_ty, value_ty) {
                    return Err(initializer.error(SemanticErrorKind::IncompatibleTypes {
                        expected: types.name_of(target_ty),
                        actual: types.name_of(value_ty),
                    }));
                }
            }
        }

        Ok(())
    }
}
