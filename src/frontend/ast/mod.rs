//! The bound syntax tree. Every name has already been resolved to a symbol
//! by the time a node is built, so nodes carry [`SymbolId`]s rather than
//! identifiers.

use std::{
    cell::OnceCell,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{
    frontend::{Position, intern::Name},
    middle::{symbols::SymbolId, ty::TypeId},
};

#[derive(Debug)]
pub struct Program {
    pub name: Name,
    /// Declarations and executable blocks in source order
    pub parts: Vec<Statement>,
}

#[derive(Debug)]
pub struct Statement {
    pub position: Position,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind, position: Position) -> Self {
        Self { position, kind }
    }
}

#[derive(Debug)]
pub enum StatementKind {
    /// BEGIN ... END
    Block(Vec<Statement>),
    Expression(Expression),
    If {
        condition: Expression,
        then: Box<Statement>,
        otherwise: Option<Box<Statement>>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
    /// REPEAT ... UNTIL condition
    Repeat {
        body: Vec<Statement>,
        condition: Expression,
    },
    For {
        variable: Expression,
        low: Expression,
        high: Expression,
        direction: ForDirection,
        body: Box<Statement>,
    },
    Break,
    Continue,
    Var(VarDeclaration),
    Type(Vec<SymbolId>),
    Const(Vec<SymbolId>),
    Routine(RoutineDeclaration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ForDirection {
    #[strum(serialize = "TO")]
    Ascending,
    #[strum(serialize = "DOWNTO")]
    Descending,
}

#[derive(Debug)]
pub struct VarDeclaration {
    pub units: Vec<VarUnit>,
}

/// `a, b, c: T = initializer`
#[derive(Debug)]
pub struct VarUnit {
    pub position: Position,
    pub variables: Vec<SymbolId>,
    pub initializer: Option<Expression>,
}

#[derive(Debug)]
pub struct RoutineDeclaration {
    pub symbol: SymbolId,
    /// Empty for a forward declaration
    pub parts: Vec<Statement>,
}

impl RoutineDeclaration {
    pub fn is_forward(&self) -> bool {
        self.parts.is_empty()
    }
}

#[derive(Debug)]
pub struct Expression {
    pub position: Position,
    pub kind: ExpressionKind,
    pub(crate) ty: OnceCell<TypeId>,
}

#[derive(Debug)]
pub enum ExpressionKind {
    Integer(i64),
    Float(f64),
    String(StringLiteral),
    Constant(SymbolId),
    Variable(SymbolId),
    ArrayAccess {
        array: Box<Expression>,
        indices: Vec<Expression>,
    },
    RecordAccess {
        record: Box<Expression>,
        field: Name,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Assign {
        operator: AssignOperator,
        target: Box<Expression>,
        value: Box<Expression>,
    },
    Call(Call),
}

impl Expression {
    pub fn new(kind: ExpressionKind, position: Position) -> Self {
        Self {
            position,
            kind,
            ty: OnceCell::new(),
        }
    }

    pub fn integer(value: i64, position: Position) -> Self {
        Self::new(ExpressionKind::Integer(value), position)
    }

    pub fn float(value: f64, position: Position) -> Self {
        Self::new(ExpressionKind::Float(value), position)
    }

    pub fn string(value: impl Into<String>, position: Position) -> Self {
        Self::new(ExpressionKind::String(StringLiteral::new(value)), position)
    }

    pub fn constant(symbol: SymbolId, position: Position) -> Self {
        Self::new(ExpressionKind::Constant(symbol), position)
    }

    pub fn variable(symbol: SymbolId, position: Position) -> Self {
        Self::new(ExpressionKind::Variable(symbol), position)
    }

    pub fn array_access(array: Expression, indices: Vec<Expression>, position: Position) -> Self {
        Self::new(
            ExpressionKind::ArrayAccess {
                array: Box::new(array),
                indices,
            },
            position,
        )
    }

    pub fn record_access(record: Expression, field: &str, position: Position) -> Self {
        Self::new(
            ExpressionKind::RecordAccess {
                record: Box::new(record),
                field: Name::new(field),
            },
            position,
        )
    }

    pub fn unary(operator: UnaryOperator, operand: Expression, position: Position) -> Self {
        Self::new(
            ExpressionKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            position,
        )
    }

    pub fn binary(
        operator: BinaryOperator,
        left: Expression,
        right: Expression,
        position: Position,
    ) -> Self {
        Self::new(
            ExpressionKind::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            position,
        )
    }

    pub fn assign(
        operator: AssignOperator,
        target: Expression,
        value: Expression,
        position: Position,
    ) -> Self {
        Self::new(
            ExpressionKind::Assign {
                operator,
                target: Box::new(target),
                value: Box::new(value),
            },
            position,
        )
    }

    pub fn call(routine: SymbolId, arguments: Vec<Expression>, position: Position) -> Self {
        Self::new(
            ExpressionKind::Call(Call {
                routine,
                arguments,
                callable_type: OnceCell::new(),
            }),
            position,
        )
    }

    /// Whether the expression designates a storage location
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExpressionKind::Variable(_)
            | ExpressionKind::ArrayAccess { .. }
            | ExpressionKind::RecordAccess { .. } => true,
            ExpressionKind::Unary { operator, .. } => *operator == UnaryOperator::Dereference,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Call {
    pub routine: SymbolId,
    pub arguments: Vec<Expression>,
    /// Type of the routine itself, only needed when its address is taken
    pub(crate) callable_type: OnceCell<TypeId>,
}

static NEXT_STRING_LABEL: AtomicU32 = AtomicU32::new(0);

#[derive(Debug)]
pub struct StringLiteral {
    pub value: String,
    /// Unique for the whole process, ascending in construction order
    pub label_id: u32,
    /// Data section label, assigned the first time the literal is generated
    pub(crate) storage: OnceCell<String>,
}

impl StringLiteral {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label_id: NEXT_STRING_LABEL.fetch_add(1, Ordering::Relaxed),
            storage: OnceCell::new(),
        }
    }

    pub fn is_char(&self) -> bool {
        self.value.chars().count() == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnaryOperator {
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "^")]
    Dereference,
    #[strum(serialize = "@")]
    AddressOf,
    #[strum(serialize = "NOT")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "<>")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
    #[strum(serialize = "XOR")]
    Xor,
    #[strum(serialize = "SHL")]
    Shl,
    #[strum(serialize = "SHR")]
    Shr,
    #[strum(serialize = "DIV")]
    IntegerDivide,
    #[strum(serialize = "MOD")]
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    /// + - *
    Arithmetic,
    /// /
    RealDivision,
    Relational,
    /// Operators which only accept integers
    Integer,
}

impl BinaryOperator {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply => BinaryOperatorClass::Arithmetic,
            Self::Divide => BinaryOperatorClass::RealDivision,
            Self::Equal
            | Self::NotEqual
            | Self::Less
            | Self::LessOrEqual
            | Self::Greater
            | Self::GreaterOrEqual => BinaryOperatorClass::Relational,
            Self::And
            | Self::Or
            | Self::Xor
            | Self::Shl
            | Self::Shr
            | Self::IntegerDivide
            | Self::Modulo => BinaryOperatorClass::Integer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AssignOperator {
    #[strum(serialize = ":=")]
    Assign,
    #[strum(serialize = "+=")]
    Add,
    #[strum(serialize = "-=")]
    Subtract,
    #[strum(serialize = "*=")]
    Multiply,
    #[strum(serialize = "/=")]
    Divide,
}

impl AssignOperator {
    /// The operator combining the old and new values of a compound assignment
    pub fn binary_operator(self) -> Option<BinaryOperator> {
        match self {
            Self::Assign => None,
            Self::Add => Some(BinaryOperator::Add),
            Self::Subtract => Some(BinaryOperator::Subtract),
            Self::Multiply => Some(BinaryOperator::Multiply),
            Self::Divide => Some(BinaryOperator::Divide),
        }
    }
}
