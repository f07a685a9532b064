use std::{cell::RefCell, rc::Rc};

use hashbrown::HashMap;
use itertools::Itertools;

use crate::{
    frontend::intern::Name,
    index::{IndexVec, simple_index},
    middle::symbols::SymbolTable,
};

/// Size of one operand stack slot. Every scalar value is a single quad.
pub const QUAD: usize = 8;

simple_index! {
    /// Handle to a type stored in the [`TypeTable`]
    pub struct TypeId;
}

impl TypeId {
    /// Type of expressions which only exist for their side effects
    /// (assignments, procedure calls)
    pub const NO_TYPE: Self = Self(0);
    pub const INTEGER: Self = Self(1);
    pub const FLOAT: Self = Self(2);
    pub const CHAR: Self = Self(3);
    pub const STRING: Self = Self(4);
}

/// Declared range of one array dimension, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub low: i64,
    pub high: i64,
}

impl Bounds {
    pub const fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    /// Number of elements along this dimension
    pub fn extent(&self) -> i64 {
        self.high - self.low + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterType {
    pub ty: TypeId,
    pub by_reference: bool,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    NoType,
    /// 64-bit signed integer. Also used for booleans (0 or 1).
    Integer,
    /// IEEE double
    Float,
    Char,
    /// Pointer to a NUL terminated run of characters
    String,
    /// ARRAY[l1..h1, l2..h2] OF T
    Array {
        element: TypeId,
        bounds: Rc<[Bounds]>,
    },
    /// RECORD a: T; b: U END
    Record { fields: Rc<SymbolTable> },
    /// ^T
    Pointer(TypeId),
    /// PROCEDURE(a: T; VAR b: U)
    Procedure { parameters: Rc<[ParameterType]> },
    /// FUNCTION(a: T): R
    Function {
        parameters: Rc<[ParameterType]>,
        return_type: TypeId,
    },
}

/// Types which are structurally interned. Arrays and records are nominal so
/// they never go through here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InternKey {
    Pointer(TypeId),
    Procedure(Rc<[ParameterType]>),
    Function(Rc<[ParameterType]>, TypeId),
}

#[derive(Debug)]
struct TypeEntry {
    kind: Rc<TypeKind>,
    name: Option<Name>,
    size: usize,
}

/// Storage for every type of a compilation. Types are only ever added, so a
/// [`TypeId`] stays valid for the lifetime of the table. Insertion goes through
/// a shared reference because the resolver derives new pointer and callable
/// types while it only holds `&Registry`.
#[derive(Debug)]
pub struct TypeTable {
    entries: RefCell<IndexVec<TypeId, TypeEntry>>,
    interned: RefCell<HashMap<InternKey, TypeId>>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let table = Self {
            entries: RefCell::new(IndexVec::new()),
            interned: RefCell::new(HashMap::new()),
        };

        for (kind, name) in [
            (TypeKind::NoType, "NOTYPE"),
            (TypeKind::Integer, "INTEGER"),
            (TypeKind::Float, "FLOAT"),
            (TypeKind::Char, "CHAR"),
            (TypeKind::String, "STRING"),
        ] {
            let id = table.insert(kind);
            table.set_name(id, Name::new(name));
        }

        table
    }

    fn insert(&self, kind: TypeKind) -> TypeId {
        let size = self.compute_size(&kind);

        self.entries.borrow_mut().push(TypeEntry {
            kind: Rc::new(kind),
            name: None,
            size,
        })
    }

    fn intern(&self, key: InternKey) -> TypeId {
        if let Some(id) = self.interned.borrow().get(&key) {
            return *id;
        }

        let kind = match &key {
            InternKey::Pointer(target) => TypeKind::Pointer(*target),
            InternKey::Procedure(parameters) => TypeKind::Procedure {
                parameters: parameters.clone(),
            },
            InternKey::Function(parameters, return_type) => TypeKind::Function {
                parameters: parameters.clone(),
                return_type: *return_type,
            },
        };

        let id = self.insert(kind);
        self.interned.borrow_mut().insert(key, id);
        id
    }

    fn compute_size(&self, kind: &TypeKind) -> usize {
        match kind {
            TypeKind::NoType => 0,
            TypeKind::Integer
            | TypeKind::Float
            | TypeKind::Char
            | TypeKind::String
            | TypeKind::Pointer(_)
            | TypeKind::Procedure { .. }
            | TypeKind::Function { .. } => QUAD,
            TypeKind::Array { element, bounds } => {
                let count: i64 = bounds.iter().map(|b| b.extent().max(0)).product();
                self.size_of(*element) * count as usize
            }
            TypeKind::Record { fields } => fields.byte_size(),
        }
    }

    /// Creates a new array type. Every call creates a distinct type.
    pub fn array(&self, element: TypeId, bounds: impl Into<Rc<[Bounds]>>) -> TypeId {
        self.insert(TypeKind::Array {
            element,
            bounds: bounds.into(),
        })
    }

    /// Creates a new record type from its laid out fields. Every call creates
    /// a distinct type.
    pub fn record(&self, fields: SymbolTable) -> TypeId {
        self.insert(TypeKind::Record {
            fields: Rc::new(fields),
        })
    }

    pub fn pointer(&self, target: TypeId) -> TypeId {
        self.intern(InternKey::Pointer(target))
    }

    pub fn procedure(&self, parameters: impl Into<Rc<[ParameterType]>>) -> TypeId {
        self.intern(InternKey::Procedure(parameters.into()))
    }

    pub fn function(
        &self,
        parameters: impl Into<Rc<[ParameterType]>>,
        return_type: TypeId,
    ) -> TypeId {
        self.intern(InternKey::Function(parameters.into(), return_type))
    }

    /// Gives an anonymous type the name it was declared with in a TYPE
    /// section. Types which already have a name keep it.
    pub fn set_name(&self, id: TypeId, name: Name) {
        let mut entries = self.entries.borrow_mut();
        let entry = &mut entries[id];

        if entry.name.is_none() {
            entry.name = Some(name);
        }
    }

    pub fn kind(&self, id: TypeId) -> Rc<TypeKind> {
        self.entries.borrow()[id].kind.clone()
    }

    pub fn size_of(&self, id: TypeId) -> usize {
        self.entries.borrow()[id].size
    }

    /// Human readable type name used in error messages and listing comments
    pub fn name_of(&self, id: TypeId) -> String {
        if let Some(name) = self.entries.borrow()[id].name {
            return name.to_string();
        }

        match &*self.kind(id) {
            TypeKind::NoType
            | TypeKind::Integer
            | TypeKind::Float
            | TypeKind::Char
            | TypeKind::String => unreachable!("built-in types are always named"),
            TypeKind::Array { element, bounds } => format!(
                "ARRAY[{}] OF {}",
                bounds
                    .iter()
                    .map(|b| format!("{}..{}", b.low, b.high))
                    .join(", "),
                self.name_of(*element)
            ),
            TypeKind::Record { .. } => "RECORD".to_owned(),
            TypeKind::Pointer(target) => format!("^{}", self.name_of(*target)),
            TypeKind::Procedure { parameters } => {
                format!("PROCEDURE({})", self.format_parameters(parameters))
            }
            TypeKind::Function {
                parameters,
                return_type,
            } => format!(
                "FUNCTION({}): {}",
                self.format_parameters(parameters),
                self.name_of(*return_type)
            ),
        }
    }

    fn format_parameters(&self, parameters: &[ParameterType]) -> String {
        parameters
            .iter()
            .map(|p| {
                if p.by_reference {
                    format!("VAR {}", self.name_of(p.ty))
                } else {
                    self.name_of(p.ty)
                }
            })
            .join(", ")
    }

    pub fn is_arithmetic(&self, id: TypeId) -> bool {
        matches!(*self.kind(id), TypeKind::Integer | TypeKind::Float)
    }

    /// The wider of two arithmetic types, or `None` if either side is not
    /// arithmetic
    pub fn widen(&self, left: TypeId, right: TypeId) -> Option<TypeId> {
        match (&*self.kind(left), &*self.kind(right)) {
            (TypeKind::Integer, TypeKind::Integer) => Some(TypeId::INTEGER),
            (TypeKind::Float | TypeKind::Integer, TypeKind::Float | TypeKind::Integer) => {
                Some(TypeId::FLOAT)
            }
            _ => None,
        }
    }

    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match *self.kind(id) {
            TypeKind::Pointer(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_callable(&self, id: TypeId) -> bool {
        matches!(
            *self.kind(id),
            TypeKind::Procedure { .. } | TypeKind::Function { .. }
        )
    }

    /// Arrays and records do not fit in a quad. On the operand stack they are
    /// represented by their address.
    pub fn is_aggregate(&self, id: TypeId) -> bool {
        matches!(
            *self.kind(id),
            TypeKind::Array { .. } | TypeKind::Record { .. }
        )
    }

    pub fn array_parts(&self, id: TypeId) -> Option<(TypeId, Rc<[Bounds]>)> {
        match &*self.kind(id) {
            TypeKind::Array { element, bounds } => Some((*element, bounds.clone())),
            _ => None,
        }
    }

    pub fn record_fields(&self, id: TypeId) -> Option<Rc<SymbolTable>> {
        match &*self.kind(id) {
            TypeKind::Record { fields } => Some(fields.clone()),
            _ => None,
        }
    }
}

/// Element strides of a row-major array: the stride of a dimension is the
/// product of the extents of all the dimensions after it, so the last
/// dimension is contiguous.
pub fn row_major_strides(bounds: &[Bounds]) -> Vec<i64> {
    let mut strides = vec![1; bounds.len()];

    for i in (0..bounds.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * bounds[i + 1].extent();
    }

    strides
}
