//! Symbols produced by the binder and the registry which owns them.
//!
//! The registry is filled in while the program is parsed and only read by the
//! type resolver and the code generator. AST nodes refer to symbols through
//! [`SymbolId`] handles, never by ownership.

use hashbrown::HashMap;
use strum::IntoEnumIterator;

use crate::{
    error::{Error, Result, SemanticErrorKind},
    frontend::{Position, intern::Name},
    index::{IndexVec, simple_index},
    middle::ty::{ParameterType, QUAD, TypeId, TypeTable},
};

simple_index! {
    /// Handle to a symbol stored in the [`Registry`]
    pub struct SymbolId;
}

/// Distance from the frame pointer to the first slot pushed by the caller:
/// the saved frame pointer and the return address sit in between.
pub const FIRST_ARGUMENT_OFFSET: i64 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Integer(i64),
    Float(f64),
}

impl ConstantValue {
    pub fn ty(&self) -> TypeId {
        match self {
            ConstantValue::Integer(_) => TypeId::INTEGER,
            ConstantValue::Float(_) => TypeId::FLOAT,
        }
    }
}

/// Where the value of a variable lives at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Statically allocated in the data section under the variable's label
    Global,
    /// A slot relative to `%rbp`. Locals have negative offsets, parameters and
    /// the function result positive ones. An indirect slot holds the address
    /// of the value instead of the value itself (VAR parameters and aggregates
    /// passed by value).
    Frame { offset: i64, indirect: bool },
    /// Byte offset of a field inside its record
    Field { offset: usize },
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub ty: TypeId,
    pub storage: Storage,
}

/// Routines the compiler handles itself instead of calling user code
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Predefined {
    Write,
    Writeln,
    Ord,
    Chr,
    Exit,
}

impl Predefined {
    fn return_type(self) -> Option<TypeId> {
        match self {
            Predefined::Ord => Some(TypeId::INTEGER),
            Predefined::Chr => Some(TypeId::CHAR),
            Predefined::Write | Predefined::Writeln | Predefined::Exit => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Routine {
    pub parameters: SymbolTable,
    pub parameter_types: Vec<ParameterType>,
    /// Parameters followed by the local variables of the routine
    pub locals: SymbolTable,
    /// Set for functions
    pub return_type: Option<TypeId>,
    /// The variable the function name denotes inside its own body
    pub result: Option<SymbolId>,
    pub predefined: Option<Predefined>,
}

impl Routine {
    pub fn is_function(&self) -> bool {
        self.return_type.is_some()
    }

    /// Stack space the prologue reserves. Parameters are excluded because the
    /// caller already pushed them.
    pub fn frame_size(&self) -> usize {
        self.locals.byte_size() - self.parameters.byte_size()
    }
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    Variable(Variable),
    Constant(ConstantValue),
    Routine(Routine),
    Type(TypeId),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: Name,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableEntry {
    pub name: Name,
    pub symbol: SymbolId,
    /// Bytes the symbol occupies in the scope or record it belongs to
    pub size: usize,
}

/// Insertion ordered collection of uniquely named symbols. Used for parameter
/// lists, routine scopes and record layouts.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolTableEntry>,
    positions: HashMap<Name, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a symbol, rejecting names which are already present. Returns
    /// the index of the new entry.
    pub fn add(
        &mut self,
        name: Name,
        symbol: SymbolId,
        size: usize,
    ) -> core::result::Result<usize, SemanticErrorKind> {
        if self.positions.contains_key(&name) {
            return Err(SemanticErrorKind::Redefinition {
                name: name.to_string(),
            });
        }

        let index = self.entries.len();
        self.entries.push(SymbolTableEntry { name, symbol, size });
        self.positions.insert(name, index);
        Ok(index)
    }

    pub fn position_of(&self, name: Name) -> Option<usize> {
        self.positions.get(&name).copied()
    }

    pub fn get(&self, index: usize) -> Option<&SymbolTableEntry> {
        self.entries.get(index)
    }

    pub fn lookup(&self, name: Name) -> Option<SymbolId> {
        self.position_of(name).map(|i| self.entries[i].symbol)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SymbolTableEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Sum of the sizes of all the entries before `name`
    pub fn offset_of(&self, name: Name) -> Option<usize> {
        let position = self.position_of(name)?;

        Some(self.entries[..position].iter().map(|e| e.size).sum())
    }
}

/// A formal parameter as written in a routine heading
#[derive(Debug, Clone, Copy)]
pub struct ParameterDeclaration {
    pub name: Name,
    pub ty: TypeId,
    pub by_reference: bool,
}

impl ParameterDeclaration {
    pub fn value(name: &str, ty: TypeId) -> Self {
        Self {
            name: Name::new(name),
            ty,
            by_reference: false,
        }
    }

    pub fn reference(name: &str, ty: TypeId) -> Self {
        Self {
            name: Name::new(name),
            ty,
            by_reference: true,
        }
    }
}

fn align_to_quad(size: usize) -> usize {
    size.div_ceil(QUAD) * QUAD
}

/// Owns every symbol and type of a compilation
#[derive(Debug)]
pub struct Registry {
    types: TypeTable,
    symbols: IndexVec<SymbolId, Symbol>,
    globals: SymbolTable,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: TypeTable::new(),
            symbols: IndexVec::new(),
            globals: SymbolTable::new(),
        };

        for predefined in Predefined::iter() {
            let name = Name::new(&predefined.to_string());
            let id = registry.symbols.push(Symbol {
                name,
                kind: SymbolKind::Routine(Routine {
                    parameters: SymbolTable::new(),
                    parameter_types: Vec::new(),
                    locals: SymbolTable::new(),
                    return_type: predefined.return_type(),
                    result: None,
                    predefined: Some(predefined),
                }),
            });

            let added = registry.globals.add(name, id, 0);
            debug_assert!(added.is_ok(), "predefined routine {predefined} registered twice");
        }

        registry
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn globals(&self) -> &SymbolTable {
        &self.globals
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn name_of(&self, id: SymbolId) -> Name {
        self.symbols[id].name
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.globals.lookup(Name::new(name))
    }

    pub fn variable(&self, id: SymbolId) -> Result<&Variable> {
        match &self.symbols[id].kind {
            SymbolKind::Variable(variable) => Ok(variable),
            _ => Err(Error::internal(format!(
                "symbol \"{}\" is not a variable",
                self.name_of(id)
            ))),
        }
    }

    pub fn constant(&self, id: SymbolId) -> Result<ConstantValue> {
        match &self.symbols[id].kind {
            SymbolKind::Constant(value) => Ok(*value),
            _ => Err(Error::internal(format!(
                "symbol \"{}\" is not a constant",
                self.name_of(id)
            ))),
        }
    }

    pub fn routine(&self, id: SymbolId) -> Result<&Routine> {
        match &self.symbols[id].kind {
            SymbolKind::Routine(routine) => Ok(routine),
            _ => Err(Error::internal(format!(
                "unrecognized procedure symbol \"{}\"",
                self.name_of(id)
            ))),
        }
    }

    /// The procedure or function type describing a routine's signature
    pub fn routine_type(&self, id: SymbolId) -> Result<TypeId> {
        let routine = self.routine(id)?;

        Ok(match routine.return_type {
            Some(return_type) => self
                .types
                .function(routine.parameter_types.as_slice(), return_type),
            None => self.types.procedure(routine.parameter_types.as_slice()),
        })
    }

    fn add_global(
        &mut self,
        name: Name,
        kind: SymbolKind,
        size: usize,
        position: Position,
    ) -> Result<SymbolId> {
        let id = self.symbols.next_index();

        self.globals
            .add(name, id, size)
            .map_err(|kind| kind.at(position))?;

        Ok(self.symbols.push(Symbol { name, kind }))
    }

    pub fn declare_global(
        &mut self,
        name: &str,
        ty: TypeId,
        position: Position,
    ) -> Result<SymbolId> {
        let size = self.types.size_of(ty);

        self.add_global(
            Name::new(name),
            SymbolKind::Variable(Variable {
                ty,
                storage: Storage::Global,
            }),
            size,
            position,
        )
    }

    pub fn declare_constant(
        &mut self,
        name: &str,
        value: ConstantValue,
        position: Position,
    ) -> Result<SymbolId> {
        self.add_global(Name::new(name), SymbolKind::Constant(value), 0, position)
    }

    /// Binds a type name. Anonymous types take the declared name for display.
    pub fn declare_type(
        &mut self,
        name: &str,
        ty: TypeId,
        position: Position,
    ) -> Result<SymbolId> {
        let name = Name::new(name);
        let id = self.add_global(name, SymbolKind::Type(ty), 0, position)?;

        self.types.set_name(ty, name);
        Ok(id)
    }

    pub fn declare_procedure(
        &mut self,
        name: &str,
        parameters: &[ParameterDeclaration],
        position: Position,
    ) -> Result<SymbolId> {
        self.declare_routine(Name::new(name), parameters, None, position)
    }

    pub fn declare_function(
        &mut self,
        name: &str,
        parameters: &[ParameterDeclaration],
        return_type: TypeId,
        position: Position,
    ) -> Result<SymbolId> {
        self.declare_routine(Name::new(name), parameters, Some(return_type), position)
    }

    /// Lays out the frame of a routine according to the calling convention:
    ///
    /// ```text
    ///   rbp + 16 + r + 8n   last parameter
    ///   ...
    ///   rbp + 16 + r        first parameter
    ///   rbp + 16            function result (r bytes, functions only)
    ///   rbp + 8             return address
    ///   rbp                 caller's rbp
    ///   rbp - 8 ...         locals
    /// ```
    fn declare_routine(
        &mut self,
        name: Name,
        parameters: &[ParameterDeclaration],
        return_type: Option<TypeId>,
        position: Position,
    ) -> Result<SymbolId> {
        let result_size = return_type
            .map(|ty| align_to_quad(self.types.size_of(ty)))
            .unwrap_or(0);

        let mut parameter_table = SymbolTable::new();
        let mut parameter_types = Vec::with_capacity(parameters.len());

        for (i, parameter) in parameters.iter().enumerate() {
            let indirect = parameter.by_reference || self.types.is_aggregate(parameter.ty);
            let offset = FIRST_ARGUMENT_OFFSET + result_size as i64 + (i * QUAD) as i64;

            let id = self.symbols.push(Symbol {
                name: parameter.name,
                kind: SymbolKind::Variable(Variable {
                    ty: parameter.ty,
                    storage: Storage::Frame { offset, indirect },
                }),
            });

            parameter_table
                .add(parameter.name, id, QUAD)
                .map_err(|kind| kind.at(position))?;
            parameter_types.push(ParameterType {
                ty: parameter.ty,
                by_reference: parameter.by_reference,
            });
        }

        let result = return_type.map(|ty| {
            self.symbols.push(Symbol {
                name,
                kind: SymbolKind::Variable(Variable {
                    ty,
                    storage: Storage::Frame {
                        offset: FIRST_ARGUMENT_OFFSET,
                        indirect: false,
                    },
                }),
            })
        });

        self.add_global(
            name,
            SymbolKind::Routine(Routine {
                locals: parameter_table.clone(),
                parameters: parameter_table,
                parameter_types,
                return_type,
                result,
                predefined: None,
            }),
            0,
            position,
        )
    }

    /// Adds a local variable to a routine's scope, below the ones declared
    /// before it
    pub fn declare_local(
        &mut self,
        routine: SymbolId,
        name: &str,
        ty: TypeId,
        position: Position,
    ) -> Result<SymbolId> {
        let name = Name::new(name);
        let size = align_to_quad(self.types.size_of(ty));
        let offset = -((self.routine(routine)?.frame_size() + size) as i64);

        let id = self.symbols.next_index();
        let SymbolKind::Routine(scope) = &mut self.symbols[routine].kind else {
            return Err(Error::internal("locals can only be declared in routines"));
        };

        scope
            .locals
            .add(name, id, size)
            .map_err(|kind| kind.at(position))?;

        Ok(self.symbols.push(Symbol {
            name,
            kind: SymbolKind::Variable(Variable {
                ty,
                storage: Storage::Frame {
                    offset,
                    indirect: false,
                },
            }),
        }))
    }

    /// Creates a record type, laying out its fields one after the other
    pub fn record_type(
        &mut self,
        fields: &[(&str, TypeId)],
        position: Position,
    ) -> Result<TypeId> {
        let mut table = SymbolTable::new();

        for (name, ty) in fields {
            let name = Name::new(name);
            let size = self.types.size_of(*ty);
            let offset = table.byte_size();

            let id = self.symbols.push(Symbol {
                name,
                kind: SymbolKind::Variable(Variable {
                    ty: *ty,
                    storage: Storage::Field { offset },
                }),
            });

            table.add(name, id, size).map_err(|kind| kind.at(position))?;
        }

        Ok(self.types.record(table))
    }

    pub fn field(&self, record: TypeId, name: &str) -> Option<SymbolId> {
        self.types.record_fields(record)?.lookup(Name::new(name))
    }
}
