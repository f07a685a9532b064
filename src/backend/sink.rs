//! Where generated instructions go.
//!
//! The listing is assembled from a primary stream, a region for routine bodies
//! appended once after the main program, and a stack of side buffers which
//! hold code until it is flushed into the stream beneath them.

use hashbrown::HashMap;

use crate::{
    backend::{
        CodegenOptions,
        asm::{Instruction, Label, Opcode, Operand},
    },
    error::{Error, Result},
    index::{IndexVec, simple_index},
};

simple_index! {
    /// Handle to an item of the data section
    pub struct DataId;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataKind {
    /// NUL terminated string
    Asciz(String),
    /// Zero filled storage of the given size in bytes
    Zero(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    pub label: String,
    pub kind: DataKind,
}

/// Which stream instructions are appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Main,
    Routines,
}

#[derive(Debug)]
pub struct Assembly {
    main: Vec<Instruction>,
    routines: Vec<Instruction>,
    routines_appended: bool,
    side_buffers: Vec<Vec<Instruction>>,
    region: Region,
    data: IndexVec<DataId, DataItem>,
    strings: HashMap<String, DataId>,
    next_label: u32,
}

impl Default for Assembly {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembly {
    pub fn new() -> Self {
        Self {
            main: Vec::new(),
            routines: Vec::new(),
            routines_appended: false,
            side_buffers: Vec::new(),
            region: Region::Main,
            data: IndexVec::new(),
            strings: HashMap::new(),
            next_label: 0,
        }
    }

    fn current(&mut self) -> &mut Vec<Instruction> {
        match self.region {
            Region::Routines => &mut self.routines,
            Region::Main => match self.side_buffers.last_mut() {
                Some(buffer) => buffer,
                None => &mut self.main,
            },
        }
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.current().push(instruction);
    }

    pub fn nullary(&mut self, opcode: Opcode) {
        self.push(Instruction::Nullary(opcode));
    }

    pub fn unary(&mut self, opcode: Opcode, operand: impl Into<Operand>) {
        self.push(Instruction::Unary(opcode, operand.into()));
    }

    pub fn binary(
        &mut self,
        opcode: Opcode,
        source: impl Into<Operand>,
        destination: impl Into<Operand>,
    ) {
        self.push(Instruction::Binary(opcode, source.into(), destination.into()));
    }

    pub fn label(&mut self, label: Label) {
        self.push(Instruction::Label(label));
    }

    pub fn comment(&mut self, comment: impl Into<String>) {
        self.push(Instruction::Comment(comment.into()));
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label::Local(self.next_label);
        self.next_label += 1;
        label
    }

    /// Switches the stream instructions are appended to, returning the
    /// previous one
    pub fn set_region(&mut self, region: Region) -> Region {
        std::mem::replace(&mut self.region, region)
    }

    pub fn add_data(&mut self, label: impl Into<String>, kind: DataKind) -> DataId {
        self.data.push(DataItem {
            label: label.into(),
            kind,
        })
    }

    /// Adds a string constant unless one with the same label already exists
    pub fn add_string(&mut self, label: &str, value: &str) -> DataId {
        if let Some(id) = self.strings.get(label) {
            return *id;
        }

        let id = self.add_data(label, DataKind::Asciz(value.to_owned()));
        self.strings.insert(label.to_owned(), id);
        id
    }

    pub fn data_label(&self, id: DataId) -> Result<&str> {
        self.data
            .get(id)
            .map(|item| item.label.as_str())
            .ok_or_else(|| Error::internal("unknown data item"))
    }

    pub fn push_side_buffer(&mut self) {
        self.side_buffers.push(Vec::new());
    }

    pub fn has_side_buffer(&self) -> bool {
        !self.side_buffers.is_empty()
    }

    /// Moves the innermost side buffer to the end of the stream beneath it
    pub fn pop_side_buffer(&mut self) -> Result<()> {
        let buffer = self
            .side_buffers
            .pop()
            .ok_or_else(|| Error::internal("no side buffer to flush"))?;

        log::debug!("flushing {} buffered instructions", buffer.len());

        match self.side_buffers.last_mut() {
            Some(beneath) => beneath.extend(buffer),
            None => self.main.extend(buffer),
        }

        Ok(())
    }

    /// Appends the routine bodies to the primary stream. Only allowed once.
    pub fn append_routines(&mut self) -> Result<()> {
        if self.routines_appended {
            return Err(Error::internal("routine bodies appended twice"));
        }

        self.routines_appended = true;
        self.main.append(&mut self.routines);
        Ok(())
    }

    pub fn finish(self, options: &CodegenOptions) -> Result<Listing> {
        if !self.side_buffers.is_empty() {
            return Err(Error::internal("side buffer left unflushed"));
        }

        if !self.routines.is_empty() {
            return Err(Error::internal("routine bodies were never appended"));
        }

        Ok(Listing {
            entry_symbol: options.entry_symbol.clone(),
            data: self.data.raw,
            text: self.main,
        })
    }
}

/// A complete program, ready to be rendered as assembler source
#[derive(Debug, Clone)]
pub struct Listing {
    pub entry_symbol: String,
    pub data: Vec<DataItem>,
    pub text: Vec<Instruction>,
}
