//! x86-64 instruction records. Rendering to AT&T syntax lives in
//! [`super::pretty_print`].

/// Mnemonics, all with explicit operand size suffixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    Pushq,
    Popq,
    Movq,
    Leaq,
    Addq,
    Subq,
    Imulq,
    Idivq,
    Cqo,
    Negq,
    Xorq,
    Andq,
    Testq,
    Cmpq,
    Shlq,
    Shrq,
    Sete,
    Setne,
    Setl,
    Setle,
    Setg,
    Setge,
    Setb,
    Setbe,
    Seta,
    Setae,
    Jmp,
    Jz,
    Jnz,
    Jl,
    Jle,
    Jg,
    Jge,
    Call,
    Ret,
    Addsd,
    Subsd,
    Mulsd,
    Divsd,
    Comisd,
    Xorpd,
    Cvtsi2sdq,
    Cvttsd2siq,
    #[strum(serialize = "rep movsb")]
    RepMovsb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R10,
    R11,
    /// Low byte of rax, target of the setcc family
    Al,
    /// Low byte of rcx, shift counts
    Cl,
    Xmm0,
    Xmm1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// Compiler generated jump target, unique within a listing
    Local(u32),
    /// Routine entry points and other symbols visible to the linker
    Global(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    Immediate(i64),
    /// `displacement(base, index, 1)`
    Memory {
        base: Register,
        index: Option<Register>,
        displacement: i64,
    },
    /// A data item addressed relative to the instruction pointer
    Data(String),
    /// Jump and call targets
    Label(Label),
}

impl Operand {
    pub fn at(base: Register, displacement: i64) -> Self {
        Self::Memory {
            base,
            index: None,
            displacement,
        }
    }

    pub fn indexed(base: Register, index: Register) -> Self {
        Self::Memory {
            base,
            index: Some(index),
            displacement: 0,
        }
    }

    pub fn data(name: impl Into<String>) -> Self {
        Self::Data(name.into())
    }
}

impl From<Register> for Operand {
    fn from(register: Register) -> Self {
        Self::Register(register)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Self::Immediate(value)
    }
}

impl From<Label> for Operand {
    fn from(label: Label) -> Self {
        Self::Label(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nullary(Opcode),
    Unary(Opcode, Operand),
    /// Operands in AT&T order: source first, then destination
    Binary(Opcode, Operand, Operand),
    Label(Label),
    Comment(String),
}
