use thiserror::Error;

/// Why the assembler gave up on a line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),
    #[error("{mnemonic} does not take {found} operand(s)")]
    WrongOperandCount { mnemonic: String, found: usize },
    #[error("{mnemonic} has no {mode} encoding")]
    UnsupportedAddressingMode { mnemonic: String, mode: String },
    #[error("cannot tell the addressing mode of '{0}'")]
    UnresolvableAddressingMode(String),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("operand '{0}' does not fit in 8 bits")]
    OperandTooWide(String),
    #[error("program is {0} bytes long, more than a header can describe")]
    ProgramTooLarge(usize),
}

/// A failure to assemble, with the 1-based source line it happened on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct CompileError {
    pub line: usize,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(line: usize, kind: CompileErrorKind) -> CompileError {
        CompileError { line, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFaultKind {
    /// Push with no room left.
    Overflow,
    /// Pop from an empty stack.
    Underflow,
    /// Peek outside of the stack's memory.
    OutOfRange,
}

/// Anything that stops a program dead. None of these are recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("SEGFAULT: start address {0:04X} is outside of program memory")]
    SegmentFault(u16),
    #[error("INVALID HEADER {0:02X?}")]
    InvalidHeader([u8; 3]),
    #[error("illegal instruction {opcode:02X} at {address:04X}")]
    IllegalInstruction { opcode: u8, address: u16 },
    #[error("stack fault ({kind:?}) with pointer at {pointer}")]
    StackFault { kind: StackFaultKind, pointer: i32 },
    #[error("no register with index {0}")]
    InvalidRegister(u8),
    #[error("address {address:#06X} is outside of {size} bytes of memory")]
    OutOfBounds { address: usize, size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} range {start}..{end} is empty")]
    EmptyRange {
        name: &'static str,
        start: usize,
        end: usize,
    },
    #[error("{name} range ends at {end}, past the 16-bit address space")]
    RangeTooLarge { name: &'static str, end: usize },
}
