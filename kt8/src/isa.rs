//! The Kt8 instruction set: every opcode, the mnemonic it belongs to and how
//! its two operand bytes are interpreted.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use once_cell::sync::Lazy;

/// Every instruction is an opcode byte followed by two operand bytes.
pub const INSTRUCTION_WIDTH: u16 = 3;
/// First byte of every program image.
pub const HEADER_MARKER: u8 = 0x7F;
pub const HEADER_LENGTH: u16 = 3;

/// How an instruction's operand bytes locate its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// No operand at all.
    Implicit,
    /// Operates on A.
    Accumulator,
    /// The first operand byte is the value.
    Immediate,
    /// The operand bytes are a big-endian address.
    Absolute,
    /// The operand bytes are the big-endian address of a big-endian address.
    AbsoluteIndirect,
    /// The first operand byte is a signed displacement from this instruction.
    Relative,
    /// Each operand byte names a register by its 1-based index.
    RegisterCoded,
    /// Zero page address in the first operand byte, plus W.
    IndexedW,
    /// Zero page address in the first operand byte, plus X.
    IndexedX,
}

impl AddressingMode {
    /// How many operands this mode is written with in source.
    pub fn operand_count(self) -> usize {
        match self {
            AddressingMode::Implicit | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::Absolute
            | AddressingMode::AbsoluteIndirect
            | AddressingMode::Relative => 1,
            AddressingMode::RegisterCoded
            | AddressingMode::IndexedW
            | AddressingMode::IndexedX => 2,
        }
    }
}

impl Display for AddressingMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            AddressingMode::Implicit => "implicit",
            AddressingMode::Accumulator => "accumulator",
            AddressingMode::Immediate => "immediate",
            AddressingMode::Absolute => "absolute",
            AddressingMode::AbsoluteIndirect => "absolute indirect",
            AddressingMode::Relative => "relative",
            AddressingMode::RegisterCoded => "register-coded",
            AddressingMode::IndexedW => "W-indexed",
            AddressingMode::IndexedX => "X-indexed",
        };
        fmt.write_str(name)
    }
}

macro_rules! mnemonics {
    ($($name:ident),* $(,)?) => {
        #[allow(clippy::upper_case_acronyms)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($name,)*
        }

        impl Mnemonic {
            pub const ALL: &'static [Mnemonic] = &[$(Mnemonic::$name,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Mnemonic::$name => stringify!($name),)*
                }
            }
        }
    };
}

mnemonics!(
    NOP, LDA, LDW, LDX, LDY, LDZ, STA, STW, STX, STY, STZ, JMP, JFN, RET, BCC, BCS, BNE, BEQ,
    BRP, BRN, CLC, SEC, CLO, PHS, POS, PHA, POA, CMP, CPW, CPX, AND, ORA, XOR, ROL, ROR, BSL,
    BSR, ADD, SUB, INC, DEC, INW, DEW, INX, DEX, MOV, OUT, ONL,
);

impl Display for Mnemonic {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

impl FromStr for Mnemonic {
    type Err = ();
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.to_ascii_uppercase();
        Mnemonic::ALL
            .iter()
            .copied()
            .find(|mnemonic| mnemonic.name() == text)
            .ok_or(())
    }
}

/// One row of the opcode table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
}

const fn op(mnemonic: Mnemonic, mode: AddressingMode) -> Instruction {
    Instruction { mnemonic, mode }
}

use AddressingMode::*;
use Mnemonic::*;

/// The opcode table. An instruction's opcode is its index.
pub static INSTRUCTION_SET: [Instruction; 91] = [
    op(NOP, Implicit),          // 0
    op(LDA, Absolute),          // 1
    op(LDA, IndexedW),          // 2
    op(LDA, IndexedX),          // 3
    op(LDA, Immediate),         // 4
    op(LDW, Absolute),          // 5
    op(LDW, IndexedX),          // 6
    op(LDW, Immediate),         // 7
    op(LDX, Absolute),          // 8
    op(LDX, IndexedW),          // 9
    op(LDX, Immediate),         // 10
    op(LDY, Absolute),          // 11
    op(LDY, IndexedW),          // 12
    op(LDY, Immediate),         // 13
    op(LDZ, Absolute),          // 14
    op(LDZ, IndexedW),          // 15
    op(LDZ, Immediate),         // 16
    op(STA, Absolute),          // 17
    op(STA, IndexedW),          // 18
    op(STA, IndexedX),          // 19
    op(STW, Absolute),          // 20
    op(STW, IndexedX),          // 21
    op(STX, Absolute),          // 22
    op(STX, IndexedW),          // 23
    op(STY, Absolute),          // 24
    op(STY, IndexedW),          // 25
    op(STZ, Absolute),          // 26
    op(STZ, IndexedW),          // 27
    op(JMP, Absolute),          // 28
    op(JMP, AbsoluteIndirect),  // 29
    op(JFN, Absolute),          // 30
    op(RET, Implicit),          // 31
    op(BCC, Relative),          // 32
    op(BCS, Relative),          // 33
    op(BNE, Relative),          // 34
    op(BEQ, Relative),          // 35
    op(BRP, Relative),          // 36
    op(BRN, Relative),          // 37
    op(CLC, Implicit),          // 38
    op(SEC, Implicit),          // 39
    op(CLO, Implicit),          // 40
    op(PHS, Implicit),          // 41
    op(POS, Implicit),          // 42
    op(PHA, Implicit),          // 43
    op(POA, Implicit),          // 44
    op(CMP, Absolute),          // 45
    op(CMP, IndexedW),          // 46
    op(CMP, IndexedX),          // 47
    op(CMP, Immediate),         // 48
    op(CPW, Absolute),          // 49
    op(CPW, Immediate),         // 50
    op(CPX, Absolute),          // 51
    op(CPX, Immediate),         // 52
    op(AND, Absolute),          // 53
    op(AND, IndexedW),          // 54
    op(AND, Immediate),         // 55
    op(ORA, Absolute),          // 56
    op(ORA, IndexedW),          // 57
    op(ORA, Immediate),         // 58
    op(XOR, Absolute),          // 59
    op(XOR, IndexedW),          // 60
    op(XOR, Immediate),         // 61
    op(ROL, Absolute),          // 62
    op(ROL, Accumulator),       // 63
    op(ROR, Absolute),          // 64
    op(ROR, Accumulator),       // 65
    op(BSL, Accumulator),       // 66
    op(BSR, Accumulator),       // 67
    op(ADD, Absolute),          // 68
    op(ADD, IndexedW),          // 69
    op(ADD, IndexedX),          // 70
    op(ADD, Immediate),         // 71
    op(SUB, Absolute),          // 72
    op(SUB, IndexedW),          // 73
    op(SUB, IndexedX),          // 74
    op(SUB, Immediate),         // 75
    op(INC, Absolute),          // 76
    op(INC, IndexedW),          // 77
    op(DEC, Absolute),          // 78
    op(DEC, IndexedW),          // 79
    op(INW, Implicit),          // 80
    op(DEW, Implicit),          // 81
    op(INX, Implicit),          // 82
    op(DEX, Implicit),          // 83
    op(MOV, RegisterCoded),     // 84
    op(BSL, Absolute),          // 85
    op(BSR, Absolute),          // 86
    op(OUT, Absolute),          // 87
    op(OUT, IndexedW),          // 88
    op(OUT, Accumulator),       // 89
    op(ONL, Implicit),          // 90
];

static OPCODES: Lazy<HashMap<Instruction, u8>> = Lazy::new(|| {
    INSTRUCTION_SET
        .iter()
        .enumerate()
        .map(|(opcode, instruction)| (*instruction, opcode as u8))
        .collect()
});

/// What an opcode byte means, if anything.
pub fn decode(opcode: u8) -> Option<Instruction> {
    INSTRUCTION_SET.get(opcode as usize).copied()
}

/// The opcode for a mnemonic in a given addressing mode, if it has one.
pub fn encode(mnemonic: Mnemonic, mode: AddressingMode) -> Option<u8> {
    OPCODES.get(&op(mnemonic, mode)).copied()
}

/// Every addressing mode a mnemonic can be encoded with.
pub fn modes_of(mnemonic: Mnemonic) -> impl Iterator<Item = AddressingMode> {
    INSTRUCTION_SET
        .iter()
        .filter(move |instruction| instruction.mnemonic == mnemonic)
        .map(|instruction| instruction.mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_decode_agree() {
        for opcode in 0..=255u8 {
            if let Some(instruction) = decode(opcode) {
                assert_eq!(encode(instruction.mnemonic, instruction.mode), Some(opcode));
            }
        }
        assert_eq!(decode(91), None);
        assert_eq!(decode(255), None);
    }

    #[test]
    fn no_encoding_appears_twice() {
        assert_eq!(OPCODES.len(), INSTRUCTION_SET.len());
    }

    #[test]
    fn every_mnemonic_has_an_encoding() {
        for &mnemonic in Mnemonic::ALL {
            assert!(modes_of(mnemonic).count() > 0, "{mnemonic} is never encoded");
        }
    }

    #[test]
    fn known_opcodes() {
        assert_eq!(encode(LDA, Immediate), Some(4));
        assert_eq!(encode(STA, Absolute), Some(17));
        assert_eq!(encode(STA, IndexedW), Some(18));
        assert_eq!(encode(ADD, Immediate), Some(71));
        assert_eq!(encode(MOV, RegisterCoded), Some(84));
        assert_eq!(encode(LDA, Relative), None);
    }

    #[test]
    fn mnemonics_parse_case_insensitively() {
        assert_eq!("lda".parse::<Mnemonic>(), Ok(LDA));
        assert_eq!("Jfn".parse::<Mnemonic>(), Ok(JFN));
        assert!("LDQ".parse::<Mnemonic>().is_err());
    }
}
