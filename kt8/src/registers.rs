use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::bit_value::{Bit, BitValue};

/// A holder of a single numeric value.
pub trait Register {
    type Value: Copy + Ord;
    fn value(&self) -> Self::Value;
    fn set_by_value(&mut self, value: Self::Value);
    /// Copy the value of another register of the same width.
    fn set_by_register(&mut self, other: &Self) {
        self.set_by_value(other.value());
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct EightBitRegister(u8);

impl EightBitRegister {
    pub fn new(initial_value: u8) -> EightBitRegister {
        EightBitRegister(initial_value)
    }
}

impl Register for EightBitRegister {
    type Value = u8;
    fn value(&self) -> u8 {
        let Self(value) = self;
        *value
    }
    fn set_by_value(&mut self, value: u8) {
        self.0 = value;
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct SixteenBitRegister(u16);

impl SixteenBitRegister {
    pub fn new(initial_value: u16) -> SixteenBitRegister {
        SixteenBitRegister(initial_value)
    }
}

impl Register for SixteenBitRegister {
    type Value = u16;
    fn value(&self) -> u16 {
        let Self(value) = self;
        *value
    }
    fn set_by_value(&mut self, value: u16) {
        self.0 = value;
    }
}

/// Bits of the P register, named by the value of the bit they occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    /// **C**arry flag: whether the last addition carried past 8 bits (or the
    /// last subtraction did *not* borrow)
    Carry = 0b_0000_0001,
    /// **Z**ero flag: whether the last result was 0x00
    Zero = 0b_0000_0010,
    /// Unused, but asserted at reset
    Reserved4 = 0b_0000_0100,
    Reserved8 = 0b_0000_1000,
    Reserved16 = 0b_0001_0000,
    /// **1** flag: literally hardwired to a one
    Reserved32 = 0b_0010_0000,
    /// o**V**erflow flag: whether the last integer operation did a signed
    /// overflow
    Overflow = 0b_0100_0000,
    /// **N**egative flag: whether the last result had its sign bit set
    Negative = 0b_1000_0000,
}

impl Flag {
    /// The bit of P this flag occupies.
    pub fn bit(self) -> Bit {
        match self {
            Flag::Carry => Bit::B1,
            Flag::Zero => Bit::B2,
            Flag::Reserved4 => Bit::B4,
            Flag::Reserved8 => Bit::B8,
            Flag::Reserved16 => Bit::B16,
            Flag::Reserved32 => Bit::B32,
            Flag::Overflow => Bit::B64,
            Flag::Negative => Bit::B128,
        }
    }
}

/// Value of P after a reset: the two always-asserted reserved bits.
pub const FLAGS_RESET: u8 = Flag::Reserved32 as u8 | Flag::Reserved4 as u8;

/// The status register, addressable one [`Flag`] at a time.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FlagsRegister(BitValue);

impl Default for FlagsRegister {
    fn default() -> Self {
        FlagsRegister(BitValue::from_byte(FLAGS_RESET))
    }
}

impl FlagsRegister {
    pub fn get(&self, flag: Flag) -> bool {
        self.0.bit(flag.bit())
    }
    pub fn set(&mut self, flag: Flag, whether: bool) {
        self.0.set_bit(flag.bit(), whether);
    }
    pub fn as_byte(&self) -> u8 {
        self.0.to_byte()
    }
    pub fn set_by_byte(&mut self, byte: u8) {
        self.0.set_by_byte(byte);
    }
    /// Set N and Z from a result. Returns that same result, for convenience.
    pub fn assign_nz(&mut self, result: u8) -> u8 {
        let value = BitValue::from_byte(result);
        self.set(Flag::Negative, value.is_negative());
        self.set(Flag::Zero, value.is_zero());
        result
    }
}

impl Register for FlagsRegister {
    type Value = BitValue;
    fn value(&self) -> BitValue {
        self.0
    }
    fn set_by_value(&mut self, value: BitValue) {
        self.0.set_by_byte(value.to_byte());
    }
}

/// The general purpose registers an instruction can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegisterName {
    A,
    W,
    X,
    Y,
    Z,
}

impl RegisterName {
    pub const ALL: [RegisterName; 5] = [
        RegisterName::A,
        RegisterName::W,
        RegisterName::X,
        RegisterName::Y,
        RegisterName::Z,
    ];

    /// The 1-based index used by register-coded operands.
    pub fn index(self) -> u8 {
        match self {
            RegisterName::A => 1,
            RegisterName::W => 2,
            RegisterName::X => 3,
            RegisterName::Y => 4,
            RegisterName::Z => 5,
        }
    }

    pub fn from_index(index: u8) -> Option<RegisterName> {
        RegisterName::ALL
            .into_iter()
            .find(|name| name.index() == index)
    }

    /// Only W and X can index memory.
    pub fn is_index_register(self) -> bool {
        matches!(self, RegisterName::W | RegisterName::X)
    }
}

impl FromStr for RegisterName {
    type Err = ();
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_uppercase().as_str() {
            "A" => Ok(RegisterName::A),
            "W" => Ok(RegisterName::W),
            "X" => Ok(RegisterName::X),
            "Y" => Ok(RegisterName::Y),
            "Z" => Ok(RegisterName::Z),
            _ => Err(()),
        }
    }
}

/// Everything the processor keeps outside of memory.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Registers {
    /// The accumulator. Where math operations can happen.
    pub a: EightBitRegister,
    /// General purpose, and the first index register.
    pub w: EightBitRegister,
    /// General purpose, and the second index register.
    pub x: EightBitRegister,
    pub y: EightBitRegister,
    pub z: EightBitRegister,
    /// The program counter.
    pub pc: SixteenBitRegister,
    /// Low byte of the stack pointer.
    pub sp: EightBitRegister,
    /// The status register.
    pub p: FlagsRegister,
}

impl Registers {
    pub fn new() -> Registers {
        return Registers::default();
    }

    pub fn get(&self, name: RegisterName) -> u8 {
        self.by_name(name).value()
    }

    pub fn set(&mut self, name: RegisterName, value: u8) {
        self.by_name_mut(name).set_by_value(value);
    }

    /// Copy one general purpose register into another.
    pub fn copy(&mut self, source: RegisterName, destination: RegisterName) {
        let source = *self.by_name(source);
        self.by_name_mut(destination).set_by_register(&source);
    }

    fn by_name(&self, name: RegisterName) -> &EightBitRegister {
        match name {
            RegisterName::A => &self.a,
            RegisterName::W => &self.w,
            RegisterName::X => &self.x,
            RegisterName::Y => &self.y,
            RegisterName::Z => &self.z,
        }
    }

    fn by_name_mut(&mut self, name: RegisterName) -> &mut EightBitRegister {
        match name {
            RegisterName::A => &mut self.a,
            RegisterName::W => &mut self.w,
            RegisterName::X => &mut self.x,
            RegisterName::Y => &mut self.y,
            RegisterName::Z => &mut self.z,
        }
    }
}

impl Debug for Registers {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let flag = |flag: Flag, set: char, clear: char| {
            if self.p.get(flag) {
                set
            } else {
                clear
            }
        };
        write!(
            fmt,
            "PC:{pc:04X} A:{a:02X} W:{w:02X} X:{x:02X} Y:{y:02X} Z:{z:02X} S:{s:02X} P:{n}{v}{r32}{r16}{r8}{r4}{zf}{c}",
            pc = self.pc.value(),
            a = self.a.value(),
            w = self.w.value(),
            x = self.x.value(),
            y = self.y.value(),
            z = self.z.value(),
            s = self.sp.value(),
            n = flag(Flag::Negative, 'N', 'n'),
            v = flag(Flag::Overflow, 'V', 'v'),
            r32 = flag(Flag::Reserved32, '1', '0'),
            r16 = flag(Flag::Reserved16, '1', '0'),
            r8 = flag(Flag::Reserved8, '1', '0'),
            r4 = flag(Flag::Reserved4, '1', '0'),
            zf = flag(Flag::Zero, 'Z', 'z'),
            c = flag(Flag::Carry, 'C', 'c'),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_asserts_reserved_bits_only() {
        let registers = Registers::new();
        assert_eq!(registers.p.as_byte(), 0b0010_0100);
        assert!(registers.p.get(Flag::Reserved32));
        assert!(registers.p.get(Flag::Reserved4));
        assert!(!registers.p.get(Flag::Carry));
        assert!(!registers.p.get(Flag::Zero));
    }

    #[test]
    fn flags_are_addressed_individually() {
        let mut p = FlagsRegister::default();
        p.set(Flag::Carry, true);
        p.set(Flag::Negative, true);
        assert_eq!(p.as_byte(), 0b1010_0101);
        p.set(Flag::Carry, false);
        assert_eq!(p.as_byte(), 0b1010_0100);
    }

    #[test]
    fn every_flag_has_its_own_bit() {
        let flags = [
            Flag::Carry,
            Flag::Zero,
            Flag::Reserved4,
            Flag::Reserved8,
            Flag::Reserved16,
            Flag::Reserved32,
            Flag::Overflow,
            Flag::Negative,
        ];
        for flag in flags {
            assert_eq!(flag.bit().mask(), flag as u8);
        }
    }

    #[test]
    fn nz_follows_the_result() {
        let mut p = FlagsRegister::default();
        assert_eq!(p.assign_nz(0), 0);
        assert!(p.get(Flag::Zero));
        assert!(!p.get(Flag::Negative));
        p.assign_nz(0x90);
        assert!(!p.get(Flag::Zero));
        assert!(p.get(Flag::Negative));
    }

    #[test]
    fn set_by_register_copies_same_width() {
        let mut a = EightBitRegister::new(1);
        a.set_by_register(&EightBitRegister::new(42));
        assert_eq!(a.value(), 42);
        let mut pc = SixteenBitRegister::default();
        pc.set_by_register(&SixteenBitRegister::new(0x4003));
        assert_eq!(pc.value(), 0x4003);
    }

    #[test]
    fn register_names_round_trip_through_index() {
        for name in RegisterName::ALL {
            assert_eq!(RegisterName::from_index(name.index()), Some(name));
        }
        assert_eq!(RegisterName::from_index(0), None);
        assert_eq!(RegisterName::from_index(6), None);
        assert_eq!("w".parse::<RegisterName>(), Ok(RegisterName::W));
        assert!("Q".parse::<RegisterName>().is_err());
    }

    #[test]
    fn copy_moves_between_named_registers() {
        let mut registers = Registers::new();
        registers.set(RegisterName::Y, 7);
        registers.copy(RegisterName::Y, RegisterName::A);
        assert_eq!(registers.get(RegisterName::A), 7);
        assert_eq!(registers.get(RegisterName::Y), 7);
    }

    #[test]
    fn debug_dump_shows_every_register() {
        let mut registers = Registers::new();
        registers.pc.set_by_value(0x4003);
        registers.a.set_by_value(0x05);
        registers.p.set(Flag::Zero, true);
        assert_eq!(
            format!("{registers:?}"),
            "PC:4003 A:05 W:00 X:00 Y:00 Z:00 S:00 P:nv1001Zc"
        );
    }
}
