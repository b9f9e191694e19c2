use std::{
    cmp::Ordering,
    fmt::{Debug, Formatter, Result as FmtResult},
    ops::Not,
};

/// Storage index of the sign bit (value 128).
const SIGN_INDEX: usize = 0;
/// Storage index of the lowest bit (value 1).
const LOW_INDEX: usize = 7;

/// An 8-bit two's-complement value, kept as individual bits with the most
/// significant bit first.
///
/// Arithmetic is done one bit at a time, so the carry and overflow that come
/// out of an addition are computed from the very same chain that produced the
/// result.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BitValue {
    bits: [bool; 8],
}

/// The outcome of [`BitValue::add`] or [`BitValue::sub`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sum {
    pub value: BitValue,
    /// Carry out of the top bit. For subtraction, `true` means "no borrow".
    pub carry: bool,
    /// Whether the result overflowed as a signed quantity.
    pub overflow: bool,
}

/// One of the eight bits, named by its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Bit {
    B1 = 1,
    B2 = 2,
    B4 = 4,
    B8 = 8,
    B16 = 16,
    B32 = 32,
    B64 = 64,
    B128 = 128,
}

impl Bit {
    pub const ALL: [Bit; 8] = [
        Bit::B1,
        Bit::B2,
        Bit::B4,
        Bit::B8,
        Bit::B16,
        Bit::B32,
        Bit::B64,
        Bit::B128,
    ];

    pub fn mask(self) -> u8 {
        self as u8
    }

    /// The bit a mask selects, if it selects exactly one.
    pub fn from_mask(mask: u8) -> Option<Bit> {
        Bit::ALL.into_iter().find(|bit| bit.mask() == mask)
    }

    /// Storage index: 0 for the sign bit, 7 for the lowest.
    fn index(self) -> usize {
        self.mask().leading_zeros() as usize
    }
}

impl BitValue {
    pub fn new() -> BitValue {
        return BitValue::default();
    }

    pub fn from_byte(byte: u8) -> BitValue {
        let mut value = BitValue::new();
        value.set_by_byte(byte);
        return value;
    }

    pub fn to_byte(&self) -> u8 {
        self.bits
            .iter()
            .fold(0u8, |byte, &bit| (byte << 1) | bit as u8)
    }

    pub fn set_by_byte(&mut self, byte: u8) {
        for (index, bit) in self.bits.iter_mut().enumerate() {
            *bit = byte & (0x80 >> index) != 0;
        }
    }

    pub fn bit(&self, bit: Bit) -> bool {
        self.bits[bit.index()]
    }

    pub fn set_bit(&mut self, bit: Bit, value: bool) {
        self.bits[bit.index()] = value;
    }

    pub fn is_negative(&self) -> bool {
        self.bits[SIGN_INDEX]
    }

    pub fn is_zero(&self) -> bool {
        self.bits.iter().all(|bit| !bit)
    }

    /// Full adder, lowest bit first.
    pub fn add(&self, other: &BitValue, carry_in: bool) -> Sum {
        let mut value = BitValue::new();
        let mut carry = carry_in;
        for index in (SIGN_INDEX..=LOW_INDEX).rev() {
            let a = self.bits[index];
            let b = other.bits[index];
            value.bits[index] = a ^ b ^ carry;
            carry = (a && b) || (carry && (a ^ b));
        }
        let overflow = self.is_negative() == other.is_negative()
            && value.is_negative() != self.is_negative();
        return Sum {
            value,
            carry,
            overflow,
        };
    }

    /// Borrow-chain subtractor. A `carry_in` of `true` means there is no
    /// incoming borrow, the same convention the carry flag uses.
    pub fn sub(&self, other: &BitValue, carry_in: bool) -> Sum {
        let mut value = BitValue::new();
        let mut borrow = !carry_in;
        for index in (SIGN_INDEX..=LOW_INDEX).rev() {
            let a = self.bits[index];
            let b = other.bits[index];
            value.bits[index] = a ^ b ^ borrow;
            borrow = (!a && b) || (borrow && !(a ^ b));
        }
        let overflow = self.is_negative() != other.is_negative()
            && value.is_negative() != self.is_negative();
        return Sum {
            value,
            carry: !borrow,
            overflow,
        };
    }

    /// Rotate left through an external carry bit. `carry_in` enters at the
    /// bottom; the bit pushed out of the top is returned.
    pub fn rotate_left(&mut self, carry_in: bool) -> bool {
        let carry_out = self.bits[SIGN_INDEX];
        self.bits.rotate_left(1);
        self.bits[LOW_INDEX] = carry_in;
        return carry_out;
    }

    /// Rotate right through an external carry bit. `carry_in` enters at the
    /// top; the bit pushed out of the bottom is returned.
    pub fn rotate_right(&mut self, carry_in: bool) -> bool {
        let carry_out = self.bits[LOW_INDEX];
        self.bits.rotate_right(1);
        self.bits[SIGN_INDEX] = carry_in;
        return carry_out;
    }

    pub fn shift_left(&mut self) -> bool {
        self.rotate_left(false)
    }

    pub fn shift_right(&mut self) -> bool {
        self.rotate_right(false)
    }
}

impl From<u8> for BitValue {
    fn from(byte: u8) -> Self {
        BitValue::from_byte(byte)
    }
}

impl From<BitValue> for u8 {
    fn from(value: BitValue) -> Self {
        value.to_byte()
    }
}

impl Not for BitValue {
    type Output = BitValue;
    fn not(mut self) -> BitValue {
        for bit in self.bits.iter_mut() {
            *bit = !*bit;
        }
        self
    }
}

impl PartialOrd for BitValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BitValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_byte().cmp(&other.to_byte())
    }
}

impl Debug for BitValue {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{:08b}", self.to_byte())
    }
}
