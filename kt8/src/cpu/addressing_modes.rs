use crate::{
    error::Fault,
    memory::Memory,
    registers::{Register, Registers},
};

/// The two bytes that follow an opcode.
pub type Operand = [u8; 2];

/// An addressing mode that we can get a value from.
pub trait ReadAddressingMode: Sized {
    fn new(registers: &Registers, operand: Operand) -> Self;
    fn get_value<M: Memory>(&self, registers: &Registers, memory: &mut M) -> Result<u8, Fault>;
}
/// An addressing mode that we can (also) put a value into.
pub trait WriteAddressingMode: ReadAddressingMode {
    fn put_value<M: Memory>(
        &self,
        registers: &mut Registers,
        memory: &mut M,
        value: u8,
    ) -> Result<(), Fault>;
}
pub trait AddressibleAddressingMode: ReadAddressingMode {
    fn get_address(&self) -> u16;
}

pub struct Immediate(u8);
impl ReadAddressingMode for Immediate {
    fn new(_registers: &Registers, operand: Operand) -> Self {
        let [value, _] = operand;
        return Self(value);
    }
    fn get_value<M: Memory>(&self, _registers: &Registers, _memory: &mut M) -> Result<u8, Fault> {
        let Self(value) = self;
        return Ok(*value);
    }
}

macro_rules! addressible_mode {
    (
        name: $name:ident,
        registers_var_name: $registers:ident,
        operand_var_name: $operand:ident,
        new_function_body: $code:block
    ) => {
        pub struct $name(u16);
        impl ReadAddressingMode for $name {
            fn new($registers: &Registers, $operand: Operand) -> Self {
                $code
            }
            fn get_value<M: Memory>(
                &self,
                _registers: &Registers,
                memory: &mut M,
            ) -> Result<u8, Fault> {
                let Self(source) = self;
                memory.read_byte(*source)
            }
        }
        impl WriteAddressingMode for $name {
            fn put_value<M: Memory>(
                &self,
                _registers: &mut Registers,
                memory: &mut M,
                value: u8,
            ) -> Result<(), Fault> {
                let Self(destination) = self;
                memory.write_byte(*destination, value)
            }
        }
        impl AddressibleAddressingMode for $name {
            fn get_address(&self) -> u16 {
                let Self(source) = self;
                return *source;
            }
        }
    };
}

addressible_mode!(
    name: Absolute,
    registers_var_name: _registers,
    operand_var_name: operand,
    new_function_body: {
        return Self(u16::from_be_bytes(operand));
    }
);
// Indexed modes only ever reach the zero page: the base is the first operand
// byte, and the sum wraps around within the page.
addressible_mode!(
    name: ZeroPageWIndexed,
    registers_var_name: registers,
    operand_var_name: operand,
    new_function_body: {
        let [base, _] = operand;
        return Self(base.wrapping_add(registers.w.value()) as u16);
    }
);
addressible_mode!(
    name: ZeroPageXIndexed,
    registers_var_name: registers,
    operand_var_name: operand,
    new_function_body: {
        let [base, _] = operand;
        return Self(base.wrapping_add(registers.x.value()) as u16);
    }
);

macro_rules! register_mode {
    ($name:ident, $field:ident) => {
        pub struct $name;
        impl ReadAddressingMode for $name {
            fn new(_registers: &Registers, _operand: Operand) -> Self {
                return Self;
            }
            fn get_value<M: Memory>(
                &self,
                registers: &Registers,
                _memory: &mut M,
            ) -> Result<u8, Fault> {
                Ok(registers.$field.value())
            }
        }
        impl WriteAddressingMode for $name {
            fn put_value<M: Memory>(
                &self,
                registers: &mut Registers,
                _memory: &mut M,
                value: u8,
            ) -> Result<(), Fault> {
                registers.$field.set_by_value(value);
                Ok(())
            }
        }
    };
}

register_mode!(RegisterA, a);
register_mode!(RegisterW, w);
register_mode!(RegisterX, x);
register_mode!(RegisterY, y);
register_mode!(RegisterZ, z);
