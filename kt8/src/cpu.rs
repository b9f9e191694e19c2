use super::Memory;

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    ops::Range,
};

use crate::{
    bit_value::BitValue,
    error::{ConfigError, Fault},
    isa::{
        self, AddressingMode as Mode, Instruction, Mnemonic, HEADER_LENGTH, HEADER_MARKER,
        INSTRUCTION_WIDTH,
    },
    memory::ADDRESS_SPACE,
    output::WriteTarget,
    registers::{Flag, Register, RegisterName, Registers},
};

mod addressing_modes;
use addressing_modes::*;
mod stack;
pub use stack::Stack;

/// Where programs may be started from.
pub const PROGRAM_MEMORY: Range<usize> = 0x4000..0x8000;
/// Where the stack lives.
pub const STACK_RANGE: Range<usize> = 0x0100..0x0200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuConfig {
    /// A program's header must start inside this range.
    pub program_memory: Range<usize>,
    pub stack: Range<usize>,
}

impl Default for CpuConfig {
    fn default() -> Self {
        CpuConfig {
            program_memory: PROGRAM_MEMORY,
            stack: STACK_RANGE,
        }
    }
}

impl CpuConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, range) in [
            ("program memory", &self.program_memory),
            ("stack", &self.stack),
        ] {
            if range.is_empty() {
                return Err(ConfigError::EmptyRange {
                    name,
                    start: range.start,
                    end: range.end,
                });
            }
            if range.end > ADDRESS_SPACE {
                return Err(ConfigError::RangeTooLarge {
                    name,
                    end: range.end,
                });
            }
        }
        Ok(())
    }
}

/// Where the processor is in the life of a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// No header has been checked yet.
    Ready,
    Running,
    /// The program counter ran off the end of the program.
    Halted,
    Faulted,
}

pub struct Cpu<W: WriteTarget> {
    registers: Registers,
    stack: Stack,
    program_memory: Range<usize>,
    state: RunState,
    /// Where OUT and ONL send their text.
    output: W,
    on_memory_update: Option<Box<dyn FnMut(u16)>>,
    on_stack_update: Option<Box<dyn FnMut(i32)>>,
}
impl<W: WriteTarget> Debug for Cpu<W> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{:?}", self.registers)
    }
}

impl<W: WriteTarget> Cpu<W> {
    pub fn new(config: CpuConfig, output: W) -> Result<Cpu<W>, ConfigError> {
        config.validate()?;
        let stack = Stack::new(config.stack.start, config.stack.len());
        let mut cpu = Cpu {
            registers: Registers::new(),
            stack,
            program_memory: config.program_memory,
            state: RunState::Ready,
            output,
            on_memory_update: None,
            on_stack_update: None,
        };
        cpu.registers.sp.set_by_value(cpu.stack.pointer() as u8);
        return Ok(cpu);
    }

    /// Called with the new program counter after every instruction.
    pub fn on_memory_update(mut self, hook: impl FnMut(u16) + 'static) -> Self {
        self.on_memory_update = Some(Box::new(hook));
        self
    }

    /// Called with the new stack pointer whenever the stack moves.
    pub fn on_stack_update(mut self, hook: impl FnMut(i32) + 'static) -> Self {
        self.on_stack_update = Some(Box::new(hook));
        self
    }

    /// Clear the stack, the registers and all of memory.
    pub fn reset<M: Memory>(&mut self, memory: &mut M) {
        self.stack.reset();
        memory.clear();
        self.registers = Registers::new();
        self.state = RunState::Ready;
        if let Some(hook) = self.on_memory_update.as_mut() {
            hook(0);
        }
        self.stack_moved();
    }

    /// Run the program whose header sits at the start of program memory.
    pub fn run<M: Memory>(&mut self, memory: &mut M) -> Result<(), Fault> {
        self.execute(memory, self.program_memory.start as u16, |_| false)
    }

    /// Run the program whose header sits at `start`, until the program
    /// counter passes its last instruction.
    ///
    /// `suspend` is polled with the program counter before every instruction;
    /// while it returns `true` the processor spins in place.
    pub fn execute<M: Memory, F: FnMut(u16) -> bool>(
        &mut self,
        memory: &mut M,
        start: u16,
        mut suspend: F,
    ) -> Result<(), Fault> {
        let result = match self.begin(memory, start) {
            Ok(end) => self.run_until(memory, end, &mut suspend),
            Err(fault) => Err(fault),
        };
        match &result {
            Ok(()) => {
                self.state = RunState::Halted;
                log::debug!("Program finished at {:04X}", self.registers.pc.value());
            }
            Err(fault) => {
                self.state = RunState::Faulted;
                log::warn!("Program stopped: {fault}. {:?}", self.registers);
            }
        }
        result
    }

    /// Check the header and point the program counter at the first
    /// instruction. Returns the address just past the last instruction.
    fn begin<M: Memory>(&mut self, memory: &mut M, start: u16) -> Result<u32, Fault> {
        if !self.program_memory.contains(&(start as usize)) {
            return Err(Fault::SegmentFault(start));
        }
        let mut header = [0u8; HEADER_LENGTH as usize];
        let size = memory.size();
        for (offset, byte) in header.iter_mut().enumerate() {
            *byte = memory.read_byte(offset_address(start, offset as u16, size)?)?;
        }
        if header[0] != HEADER_MARKER {
            return Err(Fault::InvalidHeader(header));
        }
        let first = offset_address(start, HEADER_LENGTH, size)?;
        let end = first as u32 + u16::from_be_bytes([header[1], header[2]]) as u32;
        log::debug!("First Byte: {start:04X}, Start Read: {first:04X}, End Read: {end:04X}");
        self.registers.pc.set_by_value(first);
        self.state = RunState::Running;
        Ok(end)
    }

    fn run_until<M: Memory, F: FnMut(u16) -> bool>(
        &mut self,
        memory: &mut M,
        end: u32,
        suspend: &mut F,
    ) -> Result<(), Fault> {
        while (self.registers.pc.value() as u32) < end {
            while suspend(self.registers.pc.value()) {
                std::hint::spin_loop();
            }
            self.step(memory)?;
        }
        Ok(())
    }

    /// Fetch, decode and execute the instruction at the program counter.
    pub fn step<M: Memory>(&mut self, memory: &mut M) -> Result<(), Fault> {
        let address = self.registers.pc.value();
        let opcode = memory.read_byte(address)?;
        let operand = [
            memory.read_byte(address.wrapping_add(1))?,
            memory.read_byte(address.wrapping_add(2))?,
        ];
        let instruction =
            isa::decode(opcode).ok_or(Fault::IllegalInstruction { opcode, address })?;
        log::trace!(
            "{:?} {opcode:02X} {:02X} {:02X} {} ({})",
            self.registers,
            operand[0],
            operand[1],
            instruction.mnemonic,
            instruction.mode,
        );
        self.dispatch(memory, instruction, operand, opcode, address)?;
        // Every instruction, jumps included, moves the program counter on.
        let pc = self.registers.pc.value().wrapping_add(INSTRUCTION_WIDTH);
        self.registers.pc.set_by_value(pc);
        if let Some(hook) = self.on_memory_update.as_mut() {
            hook(pc);
        }
        Ok(())
    }

    fn dispatch<M: Memory>(
        &mut self,
        memory: &mut M,
        instruction: Instruction,
        operand: Operand,
        opcode: u8,
        address: u16,
    ) -> Result<(), Fault> {
        use Mnemonic::*;
        match (instruction.mnemonic, instruction.mode) {
            // NOP
            // No OPeration
            (NOP, _) => Ok(()),
            // LDA/LDW/LDX/LDY/LDZ
            // LoaD a register
            (LDA, Mode::Absolute) => self.load::<RegisterA, Absolute, _>(memory, operand),
            (LDA, Mode::IndexedW) => self.load::<RegisterA, ZeroPageWIndexed, _>(memory, operand),
            (LDA, Mode::IndexedX) => self.load::<RegisterA, ZeroPageXIndexed, _>(memory, operand),
            (LDA, Mode::Immediate) => self.load::<RegisterA, Immediate, _>(memory, operand),
            (LDW, Mode::Absolute) => self.load::<RegisterW, Absolute, _>(memory, operand),
            (LDW, Mode::IndexedX) => self.load::<RegisterW, ZeroPageXIndexed, _>(memory, operand),
            (LDW, Mode::Immediate) => self.load::<RegisterW, Immediate, _>(memory, operand),
            (LDX, Mode::Absolute) => self.load::<RegisterX, Absolute, _>(memory, operand),
            (LDX, Mode::IndexedW) => self.load::<RegisterX, ZeroPageWIndexed, _>(memory, operand),
            (LDX, Mode::Immediate) => self.load::<RegisterX, Immediate, _>(memory, operand),
            (LDY, Mode::Absolute) => self.load::<RegisterY, Absolute, _>(memory, operand),
            (LDY, Mode::IndexedW) => self.load::<RegisterY, ZeroPageWIndexed, _>(memory, operand),
            (LDY, Mode::Immediate) => self.load::<RegisterY, Immediate, _>(memory, operand),
            (LDZ, Mode::Absolute) => self.load::<RegisterZ, Absolute, _>(memory, operand),
            (LDZ, Mode::IndexedW) => self.load::<RegisterZ, ZeroPageWIndexed, _>(memory, operand),
            (LDZ, Mode::Immediate) => self.load::<RegisterZ, Immediate, _>(memory, operand),
            // STA/STW/STX/STY/STZ
            // STore a register (flags untouched)
            (STA, Mode::Absolute) => self.store::<RegisterA, Absolute, _>(memory, operand),
            (STA, Mode::IndexedW) => self.store::<RegisterA, ZeroPageWIndexed, _>(memory, operand),
            (STA, Mode::IndexedX) => self.store::<RegisterA, ZeroPageXIndexed, _>(memory, operand),
            (STW, Mode::Absolute) => self.store::<RegisterW, Absolute, _>(memory, operand),
            (STW, Mode::IndexedX) => self.store::<RegisterW, ZeroPageXIndexed, _>(memory, operand),
            (STX, Mode::Absolute) => self.store::<RegisterX, Absolute, _>(memory, operand),
            (STX, Mode::IndexedW) => self.store::<RegisterX, ZeroPageWIndexed, _>(memory, operand),
            (STY, Mode::Absolute) => self.store::<RegisterY, Absolute, _>(memory, operand),
            (STY, Mode::IndexedW) => self.store::<RegisterY, ZeroPageWIndexed, _>(memory, operand),
            (STZ, Mode::Absolute) => self.store::<RegisterZ, Absolute, _>(memory, operand),
            (STZ, Mode::IndexedW) => self.store::<RegisterZ, ZeroPageWIndexed, _>(memory, operand),
            // JMP abs
            // JuMP. Lands three bytes past the target, like everything else.
            (JMP, Mode::Absolute) => {
                let destination = Absolute::new(&self.registers, operand).get_address();
                self.registers.pc.set_by_value(destination);
                Ok(())
            }
            // JMP (abs)
            // JuMP (absolute indirect)
            (JMP, Mode::AbsoluteIndirect) => {
                let address_of_address = Absolute::new(&self.registers, operand).get_address();
                let destination_high = memory.read_byte(address_of_address)?;
                let destination_low = memory.read_byte(address_of_address.wrapping_add(1))?;
                self.registers
                    .pc
                    .set_by_value(u16::from_be_bytes([destination_high, destination_low]));
                Ok(())
            }
            // JFN abs
            // Jump to FunctioN. The address of the JFN itself is pushed, so
            // that RET plus the usual advance resumes right after it.
            (JFN, Mode::Absolute) => {
                let destination = Absolute::new(&self.registers, operand).get_address();
                let [pc_high, pc_low] = self.registers.pc.value().to_be_bytes();
                self.push_byte(memory, pc_high)?;
                self.push_byte(memory, pc_low)?;
                self.registers.pc.set_by_value(destination);
                Ok(())
            }
            // RET
            // RETurn from function
            (RET, Mode::Implicit) => {
                let pc_low = self.pop_byte(memory)?;
                let pc_high = self.pop_byte(memory)?;
                self.registers
                    .pc
                    .set_by_value(u16::from_be_bytes([pc_high, pc_low]));
                Ok(())
            }
            // BCC off
            // Branch if Carry Clear
            (BCC, Mode::Relative) => self.branch(operand, !self.flag(Flag::Carry)),
            // BCS off
            // Branch if Carry Set
            (BCS, Mode::Relative) => self.branch(operand, self.flag(Flag::Carry)),
            // BNE off
            // Branch if Not Equal (Z bit is clear)
            (BNE, Mode::Relative) => self.branch(operand, !self.flag(Flag::Zero)),
            // BEQ off
            // Branch if EQual
            (BEQ, Mode::Relative) => self.branch(operand, self.flag(Flag::Zero)),
            // BRP off
            // BRanch if Positive (N bit is clear)
            (BRP, Mode::Relative) => self.branch(operand, !self.flag(Flag::Negative)),
            // BRN off
            // BRanch if Negative
            (BRN, Mode::Relative) => self.branch(operand, self.flag(Flag::Negative)),
            // CLC
            // CLear Carry
            (CLC, Mode::Implicit) => {
                self.registers.p.set(Flag::Carry, false);
                Ok(())
            }
            // SEC
            // SEt Carry
            (SEC, Mode::Implicit) => {
                self.registers.p.set(Flag::Carry, true);
                Ok(())
            }
            // CLO
            // CLear Overflow
            (CLO, Mode::Implicit) => {
                self.registers.p.set(Flag::Overflow, false);
                Ok(())
            }
            // PHS
            // PusH Status (onto the stack)
            (PHS, Mode::Implicit) => self.push_byte(memory, self.registers.p.as_byte()),
            // POS
            // POp Status (from the stack)
            (POS, Mode::Implicit) => {
                let status = self.pop_byte(memory)?;
                self.registers.p.set_by_byte(status);
                Ok(())
            }
            // PHA
            // PusH A (onto the stack)
            (PHA, Mode::Implicit) => self.push_byte(memory, self.registers.a.value()),
            // POA
            // POp A (from the stack)
            (POA, Mode::Implicit) => {
                let value = self.pop_byte(memory)?;
                self.registers.a.set_by_value(value);
                self.registers.p.assign_nz(value);
                Ok(())
            }
            // CMP/CPW/CPX
            // CoMPare a register
            (CMP, Mode::Absolute) => self.compare::<RegisterA, Absolute, _>(memory, operand),
            (CMP, Mode::IndexedW) => {
                self.compare::<RegisterA, ZeroPageWIndexed, _>(memory, operand)
            }
            (CMP, Mode::IndexedX) => {
                self.compare::<RegisterA, ZeroPageXIndexed, _>(memory, operand)
            }
            (CMP, Mode::Immediate) => self.compare::<RegisterA, Immediate, _>(memory, operand),
            (CPW, Mode::Absolute) => self.compare::<RegisterW, Absolute, _>(memory, operand),
            (CPW, Mode::Immediate) => self.compare::<RegisterW, Immediate, _>(memory, operand),
            (CPX, Mode::Absolute) => self.compare::<RegisterX, Absolute, _>(memory, operand),
            (CPX, Mode::Immediate) => self.compare::<RegisterX, Immediate, _>(memory, operand),
            // AND/ORA/XOR
            // bitwise AND, OR and eXclusive OR with the accumulator
            (AND, Mode::Absolute) => self.logic::<Absolute, _>(memory, operand, |a, b| a & b),
            (AND, Mode::IndexedW) => {
                self.logic::<ZeroPageWIndexed, _>(memory, operand, |a, b| a & b)
            }
            (AND, Mode::Immediate) => self.logic::<Immediate, _>(memory, operand, |a, b| a & b),
            (ORA, Mode::Absolute) => self.logic::<Absolute, _>(memory, operand, |a, b| a | b),
            (ORA, Mode::IndexedW) => {
                self.logic::<ZeroPageWIndexed, _>(memory, operand, |a, b| a | b)
            }
            (ORA, Mode::Immediate) => self.logic::<Immediate, _>(memory, operand, |a, b| a | b),
            (XOR, Mode::Absolute) => self.logic::<Absolute, _>(memory, operand, |a, b| a ^ b),
            (XOR, Mode::IndexedW) => {
                self.logic::<ZeroPageWIndexed, _>(memory, operand, |a, b| a ^ b)
            }
            (XOR, Mode::Immediate) => self.logic::<Immediate, _>(memory, operand, |a, b| a ^ b),
            // ROL/ROR
            // ROtate Left/Right through carry. Only the accumulator form
            // touches Z.
            (ROL, Mode::Absolute) => self.rotate_left::<Absolute, _>(memory, operand, false),
            (ROL, Mode::Accumulator) => self.rotate_left::<RegisterA, _>(memory, operand, true),
            (ROR, Mode::Absolute) => self.rotate_right::<Absolute, _>(memory, operand, false),
            (ROR, Mode::Accumulator) => self.rotate_right::<RegisterA, _>(memory, operand, true),
            // BSL/BSR
            // Bit Shift Left/Right (logical)
            (BSL, Mode::Accumulator) => self.shift_left::<RegisterA, _>(memory, operand),
            (BSL, Mode::Absolute) => self.shift_left::<Absolute, _>(memory, operand),
            (BSR, Mode::Accumulator) => self.shift_right::<RegisterA, _>(memory, operand),
            (BSR, Mode::Absolute) => self.shift_right::<Absolute, _>(memory, operand),
            // ADD/SUB
            // ADD or SUBtract with carry
            (ADD, Mode::Absolute) => {
                self.perform_alu_operation::<Absolute, _>(memory, operand, false)
            }
            (ADD, Mode::IndexedW) => {
                self.perform_alu_operation::<ZeroPageWIndexed, _>(memory, operand, false)
            }
            (ADD, Mode::IndexedX) => {
                self.perform_alu_operation::<ZeroPageXIndexed, _>(memory, operand, false)
            }
            (ADD, Mode::Immediate) => {
                self.perform_alu_operation::<Immediate, _>(memory, operand, false)
            }
            (SUB, Mode::Absolute) => {
                self.perform_alu_operation::<Absolute, _>(memory, operand, true)
            }
            (SUB, Mode::IndexedW) => {
                self.perform_alu_operation::<ZeroPageWIndexed, _>(memory, operand, true)
            }
            (SUB, Mode::IndexedX) => {
                self.perform_alu_operation::<ZeroPageXIndexed, _>(memory, operand, true)
            }
            (SUB, Mode::Immediate) => {
                self.perform_alu_operation::<Immediate, _>(memory, operand, true)
            }
            // INC/DEC/INW/DEW/INX/DEX
            // INCrement and DECrement
            (INC, Mode::Absolute) => self.increment::<Absolute, _>(memory, operand),
            (INC, Mode::IndexedW) => self.increment::<ZeroPageWIndexed, _>(memory, operand),
            (DEC, Mode::Absolute) => self.decrement::<Absolute, _>(memory, operand),
            (DEC, Mode::IndexedW) => self.decrement::<ZeroPageWIndexed, _>(memory, operand),
            (INW, Mode::Implicit) => self.increment::<RegisterW, _>(memory, operand),
            (DEW, Mode::Implicit) => self.decrement::<RegisterW, _>(memory, operand),
            (INX, Mode::Implicit) => self.increment::<RegisterX, _>(memory, operand),
            (DEX, Mode::Implicit) => self.decrement::<RegisterX, _>(memory, operand),
            // MOV src, dst
            // MOVe one register into another
            (MOV, Mode::RegisterCoded) => {
                let [source, destination] = operand;
                let source =
                    RegisterName::from_index(source).ok_or(Fault::InvalidRegister(source))?;
                let destination = RegisterName::from_index(destination)
                    .ok_or(Fault::InvalidRegister(destination))?;
                self.registers.copy(source, destination);
                self.registers.p.assign_nz(self.registers.get(destination));
                Ok(())
            }
            // OUT
            // OUTput a byte as a character
            (OUT, Mode::Absolute) => self.output_character::<Absolute, _>(memory, operand),
            (OUT, Mode::IndexedW) => {
                self.output_character::<ZeroPageWIndexed, _>(memory, operand)
            }
            (OUT, Mode::Accumulator) => self.output_character::<RegisterA, _>(memory, operand),
            // ONL
            // Output NewLine
            (ONL, Mode::Implicit) => {
                self.output.println("");
                Ok(())
            }
            // The table and this match disagree. Shouldn't happen.
            _ => Err(Fault::IllegalInstruction { opcode, address }),
        }
    }

    fn flag(&self, flag: Flag) -> bool {
        self.registers.p.get(flag)
    }

    fn stack_moved(&mut self) {
        let pointer = self.stack.pointer();
        // SP only holds the low byte; the stack's range supplies the rest.
        self.registers.sp.set_by_value(pointer as u8);
        if let Some(hook) = self.on_stack_update.as_mut() {
            hook(pointer);
        }
    }

    fn push_byte<M: Memory>(&mut self, memory: &mut M, byte: u8) -> Result<(), Fault> {
        self.stack.push(memory, byte)?;
        self.stack_moved();
        Ok(())
    }

    fn pop_byte<M: Memory>(&mut self, memory: &mut M) -> Result<u8, Fault> {
        let byte = self.stack.pop(memory)?;
        self.stack_moved();
        Ok(byte)
    }

    fn load<Target: WriteAddressingMode, AM: ReadAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let value = am.get_value(&self.registers, memory)?;
        Target::new(&self.registers, operand).put_value(&mut self.registers, memory, value)?;
        self.registers.p.assign_nz(value);
        Ok(())
    }

    fn store<Source: ReadAddressingMode, AM: WriteAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
    ) -> Result<(), Fault> {
        let value = Source::new(&self.registers, operand).get_value(&self.registers, memory)?;
        let am = AM::new(&self.registers, operand);
        am.put_value(&mut self.registers, memory, value)
    }

    fn logic<AM: ReadAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
        operation: fn(u8, u8) -> u8,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let value = operation(self.registers.a.value(), am.get_value(&self.registers, memory)?);
        self.registers.a.set_by_value(value);
        self.registers.p.assign_nz(value);
        Ok(())
    }

    /// Sets C when the register is at least the operand, Z when they are
    /// equal and N when the register is smaller.
    fn compare<R: ReadAddressingMode, AM: ReadAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
    ) -> Result<(), Fault> {
        let register = R::new(&self.registers, operand).get_value(&self.registers, memory)?;
        let value = AM::new(&self.registers, operand).get_value(&self.registers, memory)?;
        let difference = BitValue::from(register).sub(&BitValue::from(value), true);
        self.registers.p.set(Flag::Carry, difference.carry);
        self.registers.p.set(Flag::Zero, difference.value.is_zero());
        self.registers.p.set(Flag::Negative, !difference.carry);
        Ok(())
    }

    fn perform_alu_operation<AM: ReadAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
        subtraction: bool,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let thing1 = BitValue::from(self.registers.a.value());
        let thing2 = BitValue::from(am.get_value(&self.registers, memory)?);
        let carry_in = self.flag(Flag::Carry);
        let sum = if subtraction {
            thing1.sub(&thing2, carry_in)
        } else {
            thing1.add(&thing2, carry_in)
        };
        self.registers.p.set(Flag::Carry, sum.carry);
        self.registers.p.set(Flag::Overflow, sum.overflow);
        let result = self.registers.p.assign_nz(sum.value.to_byte());
        self.registers.a.set_by_value(result);
        Ok(())
    }

    fn increment<AM: WriteAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let value = am.get_value(&self.registers, memory)?.wrapping_add(1);
        am.put_value(&mut self.registers, memory, value)?;
        self.registers.p.assign_nz(value);
        Ok(())
    }

    fn decrement<AM: WriteAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let value = am.get_value(&self.registers, memory)?.wrapping_sub(1);
        am.put_value(&mut self.registers, memory, value)?;
        self.registers.p.assign_nz(value);
        Ok(())
    }

    fn rotate_left<AM: WriteAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
        update_zero: bool,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let mut value = BitValue::from(am.get_value(&self.registers, memory)?);
        let carry_out = value.rotate_left(self.flag(Flag::Carry));
        self.finish_bit_operation(am, memory, value, carry_out, update_zero)
    }

    fn rotate_right<AM: WriteAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
        update_zero: bool,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let mut value = BitValue::from(am.get_value(&self.registers, memory)?);
        let carry_out = value.rotate_right(self.flag(Flag::Carry));
        self.finish_bit_operation(am, memory, value, carry_out, update_zero)
    }

    fn shift_left<AM: WriteAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let mut value = BitValue::from(am.get_value(&self.registers, memory)?);
        let carry_out = value.shift_left();
        self.finish_bit_operation(am, memory, value, carry_out, false)
    }

    fn shift_right<AM: WriteAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
    ) -> Result<(), Fault> {
        let am = AM::new(&self.registers, operand);
        let mut value = BitValue::from(am.get_value(&self.registers, memory)?);
        let carry_out = value.shift_right();
        self.finish_bit_operation(am, memory, value, carry_out, false)
    }

    /// Write back a rotated or shifted value and set C and N (and Z, if
    /// asked) from it.
    fn finish_bit_operation<AM: WriteAddressingMode, M: Memory>(
        &mut self,
        am: AM,
        memory: &mut M,
        value: BitValue,
        carry_out: bool,
        update_zero: bool,
    ) -> Result<(), Fault> {
        am.put_value(&mut self.registers, memory, value.to_byte())?;
        self.registers.p.set(Flag::Carry, carry_out);
        self.registers.p.set(Flag::Negative, value.is_negative());
        if update_zero {
            self.registers.p.set(Flag::Zero, value.is_zero());
        }
        Ok(())
    }

    fn branch(&mut self, operand: Operand, should_branch: bool) -> Result<(), Fault> {
        // casting it to a signed 8-bit integer first means that, when
        // we go to cast it to a u16 below, Rust will "sign extend" it
        let offset = operand[0] as i8;
        if should_branch {
            // the advance after every instruction adds the width back
            let destination = self
                .registers
                .pc
                .value()
                .wrapping_add(offset as u16)
                .wrapping_sub(INSTRUCTION_WIDTH);
            self.registers.pc.set_by_value(destination);
        }
        Ok(())
    }

    fn output_character<AM: ReadAddressingMode, M: Memory>(
        &mut self,
        memory: &mut M,
        operand: Operand,
    ) -> Result<(), Fault> {
        let value = AM::new(&self.registers, operand).get_value(&self.registers, memory)?;
        self.output.print(char::from(value).encode_utf8(&mut [0; 4]));
        Ok(())
    }

    // Ways to inspect the state of the CPU, for debugging and visualization
    // purposes.
    pub fn registers(&self) -> &Registers {
        &self.registers
    }
    pub fn get_pc(&self) -> u16 {
        self.registers.pc.value()
    }
    pub fn get_a(&self) -> u8 {
        self.registers.a.value()
    }
    pub fn is_flag_set(&self, flag: Flag) -> bool {
        self.flag(flag)
    }
    pub fn stack(&self) -> &Stack {
        &self.stack
    }
    /// Read a byte of the stack without popping it.
    pub fn peek_stack<M: Memory>(&self, memory: &mut M, address: u16) -> Result<u8, Fault> {
        self.stack.peek(memory, address)
    }
    pub fn state(&self) -> RunState {
        self.state
    }
    pub fn output(&self) -> &W {
        &self.output
    }
    pub fn into_output(self) -> W {
        self.output
    }
    // Real Kt8 programs can't do these, so we'll feature gate them.
    #[cfg(any(test, feature = "override-registers"))]
    pub fn set_pc(&mut self, nu: u16) {
        self.registers.pc.set_by_value(nu)
    }
    #[cfg(any(test, feature = "override-registers"))]
    pub fn set_a(&mut self, nu: u8) {
        self.registers.a.set_by_value(nu)
    }
    #[cfg(any(test, feature = "override-registers"))]
    pub fn set_w(&mut self, nu: u8) {
        self.registers.w.set_by_value(nu)
    }
    #[cfg(any(test, feature = "override-registers"))]
    pub fn set_x(&mut self, nu: u8) {
        self.registers.x.set_by_value(nu)
    }
    #[cfg(any(test, feature = "override-registers"))]
    pub fn set_register(&mut self, name: RegisterName, nu: u8) {
        self.registers.set(name, nu)
    }
    #[cfg(any(test, feature = "override-registers"))]
    pub fn set_p(&mut self, nu: u8) {
        // Especially dangerous since this lets you clear the reserved bits!
        self.registers.p.set_by_byte(nu)
    }
}

/// `base + offset`, as long as it stays inside both the address space and
/// memory.
fn offset_address(base: u16, offset: u16, size: usize) -> Result<u16, Fault> {
    let address = base as usize + offset as usize;
    if address >= size.min(ADDRESS_SPACE) {
        return Err(Fault::OutOfBounds { address, size });
    }
    Ok(address as u16)
}
