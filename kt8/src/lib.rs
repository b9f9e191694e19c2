//! Kt8: a small 8-bit computer, and gASM, the assembler for it.

pub mod assembler;
pub mod bit_value;
pub mod cpu;
pub mod error;
pub mod isa;
pub mod memory;
pub mod output;
pub mod registers;

pub use assembler::{assemble, disassemble, Assembler, AssemblerConfig};
pub use bit_value::{Bit, BitValue, Sum};
pub use cpu::{Cpu, CpuConfig, RunState, Stack};
pub use error::{CompileError, CompileErrorKind, ConfigError, Fault, StackFaultKind};
pub use memory::{Memory, Ram};
pub use output::{Console, WriteTarget};
pub use registers::{Flag, RegisterName, Registers};

/// A processor and the memory it runs against.
pub struct Computer<W: WriteTarget> {
    pub memory: Ram,
    pub cpu: Cpu<W>,
}

impl<W: WriteTarget> Computer<W> {
    pub fn new(
        config: CpuConfig,
        memory_size: usize,
        output: W,
    ) -> Result<Computer<W>, ConfigError> {
        return Ok(Computer {
            memory: Ram::new(memory_size),
            cpu: Cpu::new(config, output)?,
        });
    }

    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.memory);
    }

    /// Copy a program image into memory at `address`.
    pub fn load_program(&mut self, image: &[u8], address: usize) -> Result<(), Fault> {
        log::debug!("Loading {} bytes at {address:04X}", image.len());
        self.memory.load(image, address)
    }

    /// Run the program loaded at `start` to completion.
    pub fn run_from(&mut self, start: u16) -> Result<(), Fault> {
        self.cpu.execute(&mut self.memory, start, |_| false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_loads_and_runs() {
        let image = assemble("LDA #'K'\nOUT\nLDA #'8'\nOUT\nONL").unwrap();
        let mut computer = Computer::new(CpuConfig::default(), 0x1_0000, String::new()).unwrap();
        computer.load_program(&image, 0x4000).unwrap();
        computer.run_from(0x4000).unwrap();
        assert_eq!(computer.cpu.output(), "K8\n");
        assert_eq!(computer.cpu.state(), RunState::Halted);
    }

    #[test]
    fn reset_forgets_the_last_program() {
        let image = assemble("LDA #1\nPHA").unwrap();
        let mut computer = Computer::new(CpuConfig::default(), 0x1_0000, String::new()).unwrap();
        computer.load_program(&image, 0x4000).unwrap();
        computer.run_from(0x4000).unwrap();
        computer.reset();
        assert_eq!(computer.cpu.get_a(), 0);
        assert_eq!(computer.cpu.stack().depth(), 0);
        assert_eq!(computer.cpu.state(), RunState::Ready);
        assert!(computer.memory.as_slice().iter().all(|&byte| byte == 0));
        assert_eq!(computer.run_from(0x4000), Err(Fault::InvalidHeader([0, 0, 0])));
    }

    #[test]
    fn programs_must_fit_in_memory() {
        let mut computer = Computer::new(CpuConfig::default(), 0x4001, String::new()).unwrap();
        assert!(matches!(
            computer.load_program(&[0x7F, 0, 3, 0, 0, 0], 0x4000),
            Err(Fault::OutOfBounds { .. })
        ));
    }
}
