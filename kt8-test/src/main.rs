use anyhow::{bail, Context, Result};
use kt8::{assemble, Cpu, CpuConfig, Fault, Memory, Ram, RegisterName};
use log::{error, info, trace};

const SOURCE: &str = include_str!("functional_test.gasm");
const LOAD_ADDRESS: u16 = 0x4000;

/// Where the program leaves each result, what it should be, and what it
/// checks.
const EXPECTED: &[(u16, u8, &str)] = &[
    (0x0300, 44, "addition with carry out"),
    (0x0301, 1, "addition with carry in"),
    (0x0302, 42, "subtraction"),
    (0x0303, 15, "counted loop"),
    (0x0304, 0xCE, "logic"),
    (0x0305, 0x0A, "rotates through carry"),
    (0x0306, 0x40, "shift in memory"),
    (0x0307, 0x80, "compare flags"),
    (0x0308, 0x11, "zero page indexing"),
    (0x0309, 0x0A, "register moves"),
    (0x030A, 0x01, "increment and decrement"),
    (0x030B, 42, "call and return"),
    (0x03FF, 1, "reached the end"),
];
/// The two cells the call's return address went through.
const RETURN_ADDRESS_CELLS: [u16; 2] = [0x01FE, 0x01FF];

/// Plain memory that logs every access.
struct TracingRam {
    ram: Ram,
}

impl TracingRam {
    fn new() -> TracingRam {
        TracingRam {
            ram: Ram::default(),
        }
    }
}

impl Memory for TracingRam {
    fn read_byte(&mut self, address: u16) -> Result<u8, Fault> {
        let data = self.ram.read_byte(address)?;
        trace!("Read: {address:04X} --> {data:02X}");
        return Ok(data);
    }
    fn write_byte(&mut self, address: u16, data: u8) -> Result<(), Fault> {
        trace!("Write: {address:04X} <-- {data:02X}");
        self.ram.write_byte(address, data)
    }
    fn size(&self) -> usize {
        self.ram.size()
    }
    fn clear(&mut self) {
        self.ram.clear()
    }
}

/// Run the functional test and check everything it left behind. Returns how
/// many checks there were.
fn run() -> Result<usize> {
    let image = assemble(SOURCE).context("Couldn't assemble the functional test")?;
    let mut ramputer = TracingRam::new();
    let mut cpu = Cpu::new(CpuConfig::default(), String::new())?;
    cpu.reset(&mut ramputer);
    ramputer.ram.load(&image, LOAD_ADDRESS as usize)?;
    // The program must not lean on whatever the registers held before it.
    cpu.set_a(0xAA);
    cpu.set_w(0x55);
    cpu.set_x(0xFF);
    cpu.set_register(RegisterName::Y, 0x80);
    cpu.set_register(RegisterName::Z, 0x01);
    cpu.set_p(0xFF);
    cpu.execute(&mut ramputer, LOAD_ADDRESS, |_| false)
        .with_context(|| format!("The functional test crashed. {cpu:?}"))?;

    let mut failures = 0;
    for &(address, expected, what) in EXPECTED {
        let actual = ramputer.read_byte(address)?;
        if actual == expected {
            info!("{what}: ok");
        } else {
            error!("{what}: ${address:04X} holds {actual:02X}, should be {expected:02X}");
            failures += 1;
        }
    }
    if cpu.output() != "OK\n" {
        error!("output: got {:?}, should be \"OK\\n\"", cpu.output());
        failures += 1;
    }
    for address in RETURN_ADDRESS_CELLS {
        let left_over = cpu.peek_stack(&mut ramputer, address)?;
        if left_over != 0 || cpu.stack().depth() != 0 {
            error!("stack: ${address:04X} holds {left_over:02X} after the return");
            failures += 1;
        }
    }
    let checks = EXPECTED.len() + 1 + RETURN_ADDRESS_CELLS.len();
    if failures > 0 {
        bail!("{failures} of {checks} checks failed");
    }
    info!("Finished at ${:04X}", cpu.get_pc());
    Ok(checks)
}

fn main() -> Result<()> {
    env_logger::init();
    let checks = run()?;
    println!("All {checks} checks passed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt8::disassemble;

    #[test]
    fn functional_test_passes() {
        assert_eq!(run().unwrap(), EXPECTED.len() + 3);
    }

    /// The source has no labels, so its one call and its last jump name
    /// addresses by hand. Make sure they still point where they should.
    #[test]
    fn hand_written_targets_line_up() {
        let lines = disassemble(&assemble(SOURCE).unwrap()).unwrap();
        let first = LOAD_ADDRESS + 3;
        let line_at = |address: u16| lines[((address - first) / 3) as usize].as_str();
        let target_of = |mnemonic: &str| {
            let prefix = format!("{mnemonic} $");
            let line = lines
                .iter()
                .find(|line| line.starts_with(&prefix))
                .unwrap();
            u16::from_str_radix(&line[prefix.len()..], 16).unwrap()
        };

        // calls land one instruction past their target
        let call = target_of("JFN");
        assert_eq!(line_at(call), "NOP");
        assert_eq!(line_at(call + 3), "BSL");
        assert_eq!(line_at(call + 6), "RET");

        // the last jump lands just past the end of the program
        let jump = target_of("JMP");
        assert_eq!(line_at(jump), "RET");
        assert_eq!((jump - first) / 3, lines.len() as u16 - 1);
    }
}
