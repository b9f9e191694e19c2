use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use kt8::{
    assemble, disassemble,
    isa::{HEADER_LENGTH, INSTRUCTION_WIDTH},
    Computer, Console, CpuConfig,
};
use log::*;

#[derive(Parser, Debug)]
#[command(name = "kt8-cli")]
#[command(about = "Assemble a gASM program and run it on a Kt8", long_about = None)]
struct Args {
    /// Path to the gASM source
    source: PathBuf,

    /// Where to start running, if not where the program was loaded
    #[arg(long, value_parser = parse_address)]
    start: Option<u16>,

    /// Where to put the program image
    #[arg(long, value_parser = parse_address, default_value = "$4000")]
    load_address: u16,

    /// Print the assembled program before running it
    #[arg(long, action = ArgAction::SetTrue)]
    dump: bool,

    /// Bytes of memory
    #[arg(long, default_value_t = 0x1_0000)]
    memory_size: usize,
}

/// Addresses can be written as `$4000`, `0x4000` or `16384`.
fn parse_address(text: &str) -> Result<u16, String> {
    let parsed = if let Some(hex) = text.strip_prefix('$').or_else(|| text.strip_prefix("0x")) {
        u16::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|error| format!("'{text}' is not an address: {error}"))
}

fn dump(image: &[u8], load_address: u16) -> Result<()> {
    let lines = disassemble(image).context("Couldn't disassemble the program")?;
    let header = HEADER_LENGTH as usize;
    let width = INSTRUCTION_WIDTH as usize;
    println!("{load_address:04X}  {:02X?}", &image[..header]);
    for (index, line) in lines.iter().enumerate() {
        let offset = header + index * width;
        let bytes = &image[offset..offset + width];
        println!(
            "{:04X}  {:02X} {:02X} {:02X}  {line}",
            load_address as usize + offset,
            bytes[0],
            bytes[1],
            bytes[2],
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let source = fs::read_to_string(&args.source)
        .with_context(|| format!("Couldn't read {}", args.source.display()))?;
    let image = assemble(&source)
        .with_context(|| format!("Couldn't assemble {}", args.source.display()))?;
    info!("Assembled {} bytes", image.len());
    if args.dump {
        dump(&image, args.load_address)?;
    }

    let mut computer = Computer::new(CpuConfig::default(), args.memory_size, Console)?;
    computer.reset();
    computer
        .load_program(&image, args.load_address as usize)
        .context("The program doesn't fit in memory")?;
    let start = args.start.unwrap_or(args.load_address);
    info!("Running from {start:04X}");
    let result = computer.run_from(start);
    println!("{:?}", computer.cpu);
    result.context("The program stopped early")?;
    Ok(())
}
