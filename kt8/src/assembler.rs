//! gASM: turns mnemonic source text into a Kt8 program image.
//!
//! One instruction per line. The addressing mode is worked out from the shape
//! of the operands:
//!
//! ```text
//! NOP             implicit (or accumulator, for mnemonics without one)
//! LDA #5          immediate
//! JMP $4000       absolute (any 16-bit literal)
//! BNE -6          relative (any 8-bit literal, where the mnemonic has it)
//! STA 0           absolute again, STA has no relative form
//! JMP ($0200)     absolute indirect
//! STA 0, W        zero page, indexed by W (or X)
//! MOV A, Z        register-coded
//! ```

use crate::{
    error::{CompileError, CompileErrorKind, Fault},
    isa::{self, AddressingMode, Mnemonic, HEADER_LENGTH, HEADER_MARKER, INSTRUCTION_WIDTH},
    registers::RegisterName,
};

/// The punctuation gASM source is written with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Everything from here to the end of the line is ignored.
    pub comment_marker: char,
    pub immediate_marker: char,
    pub binary_prefix: char,
    pub hex_prefix: char,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        AssemblerConfig {
            comment_marker: ';',
            immediate_marker: '#',
            binary_prefix: '%',
            hex_prefix: '$',
        }
    }
}

/// A number as written in source, and whether it needs 16 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Literal {
    value: u16,
    wide: bool,
}

impl Literal {
    fn byte(value: u8) -> Literal {
        Literal {
            value: value as u16,
            wide: false,
        }
    }
    fn word(value: u16) -> Literal {
        Literal { value, wide: true }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Assembler {
    config: AssemblerConfig,
}

impl Assembler {
    pub fn new(config: AssemblerConfig) -> Assembler {
        return Assembler { config };
    }

    /// Assemble a whole program, header included.
    pub fn assemble(&self, source: &str) -> Result<Vec<u8>, CompileError> {
        let mut body = Vec::new();
        let mut last_line = 0;
        for (index, line) in source.lines().enumerate() {
            last_line = index + 1;
            let instruction = self
                .assemble_line(line)
                .map_err(|kind| CompileError::new(last_line, kind))?;
            if let Some(bytes) = instruction {
                log::trace!("line {last_line}: {:02X?}", bytes);
                body.extend_from_slice(&bytes);
            }
        }
        let length = u16::try_from(body.len()).map_err(|_| {
            CompileError::new(last_line, CompileErrorKind::ProgramTooLarge(body.len()))
        })?;
        log::debug!("Assembled {} instructions", length / INSTRUCTION_WIDTH);
        let [length_high, length_low] = length.to_be_bytes();
        let mut image = Vec::with_capacity(HEADER_LENGTH as usize + body.len());
        image.extend_from_slice(&[HEADER_MARKER, length_high, length_low]);
        image.append(&mut body);
        return Ok(image);
    }

    /// Assemble one line of source. Lines with nothing but whitespace and
    /// comments produce nothing.
    fn assemble_line(&self, line: &str) -> Result<Option<[u8; 3]>, CompileErrorKind> {
        let code = self.strip_comment(line);
        let tokens = tokenize(code);
        let Some((&name, operands)) = tokens.split_first() else {
            return Ok(None);
        };
        let mnemonic: Mnemonic = name
            .parse()
            .map_err(|_| CompileErrorKind::UnknownMnemonic(name.to_string()))?;
        if !isa::modes_of(mnemonic).any(|mode| mode.operand_count() == operands.len()) {
            return Err(CompileErrorKind::WrongOperandCount {
                mnemonic: mnemonic.to_string(),
                found: operands.len(),
            });
        }
        let (mode, [arg1, arg2]) = self.resolve_operands(mnemonic, operands)?;
        let opcode = isa::encode(mnemonic, mode).ok_or_else(|| {
            CompileErrorKind::UnsupportedAddressingMode {
                mnemonic: mnemonic.to_string(),
                mode: mode.to_string(),
            }
        })?;
        Ok(Some([opcode, arg1, arg2]))
    }

    fn strip_comment<'a>(&self, line: &'a str) -> &'a str {
        let mut quoted = false;
        for (index, character) in line.char_indices() {
            if character == '\'' {
                quoted = !quoted;
            } else if character == self.config.comment_marker && !quoted {
                return &line[..index];
            }
        }
        line
    }

    /// Work out the addressing mode, and the two operand bytes to go with it.
    fn resolve_operands(
        &self,
        mnemonic: Mnemonic,
        operands: &[&str],
    ) -> Result<(AddressingMode, [u8; 2]), CompileErrorKind> {
        match operands {
            [] => {
                let mode = if isa::encode(mnemonic, AddressingMode::Implicit).is_some() {
                    AddressingMode::Implicit
                } else {
                    AddressingMode::Accumulator
                };
                Ok((mode, [0, 0]))
            }
            [operand] => {
                if let Some(inner) = operand
                    .strip_prefix('(')
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    let literal = self.parse_literal(inner)?;
                    return Ok((AddressingMode::AbsoluteIndirect, literal.value.to_be_bytes()));
                }
                if let Some(value) = operand.strip_prefix(self.config.immediate_marker) {
                    let literal = self.parse_literal(value)?;
                    if literal.wide {
                        return Err(CompileErrorKind::OperandTooWide(operand.to_string()));
                    }
                    return Ok((AddressingMode::Immediate, [literal.value as u8, 0]));
                }
                let literal = self.parse_literal(operand)?;
                if !literal.wide && isa::encode(mnemonic, AddressingMode::Relative).is_some() {
                    return Ok((AddressingMode::Relative, [literal.value as u8, 0]));
                }
                Ok((AddressingMode::Absolute, literal.value.to_be_bytes()))
            }
            [first, second] => {
                let first_register = first.parse::<RegisterName>().ok();
                let second_register = second.parse::<RegisterName>().ok();
                let register_coded = isa::encode(mnemonic, AddressingMode::RegisterCoded).is_some();
                match (first_register, second_register) {
                    (Some(source), Some(destination)) if register_coded => Ok((
                        AddressingMode::RegisterCoded,
                        [source.index(), destination.index()],
                    )),
                    (_, Some(index)) if index.is_index_register() => {
                        let mode = if index == RegisterName::W {
                            AddressingMode::IndexedW
                        } else {
                            AddressingMode::IndexedX
                        };
                        let literal = self.parse_literal(first)?;
                        Ok((mode, literal.value.to_le_bytes()))
                    }
                    (Some(source), Some(destination)) => Ok((
                        AddressingMode::RegisterCoded,
                        [source.index(), destination.index()],
                    )),
                    _ => Err(CompileErrorKind::UnresolvableAddressingMode(format!(
                        "{first}, {second}"
                    ))),
                }
            }
            _ => Err(CompileErrorKind::UnresolvableAddressingMode(operands.join(", "))),
        }
    }

    fn parse_literal(&self, token: &str) -> Result<Literal, CompileErrorKind> {
        let invalid = || CompileErrorKind::InvalidNumber(token.to_string());
        if let Some(digits) = token.strip_prefix(self.config.binary_prefix) {
            return radix_literal(digits, 2, 8).ok_or_else(invalid);
        }
        if let Some(digits) = token.strip_prefix(self.config.hex_prefix) {
            return radix_literal(digits, 16, 2).ok_or_else(invalid);
        }
        if let Ok(value) = token.parse::<i32>() {
            return match value {
                -128..=-1 => Ok(Literal::byte(value as i8 as u8)),
                0..=255 => Ok(Literal::byte(value as u8)),
                256..=65535 => Ok(Literal::word(value as u16)),
                _ => Err(invalid()),
            };
        }
        // Anything else stands for the code of its first character.
        let unquoted = token.strip_prefix('\'').unwrap_or(token);
        let unquoted = unquoted.strip_suffix('\'').unwrap_or(unquoted);
        match unquoted.chars().next() {
            Some(character) if character.is_ascii() => Ok(Literal::byte(character as u8)),
            _ => Err(invalid()),
        }
    }
}

/// Digits in `radix`. Up to `byte_digits` of them make a byte, up to twice
/// that a word.
fn radix_literal(digits: &str, radix: u32, byte_digits: usize) -> Option<Literal> {
    if digits.is_empty()
        || digits.len() > byte_digits * 2
        || !digits.chars().all(|digit| digit.is_digit(radix))
    {
        return None;
    }
    let value = u16::from_str_radix(digits, radix).ok()?;
    if digits.len() > byte_digits {
        Some(Literal::word(value))
    } else {
        Some(Literal::byte(value as u8))
    }
}

/// Split on whitespace and commas, keeping quoted characters whole.
fn tokenize(code: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut quoted = false;
    for (index, character) in code.char_indices() {
        let separator = !quoted && (character.is_whitespace() || character == ',');
        if character == '\'' {
            quoted = !quoted;
        }
        match (separator, start) {
            (true, Some(from)) => {
                tokens.push(&code[from..index]);
                start = None;
            }
            (false, None) => start = Some(index),
            _ => (),
        }
    }
    if let Some(from) = start {
        tokens.push(&code[from..]);
    }
    tokens
}

/// Assemble with the default punctuation.
pub fn assemble(source: &str) -> Result<Vec<u8>, CompileError> {
    Assembler::default().assemble(source)
}

/// Turn a program image back into gASM, one line per instruction. Each line
/// assembles to the bytes it came from, except for operand bytes the
/// processor never reads. Both bytes of implicit and accumulator
/// instructions, and the second byte of immediate and relative ones, come
/// back as zero.
pub fn disassemble(image: &[u8]) -> Result<Vec<String>, Fault> {
    let header_length = HEADER_LENGTH as usize;
    let header: [u8; 3] = image
        .get(..header_length)
        .and_then(|header| header.try_into().ok())
        .ok_or(Fault::OutOfBounds {
            address: header_length - 1,
            size: image.len(),
        })?;
    if header[0] != HEADER_MARKER {
        return Err(Fault::InvalidHeader(header));
    }
    let end = header_length + u16::from_be_bytes([header[1], header[2]]) as usize;
    let body = image.get(header_length..end).ok_or(Fault::OutOfBounds {
        address: end - 1,
        size: image.len(),
    })?;
    let mut lines = Vec::with_capacity(body.len() / INSTRUCTION_WIDTH as usize);
    for (index, chunk) in body.chunks(INSTRUCTION_WIDTH as usize).enumerate() {
        let address = header_length + index * INSTRUCTION_WIDTH as usize;
        let &[opcode, arg1, arg2] = chunk else {
            return Err(Fault::OutOfBounds {
                address: end,
                size: image.len(),
            });
        };
        lines.push(render(opcode, arg1, arg2, address as u16)?);
    }
    return Ok(lines);
}

fn render(opcode: u8, arg1: u8, arg2: u8, address: u16) -> Result<String, Fault> {
    let instruction = isa::decode(opcode).ok_or(Fault::IllegalInstruction { opcode, address })?;
    let name = instruction.mnemonic;
    let register = |index: u8| RegisterName::from_index(index).ok_or(Fault::InvalidRegister(index));
    let zero_page = |index: char| {
        if arg2 == 0 {
            format!("{name} ${arg1:02X}, {index}")
        } else {
            format!("{name} ${:04X}, {index}", u16::from_le_bytes([arg1, arg2]))
        }
    };
    let word = u16::from_be_bytes([arg1, arg2]);
    let text = match instruction.mode {
        AddressingMode::Implicit | AddressingMode::Accumulator => name.to_string(),
        AddressingMode::Immediate => format!("{name} #${arg1:02X}"),
        AddressingMode::Absolute => format!("{name} ${word:04X}"),
        AddressingMode::AbsoluteIndirect => format!("{name} (${word:04X})"),
        AddressingMode::Relative => format!("{name} {}", arg1 as i8),
        AddressingMode::RegisterCoded => {
            format!("{name} {:?}, {:?}", register(arg1)?, register(arg2)?)
        }
        AddressingMode::IndexedW => zero_page('W'),
        AddressingMode::IndexedX => zero_page('X'),
    };
    Ok(text)
}
