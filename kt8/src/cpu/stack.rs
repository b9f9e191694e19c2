use crate::{
    error::{Fault, StackFaultKind},
    memory::Memory,
};

/// A descending stack living in a fixed range of memory.
///
/// The pointer starts at the top of the range. A push writes at the pointer
/// and then moves it down; a pop moves it back up and reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stack {
    /// First address belonging to the stack.
    start: i32,
    size: i32,
    pointer: i32,
}

impl Stack {
    pub fn new(start: usize, size: usize) -> Stack {
        let start = start as i32;
        let size = size as i32;
        return Stack {
            start,
            size,
            pointer: start + size - 1,
        };
    }

    fn top(&self) -> i32 {
        self.start + self.size - 1
    }

    fn contains(&self, address: i32) -> bool {
        address >= self.start && address <= self.top()
    }

    fn fault(&self, kind: StackFaultKind) -> Fault {
        Fault::StackFault {
            kind,
            pointer: self.pointer,
        }
    }

    /// Where the next push will land. Sits one below the range when full.
    pub fn pointer(&self) -> i32 {
        self.pointer
    }

    /// How many bytes are on the stack.
    pub fn depth(&self) -> usize {
        (self.top() - self.pointer) as usize
    }

    pub fn push<M: Memory>(&mut self, memory: &mut M, value: u8) -> Result<(), Fault> {
        if !self.contains(self.pointer) {
            return Err(self.fault(StackFaultKind::Overflow));
        }
        memory.write_byte(self.pointer as u16, value)?;
        self.pointer -= 1;
        Ok(())
    }

    pub fn pop<M: Memory>(&mut self, memory: &mut M) -> Result<u8, Fault> {
        if self.pointer >= self.top() {
            return Err(self.fault(StackFaultKind::Underflow));
        }
        let address = (self.pointer + 1) as u16;
        let value = memory.read_byte(address)?;
        memory.write_byte(address, 0)?;
        self.pointer += 1;
        Ok(value)
    }

    /// Move the pointer back to the top. Whatever was pushed stays in memory.
    pub fn reset(&mut self) {
        self.pointer = self.top();
    }

    /// Read a byte inside the stack's range without popping anything.
    pub fn peek<M: Memory>(&self, memory: &mut M, address: u16) -> Result<u8, Fault> {
        if !self.contains(address as i32) {
            return Err(self.fault(StackFaultKind::OutOfRange));
        }
        memory.read_byte(address)
    }
}
