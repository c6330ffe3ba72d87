//! In-memory NOR flash used by the unit tests.

use std::vec;
use std::vec::Vec;

use crate::flash::FlashDevice;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Erase(u32),
    Program(u32, usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct BusError;

/// Models NOR semantics: erase sets a block to `0xFF`, program may only touch
/// erased bytes and never crosses a page. Memory starts out dirty (`0x00`) so a
/// missing erase panics on the first program.
pub(crate) struct MemFlash {
    pub base: u32,
    pub page: u32,
    pub block: u32,
    pub mem: Vec<u8>,
    pub ops: Vec<Op>,
    /// Polls reporting busy after each accepted command.
    pub busy_after_op: u32,
    /// Never report ready.
    pub stuck_busy: bool,
    pub fail_next_erase: bool,
    pub fail_next_program: bool,
    /// Fail the next program at this address.
    pub fail_program_at: Option<u32>,
    pub polls: u32,
    busy_left: u32,
}

impl MemFlash {
    pub fn new(base: u32, size: u32, page: u32, block: u32) -> Self {
        Self {
            base,
            page,
            block,
            mem: vec![0u8; size as usize],
            ops: Vec::new(),
            busy_after_op: 0,
            stuck_busy: false,
            fail_next_erase: false,
            fail_next_program: false,
            fail_program_at: None,
            polls: 0,
            busy_left: 0,
        }
    }

    pub fn erases(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Erase(a) => Some(*a),
                Op::Program(..) => None,
            })
            .collect()
    }

    pub fn programs(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Program(a, _) => Some(*a),
                Op::Erase(_) => None,
            })
            .collect()
    }

    pub fn at(&self, address: u32, len: usize) -> &[u8] {
        let off = (address - self.base) as usize;
        &self.mem[off..off + len]
    }
}

impl FlashDevice for MemFlash {
    type Error = BusError;

    fn erase(&mut self, address: u32) -> Result<(), BusError> {
        if core::mem::take(&mut self.fail_next_erase) {
            return Err(BusError);
        }
        assert_eq!(address % self.block, 0, "unaligned erase at {address:#x}");
        let off = (address - self.base) as usize;
        self.mem[off..off + self.block as usize].fill(0xFF);
        self.ops.push(Op::Erase(address));
        self.busy_left = self.busy_after_op;
        Ok(())
    }

    fn program(&mut self, address: u32, data: &[u8]) -> Result<(), BusError> {
        if core::mem::take(&mut self.fail_next_program) {
            return Err(BusError);
        }
        if self.fail_program_at == Some(address) {
            self.fail_program_at = None;
            return Err(BusError);
        }
        let page_off = address % self.page;
        assert!(
            page_off as usize + data.len() <= self.page as usize,
            "program at {address:#x} crosses a page"
        );
        let off = (address - self.base) as usize;
        let cells = &mut self.mem[off..off + data.len()];
        assert!(
            cells.iter().all(|b| *b == 0xFF),
            "program at {address:#x} into unerased flash"
        );
        cells.copy_from_slice(data);
        self.ops.push(Op::Program(address, data.len()));
        self.busy_left = self.busy_after_op;
        Ok(())
    }

    fn is_busy(&mut self) -> bool {
        self.polls += 1;
        if self.stuck_busy {
            return true;
        }
        if self.busy_left > 0 {
            self.busy_left -= 1;
            return true;
        }
        false
    }
}
