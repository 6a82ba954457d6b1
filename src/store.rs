//! Packed cell storage for tree-calculus terms.
//!
//! Terms are flat preorder runs of 2-bit tagged cells, 32 cells to a `u64`
//! word. A separate bitmap distinguishes written cells from never-written
//! ones, and a sparse side table carries the 64-bit payloads of the few cells
//! that have one (references and native handles). Cells are written once and
//! never freed; the store only grows.
use rustc_hash::FxHashMap;

use crate::error::{EvalError, Result};

const BITS_PER_CELL: usize = 2;
const CELLS_PER_WORD: usize = 64 / BITS_PER_CELL;
const INITIAL_CAPACITY: usize = 1024;

/// Hard ceiling on addressable cells.
pub const CELL_LIMIT: usize = 1 << 30;

/// 2-bit cell tag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Tag {
    /// `*` - empty slot inside a written term.
    Nil = 0,
    /// `^` - tree constructor.
    Tree = 1,
    /// `#` - reference or native-handle marker.
    Ref = 2,
}

impl Tag {
    pub fn sigil(self) -> char {
        match self {
            Tag::Nil => '*',
            Tag::Tree => '^',
            Tag::Ref => '#',
        }
    }

    pub fn from_sigil(c: char) -> Option<Tag> {
        match c {
            '*' => Some(Tag::Nil),
            '^' => Some(Tag::Tree),
            '#' => Some(Tag::Ref),
            _ => None,
        }
    }

    fn from_bits(bits: u64) -> Tag {
        match bits {
            1 => Tag::Tree,
            2 => Tag::Ref,
            // 0 and the unused 3 both read as Nil; 3 is never written.
            _ => Tag::Nil,
        }
    }
}

/// Dense tag array plus occupancy bitmap plus sparse payload table.
#[derive(Clone)]
pub struct CellStore {
    words: Vec<u64>,
    written: Vec<u64>,
    capacity: usize,
    payloads: Vec<i64>,
    payload_slots: FxHashMap<usize, usize>,
}

impl Default for CellStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CellStore {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(cells: usize) -> Self {
        // Round up so the tag words and the occupancy bitmap cover the same
        // number of cells exactly.
        let cells = cells.max(64).div_ceil(64) * 64;
        Self {
            words: vec![0; cells / CELLS_PER_WORD],
            written: vec![0; cells / 64],
            capacity: cells,
            payloads: Vec::new(),
            payload_slots: FxHashMap::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of written cells.
    pub fn occupied(&self) -> usize {
        self.written.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_written(&self, index: usize) -> bool {
        index < self.capacity && self.written[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Highest written cell index, if any cell has been written.
    pub fn max_written(&self) -> Option<usize> {
        for (w, bits) in self.written.iter().enumerate().rev() {
            if *bits != 0 {
                return Some(w * 64 + 63 - bits.leading_zeros() as usize);
            }
        }
        None
    }

    /// Tag at `index`, or `None` if the cell was never written.
    pub fn get(&self, index: usize) -> Option<Tag> {
        if !self.is_written(index) {
            return None;
        }
        let word = self.words[index / CELLS_PER_WORD];
        let shift = (index % CELLS_PER_WORD) * BITS_PER_CELL;
        Some(Tag::from_bits((word >> shift) & 0b11))
    }

    /// Write a tag, growing the store as needed. Marks the cell written.
    pub fn set(&mut self, index: usize, tag: Tag) -> Result<()> {
        if index >= self.capacity {
            self.grow(index + 1)?;
        }
        let shift = (index % CELLS_PER_WORD) * BITS_PER_CELL;
        let word = &mut self.words[index / CELLS_PER_WORD];
        *word = (*word & !(0b11 << shift)) | ((tag as u64) << shift);
        self.written[index / 64] |= 1u64 << (index % 64);
        Ok(())
    }

    pub fn payload(&self, index: usize) -> Option<i64> {
        self.payload_slots.get(&index).map(|&slot| self.payloads[slot])
    }

    /// Attach or overwrite the payload of an already-written cell.
    pub fn set_payload(&mut self, index: usize, value: i64) -> Result<()> {
        if !self.is_written(index) {
            return Err(EvalError::InvalidCell(index));
        }
        if let Some(&slot) = self.payload_slots.get(&index) {
            self.payloads[slot] = value;
        } else {
            self.payload_slots.insert(index, self.payloads.len());
            self.payloads.push(value);
        }
        Ok(())
    }

    /// All (cell index, payload) pairs, in unspecified order.
    pub fn payload_entries(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.payload_slots
            .iter()
            .map(|(&index, &slot)| (index, self.payloads[slot]))
    }

    /// Reserve `n` contiguous never-written cells, marking them written as
    /// `Nil`. Returns the index of the first cell.
    pub fn reserve_region(&mut self, n: usize) -> Result<usize> {
        debug_assert!(n > 0);
        loop {
            if let Some(base) = self.find_vacant_run(n) {
                for i in base..base + n {
                    self.set(i, Tag::Nil)?;
                }
                return Ok(base);
            }
            self.grow(self.capacity * 2)?;
        }
    }

    /// Drop all cells and payloads, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.words.fill(0);
        self.written.fill(0);
        self.payloads.clear();
        self.payload_slots.clear();
    }

    fn find_vacant_run(&self, n: usize) -> Option<usize> {
        let mut run = 0usize;
        for (w, &bits) in self.written.iter().enumerate() {
            if bits == 0 {
                run += 64;
            } else if bits == u64::MAX {
                run = 0;
            } else {
                for bit in 0..64 {
                    if bits & (1u64 << bit) == 0 {
                        run += 1;
                    } else {
                        run = 0;
                    }
                    if run >= n {
                        return Some(w * 64 + bit + 1 - n);
                    }
                }
                continue;
            }
            if run >= n {
                // Run of zeros ends at the last bit of this word; place the
                // region at the start of the run.
                return Some((w + 1) * 64 - run);
            }
        }
        None
    }

    fn grow(&mut self, min_cells: usize) -> Result<()> {
        if min_cells > CELL_LIMIT {
            return Err(EvalError::CellLimit(CELL_LIMIT));
        }
        let mut cells = self.capacity.max(64);
        while cells < min_cells {
            cells *= 2;
        }
        let cells = cells.min(CELL_LIMIT);
        self.words.resize(cells / CELLS_PER_WORD, 0);
        self.written.resize(cells / 64, 0);
        self.capacity = cells;
        Ok(())
    }
}
