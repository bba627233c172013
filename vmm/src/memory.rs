//! Linear, auto-growing memory owned by a single interpreter

use std::collections::HashMap;

use crate::error::{Result, VmError};
use crate::value::Word;

/// Highest index kept in the dense vector; writes above it go to a sparse map
pub const DENSE_LIMIT: usize = 1 << 20;

/// Zero-indexed word memory.
///
/// Reads of unwritten cells yield 0 and writes past the end grow the backing
/// vector, zero-filling the gap. Cells far beyond the program image are kept
/// sparsely, so any non-negative address is writable. Negative addresses are
/// always an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<Word>,
    far: HashMap<usize, Word>,
}

impl Memory {
    pub fn new(cells: Vec<Word>) -> Self {
        Memory {
            cells,
            far: HashMap::new(),
        }
    }

    /// Number of cells in the dense prefix
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.far.is_empty()
    }

    pub fn read(&self, addr: Word) -> Result<Word> {
        let index = index_of(addr)?;
        let value = match self.cells.get(index) {
            Some(value) => *value,
            None => self.far.get(&index).copied().unwrap_or(0),
        };
        Ok(value)
    }

    pub fn write(&mut self, addr: Word, value: Word) -> Result<()> {
        let index = index_of(addr)?;
        if index < self.cells.len() {
            self.cells[index] = value;
        } else if index <= DENSE_LIMIT.max(self.cells.len()) {
            self.cells.resize(index + 1, 0);
            self.absorb_far_cells();
            self.cells[index] = value;
        } else {
            self.far.insert(index, value);
        }
        Ok(())
    }

    /// Move sparse cells the dense vector now covers into it
    fn absorb_far_cells(&mut self) {
        if self.far.is_empty() {
            return;
        }
        let len = self.cells.len();
        let cells = &mut self.cells;
        self.far.retain(|index, value| {
            if *index < len {
                cells[*index] = *value;
                false
            } else {
                true
            }
        });
    }

    /// The dense prefix, program image first
    pub fn as_slice(&self) -> &[Word] {
        &self.cells
    }
}

impl From<&[Word]> for Memory {
    fn from(words: &[Word]) -> Self {
        Memory::new(words.to_vec())
    }
}

fn index_of(addr: Word) -> Result<usize> {
    usize::try_from(addr).map_err(|_| VmError::NegativeAddress(addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_read_past_end_is_zero() {
        let memory = Memory::new(vec![1, 2, 3]);
        assert_eq!(memory.read(2), Ok(3));
        assert_eq!(memory.read(3), Ok(0));
        assert_eq!(memory.read(10_000), Ok(0));
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn test_write_grows_and_zero_fills() {
        let mut memory = Memory::new(vec![7]);
        memory.write(5, 42).unwrap();
        assert_eq!(memory.as_slice(), &[7, 0, 0, 0, 0, 42]);
    }

    #[test]
    fn test_far_writes_stay_sparse() {
        let mut memory = Memory::new(vec![1, 2]);
        memory.write(Word::MAX, 7).unwrap();
        memory.write(DENSE_LIMIT as Word * 4, 8).unwrap();
        assert_eq!(memory.read(Word::MAX), Ok(7));
        assert_eq!(memory.read(DENSE_LIMIT as Word * 4), Ok(8));
        assert_eq!(memory.read(Word::MAX - 1), Ok(0));
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_dense_growth_absorbs_sparse_cells() {
        let limit = DENSE_LIMIT as Word;
        let mut memory = Memory::new(vec![0; DENSE_LIMIT]);
        memory.write(limit + 2, 5).unwrap();
        assert_eq!(memory.len(), DENSE_LIMIT);
        memory.write(limit, 3).unwrap();
        memory.write(limit + 1, 4).unwrap();
        assert_eq!(memory.len(), DENSE_LIMIT + 2);
        assert_eq!(memory.read(limit + 2), Ok(5));
        memory.write(limit + 2, 6).unwrap();
        assert_eq!(memory.len(), DENSE_LIMIT + 3);
        assert_eq!(&memory.as_slice()[DENSE_LIMIT..], &[3, 4, 6]);
    }

    #[test]
    fn test_negative_address() {
        let mut memory = Memory::default();
        assert_eq!(memory.read(-1), Err(VmError::NegativeAddress(-1)));
        assert_eq!(memory.write(-3, 1), Err(VmError::NegativeAddress(-3)));
        assert!(memory.is_empty());
    }

    proptest! {
        #[test]
        fn prop_growth_leaves_gap_zeroed(len in 0usize..64, addr in 0i64..512, value in any::<i64>()) {
            let mut memory = Memory::new(vec![9; len]);
            memory.write(addr, value).unwrap();
            prop_assert_eq!(memory.read(addr).unwrap(), value);
            for a in (len as i64)..addr {
                prop_assert_eq!(memory.read(a).unwrap(), 0);
            }
            for a in 0..(len as i64).min(addr) {
                prop_assert_eq!(memory.read(a).unwrap(), 9);
            }
        }
    }
}
