//! A fixed-capacity heap simulator with `malloc`/`free` style semantics.
//!
//! The heap is an arena of cells addressed by index. Each allocation takes one
//! whole cell and gives it a row of empty slots. Cell `0` is never handed out,
//! so address `0` can act as a null pointer.

use crate::value::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of cells in a heap created with [`Heap::default`], the null cell included.
pub const DEFAULT_HEAP_CELLS: usize = 255;

/// Largest number of slots a single allocation may ask for.
pub const MAX_CELL_SLOTS: usize = 4096;

/// Errors raised by invalid heap accesses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeapError {
    /// The address is the reserved null cell or lies past the end of the heap.
    #[error("address {0} is not a valid heap address")]
    InvalidAddress(Address),
    /// The address points at a free cell.
    #[error("address {0} is not allocated")]
    NotAllocated(Address),
    #[error("offset {offset} is out of bounds for the {len} slot(s) at address {address}")]
    OffsetOutOfBounds {
        address: Address,
        offset: usize,
        len: usize,
    },
    /// The text or value could not be read as a hexadecimal number.
    #[error("`{0}` is not a hexadecimal address")]
    BadAddressLiteral(String),
}

/// Index of a heap cell. Renders as bare lowercase hex, without a `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(usize);

impl Address {
    /// The reserved null address.
    pub const NULL: Address = Address(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for Address {
    type Err = HeapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_index(s).map(Address)
    }
}

impl TryFrom<&Value> for Address {
    type Error = HeapError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        hex_index(value).map(Address)
    }
}

fn parse_hex_index(s: &str) -> Result<usize, HeapError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    usize::from_str_radix(digits, 16).map_err(|_| HeapError::BadAddressLiteral(s.to_string()))
}

/// Read an address or an offset out of a typed value.
///
/// Addresses travel as hex text, so an all-digit token that coerced to an
/// integer is read back through its digits: `10` means cell `0x10`.
pub fn hex_index(value: &Value) -> Result<usize, HeapError> {
    match value {
        Value::String(s) => parse_hex_index(s),
        Value::Hex(h) => {
            usize::try_from(h.value()).map_err(|_| HeapError::BadAddressLiteral(h.as_hex()))
        }
        Value::Integer(i) if *i >= 0 => parse_hex_index(&i.to_string()),
        other => Err(HeapError::BadAddressLiteral(other.to_string())),
    }
}

#[derive(Debug, Clone)]
enum Cell {
    Free,
    Occupied(Vec<Option<Value>>),
}

/// Fixed-size arena of cells with first-fit allocation.
#[derive(Debug, Clone)]
pub struct Heap {
    cells: Vec<Cell>,
    /// Where the next allocation starts scanning. Only a hint, never trusted.
    next_free: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_CELLS)
    }
}

impl Heap {
    /// Create a heap of `capacity` cells, the reserved null cell included.
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: vec![Cell::Free; capacity],
            next_free: 1,
        }
    }

    /// Total number of cells, the null cell included.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Number of occupied cells.
    pub fn used(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c, Cell::Occupied(_)))
            .count()
    }

    /// Take the first free cell at or after the cursor and give it `count` empty slots.
    ///
    /// Returns `None` when no free cell is left or when `count` exceeds
    /// [`MAX_CELL_SLOTS`]; callers must check this before using the address.
    pub fn allocate(&mut self, count: usize) -> Option<Address> {
        if count > MAX_CELL_SLOTS {
            tracing::debug!(count, limit = MAX_CELL_SLOTS, "allocation too large");
            return None;
        }
        let mut index = self.next_free.max(1);
        while index < self.cells.len() && matches!(self.cells[index], Cell::Occupied(_)) {
            index += 1;
        }
        if index >= self.cells.len() {
            tracing::debug!(count, "heap exhausted");
            return None;
        }

        self.cells[index] = Cell::Occupied(vec![None; count]);
        self.next_free = 1;
        let address = Address(index);
        tracing::debug!(%address, count, "allocated");
        Some(address)
    }

    /// Release an allocated cell. The freed cell is the first candidate for the next allocation.
    pub fn free(&mut self, address: Address) -> Result<(), HeapError> {
        self.slots(address)?;
        self.cells[address.0] = Cell::Free;
        self.next_free = address.0;
        tracing::debug!(%address, "freed");
        Ok(())
    }

    /// Read slot `offset` of the cell at `address`; `None` for a slot never written.
    pub fn read(&self, address: Address, offset: usize) -> Result<Option<&Value>, HeapError> {
        let slots = self.slots(address)?;
        slots
            .get(offset)
            .map(Option::as_ref)
            .ok_or(HeapError::OffsetOutOfBounds {
                address,
                offset,
                len: slots.len(),
            })
    }

    pub fn write(&mut self, address: Address, offset: usize, value: Value) -> Result<(), HeapError> {
        let slots = self.slots_mut(address)?;
        let len = slots.len();
        let slot = slots.get_mut(offset).ok_or(HeapError::OffsetOutOfBounds {
            address,
            offset,
            len,
        })?;
        *slot = Some(value);
        Ok(())
    }

    fn slots(&self, address: Address) -> Result<&Vec<Option<Value>>, HeapError> {
        if address == Address::NULL {
            return Err(HeapError::InvalidAddress(address));
        }
        match self.cells.get(address.0) {
            Some(Cell::Occupied(slots)) => Ok(slots),
            Some(Cell::Free) => Err(HeapError::NotAllocated(address)),
            None => Err(HeapError::InvalidAddress(address)),
        }
    }

    fn slots_mut(&mut self, address: Address) -> Result<&mut Vec<Option<Value>>, HeapError> {
        if address == Address::NULL {
            return Err(HeapError::InvalidAddress(address));
        }
        match self.cells.get_mut(address.0) {
            Some(Cell::Occupied(slots)) => Ok(slots),
            Some(Cell::Free) => Err(HeapError::NotAllocated(address)),
            None => Err(HeapError::InvalidAddress(address)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HexValue;

    #[test]
    fn test_first_allocation_skips_null_cell() {
        let mut heap = Heap::default();
        assert_eq!(heap.allocate(1), Some(Address(1)));
        assert_eq!(heap.allocate(1), Some(Address(2)));
        assert_eq!(heap.used(), 2);
    }

    #[test]
    fn test_free_then_allocate_reuses_address() {
        let mut heap = Heap::default();
        let a = heap.allocate(1).unwrap();
        heap.free(a).unwrap();
        assert_eq!(heap.allocate(1), Some(a));
    }

    #[test]
    fn test_freed_cell_is_reused_before_lower_gaps() {
        let mut heap = Heap::default();
        let a = heap.allocate(1).unwrap();
        let b = heap.allocate(1).unwrap();
        let c = heap.allocate(1).unwrap();
        heap.free(a).unwrap();
        heap.free(c).unwrap();
        // cursor points at the most recently freed cell
        assert_eq!(heap.allocate(1), Some(c));
        // then scanning restarts at the bottom
        assert_eq!(heap.allocate(1), Some(a));
        assert_eq!(heap.allocate(1), Some(Address(b.index() + 2)));
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut heap = Heap::default();
        for expected in 1..DEFAULT_HEAP_CELLS {
            assert_eq!(heap.allocate(1), Some(Address(expected)));
        }
        assert_eq!(heap.allocate(1), None);
        assert_eq!(heap.allocate(1), None);

        heap.free(Address(0x2a)).unwrap();
        assert_eq!(heap.allocate(4), Some(Address(0x2a)));
    }

    #[test]
    fn test_oversized_request_is_out_of_memory() {
        let mut heap = Heap::default();
        assert_eq!(heap.allocate(usize::MAX), None);
        assert_eq!(heap.allocate(MAX_CELL_SLOTS + 1), None);
        assert_eq!(heap.used(), 0);

        let a = heap.allocate(MAX_CELL_SLOTS).unwrap();
        assert_eq!(a, Address(1));
        assert_eq!(heap.read(a, MAX_CELL_SLOTS - 1), Ok(None));
    }

    #[test]
    fn test_write_read_and_bounds() {
        let mut heap = Heap::default();
        let a = heap.allocate(3).unwrap();
        assert_eq!(heap.read(a, 0), Ok(None));

        heap.write(a, 0, Value::Integer(7)).unwrap();
        assert_eq!(heap.read(a, 0), Ok(Some(&Value::Integer(7))));

        assert_eq!(
            heap.read(a, 3),
            Err(HeapError::OffsetOutOfBounds {
                address: a,
                offset: 3,
                len: 3
            })
        );
        assert!(heap.write(a, 3, Value::Null).is_err());
    }

    #[test]
    fn test_invalid_addresses() {
        let mut heap = Heap::new(4);
        assert_eq!(heap.free(Address::NULL), Err(HeapError::InvalidAddress(Address::NULL)));
        assert_eq!(heap.read(Address(9), 0), Err(HeapError::InvalidAddress(Address(9))));
        assert_eq!(heap.free(Address(2)), Err(HeapError::NotAllocated(Address(2))));

        let a = heap.allocate(1).unwrap();
        heap.free(a).unwrap();
        assert_eq!(heap.free(a), Err(HeapError::NotAllocated(a)));
        assert_eq!(heap.read(a, 0), Err(HeapError::NotAllocated(a)));
    }

    #[test]
    fn test_address_text_is_bare_hex() {
        assert_eq!(Address(255).to_string(), "ff");
        assert_eq!("1f".parse::<Address>(), Ok(Address(31)));
        assert_eq!("0x1f".parse::<Address>(), Ok(Address(31)));
        assert!("zz".parse::<Address>().is_err());
    }

    #[test]
    fn test_hex_index_of_values() {
        assert_eq!(hex_index(&Value::String("a".into())), Ok(10));
        assert_eq!(hex_index(&Value::Hex(HexValue(10))), Ok(10));
        assert_eq!(hex_index(&Value::Integer(10)), Ok(16));
        assert!(hex_index(&Value::Integer(-1)).is_err());
        assert!(hex_index(&Value::Float(1.5)).is_err());
    }
}
