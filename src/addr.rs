//! Addresses in the debuggee and a read-only view of its memory.
//!
//! An [`Address`] is never a host pointer. It is only ever dereferenced
//! through a [`MemoryReader`], which talks to whatever holds the target's
//! memory (a live process, a core file, a test snapshot).

use core::fmt;
use std::io;

use crate::convention::{Endian, FrameConvention};

/// A pointer-sized value in the target's address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address {
    pub const NULL: Address = Address(0);

    pub const fn new(value: u64) -> Self {
        Address(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `self + offset`, or `None` if that leaves the address space.
    pub fn offset(self, offset: i64) -> Option<Address> {
        self.0.checked_add_signed(offset).map(Address)
    }

    pub fn add(self, bytes: u64) -> Option<Address> {
        self.0.checked_add(bytes).map(Address)
    }

    pub fn is_aligned(self, align: u64) -> bool {
        align != 0 && self.0 % align == 0
    }

    pub fn less_than(self, other: Address) -> bool {
        self < other
    }

    pub fn less_or_equal(self, other: Address) -> bool {
        self <= other
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// The target's memory could not be read. Callers in the walker treat this as
/// the end of the stack, never as a failure of the whole unwind.
#[derive(Debug, thiserror::Error)]
pub enum MemoryReadError {
    #[error("{len} bytes at {address} are not mapped")]
    Unmapped { address: Address, len: usize },
    #[error("short read at {address}: got {got} of {len} bytes")]
    Truncated {
        address: Address,
        len: usize,
        got: usize,
    },
    #[error("the target process is gone")]
    ProcessGone,
    #[error("access to {address} denied")]
    AccessDenied { address: Address },
    #[error("{address} + {offset} overflows the address space")]
    AddressOverflow { address: Address, offset: i64 },
    #[error("cannot read a {0}-byte integer")]
    UnsupportedWidth(usize),
    #[error(transparent)]
    Os(#[from] io::Error),
}

/// Raw access to the debuggee's address space.
///
/// Implementations fill all of `buf` with the bytes at `addr + offset` or
/// fail. The width of the read is `buf.len()`.
pub trait MemoryReader {
    fn read(&self, addr: Address, offset: i64, buf: &mut [u8]) -> Result<(), MemoryReadError>;
}

impl<M: MemoryReader + ?Sized> MemoryReader for &M {
    fn read(&self, addr: Address, offset: i64, buf: &mut [u8]) -> Result<(), MemoryReadError> {
        (**self).read(addr, offset, buf)
    }
}

impl<M: MemoryReader + ?Sized> MemoryReader for Box<M> {
    fn read(&self, addr: Address, offset: i64, buf: &mut [u8]) -> Result<(), MemoryReadError> {
        (**self).read(addr, offset, buf)
    }
}

/// Resolves `addr + offset` for readers that work on absolute addresses.
pub(crate) fn effective(addr: Address, offset: i64) -> Result<Address, MemoryReadError> {
    addr.offset(offset)
        .ok_or(MemoryReadError::AddressOverflow { address: addr, offset })
}

/// A [`MemoryReader`] seen through a frame convention: knows how wide an
/// address is, which byte order integers use and how raw values translate to
/// target addresses.
pub struct Memory<'a, M: ?Sized> {
    reader: &'a M,
    convention: &'a FrameConvention,
}

impl<M: ?Sized> Clone for Memory<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: ?Sized> Copy for Memory<'_, M> {}

impl<'a, M: MemoryReader + ?Sized> Memory<'a, M> {
    pub fn new(reader: &'a M, convention: &'a FrameConvention) -> Self {
        Memory { reader, convention }
    }

    pub fn convention(&self) -> &'a FrameConvention {
        self.convention
    }

    /// Reads an unsigned integer of `width` bytes (1, 2, 4 or 8).
    pub fn read_integer_at(
        &self,
        addr: Address,
        offset: i64,
        width: usize,
    ) -> Result<u64, MemoryReadError> {
        if !matches!(width, 1 | 2 | 4 | 8) {
            return Err(MemoryReadError::UnsupportedWidth(width));
        }
        let mut buf = [0u8; 8];
        self.reader.read(addr, offset, &mut buf[..width])?;
        Ok(match self.convention.endian {
            Endian::Little => u64::from_le_bytes(buf),
            Endian::Big => u64::from_be_bytes(buf) >> (8 * (8 - width)),
        })
    }

    /// Reads an address-sized value and translates it into a target address.
    pub fn read_address_at(&self, addr: Address, offset: i64) -> Result<Address, MemoryReadError> {
        let raw = self.read_integer_at(addr, offset, self.convention.address_size as usize)?;
        Ok(self.convention.address_from_raw(raw))
    }
}
