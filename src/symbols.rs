//! Naming instruction addresses.
//!
//! Lookups go straight to a native symbol table keyed by address; there is no
//! debug-info parsing here. Whether a program counter resolves never changes
//! whether a frame is valid.

use core::fmt;
use std::borrow::Cow;

/// The nearest known symbol at or before an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosestSymbol {
    pub name: String,
    pub offset: u64,
}

impl ClosestSymbol {
    pub fn new(name: impl Into<String>, offset: u64) -> Self {
        ClosestSymbol {
            name: name.into(),
            offset,
        }
    }
}

impl fmt::Display for ClosestSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            f.write_str(&self.name)
        } else {
            write!(f, "{}+{:#x}", self.name, self.offset)
        }
    }
}

/// `None` means no symbol is known for the address.
pub trait SymbolResolver {
    fn lookup(&self, addr: u64) -> Option<ClosestSymbol>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for &R {
    fn lookup(&self, addr: u64) -> Option<ClosestSymbol> {
        (**self).lookup(addr)
    }
}

/// Never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn lookup(&self, _addr: u64) -> Option<ClosestSymbol> {
        None
    }
}

#[derive(Debug, Clone)]
struct Entry {
    start: u64,
    size: Option<u64>,
    name: Cow<'static, str>,
}

/// Symbols handed to us by whoever loaded the object files.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    /// Sorted by `start`.
    entries: Vec<Entry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a symbol starting at `start`. With a `size`, addresses at or past
    /// `start + size` don't belong to it.
    pub fn insert(&mut self, start: u64, size: Option<u64>, name: impl Into<Cow<'static, str>>) {
        let at = self.entries.partition_point(|e| e.start <= start);
        self.entries.insert(
            at,
            Entry {
                start,
                size,
                name: name.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn lookup(&self, addr: u64) -> Option<ClosestSymbol> {
        let at = self.entries.partition_point(|e| e.start <= addr);
        let entry = self.entries[..at].last()?;
        let offset = addr - entry.start;
        if entry.size.is_some_and(|size| offset >= size) {
            return None;
        }
        Some(ClosestSymbol::new(entry.name.clone(), offset))
    }
}

impl<N: Into<Cow<'static, str>>> FromIterator<(u64, Option<u64>, N)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (u64, Option<u64>, N)>>(iter: I) -> Self {
        let mut table = SymbolTable::new();
        for (start, size, name) in iter {
            table.insert(start, size, name);
        }
        table
    }
}

/// Asks the dynamic linker about addresses in our own process.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DladdrResolver;

#[cfg(unix)]
impl SymbolResolver for DladdrResolver {
    fn lookup(&self, addr: u64) -> Option<ClosestSymbol> {
        use std::ffi::CStr;

        unsafe {
            let mut info: libc::Dl_info = std::mem::zeroed();

            if libc::dladdr(addr as usize as *const libc::c_void, &mut info) == 0 {
                return None;
            }
            if info.dli_sname.is_null() {
                return None;
            }

            let name = CStr::from_ptr(info.dli_sname).to_string_lossy().into_owned();
            let offset = addr.wrapping_sub(info.dli_saddr as usize as u64);
            Some(ClosestSymbol::new(name, offset))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_preceding_symbol() {
        let table: SymbolTable = [
            (0x400100, None, "b"),
            (0x400000, Some(0x40), "a"),
            (0x400200, Some(0x10), "c"),
        ]
        .into_iter()
        .collect();
        assert_eq!(table.len(), 3);

        assert_eq!(table.lookup(0x3fffff), None);
        assert_eq!(table.lookup(0x400000), Some(ClosestSymbol::new("a", 0)));
        assert_eq!(table.lookup(0x40003f), Some(ClosestSymbol::new("a", 0x3f)));
        // Past the end of `a`, and `b` hasn't started yet.
        assert_eq!(table.lookup(0x400040), None);
        // `b` has no size, so it runs until the next symbol.
        assert_eq!(table.lookup(0x4001ff), Some(ClosestSymbol::new("b", 0xff)));
        assert_eq!(table.lookup(0x400208), Some(ClosestSymbol::new("c", 8)));
        assert_eq!(table.lookup(0x400210), None);
    }

    #[test]
    fn display() {
        assert_eq!(ClosestSymbol::new("main", 0).to_string(), "main");
        assert_eq!(ClosestSymbol::new("main", 0x1c).to_string(), "main+0x1c");
    }

    #[cfg(unix)]
    #[test]
    fn dladdr() {
        assert_eq!(DladdrResolver.lookup(8), None);

        // Depending on linkage this may land on a PLT stub with no name.
        let addr = libc::getpid as usize as u64;
        if let Some(sym) = DladdrResolver.lookup(addr) {
            assert!(!sym.name.is_empty());
        }
    }
}
