//! [`MemoryReader`] implementations.

use std::collections::BTreeMap;

use crate::addr::{effective, Address, MemoryReadError, MemoryReader};

/// Memory captured ahead of time, e.g. from a core file.
///
/// Regions never overlap. A read has to be satisfied by a single region.
#[derive(Debug, Default, Clone)]
pub struct SnapshotMemory {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl SnapshotMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `bytes` at `base`. Bytes that overlap an existing region
    /// overwrite it. Regions that touch are joined into one.
    pub fn add_region(&mut self, base: Address, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        let start = base.value();
        let end = region_end(start, &bytes);

        // A region starting exactly at `end` touches the new one.
        let upper = u64::try_from(end).unwrap_or(u64::MAX);
        let neighbours: Vec<u64> = self
            .regions
            .range(..=upper)
            .filter(|&(&b, r)| region_end(b, r) >= u128::from(start))
            .map(|(&b, _)| b)
            .collect();

        let mut merged_start = start;
        let mut merged = bytes;
        for b in neighbours {
            let Some(old) = self.regions.remove(&b) else {
                continue;
            };
            let old_end = region_end(b, &old);
            if b < merged_start {
                let mut front = old[..(merged_start - b) as usize].to_vec();
                front.extend_from_slice(&merged);
                merged = front;
                merged_start = b;
            }
            let merged_end = region_end(merged_start, &merged);
            if old_end > merged_end {
                merged.extend_from_slice(&old[(merged_end - u128::from(b)) as usize..]);
            }
        }
        self.regions.insert(merged_start, merged);
    }

    /// Builder-style helper: stores a little-endian `u64` at `addr`.
    pub fn with_u64(mut self, addr: u64, value: u64) -> Self {
        self.add_region(Address::new(addr), value.to_le_bytes().to_vec());
        self
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

/// One past the last byte of a region. A region may end at `u64::MAX`.
fn region_end(base: u64, bytes: &[u8]) -> u128 {
    u128::from(base) + bytes.len() as u128
}

impl MemoryReader for SnapshotMemory {
    fn read(&self, addr: Address, offset: i64, buf: &mut [u8]) -> Result<(), MemoryReadError> {
        let start = effective(addr, offset)?;
        let unmapped = MemoryReadError::Unmapped {
            address: start,
            len: buf.len(),
        };
        let Some((&base, bytes)) = self.regions.range(..=start.value()).next_back() else {
            return Err(unmapped);
        };
        let from = (start.value() - base) as usize;
        match from
            .checked_add(buf.len())
            .and_then(|to| bytes.get(from..to))
        {
            Some(src) => {
                buf.copy_from_slice(src);
                Ok(())
            }
            None => Err(unmapped),
        }
    }
}

/// Memory of another (stopped) process on this machine.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy)]
pub struct ProcessMemory {
    pid: libc::pid_t,
}

#[cfg(target_os = "linux")]
impl ProcessMemory {
    pub fn new(pid: libc::pid_t) -> Self {
        ProcessMemory { pid }
    }

    /// The calling process itself.
    pub fn current() -> Self {
        // SAFETY: getpid has no preconditions.
        ProcessMemory::new(unsafe { libc::getpid() })
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }
}

#[cfg(target_os = "linux")]
impl MemoryReader for ProcessMemory {
    fn read(&self, addr: Address, offset: i64, buf: &mut [u8]) -> Result<(), MemoryReadError> {
        let start = effective(addr, offset)?;
        if buf.is_empty() {
            return Ok(());
        }
        let local = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        let remote = libc::iovec {
            iov_base: start.value() as usize as *mut libc::c_void,
            iov_len: buf.len(),
        };
        // SAFETY: `local` describes `buf`, which we borrow mutably for the
        // duration of the call. The kernel validates `remote` for us.
        let r = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
        if r < 0 {
            let error = std::io::Error::last_os_error();
            trace!("process_vm_readv({}, {start}, {}) failed: {error}", self.pid, buf.len());
            return Err(match error.raw_os_error() {
                Some(libc::EFAULT | libc::EIO) => MemoryReadError::Unmapped {
                    address: start,
                    len: buf.len(),
                },
                Some(libc::ESRCH) => MemoryReadError::ProcessGone,
                Some(libc::EPERM | libc::EACCES) => {
                    MemoryReadError::AccessDenied { address: start }
                }
                _ => MemoryReadError::Os(error),
            });
        }
        if r as usize != buf.len() {
            return Err(MemoryReadError::Truncated {
                address: start,
                len: buf.len(),
                got: r as usize,
            });
        }
        Ok(())
    }
}
