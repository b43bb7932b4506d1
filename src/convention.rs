//! Frame-pointer conventions.
//!
//! One walker handles every ABI that chains activation records through a
//! frame pointer. What differs between them is data, not code, and lives in a
//! [`FrameConvention`].

use core::{fmt, str::FromStr};

use crate::{
    addr::Address,
    registers::{self, RegisterFile},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Describes how an ABI lays out the frame record that the frame pointer
/// register points at.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameConvention {
    pub name: &'static str,
    pub registers: &'static RegisterFile,
    /// Width of a pointer in bytes.
    pub address_size: u8,
    /// Every frame base must be a multiple of this.
    pub frame_alignment: u64,
    /// Where the caller's frame pointer is saved, relative to the frame base.
    pub saved_fp_offset: i64,
    /// Where the return address is saved, relative to the frame base.
    pub saved_pc_offset: i64,
    /// Bits of a raw value that form a target address.
    pub address_mask: u64,
    pub endian: Endian,
}

/// The AAPCS64 frame record: `x29` points at `{saved x29, saved x30}`.
pub static AARCH64: FrameConvention = FrameConvention {
    name: "aarch64",
    registers: &registers::AARCH64,
    address_size: 8,
    frame_alignment: 16,
    saved_fp_offset: 0,
    saved_pc_offset: 8,
    address_mask: u64::MAX,
    endian: Endian::Little,
};

/// System V x86-64 with `push rbp; mov rbp, rsp` prologues.
pub static X86_64: FrameConvention = FrameConvention {
    name: "x86_64",
    registers: &registers::X86_64,
    address_size: 8,
    frame_alignment: 16,
    saved_fp_offset: 0,
    saved_pc_offset: 8,
    address_mask: u64::MAX,
    endian: Endian::Little,
};

/// RISC-V psABI: `s0` points at the canonical frame address, with `ra` and
/// the caller's `s0` stored just below it.
pub static RISCV64: FrameConvention = FrameConvention {
    name: "riscv64",
    registers: &registers::RISCV64,
    address_size: 8,
    frame_alignment: 16,
    saved_fp_offset: -16,
    saved_pc_offset: -8,
    address_mask: u64::MAX,
    endian: Endian::Little,
};

pub static ALL: [&FrameConvention; 3] = [&AARCH64, &X86_64, &RISCV64];

impl FrameConvention {
    /// The convention of the machine we are compiled for, if we know it.
    pub fn host() -> Option<&'static FrameConvention> {
        if cfg!(target_arch = "aarch64") {
            Some(&AARCH64)
        } else if cfg!(target_arch = "x86_64") {
            Some(&X86_64)
        } else if cfg!(target_arch = "riscv64") {
            Some(&RISCV64)
        } else {
            None
        }
    }

    /// Turns a raw register or memory value into a target address.
    pub fn address_from_raw(&self, raw: u64) -> Address {
        // Sizes of eight bytes and up keep every bit.
        let width_mask = 1u64
            .checked_shl(8 * u32::from(self.address_size))
            .map_or(u64::MAX, |bit| bit - 1);
        Address::new(raw & width_mask & self.address_mask)
    }

    /// The inverse of [`address_from_raw`](Self::address_from_raw), for
    /// writing addresses back into register contexts.
    pub fn raw_from_address(&self, addr: Address) -> u64 {
        addr.value()
    }
}

impl fmt::Display for FrameConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown frame convention `{0}`, expected one of aarch64, x86_64, riscv64")]
pub struct UnknownConvention(pub String);

impl FromStr for &'static FrameConvention {
    type Err = UnknownConvention;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aarch64" | "arm64" => Ok(&AARCH64),
            "x86_64" | "x86-64" | "amd64" => Ok(&X86_64),
            "riscv64" | "riscv" => Ok(&RISCV64),
            _ => Err(UnknownConvention(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        let conv: &FrameConvention = "AMD64".parse().unwrap();
        assert_eq!(conv.name, "x86_64");
        let conv: &FrameConvention = "arm64".parse().unwrap();
        assert_eq!(conv.name, "aarch64");
        assert!("mips".parse::<&FrameConvention>().is_err());
    }

    #[test]
    fn presets_are_consistent() {
        for conv in ALL {
            assert_eq!(conv.frame_alignment, 2 * conv.address_size as u64);
            assert_eq!(
                (conv.saved_pc_offset - conv.saved_fp_offset).unsigned_abs(),
                conv.address_size as u64
            );
            assert_eq!(conv.registers.arch, conv.name);
        }
    }

    #[test]
    fn narrow_addresses_are_truncated() {
        let narrow = FrameConvention {
            name: "narrow",
            address_size: 4,
            frame_alignment: 8,
            saved_fp_offset: 0,
            saved_pc_offset: 4,
            ..AARCH64
        };
        assert_eq!(
            narrow.address_from_raw(0xdead_beef_0000_1000),
            Address::new(0x1000)
        );
        assert_eq!(AARCH64.address_from_raw(0x1000), Address::new(0x1000));
    }

    #[test]
    fn wide_addresses_keep_every_bit() {
        let wide = FrameConvention {
            name: "wide",
            address_size: 16,
            ..AARCH64
        };
        assert_eq!(
            wide.address_from_raw(0xdead_beef_0000_1000),
            Address::new(0xdead_beef_0000_1000)
        );
        assert_eq!(X86_64.address_from_raw(u64::MAX), Address::new(u64::MAX));
    }
}
