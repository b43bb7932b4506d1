use core::fmt;

use crate::{addr::Address, convention::FrameConvention};

/// Index of a register within a [`RegisterFile`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterId(pub u16);

impl fmt::Debug for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The architectural registers of one instruction set, and which of them the
/// walker cares about.
#[derive(Debug, PartialEq, Eq)]
pub struct RegisterFile {
    pub arch: &'static str,
    pub names: &'static [&'static str],
    pub sp: RegisterId,
    pub fp: RegisterId,
    pub pc: RegisterId,
}

impl RegisterFile {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, id: RegisterId) -> bool {
        (id.0 as usize) < self.names.len()
    }

    pub fn name(&self, id: RegisterId) -> Option<&'static str> {
        self.names.get(id.0 as usize).copied()
    }

    pub fn id_of(&self, name: &str) -> Option<RegisterId> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| RegisterId(i as u16))
    }
}

pub mod aarch64 {
    use super::RegisterId;

    pub const FP: RegisterId = RegisterId(29);
    pub const LR: RegisterId = RegisterId(30);
    pub const SP: RegisterId = RegisterId(31);
    pub const PC: RegisterId = RegisterId(32);
}

pub mod x86_64 {
    use super::RegisterId;

    // DWARF numbering.
    pub const RBP: RegisterId = RegisterId(6);
    pub const RSP: RegisterId = RegisterId(7);
    pub const RIP: RegisterId = RegisterId(16);
}

pub mod riscv64 {
    use super::RegisterId;

    // `user_regs_struct` order.
    pub const PC: RegisterId = RegisterId(0);
    pub const RA: RegisterId = RegisterId(1);
    pub const SP: RegisterId = RegisterId(2);
    pub const S0: RegisterId = RegisterId(8);
}

pub static AARCH64: RegisterFile = RegisterFile {
    arch: "aarch64",
    names: &[
        "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
        "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26",
        "x27", "x28", "fp", "lr", "sp", "pc",
    ],
    sp: aarch64::SP,
    fp: aarch64::FP,
    pc: aarch64::PC,
};

pub static X86_64: RegisterFile = RegisterFile {
    arch: "x86_64",
    names: &[
        "rax", "rdx", "rcx", "rbx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12",
        "r13", "r14", "r15", "rip",
    ],
    sp: x86_64::RSP,
    fp: x86_64::RBP,
    pc: x86_64::RIP,
};

pub static RISCV64: RegisterFile = RegisterFile {
    arch: "riscv64",
    names: &[
        "pc", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
        "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
        "t5", "t6",
    ],
    sp: riscv64::SP,
    fp: riscv64::S0,
    pc: riscv64::PC,
};

/// Asking for a register the architecture doesn't have. This is a bug in the
/// caller, not something that happens because the target is broken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid register {id:?} for {arch}")]
pub struct InvalidRegister {
    pub id: RegisterId,
    pub arch: &'static str,
}

/// A snapshot of one thread's registers.
#[derive(Clone)]
pub struct RegisterContext {
    convention: &'static FrameConvention,
    values: Vec<u64>,
}

impl RegisterContext {
    /// All registers start out as zero.
    pub fn new(convention: &'static FrameConvention) -> Self {
        RegisterContext {
            convention,
            values: vec![0; convention.registers.len()],
        }
    }

    pub fn convention(&self) -> &'static FrameConvention {
        self.convention
    }

    pub fn registers(&self) -> &'static RegisterFile {
        self.convention.registers
    }

    fn index(&self, id: RegisterId) -> Result<usize, InvalidRegister> {
        if self.registers().contains(id) {
            Ok(id.0 as usize)
        } else {
            Err(InvalidRegister {
                id,
                arch: self.registers().arch,
            })
        }
    }

    pub fn get_register(&self, id: RegisterId) -> Result<u64, InvalidRegister> {
        Ok(self.values[self.index(id)?])
    }

    pub fn set_register(&mut self, id: RegisterId, value: u64) -> Result<(), InvalidRegister> {
        let i = self.index(id)?;
        self.values[i] = value;
        Ok(())
    }

    pub fn get_register_as_address(&self, id: RegisterId) -> Result<Address, InvalidRegister> {
        self.get_register(id)
            .map(|raw| self.convention.address_from_raw(raw))
    }

    pub fn set_register_as_address(
        &mut self,
        id: RegisterId,
        value: Address,
    ) -> Result<(), InvalidRegister> {
        let raw = self.convention.raw_from_address(value);
        self.set_register(id, raw)
    }

    pub fn stack_pointer(&self) -> Result<Address, InvalidRegister> {
        self.get_register_as_address(self.registers().sp)
    }

    pub fn frame_pointer(&self) -> Result<Address, InvalidRegister> {
        self.get_register_as_address(self.registers().fp)
    }

    pub fn program_counter(&self) -> Result<Address, InvalidRegister> {
        self.get_register_as_address(self.registers().pc)
    }

    /// `(id, name, value)` for every register.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, &'static str, u64)> + '_ {
        self.registers()
            .names
            .iter()
            .zip(&self.values)
            .enumerate()
            .map(|(i, (name, value))| (RegisterId(i as u16), *name, *value))
    }
}

impl fmt::Debug for RegisterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(_, name, value)| (name, Address::new(value))))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convention;

    #[test]
    fn register_files_match_their_ids() {
        assert_eq!(AARCH64.len(), 33);
        assert_eq!(AARCH64.name(aarch64::FP), Some("fp"));
        assert_eq!(AARCH64.name(aarch64::LR), Some("lr"));
        assert_eq!(X86_64.name(x86_64::RBP), Some("rbp"));
        assert_eq!(X86_64.name(x86_64::RIP), Some("rip"));
        assert_eq!(RISCV64.len(), 32);
        assert_eq!(RISCV64.name(riscv64::S0), Some("s0"));
        assert_eq!(RISCV64.name(riscv64::RA), Some("ra"));
        assert_eq!(X86_64.id_of("RSP"), Some(x86_64::RSP));
        assert_eq!(X86_64.id_of("eax"), None);
    }

    #[test]
    fn invalid_register() {
        let mut ctx = RegisterContext::new(&convention::X86_64);
        let err = ctx.get_register(RegisterId(17)).unwrap_err();
        assert_eq!(
            err,
            InvalidRegister {
                id: RegisterId(17),
                arch: "x86_64"
            }
        );
        assert!(ctx.set_register(RegisterId(100), 1).is_err());
        assert!(ctx.set_register_as_address(RegisterId(17), Address::NULL).is_err());
    }

    #[test]
    fn address_registers() {
        let mut ctx = RegisterContext::new(&convention::AARCH64);
        ctx.set_register_as_address(aarch64::SP, Address::new(0x7ff0))
            .unwrap();
        ctx.set_register(aarch64::FP, 0x8000).unwrap();
        assert_eq!(ctx.stack_pointer().unwrap(), Address::new(0x7ff0));
        assert_eq!(ctx.frame_pointer().unwrap(), Address::new(0x8000));
        assert_eq!(ctx.program_counter().unwrap(), Address::NULL);
        assert_eq!(ctx.get_register(aarch64::SP).unwrap(), 0x7ff0);
        assert_eq!(ctx.iter().count(), 33);
    }
}
