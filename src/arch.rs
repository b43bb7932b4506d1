//! Capturing the calling thread's own registers, so the library can walk the
//! stack it is running on.

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use core::arch::asm;

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use crate::{addr::Address, convention, registers::RegisterContext};

/// The program counter, stack pointer and frame pointer of the caller.
///
/// Always inlined, so the frame pointer is the caller's and the program
/// counter points into the caller.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn capture_context() -> RegisterContext {
    let (pc, sp, fp): (u64, u64, u64);
    unsafe {
        asm!(
            "lea {pc}, [rip]",
            "mov {sp}, rsp",
            "mov {fp}, rbp",
            pc = out(reg) pc,
            sp = out(reg) sp,
            fp = out(reg) fp,
            options(nomem, nostack, preserves_flags),
        );
    }
    seed(&convention::X86_64, pc, sp, fp)
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn capture_context() -> RegisterContext {
    let (pc, sp, fp): (u64, u64, u64);
    unsafe {
        asm!(
            "adr {pc}, .",
            "mov {sp}, sp",
            "mov {fp}, x29",
            pc = out(reg) pc,
            sp = out(reg) sp,
            fp = out(reg) fp,
            options(nomem, nostack, preserves_flags),
        );
    }
    seed(&convention::AARCH64, pc, sp, fp)
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn seed(conv: &'static convention::FrameConvention, pc: u64, sp: u64, fp: u64) -> RegisterContext {
    let regs = conv.registers;
    let mut ctx = RegisterContext::new(conv);
    for (id, value) in [(regs.pc, pc), (regs.sp, sp), (regs.fp, fp)] {
        // The ids come from the register file itself.
        let result = ctx.set_register_as_address(id, Address::new(value));
        debug_assert!(result.is_ok(), "{result:?}");
    }
    ctx
}

#[cfg(all(
    test,
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
mod tests {
    use super::*;
    use crate::{
        memory::ProcessMemory,
        thread::{Thread, ThreadId},
        walk::Walker,
    };

    #[test]
    fn walk_our_own_stack() {
        let ctx = capture_context();
        let sp = ctx.stack_pointer().unwrap();
        let fp = ctx.frame_pointer().unwrap();
        assert!(!ctx.program_counter().unwrap().is_null());
        assert!(sp <= fp || fp.is_null());

        let mem = ProcessMemory::current();
        let walker = Walker::new(&mem, ctx.convention());
        let thread = Thread::new(ThreadId(0), ctx);

        let frames: Vec<_> = walker.frames(&thread).unwrap().collect();
        assert!(!frames.is_empty());
        for pair in frames.windows(2) {
            assert!(pair[1].frame_base() > pair[0].frame_base());
            assert!(!pair[1].program_counter().is_null());
        }
    }
}
