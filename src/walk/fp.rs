//! One step of the frame pointer walk.

use core::fmt;

use crate::{
    addr::{Address, MemoryReadError, MemoryReader},
    thread::Thread,
};

use super::{StackFrame, Walker};

/// Why a frame has no sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The thread's registers belong to another architecture than the
    /// walker's convention.
    ForeignContext {
        found: &'static str,
        expected: &'static str,
    },
    NullFrameBase,
    /// The frame base is below the stack pointer: bottom of the walkable stack.
    BelowStackPointer { fp: Address, sp: Address },
    Misaligned { fp: Address },
    /// `fp + offset` leaves the address space.
    AddressOverflow { fp: Address, offset: i64 },
    UnreadableFrame { fp: Address, offset: i64 },
    NullSavedFrame { fp: Address },
    /// The saved frame pointer doesn't go up the stack.
    NonIncreasingFrame { fp: Address, next_fp: Address },
    NullReturnAddress { fp: Address },
    DepthLimit(usize),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StopReason::ForeignContext { found, expected } => {
                write!(f, "{found} registers walked as {expected}")
            }
            StopReason::NullFrameBase => write!(f, "null frame base"),
            StopReason::BelowStackPointer { fp, sp } => {
                write!(f, "frame base {fp} below stack pointer {sp}")
            }
            StopReason::Misaligned { fp } => write!(f, "misaligned frame base {fp}"),
            StopReason::AddressOverflow { fp, offset } => {
                write!(f, "frame record at {fp}{offset:+} overflows")
            }
            StopReason::UnreadableFrame { fp, offset } => {
                write!(f, "cannot read frame record at {fp}{offset:+}")
            }
            StopReason::NullSavedFrame { fp } => write!(f, "null saved frame pointer at {fp}"),
            StopReason::NonIncreasingFrame { fp, next_fp } => {
                write!(f, "saved frame pointer {next_fp} is not above {fp}")
            }
            StopReason::NullReturnAddress { fp } => write!(f, "null return address at {fp}"),
            StopReason::DepthLimit(depth) => write!(f, "depth limit of {depth} frames"),
        }
    }
}

impl<M: MemoryReader + ?Sized> Walker<'_, M> {
    /// Computes the sender of `frame`, or says why there is none.
    pub fn step(&self, frame: &StackFrame, thread: &Thread) -> Result<StackFrame, StopReason> {
        let result = self.step_inner(frame, thread);
        match &result {
            Ok(next) => trace!(
                "walk... pc={} fp={} -> pc={} fp={}",
                frame.pc,
                frame.fp,
                next.pc,
                next.fp
            ),
            Err(reason) => debug!(
                thread = %thread.id,
                pc = %frame.pc,
                fp = %frame.fp,
                %reason,
                "no sender"
            ),
        }
        result
    }

    fn step_inner(&self, frame: &StackFrame, thread: &Thread) -> Result<StackFrame, StopReason> {
        let conv = self.convention();
        let fp = frame.fp;

        let found = thread.context.convention().registers;
        let foreign = StopReason::ForeignContext {
            found: found.arch,
            expected: conv.registers.arch,
        };
        if found != conv.registers {
            return Err(foreign);
        }
        let sp = thread.context.stack_pointer().map_err(|_| foreign)?;

        if fp.is_null() {
            return Err(StopReason::NullFrameBase);
        }
        if fp.less_than(sp) {
            return Err(StopReason::BelowStackPointer { fp, sp });
        }
        if !fp.is_aligned(conv.frame_alignment) {
            return Err(StopReason::Misaligned { fp });
        }

        let next_fp = self.read_slot(fp, conv.saved_fp_offset)?;
        if next_fp.is_null() {
            return Err(StopReason::NullSavedFrame { fp });
        }
        if next_fp.less_or_equal(fp) {
            return Err(StopReason::NonIncreasingFrame { fp, next_fp });
        }

        let next_pc = self.read_slot(fp, conv.saved_pc_offset)?;
        if next_pc.is_null() {
            return Err(StopReason::NullReturnAddress { fp });
        }

        Ok(StackFrame::new(next_pc, next_fp))
    }

    fn read_slot(&self, fp: Address, offset: i64) -> Result<Address, StopReason> {
        self.memory
            .read_address_at(fp, offset)
            .map_err(|error| match error {
                MemoryReadError::AddressOverflow { .. } => {
                    StopReason::AddressOverflow { fp, offset }
                }
                error => {
                    trace!("reading frame record at {fp}{offset:+}: {error}");
                    StopReason::UnreadableFrame { fp, offset }
                }
            })
    }
}
