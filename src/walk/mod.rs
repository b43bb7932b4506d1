//! Walking the chain of frame records.
//!
//! A walk starts at [`Walker::top_frame`] and asks for the sender of the last
//! frame until there is none. Anything odd about the target (unreadable
//! memory, broken alignment, a chain that doesn't go up the stack) ends the
//! walk instead of failing it, so a corrupted stack still produces the frames
//! that could be recovered.

mod fp;


use core::iter::FusedIterator;

pub use fp::StopReason;

use crate::{
    addr::{Address, Memory, MemoryReader},
    config::UnwindConfig,
    convention::FrameConvention,
    registers::InvalidRegister,
    symbols::{ClosestSymbol, SymbolResolver},
    thread::{Thread, ThreadId},
};

/// Frames yielded by [`Frames`] unless configured otherwise.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// One activation record: where execution is and which frame record it owns.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StackFrame {
    pc: Address,
    fp: Address,
}

impl StackFrame {
    pub fn new(pc: Address, fp: Address) -> Self {
        StackFrame { pc, fp }
    }

    pub fn program_counter(&self) -> Address {
        self.pc
    }

    /// The frame pointer register's value while this frame is active.
    pub fn frame_base(&self) -> Address {
        self.fp
    }

    /// The frame that called this one, if it can be found.
    pub fn sender<M: MemoryReader + ?Sized>(
        &self,
        walker: &Walker<'_, M>,
        thread: &Thread,
    ) -> Option<StackFrame> {
        walker.sender(self, thread)
    }

    /// Labels the program counter. Has no bearing on the walk.
    pub fn resolve_symbol<R: SymbolResolver + ?Sized>(
        &self,
        resolver: &R,
    ) -> Option<ClosestSymbol> {
        resolver.lookup(self.pc.value())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UnwindError {
    #[error(transparent)]
    Register(#[from] InvalidRegister),
    #[error("thread {0} has a null program counter")]
    NullProgramCounter(ThreadId),
    #[error("thread {thread} has {found} registers but the walker expects {expected}")]
    ConventionMismatch {
        thread: ThreadId,
        found: &'static str,
        expected: &'static str,
    },
}

/// Walks frame pointer chains in one target's memory.
///
/// Holds no mutable state: the same walker can unwind any number of threads,
/// from any number of threads.
pub struct Walker<'a, M: ?Sized> {
    memory: Memory<'a, M>,
    max_depth: usize,
}

impl<M: ?Sized> Clone for Walker<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: ?Sized> Copy for Walker<'_, M> {}

impl<'a, M: MemoryReader + ?Sized> Walker<'a, M> {
    pub fn new(memory: &'a M, convention: &'a FrameConvention) -> Self {
        Walker {
            memory: Memory::new(memory, convention),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_config(memory: &'a M, config: &UnwindConfig) -> Self {
        Walker::new(memory, config.convention).max_depth(config.max_depth)
    }

    /// Caps how many frames [`Walker::frames`] yields, top frame included.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn convention(&self) -> &'a FrameConvention {
        self.memory.convention()
    }

    pub fn memory(&self) -> Memory<'a, M> {
        self.memory
    }

    /// The innermost frame, built from the thread's program counter and frame
    /// pointer registers.
    #[instrument(level = "debug", skip_all, fields(thread = %thread.id))]
    pub fn top_frame(&self, thread: &Thread) -> Result<StackFrame, UnwindError> {
        let found = thread.context.convention();
        if found.registers != self.convention().registers {
            return Err(UnwindError::ConventionMismatch {
                thread: thread.id,
                found: found.registers.arch,
                expected: self.convention().registers.arch,
            });
        }

        let pc = thread.context.program_counter()?;
        if pc.is_null() {
            return Err(UnwindError::NullProgramCounter(thread.id));
        }
        let fp = thread.context.frame_pointer()?;
        debug!(%pc, %fp, "top frame");
        Ok(StackFrame::new(pc, fp))
    }

    pub fn sender(&self, frame: &StackFrame, thread: &Thread) -> Option<StackFrame> {
        self.step(frame, thread).ok()
    }

    /// All frames of `thread`, innermost first.
    pub fn frames<'w>(&'w self, thread: &'w Thread) -> Result<Frames<'w, 'a, M>, UnwindError> {
        let top = self.top_frame(thread)?;
        Ok(self.frames_from(top, thread))
    }

    /// Frames starting at `top`, which is yielded first.
    pub fn frames_from<'w>(&'w self, top: StackFrame, thread: &'w Thread) -> Frames<'w, 'a, M> {
        Frames {
            walker: self,
            thread,
            top: Some(top),
            last: None,
            depth: 0,
            stop: None,
        }
    }
}

/// Lazily walks a stack. Each call to `next` does at most one step.
pub struct Frames<'w, 'a, M: ?Sized> {
    walker: &'w Walker<'a, M>,
    thread: &'w Thread,
    top: Option<StackFrame>,
    last: Option<StackFrame>,
    depth: usize,
    stop: Option<StopReason>,
}

impl<M: ?Sized> Frames<'_, '_, M> {
    /// Why the walk ended, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Frames yielded so far.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl<M: MemoryReader + ?Sized> Iterator for Frames<'_, '_, M> {
    type Item = StackFrame;

    fn next(&mut self) -> Option<StackFrame> {
        if self.stop.is_some() {
            return None;
        }
        let frame = match (self.top.take(), self.last) {
            (Some(top), _) => top,
            (None, Some(last)) => {
                if self.depth >= self.walker.max_depth {
                    warn!(
                        thread = %self.thread.id,
                        depth = self.depth,
                        "stack truncated at the depth limit"
                    );
                    self.stop = Some(StopReason::DepthLimit(self.depth));
                    return None;
                }
                match self.walker.step(&last, self.thread) {
                    Ok(frame) => frame,
                    Err(reason) => {
                        self.stop = Some(reason);
                        return None;
                    }
                }
            }
            (None, None) => return None,
        };
        self.last = Some(frame);
        self.depth += 1;
        Some(frame)
    }
}

impl<M: MemoryReader + ?Sized> FusedIterator for Frames<'_, '_, M> {}
