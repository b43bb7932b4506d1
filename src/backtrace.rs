use core::fmt;

use crate::{
    addr::MemoryReader,
    symbols::{ClosestSymbol, SymbolResolver},
    thread::{Thread, ThreadId},
    walk::{StackFrame, StopReason, UnwindError, Walker},
};

#[derive(Debug, Clone)]
pub struct BacktraceFrame {
    pub frame: StackFrame,
    pub symbol: Option<ClosestSymbol>,
}

/// A fully walked, symbolized stack.
#[derive(Debug, Clone)]
pub struct Backtrace {
    pub thread: ThreadId,
    pub frames: Vec<BacktraceFrame>,
    pub stop_reason: Option<StopReason>,
}

impl Backtrace {
    #[instrument(level = "debug", skip_all, fields(thread = %thread.id))]
    pub fn capture<M, R>(
        walker: &Walker<'_, M>,
        thread: &Thread,
        resolver: &R,
    ) -> Result<Backtrace, UnwindError>
    where
        M: MemoryReader + ?Sized,
        R: SymbolResolver + ?Sized,
    {
        let mut walk = walker.frames(thread)?;
        let frames = walk
            .by_ref()
            .map(|frame| BacktraceFrame {
                symbol: frame.resolve_symbol(resolver),
                frame,
            })
            .collect::<Vec<_>>();
        debug!(depth = frames.len(), "captured backtrace");

        Ok(Backtrace {
            thread: thread.id,
            frames,
            stop_reason: walk.stop_reason(),
        })
    }
}

impl fmt::Display for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "thread {}:", self.thread)?;
        for (i, frame) in self.frames.iter().enumerate() {
            write!(f, "#{i:<3} {} in ", frame.frame.program_counter())?;
            match &frame.symbol {
                Some(symbol) => write!(f, "{symbol}")?,
                None => f.write_str("??")?,
            }
            writeln!(f, " (fp={})", frame.frame.frame_base())?;
        }
        if let Some(reason) = self.stop_reason {
            writeln!(f, "(stopped: {reason})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        addr::Address, convention, memory::SnapshotMemory, registers::RegisterContext,
        symbols::SymbolTable,
    };

    #[test]
    fn capture_and_print() {
        let mem = SnapshotMemory::new()
            .with_u64(0x1000, 0x1020)
            .with_u64(0x1008, 0x400050)
            .with_u64(0x1020, 0x1020);
        let conv = &convention::AARCH64;
        let mut ctx = RegisterContext::new(conv);
        ctx.set_register_as_address(conv.registers.pc, Address::new(0x400010))
            .unwrap();
        ctx.set_register_as_address(conv.registers.fp, Address::new(0x1000))
            .unwrap();
        ctx.set_register_as_address(conv.registers.sp, Address::new(0x1000))
            .unwrap();
        let thread = Thread::new(ThreadId(42), ctx);

        let mut table = SymbolTable::new();
        table.insert(0x400000, Some(0x40), "leaf");

        let walker = Walker::new(&mem, conv);
        let bt = Backtrace::capture(&walker, &thread, &table).unwrap();
        assert_eq!(bt.frames.len(), 2);
        assert!(matches!(
            bt.stop_reason,
            Some(StopReason::NonIncreasingFrame { .. })
        ));

        assert_eq!(
            bt.to_string(),
            "thread 42:\n\
             #0   0x400010 in leaf+0x10 (fp=0x1000)\n\
             #1   0x400050 in ?? (fp=0x1020)\n\
             (stopped: saved frame pointer 0x1020 is not above 0x1020)\n"
        );
    }
}
