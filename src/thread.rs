//! Threads of the debuggee and where their registers come from.

use std::{collections::HashMap, fmt, io};

use crate::registers::{InvalidRegister, RegisterContext};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no register context for thread {0}")]
    UnknownThread(ThreadId),
    #[error(transparent)]
    Register(#[from] InvalidRegister),
    #[error("reading registers of thread {tid}: {source}")]
    Os { tid: ThreadId, source: io::Error },
}

/// Hands out register snapshots for threads of a paused target.
pub trait ThreadContextProvider {
    fn context_for(&self, thread: ThreadId) -> Result<RegisterContext, ContextError>;
}

impl<P: ThreadContextProvider + ?Sized> ThreadContextProvider for &P {
    fn context_for(&self, thread: ThreadId) -> Result<RegisterContext, ContextError> {
        (**self).context_for(thread)
    }
}

/// A thread together with the registers it had when the unwind was requested.
/// The walker only ever reads `context`.
#[derive(Debug, Clone)]
pub struct Thread {
    pub id: ThreadId,
    pub context: RegisterContext,
}

impl Thread {
    pub fn new(id: ThreadId, context: RegisterContext) -> Self {
        Thread { id, context }
    }

    pub fn capture<P: ThreadContextProvider + ?Sized>(
        provider: &P,
        id: ThreadId,
    ) -> Result<Self, ContextError> {
        let context = provider.context_for(id)?;
        Ok(Thread { id, context })
    }
}

/// Contexts collected up front, e.g. the `NT_PRSTATUS` notes of a core file.
#[derive(Debug, Default, Clone)]
pub struct StaticContexts {
    contexts: HashMap<ThreadId, RegisterContext>,
}

impl StaticContexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, thread: ThreadId, context: RegisterContext) {
        self.contexts.insert(thread, context);
    }

    pub fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.contexts.keys().copied()
    }
}

impl ThreadContextProvider for StaticContexts {
    fn context_for(&self, thread: ThreadId) -> Result<RegisterContext, ContextError> {
        self.contexts
            .get(&thread)
            .cloned()
            .ok_or(ContextError::UnknownThread(thread))
    }
}

/// Reads registers of threads that the caller has already attached to with
/// ptrace and that are currently stopped.
#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
#[derive(Debug, Default, Clone, Copy)]
pub struct PtraceContexts;

#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
mod ptrace {
    use core::mem;

    use super::{ContextError, PtraceContexts, ThreadContextProvider, ThreadId};
    use crate::{convention, registers::RegisterContext};

    const NT_PRSTATUS: libc::c_int = 1;

    fn getregset(tid: ThreadId) -> Result<libc::user_regs_struct, ContextError> {
        // SAFETY: user_regs_struct is plain integers.
        let mut regs: libc::user_regs_struct = unsafe { mem::zeroed() };
        let mut iov = libc::iovec {
            iov_base: (&mut regs as *mut libc::user_regs_struct).cast(),
            iov_len: mem::size_of::<libc::user_regs_struct>(),
        };
        // SAFETY: iov points at a buffer of the advertised size that lives
        // until the call returns.
        let r = unsafe {
            libc::ptrace(
                libc::PTRACE_GETREGSET,
                tid.0 as libc::pid_t,
                NT_PRSTATUS as usize as *mut libc::c_void,
                &mut iov as *mut libc::iovec,
            )
        };
        if r < 0 {
            return Err(ContextError::Os {
                tid,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(regs)
    }

    #[cfg(target_arch = "x86_64")]
    fn to_context(s: &libc::user_regs_struct) -> Result<RegisterContext, ContextError> {
        let mut ctx = RegisterContext::new(&convention::X86_64);
        let values = [
            s.rax, s.rdx, s.rcx, s.rbx, s.rsi, s.rdi, s.rbp, s.rsp, s.r8, s.r9, s.r10, s.r11,
            s.r12, s.r13, s.r14, s.r15, s.rip,
        ];
        for (i, v) in values.into_iter().enumerate() {
            ctx.set_register(crate::registers::RegisterId(i as u16), v)?;
        }
        Ok(ctx)
    }

    #[cfg(target_arch = "aarch64")]
    fn to_context(s: &libc::user_regs_struct) -> Result<RegisterContext, ContextError> {
        use crate::registers::{aarch64, RegisterId};

        let mut ctx = RegisterContext::new(&convention::AARCH64);
        for (i, v) in s.regs.iter().enumerate() {
            ctx.set_register(RegisterId(i as u16), *v)?;
        }
        ctx.set_register(aarch64::SP, s.sp)?;
        ctx.set_register(aarch64::PC, s.pc)?;
        Ok(ctx)
    }

    impl ThreadContextProvider for PtraceContexts {
        #[instrument(level = "debug", skip(self))]
        fn context_for(&self, thread: ThreadId) -> Result<RegisterContext, ContextError> {
            let regs = getregset(thread)?;
            to_context(&regs)
        }
    }
}
