//! Frame pointer unwinding of threads in another (paused or dead) process.
//!
//! ```text
//! Thread ──top_frame──▶ StackFrame ──sender──▶ StackFrame ──sender──▶ … ▶ none
//!                           │
//!                           └─resolve_symbol──▶ ClosestSymbol
//! ```
//!
//! Memory, registers and symbols all come from the outside through
//! [`MemoryReader`], [`ThreadContextProvider`] and [`SymbolResolver`]. The
//! walker itself only reads, keeps no state between calls and turns every
//! anomaly it finds into the end of the stack.

#[macro_use]
extern crate tracing;

pub mod addr;
pub mod arch;
pub mod backtrace;
pub mod config;
pub mod convention;
pub mod memory;
pub mod registers;
pub mod symbols;
pub mod thread;
pub mod walk;

pub use addr::{Address, Memory, MemoryReadError, MemoryReader};
pub use backtrace::{Backtrace, BacktraceFrame};
pub use config::{ConfigError, UnwindConfig};
pub use convention::FrameConvention;
pub use memory::SnapshotMemory;
#[cfg(target_os = "linux")]
pub use memory::ProcessMemory;
pub use registers::{InvalidRegister, RegisterContext, RegisterFile, RegisterId};
pub use symbols::{ClosestSymbol, NoSymbols, SymbolResolver, SymbolTable};
#[cfg(unix)]
pub use symbols::DladdrResolver;
#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
pub use thread::PtraceContexts;
pub use thread::{ContextError, StaticContexts, Thread, ThreadContextProvider, ThreadId};
pub use walk::{Frames, StackFrame, StopReason, UnwindError, Walker, DEFAULT_MAX_DEPTH};
