/*
 * Library error surface
 *
 * Usage errors only. Every variant is returned before any scheduler state
 * has been mutated, so the library remains fully usable after a failed
 * call. Kernel-interface failures (sigaction, setitimer, sigprocmask) are
 * not represented here: they make the scheduling invariants unmaintainable
 * and terminate the process with a diagnostic instead.
 */

use core::fmt;

use crate::scheduler::thread::ThreadId;

/// Errors reported by the public thread-library operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `init` was called with a zero quantum length.
    InvalidQuantum,
    /// `init` was called a second time.
    AlreadyInitialized,
    /// An operation other than a query ran before `init`.
    NotInitialized,
    /// The thread id is out of range or its slot is unused.
    UnknownThread(ThreadId),
    /// `spawn` found no unused slot in the thread table.
    NoFreeSlot,
    /// The main thread cannot be blocked.
    BlockMain,
    /// The main thread cannot sleep.
    SleepMain,
    /// `sleep` was called with a zero duration.
    InvalidSleep,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidQuantum => write!(f, "quantum length must be positive"),
            Error::AlreadyInitialized => write!(f, "thread library is already initialized"),
            Error::NotInitialized => write!(f, "thread library is not initialized"),
            Error::UnknownThread(tid) => write!(f, "no such thread: {tid}"),
            Error::NoFreeSlot => write!(f, "no available thread id"),
            Error::BlockMain => write!(f, "cannot block the main thread"),
            Error::SleepMain => write!(f, "the main thread cannot sleep"),
            Error::InvalidSleep => write!(f, "sleep duration must be positive"),
        }
    }
}

impl std::error::Error for Error {}
