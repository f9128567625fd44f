/*
 * Thread control blocks
 *
 * One `Thread` per occupied slot in the scheduler's table. An unused slot
 * holds no block at all, so the UNUSED stage of the lifecycle has no
 * variant here; a freed slot simply drops its block (and with it the
 * stack) and becomes available to a later spawn.
 */

use core::fmt;

use super::context::Context;

/// Thread identifier: the index of the thread's slot in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl ThreadId {
    /// The initial thread, adopted by `init`. It runs on the process stack,
    /// cannot be blocked or sleep, and terminating it ends the process.
    pub const MAIN: ThreadId = ThreadId(0);
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {}", self.0)
    }
}

/// Scheduling state of a live thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Runnable, waiting in the ready queue.
    Ready,
    /// Executing. Exactly one thread is Running at any instant.
    Running,
    /// Off the ready queue. `wake_at` carries a sleeper's absolute
    /// `total_quantums` deadline; an explicitly blocked thread has none.
    /// The deadline is consulted only while the thread stays in this
    /// state.
    Blocked { wake_at: Option<u64> },
}

/// Thread control block.
pub struct Thread {
    pub id: ThreadId,
    pub state: ThreadState,
    /// Quanta spent Running: one per entry to the Running state plus one
    /// per timer tick consumed while Running.
    pub quantums: u64,
    /// Entry point captured at spawn. The main thread has none.
    pub entry: Option<fn()>,
    /// Saved machine state; meaningful only while the thread is not
    /// Running.
    pub context: Context,
    /// Private stack region, owned by this slot for as long as it is
    /// occupied. The main thread runs on the process stack instead.
    pub stack: Option<Box<[u8]>>,
}

impl Thread {
    /// Control block for the initial thread, which is already running on
    /// the process stack when the library initializes. The first quantum
    /// is on its account.
    pub fn main() -> Self {
        Thread {
            id: ThreadId::MAIN,
            state: ThreadState::Running,
            quantums: 1,
            entry: None,
            context: Context::empty(),
            stack: None,
        }
    }

    /// Control block for a freshly spawned thread: Ready, with a synthetic
    /// context that enters the spawn trampoline on first dispatch.
    pub fn spawned(id: ThreadId, entry: fn(), stack: Box<[u8]>, context: Context) -> Self {
        Thread {
            id,
            state: ThreadState::Ready,
            quantums: 0,
            entry: Some(entry),
            context,
            stack: Some(stack),
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("quantums", &self.quantums)
            .field("stack_size", &self.stack.as_ref().map(|s| s.len()))
            .finish()
    }
}
