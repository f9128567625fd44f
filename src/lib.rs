/*
 * uthreads: user-level threads library
 *
 * A single-process scheduler that multiplexes many independent execution
 * contexts onto one kernel thread. A periodic virtual-time signal delivers
 * one tick per quantum; runnable threads share the CPU round-robin, and the
 * public operations (spawn, terminate, block, resume, sleep, queries) drive
 * the same switch machinery under the same critical-section discipline.
 *
 * Subsystems:
 * - scheduler: thread table, ready queue, context switching, public API
 * - critical:  preemption-signal critical sections (sigprocmask)
 * - timer:     SIGVTALRM handler installation and ITIMER_VIRTUAL arming
 * - logger:    stderr sink for the `log` facade
 *
 * The library is strictly single-kernel-threaded: every operation must be
 * called from the one kernel thread that called `init`.
 */

pub mod error;
pub mod logger;
pub mod scheduler;

mod critical;
mod timer;

pub use error::Error;
pub use scheduler::thread::{ThreadId, ThreadState};
pub use scheduler::{
    block, current_thread_id, init, resume, sleep, spawn, terminate, thread_quantums,
    total_quantums,
};

/// Maximum number of live threads, the main thread included.
pub const MAX_THREADS: usize = 100;

/// Private stack size for each spawned thread, in bytes.
pub const STACK_SIZE: usize = 32 * 1024;
