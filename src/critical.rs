/*
 * Preemption-signal critical sections
 *
 * Scheduler state is shared between the running thread and the SIGVTALRM
 * handler, and the handler can interrupt any non-handler code at an
 * instruction boundary. Every mutation therefore runs with the signal
 * blocked: the public API functions and the handler body each hold a
 * critical section for the duration of their state access, and the signal
 * is re-enabled only on the hand-off path inside the context-switch
 * primitive, immediately before the restore.
 *
 * Mask manipulation failures are fatal. Without mask control the serial-
 * mutation invariant cannot be upheld, and continuing would corrupt the
 * thread table silently.
 */

use nix::sys::signal::{SigSet, Signal, SigmaskHow, sigprocmask};

/// The preemption signal driving scheduling ticks.
pub(crate) const PREEMPT_SIGNAL: Signal = Signal::SIGVTALRM;

fn preempt_sigset() -> SigSet {
    let mut set = SigSet::empty();
    set.add(PREEMPT_SIGNAL);
    set
}

/// Blocks the preemption signal for the calling thread.
pub(crate) fn block_preemption() {
    if let Err(err) = sigprocmask(SigmaskHow::SIG_BLOCK, Some(&preempt_sigset()), None) {
        log::error!("system error: sigprocmask failed: {err}");
        std::process::exit(1);
    }
}

/// Unblocks the preemption signal for the calling thread.
pub(crate) fn unblock_preemption() {
    if let Err(err) = sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&preempt_sigset()), None) {
        log::error!("system error: sigprocmask failed: {err}");
        std::process::exit(1);
    }
}

/// Scoped critical section: the preemption signal is blocked from
/// construction until drop.
///
/// Critical sections do not nest; each public entry point opens exactly
/// one, and internal helpers assume the signal is already blocked.
///
/// A thread that switches away while holding the guard drops it only when
/// it is next resumed. By then its resumer has already re-enabled the
/// signal on the hand-off path, and the drop's unblock is a no-op.
pub(crate) struct CriticalSection;

impl CriticalSection {
    pub(crate) fn enter() -> Self {
        block_preemption();
        CriticalSection
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        unblock_preemption();
    }
}
