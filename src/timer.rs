/*
 * Virtual-time preemption source
 *
 * Installs the SIGVTALRM handler and arms ITIMER_VIRTUAL so that one signal
 * is delivered per quantum of consumed CPU time. The initial expiry and the
 * repeat interval both equal the quantum, so the running thread is never
 * hit by a second tick within its own quantum.
 *
 * Virtual time only advances while the process executes in user mode: a
 * process that blocks in the kernel does not accumulate quanta.
 */

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, sigaction};

use crate::critical::PREEMPT_SIGNAL;

/// Installs `handler` for the preemption signal and starts the periodic
/// virtual timer.
///
/// Fatal on either kernel-interface failure: without the timer the library
/// cannot uphold its scheduling guarantees.
pub(crate) fn start(quantum_usecs: u64, handler: extern "C" fn(libc::c_int)) {
    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    if let Err(err) = unsafe { sigaction(PREEMPT_SIGNAL, &action) } {
        log::error!("system error: sigaction failed: {err}");
        std::process::exit(1);
    }

    let period = libc::timeval {
        tv_sec: (quantum_usecs / 1_000_000) as libc::time_t,
        tv_usec: (quantum_usecs % 1_000_000) as libc::suseconds_t,
    };
    let timer = libc::itimerval {
        it_interval: period,
        it_value: period,
    };
    if unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, core::ptr::null_mut()) } != 0 {
        log::error!(
            "system error: setitimer failed: {}",
            std::io::Error::last_os_error()
        );
        std::process::exit(1);
    }
}
