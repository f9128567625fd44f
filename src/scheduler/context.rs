/*
 * Machine-context save and restore
 *
 * The one irreducibly unsafe piece of the library. A `Context` holds the
 * resume address, stack pointer, and callee-saved register file of a
 * suspended thread; everything else about a thread lives in its control
 * block. The save routine is setjmp-like: it returns 0 when it stores the
 * caller's state and 1 when a later restore jumps back through the saved
 * context. Caller-saved registers need no slots: the save routine is an
 * ordinary function call and the ABI already treats them as clobbered
 * across it.
 *
 * The hand-off paths re-enable the preemption signal between the save and
 * the restore. The mask in force during the transition window is still the
 * switching thread's fully-blocked one, and the restored thread must be
 * preemptible from its first instruction; nothing else would clear it.
 *
 * A synthetic initial context is bit-compatible with a genuine save taken
 * on entry to the trampoline: resume address at the trampoline, stack
 * pointer at the ABI-aligned top of the slot's private stack, callee-saved
 * registers zeroed (they carry no information at first entry).
 */

use cfg_if::cfg_if;

use crate::critical;

cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Saved machine state, System V AMD64. The layout is fixed: the
        /// assembly below addresses the fields by byte offset.
        #[repr(C)]
        #[derive(Debug, Clone, Copy, Default)]
        pub struct Context {
            pub pc: u64,
            pub sp: u64,
            pub rbx: u64,
            pub rbp: u64,
            pub r12: u64,
            pub r13: u64,
            pub r14: u64,
            pub r15: u64,
        }

        core::arch::global_asm!(
            ".p2align 4",
            ".globl uthreads_context_save",
            "uthreads_context_save:",
            "mov rax, [rsp]",
            "mov [rdi + 0x00], rax",
            "lea rax, [rsp + 8]",
            "mov [rdi + 0x08], rax",
            "mov [rdi + 0x10], rbx",
            "mov [rdi + 0x18], rbp",
            "mov [rdi + 0x20], r12",
            "mov [rdi + 0x28], r13",
            "mov [rdi + 0x30], r14",
            "mov [rdi + 0x38], r15",
            "xor eax, eax",
            "ret",
            ".p2align 4",
            ".globl uthreads_context_restore",
            "uthreads_context_restore:",
            "mov rbx, [rdi + 0x10]",
            "mov rbp, [rdi + 0x18]",
            "mov r12, [rdi + 0x20]",
            "mov r13, [rdi + 0x28]",
            "mov r14, [rdi + 0x30]",
            "mov r15, [rdi + 0x38]",
            "mov rsp, [rdi + 0x08]",
            "mov eax, 1",
            "jmp qword ptr [rdi + 0x00]",
        );

        // At function entry the ABI expects SP = 8 (mod 16), as left by a
        // `call` instruction; the restore routine jumps instead of calling.
        fn initial_sp(stack_top: u64) -> u64 {
            (stack_top & !0xF) - 8
        }
    } else if #[cfg(target_arch = "aarch64")] {
        /// Saved machine state, AAPCS64. The low halves of v8 through v15 are
        /// callee-saved and get slots of their own. The layout is fixed:
        /// the assembly below addresses the fields by byte offset.
        #[repr(C)]
        #[derive(Debug, Clone, Copy, Default)]
        pub struct Context {
            pub pc: u64,
            pub sp: u64,
            pub x19: u64,
            pub x20: u64,
            pub x21: u64,
            pub x22: u64,
            pub x23: u64,
            pub x24: u64,
            pub x25: u64,
            pub x26: u64,
            pub x27: u64,
            pub x28: u64,
            pub x29: u64,
            pub d8: u64,
            pub d9: u64,
            pub d10: u64,
            pub d11: u64,
            pub d12: u64,
            pub d13: u64,
            pub d14: u64,
            pub d15: u64,
        }

        core::arch::global_asm!(
            ".p2align 2",
            ".globl uthreads_context_save",
            "uthreads_context_save:",
            "mov x9, sp",
            "str x30, [x0, #0x00]",
            "str x9, [x0, #0x08]",
            "stp x19, x20, [x0, #0x10]",
            "stp x21, x22, [x0, #0x20]",
            "stp x23, x24, [x0, #0x30]",
            "stp x25, x26, [x0, #0x40]",
            "stp x27, x28, [x0, #0x50]",
            "str x29, [x0, #0x60]",
            "stp d8, d9, [x0, #0x68]",
            "stp d10, d11, [x0, #0x78]",
            "stp d12, d13, [x0, #0x88]",
            "stp d14, d15, [x0, #0x98]",
            "mov w0, #0",
            "ret",
            ".p2align 2",
            ".globl uthreads_context_restore",
            "uthreads_context_restore:",
            "ldp x19, x20, [x0, #0x10]",
            "ldp x21, x22, [x0, #0x20]",
            "ldp x23, x24, [x0, #0x30]",
            "ldp x25, x26, [x0, #0x40]",
            "ldp x27, x28, [x0, #0x50]",
            "ldr x29, [x0, #0x60]",
            "ldp d8, d9, [x0, #0x68]",
            "ldp d10, d11, [x0, #0x78]",
            "ldp d12, d13, [x0, #0x88]",
            "ldp d14, d15, [x0, #0x98]",
            "ldr x9, [x0, #0x08]",
            "mov sp, x9",
            "ldr x9, [x0, #0x00]",
            "mov w0, #1",
            "br x9",
        );

        // SP must stay 16-byte aligned at all times.
        fn initial_sp(stack_top: u64) -> u64 {
            stack_top & !0xF
        }
    } else {
        compile_error!("uthreads supports x86_64 and aarch64 only");
    }
}

unsafe extern "C" {
    pub(crate) fn uthreads_context_save(ctx: *mut Context) -> libc::c_int;
    fn uthreads_context_restore(ctx: *const Context) -> !;
}

/// Saves the calling frame's machine state into `ctx`. Returns 0 on the
/// save itself and 1 whenever some thread later restores `ctx`.
///
/// The resume point lies inside the frame that makes this call, so that
/// frame must still be live whenever the context is restored, and any
/// stack use between the save and the restore must stay strictly below
/// the saved stack pointer (deeper calls are fine; returning first and
/// calling again is not). [`switch`] and `init`'s main-context capture
/// both call this from the frame they expect to resume in, exactly like
/// setjmp.
///
/// # Safety
/// `ctx` must point into the thread table, and the caller must hold the
/// critical section so no tick can interleave with the save.
pub(crate) use uthreads_context_save as save;

/// Suspends the caller into `prev` and resumes `next`.
///
/// Returns only when something later restores `prev`. The preemption
/// signal, blocked by the calling critical section, is re-enabled after
/// the save and before the restore.
///
/// # Safety
/// Both pointers must reference contexts in the thread table, `next` must
/// hold a resumable context (a prior save or a synthetic initial one), and
/// the caller must hold the critical section with the scheduler lock
/// already released.
#[inline(never)]
pub(crate) unsafe fn switch(prev: *mut Context, next: *const Context) {
    // The save must happen in this frame: the resume point returns here,
    // and only deeper frames are touched before the restore.
    unsafe {
        if uthreads_context_save(prev) == 0 {
            critical::unblock_preemption();
            uthreads_context_restore(next);
        }
    }
    // Saved-context resume: fall through to the caller.
}

/// Resumes `next` without saving the caller's state.
///
/// The terminate-self path: the dying thread's stack is already parked for
/// reclamation and must not be saved into.
///
/// # Safety
/// As for [`switch`], and the calling thread must never be resumed again.
pub(crate) unsafe fn jump(next: *const Context) -> ! {
    critical::unblock_preemption();
    unsafe { uthreads_context_restore(next) }
}

impl Context {
    /// An empty context, to be filled by the first save.
    pub fn empty() -> Self {
        Context::default()
    }

    /// Synthesizes the initial context of a spawned thread: stack pointer
    /// at the ABI-aligned top of `stack`, resume address at `trampoline`.
    pub fn with_entry(stack: &[u8], trampoline: extern "C" fn() -> !) -> Self {
        let stack_top = stack.as_ptr() as u64 + stack.len() as u64;
        Context {
            pc: trampoline as usize as u64,
            sp: initial_sp(stack_top),
            ..Context::default()
        }
    }
}
