//! Thread scheduler.
//!
//! Wires together the per-CPU run state (`smp`), the priority/CFS ready
//! queues (`queue`), the task control blocks (`task`), and the core pick/
//! switch algorithm (`scheduler`) into the narrow surface the rest of the
//! kernel actually calls: `reschedule`, `reschedule_for_waitlist`'s
//! scheduler-side half (`mark_current_blocked`, `wake_thread`,
//! `take_wake_result`), and `current_thread_id`.
//!
//! Threads live in `process::thread`; each `Thread`
//! optionally owns a scheduler-side `Task` (this module) reachable through
//! `Thread::get_task_ptr`/`set_task_ptr`, and each `Task` points back via
//! `thread_ref`. The two halves are kept in sync by whichever side performs
//! a state transition.

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod ipc_blocking;
pub mod metrics;
pub mod percpu_queue;
pub mod process_compat;
pub mod queue;
#[cfg(target_arch = "riscv64")]
pub mod riscv_scheduler;
pub mod runtime;
pub mod scheduler;
pub mod smp;
pub mod task;
pub mod task_management;
pub mod task_ptr;

pub use crate::process::{ProcessId, ProcessState, ThreadId};
pub use ipc_blocking::{block_on_ipc, block_process, wake_up_endpoint_waiters, wake_up_process, yield_cpu};
pub use queue::READY_QUEUE;
pub use runtime::timer_tick;
pub use scheduler::{current_scheduler, schedule_on_cpu, SchedAlgorithm, SCHEDULER};
pub use task::{Priority, SchedClass, Task};
pub use task_management::exit_task;

use spin::Mutex;

#[cfg(feature = "alloc")]
use alloc::collections::BTreeMap;

/// Initialize the scheduler: ready queues, per-CPU state, idle task.
pub fn init() {
    println!("[SCHED] Initializing scheduler...");
    smp::init();
    queue::init_ready_queue();
    println!("[SCHED] Scheduler initialized");
}

/// Hand control to the scheduler's run loop. Does not return.
pub fn run() -> ! {
    runtime::start()
}

/// Alias kept for call sites that name the hand-off `start()`.
pub fn start() -> ! {
    runtime::start()
}

/// The calling thread's tid, looked up via the current scheduler task.
pub fn current_thread_id() -> ThreadId {
    crate::process::get_thread_tid()
}

/// Identity used by `RecursiveSpinLock` for ownership tracking: the address
/// of the current task, or `None` before the scheduler has picked one
/// (early boot).
pub fn current_thread_ptr() -> Option<usize> {
    SCHEDULER.lock().current().map(|p| p.as_ptr() as usize)
}

/// Mark the calling thread Blocked without yet giving up the CPU. Callers
/// enqueue onto a `WaitList` first, then call this, then `reschedule()` --
/// together these form `reschedule_for_waitlist`'s
/// lock/verify/enqueue/release/reschedule sequence.
pub fn mark_current_blocked() {
    if let Some(thread) = crate::process::current_thread() {
        thread.set_blocked(None);
    }
    if let Some(task) = SCHEDULER.lock().current() {
        // SAFETY: `task` is the current CPU's running task, returned under
        // the scheduler lock; no other CPU can hold a reference to it while
        // it is `current`.
        unsafe {
            (*task.as_ptr()).state = ProcessState::Blocked;
        }
    }
}

/// Give up the CPU and let the scheduler pick the next Runnable task.
/// Entered voluntarily (after `mark_current_blocked`) or from the timer IRQ
/// path via `timer_tick`.
pub fn reschedule() {
    SCHEDULER.lock().schedule();
}

/// Per-tid record of why the last `wait()` on a `WaitList` returned, so
/// `take_wake_result` can tell a normal `wake()` apart from a `close()`.
#[cfg(feature = "alloc")]
static WAKE_REASON: Mutex<BTreeMap<ThreadId, bool>> = Mutex::new(BTreeMap::new());

/// Wake a specific thread normally (`WaitList::wake`).
pub fn wake_thread(tid: ThreadId) {
    #[cfg(feature = "alloc")]
    WAKE_REASON.lock().insert(tid, true);
    crate::process::wake_thread(tid);
}

/// Wake a thread because the waitlist it was parked on was closed
/// (`WaitList::close`). Distinguished from [`wake_thread`] purely so
/// `take_wake_result` can report `false` once a waitlist has gone stale.
pub fn wake_closed(tid: ThreadId) {
    #[cfg(feature = "alloc")]
    WAKE_REASON.lock().insert(tid, false);
    crate::process::wake_thread(tid);
}

/// Consume and return the wake reason recorded for `tid`: `true` for a
/// normal wake, `false` if the waitlist had been closed. Defaults to `true`
/// if no reason was recorded (e.g. a thread that was never actually
/// blocked).
pub fn take_wake_result(tid: ThreadId) -> bool {
    #[cfg(feature = "alloc")]
    {
        WAKE_REASON.lock().remove(&tid).unwrap_or(true)
    }
    #[cfg(not(feature = "alloc"))]
    {
        let _ = tid;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_reason_defaults_true() {
        assert!(take_wake_result(ThreadId(u64::MAX)));
    }
}
