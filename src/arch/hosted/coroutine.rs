/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Coroutines emulated with OS threads passing a single baton.
//!
//! Exactly one party runs at a time: either the scheduler loop (the driver) or one task
//! thread. A task only gives the baton back at a yield point or when its entry returns,
//! which reproduces the cooperative switching of the bare metal backend.

use {
    crate::sched::{TaskHooks, TaskId, ThreadFn},
    std::{
        cell::Cell,
        ffi::c_void,
        panic::{self, AssertUnwindSafe},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Condvar, Mutex, MutexGuard, PoisonError,
        },
        thread,
    },
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Turn {
    Driver,
    Task(TaskId),
}

struct Baton {
    turn: Mutex<Turn>,
    changed: Condvar,
}

impl Baton {
    fn lock(&self) -> MutexGuard<'_, Turn> {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for(&self, mut guard: MutexGuard<'_, Turn>, want: Turn) {
        while *guard != want {
            guard = self
                .changed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Hand the baton to `give` and sleep until it comes back as `want`.
    fn pass(&self, give: Turn, want: Turn) {
        let mut guard = self.lock();
        *guard = give;
        self.changed.notify_all();
        self.wait_for(guard, want);
    }

    fn release(&self, give: Turn) {
        *self.lock() = give;
        self.changed.notify_all();
    }
}

#[derive(Default)]
struct Status {
    finished: AtomicBool,
    panicked: AtomicBool,
}

struct Entry {
    func: ThreadFn,
    arg: *mut c_void,
}

// The argument is only touched by the task thread while it holds the baton.
unsafe impl Send for Entry {}

impl Entry {
    fn call(self) -> i32 {
        (self.func)(self.arg)
    }
}

thread_local! {
    static CURRENT: Cell<Option<TaskId>> = Cell::new(None);
}

/// Coroutine backend. Lives as long as the scheduler owning it.
pub struct Coroutines {
    baton: Baton,
    tasks: Mutex<Vec<(TaskId, Arc<Status>)>>,
}

impl Coroutines {
    pub const fn new() -> Self {
        Self {
            baton: Baton {
                turn: Mutex::new(Turn::Driver),
                changed: Condvar::new(),
            },
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn status(&self, id: TaskId) -> Option<Arc<Status>> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(task, _)| *task == id)
            .map(|(_, status)| status.clone())
    }

    /// Prepare the coroutine for `id`, it starts running `entry(arg)` on its first resume.
    pub fn spawn(&'static self, id: TaskId, entry: ThreadFn, arg: *mut c_void) {
        let status = Arc::new(Status::default());
        let entry = Entry { func: entry, arg };
        let task_status = status.clone();

        let spawned = thread::Builder::new()
            .name(format!("kthread-{}", id))
            .spawn(move || {
                self.baton.wait_for(self.baton.lock(), Turn::Task(id));
                CURRENT.with(|current| current.set(Some(id)));

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.call()));
                if outcome.is_err() {
                    task_status.panicked.store(true, Ordering::SeqCst);
                }
                task_status.finished.store(true, Ordering::SeqCst);
                self.baton.release(Turn::Driver);
            });
        if spawned.is_err() {
            crate::bug!();
        }

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, status));
    }

    /// Run coroutine `id` until it yields or returns.
    pub fn resume(&self, id: TaskId, hooks: &dyn TaskHooks) {
        let status = match self.status(id) {
            Some(status) if !status.finished.load(Ordering::SeqCst) => status,
            _ => return,
        };

        hooks.switched(id);
        self.baton.pass(Turn::Task(id), Turn::Driver);
        hooks.switched(TaskId::BOOT);

        if status.finished.load(Ordering::SeqCst) {
            hooks.terminated(id);
            if status.panicked.load(Ordering::SeqCst) {
                panic!("kernel thread {} panicked", id);
            }
        }
    }

    /// Give the processor back to the scheduler loop.
    pub fn suspend(&self) {
        let Some(id) = self.current() else {
            crate::bug!();
        };
        self.baton.pass(Turn::Driver, Turn::Task(id));
    }

    /// Task whose coroutine is executing right now.
    pub fn current(&self) -> Option<TaskId> {
        CURRENT.with(Cell::get)
    }
}
