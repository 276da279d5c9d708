/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel thread API and the `current` task pointer.

use {
    crate::{
        runtime::Runtime,
        sched::{TaskId, ThreadFn, MAX_THREADS},
        sync::{interface::Mutex, NullLock},
    },
    core::{
        ffi::{c_char, c_int, c_long, c_void},
        ptr,
    },
};

/// The slice of `struct task_struct` the driver touches.
#[repr(C)]
pub struct TaskStruct {
    pub pid: c_int,
    pub terminated: c_int,
    /// Emulation layer private.
    pub taskobj: *mut c_void,
    /// Free for the driver to use.
    pub userdata: *mut c_void,
}

// Only touched from the cooperative scheduler on core 0.
unsafe impl Send for TaskStruct {}

impl TaskStruct {
    const fn empty() -> Self {
        Self {
            pid: -1,
            terminated: 0,
            taskobj: ptr::null_mut(),
            userdata: ptr::null_mut(),
        }
    }
}

const EMPTY_TASK: TaskStruct = TaskStruct::empty();

/// `task_struct` storage for every task a [`Runtime`] can schedule, indexed by task id.
pub struct TaskTable {
    tasks: NullLock<[TaskStruct; MAX_THREADS + 1]>,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            tasks: NullLock::new([EMPTY_TASK; MAX_THREADS + 1]),
        }
    }

    /// Stable pointer to the entry of `id`, null for ids outside the table.
    pub fn get(&self, id: TaskId) -> *mut TaskStruct {
        self.tasks.lock(|tasks| {
            tasks
                .get_mut(id.index())
                .map_or(ptr::null_mut(), |task| task as *mut TaskStruct)
        })
    }

    /// Fill in the entry of a freshly scheduled task.
    pub fn claim(&self, id: TaskId) -> *mut TaskStruct {
        self.tasks.lock(|tasks| match tasks.get_mut(id.index()) {
            Some(task) => {
                task.pid = id.get() as c_int;
                task.terminated = 0;
                task.taskobj = id.get() as usize as *mut c_void;
                task as *mut TaskStruct
            }
            None => ptr::null_mut(),
        })
    }

    pub fn mark_terminated(&self, id: TaskId) {
        self.tasks.lock(|tasks| {
            if let Some(task) = tasks.get_mut(id.index()) {
                task.terminated = 1;
            }
        });
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Task running right now, read directly by driver code.
#[allow(non_upper_case_globals)]
#[cfg_attr(target_os = "none", no_mangle)]
pub static mut current: *mut TaskStruct = ptr::null_mut();

fn on_switch(id: TaskId) {
    unsafe { current = super::runtime().tasks().get(id) };
}

fn on_termination(id: TaskId) {
    super::runtime().tasks().mark_terminated(id);
}

/// Hook the task table of `runtime` up to its scheduler. The boot context becomes pid 0.
pub(super) fn init(runtime: &'static Runtime) {
    runtime.tasks().claim(TaskId::BOOT);
    unsafe { current = runtime.tasks().get(TaskId::BOOT) };
    let scheduler = runtime.scheduler();
    scheduler.register_switch_handler(on_switch);
    scheduler.register_termination_handler(on_termination);
}

/// The `current` task as seen by Rust code.
pub fn current_task() -> *mut TaskStruct {
    unsafe { current }
}

/// Create a thread running `threadfn(data)`. It starts on the next scheduling round.
///
/// The name format arguments are accepted and ignored.
#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn kthread_create(
    threadfn: ThreadFn,
    data: *mut c_void,
    _namefmt: *const c_char,
) -> *mut TaskStruct {
    let runtime = super::runtime();
    let id = runtime.scheduler().create_thread(threadfn, data);
    runtime.tasks().claim(id)
}

/// Threads are runnable from creation, nothing to do.
#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn wake_up_process(_task: *mut TaskStruct) -> c_int {
    0
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn set_user_nice(_task: *mut TaskStruct, _nice: c_long) {}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn flush_signals(_task: *mut TaskStruct) {}
