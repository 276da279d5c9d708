/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Cooperative round-robin scheduler for emulated kernel threads.
//!
//! The boot context (the caller of [`Scheduler::run`] or anyone yielding before any thread
//! exists) is task 0. Created threads get ids 1 to [`MAX_THREADS`] in creation order and are
//! never reused. A thread only loses the processor at an explicit yield point, so lock
//! primitives built on [`Yield`] are atomic between yields without any hardware support.

use {
    crate::{
        arch::coroutine::Coroutines,
        sync::{interface::Mutex, NullLock},
    },
    core::{
        ffi::{c_int, c_void},
        fmt,
        sync::atomic::{AtomicU32, Ordering},
    },
};

/// Upper bound on kernel threads created over the whole lifetime of the system.
pub const MAX_THREADS: usize = 16;

/// Thread entry point, as passed to `kthread_create`.
pub type ThreadFn = extern "C" fn(*mut c_void) -> c_int;

/// Callback fired on task switches and terminations.
pub type TaskHandler = fn(TaskId);

/// Scheduler-assigned task identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TaskId(u32);

impl TaskId {
    /// The boot context, running before and between kernel threads.
    pub const BOOT: TaskId = TaskId(0);

    pub const fn new(id: u32) -> Self {
        TaskId(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Voluntarily give up the processor.
///
/// Spin-wait loops in lock primitives call this between polls.
pub trait Yield {
    fn yield_now(&self);
}

/// Yield that only spins. Usable before a scheduler exists or from interrupt context.
pub struct SpinYield;

impl Yield for SpinYield {
    fn yield_now(&self) {
        crate::arch::cpu::spin_hint();
    }
}

/// Notifications from the coroutine backend back into the scheduler.
pub trait TaskHooks {
    /// `id` now owns the processor.
    fn switched(&self, id: TaskId);
    /// The entry function of `id` has returned.
    fn terminated(&self, id: TaskId);
}

/// Monotonic microsecond source used for sleeping.
pub trait Clock {
    /// Free-running microsecond counter, wraps at 2^32.
    fn now_us(&self) -> u32;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Runnable,
    Terminated,
}

#[derive(Copy, Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
}

struct TaskTable {
    next_id: u32,
    tasks: [Option<Task>; MAX_THREADS + 1],
}

impl TaskTable {
    const fn new() -> Self {
        let mut tasks = [None; MAX_THREADS + 1];
        tasks[0] = Some(Task {
            id: TaskId::BOOT,
            state: TaskState::Runnable,
        });
        Self { next_id: 1, tasks }
    }

    fn is_runnable(&self, id: TaskId) -> bool {
        matches!(
            self.tasks.get(id.index()),
            Some(Some(Task {
                state: TaskState::Runnable,
                ..
            }))
        )
    }
}

#[derive(Default)]
struct Handlers {
    switch: Option<TaskHandler>,
    termination: Option<TaskHandler>,
}

/// Round-robin scheduler over a fixed task table.
pub struct Scheduler {
    table: NullLock<TaskTable>,
    current: AtomicU32,
    handlers: NullLock<Handlers>,
    runner: Coroutines,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            table: NullLock::new(TaskTable::new()),
            current: AtomicU32::new(0),
            handlers: NullLock::new(Handlers {
                switch: None,
                termination: None,
            }),
            runner: Coroutines::new(),
        }
    }

    /// Create a runnable thread executing `entry(arg)` and return its id.
    ///
    /// The thread first runs on the next scheduling round. Creating more than
    /// [`MAX_THREADS`] threads is a fatal error.
    pub fn create_thread(&'static self, entry: ThreadFn, arg: *mut c_void) -> TaskId {
        let id = self.table.lock(|table| {
            let id = table.next_id as usize;
            bug_on!(id > MAX_THREADS);
            table.next_id += 1;
            table.tasks[id] = Some(Task {
                id: TaskId::new(id as u32),
                state: TaskState::Runnable,
                });
            TaskId::new(id as u32)
        });
        self.runner.spawn(id, entry, arg);
        debug!("created kernel thread {}", id);
        id
    }

    /// Task currently owning the processor.
    pub fn current(&self) -> TaskId {
        TaskId::new(self.current.load(Ordering::SeqCst))
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.table
            .lock(|table| table.tasks.get(id.index()).copied().flatten())
    }

    /// Number of created threads that have not terminated yet.
    pub fn live_threads(&self) -> usize {
        self.table.lock(|table| {
            table.tasks[1..]
                .iter()
                .flatten()
                .filter(|task| task.state == TaskState::Runnable)
                .count()
        })
    }

    /// Called with the new task id every time the processor changes hands.
    pub fn register_switch_handler(&self, handler: TaskHandler) {
        self.handlers.lock(|handlers| handlers.switch = Some(handler));
    }

    /// Called once with the task id when a thread entry function returns.
    pub fn register_termination_handler(&self, handler: TaskHandler) {
        self.handlers
            .lock(|handlers| handlers.termination = Some(handler));
    }

    /// Give every runnable thread one turn, in id order. Returns the number of threads
    /// that were resumed.
    pub fn run_once(&self) -> usize {
        let last = self.table.lock(|table| table.next_id);
        let mut resumed = 0;
        for id in (1..last).map(TaskId::new) {
            if self.table.lock(|table| table.is_runnable(id)) {
                self.runner.resume(id, self);
                resumed += 1;
            }
        }
        resumed
    }

    /// Schedule until every created thread has terminated.
    pub fn run(&self) {
        while self.run_once() > 0 {}
    }

    /// Cooperative sleep: other tasks run until `ms` milliseconds have passed on `clock`.
    pub fn sleep_ms(&self, clock: &dyn Clock, ms: u32) {
        let start = clock.now_us();
        let duration = ms.saturating_mul(1000);
        while clock.now_us().wrapping_sub(start) < duration {
            self.yield_now();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Yield for Scheduler {
    /// From a thread: switch back to the scheduler loop. From the boot context: run one
    /// round of all runnable threads, so spin loops in boot code still make progress.
    fn yield_now(&self) {
        if self.runner.current().is_some() {
            self.runner.suspend();
        } else {
            self.run_once();
        }
    }
}

impl TaskHooks for Scheduler {
    fn switched(&self, id: TaskId) {
        self.current.store(id.get(), Ordering::SeqCst);
        if let Some(handler) = self.handlers.lock(|handlers| handlers.switch) {
            handler(id);
        }
    }

    fn terminated(&self, id: TaskId) {
        self.table.lock(|table| {
            if let Some(Some(task)) = table.tasks.get_mut(id.index()) {
                task.state = TaskState::Terminated;
            }
        });
        debug!("kernel thread {} terminated", id);
        if let Some(handler) = self.handlers.lock(|handlers| handlers.termination) {
            handler(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        core::sync::atomic::{AtomicUsize, Ordering},
        std::sync::Mutex as StdMutex,
    };

    fn scheduler() -> &'static Scheduler {
        Box::leak(Box::new(Scheduler::new()))
    }

    struct Trace {
        sched: &'static Scheduler,
        log: StdMutex<Vec<(u32, u32)>>,
        rounds: u32,
    }

    extern "C" fn tracer(arg: *mut c_void) -> c_int {
        let trace = unsafe { &*(arg as *const Trace) };
        for round in 0..trace.rounds {
            let me = trace.sched.current().get();
            trace.log.lock().unwrap().push((me, round));
            trace.sched.yield_now();
        }
        0
    }

    extern "C" fn noop(_arg: *mut c_void) -> c_int {
        0
    }

    #[test]
    fn threads_run_round_robin_in_creation_order() {
        let sched = scheduler();
        let trace: &'static Trace = Box::leak(Box::new(Trace {
            sched,
            log: StdMutex::new(Vec::new()),
            rounds: 3,
        }));
        let arg = trace as *const Trace as *mut c_void;
        assert_eq!(sched.create_thread(tracer, arg), TaskId::new(1));
        assert_eq!(sched.create_thread(tracer, arg), TaskId::new(2));
        assert_eq!(sched.live_threads(), 2);

        sched.run();

        let log = trace.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![(1, 0), (2, 0), (1, 1), (2, 1), (1, 2), (2, 2)]
        );
        assert_eq!(sched.live_threads(), 0);
        assert_eq!(sched.current(), TaskId::BOOT);
        assert_eq!(sched.task(TaskId::new(1)).unwrap().state, TaskState::Terminated);
    }

    #[test]
    fn yield_from_boot_context_runs_one_round() {
        let sched = scheduler();
        let trace: &'static Trace = Box::leak(Box::new(Trace {
            sched,
            log: StdMutex::new(Vec::new()),
            rounds: 2,
        }));
        sched.create_thread(tracer, trace as *const Trace as *mut c_void);

        sched.yield_now();
        assert_eq!(trace.log.lock().unwrap().len(), 1);
        assert_eq!(sched.current(), TaskId::BOOT);
        sched.yield_now();
        sched.yield_now();
        assert_eq!(trace.log.lock().unwrap().len(), 2);
        assert_eq!(sched.live_threads(), 0);
    }

    #[test]
    fn sixteen_threads_fit() {
        let sched = scheduler();
        for expected in 1..=MAX_THREADS as u32 {
            assert_eq!(
                sched.create_thread(noop, core::ptr::null_mut()),
                TaskId::new(expected)
            );
        }
        sched.run();
        assert_eq!(sched.live_threads(), 0);
    }

    #[test]
    #[should_panic]
    fn seventeenth_thread_is_fatal() {
        let sched = scheduler();
        for _ in 0..=MAX_THREADS {
            sched.create_thread(noop, core::ptr::null_mut());
        }
    }

    static SWITCHES: AtomicUsize = AtomicUsize::new(0);
    static TERMINATIONS: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn handlers_observe_switches_and_terminations() {
        let sched = scheduler();
        sched.register_switch_handler(|_| {
            SWITCHES.fetch_add(1, Ordering::SeqCst);
        });
        sched.register_termination_handler(|id| {
            assert_eq!(id, TaskId::new(1));
            TERMINATIONS.fetch_add(1, Ordering::SeqCst);
        });
        sched.create_thread(noop, core::ptr::null_mut());
        sched.run();
        sched.run();

        // Into the thread and back to boot.
        assert_eq!(SWITCHES.load(Ordering::SeqCst), 2);
        assert_eq!(TERMINATIONS.load(Ordering::SeqCst), 1);
    }

    struct TickingClock(AtomicU32);

    impl Clock for TickingClock {
        fn now_us(&self) -> u32 {
            self.0.fetch_add(250, Ordering::SeqCst)
        }
    }

    struct Counter {
        sched: &'static Scheduler,
        clock: TickingClock,
        ticks: AtomicUsize,
    }

    extern "C" fn counting_sleeper(arg: *mut c_void) -> c_int {
        let counter = unsafe { &*(arg as *const Counter) };
        counter.sched.sleep_ms(&counter.clock, 2);
        0
    }

    extern "C" fn ticker(arg: *mut c_void) -> c_int {
        let counter = unsafe { &*(arg as *const Counter) };
        while counter.sched.live_threads() > 1 {
            counter.ticks.fetch_add(1, Ordering::SeqCst);
            counter.sched.yield_now();
        }
        0
    }

    #[test]
    fn sleeping_thread_lets_others_run() {
        let sched = scheduler();
        let counter: &'static Counter = Box::leak(Box::new(Counter {
            sched,
            // Start close to the wrap point, the deadline must survive it.
            clock: TickingClock(AtomicU32::new(u32::MAX - 1000)),
            ticks: AtomicUsize::new(0),
        }));
        let arg = counter as *const Counter as *mut c_void;
        sched.create_thread(counting_sleeper, arg);
        sched.create_thread(ticker, arg);
        sched.run();

        assert!(counter.ticks.load(Ordering::SeqCst) >= 6);
    }
}
