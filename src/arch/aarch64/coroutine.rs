/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Stackful coroutines for emulated kernel threads.
//!
//! Every thread gets a statically reserved stack. Switching saves the AAPCS64 callee-saved
//! registers and the stack pointer of the outgoing context and loads those of the incoming
//! one, so a switch looks like an ordinary function call to both sides.

use {
    crate::sched::{TaskHooks, TaskId, ThreadFn, MAX_THREADS},
    core::{
        cell::{Cell, UnsafeCell},
        ffi::c_void,
        mem::size_of,
    },
    static_assertions::const_assert_eq,
};

/// Stack size of a single emulated kernel thread.
pub const STACK_SIZE: usize = 16 * 1024;

/// Callee-saved register file. Offsets are hardcoded in `linuxemu_switch_context`.
#[repr(C)]
#[derive(Copy, Clone)]
struct Context {
    /// x19 to x30, x30 being the link register.
    gpr: [u64; 12],
    sp: u64,
    /// d8 to d15.
    fpr: [u64; 8],
}

const_assert_eq!(size_of::<Context>(), 168);

impl Context {
    const fn zeroed() -> Self {
        Self {
            gpr: [0; 12],
            sp: 0,
            fpr: [0; 8],
        }
    }
}

#[derive(Copy, Clone)]
struct Coroutine {
    context: Context,
    entry: ThreadFn,
    arg: *mut c_void,
    finished: bool,
}

#[repr(C, align(16))]
#[derive(Copy, Clone)]
struct Stack([u8; STACK_SIZE]);

static mut STACKS: [Stack; MAX_THREADS] = [Stack([0; STACK_SIZE]); MAX_THREADS];

core::arch::global_asm!(
    r#"
.section .text.linuxemu_coroutine, "ax"
.global linuxemu_switch_context
.type linuxemu_switch_context, @function
linuxemu_switch_context:
    stp     x19, x20, [x0, #0]
    stp     x21, x22, [x0, #16]
    stp     x23, x24, [x0, #32]
    stp     x25, x26, [x0, #48]
    stp     x27, x28, [x0, #64]
    stp     x29, x30, [x0, #80]
    mov     x9, sp
    str     x9, [x0, #96]
    stp     d8, d9, [x0, #104]
    stp     d10, d11, [x0, #120]
    stp     d12, d13, [x0, #136]
    stp     d14, d15, [x0, #152]

    ldp     x19, x20, [x1, #0]
    ldp     x21, x22, [x1, #16]
    ldp     x23, x24, [x1, #32]
    ldp     x25, x26, [x1, #48]
    ldp     x27, x28, [x1, #64]
    ldp     x29, x30, [x1, #80]
    ldr     x9, [x1, #96]
    mov     sp, x9
    ldp     d8, d9, [x1, #104]
    ldp     d10, d11, [x1, #120]
    ldp     d12, d13, [x1, #136]
    ldp     d14, d15, [x1, #152]
    ret

// First activation of a coroutine lands here with x19 = backend, x20 = task id.
.global linuxemu_coroutine_trampoline
.type linuxemu_coroutine_trampoline, @function
linuxemu_coroutine_trampoline:
    mov     x0, x19
    mov     x1, x20
    bl      linuxemu_coroutine_main
1:  wfe
    b       1b
"#
);

extern "C" {
    fn linuxemu_switch_context(save: *mut Context, load: *const Context);
    fn linuxemu_coroutine_trampoline();
}

/// Coroutine backend. Lives as long as the scheduler owning it.
pub struct Coroutines {
    driver: UnsafeCell<Context>,
    slots: UnsafeCell<[Option<Coroutine>; MAX_THREADS]>,
    current: Cell<Option<TaskId>>,
}

// Single core, all access happens from the scheduler loop or the running coroutine.
unsafe impl Sync for Coroutines {}

impl Coroutines {
    pub const fn new() -> Self {
        Self {
            driver: UnsafeCell::new(Context::zeroed()),
            slots: UnsafeCell::new([None; MAX_THREADS]),
            current: Cell::new(None),
        }
    }

    fn slot(&self, id: TaskId) -> *mut Option<Coroutine> {
        let index = id.index() - 1;
        unsafe { (*self.slots.get()).as_mut_ptr().add(index) }
    }

    /// Prepare the coroutine for `id`, it starts running `entry(arg)` on its first resume.
    pub fn spawn(&'static self, id: TaskId, entry: ThreadFn, arg: *mut c_void) {
        let index = id.index() - 1;
        let stack_top = unsafe {
            let stack = core::ptr::addr_of_mut!(STACKS[index]);
            stack as usize + STACK_SIZE
        };
        let mut context = Context::zeroed();
        context.gpr[0] = self as *const Self as u64;
        context.gpr[1] = u64::from(id.get());
        context.gpr[11] = linuxemu_coroutine_trampoline as usize as u64;
        context.sp = stack_top as u64;

        unsafe {
            *self.slot(id) = Some(Coroutine {
                context,
                entry,
                arg,
                finished: false,
            });
        }
    }

    /// Run coroutine `id` until it yields or returns.
    pub fn resume(&self, id: TaskId, hooks: &dyn TaskHooks) {
        let slot = self.slot(id);
        let coroutine = match unsafe { (*slot).as_mut() } {
            Some(coroutine) if !coroutine.finished => coroutine as *mut Coroutine,
            _ => return,
        };

        self.current.set(Some(id));
        hooks.switched(id);
        unsafe {
            linuxemu_switch_context(self.driver.get(), &(*coroutine).context);
        }
        self.current.set(None);
        hooks.switched(TaskId::BOOT);

        if unsafe { (*coroutine).finished } {
            hooks.terminated(id);
        }
    }

    /// Give the processor back to the scheduler loop.
    pub fn suspend(&self) {
        let Some(id) = self.current.get() else {
            crate::bug!();
        };
        unsafe {
            if let Some(coroutine) = (*self.slot(id)).as_mut() {
                linuxemu_switch_context(&mut coroutine.context, self.driver.get());
            }
        }
    }

    /// Task whose coroutine is executing right now.
    pub fn current(&self) -> Option<TaskId> {
        self.current.get()
    }
}

#[no_mangle]
extern "C" fn linuxemu_coroutine_main(backend: &Coroutines, id: u64) {
    let id = TaskId::new(id as u32);
    let slot = backend.slot(id);
    unsafe {
        if let Some(coroutine) = (*slot).as_mut() {
            (coroutine.entry)(coroutine.arg);
            coroutine.finished = true;
            linuxemu_switch_context(&mut coroutine.context, backend.driver.get());
        }
    }
}
