use std::cell::Cell;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::{debug, warn};

use crate::runtime::LuaRuntime;

/// VM instructions between two looks at the interrupt flag
pub const INTERRUPT_CHECK_INTERVAL: u32 = 1000;

/// Flag of the innermost guarded call; the only state the signal handler touches
static ACTIVE_FLAG: AtomicPtr<AtomicBool> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_interrupt(_signal: libc::c_int) {
    // A second SIGINT before the runtime reaches a safe point kills the process
    unsafe {
        let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
    }
    let flag = ACTIVE_FLAG.load(Ordering::SeqCst);
    if !flag.is_null() {
        unsafe { (*flag).store(true, Ordering::SeqCst) };
    }
}

/// Cooperative interrupt shared between the SIGINT handler and the runtime's safe points
pub struct InterruptHook {
    requested: Arc<AtomicBool>,
    observed: Arc<AtomicBool>,
    depth: Cell<usize>,
}

impl InterruptHook {
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            observed: Arc::new(AtomicBool::new(false)),
            depth: Cell::new(0),
        }
    }

    /// Arm the hook for one guarded call; everything is undone when the scope drops
    pub fn enter<'a>(&'a self, runtime: &'a LuaRuntime) -> InterruptScope<'a> {
        let outermost = self.depth.get() == 0;
        self.depth.set(self.depth.get() + 1);

        if outermost {
            self.requested.store(false, Ordering::SeqCst);
            self.observed.store(false, Ordering::SeqCst);

            let requested = Arc::clone(&self.requested);
            let observed = Arc::clone(&self.observed);
            runtime.install_safe_point(INTERRUPT_CHECK_INTERVAL, move || {
                if requested.swap(false, Ordering::SeqCst) {
                    observed.store(true, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            });
        }

        // Publish the flag before the handler can run
        let previous_flag = ACTIVE_FLAG.swap(
            Arc::as_ptr(&self.requested) as *mut AtomicBool,
            Ordering::SeqCst,
        );

        let action = SigAction::new(
            SigHandler::Handler(on_interrupt),
            SaFlags::empty(),
            SigSet::empty(),
        );
        let previous_action = match unsafe { signal::sigaction(Signal::SIGINT, &action) } {
            Ok(previous) => Some(previous),
            Err(err) => {
                warn!(%err, "could not install SIGINT handler");
                None
            }
        };

        debug!(depth = self.depth.get(), "interrupt hook armed");
        InterruptScope {
            hook: self,
            runtime,
            outermost,
            previous_flag,
            previous_action,
        }
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// The flag the SIGINT handler sets, for raising an interrupt without a signal
    #[cfg(test)]
    pub fn request_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.requested)
    }
}

impl Default for InterruptHook {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifetime of one armed guarded call
pub struct InterruptScope<'a> {
    hook: &'a InterruptHook,
    runtime: &'a LuaRuntime,
    outermost: bool,
    previous_flag: *mut AtomicBool,
    previous_action: Option<SigAction>,
}

impl InterruptScope<'_> {
    /// Whether a safe point turned a pending interrupt into an error during this call
    pub fn take_observed(&self) -> bool {
        let observed = self.hook.observed.swap(false, Ordering::SeqCst);
        if observed {
            debug!("interrupt observed at a safe point");
        }
        observed
    }
}

impl Drop for InterruptScope<'_> {
    fn drop(&mut self) {
        // Restore the disposition first so a late signal never sees a stale flag
        if let Some(previous) = &self.previous_action
            && let Err(err) = unsafe { signal::sigaction(Signal::SIGINT, previous) }
        {
            warn!(%err, "could not restore SIGINT handler");
        }
        ACTIVE_FLAG.store(self.previous_flag, Ordering::SeqCst);

        self.hook.depth.set(self.hook.depth.get() - 1);
        if self.outermost {
            self.runtime.remove_safe_point();
            self.hook.requested.store(false, Ordering::SeqCst);
        }
    }
}
