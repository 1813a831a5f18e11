use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Blocks `SIGINT` on the calling thread — inherited by every thread spawned
/// afterward, including the worker pool — and spawns a dedicated watcher
/// thread that waits on it synchronously via `sigwait`. This is the
/// POSIX-blessed way to turn an asynchronous signal into an ordinary
/// blocking wait without writing an async-signal-unsafe handler body (the
/// realization Design Note "Global ambient state" and §5's cancellation
/// model call for, since there is no `tokio::signal::ctrl_c()` here: the
/// container/process layers in this crate are synchronous, not
/// Tokio-driven).
///
/// Every `SIGINT` received flips `cancel` to `true`. [`crate::Runner`]
/// resets it back to `false` once an interrupt episode is resolved (the
/// operator chose to keep going), so a later `Ctrl-C` is observable again.
#[cfg(unix)]
pub fn watch_sigint(cancel: Arc<AtomicBool>) {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }

    std::thread::spawn(move || {
        let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
        unsafe {
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGINT);
        }
        loop {
            let mut sig: libc::c_int = 0;
            // SAFETY: `set` contains only SIGINT and was blocked above on
            // the thread that called `watch_sigint`; `sigwait` is a plain
            // blocking call, not a signal handler.
            let ret = unsafe { libc::sigwait(&set, &mut sig) };
            if ret != 0 {
                break;
            }
            cancel.store(true, Ordering::SeqCst);
        }
    });
}

#[cfg(not(unix))]
pub fn watch_sigint(_cancel: Arc<AtomicBool>) {
    // No POSIX signal handling off Unix; callers can still cancel a run
    // explicitly through the `Runner`'s own API.
}
