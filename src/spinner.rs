//! Client-side wait indicator for the slow remote call. Runs on its own
//! thread and never touches protocol or daemon state.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

static SPINNER_ACTIVE: AtomicBool = AtomicBool::new(false);
static SPINNER_HANDLE: Mutex<Option<std::thread::JoinHandle<()>>> = Mutex::new(None);

const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn show() {
    let handle = std::thread::spawn(move || {
        let mut i = 0;
        while SPINNER_ACTIVE.load(Ordering::SeqCst) {
            eprint!(
                "\r\x1b[2m{} waiting for API response...\x1b[0m",
                FRAMES[i % FRAMES.len()]
            );
            io::stderr().flush().ok();
            i += 1;
            std::thread::sleep(std::time::Duration::from_millis(80));
        }
    });
    if let Ok(mut guard) = SPINNER_HANDLE.lock() {
        *guard = Some(handle);
    }
}

fn hide() {
    SPINNER_ACTIVE.store(false, Ordering::SeqCst);
    if let Ok(mut guard) = SPINNER_HANDLE.lock() {
        if let Some(handle) = guard.take() {
            let _ = handle.join();
        }
    }
    eprint!("\r\x1b[K");
    io::stderr().flush().ok();
}

/// RAII spinner: starts on construction unless one is already running,
/// clears the line on drop.
pub struct SpinnerGuard {
    did_start: bool,
}

impl SpinnerGuard {
    pub fn new() -> Self {
        let was_inactive = SPINNER_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if was_inactive {
            show();
        }
        Self {
            did_start: was_inactive,
        }
    }
}

impl Default for SpinnerGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpinnerGuard {
    fn drop(&mut self) {
        if self.did_start {
            hide();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_guards_share_one_spinner() {
        // Other tests may hold the global spinner concurrently, so only
        // assert the relative property: nested guards never both own it.
        let outer = SpinnerGuard::new();
        let inner = SpinnerGuard::new();
        assert!(!(outer.did_start && inner.did_start));
        drop(inner);
        drop(outer);
    }
}
