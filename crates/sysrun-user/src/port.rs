use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::Mutex;

/// Hands out TCP ports that are not currently held by any other caller of
/// the *same* allocator, so that two tests running concurrently against one
/// allocator never race for the same port even if the OS would otherwise
/// let both bind it in quick succession. One allocator is typically shared
/// for the whole run (held by `sysrun-runner` and handed to every
/// `ProcessUser`).
#[derive(Default)]
pub struct TcpPortAllocator {
    held: Mutex<HashSet<u16>>,
}

impl TcpPortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an ephemeral port to get one the OS currently considers free,
    /// then mark it held so no other caller of this allocator is handed the
    /// same port before [`release`](Self::release) is called. The listener
    /// itself is dropped immediately — sysrun doesn't keep the bind open,
    /// it just uses the OS's ephemeral-port assignment as a source of "free
    /// right now" port numbers.
    pub fn allocate(&self) -> std::io::Result<u16> {
        loop {
            let listener = TcpListener::bind(("127.0.0.1", 0))?;
            let port = listener.local_addr()?.port();
            drop(listener);

            let mut held = self.held.lock().expect("port allocator mutex poisoned");
            if held.insert(port) {
                return Ok(port);
            }
            // Another caller already holds this exact port (rare OS
            // re-assignment race); loop and try again.
        }
    }

    /// Return a previously allocated port to the pool. Called from
    /// [`crate::ProcessUser::cleanup`].
    pub fn release(&self, port: u16) {
        self.held.lock().expect("port allocator mutex poisoned").remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ports_are_distinct_until_released() {
        let allocator = TcpPortAllocator::new();
        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        assert_ne!(a, b);
        allocator.release(a);
        allocator.release(b);
    }
}
