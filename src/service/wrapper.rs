//! Runs one [`Service`] on its own tokio task.
//!
//! The wrapper owns the service's output buffer and cancellation signal.
//! `stop()` cancels and then joins, so no background work survives it.
//! Whatever way the task ends — clean return, error, panic — the
//! registered `on_quit` hook fires exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::core::output::{OutputBuffer, OutputEntry};

use super::Service;

/// Value of [`ServiceWrapper::sid`] before `start()` has run.
pub const SID_UNSTARTED: u64 = 0;

/// Service ids are process-wide and never reused, so a sid can never be
/// registered twice concurrently.
static NEXT_SID: AtomicU64 = AtomicU64::new(1);

type QuitHook = Arc<dyn Fn(u64) + Send + Sync>;

pub struct ServiceWrapper {
    service: Arc<dyn Service>,
    output: Arc<OutputBuffer>,
    cancel: CancellationToken,
    sid: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
    on_quit: Mutex<Option<QuitHook>>,
}

impl ServiceWrapper {
    pub fn new(service: Arc<dyn Service>, buffer_capacity: usize) -> Self {
        Self::with_stop_signal(service, buffer_capacity, CancellationToken::new())
    }

    /// Wraps a service around a caller-supplied stop signal instead of a
    /// fresh one.
    pub fn with_stop_signal(
        service: Arc<dyn Service>,
        buffer_capacity: usize,
        stop_signal: CancellationToken,
    ) -> Self {
        Self {
            service,
            output: Arc::new(OutputBuffer::new(buffer_capacity)),
            cancel: stop_signal,
            sid: AtomicU64::new(SID_UNSTARTED),
            handle: Mutex::new(None),
            on_quit: Mutex::new(None),
        }
    }

    /// Registers the hook invoked (with the sid) when the task ends.
    pub fn set_on_quit<F>(&self, hook: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        *self.on_quit.lock().expect("on_quit lock poisoned") = Some(Arc::new(hook));
    }

    /// Spawns the service task and returns its sid.
    pub fn start(&self) -> u64 {
        let sid = NEXT_SID.fetch_add(1, Ordering::Relaxed);
        self.sid.store(sid, Ordering::SeqCst);

        let service = Arc::clone(&self.service);
        let output = Arc::clone(&self.output);
        let cancel = self.cancel.clone();
        let on_quit = self.on_quit.lock().expect("on_quit lock poisoned").clone();
        let name = self.service.name();

        debug!(target: "mqprobe::service", sid, name = %name, "starting service");
        let handle = tokio::spawn(async move {
            // Inner spawn so a panicking service still reaches on_quit.
            let inner: JoinHandle<anyhow::Result<()>> =
                tokio::spawn(async move { service.run(output, cancel).await });
            match inner.await {
                Ok(Ok(())) => debug!(target: "mqprobe::service", sid, "service finished"),
                Ok(Err(err)) => {
                    error!(target: "mqprobe::service", sid, error = %err, "service failed")
                }
                Err(join_err) => {
                    error!(target: "mqprobe::service", sid, error = %join_err, "service panicked")
                }
            }
            if let Some(hook) = on_quit {
                hook(sid);
            }
        });
        *self.handle.lock().expect("handle lock poisoned") = Some(handle);
        sid
    }

    /// Cancels the service and waits for its task to fully terminate.
    pub async fn stop(&self) {
        let sid = self.sid();
        debug!(target: "mqprobe::service", sid, "stopping service");
        self.cancel.cancel();
        let handle = self.handle.lock().expect("handle lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Drains the owned output buffer, most-recent-first.
    pub fn flush_output(&self) -> Vec<OutputEntry> {
        self.output.flush()
    }

    pub fn is_alive(&self) -> bool {
        self.handle
            .lock()
            .expect("handle lock poisoned")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stable service id; [`SID_UNSTARTED`] until `start()` has run.
    pub fn sid(&self) -> u64 {
        self.sid.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> String {
        self.service.name()
    }

    pub fn stop_signal(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
