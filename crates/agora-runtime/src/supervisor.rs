//! Fire-and-forget tasks that are still accounted for.
//!
//! Every detached unit runs inside a wrapper that logs how it ended and
//! swallows both errors and panics, so nothing fired from a cycle can take
//! the caller down. The supervisor counts what is in flight.

use agora_core::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Default)]
struct Inner {
    in_flight: AtomicUsize,
    idle: Notify,
}

#[derive(Clone, Default)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

/// Handle to one supervised task.
pub struct SupervisedTask {
    label: String,
    handle: JoinHandle<bool>,
}

impl SupervisedTask {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the task. `true` when it returned `Ok`.
    pub async fn join(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}

/// Decrements the counter however the task ends, abort included.
struct InFlight(Arc<Inner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, label: impl Into<String>, fut: F) -> SupervisedTask
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let label = label.into();
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlight(Arc::clone(&self.inner));
        let task_label = label.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {
                    debug!(task = %task_label, "supervised task finished");
                    true
                }
                Ok(Err(e)) => {
                    warn!(task = %task_label, error = %e, "supervised task failed");
                    false
                }
                Err(panic) => {
                    error!(task = %task_label, reason = %panic_message(&*panic), "supervised task panicked");
                    false
                }
            }
        });
        SupervisedTask { label, handle }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once nothing is in flight.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a wakeup in between is not lost.
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::AgoraError;

    #[tokio::test]
    async fn test_join_reports_outcome() {
        let sup = TaskSupervisor::new();
        let ok = sup.spawn("ok", async { Ok(()) });
        let err = sup.spawn("err", async { Err(AgoraError::Engine("boom".into())) });
        assert!(ok.join().await);
        assert!(!err.join().await);
        sup.wait_idle().await;
        assert_eq!(sup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let sup = TaskSupervisor::new();
        let task = sup.spawn("panics", async {
            if sup_always() {
                panic!("handler blew up");
            }
            Ok(())
        });
        assert!(!task.join().await);
        assert_eq!(sup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_slow_tasks() {
        let sup = TaskSupervisor::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let _task = sup.spawn("slow", async move {
            let _ = rx.await;
            Ok(())
        });
        assert_eq!(sup.in_flight(), 1);
        tx.send(()).ok();
        sup.wait_idle().await;
        assert_eq!(sup.in_flight(), 0);
    }

    fn sup_always() -> bool {
        true
    }
}
