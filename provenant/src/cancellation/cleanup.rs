//! Cleanup registry for run-scoped resources.
//!
//! Extractors register disposal callbacks for connections and other resources
//! they open; the orchestrator drains the registry during the cleanup stage,
//! on success and on failure alike.

use parking_lot::RwLock;
use std::time::Duration;
use tracing::warn;

struct CleanupCallback {
    callback: Box<dyn Fn() + Send + Sync>,
    name: String,
}

/// Registry for cleanup callbacks executed in LIFO order.
#[derive(Default)]
pub struct CleanupRegistry {
    callbacks: RwLock<Vec<CleanupCallback>>,
}

impl CleanupRegistry {
    /// Creates a new cleanup registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named cleanup callback.
    pub fn register<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.write().push(CleanupCallback {
            callback: Box::new(callback),
            name: name.into(),
        });
    }

    /// Removes a callback by name without running it.
    ///
    /// Returns true if a callback was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut callbacks = self.callbacks.write();
        let initial_len = callbacks.len();
        callbacks.retain(|cb| cb.name != name);
        callbacks.len() < initial_len
    }

    /// Runs all callbacks in LIFO order, draining the registry.
    ///
    /// Each callback gets a slice of the total timeout. Failures are logged
    /// and collected; they never stop the remaining callbacks.
    pub async fn run_all(&self, timeout_secs: f64) -> Vec<(String, String)> {
        let callbacks: Vec<CleanupCallback> = {
            let mut cbs = self.callbacks.write();
            std::mem::take(&mut *cbs)
        };

        if callbacks.is_empty() {
            return Vec::new();
        }

        let per_callback_timeout = (timeout_secs / callbacks.len() as f64).max(0.01);
        let mut failures = Vec::new();

        for entry in callbacks.into_iter().rev() {
            let name = entry.name.clone();

            let result = tokio::time::timeout(
                Duration::from_secs_f64(per_callback_timeout),
                tokio::task::spawn_blocking(move || {
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        (entry.callback)();
                    }))
                }),
            )
            .await;

            match result {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(panic))) => {
                    let msg = format!("cleanup callback panicked: {panic:?}");
                    warn!(callback = %name, "{msg}");
                    failures.push((name, msg));
                }
                Ok(Err(join_err)) => {
                    let msg = format!("cleanup task join error: {join_err}");
                    warn!(callback = %name, "{msg}");
                    failures.push((name, msg));
                }
                Err(_) => {
                    let msg = "cleanup callback timed out".to_string();
                    warn!(callback = %name, "{msg}");
                    failures.push((name, msg));
                }
            }
        }

        failures
    }

    /// Returns the number of pending callbacks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.callbacks.read().len()
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
