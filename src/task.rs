//! Background execution of load requests.
//!
//! One worker thread per task; the terminal outcome travels over a
//! single-shot channel that the interactive side polls or blocks on, so no
//! callback ever reaches into shared mutable state. Cancellation is
//! cooperative: the flag is checked between phases, a cancelled task sends
//! only the Cancelled marker and its temp downloads die with the dropped
//! result. At most one load task runs per (item id, asset key) pair.

use crate::core::materializer::LayerMaterializer;
use crate::io::kerchunk;
use crate::io::metadata_xml::MetadataXmlFetcher;
use crate::types::{
    CancelToken, Item, LoadRequest, LoadResult, RastacError, RastacResult, VariableDescriptor,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex, RwLock};

/// Lifecycle of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    fn from_u8(value: u8) -> TaskState {
        match value {
            0 => TaskState::Queued,
            1 => TaskState::Running,
            2 => TaskState::Succeeded,
            3 => TaskState::Failed,
            _ => TaskState::Cancelled,
        }
    }
}

/// Terminal result of a task. Cancelled is not a failure: it carries no
/// error and the interactive side treats it as "do nothing".
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(String),
    Cancelled,
}

/// Handle held by the interactive side while a task runs.
pub struct TaskHandle<T> {
    name: String,
    progress: Arc<AtomicU8>,
    state: Arc<AtomicU8>,
    cancel: CancelToken,
    receiver: Receiver<TaskOutcome<T>>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Monotonic 0-100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Request cancellation; the task honors it at its next phase check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Non-blocking poll for the terminal outcome.
    pub fn try_outcome(&self) -> Option<TaskOutcome<T>> {
        self.receiver.try_recv().ok()
    }

    /// Block until the task reaches a terminal state.
    pub fn wait(self) -> TaskOutcome<T> {
        self.receiver.recv().unwrap_or(TaskOutcome::Cancelled)
    }
}

/// Removes the (item, asset) slot when the worker exits, on every path.
struct SlotGuard {
    in_flight: Arc<Mutex<HashSet<(String, String)>>>,
    key: (String, String),
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.in_flight.lock() {
            slots.remove(&self.key);
        }
    }
}

/// Schedules materialization and kerchunk prefetch off the interactive
/// thread.
pub struct TaskRunner {
    in_flight: Arc<Mutex<HashSet<(String, String)>>>,
    io_lock: Arc<RwLock<()>>,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner {
    pub fn new() -> Self {
        TaskRunner {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            io_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Lock shared with the GDAL configuration scope: tasks hold it for
    /// reading while they run, config mutation takes it for writing.
    pub(crate) fn io_lock(&self) -> Arc<RwLock<()>> {
        Arc::clone(&self.io_lock)
    }

    /// Spawn a full load task for one asset.
    ///
    /// Rejects the spawn while another task for the same
    /// (item id, asset key) pair is still in flight.
    pub fn spawn_load(
        &self,
        request: LoadRequest,
        metadata_xml_fetcher: Arc<dyn MetadataXmlFetcher>,
    ) -> RastacResult<TaskHandle<LoadResult>> {
        let key = (request.item.id.clone(), request.asset_key.clone());
        {
            let mut slots = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !slots.insert(key.clone()) {
                return Err(RastacError::DuplicateTask(format!(
                    "{}/{}",
                    key.0, key.1
                )));
            }
        }

        let name = format!("Loading {}/{}", request.item.id, request.asset_key);
        log::info!("[Task] Starting background load for {}/{}", key.0, key.1);

        let progress = Arc::new(AtomicU8::new(0));
        let state = Arc::new(AtomicU8::new(TaskState::Queued as u8));
        let cancel = CancelToken::new();
        let (sender, receiver) = sync_channel::<TaskOutcome<LoadResult>>(1);

        let guard = SlotGuard {
            in_flight: Arc::clone(&self.in_flight),
            key,
        };
        let io_lock = Arc::clone(&self.io_lock);
        let worker_progress = Arc::clone(&progress);
        let worker_state = Arc::clone(&state);
        let worker_cancel = cancel.clone();

        std::thread::spawn(move || {
            let _slot = guard;
            let _io = io_lock.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            worker_state.store(TaskState::Running as u8, Ordering::SeqCst);

            let mut report = |percent: u8| {
                // Keep progress monotonic whatever the phases report
                worker_progress.fetch_max(percent.min(100), Ordering::SeqCst);
            };

            let outcome = run_load(&request, metadata_xml_fetcher.as_ref(), &mut report, &worker_cancel);

            let terminal_state = match &outcome {
                TaskOutcome::Completed(_) => {
                    worker_progress.store(100, Ordering::SeqCst);
                    TaskState::Succeeded
                }
                TaskOutcome::Failed(error) => {
                    log::warn!("[Task] Error: {}", error);
                    TaskState::Failed
                }
                TaskOutcome::Cancelled => TaskState::Cancelled,
            };
            worker_state.store(terminal_state as u8, Ordering::SeqCst);
            let _ = sender.send(outcome);
        });

        Ok(TaskHandle {
            name,
            progress,
            state,
            cancel,
            receiver,
        })
    }

    /// Spawn the lighter kerchunk-only prefetch for an item.
    ///
    /// Fetches and parses the reference document so variable-selection UI
    /// can render before any download is committed. An item without a
    /// kerchunk reference completes with an empty list.
    pub fn spawn_kerchunk_prefetch(&self, item: Item) -> TaskHandle<Vec<VariableDescriptor>> {
        let name = format!("Fetching kerchunk for {}", item.id);
        let progress = Arc::new(AtomicU8::new(0));
        let state = Arc::new(AtomicU8::new(TaskState::Queued as u8));
        let cancel = CancelToken::new();
        let (sender, receiver) = sync_channel::<TaskOutcome<Vec<VariableDescriptor>>>(1);

        let io_lock = Arc::clone(&self.io_lock);
        let worker_progress = Arc::clone(&progress);
        let worker_state = Arc::clone(&state);
        let worker_cancel = cancel.clone();

        std::thread::spawn(move || {
            let _io = io_lock.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            worker_state.store(TaskState::Running as u8, Ordering::SeqCst);

            let outcome = if worker_cancel.is_cancelled() {
                TaskOutcome::Cancelled
            } else {
                let variables = kerchunk::find_reference(&item)
                    .map(|(href, document)| {
                        log::info!("Found kerchunk reference: {}", href);
                        document.extract_variables()
                    })
                    .unwrap_or_default();
                if worker_cancel.is_cancelled() {
                    TaskOutcome::Cancelled
                } else {
                    TaskOutcome::Completed(variables)
                }
            };

            let terminal_state = match &outcome {
                TaskOutcome::Completed(_) => {
                    worker_progress.store(100, Ordering::SeqCst);
                    TaskState::Succeeded
                }
                TaskOutcome::Failed(_) => TaskState::Failed,
                TaskOutcome::Cancelled => TaskState::Cancelled,
            };
            worker_state.store(terminal_state as u8, Ordering::SeqCst);
            let _ = sender.send(outcome);
        });

        TaskHandle {
            name,
            progress,
            state,
            cancel,
            receiver,
        }
    }
}

/// Execute the load and fold every exit into a terminal outcome.
fn run_load(
    request: &LoadRequest,
    metadata_xml_fetcher: &dyn MetadataXmlFetcher,
    progress: &mut dyn FnMut(u8),
    cancel: &CancelToken,
) -> TaskOutcome<LoadResult> {
    match LayerMaterializer::load(request, metadata_xml_fetcher, progress, cancel) {
        Ok(result) => {
            if cancel.is_cancelled() {
                // Dropping the result here deletes any temp downloads
                return TaskOutcome::Cancelled;
            }
            if result.layers.is_empty() {
                let detail = if result.errors.is_empty() {
                    String::new()
                } else {
                    format!(": {}", result.errors.join("; "))
                };
                return TaskOutcome::Failed(format!(
                    "No valid layers created for {}{}",
                    request.asset_key, detail
                ));
            }
            log::info!("[Task] Finished loading {} layer(s)", result.layers.len());
            TaskOutcome::Completed(result)
        }
        Err(RastacError::TaskCancelled) => TaskOutcome::Cancelled,
        Err(e) => TaskOutcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_round_trips_through_u8() {
        for state in [
            TaskState::Queued,
            TaskState::Running,
            TaskState::Succeeded,
            TaskState::Failed,
            TaskState::Cancelled,
        ] {
            assert_eq!(TaskState::from_u8(state as u8), state);
        }
    }
}
