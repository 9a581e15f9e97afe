//! Background monitor that keeps the list of blocking applications current.
//!
//! The service polls the process table on a worker thread, matches it
//! against its definitions and raises a change notification whenever the
//! set of running applications changes. Consumers can either register a
//! callback or hold a `tokio::sync::watch` receiver.

use crate::caller::CallerContext;
use crate::cancel::CancellationToken;
use crate::config::ProcessMonitorConfig;
use crate::error::{DeployError, Result};
use crate::process::definition::{group_by_description, ProcessDefinition, ProcessToClose, RunningProcess};
use crate::process::introspect::{ProcessIntrospector, ProcessSource, SystemProcessSource};
use crate::process::matcher::find_running_processes;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Payload of the change notification.
#[derive(Debug, Clone)]
pub struct ProcessesToCloseChanged {
    pub processes_to_close: Arc<[ProcessToClose]>,
}

type ChangeHandler = Arc<dyn Fn(&ProcessesToCloseChanged) + Send + Sync>;

struct Snapshot {
    running: Arc<[RunningProcess]>,
    to_close: Arc<[ProcessToClose]>,
    /// Descriptions seen by the previous poll of the current run.
    last_descriptions: Option<Vec<String>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            running: Arc::from(Vec::new()),
            to_close: Arc::from(Vec::new()),
            last_descriptions: None,
        }
    }
}

struct Shared {
    definitions: Vec<ProcessDefinition>,
    source: Arc<dyn ProcessSource>,
    caller: CallerContext,
    recompute_lock: Mutex<()>,
    snapshot: Mutex<Snapshot>,
    handlers: Mutex<Vec<ChangeHandler>>,
    feed: watch::Sender<Arc<[ProcessToClose]>>,
}

impl Shared {
    /// Refresh both cached lists. Only this step is serialized.
    fn recompute(&self) -> (Arc<[RunningProcess]>, Arc<[ProcessToClose]>) {
        let _guard = self
            .recompute_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let introspector = ProcessIntrospector::for_cycle(self.source.as_ref());
        let running: Arc<[RunningProcess]> =
            find_running_processes(&introspector, &self.definitions, &self.caller).into();
        let to_close: Arc<[ProcessToClose]> = group_by_description(&running).into();

        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot.running = running.clone();
        snapshot.to_close = to_close.clone();
        (running, to_close)
    }

    /// One iteration of the worker loop.
    fn poll(&self) {
        let (_, to_close) = self.recompute();
        let descriptions: Vec<String> = to_close.iter().map(|p| p.description.clone()).collect();

        let changed = {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = snapshot.last_descriptions.as_ref() != Some(&descriptions);
            snapshot.last_descriptions = Some(descriptions);
            changed
        };
        if !changed {
            return;
        }

        debug!("Processes to close changed: {} entries", to_close.len());
        self.feed.send_replace(to_close.clone());
        let event = ProcessesToCloseChanged {
            processes_to_close: to_close,
        };
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for handler in handlers {
            handler(&event);
        }
    }
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Polls for running processes that match a set of definitions.
pub struct RunningProcessService {
    shared: Arc<Shared>,
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl RunningProcessService {
    /// Create a service backed by the live process table.
    pub fn new(
        definitions: Vec<ProcessDefinition>,
        interval: Duration,
        caller: CallerContext,
    ) -> Result<Self> {
        Self::with_source(definitions, interval, caller, Arc::new(SystemProcessSource::new()))
    }

    /// Create a service with the default one-second interval.
    pub fn with_default_interval(
        definitions: Vec<ProcessDefinition>,
        caller: CallerContext,
    ) -> Result<Self> {
        Self::new(definitions, ProcessMonitorConfig::DEFAULT_POLL_INTERVAL, caller)
    }

    /// Create a service over an arbitrary process source.
    pub fn with_source(
        definitions: Vec<ProcessDefinition>,
        interval: Duration,
        caller: CallerContext,
        source: Arc<dyn ProcessSource>,
    ) -> Result<Self> {
        if definitions.is_empty() {
            return Err(DeployError::validation(
                "definitions",
                "at least one process definition is required",
            ));
        }
        if interval.is_zero() {
            return Err(DeployError::validation(
                "interval",
                "poll interval must be greater than zero",
            ));
        }

        let (feed, _) = watch::channel(Arc::<[ProcessToClose]>::from(Vec::new()));
        Ok(Self {
            shared: Arc::new(Shared {
                definitions,
                source,
                caller,
                recompute_lock: Mutex::new(()),
                snapshot: Mutex::new(Snapshot::default()),
                handlers: Mutex::new(Vec::new()),
                feed,
            }),
            interval,
            worker: Mutex::new(None),
        })
    }

    pub fn definitions(&self) -> &[ProcessDefinition] {
        &self.shared.definitions
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the background poll loop is running.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start polling. The first poll always raises a change notification.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(DeployError::invalid_state("the process monitor is already running"));
        }

        self.shared
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_descriptions = None;

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let shared = self.shared.clone();
        let interval = self.interval;
        let handle = std::thread::Builder::new()
            .name("process-monitor".into())
            .spawn(move || {
                while !loop_token.is_cancelled() {
                    shared.poll();
                    if loop_token.wait_timeout(interval) {
                        break;
                    }
                }
            })?;

        info!(
            "Process monitor started for {} definitions every {:?}",
            self.shared.definitions.len(),
            interval
        );
        *worker = Some(Worker { token, handle });
        Ok(())
    }

    /// Stop polling and wait for the worker to finish.
    pub fn stop(&self) -> Result<()> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| DeployError::invalid_state("the process monitor is not running"))?;

        worker.token.cancel();
        if worker.handle.join().is_err() {
            warn!("Process monitor worker panicked");
        }
        info!("Process monitor stopped");
        Ok(())
    }

    /// Re-poll now and return every matching process.
    pub fn running_processes(&self) -> Arc<[RunningProcess]> {
        self.shared.recompute().0
    }

    /// Re-poll now and return one entry per distinct description.
    pub fn processes_to_close(&self) -> Arc<[ProcessToClose]> {
        self.shared.recompute().1
    }

    /// Result of the most recent poll, without polling again.
    pub fn last_running_processes(&self) -> Arc<[RunningProcess]> {
        self.shared
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .clone()
    }

    /// Processes-to-close list of the most recent poll, without polling again.
    pub fn last_processes_to_close(&self) -> Arc<[ProcessToClose]> {
        self.shared
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_close
            .clone()
    }

    /// Register a callback for change notifications. Callbacks run on the
    /// worker thread.
    pub fn on_processes_to_close_changed<F>(&self, handler: F)
    where
        F: Fn(&ProcessesToCloseChanged) + Send + Sync + 'static,
    {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Watch the latest processes-to-close list.
    pub fn subscribe(&self) -> watch::Receiver<Arc<[ProcessToClose]>> {
        self.shared.feed.subscribe()
    }
}

impl Drop for RunningProcessService {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::introspect::fake::{FakeProcess, FakeProcessSource};
    use std::sync::mpsc;

    const INTERVAL: Duration = Duration::from_millis(20);
    const EVENT_WAIT: Duration = Duration::from_secs(5);

    fn caller() -> CallerContext {
        CallerContext::new("tester", 1, false)
    }

    fn notepad(pid: u32) -> FakeProcess {
        FakeProcess::new(pid, "notepad", "C:\\Windows\\notepad.exe", "notepad.exe")
    }

    fn service(source: Arc<FakeProcessSource>) -> RunningProcessService {
        RunningProcessService::with_source(
            vec![ProcessDefinition::new("notepad")
                .unwrap()
                .with_description("Notepad")
                .unwrap()],
            INTERVAL,
            caller(),
            source,
        )
        .unwrap()
    }

    fn event_channel(service: &RunningProcessService) -> mpsc::Receiver<Vec<String>> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        service.on_processes_to_close_changed(move |event| {
            let names = event
                .processes_to_close
                .iter()
                .map(|p| p.description.clone())
                .collect();
            let _ = tx.lock().unwrap().send(names);
        });
        rx
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let source: Arc<dyn ProcessSource> = Arc::new(FakeProcessSource::default());
        assert!(matches!(
            RunningProcessService::with_source(vec![], INTERVAL, caller(), source.clone()),
            Err(DeployError::Validation { .. })
        ));
        assert!(matches!(
            RunningProcessService::with_source(
                vec![ProcessDefinition::new("x").unwrap()],
                Duration::ZERO,
                caller(),
                source
            ),
            Err(DeployError::Validation { .. })
        ));
    }

    #[test]
    fn test_start_stop_state_errors() {
        let service = service(Arc::new(FakeProcessSource::default()));

        assert!(matches!(service.stop(), Err(DeployError::InvalidState { .. })));
        service.start().unwrap();
        assert!(service.is_running());
        assert!(matches!(service.start(), Err(DeployError::InvalidState { .. })));
        service.stop().unwrap();
        assert!(!service.is_running());
        assert!(matches!(service.stop(), Err(DeployError::InvalidState { .. })));
    }

    #[test]
    fn test_first_poll_fires_even_when_empty() {
        let service = service(Arc::new(FakeProcessSource::default()));
        let events = event_channel(&service);

        service.start().unwrap();
        assert_eq!(events.recv_timeout(EVENT_WAIT).unwrap(), Vec::<String>::new());

        // Nothing changes, so nothing more is raised.
        assert!(events.recv_timeout(INTERVAL * 5).is_err());
        service.stop().unwrap();
    }

    #[test]
    fn test_change_detection() {
        let source = Arc::new(FakeProcessSource::default());
        let service = service(source.clone());
        let events = event_channel(&service);

        service.start().unwrap();
        assert!(events.recv_timeout(EVENT_WAIT).unwrap().is_empty());

        source.push(notepad(10));
        assert_eq!(events.recv_timeout(EVENT_WAIT).unwrap(), ["Notepad"]);

        // A second instance adds a running process but no new entry to close,
        // so the event stays quiet.
        source.push(notepad(11));
        assert!(events.recv_timeout(INTERVAL * 5).is_err());
        assert_eq!(service.running_processes().len(), 2);
        assert_eq!(service.processes_to_close().len(), 1);

        source.set(vec![]);
        assert!(events.recv_timeout(EVENT_WAIT).unwrap().is_empty());
        service.stop().unwrap();
    }

    #[test]
    fn test_no_events_after_stop() {
        let source = Arc::new(FakeProcessSource::default());
        let service = service(source.clone());
        let events = event_channel(&service);

        service.start().unwrap();
        events.recv_timeout(EVENT_WAIT).unwrap();
        service.stop().unwrap();

        source.push(notepad(12));
        assert!(events.recv_timeout(INTERVAL * 5).is_err());
    }

    #[test]
    fn test_restart_fires_first_poll_again() {
        let source = Arc::new(FakeProcessSource::with(vec![notepad(13)]));
        let service = service(source);
        let events = event_channel(&service);

        service.start().unwrap();
        assert_eq!(events.recv_timeout(EVENT_WAIT).unwrap(), ["Notepad"]);
        service.stop().unwrap();

        service.start().unwrap();
        assert_eq!(events.recv_timeout(EVENT_WAIT).unwrap(), ["Notepad"]);
        service.stop().unwrap();
    }

    #[test]
    fn test_on_demand_poll_without_running() {
        let source = Arc::new(FakeProcessSource::with(vec![notepad(14)]));
        let service = service(source.clone());

        assert!(service.last_running_processes().is_empty());
        let running = service.running_processes();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].pid, 14);
        assert_eq!(service.last_running_processes().len(), 1);

        source.remove(14);
        assert!(service.processes_to_close().is_empty());
    }

    #[tokio::test]
    async fn test_watch_feed_follows_changes() {
        let source = Arc::new(FakeProcessSource::default());
        let service = service(source.clone());
        let mut feed = service.subscribe();

        service.start().unwrap();
        source.push(notepad(15));

        let list = tokio::time::timeout(EVENT_WAIT, async {
            loop {
                feed.changed().await.unwrap();
                let list = feed.borrow_and_update().clone();
                if !list.is_empty() {
                    return list;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(list[0].description, "Notepad");
        assert_eq!(list[0].path, std::path::PathBuf::from("C:\\Windows\\notepad.exe"));
        service.stop().unwrap();
    }

    #[test]
    fn test_drop_stops_worker() {
        let source = Arc::new(FakeProcessSource::default());
        let service = service(source.clone());
        service.start().unwrap();
        drop(service);
        // The worker held the only other reference to the source.
        assert_eq!(Arc::strong_count(&source), 1);
    }
}
