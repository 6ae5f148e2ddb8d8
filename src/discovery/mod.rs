// discovery/mod.rs
mod catt;
mod mdns;

pub use catt::CattScanner;
pub use mdns::MdnsScanner;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    devices::DeviceRegistry,
    events::{self, EventBus},
    models::Device,
};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("scan timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("scanner could not be run: {0}")]
    Io(#[from] std::io::Error),
    #[error("scan failed: {0}")]
    Failed(String),
}

/// Enumerates the receivers currently reachable on the network.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    async fn scan(&self, timeout: Duration) -> Result<Vec<Device>, DiscoveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanRejection {
    InProgress,
    Cooldown,
}

/// Answer to a scan request. A rejected request did no work.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanTrigger {
    pub started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ScanRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ScanState {
    pub in_progress: bool,
    pub last_scan_id: Option<Uuid>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_device_count: Option<usize>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct ScanTracker {
    view: ScanState,
    completed: Option<Instant>,
}

/// Runs at most one scan at a time and at most one per cooldown window.
pub struct DiscoveryCoordinator {
    backend: Arc<dyn DiscoveryBackend>,
    registry: Arc<DeviceRegistry>,
    events: Arc<EventBus>,
    tracker: Arc<Mutex<ScanTracker>>,
    cooldown: Duration,
    timeout: Duration,
}

impl DiscoveryCoordinator {
    pub fn new(
        backend: Arc<dyn DiscoveryBackend>,
        registry: Arc<DeviceRegistry>,
        events: Arc<EventBus>,
        cooldown: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            registry,
            events,
            tracker: Arc::new(Mutex::new(ScanTracker::default())),
            cooldown,
            timeout,
        }
    }

    /// Starts a background scan unless one is running or the cooldown has not
    /// elapsed. Never waits for the scan itself.
    pub fn trigger_scan(&self) -> ScanTrigger {
        match self.start_scan() {
            Ok((scan_id, _)) => ScanTrigger {
                started: true,
                scan_id: Some(scan_id),
                reason: None,
                retry_after_secs: None,
            },
            Err((reason, retry_after)) => ScanTrigger {
                started: false,
                scan_id: None,
                reason: Some(reason),
                retry_after_secs: retry_after.map(|d| d.as_secs_f64()),
            },
        }
    }

    pub fn scan_state(&self) -> ScanState {
        lock(&self.tracker).view.clone()
    }

    fn start_scan(&self) -> Result<(Uuid, JoinHandle<()>), (ScanRejection, Option<Duration>)> {
        let scan_id = Uuid::new_v4();
        {
            let mut tracker = lock(&self.tracker);
            if tracker.view.in_progress {
                info!("Scan already in progress");
                return Err((ScanRejection::InProgress, None));
            }
            if let Some(completed) = tracker.completed {
                let elapsed = completed.elapsed();
                if elapsed < self.cooldown {
                    info!("Scan cooldown active");
                    return Err((ScanRejection::Cooldown, Some(self.cooldown - elapsed)));
                }
            }
            tracker.view.in_progress = true;
            tracker.view.last_scan_id = Some(scan_id);
            tracker.view.last_started_at = Some(Utc::now());
        }

        let job = ScanJob {
            scan_id,
            backend: self.backend.clone(),
            registry: self.registry.clone(),
            events: self.events.clone(),
            timeout: self.timeout,
            guard: ScanGuard(self.tracker.clone()),
        };
        Ok((scan_id, tokio::spawn(job.run())))
    }
}

struct ScanJob {
    scan_id: Uuid,
    backend: Arc<dyn DiscoveryBackend>,
    registry: Arc<DeviceRegistry>,
    events: Arc<EventBus>,
    timeout: Duration,
    guard: ScanGuard,
}

impl ScanJob {
    async fn run(self) {
        let scan_id = self.scan_id;
        info!(%scan_id, "Starting device discovery");

        let result = match time::timeout(self.timeout, self.backend.scan(self.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout(self.timeout)),
        };

        match result {
            Ok(devices) => {
                let snapshot = self.registry.replace(devices).await;
                info!(%scan_id, count = snapshot.len(), "Discovery finished");
                {
                    let mut tracker = lock(&self.guard.0);
                    tracker.view.last_device_count = Some(snapshot.len());
                    tracker.view.last_error = None;
                }
                self.events.publish(
                    events::SCAN_COMPLETED,
                    json!({ "scan_id": scan_id, "devices": snapshot.len() }),
                );
            }
            Err(e) => {
                error!(%scan_id, error = %e, "Discovery failed, keeping previous device list");
                lock(&self.guard.0).view.last_error = Some(e.to_string());
                self.events.publish(
                    events::SCAN_FAILED,
                    json!({ "scan_id": scan_id, "error": e.to_string() }),
                );
            }
        }
    }
}

/// Marks the scan finished when dropped, so a failing or panicking scan
/// still releases the in-progress flag and starts the cooldown.
struct ScanGuard(Arc<Mutex<ScanTracker>>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let mut tracker = lock(&self.0);
        tracker.view.in_progress = false;
        tracker.view.last_completed_at = Some(Utc::now());
        tracker.completed = Some(Instant::now());
    }
}

fn lock(tracker: &Mutex<ScanTracker>) -> std::sync::MutexGuard<'_, ScanTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Returns `devices` (or an error) once a permit is released.
    struct GatedScanner {
        gate: Semaphore,
        calls: AtomicUsize,
        result: Result<Vec<Device>, String>,
    }

    impl GatedScanner {
        fn open(result: Result<Vec<Device>, String>) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(Semaphore::MAX_PERMITS),
                calls: AtomicUsize::new(0),
                result,
            })
        }

        fn closed(result: Result<Vec<Device>, String>) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
                result,
            })
        }
    }

    #[async_trait]
    impl DiscoveryBackend for GatedScanner {
        async fn scan(&self, _timeout: Duration) -> Result<Vec<Device>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.expect("gate closed");
            self.result.clone().map_err(DiscoveryError::Failed)
        }
    }

    struct SlowScanner;

    #[async_trait]
    impl DiscoveryBackend for SlowScanner {
        async fn scan(&self, _timeout: Duration) -> Result<Vec<Device>, DiscoveryError> {
            time::sleep(Duration::from_secs(30)).await;
            Ok(vec![Device::new("Never", "9.9.9.9")])
        }
    }

    fn coordinator(
        backend: Arc<dyn DiscoveryBackend>,
        registry: Arc<DeviceRegistry>,
        cooldown: Duration,
        timeout: Duration,
    ) -> DiscoveryCoordinator {
        DiscoveryCoordinator::new(backend, registry, Arc::new(EventBus::new()), cooldown, timeout)
    }

    #[tokio::test]
    async fn successful_scan_replaces_registry() {
        let registry = Arc::new(DeviceRegistry::new());
        let scanner = GatedScanner::open(Ok(vec![Device::new("Den TV", "192.168.1.5")]));
        let coordinator = coordinator(
            scanner,
            registry.clone(),
            Duration::ZERO,
            Duration::from_secs(5),
        );

        let (_, handle) = coordinator.start_scan().unwrap();
        handle.await.unwrap();

        assert_eq!(&*registry.list().await, &[Device::new("Den TV", "192.168.1.5")]);
        let state = coordinator.scan_state();
        assert!(!state.in_progress);
        assert_eq!(state.last_device_count, Some(1));
        assert!(state.last_completed_at.is_some());
    }

    #[tokio::test]
    async fn trigger_while_running_is_rejected() {
        let registry = Arc::new(DeviceRegistry::new());
        let previous = Device::new("Office", "192.168.1.7");
        registry.replace(vec![previous.clone()]).await;
        let scanner = GatedScanner::closed(Ok(vec![Device::new("Den TV", "192.168.1.5")]));
        let coordinator = coordinator(
            scanner.clone(),
            registry.clone(),
            Duration::ZERO,
            Duration::from_secs(5),
        );

        let (_, handle) = coordinator.start_scan().unwrap();
        // Let the scan task reach the backend before checking the listing.
        while scanner.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let second = coordinator.trigger_scan();

        assert!(!second.started);
        assert_eq!(second.reason, Some(ScanRejection::InProgress));
        assert!(coordinator.scan_state().in_progress);
        // Listings during a scan still see the previous snapshot.
        assert_eq!(&*registry.list().await, &[previous]);

        scanner.gate.add_permits(1);
        handle.await.unwrap();
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(&*registry.list().await, &[Device::new("Den TV", "192.168.1.5")]);
    }

    #[tokio::test]
    async fn concurrent_triggers_start_exactly_one_scan() {
        let registry = Arc::new(DeviceRegistry::new());
        let scanner = GatedScanner::closed(Ok(vec![]));
        let coordinator = Arc::new(coordinator(
            scanner.clone(),
            registry,
            Duration::from_secs(60),
            Duration::from_secs(5),
        ));

        let triggers = (0..16).map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.trigger_scan() })
        });
        let results: Vec<ScanTrigger> = join_all(triggers)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.started).count(), 1);

        scanner.gate.add_permits(1);
        while coordinator.scan_state().in_progress {
            time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cooldown_rejects_until_elapsed() {
        let registry = Arc::new(DeviceRegistry::new());
        let scanner = GatedScanner::open(Ok(vec![]));
        let coordinator = coordinator(
            scanner.clone(),
            registry,
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let (_, handle) = coordinator.start_scan().unwrap();
        handle.await.unwrap();
        let again = coordinator.trigger_scan();

        assert!(!again.started);
        assert_eq!(again.reason, Some(ScanRejection::Cooldown));
        let retry = again.retry_after_secs.unwrap();
        assert!(retry > 0.0 && retry <= 60.0);
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_cooldown_allows_back_to_back_scans() {
        let registry = Arc::new(DeviceRegistry::new());
        let scanner = GatedScanner::open(Ok(vec![]));
        let coordinator = coordinator(
            scanner.clone(),
            registry,
            Duration::ZERO,
            Duration::from_secs(5),
        );

        coordinator.start_scan().unwrap().1.await.unwrap();
        coordinator.start_scan().unwrap().1.await.unwrap();

        assert_eq!(scanner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_scan_keeps_previous_snapshot() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.replace(vec![Device::new("Den TV", "192.168.1.5")]).await;
        let scanner = GatedScanner::open(Err("mdns socket refused".into()));
        let coordinator = coordinator(
            scanner,
            registry.clone(),
            Duration::ZERO,
            Duration::from_secs(5),
        );

        coordinator.start_scan().unwrap().1.await.unwrap();

        assert_eq!(&*registry.list().await, &[Device::new("Den TV", "192.168.1.5")]);
        let state = coordinator.scan_state();
        assert!(!state.in_progress);
        assert_eq!(state.last_error.as_deref(), Some("scan failed: mdns socket refused"));
    }

    #[tokio::test]
    async fn timed_out_scan_keeps_previous_snapshot() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.replace(vec![Device::new("Den TV", "192.168.1.5")]).await;
        let coordinator = coordinator(
            Arc::new(SlowScanner),
            registry.clone(),
            Duration::ZERO,
            Duration::from_millis(50),
        );

        coordinator.start_scan().unwrap().1.await.unwrap();

        assert_eq!(registry.list().await.len(), 1);
        assert_eq!(registry.list().await[0].address, "192.168.1.5");
        let error = coordinator.scan_state().last_error.unwrap();
        assert!(error.starts_with("scan timed out"), "{error}");
    }

    #[tokio::test]
    async fn scan_events_are_published() {
        let registry = Arc::new(DeviceRegistry::new());
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        events.subscribe(events::SCAN_COMPLETED, move |data| {
            counter.store(data["devices"].as_u64().unwrap() as usize, Ordering::SeqCst);
        });
        let scanner = GatedScanner::open(Ok(vec![
            Device::new("A", "1.1.1.1"),
            Device::new("B", "2.2.2.2"),
        ]));
        let coordinator = DiscoveryCoordinator::new(
            scanner,
            registry,
            events,
            Duration::ZERO,
            Duration::from_secs(5),
        );

        coordinator.start_scan().unwrap().1.await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
