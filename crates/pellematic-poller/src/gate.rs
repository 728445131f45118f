//! Poll gate: one request at a time, never faster than the minimum interval
//!
//! The controller's embedded web server handles a single connection and
//! answers slowly; overlapping or rapid requests make it drop out entirely.

use pellematic_client::{ClientError, DeviceClient, DeviceSnapshot};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, trace};

/// Default minimum spacing between device requests
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(2500);

/// Anything that can produce a status snapshot
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<DeviceSnapshot, ClientError>> + Send;
}

impl SnapshotSource for DeviceClient {
    fn fetch(&self) -> impl Future<Output = Result<DeviceSnapshot, ClientError>> + Send {
        self.fetch_status()
    }
}

impl<T: SnapshotSource> SnapshotSource for Arc<T> {
    fn fetch(&self) -> impl Future<Output = Result<DeviceSnapshot, ClientError>> + Send {
        (**self).fetch()
    }
}

#[derive(Default)]
struct GateState {
    /// Start of the most recent request of any kind
    last_attempt: Option<Instant>,
    /// Completion of the most recent successful fetch
    last_fetch: Option<Instant>,
    last: Option<Arc<DeviceSnapshot>>,
}

/// Serializes access to a snapshot source
pub struct PollGate<S> {
    source: S,
    min_interval: Duration,
    state: Mutex<GateState>,
}

impl<S: SnapshotSource> PollGate<S> {
    pub fn new(source: S, min_interval: Duration) -> Self {
        Self {
            source,
            min_interval,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Fetch a snapshot, or reuse the last one if it is recent enough
    ///
    /// Callers arriving while a fetch is in flight wait for it and then see
    /// its result as the cached snapshot.
    pub async fn fetch(&self) -> Result<Arc<DeviceSnapshot>, ClientError> {
        let mut state = self.state.lock().await;

        if let (Some(at), Some(snapshot)) = (state.last_fetch, &state.last) {
            if at.elapsed() < self.min_interval {
                trace!(age_ms = at.elapsed().as_millis() as u64, "Reusing cached snapshot");
                return Ok(snapshot.clone());
            }
        }

        self.wait_for_slot(&state).await;
        state.last_attempt = Some(Instant::now());

        let snapshot = Arc::new(self.source.fetch().await?);
        state.last_fetch = Some(Instant::now());
        state.last = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Run another device request (e.g. a command) under the gate
    ///
    /// The cached snapshot is invalidated so the next fetch reads back
    /// fresh values.
    pub async fn exclusive<F, Fut, T>(&self, request: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut state = self.state.lock().await;
        self.wait_for_slot(&state).await;
        state.last_attempt = Some(Instant::now());
        state.last_fetch = None;
        request().await
    }

    /// Last successfully fetched snapshot, without touching the device
    pub async fn cached(&self) -> Option<Arc<DeviceSnapshot>> {
        self.state.lock().await.last.clone()
    }

    async fn wait_for_slot(&self, state: &GateState) {
        if let Some(at) = state.last_attempt {
            let ready = at + self.min_interval;
            if ready > Instant::now() {
                debug!(
                    wait_ms = (ready - Instant::now()).as_millis() as u64,
                    "Waiting for request slot"
                );
                sleep_until(ready).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSource;
    use serde_json::json;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn gate(source: FakeSource) -> PollGate<Arc<FakeSource>> {
        PollGate::new(Arc::new(source), INTERVAL)
    }

    #[tokio::test]
    async fn test_second_fetch_within_interval_is_cached() {
        let gate = gate(FakeSource::new(json!({"system": {}})));

        let first = gate.fetch().await.unwrap();
        let second = gate.fetch().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(gate.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_after_interval_hits_device() {
        let gate = gate(FakeSource::new(json!({"system": {}})));

        gate.fetch().await.unwrap();
        tokio::time::sleep(INTERVAL + Duration::from_millis(20)).await;
        gate.fetch().await.unwrap();

        assert_eq!(gate.source().calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_request() {
        let source = FakeSource::new(json!({"system": {}})).with_delay(Duration::from_millis(30));
        let gate = gate(source);

        let (a, b, c) = tokio::join!(gate.fetch(), gate.fetch(), gate.fetch());

        assert_eq!(gate.source().calls(), 1);
        let a = a.unwrap();
        assert!(Arc::ptr_eq(&a, &b.unwrap()));
        assert!(Arc::ptr_eq(&a, &c.unwrap()));
    }

    #[tokio::test]
    async fn test_failure_keeps_cache_and_spaces_retries() {
        let gate = gate(FakeSource::new(json!({"system": {}})));
        let good = gate.fetch().await.unwrap();

        tokio::time::sleep(INTERVAL).await;
        gate.source().fail();
        assert!(gate.fetch().await.is_err());

        let started = std::time::Instant::now();
        assert!(gate.fetch().await.is_err());
        assert!(started.elapsed() >= INTERVAL - Duration::from_millis(5));

        let cached = gate.cached().await.unwrap();
        assert!(Arc::ptr_eq(&good, &cached));
    }

    #[tokio::test]
    async fn test_exclusive_invalidates_cache() {
        let gate = gate(FakeSource::new(json!({"system": {}})));
        gate.fetch().await.unwrap();

        let started = std::time::Instant::now();
        let answer = gate.exclusive(|| async { 42 }).await;
        assert_eq!(answer, 42);
        assert!(started.elapsed() >= INTERVAL - Duration::from_millis(5));

        gate.fetch().await.unwrap();
        assert_eq!(gate.source().calls(), 2);
    }
}
