//! In-memory snapshot source for tests

use chrono::Utc;
use pellematic_client::{ClientError, DeviceSnapshot, QuerySuffix};
use pellematic_core::Charset;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::gate::SnapshotSource;

pub(crate) struct FakeSource {
    calls: AtomicUsize,
    /// `None` makes every fetch fail
    data: Mutex<Option<Map<String, Value>>>,
    delay: Duration,
}

impl FakeSource {
    pub fn new(data: Value) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            data: Mutex::new(data.as_object().cloned()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set(&self, data: Value) {
        *self.data.lock().unwrap() = data.as_object().cloned();
    }

    pub fn fail(&self) {
        *self.data.lock().unwrap() = None;
    }
}

impl SnapshotSource for FakeSource {
    fn fetch(&self) -> impl Future<Output = Result<DeviceSnapshot, ClientError>> + Send {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let data = self.data.lock().unwrap().clone();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match data {
                Some(data) => Ok(DeviceSnapshot {
                    data,
                    charset: Charset::Utf8,
                    suffix: QuerySuffix::Plain,
                    fetched_at: Utc::now(),
                }),
                None => Err(ClientError::Exhausted {
                    attempts: 2,
                    last: "operation timed out".to_string(),
                }),
            }
        }
    }
}
