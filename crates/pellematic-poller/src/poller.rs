//! Background poller: fetch, store, re-discover, broadcast

use chrono::{DateTime, Utc};
use pellematic_client::{ClientError, DeviceSnapshot};
use pellematic_core::{discover, ClimateDefinition, DiscoveryResult, EntityDefinition, Language};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::entity::LiveEntity;
use crate::gate::{PollGate, SnapshotSource};
use crate::store::SnapshotStore;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Failed to fetch status: {0}")]
    Fetch(#[from] ClientError),
}

/// Poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between polls
    pub interval: Duration,
    /// Language for entity names
    pub language: Language,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            language: Language::En,
        }
    }
}

/// Poll event for real-time updates
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollEvent {
    PollStarted,
    PollCompleted {
        entities: usize,
        fetched_at: DateTime<Utc>,
    },
    PollFailed {
        error: String,
    },
    /// New identities appeared or the set of identities missing from the
    /// latest snapshot changed
    EntitiesChanged {
        added: Vec<String>,
        missing: Vec<String>,
    },
}

/// Every entity ever discovered, in first-seen order; entries are never removed
#[derive(Default)]
struct Registry {
    entities: Vec<Arc<EntityDefinition>>,
    index: HashMap<String, usize>,
    climates: Vec<ClimateDefinition>,
    missing: BTreeSet<String>,
}

impl Registry {
    /// Merge a discovery result, returning new ids and whether the missing set changed
    fn merge(&mut self, result: &DiscoveryResult) -> (Vec<String>, bool) {
        let mut added = Vec::new();
        for definition in result.iter() {
            match self.index.get(&definition.unique_id) {
                Some(&i) => self.entities[i] = Arc::new(definition.clone()),
                None => {
                    self.index.insert(definition.unique_id.clone(), self.entities.len());
                    self.entities.push(Arc::new(definition.clone()));
                    added.push(definition.unique_id.clone());
                }
            }
        }

        for climate in &result.climates {
            match self.climates.iter_mut().find(|c| c.unique_id == climate.unique_id) {
                Some(existing) => *existing = climate.clone(),
                None => self.climates.push(climate.clone()),
            }
        }

        let missing: BTreeSet<String> = self
            .entities
            .iter()
            .filter(|def| result.get(&def.unique_id).is_none())
            .map(|def| def.unique_id.clone())
            .collect();
        let missing_changed = missing != self.missing;
        self.missing = missing;

        (added, missing_changed)
    }
}

/// Polling service
pub struct Poller<S> {
    gate: PollGate<S>,
    store: Arc<SnapshotStore>,
    config: PollerConfig,
    registry: RwLock<Registry>,
    discovery: RwLock<Arc<DiscoveryResult>>,
    event_tx: broadcast::Sender<PollEvent>,
}

impl<S: SnapshotSource> Poller<S> {
    pub fn new(gate: PollGate<S>, config: PollerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            gate,
            store: Arc::new(SnapshotStore::new()),
            config,
            registry: RwLock::new(Registry::default()),
            discovery: RwLock::new(Arc::new(DiscoveryResult::default())),
            event_tx,
        }
    }

    pub fn gate(&self) -> &PollGate<S> {
        &self.gate
    }

    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Subscribe to poll events
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.event_tx.subscribe()
    }

    /// Result of the most recent discovery pass
    pub async fn discovery(&self) -> Arc<DiscoveryResult> {
        self.discovery.read().await.clone()
    }

    /// All known entities, including ones missing from the latest snapshot
    pub async fn entities(&self) -> Vec<LiveEntity> {
        self.registry
            .read()
            .await
            .entities
            .iter()
            .map(|def| LiveEntity::new(def.clone(), self.store.clone()))
            .collect()
    }

    /// Look up a known entity by identity
    pub async fn entity(&self, unique_id: &str) -> Option<LiveEntity> {
        let registry = self.registry.read().await;
        let i = *registry.index.get(unique_id)?;
        Some(LiveEntity::new(registry.entities[i].clone(), self.store.clone()))
    }

    pub async fn climates(&self) -> Vec<ClimateDefinition> {
        self.registry.read().await.climates.clone()
    }

    /// Run a single poll cycle
    pub async fn poll_once(&self) -> Result<Arc<DeviceSnapshot>, PollError> {
        let _ = self.event_tx.send(PollEvent::PollStarted);

        let snapshot = match self.gate.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Poll failed, keeping last snapshot");
                let _ = self.event_tx.send(PollEvent::PollFailed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        if self.store.replace(snapshot.clone()).await {
            self.rediscover(&snapshot).await;
        } else {
            debug!("Snapshot unchanged, skipping discovery");
        }

        let entities = self.registry.read().await.entities.len();
        let _ = self.event_tx.send(PollEvent::PollCompleted {
            entities,
            fetched_at: snapshot.fetched_at,
        });

        Ok(snapshot)
    }

    async fn rediscover(&self, snapshot: &DeviceSnapshot) {
        let result = Arc::new(discover(&snapshot.data, self.config.language));

        let mut registry = self.registry.write().await;
        let (added, missing_changed) = registry.merge(&result);

        if !added.is_empty() {
            info!(added = added.len(), total = registry.entities.len(), "New entities discovered");
        }
        if !added.is_empty() || missing_changed {
            if !registry.missing.is_empty() {
                warn!(missing = registry.missing.len(), "Known entities missing from snapshot");
            }
            let _ = self.event_tx.send(PollEvent::EntitiesChanged {
                added,
                missing: registry.missing.iter().cloned().collect(),
            });
        }
        drop(registry);

        *self.discovery.write().await = result;
    }

    /// Run continuous polling in background
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            min_interval_ms = self.gate.min_interval().as_millis() as u64,
            "Poller started"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                debug!(error = %e, "Poll cycle failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityState;
    use crate::testing::FakeSource;
    use pellematic_core::DisplayValue;
    use serde_json::json;

    const MIN_INTERVAL: Duration = Duration::from_millis(20);

    fn poller(source: FakeSource) -> Poller<Arc<FakeSource>> {
        Poller::new(PollGate::new(Arc::new(source), MIN_INTERVAL), PollerConfig::default())
    }

    fn status() -> serde_json::Value {
        json!({
            "hk1": {
                "L_roomtemp_act": {"val": "215", "unit": "°C", "factor": "0.1"},
                "L_pump": {"val": "1", "format": "0:Aus|1:Ein"}
            }
        })
    }

    async fn next_poll(poller: &Poller<Arc<FakeSource>>) {
        tokio::time::sleep(MIN_INTERVAL + Duration::from_millis(5)).await;
        let _ = poller.poll_once().await;
    }

    #[tokio::test]
    async fn test_first_poll_discovers_entities() {
        let poller = poller(FakeSource::new(status()));
        let mut events = poller.subscribe();

        poller.poll_once().await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), PollEvent::PollStarted));
        match events.recv().await.unwrap() {
            PollEvent::EntitiesChanged { added, missing } => {
                assert_eq!(added, ["hk1_L_roomtemp_act", "hk1_L_pump"]);
                assert!(missing.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            PollEvent::PollCompleted { entities: 2, .. }
        ));

        let entity = poller.entity("hk1_L_roomtemp_act").await.unwrap();
        assert_eq!(entity.state().await, EntityState::Value(DisplayValue::Float(21.5)));
        assert_eq!(poller.discovery().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_entity_is_kept_unavailable() {
        let poller = poller(FakeSource::new(status()));
        poller.poll_once().await.unwrap();

        poller.gate().source().set(json!({
            "hk1": {"L_roomtemp_act": {"val": "220", "unit": "°C", "factor": "0.1"}}
        }));
        let mut events = poller.subscribe();
        next_poll(&poller).await;

        assert_eq!(poller.entities().await.len(), 2);
        let pump = poller.entity("hk1_L_pump").await.unwrap();
        assert_eq!(pump.state().await, EntityState::Unavailable);

        assert!(matches!(events.recv().await.unwrap(), PollEvent::PollStarted));
        match events.recv().await.unwrap() {
            PollEvent::EntitiesChanged { added, missing } => {
                assert!(added.is_empty());
                assert_eq!(missing, ["hk1_L_pump"]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unchanged_identity_set_emits_no_change_event() {
        let poller = poller(FakeSource::new(status()));
        poller.poll_once().await.unwrap();

        let mut events = poller.subscribe();
        next_poll(&poller).await;

        assert!(matches!(events.recv().await.unwrap(), PollEvent::PollStarted));
        assert!(matches!(events.recv().await.unwrap(), PollEvent::PollCompleted { .. }));
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_snapshot() {
        let poller = poller(FakeSource::new(status()));
        poller.poll_once().await.unwrap();

        poller.gate().source().fail();
        let mut events = poller.subscribe();
        tokio::time::sleep(MIN_INTERVAL + Duration::from_millis(5)).await;
        assert!(poller.poll_once().await.is_err());

        assert!(matches!(events.recv().await.unwrap(), PollEvent::PollStarted));
        assert!(matches!(events.recv().await.unwrap(), PollEvent::PollFailed { .. }));

        let pump = poller.entity("hk1_L_pump").await.unwrap();
        assert_eq!(pump.state().await, EntityState::On(true));
    }

    #[tokio::test]
    async fn test_climates_tracked() {
        let poller = poller(FakeSource::new(json!({
            "hk1": {
                "L_roomtemp_act": {"val": "215", "unit": "°C", "factor": "0.1"},
                "temp_heat": {
                    "val": "210", "unit": "°C", "factor": "0.1", "min": "100", "max": "300"
                }
            }
        })));
        poller.poll_once().await.unwrap();
        let climates = poller.climates().await;
        assert_eq!(climates.len(), 1);
        assert_eq!(climates[0].unique_id, "hk1_climate");
    }

    #[test]
    fn test_event_serialization() {
        let event = PollEvent::EntitiesChanged {
            added: vec!["hk1_L_pump".to_string()],
            missing: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "entities_changed", "added": ["hk1_L_pump"], "missing": []})
        );
    }
}
