//! Application state management

use anyhow::{Context, Result};
use pellematic_client::{ClientError, DeviceClient};
use pellematic_core::{ClimateDefinition, EntityDefinition};
use pellematic_poller::{
    resolve_climate, ClimateState, EntityState, LiveEntity, PollGate, PollEvent, Poller,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;

pub type DevicePoller = Poller<Arc<DeviceClient>>;

/// Shared application state
pub struct AppState {
    /// Background poller owning the snapshot store and entity registry
    pub poller: Arc<DevicePoller>,
    /// Client used for commands; shared with the poller's gate
    pub client: Arc<DeviceClient>,
    /// Configuration
    pub config: Config,
}

/// An entity definition with its current state
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    #[serde(flatten)]
    pub definition: EntityDefinition,
    pub state: EntityState,
}

/// A climate grouping with its current state
#[derive(Debug, Clone, Serialize)]
pub struct ClimateView {
    #[serde(flatten)]
    pub definition: ClimateDefinition,
    pub state: ClimateState,
}

/// Result of a command
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub unique_id: String,
    /// Raw value sent to the device
    pub raw: String,
    /// State read back after the command, if the refresh succeeded
    pub state: EntityState,
}

pub enum CommandError {
    UnknownEntity,
    Client(ClientError),
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config) -> Result<Arc<Self>> {
        config.validate()?;

        let client = Arc::new(
            DeviceClient::new(
                &config.device.host,
                config.device.charset()?,
                config.device.query_suffix,
            )
            .context("Failed to create device client")?,
        );

        let gate = PollGate::new(client.clone(), config.device.min_request_interval());
        let poller = Arc::new(Poller::new(gate, config.device.poller_config()));

        Ok(Arc::new(Self {
            poller,
            client,
            config,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.poller.subscribe()
    }

    async fn view(entity: &LiveEntity) -> EntityView {
        EntityView {
            definition: (*entity.definition).clone(),
            state: entity.state().await,
        }
    }

    /// All known entities with their current state
    pub async fn entities(&self) -> Vec<EntityView> {
        let mut views = Vec::new();
        for entity in self.poller.entities().await {
            views.push(Self::view(&entity).await);
        }
        views
    }

    pub async fn entity(&self, unique_id: &str) -> Option<EntityView> {
        let entity = self.poller.entity(unique_id).await?;
        Some(Self::view(&entity).await)
    }

    pub async fn climates(&self) -> Vec<ClimateView> {
        let snapshot = self.poller.store().current().await;
        self.poller
            .climates()
            .await
            .into_iter()
            .map(|definition| {
                let state = snapshot
                    .as_deref()
                    .map(|s| resolve_climate(&definition, s))
                    .unwrap_or_default();
                ClimateView { definition, state }
            })
            .collect()
    }

    /// Encode and send a value, then refresh the snapshot
    pub async fn set_entity(
        &self,
        unique_id: &str,
        value: &Value,
    ) -> Result<CommandOutcome, CommandError> {
        let entity = self
            .poller
            .entity(unique_id)
            .await
            .ok_or(CommandError::UnknownEntity)?;

        let raw = self
            .poller
            .gate()
            .exclusive(|| self.client.send_command(&entity.definition, value))
            .await
            .map_err(CommandError::Client)?;

        info!(entity = %unique_id, raw = %raw, "Command accepted by device");

        // A failed read-back leaves the state stale until the next poll
        let _ = self.poller.poll_once().await;

        Ok(CommandOutcome {
            unique_id: unique_id.to_string(),
            raw,
            state: entity.state().await,
        })
    }
}
