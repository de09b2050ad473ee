use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::exchange::{ConversationExchange, RemoteRecord};
use super::health::{ConnectionHealth, HealthPolicy};
use super::local::LocalStore;
use super::remote::{Direction, RemoteQuery, RemoteStore};
use super::sanitize::sanitize;
use crate::config::StoreConfig;
use crate::error::RemoteStoreError;

/// Dual-write conversation persistence
///
/// Every save lands in the local store first. The remote store is only
/// attempted while the connection is healthy, and its failures are absorbed
/// into the health tracker instead of being returned.
pub struct ConversationStore {
    local: LocalStore,
    remote: Option<Arc<dyn RemoteStore>>,
    collection: String,
    remote_timeout: Duration,
    policy: HealthPolicy,
    health: Mutex<ConnectionHealth>,
}

impl ConversationStore {
    pub fn new(local: LocalStore, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            local,
            remote,
            collection: "conversations".to_string(),
            remote_timeout: Duration::from_secs(10),
            policy: HealthPolicy::default(),
            health: Mutex::new(ConnectionHealth::default()),
        }
    }

    pub fn from_config(config: &StoreConfig, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let local = LocalStore::new(&config.local_path, config.local_capacity);
        Self::new(local, remote)
            .with_collection(config.collection.clone())
            .with_remote_timeout(Duration::from_secs(config.remote_timeout_secs))
            .with_policy(HealthPolicy {
                error_threshold: config.error_threshold,
                recovery_window: Duration::from_secs(config.recovery_window_secs),
            })
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: HealthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.lock_health().clone()
    }

    /// Check whether the remote answers and update the online flag
    ///
    /// Leaves the error counters alone; those only track real reads and writes.
    pub async fn refresh_online(&self) -> bool {
        let Some(remote) = self.remote.as_ref() else {
            return false;
        };
        let online = match tokio::time::timeout(self.remote_timeout, remote.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("Remote store unreachable: {}", e);
                false
            }
            Err(_) => {
                debug!("Remote store ping timed out after {:?}", self.remote_timeout);
                false
            }
        };
        self.set_online(online);
        online
    }

    /// Re-check reachability every `period` until the handle is aborted
    pub fn spawn_connectivity_monitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                store.refresh_online().await;
            }
        })
    }

    /// Network reachability as reported by the host
    pub fn set_online(&self, online: bool) {
        let mut health = self.lock_health();
        if health.is_online != online {
            info!("Remote store marked {}", if online { "online" } else { "offline" });
        }
        health.is_online = online;
    }

    fn lock_health(&self) -> std::sync::MutexGuard<'_, ConnectionHealth> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The remote, if it should be attempted right now
    fn healthy_remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        let remote = self.remote.as_ref()?;
        if self.lock_health().is_healthy(&self.policy) {
            Some(remote)
        } else {
            debug!("Remote store unhealthy, using local data only");
            None
        }
    }

    fn record_outcome<T>(&self, result: &Result<T, RemoteStoreError>) {
        let now = Utc::now();
        let mut health = self.lock_health();
        match result {
            Ok(_) => health.record_success(now),
            Err(e) => {
                health.record_failure(now);
                warn!(
                    "Remote store failure ({} in a row): {}",
                    health.consecutive_errors, e
                );
            }
        }
    }

    async fn remote_call<T, F>(&self, call: F) -> Result<T, RemoteStoreError>
    where
        F: Future<Output = Result<T, RemoteStoreError>>,
    {
        let result = match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteStoreError::Timeout(self.remote_timeout)),
        };
        self.record_outcome(&result);
        result
    }

    /// Persist one exchange; true when at least one copy was stored
    pub async fn save(&self, exchange: &ConversationExchange) -> bool {
        let saved_locally = match self.local.save(exchange) {
            Ok(()) => true,
            Err(e) => {
                warn!("Local save failed for {}: {:#}", exchange.id, e);
                false
            }
        };

        let Some(remote) = self.healthy_remote() else {
            return saved_locally;
        };

        let payload = match serde_json::to_value(RemoteRecord::from(exchange)) {
            Ok(value) => sanitize(value),
            Err(e) => {
                warn!("Could not serialize exchange {}: {}", exchange.id, e);
                return saved_locally;
            }
        };

        match self
            .remote_call(remote.create(&self.collection, payload))
            .await
        {
            Ok(remote_id) => {
                debug!("Exchange {} stored remotely as {}", exchange.id, remote_id);
                if saved_locally {
                    if let Err(e) = self.local.mark_remote(&exchange.user_id, &exchange.id, &remote_id) {
                        warn!("Failed to record remote id locally: {:#}", e);
                    }
                }
                true
            }
            Err(_) => saved_locally,
        }
    }

    /// Conversation history for a user, newest first
    pub async fn load(&self, user_id: &str) -> Vec<ConversationExchange> {
        if user_id.is_empty() {
            return Vec::new();
        }

        let Some(remote) = self.healthy_remote() else {
            return self.local.load(user_id);
        };

        let query = RemoteQuery::collection(self.collection.clone())
            .where_eq("user_id", Value::String(user_id.to_string()))
            .order_by("timestamp", Direction::Descending)
            .limit(self.local.capacity());

        let documents = match self.remote_call(remote.query(&query)).await {
            Ok(documents) => documents,
            Err(_) => return self.local.load(user_id),
        };

        if documents.is_empty() {
            return self.local.load(user_id);
        }

        let exchanges: Vec<ConversationExchange> = documents
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<RemoteRecord>(doc.data) {
                Ok(record) => Some(record.into_exchange(doc.id)),
                Err(e) => {
                    warn!("Skipping malformed remote document {}: {}", doc.id, e);
                    None
                }
            })
            .collect();

        if let Err(e) = self.local.mirror(user_id, &exchanges) {
            warn!("Failed to mirror remote history locally: {:#}", e);
        }

        info!("Loaded {} exchanges for {} from remote", exchanges.len(), user_id);
        exchanges
    }
}
