//! Connection manager.
//!
//! Owns the set of live adapters keyed by source id, plus the per-source
//! subscription bookkeeping, and exposes the aggregate operations the rest
//! of the system uses. Construct one explicitly and share it from the
//! hosting service; there is no process-wide singleton.
//!
//! # Concurrency
//!
//! The source map is a `DashMap`, so operations on distinct ids do not
//! interfere and concurrent `add_server` calls lose no entries. Each
//! adapter sits behind its own async mutex: calls against the same id
//! serialize at the adapter, but a `remove_server` can still interleave
//! with an in-flight `read` on that id - the manager deliberately adds no
//! per-source serialization beyond what memory safety requires.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::config::{ProtocolConfig, SourceDescriptor};
use crate::core::data::Value;
use crate::core::error::{GatewayError, Result};
use crate::core::metadata::Protocol;
use crate::core::traits::{DataClient, PushHandler, ReadOutcome};
use crate::gateway::factory;

/// Point-in-time snapshot of one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    /// Source id.
    pub source_id: String,

    /// Protocol tag.
    pub protocol: Protocol,

    /// Whether the adapter currently believes its transport is open.
    pub connected: bool,

    /// Addresses with at least one active subscription.
    pub subscriptions: Vec<String>,
}

/// Subscription bookkeeping for one source.
#[derive(Default)]
struct SubscriptionBook {
    /// Subscribed addresses. A set: re-subscribing the same address does
    /// not duplicate the entry, though each call still registers its own
    /// delivery task (see [`DataManager::subscribe`]).
    addresses: BTreeSet<String>,

    /// Forwarding tasks. Finished handles are reaped on the next
    /// subscribe; live ones are aborted when the source is removed.
    tasks: Vec<JoinHandle<()>>,
}

/// One manager entry: the adapter and its subscription state.
struct SourceEntry {
    protocol: Protocol,
    client: Mutex<Box<dyn DataClient>>,
    book: Mutex<SubscriptionBook>,
}

/// Manager for a set of configured data sources.
///
/// Sole owner of every adapter's lifetime; nothing else holds an adapter
/// reference that outlives its entry here.
#[derive(Default)]
pub struct DataManager {
    sources: DashMap<String, Arc<SourceEntry>>,
}

impl DataManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if no sources are registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Check if a source id is registered.
    pub fn contains(&self, source_id: &str) -> bool {
        self.sources.contains_key(source_id)
    }

    fn entry(&self, source_id: &str) -> Result<Arc<SourceEntry>> {
        self.sources
            .get(source_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| {
                warn!(source_id, "source not found");
                GatewayError::SourceNotFound(source_id.to_string())
            })
    }

    /// Add a source and attempt the initial connect.
    ///
    /// Returns the connect outcome. A factory rejection (unsupported
    /// protocol) or duplicate id returns `false` without mutating state.
    /// On a failed connect the entry is *kept*, so a later read/write can
    /// retry the transport lazily.
    pub async fn add_server(&self, descriptor: &SourceDescriptor) -> bool {
        let client = match factory::create_client(descriptor) {
            Ok(client) => client,
            Err(e) => {
                error!(
                    source_id = %descriptor.id,
                    status = e.status(),
                    error = %e,
                    "cannot add source"
                );
                return false;
            }
        };

        let entry = Arc::new(SourceEntry {
            protocol: descriptor.protocol,
            client: Mutex::new(client),
            book: Mutex::new(SubscriptionBook::default()),
        });

        match self.sources.entry(descriptor.id.clone()) {
            Entry::Occupied(_) => {
                warn!(source_id = %descriptor.id, "source id already registered");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
            }
        }

        let outcome = entry.client.lock().await.connect().await;
        match outcome {
            Ok(()) => {
                info!(source_id = %descriptor.id, protocol = %descriptor.protocol, "source added");
                true
            }
            Err(e) => {
                // Entry stays registered for a later lazy reconnect.
                warn!(
                    source_id = %descriptor.id,
                    error = %e,
                    "source added but initial connect failed"
                );
                false
            }
        }
    }

    /// Remove a source: abort its delivery tasks, disconnect the adapter,
    /// and discard the entry with its subscription set. Removing an absent
    /// id is a logged no-op.
    pub async fn remove_server(&self, source_id: &str) {
        let Some((_, entry)) = self.sources.remove(source_id) else {
            info!(source_id, "remove ignored, source not registered");
            return;
        };

        {
            let mut book = entry.book.lock().await;
            for task in book.tasks.drain(..) {
                task.abort();
            }
            book.addresses.clear();
        }

        entry.client.lock().await.disconnect().await;
        info!(source_id, "source removed");
    }

    /// Read a single point from a source.
    pub async fn read(
        &self,
        source_id: &str,
        address: &str,
        overrides: Option<&ProtocolConfig>,
    ) -> Result<ReadOutcome> {
        let entry = self.entry(source_id)?;
        let mut client = entry.client.lock().await;
        client.read(address, overrides).await
    }

    /// Write a single point on a source.
    pub async fn write(
        &self,
        source_id: &str,
        address: &str,
        value: Value,
        overrides: Option<&ProtocolConfig>,
    ) -> Result<()> {
        let entry = self.entry(source_id)?;
        let mut client = entry.client.lock().await;
        client.write(address, value, overrides).await
    }

    /// Subscribe `handler` to push updates for one address on one source.
    ///
    /// The address lands in the source's subscription set (deduplicated),
    /// but every call registers its own delivery task: subscribing the
    /// same handler twice fires it twice per push. That mirrors the
    /// adapter-level callback accumulation of the observed baseline and is
    /// left intact deliberately.
    pub async fn subscribe(
        &self,
        source_id: &str,
        address: &str,
        handler: Arc<dyn PushHandler>,
        overrides: Option<&ProtocolConfig>,
    ) -> Result<()> {
        let entry = self.entry(source_id)?;

        let mut receiver = {
            let mut client = entry.client.lock().await;
            client.subscribe(address, overrides).await?
        };

        let id = source_id.to_string();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => handler.on_push(&id, message).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(source_id = %id, missed, "push subscriber lagged, frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut book = entry.book.lock().await;
        book.tasks.retain(|t| !t.is_finished());
        book.addresses.insert(address.to_string());
        book.tasks.push(task);
        info!(source_id, address, "subscription registered");
        Ok(())
    }

    /// Point-in-time status snapshot for one source.
    pub async fn get_status(&self, source_id: &str) -> Result<SourceStatus> {
        let entry = self.entry(source_id)?;
        let connected = entry.client.lock().await.is_connected();
        let subscriptions = entry.book.lock().await.addresses.iter().cloned().collect();

        Ok(SourceStatus {
            source_id: source_id.to_string(),
            protocol: entry.protocol,
            connected,
            subscriptions,
        })
    }

    /// Status snapshots for every registered source.
    pub async fn get_all_statuses(&self) -> Vec<SourceStatus> {
        let ids: Vec<String> = self.sources.iter().map(|e| e.key().clone()).collect();

        let mut statuses = Vec::with_capacity(ids.len());
        for id in ids {
            // A source removed between the key scan and here just drops
            // out of the snapshot.
            if let Ok(status) = self.get_status(&id).await {
                statuses.push(status);
            }
        }
        statuses
    }
}
