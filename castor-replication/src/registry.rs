//! Process-wide registry of replication domains.
//!
//! An explicit service object with an init/teardown lifecycle owned by the
//! embedding server — not static mutable state. Routes incoming updates to
//! the domain whose base DN covers their target and feeds the shared replay
//! engine.

use std::sync::Arc;

use castor_core::config::ReplicationConfig;
use castor_core::dn::Dn;
use castor_core::errors::{ReplayError, ReplicationResult};
use castor_core::message::UpdateMessage;
use dashmap::DashMap;
use tracing::info;

use crate::domain::ReplicationDomain;
use crate::replay::{ReplayEngine, UpdateToReplay};

/// Base DN → domain map plus the shared replay engine.
pub struct DomainRegistry {
    domains: DashMap<Dn, Arc<ReplicationDomain>>,
    engine: ReplayEngine,
}

impl DomainRegistry {
    /// Create the registry and its (not yet started) replay engine.
    pub fn new(config: &ReplicationConfig) -> Self {
        Self {
            domains: DashMap::new(),
            engine: ReplayEngine::new(config),
        }
    }

    /// Start the replay worker pool. Call once at server startup.
    pub async fn start(&self) {
        self.engine.start().await;
    }

    /// Quiesce the replay workers. Call at server shutdown.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    /// Reconfigure the replay worker count.
    pub async fn resize_replay_pool(&self, workers: usize) {
        self.engine.resize(workers).await;
    }

    /// Register a domain under its base DN.
    pub fn register(&self, domain: Arc<ReplicationDomain>) {
        info!(base_dn = %domain.base_dn(), "replication domain registered");
        self.domains.insert(domain.base_dn().clone(), domain);
    }

    /// Remove a domain.
    pub fn deregister(&self, base_dn: &Dn) -> Option<Arc<ReplicationDomain>> {
        let removed = self.domains.remove(base_dn).map(|(_, d)| d);
        if removed.is_some() {
            info!(%base_dn, "replication domain deregistered");
        }
        removed
    }

    /// The domain covering `dn`, deepest base DN first.
    pub fn find_domain(&self, dn: &Dn) -> Option<Arc<ReplicationDomain>> {
        self.domains
            .iter()
            .filter(|item| dn.is_subordinate_to(item.key()))
            .max_by_key(|item| item.key().depth())
            .map(|item| Arc::clone(item.value()))
    }

    /// Number of registered domains.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// True when no domain is registered.
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Route a received update to its domain and queue it for replay.
    /// Duplicate deliveries are dropped silently.
    pub async fn dispatch(&self, msg: UpdateMessage) -> ReplicationResult<()> {
        let domain = self
            .find_domain(msg.dn())
            .ok_or_else(|| ReplayError::NoDomainFor {
                dn: msg.dn().to_string(),
            })?;
        if domain.receive_update(msg.clone()) {
            self.engine.publish(UpdateToReplay { msg, domain }).await?;
        }
        Ok(())
    }
}
