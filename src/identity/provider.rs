use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::config::{CachePolicy, RealmConfig};
use super::connector::Connector;
use super::descriptor::{ConnectionDescriptor, DescriptorSlot};
use super::postgres::PgConnector;
use super::principal::Identity;
use super::queries::RemoteQueries;
use super::secret::Secret;
use crate::error::{RealmError, RealmResult};

/// Entry point the host calls per inbound authentication.
/// The contract is binary: an identity, or `None`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, username: &str, credential: &str) -> Option<Arc<Identity>>;

    /// Identity from an earlier successful `authenticate`, without touching the source.
    fn lookup_cached(&self, username: &str) -> Option<Arc<Identity>>;

    /// Always `None`: cleartext credentials are never handed out by name.
    fn password_for(&self, _username: &str) -> Option<String> { None }
}

/// Realm backed by a remote SQL identity source, caching one identity per login name.
///
/// Cache keys are the login string exactly as given; `user1` and `USER1` are separate
/// entries even when the source treats them as one account. Under the default
/// `CachePolicy::TrustCached` a cached login is returned without checking the
/// supplied credential again.
pub struct SqlRealm {
    descriptor: DescriptorSlot,
    connector: Arc<dyn Connector>,
    queries: RemoteQueries,
    policy: CachePolicy,
    directory: RwLock<HashMap<String, Arc<Identity>>>,
    // per-login gates so concurrent cold lookups resolve once
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SqlRealm {
    pub fn new(config: &RealmConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            descriptor: DescriptorSlot::new(config.descriptor.clone(), config.descriptor_env_var.clone()),
            connector,
            queries: RemoteQueries::for_dialect(config.dialect),
            policy: config.cache_policy,
            directory: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn postgres(config: &RealmConfig) -> Self {
        let connector = PgConnector::new(config.connect_timeout(), config.query_timeout());
        Self::new(config, Arc::new(connector))
    }

    /// Replace the dialect's query text, e.g. for a source exposing roles under another view.
    pub fn with_queries(mut self, queries: RemoteQueries) -> Self {
        self.queries = queries;
        self
    }

    /// Resolved descriptor, if any call has resolved it yet.
    pub fn descriptor(&self) -> Option<&ConnectionDescriptor> { self.descriptor.get() }

    /// Explicitly configure the descriptor. Only allowed before it has been resolved.
    pub fn set_descriptor(&self, raw: &str) -> RealmResult<()> { self.descriptor.set(raw) }

    pub fn cache_policy(&self) -> CachePolicy { self.policy }

    pub fn cached_count(&self) -> usize { self.directory.read().len() }

    /// Drop one cached identity; the next `authenticate` for it goes to the source.
    pub fn evict(&self, username: &str) -> bool {
        let removed = self.directory.write().remove(username).is_some();
        if removed { debug!(target: "sqlrealm::auth", "evicted cached identity for \"{}\"", username); }
        removed
    }

    pub fn clear(&self) {
        let mut dir = self.directory.write();
        debug!(target: "sqlrealm::auth", "clearing {} cached identities", dir.len());
        dir.clear();
    }

    fn trusted_entry(&self, username: &str) -> Option<Arc<Identity>> {
        let hit = self.directory.read().get(username).cloned()?;
        if self.policy.trusts(hit.authenticated_at().elapsed()) {
            debug!(target: "sqlrealm::auth", "cache hit for \"{}\"", username);
            Some(hit)
        } else {
            debug!(target: "sqlrealm::auth", "cached identity for \"{}\" needs re-verification", username);
            None
        }
    }

    fn gate_for(&self, username: &str) -> GateTicket<'_> {
        let gate = self.inflight.lock().entry(username.to_string()).or_default().clone();
        GateTicket { realm: self, username: username.to_string(), gate: Some(gate) }
    }

    async fn resolve_uncached(
        &self,
        username: &str,
        credential: &str,
        descriptor: ConnectionDescriptor,
    ) -> Option<Arc<Identity>> {
        // another caller may have finished while we waited on the gate
        if let Some(hit) = self.trusted_entry(username) {
            return Some(hit);
        }
        let built = Identity::new(
            username,
            Secret::from(credential),
            descriptor.clone(),
            self.connector.clone(),
            &self.queries,
        )
        .await;
        match built {
            Ok(identity) => {
                let identity = Arc::new(identity);
                self.directory.write().insert(username.to_string(), identity.clone());
                info!(
                    target: "sqlrealm::auth",
                    "authenticated \"{}\" as {:?} with {} role(s)",
                    username, identity.canonical_name(), identity.roles().len()
                );
                Some(identity)
            }
            Err(e @ RealmError::DriverUnavailable(_)) => {
                warn!(target: "sqlrealm::auth", "cannot authenticate \"{}\": {} (check deployment)", username, e);
                None
            }
            Err(e) => {
                debug!(
                    target: "sqlrealm::auth",
                    "failed to login with the provided credentials for \"{}\" with {}: {}",
                    username, descriptor, e
                );
                None
            }
        }
    }
}

/// Holds one clone of a login's gate and removes the gate from the table when the
/// last holder lets go. Clones are only made or dropped under the `inflight` lock,
/// so the strong count seen there is exact.
struct GateTicket<'a> {
    realm: &'a SqlRealm,
    username: String,
    gate: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl GateTicket<'_> {
    async fn lock(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.gate {
            Some(g) => Some(g.lock().await),
            None => None,
        }
    }
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        let Some(gate) = self.gate.take() else { return; };
        let mut map = self.realm.inflight.lock();
        if let Some(current) = map.get(&self.username) {
            // table + ours
            if Arc::ptr_eq(current, &gate) && Arc::strong_count(&gate) == 2 {
                map.remove(&self.username);
            }
        }
        drop(gate);
    }
}

#[async_trait]
impl AuthProvider for SqlRealm {
    async fn authenticate(&self, username: &str, credential: &str) -> Option<Arc<Identity>> {
        let descriptor = match self.descriptor.resolve() {
            Ok(d) => d.clone(),
            Err(e) => {
                debug!(target: "sqlrealm::auth", "rejecting \"{}\": {}", username, e);
                return None;
            }
        };
        debug!(target: "sqlrealm::auth", "authenticating \"{}\" via {} against {}", username, self.connector.name(), descriptor);
        if let Some(hit) = self.trusted_entry(username) {
            return Some(hit);
        }
        // dropped after `_turn`, also when the caller abandons this future
        let ticket = self.gate_for(username);
        let _turn = ticket.lock().await;
        self.resolve_uncached(username, credential, descriptor).await
    }

    fn lookup_cached(&self, username: &str) -> Option<Arc<Identity>> { self.directory.read().get(username).cloned() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::memory::MemoryConnector;

    fn realm(connector: Arc<MemoryConnector>) -> SqlRealm {
        let cfg = RealmConfig::default().with_descriptor("memory://idp");
        SqlRealm::new(&cfg, connector)
    }

    #[tokio::test]
    async fn gate_is_released_after_resolution() {
        let c = Arc::new(MemoryConnector::default());
        c.add_user("alice", "pw", &["PUBLIC"]);
        let r = realm(c.clone());
        assert!(r.authenticate("alice", "pw").await.is_some());
        assert!(r.authenticate("mallory", "pw").await.is_none());
        assert!(r.inflight.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn abandoned_logins_leave_no_gates_behind() {
        let c = Arc::new(MemoryConnector::default());
        c.set_open_delay(std::time::Duration::from_millis(200));
        let r = Arc::new(realm(c.clone()));

        let mut handles = Vec::new();
        for i in 0..50 {
            let r = r.clone();
            handles.push(tokio::spawn(async move { r.authenticate(&format!("throwaway{}", i), "x").await }));
        }
        // two waiters on the same login, abandoned while one holds the gate
        for _ in 0..2 {
            let r = r.clone();
            handles.push(tokio::spawn(async move { r.authenticate("shared", "x").await }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        for h in &handles { h.abort(); }
        for h in handles {
            let res = h.await;
            assert!(res.map(|id| id.is_none()).unwrap_or_else(|e| e.is_cancelled()));
        }
        assert!(r.inflight.lock().is_empty(), "gates left: {}", r.inflight.lock().len());
        assert_eq!(r.cached_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_finishers_remove_the_shared_gate() {
        let c = Arc::new(MemoryConnector::default());
        c.add_user("alice", "pw", &["PUBLIC"]);
        c.set_open_delay(std::time::Duration::from_millis(20));
        let r = Arc::new(realm(c.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let r = r.clone();
                tokio::spawn(async move { r.authenticate("alice", "pw").await })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap().is_some());
        }
        assert!(r.inflight.lock().is_empty());
        assert_eq!(c.opened(), 1);
    }

    #[tokio::test]
    async fn evict_forces_a_fresh_resolution() {
        let c = Arc::new(MemoryConnector::default());
        c.add_user("alice", "pw", &["PUBLIC"]);
        let r = realm(c.clone());
        r.authenticate("alice", "pw").await.unwrap();
        c.set_roles("alice", &["PUBLIC", "AUDITOR"]);
        assert_eq!(r.authenticate("alice", "pw").await.unwrap().roles().len(), 1);
        assert!(r.evict("alice"));
        assert!(!r.evict("alice"));
        let fresh = r.authenticate("alice", "pw").await.unwrap();
        assert!(fresh.has_role("AUDITOR"));
        assert_eq!(c.opened(), 2);
    }

    #[tokio::test]
    async fn password_is_never_exposed() {
        let c = Arc::new(MemoryConnector::default());
        c.add_user("alice", "pw", &[]);
        let r = realm(c);
        r.authenticate("alice", "pw").await.unwrap();
        assert_eq!(r.password_for("alice"), None);
        assert_eq!(r.password_for("nobody"), None);
    }
}
