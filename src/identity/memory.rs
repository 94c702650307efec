//! In-process identity source speaking the same query contract as a real one.
//! Used by the test suite and by hosts that want to exercise the realm without a database.
//! Only built with the `memory` feature.
//! Accepts descriptors starting with `memory:`; anything else is a missing driver.
//! User lookup is case-insensitive and the canonical name defaults to upper case,
//! mirroring sources that fold unquoted identifiers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::connector::{Connector, RemoteSession, TextRow};
use super::descriptor::ConnectionDescriptor;
use super::queries::RemoteQueries;
use super::secret::Secret;
use crate::error::{RealmError, RealmResult};

pub const MEMORY_SCHEME: &str = "memory:";

#[derive(Debug, Clone)]
struct MemoryUser {
    secret: String,
    roles: Vec<String>,
    canonical_name: String,
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    released: AtomicUsize,
    role_queries: AtomicUsize,
}

pub struct MemoryConnector {
    users: RwLock<HashMap<String, MemoryUser>>,
    queries: RemoteQueries,
    version: RwLock<Option<String>>,
    fail_role_query: AtomicBool,
    open_delay_ms: AtomicU64,
    counters: Arc<Counters>,
}

impl Default for MemoryConnector {
    fn default() -> Self { Self::new(RemoteQueries::default()) }
}

impl MemoryConnector {
    pub fn new(queries: RemoteQueries) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            queries,
            version: RwLock::new(Some("memory-1.0".to_string())),
            fail_role_query: AtomicBool::new(false),
            open_delay_ms: AtomicU64::new(0),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn add_user(&self, username: &str, secret: &str, roles: &[&str]) {
        self.add_user_as(username, secret, roles, &username.to_uppercase());
    }

    pub fn add_user_as(&self, username: &str, secret: &str, roles: &[&str], canonical_name: &str) {
        self.users.write().insert(
            username.to_lowercase(),
            MemoryUser {
                secret: secret.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
                canonical_name: canonical_name.to_string(),
            },
        );
    }

    pub fn remove_user(&self, username: &str) -> bool { self.users.write().remove(&username.to_lowercase()).is_some() }

    pub fn set_password(&self, username: &str, secret: &str) {
        if let Some(u) = self.users.write().get_mut(&username.to_lowercase()) { u.secret = secret.to_string(); }
    }

    pub fn set_roles(&self, username: &str, roles: &[&str]) {
        if let Some(u) = self.users.write().get_mut(&username.to_lowercase()) {
            u.roles = roles.iter().map(|r| r.to_string()).collect();
        }
    }

    /// `None` makes the metadata query return no row.
    pub fn set_version(&self, version: Option<&str>) { *self.version.write() = version.map(|v| v.to_string()); }

    pub fn fail_role_query(&self, fail: bool) { self.fail_role_query.store(fail, Ordering::SeqCst); }

    pub fn set_open_delay(&self, delay: Duration) { self.open_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst); }

    pub fn opened(&self) -> usize { self.counters.opened.load(Ordering::SeqCst) }
    pub fn released(&self) -> usize { self.counters.released.load(Ordering::SeqCst) }
    pub fn role_queries(&self) -> usize { self.counters.role_queries.load(Ordering::SeqCst) }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(
        &self,
        username: &str,
        secret: &Secret,
        descriptor: &ConnectionDescriptor,
    ) -> RealmResult<Box<dyn RemoteSession>> {
        if !descriptor.as_str().starts_with(MEMORY_SCHEME) {
            return Err(RealmError::driver(format!("no driver available for {}", descriptor)));
        }
        let delay = self.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 { tokio::time::sleep(Duration::from_millis(delay)).await; }
        let user = {
            let users = self.users.read();
            match users.get(&username.to_lowercase()) {
                Some(u) if u.secret == secret.expose() => u.clone(),
                _ => return Err(RealmError::rejected(format!("incorrect username or password for '{}'", username))),
            }
        };
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            user,
            queries: self.queries.clone(),
            version: self.version.read().clone(),
            fail_role_query: self.fail_role_query.load(Ordering::SeqCst),
            counters: self.counters.clone(),
        }))
    }

    fn name(&self) -> &'static str { "memory" }
}

struct MemorySession {
    user: MemoryUser,
    queries: RemoteQueries,
    version: Option<String>,
    fail_role_query: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn query_rows(&mut self, sql: &str) -> RealmResult<Vec<TextRow>> {
        if sql == self.queries.roles {
            self.counters.role_queries.fetch_add(1, Ordering::SeqCst);
            if self.fail_role_query {
                return Err(RealmError::network("applicable roles view unavailable"));
            }
            return Ok(self.user.roles.iter().map(|r| vec![Some(r.clone())]).collect());
        }
        if sql == self.queries.metadata {
            return Ok(match &self.version {
                Some(v) => vec![vec![Some(v.clone()), Some(self.user.canonical_name.clone())]],
                None => Vec::new(),
            });
        }
        Err(RealmError::network(format!("unsupported statement: {}", sql)))
    }

    async fn close(self: Box<Self>) {}
}

impl Drop for MemorySession {
    fn drop(&mut self) { self.counters.released.fetch_add(1, Ordering::SeqCst); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::connector::resolve_roles;

    fn desc() -> ConnectionDescriptor { ConnectionDescriptor::parse("memory://idp").unwrap() }

    #[tokio::test]
    async fn rejects_wrong_secret_and_unknown_user() {
        let c = MemoryConnector::default();
        c.add_user("alice", "pw", &["PUBLIC"]);
        assert!(matches!(c.open("alice", &Secret::from("nope"), &desc()).await, Err(RealmError::CredentialRejected(_))));
        assert!(matches!(c.open("bob", &Secret::from("pw"), &desc()).await, Err(RealmError::CredentialRejected(_))));
        assert_eq!(c.opened(), 0);
    }

    #[tokio::test]
    async fn session_release_counted_on_close_and_drop() {
        let c = MemoryConnector::default();
        c.add_user("alice", "pw", &["PUBLIC", "ANALYST"]);
        let mut s = c.open("ALICE", &Secret::from("pw"), &desc()).await.unwrap();
        let roles = resolve_roles(s.as_mut(), &RemoteQueries::default()).await.unwrap();
        assert_eq!(roles, vec!["PUBLIC", "ANALYST"]);
        s.close().await;
        let s2 = c.open("alice", &Secret::from("pw"), &desc()).await.unwrap();
        drop(s2);
        assert_eq!(c.opened(), 2);
        assert_eq!(c.released(), 2);
    }

    #[tokio::test]
    async fn non_memory_descriptor_has_no_driver() {
        let c = MemoryConnector::default();
        c.add_user("alice", "pw", &[]);
        let d = ConnectionDescriptor::parse("jdbc:snowflake://acme.snowflakecomputing.com").unwrap();
        assert!(matches!(c.open("alice", &Secret::from("pw"), &d).await, Err(RealmError::DriverUnavailable(_))));
    }
}
