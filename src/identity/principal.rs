use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::connector::{resolve_metadata, resolve_roles, Connector, RemoteSession};
use super::descriptor::ConnectionDescriptor;
use super::queries::RemoteQueries;
use super::secret::Secret;
use crate::error::RealmResult;

/// An authenticated user of the remote identity source, with the roles it held at login.
///
/// Immutable once built. The secret is kept only so `connect` can open new
/// sessions as this user later.
#[derive(Clone)]
pub struct Identity {
    login_name: String,
    canonical_name: Option<String>,
    roles: Arc<[String]>,
    remote_version: Option<String>,
    descriptor: ConnectionDescriptor,
    secret: Secret,
    authenticated_at: Instant,
    connector: Arc<dyn Connector>,
}

/// Loggable view of an identity; carries no secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentitySummary {
    pub login_name: String,
    #[serde(default)]
    pub canonical_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub remote_version: Option<String>,
    pub descriptor: String,
}

impl Identity {
    /// Verify the credential against the source and resolve roles and metadata over one session.
    ///
    /// Fails if the connection is refused or the role query fails. Missing metadata
    /// only leaves `canonical_name`/`remote_version` unset. The session is released
    /// before returning on every path.
    pub async fn new(
        username: &str,
        secret: Secret,
        descriptor: ConnectionDescriptor,
        connector: Arc<dyn Connector>,
        queries: &RemoteQueries,
    ) -> RealmResult<Self> {
        let mut session = connector.open(username, &secret, &descriptor).await?;
        let roles = resolve_roles(session.as_mut(), queries).await?;
        let md = resolve_metadata(session.as_mut(), queries).await;
        session.close().await;
        debug!(
            target: "sqlrealm::auth",
            "identity resolved login={} canonical={:?} roles={}",
            username, md.canonical_name, roles.len()
        );
        Ok(Self {
            login_name: username.to_string(),
            canonical_name: md.canonical_name,
            roles: roles.into(),
            remote_version: md.remote_version,
            descriptor,
            secret,
            authenticated_at: Instant::now(),
            connector,
        })
    }

    /// Name exactly as presented at login.
    pub fn login_name(&self) -> &str { &self.login_name }

    /// The source's own rendering of the user, e.g. `USER1` for login `user1`.
    pub fn canonical_name(&self) -> Option<&str> { self.canonical_name.as_deref() }

    pub fn roles(&self) -> &[String] { &self.roles }

    pub fn has_role(&self, role: &str) -> bool { self.roles.iter().any(|r| r == role) }

    pub fn remote_version(&self) -> Option<&str> { self.remote_version.as_deref() }

    pub fn descriptor(&self) -> &ConnectionDescriptor { &self.descriptor }

    pub fn authenticated_at(&self) -> Instant { self.authenticated_at }

    /// Sensitive: the cleartext credential this identity logged in with.
    /// Only meant for reconnecting as this user.
    pub fn secret(&self) -> &Secret { &self.secret }

    /// Open a fresh session as this user. The caller owns and releases it.
    pub async fn connect(&self) -> RealmResult<Box<dyn RemoteSession>> {
        self.connector.open(&self.login_name, &self.secret, &self.descriptor).await
    }

    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            login_name: self.login_name.clone(),
            canonical_name: self.canonical_name.clone(),
            roles: self.roles.to_vec(),
            remote_version: self.remote_version.clone(),
            descriptor: self.descriptor.redacted(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("login_name", &self.login_name)
            .field("canonical_name", &self.canonical_name)
            .field("roles", &self.roles)
            .field("remote_version", &self.remote_version)
            .field("descriptor", &self.descriptor)
            .field("connector", &self.connector.name())
            .finish_non_exhaustive()
    }
}
