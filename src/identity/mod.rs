//! Realm and principal for authenticating against a remote SQL identity source.
//! Keep the public surface thin and split implementation across sub-modules.

mod config;
mod connector;
mod descriptor;
#[cfg(any(test, feature = "memory"))]
mod memory;
mod postgres;
mod principal;
mod provider;
mod queries;
mod secret;

pub use config::{CachePolicy, RealmConfig, DEFAULT_DESCRIPTOR_ENV};
pub use connector::{resolve_metadata, resolve_roles, Connector, IdentityMetadata, RemoteSession, TextRow};
pub use descriptor::{ConnectionDescriptor, DescriptorSlot};
#[cfg(any(test, feature = "memory"))]
pub use memory::{MemoryConnector, MEMORY_SCHEME};
pub use postgres::{PgConnector, PgSession};
pub use principal::{Identity, IdentitySummary};
pub use provider::{AuthProvider, SqlRealm};
pub use queries::{Dialect, RemoteQueries};
pub use secret::Secret;
