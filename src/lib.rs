pub mod error;
pub mod identity;

pub use error::{RealmError, RealmResult};
pub use identity::{AuthProvider, Identity, RealmConfig, SqlRealm};
