//! Connection factory and role resolver seams.
//! A `Connector` turns (username, secret, descriptor) into a live `RemoteSession`;
//! the free functions below run the two read-only identity queries over it.

use async_trait::async_trait;
use tracing::debug;

use super::descriptor::ConnectionDescriptor;
use super::queries::RemoteQueries;
use super::secret::Secret;
use crate::error::{RealmError, RealmResult};

/// One text row as returned by the remote source; `None` is SQL NULL.
pub type TextRow = Vec<Option<String>>;

/// A live connection to the identity source, authenticated as one user.
/// Dropping the box releases the connection.
#[async_trait]
pub trait RemoteSession: Send {
    async fn query_rows(&mut self, sql: &str) -> RealmResult<Vec<TextRow>>;

    /// Release the connection now instead of at drop.
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Username and secret go to the remote source untouched; it does its own verification.
    async fn open(
        &self,
        username: &str,
        secret: &Secret,
        descriptor: &ConnectionDescriptor,
    ) -> RealmResult<Box<dyn RemoteSession>>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMetadata {
    pub remote_version: Option<String>,
    pub canonical_name: Option<String>,
}

/// All applicable role names, in the order the source returned them.
pub async fn resolve_roles(session: &mut dyn RemoteSession, queries: &RemoteQueries) -> RealmResult<Vec<String>> {
    let rows = session
        .query_rows(&queries.roles)
        .await
        .map_err(|e| RealmError::role_query(e.to_string()))?;
    let mut roles: Vec<String> = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(Some(r)) = row.into_iter().next() { roles.push(r); }
    }
    Ok(roles)
}

/// Version and canonical user. Best-effort: any failure leaves the fields unset.
pub async fn resolve_metadata(session: &mut dyn RemoteSession, queries: &RemoteQueries) -> IdentityMetadata {
    let rows = match session.query_rows(&queries.metadata).await {
        Ok(rows) => rows,
        Err(e) => {
            debug!(target: "sqlrealm::connector", "metadata query failed: {}", e);
            return IdentityMetadata::default();
        }
    };
    let Some(mut row) = rows.into_iter().next() else {
        debug!(target: "sqlrealm::connector", "metadata query returned no row");
        return IdentityMetadata::default();
    };
    let canonical_name = if row.len() > 1 { row.swap_remove(1) } else { None };
    let remote_version = row.into_iter().next().flatten();
    IdentityMetadata { remote_version, canonical_name }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned {
        rows: RealmResult<Vec<TextRow>>,
    }

    #[async_trait]
    impl RemoteSession for Canned {
        async fn query_rows(&mut self, _sql: &str) -> RealmResult<Vec<TextRow>> { self.rows.clone() }
        async fn close(self: Box<Self>) {}
    }

    fn row(cells: &[Option<&str>]) -> TextRow { cells.iter().map(|c| c.map(|s| s.to_string())).collect() }

    #[tokio::test]
    async fn roles_keep_order_and_duplicates() {
        let mut s = Canned { rows: Ok(vec![row(&[Some("ANALYST")]), row(&[Some("PUBLIC")]), row(&[Some("ANALYST")])]) };
        let roles = resolve_roles(&mut s, &RemoteQueries::default()).await.unwrap();
        assert_eq!(roles, vec!["ANALYST", "PUBLIC", "ANALYST"]);
    }

    #[tokio::test]
    async fn role_query_failure_is_role_query_error() {
        let mut s = Canned { rows: Err(RealmError::network("connection reset")) };
        let err = resolve_roles(&mut s, &RemoteQueries::default()).await.unwrap_err();
        assert!(matches!(err, RealmError::RoleQuery(_)));
    }

    #[tokio::test]
    async fn metadata_first_row_two_columns() {
        let mut s = Canned { rows: Ok(vec![row(&[Some("8.1.2"), Some("USER1")])]) };
        let md = resolve_metadata(&mut s, &RemoteQueries::default()).await;
        assert_eq!(md.remote_version.as_deref(), Some("8.1.2"));
        assert_eq!(md.canonical_name.as_deref(), Some("USER1"));
    }

    #[tokio::test]
    async fn metadata_absent_is_not_an_error() {
        let mut empty = Canned { rows: Ok(vec![]) };
        assert_eq!(resolve_metadata(&mut empty, &RemoteQueries::default()).await, IdentityMetadata::default());
        let mut failing = Canned { rows: Err(RealmError::network("boom")) };
        assert_eq!(resolve_metadata(&mut failing, &RemoteQueries::default()).await, IdentityMetadata::default());
        let mut short = Canned { rows: Ok(vec![row(&[Some("16.2")])]) };
        let md = resolve_metadata(&mut short, &RemoteQueries::default()).await;
        assert_eq!(md.remote_version.as_deref(), Some("16.2"));
        assert!(md.canonical_name.is_none());
    }
}
