use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::debug;

use super::connector::{Connector, RemoteSession, TextRow};
use super::descriptor::ConnectionDescriptor;
use super::secret::Secret;
use crate::error::{RealmError, RealmResult};

/// `Connector` backed by tokio-postgres. Each `open` is a fresh, unpooled connection.
#[derive(Debug, Clone)]
pub struct PgConnector {
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for PgConnector {
    fn default() -> Self {
        Self { connect_timeout: Duration::from_secs(10), query_timeout: Duration::from_secs(30) }
    }
}

impl PgConnector {
    pub fn new(connect_timeout: Duration, query_timeout: Duration) -> Self { Self { connect_timeout, query_timeout } }

    /// Parse the descriptor into a driver config. `jdbc:postgresql://` is accepted; other
    /// `jdbc:` targets name a driver this connector does not have.
    pub fn config_for(descriptor: &ConnectionDescriptor) -> RealmResult<Config> {
        let raw = descriptor.as_str();
        let raw = match raw.strip_prefix("jdbc:") {
            Some(rest) if rest.starts_with("postgresql:") || rest.starts_with("postgres:") => rest,
            Some(_) => return Err(RealmError::driver(format!("no driver available for {}", descriptor))),
            None => raw,
        };
        raw.parse::<Config>()
            .map_err(|e| RealmError::driver(format!("descriptor {} not usable by postgres driver: {}", descriptor, e)))
    }
}

fn classify(err: tokio_postgres::Error) -> RealmError {
    if let Some(state) = err.code() {
        if state.code().starts_with("28") {
            return RealmError::rejected(err.to_string());
        }
    }
    if err.is_closed() {
        return RealmError::network(format!("connection closed: {}", err));
    }
    RealmError::network(err.to_string())
}

#[async_trait]
impl Connector for PgConnector {
    async fn open(
        &self,
        username: &str,
        secret: &Secret,
        descriptor: &ConnectionDescriptor,
    ) -> RealmResult<Box<dyn RemoteSession>> {
        let mut cfg = Self::config_for(descriptor)?;
        cfg.user(username).password(secret.expose()).connect_timeout(self.connect_timeout);
        let (client, conn) = tokio::time::timeout(self.connect_timeout, cfg.connect(NoTls))
            .await
            .map_err(|_| RealmError::timeout(format!("connect to {} exceeded {:?}", descriptor, self.connect_timeout)))?
            .map_err(classify)?;
        // drive the connection in background; ends once the client is dropped
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(target: "sqlrealm::connector", "postgres connection ended: {}", e);
            }
        });
        Ok(Box::new(PgSession { client, driver, query_timeout: self.query_timeout }))
    }

    fn name(&self) -> &'static str { "postgres" }
}

pub struct PgSession {
    client: Client,
    driver: JoinHandle<()>,
    query_timeout: Duration,
}

#[async_trait]
impl RemoteSession for PgSession {
    async fn query_rows(&mut self, sql: &str) -> RealmResult<Vec<TextRow>> {
        let msgs = tokio::time::timeout(self.query_timeout, self.client.simple_query(sql))
            .await
            .map_err(|_| RealmError::timeout(format!("query exceeded {:?}", self.query_timeout)))?
            .map_err(classify)?;
        let mut rows: Vec<TextRow> = Vec::new();
        for m in msgs {
            if let SimpleQueryMessage::Row(r) = m {
                rows.push((0..r.len()).map(|i| r.get(i).map(|s| s.to_string())).collect());
            }
        }
        Ok(rows)
    }

    async fn close(self: Box<Self>) {
        let PgSession { client, driver, .. } = *self;
        drop(client);
        if tokio::time::timeout(Duration::from_secs(1), driver).await.is_err() {
            debug!(target: "sqlrealm::connector", "postgres driver task did not stop in time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(s: &str) -> ConnectionDescriptor { ConnectionDescriptor::parse(s).unwrap() }

    #[test]
    fn accepts_postgres_urls_and_dsn() {
        assert!(PgConnector::config_for(&desc("postgres://db.local:5432/idp")).is_ok());
        assert!(PgConnector::config_for(&desc("jdbc:postgresql://db.local/idp")).is_ok());
        assert!(PgConnector::config_for(&desc("host=db.local dbname=idp")).is_ok());
    }

    #[test]
    fn foreign_jdbc_target_is_driver_unavailable() {
        let err = PgConnector::config_for(&desc("jdbc:snowflake://acme.snowflakecomputing.com/?warehouse=wh")).unwrap_err();
        assert!(matches!(err, RealmError::DriverUnavailable(_)));
        assert!(err.is_misconfiguration());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_or_timeout() {
        // port 1 on loopback refuses immediately on most hosts
        let c = PgConnector::new(Duration::from_millis(500), Duration::from_millis(500));
        let res = c.open("alice", &Secret::from("pw"), &desc("postgres://127.0.0.1:1/idp")).await;
        match res {
            Err(RealmError::Network(_)) | Err(RealmError::Timeout(_)) => {}
            Err(other) => panic!("unexpected error class: {}", other),
            Ok(_) => panic!("connect to a closed port should fail"),
        }
    }
}
