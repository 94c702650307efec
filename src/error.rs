//! Realm error model.
//! Internal taxonomy for everything that can go wrong while resolving an identity.
//! None of these cross the `authenticate` boundary; they exist so logs can tell
//! "misconfigured" apart from "bad password".

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RealmError {
    /// Connection descriptor missing, empty or frozen.
    #[error("config: {0}")]
    Config(String),
    /// The connector cannot speak to the target the descriptor names.
    #[error("driver_unavailable: {0}")]
    DriverUnavailable(String),
    /// Remote source refused the username/secret pair.
    #[error("credential_rejected: {0}")]
    CredentialRejected(String),
    /// Role-applicability query failed; the identity is unusable.
    #[error("role_query: {0}")]
    RoleQuery(String),
    #[error("network: {0}")]
    Network(String),
    #[error("timeout: {0}")]
    Timeout(String),
}

impl RealmError {
    pub fn config<S: Into<String>>(msg: S) -> Self { RealmError::Config(msg.into()) }
    pub fn driver<S: Into<String>>(msg: S) -> Self { RealmError::DriverUnavailable(msg.into()) }
    pub fn rejected<S: Into<String>>(msg: S) -> Self { RealmError::CredentialRejected(msg.into()) }
    pub fn role_query<S: Into<String>>(msg: S) -> Self { RealmError::RoleQuery(msg.into()) }
    pub fn network<S: Into<String>>(msg: S) -> Self { RealmError::Network(msg.into()) }
    pub fn timeout<S: Into<String>>(msg: S) -> Self { RealmError::Timeout(msg.into()) }

    pub fn code_str(&self) -> &'static str {
        match self {
            RealmError::Config(_) => "config",
            RealmError::DriverUnavailable(_) => "driver_unavailable",
            RealmError::CredentialRejected(_) => "credential_rejected",
            RealmError::RoleQuery(_) => "role_query",
            RealmError::Network(_) => "network",
            RealmError::Timeout(_) => "timeout",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RealmError::Config(m)
            | RealmError::DriverUnavailable(m)
            | RealmError::CredentialRejected(m)
            | RealmError::RoleQuery(m)
            | RealmError::Network(m)
            | RealmError::Timeout(m) => m.as_str(),
        }
    }

    /// Deployment problems rather than anything the caller supplied.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, RealmError::Config(_) | RealmError::DriverUnavailable(_))
    }

    /// Closest SQLSTATE for hosts that surface the rejection over a SQL wire protocol.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            RealmError::Config(_) | RealmError::DriverUnavailable(_) => "08001", // sqlclient_unable_to_establish_sqlconnection
            RealmError::CredentialRejected(_) => "28000", // invalid_authorization_specification
            RealmError::RoleQuery(_) => "XX000",
            RealmError::Network(_) => "08006", // connection_failure
            RealmError::Timeout(_) => "57014", // query_canceled
        }
    }
}

pub type RealmResult<T> = Result<T, RealmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misconfiguration_is_distinct_from_rejection() {
        assert!(RealmError::config("no descriptor").is_misconfiguration());
        assert!(RealmError::driver("jdbc:snowflake").is_misconfiguration());
        assert!(!RealmError::rejected("bad password").is_misconfiguration());
        assert!(!RealmError::network("reset").is_misconfiguration());
    }

    #[test]
    fn display_carries_code_and_message() {
        let e = RealmError::rejected("password authentication failed");
        assert_eq!(e.to_string(), "credential_rejected: password authentication failed");
        assert_eq!(e.code_str(), "credential_rejected");
        assert_eq!(e.message(), "password authentication failed");
    }

    #[test]
    fn sqlstate_mapping() {
        assert_eq!(RealmError::rejected("x").sqlstate(), "28000");
        assert_eq!(RealmError::network("x").sqlstate(), "08006");
        assert_eq!(RealmError::config("x").sqlstate(), "08001");
        assert_eq!(RealmError::timeout("x").sqlstate(), "57014");
    }
}
