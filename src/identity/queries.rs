use serde::{Deserialize, Serialize};

/// SQL flavour of the remote identity source.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Postgres,
    Snowflake,
}

impl std::str::FromStr for Dialect {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "snowflake" => Ok(Dialect::Snowflake),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}

/// Fixed query text run over an authenticated session.
/// Neither query takes parameters; both rely on the session's own user context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteQueries {
    /// Zero or more rows, one role-name column. Direct and inherited roles.
    pub roles: String,
    /// At most one row: (version, current user).
    pub metadata: String,
}

impl RemoteQueries {
    pub fn postgres() -> Self {
        Self {
            roles: "SELECT role_name FROM information_schema.applicable_roles".into(),
            metadata: "SELECT version(), current_user".into(),
        }
    }

    pub fn snowflake() -> Self {
        Self {
            roles: "select role_name from UTIL_DB.INFORMATION_SCHEMA.APPLICABLE_ROLES".into(),
            metadata: "select current_version(), current_user()".into(),
        }
    }

    pub fn for_dialect(d: Dialect) -> Self {
        match d {
            Dialect::Postgres => Self::postgres(),
            Dialect::Snowflake => Self::snowflake(),
        }
    }
}

impl Default for RemoteQueries {
    fn default() -> Self { Self::postgres() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_parsing() {
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("snowflake".parse::<Dialect>().unwrap(), Dialect::Snowflake);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn snowflake_reads_applicable_roles_view() {
        let q = RemoteQueries::for_dialect(Dialect::Snowflake);
        assert!(q.roles.contains("APPLICABLE_ROLES"));
        assert!(q.metadata.contains("current_version()"));
    }
}
