use std::fmt;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{RealmError, RealmResult};

/// Opaque locator for the remote identity source (e.g. a postgres URL).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionDescriptor(String);

impl ConnectionDescriptor {
    /// Empty or whitespace-only values are rejected.
    pub fn parse(raw: &str) -> RealmResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RealmError::config("connection descriptor is empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Rendering safe for logs: the password in `user:password@` userinfo and any
    /// `password=` parameter (URL query or key/value DSN) are masked.
    pub fn redacted(&self) -> String { mask_password_params(&mask_userinfo(&self.0)) }
}

fn mask_userinfo(s: &str) -> String {
    let Some(scheme_end) = s.find("://") else { return s.to_string(); };
    let rest = &s[scheme_end + 3..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let Some(at) = authority.rfind('@') else { return s.to_string(); };
    let userinfo = &authority[..at];
    match userinfo.find(':') {
        Some(colon) => format!("{}{}:***{}", &s[..scheme_end + 3], &userinfo[..colon], &rest[at..]),
        None => s.to_string(),
    }
}

fn mask_password_params(s: &str) -> String {
    const KEY: &str = "password=";
    // ASCII lowering keeps byte offsets aligned with `s`
    let lower = s.to_ascii_lowercase();
    let mut out = String::with_capacity(s.len());
    let mut pos = 0;
    while let Some(found) = lower[pos..].find(KEY) {
        let start = pos + found;
        let value_start = start + KEY.len();
        out.push_str(&s[pos..value_start]);
        pos = value_start;
        let at_boundary = start == 0 || matches!(s.as_bytes()[start - 1], b'?' | b'&' | b';' | b' ' | b'\t');
        if !at_boundary {
            continue;
        }
        let value = &s[value_start..];
        let value_len = match value.strip_prefix('\'') {
            Some(quoted) => quoted.find('\'').map(|i| i + 2).unwrap_or(value.len()),
            None => value.find(['&', ';', ' ', '\t']).unwrap_or(value.len()),
        };
        out.push_str("***");
        pos += value_len;
    }
    out.push_str(&s[pos..]);
    out
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionDescriptor").field(&self.redacted()).finish()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.redacted()) }
}

/// Write-once holder for the realm's descriptor.
///
/// Precedence: an explicit value (config or `set`) wins over the environment
/// variable. A failed resolution leaves the slot empty so the next call retries.
pub struct DescriptorSlot {
    cell: OnceCell<ConnectionDescriptor>,
    configured: Option<String>,
    env_var: String,
}

impl DescriptorSlot {
    pub fn new(configured: Option<String>, env_var: impl Into<String>) -> Self {
        Self { cell: OnceCell::new(), configured, env_var: env_var.into() }
    }

    pub fn get(&self) -> Option<&ConnectionDescriptor> { self.cell.get() }

    pub fn env_var(&self) -> &str { &self.env_var }

    /// Explicitly set the descriptor. Fails once the slot has been resolved.
    pub fn set(&self, raw: &str) -> RealmResult<()> {
        let desc = ConnectionDescriptor::parse(raw)?;
        self.cell.set(desc).map_err(|_| {
            warn!(target: "sqlrealm::auth", "descriptor already resolved; ignoring explicit value");
            RealmError::config("connection descriptor already resolved")
        })
    }

    pub fn resolve(&self) -> RealmResult<&ConnectionDescriptor> {
        self.cell.get_or_try_init(|| {
            if let Some(raw) = self.configured.as_deref() {
                if let Ok(d) = ConnectionDescriptor::parse(raw) {
                    debug!(target: "sqlrealm::auth", "descriptor resolved from configuration: {}", d);
                    return Ok(d);
                }
            }
            match std::env::var(&self.env_var) {
                Ok(raw) => {
                    let d = ConnectionDescriptor::parse(&raw)?;
                    debug!(target: "sqlrealm::auth", "descriptor resolved from env {}: {}", self.env_var, d);
                    Ok(d)
                }
                Err(_) => Err(RealmError::config(format!(
                    "no connection descriptor configured, neither explicitly nor as environment variable {}",
                    self.env_var
                ))),
            }
        })
    }
}
