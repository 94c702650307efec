use std::fmt;

use zeroize::Zeroizing;

/// Cleartext credential relayed to the remote source.
/// Formatting never shows the value; `expose` is the only way out.
/// The buffer is wiped when the last copy is dropped.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new<S: Into<String>>(value: S) -> Self { Self(Zeroizing::new(value.into())) }

    /// Sensitive: returns the cleartext.
    pub fn expose(&self) -> &str { self.0.as_str() }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool { self.expose() == other.expose() }
}

impl Eq for Secret {}

impl From<&str> for Secret {
    fn from(s: &str) -> Self { Self::new(s) }
}

impl From<String> for Secret {
    fn from(s: String) -> Self { Self::new(s) }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Secret([REDACTED])") }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("[REDACTED]") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting_redacts() {
        let s = Secret::from("hunter2");
        assert!(!format!("{:?}", s).contains("hunter2"));
        assert_eq!(s.to_string(), "[REDACTED]");
        assert_eq!(s.expose(), "hunter2");
    }

    #[test]
    fn clones_compare_by_value() {
        let a = Secret::new(String::from("pw"));
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Secret::from("other"));
        drop(a);
        assert_eq!(b.expose(), "pw");
    }
}
