//! Client identities that admission decisions are tracked against.

use std::fmt;

/// The key a request is counted under.
///
/// Exactly one identity governs a request: an API token when the client sends
/// one, otherwise the client's IP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Ip(String),
    Token(String),
}

impl Identity {
    /// Pick the identity for a request. A non-empty token always wins over
    /// the IP; the two are never combined.
    pub fn resolve(ip: &str, token: &str) -> Self {
        if token.is_empty() {
            Identity::Ip(ip.to_string())
        } else {
            Identity::Token(token.to_string())
        }
    }

    /// Namespace label, `ip` or `token`.
    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Ip(_) => "ip",
            Identity::Token(_) => "token",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Identity::Ip(value) | Identity::Token(value) => value,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_identity_without_token() {
        let identity = Identity::resolve("192.168.1.1", "");
        assert_eq!(identity, Identity::Ip("192.168.1.1".to_string()));
        assert_eq!(identity.to_string(), "ip:192.168.1.1");
    }

    #[test]
    fn test_token_takes_precedence() {
        let identity = Identity::resolve("192.168.1.1", "abc123");
        assert!(matches!(identity, Identity::Token(_)));
        assert_eq!(identity.value(), "abc123");
        assert_eq!(identity.to_string(), "token:abc123");
    }

    #[test]
    fn test_same_value_different_namespace() {
        let ip = Identity::Ip("abc".to_string());
        let token = Identity::Token("abc".to_string());
        assert_ne!(ip, token);
        assert_ne!(ip.to_string(), token.to_string());
    }
}
