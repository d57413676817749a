//! Decision types returned to the resolution path.

use std::fmt;
use std::net::IpAddr;

/// Decision represents what the resolution path should do with a queried host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Resolve normally
    Allowed,
    /// Answer with the block address / NXDOMAIN
    Blocked,
    /// Answer with a locally configured address
    MappedTo(IpAddr),
}

impl Decision {
    /// Whether this decision blocks the query (a mapping does not block).
    pub fn is_blocked(self) -> bool {
        matches!(self, Decision::Blocked)
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allowed => "ALLOWED",
            Decision::Blocked => "BLOCKED",
            Decision::MappedTo(_) => "MAPPED",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::MappedTo(ip) => write!(f, "MAPPED({})", ip),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_blocked() {
        assert!(Decision::Blocked.is_blocked());
        assert!(!Decision::Allowed.is_blocked());
        assert!(!Decision::MappedTo("127.0.0.1".parse().unwrap()).is_blocked());
    }

    #[test]
    fn test_display() {
        assert_eq!(Decision::Allowed.to_string(), "ALLOWED");
        assert_eq!(Decision::Blocked.to_string(), "BLOCKED");
        assert_eq!(
            Decision::MappedTo("10.1.1.1".parse().unwrap()).to_string(),
            "MAPPED(10.1.1.1)"
        );
    }
}
