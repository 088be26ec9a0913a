use serde::{Deserialize, Serialize};

/// Where a mutation came from.
///
/// Every scene event and every replicated transaction carries exactly one
/// origin. The outbound bridge only replicates `Local` events, which is what
/// keeps remote and hydration edits from echoing back to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxOrigin {
    /// Produced by a tool action on this client.
    Local,
    /// Received from a peer through the transport.
    Remote,
    /// Produced while loading the initial shared snapshot.
    Hydration,
}

impl TxOrigin {
    pub const ALL: [TxOrigin; 3] = [TxOrigin::Local, TxOrigin::Remote, TxOrigin::Hydration];

    /// Stable tag used when the origin has to be carried as bytes.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxOrigin::Local => "easel.local",
            TxOrigin::Remote => "easel.remote",
            TxOrigin::Hydration => "easel.hydration",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_str() == tag)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, TxOrigin::Local)
    }
}

impl std::fmt::Display for TxOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxOrigin::Local => write!(f, "local"),
            TxOrigin::Remote => write!(f, "remote"),
            TxOrigin::Hydration => write!(f, "hydration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_distinct_and_parse_back() {
        for origin in TxOrigin::ALL {
            assert_eq!(TxOrigin::from_tag(origin.as_str()), Some(origin));
        }
        assert_eq!(TxOrigin::from_tag("something-else"), None);
    }

    #[test]
    fn test_only_local_is_local() {
        assert!(TxOrigin::Local.is_local());
        assert!(!TxOrigin::Remote.is_local());
        assert!(!TxOrigin::Hydration.is_local());
    }
}
