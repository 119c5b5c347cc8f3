//! System identity.
//!
//! Every producer that records structural changes is identified by a
//! [`SystemId`]. The id travels with each mutation log so that replay
//! diagnostics and contract-violation panics can name the system that asked
//! for the log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique numeric ID for a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub u32);

impl SystemId {
    /// Engine-internal operations (setup code, tests, anything outside a
    /// registered system).
    pub const ENGINE_INTERNAL: SystemId = SystemId(0);
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_ordering() {
        assert_eq!(SystemId(7).to_string(), "system#7");
        assert!(SystemId::ENGINE_INTERNAL < SystemId(1));
    }
}
