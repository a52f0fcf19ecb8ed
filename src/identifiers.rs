//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers keep call ids, session ids and target ids from being
//! mixed up at compile time.
//!
//! | Type | Wraps | Issued by |
//! |------|-------|-----------|
//! | [`CallId`] | `u64` | [`CallIdAllocator`], one per connection |
//! | [`SessionId`] | `String` | browser (`Target.attachToTarget`) |
//! | [`TargetId`] | `String` | browser (`Target.createTarget`) |
//! | [`StreamHandle`] | `String` | browser (`transferMode: ReturnAsStream`) |
//! | [`SubscriptionId`] | `u64` | event bus |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// CallId
// ============================================================================

/// Identifier correlating a command with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// Wraps a raw call id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CallIdAllocator
// ============================================================================

/// Monotonic call id source. Starts at 1; 0 is never issued.
#[derive(Debug)]
pub struct CallIdAllocator {
    next: AtomicU64,
}

impl CallIdAllocator {
    /// Creates an allocator whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next id.
    #[inline]
    pub fn next_id(&self) -> CallId {
        CallId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CallIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// String Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id! {
    /// Flattened session attached to a target.
    SessionId
}

string_id! {
    /// Browser target (tab).
    TargetId
}

string_id! {
    /// Handle of a browser-side stream read with `IO.read`.
    StreamHandle
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifier of an event bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the next process-wide subscription id.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic_from_one() {
        let alloc = CallIdAllocator::new();
        let ids: Vec<u64> = (0..5).map(|_| alloc.next_id().get()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_allocators_are_independent() {
        let a = CallIdAllocator::new();
        let b = CallIdAllocator::new();
        a.next_id();
        a.next_id();
        assert_eq!(b.next_id(), CallId::new(1));
    }

    #[test]
    fn test_session_id_serializes_as_string() {
        let id = SessionId::from("ABC123");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"ABC123\"");
        assert_eq!(id.to_string(), "ABC123");
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        assert_ne!(SubscriptionId::next(), SubscriptionId::next());
    }
}
