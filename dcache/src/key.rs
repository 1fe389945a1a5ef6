//! Cache key derivation.
//!
//! Every user-visible key maps to two deterministic identifiers: the store
//! key under which the value envelope lives, and the lock key used for the
//! cross-process read lock. Both derivations must be identical on every
//! process sharing a remote store, because the store key also travels inside
//! invalidation broadcasts.

/// Suffix appended to the store key to form the distributed lock key.
const LOCK_SUFFIX: &str = "_LOCK";

/// Returns the remote-store key for a user key.
///
/// The `{...}` braces keep all derived keys of one user key in the same
/// Redis Cluster hash slot.
///
/// ```
/// assert_eq!(dcache::store_key("u:42"), ":{u:42}");
/// ```
pub fn store_key(key: &str) -> String {
    format!(":{{{key}}}")
}

/// Returns the distributed-lock key for a user key.
///
/// ```
/// assert_eq!(dcache::lock_key("u:42"), "::{u:42}_LOCK");
/// ```
pub fn lock_key(key: &str) -> String {
    format!(":{}{}", store_key(key), LOCK_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_key_wraps_in_hash_tag() {
        assert_eq!(store_key("k1"), ":{k1}");
        assert_eq!(store_key(""), ":{}");
        assert_eq!(store_key("a:b:c"), ":{a:b:c}");
    }

    #[test]
    fn lock_key_extends_store_key() {
        assert_eq!(lock_key("k1"), "::{k1}_LOCK");
        assert_eq!(lock_key("k1"), format!(":{}_LOCK", store_key("k1")));
    }

    #[test]
    fn derivations_are_disjoint() {
        assert_ne!(store_key("k1"), lock_key("k1"));
        assert_ne!(store_key("k1"), store_key("k2"));
    }
}
