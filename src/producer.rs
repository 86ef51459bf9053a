//! Producer identification type.

/// Unique identifier for a registered producer.
///
/// `ProducerId` is a small copyable handle assigned by the channel registry
/// at registration time. Ids are handed out in ascending order and never
/// reused within one registry's lifetime, so ascending id order is also
/// registration order.
///
/// # Example
///
/// ```
/// use bridge_audio::ProducerId;
///
/// let first = ProducerId::new(0);
/// let second = ProducerId::new(1);
///
/// assert_ne!(first, second);
/// assert!(first < second);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(u32);

impl ProducerId {
    /// Creates a producer ID from a raw index.
    ///
    /// Normally ids come from `AudioBridge::register_producer`; constructing
    /// one by hand is mainly useful in tests.
    #[must_use]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index value.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ProducerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "producer#{}", self.0)
    }
}

impl From<u32> for ProducerId {
    fn from(raw: u32) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_id_equality() {
        let a = ProducerId::new(3);
        let b = ProducerId::new(3);
        let c = ProducerId::new(4);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_producer_id_ordering_matches_raw() {
        assert!(ProducerId::new(0) < ProducerId::new(1));
        assert!(ProducerId::new(7) > ProducerId::new(2));
    }

    #[test]
    fn test_producer_id_display() {
        let id = ProducerId::new(5);
        assert_eq!(format!("{id}"), "producer#5");
    }

    #[test]
    fn test_producer_id_from_u32() {
        let id: ProducerId = 9.into();
        assert_eq!(id.raw(), 9);
    }

    #[test]
    fn test_producer_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(ProducerId::new(0));
        set.insert(ProducerId::new(1));
        set.insert(ProducerId::new(0)); // duplicate

        assert_eq!(set.len(), 2);
    }
}
