//! Bounded memory of recently seen message ids.
//!
//! A device can hold two live channels to the same peer (dial plus
//! dial-back) and broadcasts fan out over both, so every message may arrive
//! twice. [`SeenMessages`] drops the second copy. It remembers at most
//! `capacity` ids and forgets the oldest first.

use std::collections::{HashSet, VecDeque};

use crate::envelope::MessageId;

/// FIFO-bounded set of message ids.
#[derive(Debug, Clone)]
pub struct SeenMessages {
    order: VecDeque<MessageId>,
    members: HashSet<MessageId>,
    capacity: usize,
}

impl SeenMessages {
    /// Create a set remembering up to `capacity` ids (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `id`. Returns `true` the first time an id is seen and `false`
    /// for a re-delivery.
    pub fn insert(&mut self, id: &MessageId) -> bool {
        if self.members.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(evicted) = self.order.pop_front()
        {
            self.members.remove(&evicted);
        }
        self.order.push_back(id.clone());
        self.members.insert(id.clone());
        true
    }

    /// Whether `id` is currently remembered.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.members.contains(id)
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delivery_accepted_redelivery_dropped() {
        let mut seen = SeenMessages::new(8);
        let id = MessageId::from("a");
        assert!(seen.insert(&id));
        assert!(!seen.insert(&id));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_oldest_id_evicted_at_capacity() {
        let mut seen = SeenMessages::new(2);
        let (a, b, c) = (
            MessageId::from("a"),
            MessageId::from("b"),
            MessageId::from("c"),
        );
        seen.insert(&a);
        seen.insert(&b);
        seen.insert(&c);

        assert_eq!(seen.len(), 2);
        assert!(!seen.contains(&a));
        assert!(seen.contains(&b));
        assert!(seen.contains(&c));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut seen = SeenMessages::new(0);
        assert!(seen.insert(&MessageId::from("x")));
        assert!(!seen.insert(&MessageId::from("x")));
    }
}
