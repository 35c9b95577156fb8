//! Bounded history buffers used for fairness and anti-clustering.

use std::collections::VecDeque;

/// Fixed-capacity FIFO that silently drops its oldest entry when full.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingMemory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingMemory<T> {
    /// Creates an empty memory that retains at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest ones once capacity is reached.
    ///
    /// A zero-capacity memory never stores anything.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        while self.items.len() >= self.capacity {
            let _ = self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Iterates from the oldest to the most recent entry.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    /// Most recently pushed entry.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Reports whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

}

impl<T: PartialEq> RollingMemory<T> {
    /// Counts how many stored entries equal `item`.
    #[must_use]
    pub fn occurrences(&self, item: &T) -> usize {
        self.items.iter().filter(|stored| *stored == item).count()
    }
}

#[cfg(test)]
mod tests {
    use super::RollingMemory;

    #[test]
    fn evicts_oldest_entries_past_capacity() {
        let mut memory = RollingMemory::with_capacity(3);
        for value in 1..=5 {
            memory.push(value);
        }
        assert_eq!(memory.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(memory.last(), Some(&5));
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut memory = RollingMemory::with_capacity(0);
        memory.push("bomb");
        assert!(memory.is_empty());
    }

    #[test]
    fn counts_occurrences() {
        let mut memory = RollingMemory::with_capacity(5);
        for kind in ["bomb", "normal", "bomb", "heal"] {
            memory.push(kind);
        }
        assert_eq!(memory.occurrences(&"bomb"), 2);
        assert_eq!(memory.occurrences(&"decoy"), 0);
    }
}
