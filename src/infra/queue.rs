//! In-memory job queue ordered by priority, FIFO within a priority.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::job::Work;
use crate::util::Priority;

/// A queued work item with its scheduling key.
pub(crate) struct QueueEntry {
    pub(crate) priority: Priority,
    /// Arrival order, used to break priority ties.
    pub(crate) sequence: u64,
    pub(crate) work: Work,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: the lowest priority value, then the earliest sequence, is greatest.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Binary heap of pending entries. Callers guard it with the scheduler mutex.
pub(crate) struct JobQueue {
    entries: BinaryHeap<QueueEntry>,
    next_sequence: u64,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// O(log n) insertion.
    pub(crate) fn push(&mut self, priority: Priority, work: Work) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.entries.push(QueueEntry {
            priority,
            sequence,
            work,
        });
    }

    /// Insert several entries at one priority, keeping their relative order.
    pub(crate) fn extend<I>(&mut self, priority: Priority, works: I)
    where
        I: IntoIterator<Item = Work>,
    {
        let works = works.into_iter();
        self.entries.reserve(works.size_hint().0);
        for work in works {
            self.push(priority, work);
        }
    }

    /// Remove the most urgent entry.
    pub(crate) fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop()
    }

    /// Remove every pending entry, leaving the queue empty.
    pub(crate) fn take_all(&mut self) -> Vec<QueueEntry> {
        self.entries.drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::FnJob;

    fn noop() -> Work {
        Work::Plain(Box::new(FnJob(|| {})))
    }

    #[test]
    fn test_priority_ordering() {
        let mut q = JobQueue::new();

        q.push(Priority::LOW, noop());
        q.push(Priority::HIGHEST, noop());
        q.push(Priority::NORMAL, noop());
        q.push(Priority::HIGH, noop());

        let order: Vec<Priority> = std::iter::from_fn(|| q.pop().map(|e| e.priority)).collect();
        assert_eq!(
            order,
            vec![Priority::HIGHEST, Priority::HIGH, Priority::NORMAL, Priority::LOW]
        );
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut q = JobQueue::new();
        for _ in 0..3 {
            q.push(Priority::NORMAL, noop());
        }
        q.push(Priority::HIGHEST, noop());

        let sequences: Vec<u64> = std::iter::from_fn(|| q.pop().map(|e| e.sequence)).collect();
        assert_eq!(sequences, vec![3, 0, 1, 2]);
    }

    #[test]
    fn test_extend_and_take_all() {
        let mut q = JobQueue::new();
        q.extend(Priority::HIGHEST, (0..4).map(|_| noop()));
        assert_eq!(q.len(), 4);

        let taken = q.take_all();
        assert_eq!(taken.len(), 4);
        assert!(q.is_empty());
        assert!(q.pop().is_none());
    }
}
