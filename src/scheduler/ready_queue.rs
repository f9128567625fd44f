/*
 * Ready queue
 *
 * Bounded FIFO of runnable thread ids. The capacity equals the thread
 * table size and the running thread is never enqueued, so enqueue cannot
 * overflow. The queue is mutated from the preemption handler and therefore
 * must never touch the process allocator; the backing deque is a
 * fixed-capacity ring.
 *
 * No internal locking: callers hold the scheduler lock with the preemption
 * signal blocked.
 */

use heapless::Deque;

use super::thread::ThreadId;
use crate::MAX_THREADS;

pub struct ReadyQueue {
    queue: Deque<ThreadId, MAX_THREADS>,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        ReadyQueue {
            queue: Deque::new(),
        }
    }

    /// Appends `tid` at the tail.
    pub fn enqueue(&mut self, tid: ThreadId) {
        let pushed = self.queue.push_back(tid);
        debug_assert!(pushed.is_ok(), "ready queue overflow");
    }

    /// Removes and returns the head, or `None` when no thread is ready.
    pub fn dequeue(&mut self) -> Option<ThreadId> {
        self.queue.pop_front()
    }

    /// Clears the queue.
    pub fn reset(&mut self) {
        self.queue.clear();
    }

    /// Removes every occurrence of `tid`, keeping the relative order of the
    /// remaining entries. No-op when `tid` is not queued.
    pub fn remove(&mut self, tid: ThreadId) {
        for _ in 0..self.queue.len() {
            if let Some(head) = self.queue.pop_front() {
                if head != tid {
                    self.enqueue(head);
                }
            }
        }
    }

    pub fn contains(&self, tid: ThreadId) -> bool {
        self.queue.iter().any(|&queued| queued == tid)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadId> {
        self.queue.iter()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
