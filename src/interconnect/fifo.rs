use std::collections::VecDeque;

/// Bounded queue used for staging registers and return queues.
#[derive(Debug, Clone)]
pub struct Fifo<T> {
    queue: VecDeque<T>,
    depth: usize,
}

impl<T> Fifo<T> {
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0, "fifo depth must be > 0");
        Self {
            queue: VecDeque::with_capacity(depth),
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_write_valid(&self) -> bool {
        self.queue.len() < self.depth
    }

    pub fn write(&mut self, item: T) {
        assert!(self.is_write_valid(), "write to full fifo");
        self.queue.push_back(item);
    }

    pub fn is_read_valid(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn peek(&self) -> &T {
        self.queue.front().expect("peek of empty fifo")
    }

    pub fn read(&mut self) -> T {
        self.queue.pop_front().expect("read of empty fifo")
    }
}
