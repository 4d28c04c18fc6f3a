use std::collections::VecDeque;

/// Fixed-latency pipeline accepting one entry per cycle. An entry written in cycle `t` becomes
/// readable after `latency` calls to `clock`; latency 0 passes straight through. A stalled head
/// backs the pipeline up until it is full, then writes are refused.
#[derive(Debug, Clone)]
pub struct Pipeline<T> {
    stages: VecDeque<(u32, T)>,
    latency: u32,
    written: bool,
}

impl<T> Pipeline<T> {
    pub fn new(latency: u32) -> Self {
        Self {
            stages: VecDeque::new(),
            latency,
            written: false,
        }
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn clock(&mut self) {
        for (remaining, _) in self.stages.iter_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        self.written = false;
    }

    pub fn is_write_valid(&self) -> bool {
        !self.written && self.stages.len() < self.latency.max(1) as usize
    }

    pub fn write(&mut self, item: T) {
        assert!(self.is_write_valid(), "pipeline write while busy");
        self.stages.push_back((self.latency, item));
        self.written = true;
    }

    pub fn is_read_valid(&self) -> bool {
        matches!(self.stages.front(), Some((0, _)))
    }

    pub fn peek(&self) -> &T {
        assert!(self.is_read_valid(), "pipeline peek before ready");
        &self.stages[0].1
    }

    pub fn read(&mut self) -> T {
        assert!(self.is_read_valid(), "pipeline read before ready");
        let (_, item) = self.stages.pop_front().expect("checked non-empty");
        item
    }
}
