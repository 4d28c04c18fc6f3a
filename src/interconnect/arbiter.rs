/// Round-robin arbiter over up to 64 requesters, kept as a pending bitmask plus a priority
/// pointer.
///
/// A grant is sticky: the granted index becomes the priority and keeps winning until it is
/// removed, at which point the pointer moves past it and the grantee becomes lowest priority.
/// Every pending requester is therefore granted before any requester is granted twice.
#[derive(Debug, Clone)]
pub struct RoundRobinArbiter {
    pending: u64,
    priority: u32,
    size: u32,
}

impl Default for RoundRobinArbiter {
    fn default() -> Self {
        Self::new(64)
    }
}

impl RoundRobinArbiter {
    pub fn new(size: usize) -> Self {
        assert!(size > 0 && size <= 64, "arbiter size {} must be in 1..=64", size);
        Self {
            pending: 0,
            priority: 0,
            size: size as u32,
        }
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn mask(&self) -> u64 {
        self.pending
    }

    pub fn num_pending(&self) -> usize {
        self.pending.count_ones() as usize
    }

    pub fn is_pending(&self, index: usize) -> bool {
        (self.pending >> index) & 1 != 0
    }

    pub fn add(&mut self, index: usize) {
        assert!(index < self.size(), "arbiter index {} out of range", index);
        self.pending |= 1u64 << index;
    }

    pub fn remove(&mut self, index: usize) {
        assert!(index < self.size(), "arbiter index {} out of range", index);
        self.pending &= !(1u64 << index);
        if index as u32 == self.priority {
            self.priority = (self.priority + 1) % self.size;
        }
    }

    /// The pending index at or after the priority pointer.
    pub fn current(&self) -> Option<usize> {
        if self.pending == 0 {
            return None;
        }
        let offset = self.pending.rotate_right(self.priority).trailing_zeros();
        Some(((self.priority + offset) & 0x3f) as usize)
    }

    /// Grants `current()` and pins the pointer on it until it is removed.
    pub fn grant(&mut self) -> Option<usize> {
        let index = self.current()?;
        self.priority = index as u32;
        Some(index)
    }

    /// Moves the pointer to the next pending index strictly after `current()`, wrapping.
    pub fn advance(&mut self) {
        let Some(current) = self.current() else {
            return;
        };
        let start = (current as u32 + 1) % self.size;
        let offset = self.pending.rotate_right(start).trailing_zeros();
        self.priority = (start + offset) & 0x3f;
    }
}

/// Arbiter for more than 64 requesters, built from one `RoundRobinArbiter` per group of 64
/// under an outer arbiter that rotates between groups after every removal.
#[derive(Debug, Clone)]
pub struct WideArbiter {
    groups: Vec<RoundRobinArbiter>,
    outer: RoundRobinArbiter,
    size: usize,
}

impl WideArbiter {
    pub fn new(size: usize) -> Self {
        assert!(size > 0 && size <= 64 * 64, "wide arbiter size {} out of range", size);
        let num_groups = (size + 63) / 64;
        let groups = (0..num_groups)
            .map(|g| RoundRobinArbiter::new((size - g * 64).min(64)))
            .collect();
        Self {
            groups,
            outer: RoundRobinArbiter::new(num_groups),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_pending(&self) -> usize {
        self.groups.iter().map(|g| g.num_pending()).sum()
    }

    pub fn is_pending(&self, index: usize) -> bool {
        self.groups[index / 64].is_pending(index % 64)
    }

    pub fn add(&mut self, index: usize) {
        assert!(index < self.size, "arbiter index {} out of range", index);
        self.groups[index / 64].add(index % 64);
        self.outer.add(index / 64);
    }

    pub fn remove(&mut self, index: usize) {
        let group = index / 64;
        self.groups[group].remove(index % 64);
        self.outer.remove(group);
        if self.groups[group].num_pending() > 0 {
            self.outer.add(group);
        }
    }

    pub fn current(&self) -> Option<usize> {
        let group = self.outer.current()?;
        self.groups[group].current().map(|i| group * 64 + i)
    }

    pub fn grant(&mut self) -> Option<usize> {
        let group = self.outer.grant()?;
        self.groups[group].grant().map(|i| group * 64 + i)
    }
}
