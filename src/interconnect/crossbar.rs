use log::debug;

use crate::interconnect::arbiter::{RoundRobinArbiter, WideArbiter};
use crate::interconnect::fifo::Fifo;
use crate::mem::bits::pext;
use crate::mem::transaction::{MemoryRequest, MemoryReturn};

/// Many-to-many transaction network. Sources are written on clock fall and sinks are read on
/// clock rise; nothing is ever dropped, a transaction waits in its source queue until a sink
/// reads it.
pub trait Network<T>: Send + Sync {
    fn clock(&mut self);
    fn num_sources(&self) -> usize;
    fn num_sinks(&self) -> usize;

    // sink interface, clock rise only
    fn is_read_valid(&self, sink: usize) -> bool;
    fn peek(&self, sink: usize) -> &T;
    fn read(&mut self, sink: usize) -> T;

    // source interface, clock fall only
    fn is_write_valid(&self, source: usize) -> bool;
    fn write(&mut self, item: T, source: usize);

    /// Transactions currently contending for `sink`.
    fn pending(&self, sink: usize) -> usize;

    fn is_idle(&self) -> bool;
}

/// Picks the sink a transaction is delivered to.
pub trait Route<T>: Send + Sync {
    fn sink(&self, item: &T) -> usize;
}

/// Routes a request by extracting the address bits selected by `mask`.
#[derive(Debug, Clone, Copy)]
pub struct AddressRoute {
    mask: u64,
}

impl AddressRoute {
    pub fn new(mask: u64) -> Self {
        Self { mask }
    }
}

impl Route<MemoryRequest> for AddressRoute {
    fn sink(&self, item: &MemoryRequest) -> usize {
        pext(item.addr, self.mask) as usize
    }
}

/// Routes a return to the port that issued the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortRoute;

impl Route<MemoryReturn> for PortRoute {
    fn sink(&self, item: &MemoryReturn) -> usize {
        item.port
    }
}

/// Full crossbar: per-source staging queues and one arbiter per sink. A sink reads the head of
/// its granted source directly, so each sink takes at most one transaction per cycle.
pub struct CrossBar<T, R> {
    sources: Vec<Fifo<T>>,
    registered: Vec<Option<usize>>,
    arbiters: Vec<WideArbiter>,
    grants: Vec<Option<usize>>,
    route: R,
}

impl<T, R: Route<T>> CrossBar<T, R> {
    pub fn new(num_sources: usize, num_sinks: usize, depth: usize, route: R) -> Self {
        assert!(num_sources > 0 && num_sinks > 0, "crossbar needs sources and sinks");
        Self {
            sources: (0..num_sources).map(|_| Fifo::new(depth)).collect(),
            registered: vec![None; num_sources],
            arbiters: (0..num_sinks).map(|_| WideArbiter::new(num_sources)).collect(),
            grants: vec![None; num_sinks],
            route,
        }
    }
}

impl<T: Send + Sync, R: Route<T>> Network<T> for CrossBar<T, R> {
    fn clock(&mut self) {
        for (source, fifo) in self.sources.iter().enumerate() {
            if self.registered[source].is_some() || !fifo.is_read_valid() {
                continue;
            }
            let sink = self.route.sink(fifo.peek());
            assert!(
                sink < self.arbiters.len(),
                "source {} routed to sink {} of {}",
                source,
                sink,
                self.arbiters.len()
            );
            self.arbiters[sink].add(source);
            self.registered[source] = Some(sink);
        }

        for (sink, arbiter) in self.arbiters.iter_mut().enumerate() {
            self.grants[sink] = arbiter.grant();
        }
    }

    fn num_sources(&self) -> usize {
        self.sources.len()
    }

    fn num_sinks(&self) -> usize {
        self.arbiters.len()
    }

    fn is_read_valid(&self, sink: usize) -> bool {
        self.grants[sink].is_some()
    }

    fn peek(&self, sink: usize) -> &T {
        let source = self.grants[sink].expect("peek of crossbar sink without a grant");
        self.sources[source].peek()
    }

    fn read(&mut self, sink: usize) -> T {
        let source = self.grants[sink]
            .take()
            .expect("read of crossbar sink without a grant");
        debug_assert_eq!(self.registered[source], Some(sink));
        self.registered[source] = None;
        self.arbiters[sink].remove(source);
        self.sources[source].read()
    }

    fn is_write_valid(&self, source: usize) -> bool {
        self.sources[source].is_write_valid()
    }

    fn write(&mut self, item: T, source: usize) {
        self.sources[source].write(item);
    }

    fn pending(&self, sink: usize) -> usize {
        self.arbiters[sink].num_pending()
    }

    fn is_idle(&self) -> bool {
        self.sources.iter().all(|fifo| fifo.is_empty())
    }
}

/// Crossbar narrowed to `width` lanes: sources are first arbitrated within cascade groups,
/// the group winners cross a `width`-lane crossbar, and each lane fans out to a group of sink
/// queues. Counts that don't divide evenly get a short last group.
pub struct CascadedCrossBar<T, R> {
    sources: Vec<Fifo<T>>,
    in_ratio: usize,
    cascade_arbiters: Vec<RoundRobinArbiter>,
    cascade_grants: Vec<Option<usize>>,
    crossbar_arbiters: Vec<RoundRobinArbiter>,
    out_ratio: usize,
    sinks: Vec<Fifo<T>>,
    route: R,
}

impl<T, R: Route<T>> CascadedCrossBar<T, R> {
    pub fn new(num_sources: usize, num_sinks: usize, width: usize, depth: usize, route: R) -> Self {
        assert!(num_sources > 0 && num_sinks > 0, "crossbar needs sources and sinks");
        assert!(width > 0 && width <= 64, "crossbar width {} must be in 1..=64", width);
        let in_ratio = num_sources.div_ceil(width);
        let out_ratio = num_sinks.div_ceil(width);
        assert!(in_ratio <= 64, "cascade ratio {} exceeds arbiter width", in_ratio);
        let num_cascades = num_sources.div_ceil(in_ratio);
        let num_lanes = num_sinks.div_ceil(out_ratio);
        debug!(
            "cascaded crossbar {}x{}: {} cascades of {}, {} lanes of {}",
            num_sources, num_sinks, num_cascades, in_ratio, num_lanes, out_ratio
        );
        Self {
            sources: (0..num_sources).map(|_| Fifo::new(depth)).collect(),
            in_ratio,
            cascade_arbiters: (0..num_cascades)
                .map(|c| RoundRobinArbiter::new((num_sources - c * in_ratio).min(in_ratio)))
                .collect(),
            cascade_grants: vec![None; num_cascades],
            crossbar_arbiters: (0..num_lanes)
                .map(|_| RoundRobinArbiter::new(num_cascades))
                .collect(),
            out_ratio,
            sinks: (0..num_sinks).map(|_| Fifo::new(depth)).collect(),
            route,
        }
    }

    fn routed_sink(&self, source: usize) -> usize {
        let sink = self.route.sink(self.sources[source].peek());
        assert!(
            sink < self.sinks.len(),
            "source {} routed to sink {} of {}",
            source,
            sink,
            self.sinks.len()
        );
        sink
    }
}

impl<T: Send + Sync, R: Route<T>> Network<T> for CascadedCrossBar<T, R> {
    fn clock(&mut self) {
        for (source, fifo) in self.sources.iter().enumerate() {
            if fifo.is_read_valid() {
                self.cascade_arbiters[source / self.in_ratio].add(source % self.in_ratio);
            }
        }

        for cascade in 0..self.cascade_arbiters.len() {
            self.cascade_grants[cascade] = self.cascade_arbiters[cascade].grant();
            if let Some(index) = self.cascade_grants[cascade] {
                let sink = self.routed_sink(cascade * self.in_ratio + index);
                self.crossbar_arbiters[sink / self.out_ratio].add(cascade);
            }
        }

        for lane in 0..self.crossbar_arbiters.len() {
            let Some(cascade) = self.crossbar_arbiters[lane].grant() else {
                continue;
            };
            let Some(index) = self.cascade_grants[cascade] else {
                continue;
            };
            let source = cascade * self.in_ratio + index;
            let sink = self.routed_sink(source);
            if !self.sinks[sink].is_write_valid() {
                continue;
            }

            self.crossbar_arbiters[lane].remove(cascade);
            self.cascade_arbiters[cascade].remove(index);
            self.cascade_grants[cascade] = None;
            let item = self.sources[source].read();
            self.sinks[sink].write(item);
        }
    }

    fn num_sources(&self) -> usize {
        self.sources.len()
    }

    fn num_sinks(&self) -> usize {
        self.sinks.len()
    }

    fn is_read_valid(&self, sink: usize) -> bool {
        self.sinks[sink].is_read_valid()
    }

    fn peek(&self, sink: usize) -> &T {
        self.sinks[sink].peek()
    }

    fn read(&mut self, sink: usize) -> T {
        self.sinks[sink].read()
    }

    fn is_write_valid(&self, source: usize) -> bool {
        self.sources[source].is_write_valid()
    }

    fn write(&mut self, item: T, source: usize) {
        self.sources[source].write(item);
    }

    fn pending(&self, sink: usize) -> usize {
        self.sinks[sink].len()
    }

    fn is_idle(&self) -> bool {
        self.sources.iter().all(|fifo| fifo.is_empty()) && self.sinks.iter().all(|fifo| fifo.is_empty())
    }
}

/// Full crossbar when `width` is 0 or covers every source, cascaded otherwise.
pub fn build_network<T, R>(
    num_sources: usize,
    num_sinks: usize,
    width: usize,
    depth: usize,
    route: R,
) -> Box<dyn Network<T>>
where
    T: Send + Sync + 'static,
    R: Route<T> + 'static,
{
    if width == 0 || width >= num_sources.max(num_sinks) {
        Box::new(CrossBar::new(num_sources, num_sinks, depth, route))
    } else {
        Box::new(CascadedCrossBar::new(num_sources, num_sinks, width, depth, route))
    }
}
