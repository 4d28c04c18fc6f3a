pub mod arbiter;
pub mod crossbar;
pub mod fifo;
pub mod pipeline;

pub use arbiter::{RoundRobinArbiter, WideArbiter};
pub use crossbar::{build_network, AddressRoute, CascadedCrossBar, CrossBar, Network, PortRoute, Route};
pub use fifo::Fifo;
pub use pipeline::Pipeline;
