use crate::cache::{CacheConfig, CacheKind};
use crate::sim::config::SimConfig;
use crate::sim::system::{System, SystemConfig};
use crate::units::memory::MemoryConfig;
use crate::units::traffic::{Pattern, TrafficConfig};

fn small_system(l1: CacheKind, l2: CacheKind, parallel: bool) -> SystemConfig {
    SystemConfig {
        sim: SimConfig {
            timeout: 200_000,
            parallel,
        },
        memory: MemoryConfig {
            size: 1 << 20,
            num_ports: 4,
            num_channels: 2,
            latency: 20,
            ..MemoryConfig::default()
        },
        l2: CacheConfig {
            kind: l2,
            size: 8 << 10,
            associativity: 4,
            num_ports: 4,
            num_banks: 4,
            num_lfb: 8,
            data_array_latency: 2,
            ..CacheConfig::default()
        },
        l1: CacheConfig {
            kind: l1,
            size: 2 << 10,
            associativity: 2,
            num_ports: 8,
            num_banks: 4,
            num_lfb: 4,
            crossbar_width: 4,
            ..CacheConfig::default()
        },
        traffic: TrafficConfig {
            num_ports: 8,
            pattern: Pattern::Random,
            footprint: 16 << 10,
            store_fraction: 0.3,
            requests_per_port: 300,
            seed: 42,
            ..TrafficConfig::default()
        },
    }
}

#[test]
fn random_traffic_is_consistent_through_two_levels() {
    for (l1, l2) in [
        (CacheKind::NonBlocking, CacheKind::NonBlocking),
        (CacheKind::Blocking, CacheKind::NonBlocking),
        (CacheKind::NonBlocking, CacheKind::Blocking),
    ] {
        let mut system = System::new(&small_system(l1, l2, false)).unwrap();
        let report = system.run().unwrap();
        assert_eq!(report.traffic.mismatches, 0, "{:?} over {:?}", l1, l2);
        assert_eq!(report.traffic.loads + report.traffic.stores, 8 * 300);
        assert_eq!(report.traffic.returns, report.traffic.loads);
        assert!(report.l1.lookups() > 0);
        assert!(report.memory.loads > 0);
    }
}

#[test]
fn parallel_run_matches_sequential_run() {
    let mut sequential = System::new(&small_system(CacheKind::NonBlocking, CacheKind::NonBlocking, false)).unwrap();
    let mut parallel = System::new(&small_system(CacheKind::NonBlocking, CacheKind::NonBlocking, true)).unwrap();
    let a = sequential.run().unwrap();
    let b = parallel.run().unwrap();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn timeout_surfaces_as_error() {
    let mut config = small_system(CacheKind::NonBlocking, CacheKind::NonBlocking, false);
    config.sim.timeout = 10;
    let mut system = System::new(&config).unwrap();
    assert!(system.run().is_err());
    assert_eq!(system.simulator().cycle(), 10);
}
