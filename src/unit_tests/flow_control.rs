use crate::base::unit::{lock_read, lock_write, MemoryUnit, Unit};
use crate::mem::transaction::MemoryRequest;
use crate::unit_tests::bench::{cache_config, Bench};

#[test]
fn ports_contending_for_one_bank_are_served_round_robin() {
    let mut bench = Bench::non_blocking(cache_config(4, 1, 2), 5);
    for i in 0..20u64 {
        for port in 0..4 {
            bench.push(MemoryRequest::load(0x100 + 4 * port as u64, 4, port).with_dst(i));
        }
    }
    bench.run(2000);
    assert_eq!(bench.returns.len(), 80);

    // any window of accepted requests holds every port equally often
    for window in bench.returns.chunks(4) {
        let mut ports: Vec<usize> = window.iter().map(|(_, r)| r.port).collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![0, 1, 2, 3]);
    }
    let stats = lock_read(&bench.cache).stats();
    assert!(stats.bank_conflicts() > 0);
    assert_eq!(stats.downstream_loads(), 1);
}

#[test]
fn full_request_port_refuses_writes() {
    let mut config = cache_config(1, 1, 1);
    config.port_queue_depth = 2;
    let mut bench = Bench::non_blocking(config, 50);

    // every load needs its own LFB, so only the first is accepted until the fill returns
    for i in 0..6u64 {
        bench.push(MemoryRequest::load(0x1000 + 0x20 * i, 4, 0).with_dst(i));
    }
    for _ in 0..10 {
        bench.step();
    }
    assert!(!lock_read(&bench.cache).request_port_write_valid(0));
    assert!(bench.pending(0) >= 6 - 1 - 2);

    bench.run(2000);
    let dsts: Vec<u64> = bench.returns.iter().map(|(_, r)| r.dst).collect();
    assert_eq!(dsts, (0..6).collect::<Vec<_>>());
    assert!(lock_read(&bench.cache).stats().lfb_stalls() > 0);
}

#[test]
fn unread_returns_are_held_not_dropped() {
    let mut config = cache_config(2, 1, 4);
    config.port_queue_depth = 2;
    let mut bench = Bench::non_blocking(config, 5);
    bench.stalled_ports.push(1);
    for i in 0..8u64 {
        bench.push(MemoryRequest::load(0x40 + 4 * i, 4, 1).with_dst(i));
        bench.push(MemoryRequest::load(0x80 + 4 * i, 4, 0).with_dst(100 + i));
    }
    for _ in 0..200 {
        bench.step();
    }
    assert!(bench.returns_for(1).is_empty());
    assert!(lock_read(&bench.cache).is_executing());

    bench.stalled_ports.clear();
    bench.run(1000);
    let port1: Vec<u64> = bench.returns_for(1).iter().map(|r| r.dst).collect();
    assert_eq!(port1, (0..8).collect::<Vec<_>>());
    assert_eq!(bench.returns_for(0).len(), 8);
}

#[test]
#[should_panic]
fn reading_an_empty_return_port_is_a_violation() {
    let bench = Bench::non_blocking(cache_config(1, 1, 1), 5);
    lock_write(&bench.cache).read_return(0);
}
