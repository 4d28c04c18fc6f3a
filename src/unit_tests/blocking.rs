use crate::base::unit::lock_read;
use crate::cache::blocking::BankState;
use crate::mem::transaction::{MemoryRequest, RequestType};
use crate::unit_tests::bench::{cache_config, Bench};

#[test]
fn miss_then_hit() {
    let mut bench = Bench::blocking(cache_config(1, 1, 1), 10);
    bench.preload(0x200, &[1, 2, 3, 4, 5, 6, 7, 8]);
    bench.push(MemoryRequest::load(0x204, 4, 0).with_dst(1));
    bench.step();
    assert_eq!(lock_read(&bench.cache).bank_state(0), BankState::Idle);
    // accepted and missed at rise, fill requested at fall of the same cycle
    bench.step();
    assert_eq!(lock_read(&bench.cache).bank_state(0), BankState::Issued);
    bench.run(100);

    bench.push(MemoryRequest::load(0x200, 4, 0).with_dst(2));
    bench.run(200);

    assert_eq!(bench.returns.len(), 2);
    assert_eq!(bench.returns[0].1.data.slice(0, 4), &[5, 6, 7, 8]);
    assert_eq!(bench.returns[1].1.data.slice(0, 4), &[1, 2, 3, 4]);
    let stats = lock_read(&bench.cache).stats();
    assert_eq!((stats.hits(), stats.misses()), (1, 1));
    assert_eq!(stats.downstream_loads(), 1);
}

#[test]
fn one_miss_blocks_the_bank() {
    let mut bench = Bench::blocking(cache_config(2, 1, 1), 20);
    bench.push(MemoryRequest::load(0x000, 4, 0));
    bench.push(MemoryRequest::load(0x100, 4, 1));
    for _ in 0..10 {
        bench.step();
    }
    assert_eq!(lock_read(&bench.cache).stats().downstream_loads(), 1);
    bench.run(500);
    assert_eq!(lock_read(&bench.cache).stats().downstream_loads(), 2);
    assert_eq!(bench.returns.len(), 2);
}

#[test]
fn stores_write_through_and_update_resident_line() {
    let mut bench = Bench::blocking(cache_config(1, 1, 1), 10);
    bench.push(MemoryRequest::load(0x300, 4, 0));
    bench.run(100);

    bench.push(MemoryRequest::store(0x304, &[0xaa, 0xbb], 0));
    bench.push(MemoryRequest::load(0x304, 2, 0).with_dst(5));
    bench.run(300);

    assert_eq!(bench.memory_bytes(0x304, 2), vec![0xaa, 0xbb]);
    let last = &bench.returns.last().unwrap().1;
    assert_eq!(last.dst, 5);
    assert_eq!(last.data.slice(0, 2), &[0xaa, 0xbb]);
    let stats = lock_read(&bench.cache).stats();
    assert_eq!(stats.uncached_writes(), 1);
    assert_eq!(stats.downstream_stores(), 1);
    assert_eq!(stats.hits(), 1);
}

#[test]
fn prefetch_fills_without_return() {
    let mut bench = Bench::blocking(cache_config(1, 1, 1), 10);
    bench.push(MemoryRequest::prefetch(0x500, 4, 0));
    bench.run(100);
    assert!(bench.returns.is_empty());
    assert!(lock_read(&bench.cache).is_resident(0x500));
}

#[test]
#[should_panic]
fn atomics_are_rejected() {
    let mut bench = Bench::blocking(cache_config(1, 1, 1), 5);
    bench.push(MemoryRequest::amo(RequestType::AmoOr, 0x40, 4, 1, 0));
    bench.run(50);
}
