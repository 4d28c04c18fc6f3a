use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::base::unit::{lock_read, lock_write, MemoryUnit};
use crate::cache::lfb::{LfbState, LfbType};
use crate::mem::transaction::{MemoryRequest, RequestType};
use crate::unit_tests::bench::{cache_config, Bench};

fn block_pattern(base: u8) -> Vec<u8> {
    (0..32u8).map(|i| base.wrapping_add(i)).collect()
}

/// Two LFBs, one bank, four ports. Two ports load the same word of block A, a third loads
/// block B, a fourth loads block C and has to wait for an LFB to retire.
#[test]
fn merged_misses_share_one_fill_and_stall_on_full_pool() {
    let mut bench = Bench::non_blocking(cache_config(4, 1, 2), 20);
    bench.preload(0x1000, &block_pattern(0x10));
    bench.preload(0x1020, &block_pattern(0x40));
    bench.preload(0x1040, &block_pattern(0x80));

    bench.push(MemoryRequest::load(0x1004, 4, 0).with_dst(1));
    bench.push(MemoryRequest::load(0x1004, 4, 1).with_dst(2));
    bench.push(MemoryRequest::load(0x1020, 4, 2).with_dst(3));
    bench.push(MemoryRequest::load(0x1040, 4, 3).with_dst(4));

    for _ in 0..10 {
        bench.step();
    }
    {
        let cache = lock_read(&bench.cache);
        let stats = cache.stats();
        assert_eq!(stats.downstream_loads(), 2);
        assert_eq!(stats.misses(), 2);
        assert_eq!(stats.half_misses(), 1);
        assert!(stats.lfb_stalls() > 0);
        assert!(cache.lfbs(0).all(|lfb| lfb.state == LfbState::Missed));
    }

    let mut loads_when_third_issued = None;
    while bench.is_busy() {
        assert!(bench.cycle < 200);
        bench.step();
        if loads_when_third_issued.is_none() && lock_read(&bench.cache).stats().downstream_loads() == 3 {
            loads_when_third_issued = Some(bench.returns.iter().filter(|(_, r)| r.addr == 0x1004).count());
        }
    }
    // block C is only fetched once block A has been fully returned and its LFB retired
    assert_eq!(loads_when_third_issued, Some(2));

    let stats = lock_read(&bench.cache).stats();
    assert_eq!(stats.downstream_loads(), 3);
    assert_eq!(stats.returns(), 4);
    assert_eq!(lock_read(&bench.memory).stats().loads, 3);

    let port0 = bench.returns_for(0);
    let port1 = bench.returns_for(1);
    assert_eq!(port0.len(), 1);
    assert_eq!(port1.len(), 1);
    assert_eq!(port0[0].data.slice(0, 4), &[0x14, 0x15, 0x16, 0x17]);
    assert_eq!(port0[0].data.slice(0, 4), port1[0].data.slice(0, 4));
    assert_eq!((port0[0].dst, port1[0].dst), (1, 2));
    assert_eq!(bench.returns_for(2)[0].data.read_u32(0), u32::from_le_bytes([0x40, 0x41, 0x42, 0x43]));
    assert_eq!(bench.returns_for(3)[0].data.slice(0, 1), &[0x80]);
}

#[test]
fn every_load_is_answered_exactly_once() {
    let mut bench = Bench::non_blocking(cache_config(4, 2, 2), 7);
    let mut dst = 0;
    for round in 0..16u64 {
        for port in 0..4 {
            let addr = (round * 0x24 + port as u64 * 0x48) % 0x400 & !3;
            bench.push(MemoryRequest::load(addr, 4, port).with_dst(dst));
            dst += 1;
        }
    }
    bench.run(5000);

    let mut seen: Vec<u64> = bench.returns.iter().map(|(_, r)| r.dst).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..64).collect::<Vec<_>>());
    let stats = lock_read(&bench.cache).stats();
    assert_eq!(stats.requests(), 64);
    assert_eq!(stats.hits() + stats.misses() + stats.half_misses() + stats.lfb_hits(), 64);
}

#[test]
fn hit_waits_for_data_array_latency() {
    let mut config = cache_config(1, 1, 1);
    config.data_array_latency = 3;
    let mut bench = Bench::non_blocking(config, 5);
    bench.push(MemoryRequest::load(0x200, 4, 0));
    bench.run(100);
    // take the only LFB so the next load has to go through the tag array
    bench.push(MemoryRequest::load(0x240, 4, 0));
    bench.run(200);
    assert!(lock_read(&bench.cache).is_resident(0x200));
    assert!(lock_read(&bench.cache).lfbs(0).all(|lfb| lfb.block_addr == 0x240));

    let issued = bench.cycle;
    bench.push(MemoryRequest::load(0x208, 4, 0).with_dst(7));
    bench.run(issued + 100);
    let (returned, ret) = bench.returns.last().unwrap();
    assert_eq!(ret.dst, 7);
    // written at fall of `issued`, accepted next rise, then three data array cycles
    assert!(returned - issued >= 4, "hit returned after {} cycles", returned - issued);
    let stats = lock_read(&bench.cache).stats();
    assert_eq!(stats.hits(), 1);
    assert_eq!(stats.lfb_hits(), 0);
    assert_eq!(stats.downstream_loads(), 2);
}

#[test]
fn reused_lfb_is_not_the_next_victim() {
    let mut bench = Bench::non_blocking(cache_config(1, 1, 2), 5);
    for addr in [0x000, 0x100, 0x000, 0x200] {
        bench.push(MemoryRequest::load(addr, 4, 0));
        bench.run(bench.cycle + 100);
    }
    let cache = lock_read(&bench.cache);
    let mut blocks: Vec<u64> = cache.lfbs(0).map(|lfb| lfb.block_addr).collect();
    blocks.sort_unstable();
    assert_eq!(blocks, vec![0x000, 0x200]);
    assert_eq!(cache.stats().lfb_hits(), 1);
}

#[test]
fn many_ports_on_one_line_share_one_fill() {
    let mut bench = Bench::non_blocking(cache_config(8, 1, 2), 20);
    bench.preload(0x800, &block_pattern(0x20));
    for port in 0..8 {
        bench.push(MemoryRequest::load(0x800 + 4 * port as u64, 4, port).with_dst(port as u64));
    }
    bench.run(500);

    let stats = lock_read(&bench.cache).stats();
    assert_eq!(stats.downstream_loads(), 1);
    assert_eq!(stats.misses(), 1);
    assert_eq!(stats.half_misses(), 7);
    assert_eq!(bench.returns.len(), 8);
    for port in 0..8 {
        let returns = bench.returns_for(port);
        assert_eq!(returns.len(), 1);
        let first = 0x20 + 4 * port as u8;
        assert_eq!(returns[0].data.slice(0, 4), &[first, first + 1, first + 2, first + 3]);
    }
}

#[test]
fn one_live_lfb_per_line_and_type() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut bench = Bench::non_blocking(cache_config(4, 2, 2), 9);
    let mut loads = 0;
    for i in 0..400u64 {
        let port = rng.gen_range(0..4);
        let addr = rng.gen_range(0..6u64) * 0x20 + rng.gen_range(0..8u64) * 4;
        if rng.gen_bool(0.3) {
            bench.push(MemoryRequest::store(addr, &(i as u32).to_le_bytes(), port));
        } else {
            bench.push(MemoryRequest::load(addr, 4, port).with_dst(i));
            loads += 1;
        }
    }

    while bench.is_busy() {
        assert!(bench.cycle < 20_000, "bench did not drain");
        bench.step();
        let cache = lock_read(&bench.cache);
        for bank in 0..2 {
            let mut keys: Vec<_> = cache
                .lfbs(bank)
                .filter(|lfb| lfb.is_live())
                .map(|lfb| (lfb.block_addr, lfb.ty))
                .collect();
            let live = keys.len();
            keys.sort_unstable_by_key(|&(addr, ty)| (addr, ty == LfbType::Read));
            keys.dedup();
            assert_eq!(keys.len(), live, "bank {} holds two LFBs for one line", bank);
        }
    }
    assert_eq!(bench.returns.len(), loads);
}

#[test]
fn prefetch_warms_line_without_return() {
    let mut bench = Bench::non_blocking(cache_config(1, 1, 2), 5);
    bench.push(MemoryRequest::prefetch(0x300, 4, 0));
    bench.run(100);
    assert!(bench.returns.is_empty());
    assert!(lock_read(&bench.cache).is_resident(0x300));

    bench.push(MemoryRequest::load(0x31c, 4, 0));
    bench.run(200);
    assert_eq!(bench.returns.len(), 1);
    let stats = lock_read(&bench.cache).stats();
    assert_eq!(stats.prefetches(), 1);
    assert_eq!(stats.downstream_loads(), 1);
}

#[test]
fn invalidate_all_forces_refetch() {
    let mut bench = Bench::non_blocking(cache_config(1, 1, 2), 5);
    bench.push(MemoryRequest::load(0x40, 4, 0));
    bench.run(100);
    lock_write(&bench.cache).invalidate_all();
    assert!(!lock_read(&bench.cache).is_resident(0x40));

    bench.push(MemoryRequest::load(0x40, 4, 0));
    bench.run(200);
    assert_eq!(lock_read(&bench.cache).stats().downstream_loads(), 2);
}

#[test]
fn banks_fetch_independently() {
    let mut bench = Bench::non_blocking(cache_config(2, 2, 1), 10);
    // 32B blocks, bank bit is bit 5
    bench.push(MemoryRequest::load(0x000, 4, 0));
    bench.push(MemoryRequest::load(0x020, 4, 1));
    for _ in 0..4 {
        bench.step();
    }
    let cache = lock_read(&bench.cache);
    assert_eq!(cache.stats().downstream_loads(), 2);
    assert_eq!(cache.stats().bank_conflicts(), 0);
    assert!(cache.lfbs(0).any(|lfb| lfb.block_addr == 0x000));
    assert!(cache.lfbs(1).any(|lfb| lfb.block_addr == 0x020));
}

#[test]
#[should_panic]
fn atomics_are_rejected() {
    let mut bench = Bench::non_blocking(cache_config(1, 1, 2), 5);
    bench.push(MemoryRequest::amo(RequestType::AmoAdd, 0x40, 4, 1, 0));
    bench.run(50);
}

#[test]
#[should_panic]
fn straddling_request_is_rejected() {
    let mut bench = Bench::non_blocking(cache_config(1, 1, 2), 5);
    bench.push(MemoryRequest::load(0x1e, 4, 0));
    bench.run(50);
}

#[test]
#[should_panic]
fn writing_a_full_port_is_a_violation() {
    let mut config = cache_config(1, 1, 1);
    config.port_queue_depth = 1;
    let bench = Bench::non_blocking(config, 5);
    let mut cache = lock_write(&bench.cache);
    cache.write_request(MemoryRequest::load(0x0, 4, 0));
    cache.write_request(MemoryRequest::load(0x4, 4, 0));
}
