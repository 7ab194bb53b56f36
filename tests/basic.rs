use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use batchring::{
    BatchState, BatchingMode, CapacityTier, Error, HeapSlots, RingBuffer, RingBufferConfig,
    SlotHeader,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn payload(producer: u32, counter: u64) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[..4].copy_from_slice(&producer.to_le_bytes());
    out[4..].copy_from_slice(&counter.to_le_bytes());
    out
}

#[test]
fn basic_single_thread_roundtrip() {
    init_tracing();
    let rb = RingBuffer::open(CapacityTier::L0, 0, 6).unwrap();

    let mut w = rb.claim(1, TIMEOUT).unwrap();
    w.copy_to(0, &[10, 9, 8, 7, 6, 5]).unwrap();
    let batch_num = w.batch_num();
    w.publish().unwrap();

    let r = rb.next_published(0).unwrap().expect("published batch");
    assert_eq!(r.batch_num(), batch_num);
    assert_eq!(r.entry(0).unwrap(), &[10, 9, 8, 7, 6, 5]);
    r.release().unwrap();

    let stats = rb.stats();
    assert_eq!(stats.write_seq, 1);
    assert_eq!(stats.barrier_seq(0), Some(1));
    assert_eq!(stats.free_slots(), 64);
}

#[test]
fn full_cycle_reuses_slot_zero() {
    let rb = RingBuffer::open(CapacityTier::L0, 0, 6).unwrap();

    for round in 0..3u64 {
        let mut w = rb.claim(64, TIMEOUT).unwrap();
        assert_eq!(w.seq_num(), round * 64);
        assert_eq!(w.slot_index(0), Some(0));
        for i in 0..64 {
            w.copy_to(i, &[i as u8; 6]).unwrap();
        }
        w.publish().unwrap();
        assert_eq!(rb.free_slots(), 0);

        let r = rb.next_published(0).unwrap().unwrap();
        assert_eq!(r.entry(63).unwrap(), &[63; 6]);
        r.release().unwrap();
    }
    assert_eq!(rb.stats().batch_num, 3);
}

#[test]
fn headers_identify_batch_and_index() {
    let rb = RingBuffer::open(CapacityTier::L1, 0, 16).unwrap();
    let first = rb.claim(3, TIMEOUT).unwrap();
    let second = rb.claim(2, TIMEOUT).unwrap();
    second.publish().unwrap();
    first.publish().unwrap();

    let read = rb.next_published(0).unwrap().unwrap();
    assert_eq!(read.batch_num(), 0);
    assert_eq!(
        read.header(2).unwrap(),
        Some(SlotHeader {
            batch_num: 0,
            index: 2
        })
    );
    let read = rb.next_published(0).unwrap().unwrap();
    assert_eq!(read.header(1).unwrap().map(|h| h.batch_num), Some(1));
}

#[test]
fn claim_after_capacity_exhausted_times_out() {
    let rb = RingBuffer::open(CapacityTier::L0, 0, 6).unwrap();
    let held = rb.claim(63, TIMEOUT).unwrap();

    let err = rb.claim(2, Duration::from_millis(5)).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(rb.stats().write_seq, 63);

    held.cancel().unwrap();
    rb.next_published(0).unwrap().unwrap().release().unwrap();
    assert_eq!(rb.claim(2, TIMEOUT).unwrap().seq_num(), 63);
}

#[test]
fn user_supplied_store() {
    let config = RingBufferConfig::new(CapacityTier::L0, 10).batching(BatchingMode::Single);
    let store = HeapSlots::new(64, 32).unwrap();
    let rb = RingBuffer::with_store(config.clone(), store).unwrap();
    assert_eq!(rb.info().slot_size, 10);

    let small = HeapSlots::new(64, 8).unwrap();
    assert!(matches!(
        RingBuffer::with_store(config.clone(), small),
        Err(Error::InvalidArgument(_))
    ));
    let short = HeapSlots::new(32, 16).unwrap();
    assert!(matches!(
        RingBuffer::with_store(config, short),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn concurrent_producers_single_consumer() {
    init_tracing();
    const PRODUCERS: u32 = 4;
    const BATCHES: u64 = 500;

    let rb = RingBuffer::open(CapacityTier::L0, 16, 12).unwrap();
    let canceled = AtomicU64::new(0);

    thread::scope(|s| {
        for producer in 0..PRODUCERS {
            let rb = &rb;
            let canceled = &canceled;
            s.spawn(move || {
                for counter in 0..BATCHES {
                    let size = (counter % 7 + 1) as u16;
                    let mut batch = rb.claim(size, TIMEOUT).unwrap();
                    for i in 0..size {
                        batch.copy_to(i, &payload(producer, counter)).unwrap();
                    }
                    if counter % 13 == 0 {
                        batch.cancel().unwrap();
                        canceled.fetch_add(1, Ordering::Relaxed);
                    } else {
                        batch.publish().unwrap();
                    }
                }
            });
        }

        let rb = &rb;
        s.spawn(move || {
            let total = PRODUCERS as u64 * BATCHES;
            let mut next_batch = 0;
            let mut next_seq = 0;
            while next_batch < total {
                let Some(batch) = rb.next_published(0).unwrap() else {
                    thread::yield_now();
                    continue;
                };
                assert_eq!(batch.batch_num(), next_batch);
                assert_eq!(batch.seq_num(), next_seq);

                if batch.state() == BatchState::Published {
                    let first = batch.entry(0).unwrap()[..12].to_vec();
                    for i in 0..batch.size() {
                        assert_eq!(batch.entry(i).unwrap()[..12], first[..]);
                        let header = batch.header(i).unwrap().unwrap();
                        assert_eq!(header.batch_num as u64, batch.batch_num());
                        assert_eq!(header.index, i);
                    }
                } else {
                    assert_eq!(batch.state(), BatchState::Canceled);
                }

                next_batch += 1;
                next_seq += batch.size() as u64;
                batch.release().unwrap();
            }
        });
    });

    assert!(canceled.load(Ordering::Relaxed) > 0);
    let stats = rb.stats();
    assert_eq!(stats.batch_num, PRODUCERS as u64 * BATCHES);
    assert_eq!(stats.visible_seq, stats.write_seq);
    assert_eq!(stats.barrier_seq(0), Some(stats.write_seq));
    assert_eq!(stats.leased_batches, 0);
    assert_eq!(rb.free_slots(), 64);
}

#[test]
fn independent_consumer_groups() {
    const BATCHES: u64 = 300;
    let config = RingBufferConfig::new(CapacityTier::L0, 8).groups(3);
    let rb = RingBuffer::with_config(config).unwrap();

    thread::scope(|s| {
        let rb = &rb;
        s.spawn(move || {
            for counter in 0..BATCHES {
                let mut batch = rb.claim(4, TIMEOUT).unwrap();
                batch.copy_to(0, &counter.to_le_bytes()).unwrap();
                batch.publish().unwrap();
            }
        });

        for group in 0..3 {
            s.spawn(move || {
                let mut expected = 0;
                while expected < BATCHES {
                    match rb.next_published(group).unwrap() {
                        Some(batch) => {
                            let bytes: [u8; 8] = batch.entry(0).unwrap()[..8].try_into().unwrap();
                            assert_eq!(u64::from_le_bytes(bytes), expected);
                            rb.release_for(group, batch).unwrap();
                            expected += 1;
                        }
                        None => thread::yield_now(),
                    }
                }
            });
        }
    });

    let stats = rb.stats();
    for group in &stats.groups {
        assert_eq!(group.barrier_seq, BATCHES * 4);
        assert_eq!(group.barrier_batch, BATCHES);
    }
    assert_eq!(stats.leased_batches, 0);
}

#[test]
fn close_rejects_new_claims() {
    let rb = RingBuffer::open(CapacityTier::L0, 0, 6).unwrap();
    let pending = rb.claim_pending(1).unwrap();
    rb.close().unwrap();
    assert_eq!(pending.wait(TIMEOUT).unwrap_err(), Error::Closed);
    assert_eq!(rb.try_claim(1).unwrap_err(), Error::Closed);
    rb.close().unwrap();
}
