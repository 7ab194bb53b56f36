//! Property-based tests for slot accounting.
//!
//! Random interleavings of claim, settle and release are checked against a
//! plain FIFO model: live batches never share a slot, free space is always
//! `capacity - (write_seq - barrier_seq)`, and a claim that does not fit
//! never moves any counter. A threaded run checks that concurrently claimed
//! ranges never intersect.

use std::collections::{BTreeMap, VecDeque};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;

use batchring::{BatchState, CapacityTier, Error, RingBuffer, RingBufferConfig};

#[derive(Debug, Clone)]
enum Op {
    Claim { size: u16, publish: bool },
    Release,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u16..=24, any::<bool>()).prop_map(|(size, publish)| Op::Claim { size, publish }),
        2 => Just(Op::Release),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn accounting_matches_fifo_model(ops in prop::collection::vec(op(), 1..200)) {
        let rb = RingBuffer::open(CapacityTier::L0, 0, 4).unwrap();
        let capacity = rb.capacity() as u64;
        let mut live = VecDeque::new();
        let mut write_seq = 0u64;
        let mut barrier = 0u64;

        for op in ops {
            match op {
                Op::Claim { size, publish } => {
                    let fits = write_seq - barrier + size as u64 <= capacity;
                    match rb.try_claim(size) {
                        Ok(mut batch) => {
                            prop_assert!(fits);
                            prop_assert_eq!(batch.seq_num(), write_seq);
                            batch.copy_to(0, &(write_seq as u32).to_le_bytes()).unwrap();
                            if publish {
                                batch.publish().unwrap();
                            } else {
                                batch.cancel().unwrap();
                            }
                            write_seq += size as u64;
                            let read = rb.next_published(0).unwrap().expect("settled batch");
                            prop_assert_eq!(read.size(), size);
                            live.push_back(read);
                        }
                        Err(Error::Full { requested, available }) => {
                            prop_assert!(!fits);
                            prop_assert_eq!(requested, size as usize);
                            prop_assert_eq!(available as u64, capacity - (write_seq - barrier));
                        }
                        Err(err) => prop_assert!(false, "unexpected error {}", err),
                    }
                }
                Op::Release => {
                    if let Some(batch) = live.pop_front() {
                        if batch.state() == BatchState::Published {
                            let bytes: [u8; 4] = batch.entry(0).unwrap()[..4].try_into().unwrap();
                            prop_assert_eq!(u32::from_le_bytes(bytes) as u64, batch.seq_num());
                        }
                        barrier += batch.size() as u64;
                        batch.release().unwrap();
                    }
                }
            }

            let stats = rb.stats();
            prop_assert_eq!(stats.write_seq, write_seq);
            prop_assert_eq!(stats.barrier_seq(0), Some(barrier));
            prop_assert_eq!(stats.free_slots(), capacity - (write_seq - barrier));
            prop_assert_eq!(stats.leased_batches, live.len() as u64);
            prop_assert_eq!(stats.visible_seq, write_seq);
        }
    }

    #[test]
    fn live_batches_never_share_slots(sizes in prop::collection::vec(1u16..=32, 1..64)) {
        let rb = RingBuffer::open(CapacityTier::L0, 0, 4).unwrap();
        let mut owner = [None::<u64>; 64];
        let mut live: VecDeque<batchring::ReadBatch<'_>> = VecDeque::new();

        for size in sizes {
            // release from the front until the claim fits
            let batch = loop {
                match rb.try_claim(size) {
                    Ok(batch) => break batch,
                    Err(Error::Full { .. }) => {
                        let oldest = live.pop_front().expect("ring full with nothing live");
                        for i in 0..oldest.size() {
                            owner[oldest.slot_index(i).unwrap()] = None;
                        }
                        oldest.release().unwrap();
                    }
                    Err(err) => panic!("unexpected error {err}"),
                }
            };

            for i in 0..batch.size() {
                let slot = batch.slot_index(i).unwrap();
                prop_assert_eq!(owner[slot], None, "slot {} claimed twice", slot);
                owner[slot] = Some(batch.batch_num());
            }
            batch.publish().unwrap();
            live.push_back(rb.next_published(0).unwrap().expect("published batch"));
        }
    }

    #[test]
    fn slowest_group_bounds_free_space(
        releases in prop::collection::vec((0usize..3, 1usize..6), 1..40)
    ) {
        let config = RingBufferConfig::new(CapacityTier::L0, 4).groups(3);
        let rb = RingBuffer::with_config(config).unwrap();
        for _ in 0..16 {
            rb.try_claim(4).unwrap().publish().unwrap();
        }
        // each group's handles in claim order
        let mut handed: Vec<VecDeque<_>> = (0..3)
            .map(|group| std::iter::from_fn(|| rb.next_published(group).unwrap()).collect())
            .collect();
        let mut released = [0usize; 3];

        for (group, count) in releases {
            for _ in 0..count {
                if let Some(batch) = handed[group].pop_front() {
                    rb.release_for(group, batch).unwrap();
                    released[group] += 1;
                }
            }
            let slowest = *released.iter().min().unwrap() as u64;
            prop_assert_eq!(rb.free_slots() as u64, slowest * 4);
            prop_assert_eq!(rb.stats().leased_batches, 16 - slowest);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn concurrent_claims_never_overlap(
        plans in prop::collection::vec(prop::collection::vec(1u16..=16, 1..120), 2..5)
    ) {
        let rb = RingBuffer::open(CapacityTier::L0, 0, 4).unwrap();
        // first sequence -> end of every claimed, unreleased range
        let outstanding = Mutex::new(BTreeMap::<u64, u64>::new());
        let total: usize = plans.iter().map(Vec::len).sum();

        thread::scope(|s| {
            for plan in &plans {
                let (rb, outstanding) = (&rb, &outstanding);
                s.spawn(move || {
                    for &size in plan {
                        let batch = rb.claim(size, Duration::from_secs(10)).unwrap();
                        let (start, end) = (batch.seq_num(), batch.seq_num() + size as u64);
                        {
                            let mut ranges = outstanding.lock();
                            if let Some((_, &prev_end)) = ranges.range(..start).next_back() {
                                assert!(prev_end <= start, "range {start}..{end} overlaps");
                            }
                            if let Some((&next_start, _)) = ranges.range(start..).next() {
                                assert!(end <= next_start, "range {start}..{end} overlaps");
                            }
                            ranges.insert(start, end);
                        }
                        batch.publish().unwrap();
                    }
                });
            }

            let (rb, outstanding) = (&rb, &outstanding);
            s.spawn(move || {
                let mut released = 0;
                while released < total {
                    match rb.next_published(0).unwrap() {
                        Some(batch) => {
                            outstanding.lock().remove(&batch.seq_num());
                            batch.release().unwrap();
                            released += 1;
                        }
                        None => thread::yield_now(),
                    }
                }
            });
        });

        prop_assert!(outstanding.lock().is_empty());
        prop_assert_eq!(rb.free_slots(), 64);
    }
}
