//! Concurrent publishers, subscribers and control-plane churn

use std::{
    collections::HashSet,
    sync::{Arc, Barrier},
    thread,
    time::Duration,
};

use orbit::{orb_define, Broker, OrbError};

orb_define!(ORB_MULTI2, "orb_multi2", 12);
orb_define!(ORB_CHURN, "orb_churn", 4);

const INSTANCES: u32 = 3;
const MESSAGES: i32 = 2000;

fn broker() -> Broker {
    let broker = Broker::new();
    broker.register(&ORB_MULTI2).unwrap();
    broker.register(&ORB_CHURN).unwrap();
    broker
}

fn encode(val: i32) -> Vec<u8> {
    let mut data = orbit::absolute_time().to_le_bytes().to_vec();
    data.extend_from_slice(&val.to_le_bytes());
    data
}

fn decode(data: &[u8]) -> (u64, i32) {
    let timestamp = u64::from_le_bytes(data[..8].try_into().unwrap());
    let val = i32::from_le_bytes(data[8..12].try_into().unwrap());
    (timestamp, val)
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    /// Per-instance ordering holds with one publisher thread per instance
    #[test]
    fn test_multi2_ordering() {
        let broker = broker();
        let subscribers: Vec<_> = (0..INSTANCES)
            .map(|i| broker.subscribe_multi(&ORB_MULTI2, i).unwrap())
            .collect();
        let barrier = Arc::new(Barrier::new(INSTANCES as usize));

        let producers: Vec<_> = (0..INSTANCES)
            .map(|instance| {
                let broker = broker.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let publisher = broker
                        .advertise_multi_queue(&ORB_MULTI2, None, Some(instance), 16)
                        .unwrap();
                    barrier.wait();
                    for val in 0..MESSAGES {
                        publisher.publish(&encode(val)).unwrap();
                        if val % 64 == 0 {
                            thread::yield_now();
                        }
                    }
                    publisher
                })
            })
            .collect();

        let mut next_expected = vec![0i32; INSTANCES as usize];
        let mut last_timestamp = vec![0u64; INSTANCES as usize];
        let mut delivered = vec![0u64; INSTANCES as usize];

        let mut drain = |k: usize| {
            while subscribers[k].check().unwrap() {
                let sample = subscribers[k].copy().unwrap();
                let (timestamp, val) = decode(&sample.data);
                assert_eq!(
                    val as i64,
                    next_expected[k] as i64 + sample.lost as i64,
                    "instance {} out of order",
                    k
                );
                assert!(timestamp >= last_timestamp[k]);
                next_expected[k] = val + 1;
                last_timestamp[k] = timestamp;
                delivered[k] += 1;
            }
        };

        while producers.iter().any(|p| !p.is_finished()) {
            for k in 0..INSTANCES as usize {
                drain(k);
            }
            thread::sleep(Duration::from_micros(200));
        }

        let publishers: Vec<_> = producers.into_iter().map(|p| p.join().unwrap()).collect();
        for k in 0..INSTANCES as usize {
            drain(k);
        }

        for k in 0..INSTANCES as usize {
            assert_eq!(next_expected[k], MESSAGES, "instance {} missed the tail", k);
            assert!(delivered[k] > 0);
            assert_eq!(publishers[k].instance() as usize, k);
        }
    }

    #[test]
    fn test_concurrent_advertise_allocates_unique_instances() {
        const THREADS: usize = 8;
        let broker = broker();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let broker = broker.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    broker.advertise_multi(&ORB_CHURN, None, None).unwrap()
                })
            })
            .collect();

        let publishers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let instances: HashSet<u32> = publishers.iter().map(|p| p.instance()).collect();
        assert_eq!(instances, (0..THREADS as u32).collect());
        assert_eq!(broker.group_count(&ORB_CHURN), THREADS as u32);
    }

    /// Ghost nodes come and go without leaking registry entries
    #[test]
    fn test_ghost_churn() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 200;
        let broker = broker();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let broker = broker.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for round in 0..ROUNDS {
                        let instance = ((t + round) % 3) as u32;
                        let subscriber = broker.subscribe_multi(&ORB_CHURN, instance).unwrap();
                        assert!(!subscriber.check().unwrap());
                        subscriber.unsubscribe();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = broker.stats();
        assert_eq!(stats.subscriptions, (THREADS * ROUNDS) as u64);
        assert_eq!(stats.subscriptions, stats.unsubscriptions);
        assert_eq!(stats.nodes_created, stats.nodes_removed);
        assert!(broker.objects().is_empty());
    }

    /// Advertise and subscribe race on the same instance
    #[test]
    fn test_advertise_subscribe_race() {
        for _ in 0..50 {
            let broker = broker();
            let barrier = Arc::new(Barrier::new(2));

            let subscriber_thread = {
                let broker = broker.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    broker.subscribe_multi(&ORB_CHURN, 0).unwrap()
                })
            };

            barrier.wait();
            let publisher = broker
                .advertise_multi(&ORB_CHURN, None, Some(0))
                .unwrap();
            let subscriber = subscriber_thread.join().unwrap();

            assert!(subscriber.exists());
            publisher.publish(&9i32.to_le_bytes()).unwrap();
            assert_eq!(subscriber.copy().unwrap().data, 9i32.to_le_bytes());
            assert_eq!(broker.group_count(&ORB_CHURN), 1);
        }
    }

    #[test]
    fn test_unadvertise_wakes_blocked_readers() {
        const READERS: usize = 3;
        let broker = broker();
        let publisher = broker.advertise(&ORB_CHURN, None).unwrap();
        let barrier = Arc::new(Barrier::new(READERS + 1));

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let subscriber = broker.subscribe(&ORB_CHURN).unwrap();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    subscriber.wait(Some(Duration::from_secs(5)))
                })
            })
            .collect();

        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        publisher.unadvertise();

        for reader in readers {
            assert!(matches!(
                reader.join().unwrap(),
                Err(OrbError::NotAdvertised { .. })
            ));
        }
        assert_eq!(broker.group_count(&ORB_CHURN), 0);
    }

    /// Several threads publishing through one shared handle
    #[test]
    fn test_shared_publisher_generation_count() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 500;
        let broker = broker();
        let publisher = Arc::new(
            broker
                .advertise_queue(&ORB_CHURN, None, 32)
                .unwrap(),
        );

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let publisher = publisher.clone();
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        publisher
                            .publish(&((t * PER_THREAD + i) as i32).to_le_bytes())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            publisher.get_state().generation,
            (THREADS * PER_THREAD) as u64
        );
    }
}
