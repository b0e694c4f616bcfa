//! Tests for topic nodes

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::broker::control::ControlHandler;
    use crate::error::{OrbError, Result};
    use crate::metadata::OrbMetadata;
    use crate::ringbuf::GenerationRing;
    use crate::sync::{EventMask, OrbEvents, Readiness};
    use crate::topic::*;

    static ORB_NODE_TEST: OrbMetadata = OrbMetadata::new("orb_node_test", 8);

    fn ring(queue_size: u32) -> GenerationRing {
        GenerationRing::new(queue_size, ORB_NODE_TEST.size()).unwrap()
    }

    fn readiness() -> Arc<Readiness> {
        Arc::new(Readiness::new(true).unwrap())
    }

    fn live_node(queue_size: u32, persistent: bool) -> (TopicNode, Arc<Readiness>) {
        let node = TopicNode::ghost(&ORB_NODE_TEST, 0);
        let publisher = readiness();
        node.promote(ring(queue_size), None, persistent, publisher.clone())
            .unwrap();
        (node, publisher)
    }

    fn read_u64(node: &TopicNode, id: SubscriberId) -> Result<(u64, CopyInfo)> {
        let mut buf = [0u8; 8];
        let info = node.copy(id, &mut buf)?;
        Ok((u64::from_le_bytes(buf), info))
    }

    #[test]
    fn test_ghost_subscriber_skips_initial_value() {
        let node = TopicNode::ghost(&ORB_NODE_TEST, 0);
        let id = node.attach_subscriber(readiness());
        assert!(node.is_ghost());
        assert!(!node.check(id).unwrap());
        assert!(matches!(node.copy(id, &mut [0u8; 8]), Err(OrbError::NoData)));

        node.promote(ring(1), Some((&7u64.to_le_bytes(), 1)), false, readiness())
            .unwrap();
        assert!(node.is_live());
        assert_eq!(node.generation(), 1);
        assert!(!node.check(id).unwrap());

        node.publish(&8u64.to_le_bytes(), 2).unwrap();
        assert!(node.check(id).unwrap());
        let (value, info) = read_u64(&node, id).unwrap();
        assert_eq!(value, 8);
        assert_eq!(info.generation, 1);
        assert_eq!(info.timestamp, 2);
        assert!(!node.check(id).unwrap());
    }

    #[test]
    fn test_persistent_ghost_subscriber_sees_initial_value() {
        let node = TopicNode::ghost(&ORB_NODE_TEST, 0);
        let subscriber = readiness();
        let id = node.attach_subscriber(subscriber.clone());

        node.promote(ring(1), Some((&42u64.to_le_bytes(), 1)), true, readiness())
            .unwrap();
        assert!(subscriber.notifier().wait(Some(Duration::ZERO)).unwrap());
        assert!(node.check(id).unwrap());
        assert_eq!(read_u64(&node, id).unwrap().0, 42);
    }

    #[test]
    fn test_late_subscriber_start_position() {
        let (persistent, _p1) = live_node(4, true);
        let (volatile, _p2) = live_node(4, false);
        for value in 1..=3u64 {
            persistent.publish(&value.to_le_bytes(), value).unwrap();
            volatile.publish(&value.to_le_bytes(), value).unwrap();
        }

        let id = persistent.attach_subscriber(readiness());
        assert!(persistent.check(id).unwrap());
        assert_eq!(read_u64(&persistent, id).unwrap().0, 3);
        assert!(!persistent.check(id).unwrap());

        let id = volatile.attach_subscriber(readiness());
        assert!(!volatile.check(id).unwrap());
    }

    #[test]
    fn test_overflow_reports_lost_records() {
        let (node, _publisher) = live_node(3, false);
        let id = node.attach_subscriber(readiness());

        for value in 0..5u64 {
            node.publish(&value.to_le_bytes(), value + 1).unwrap();
        }

        let (value, info) = read_u64(&node, id).unwrap();
        assert_eq!(value, 2);
        assert_eq!(info.lost, 2);
        assert_eq!(read_u64(&node, id).unwrap().0, 3);
        assert_eq!(read_u64(&node, id).unwrap().0, 4);
        assert!(matches!(read_u64(&node, id), Err(OrbError::NoData)));

        let stats = node.stats().snapshot();
        assert_eq!(stats.published, 5);
        assert_eq!(stats.copied, 3);
        assert_eq!(stats.lost, 2);
    }

    #[test]
    fn test_retire_fails_handles_and_wakes() {
        let (node, _publisher) = live_node(1, false);
        let subscriber = readiness();
        let id = node.attach_subscriber(subscriber.clone());
        subscriber.notifier().drain();

        node.retire();
        assert!(node.is_retired());
        assert!(subscriber.notifier().wait(Some(Duration::ZERO)).unwrap());
        assert!(matches!(node.check(id), Err(OrbError::NotAdvertised { .. })));
        assert!(matches!(
            node.copy(id, &mut [0u8; 8]),
            Err(OrbError::NotAdvertised { .. })
        ));
        assert!(node.publish(&0u64.to_le_bytes(), 1).is_err());
        assert_eq!(node.poll_subscriber(id, &subscriber), EventMask::ERROR);
    }

    #[test]
    fn test_promote_twice_rejected() {
        let (node, _publisher) = live_node(1, false);
        assert!(matches!(
            node.promote(ring(1), None, false, readiness()),
            Err(OrbError::AlreadyAdvertised { .. })
        ));
    }

    #[test]
    fn test_interval_limits_check() {
        let (node, _publisher) = live_node(1, false);
        let id = node.attach_subscriber(readiness());
        node.set_interval(id, 200_000).unwrap();
        assert_eq!(node.interval(id).unwrap(), 200_000);

        node.publish(&1u64.to_le_bytes(), 1).unwrap();
        assert!(node.check(id).unwrap());
        read_u64(&node, id).unwrap();

        node.publish(&2u64.to_le_bytes(), 2).unwrap();
        assert!(!node.check(id).unwrap());
        let remaining = node.time_until_ready(id).unwrap();
        assert!(remaining <= Duration::from_millis(200));

        // copy itself is not rate limited
        assert_eq!(read_u64(&node, id).unwrap().0, 2);
        assert!(node.time_until_ready(id).is_none());
    }

    #[test]
    fn test_flush_and_batch_handshake() {
        let (node, publisher) = live_node(1, false);
        let subscriber = readiness();
        let id = node.attach_subscriber(subscriber.clone());
        assert!(publisher.take().contains(OrbEvents::STATE_CHANGED));

        node.request_flush(id).unwrap();
        assert!(publisher.pending().contains(OrbEvents::FLUSH_REQUESTED));
        assert!(node
            .poll_publisher(&publisher)
            .contains(EventMask::DATAOUT | EventMask::PRIORITY));
        publisher.take();

        node.flush_complete().unwrap();
        assert_eq!(subscriber.take(), OrbEvents::FLUSH_COMPLETE);

        node.request_batch_interval(id, 10_000).unwrap();
        assert!(publisher.take().contains(OrbEvents::BATCH_REQUESTED));
        assert_eq!(node.state().min_batch_interval, 10_000);
        assert_eq!(node.batch_interval(), 0);

        node.confirm_batch_interval(10_000).unwrap();
        assert_eq!(node.batch_interval(), 10_000);
        assert_eq!(subscriber.take(), OrbEvents::FLUSH_COMPLETE);

        // Nothing pending any more
        node.flush_complete().unwrap();
        assert!(subscriber.take().is_empty());
    }

    #[test]
    fn test_requests_on_ghost_reach_publisher() {
        let node = TopicNode::ghost(&ORB_NODE_TEST, 0);
        let id = node.attach_subscriber(readiness());
        node.request_flush(id).unwrap();

        let publisher = readiness();
        node.promote(ring(1), None, false, publisher.clone()).unwrap();
        let pending = publisher.take();
        assert!(pending.contains(OrbEvents::STATE_CHANGED));
        assert!(pending.contains(OrbEvents::FLUSH_REQUESTED));
    }

    #[test]
    fn test_state_aggregates_subscribers() {
        let (node, _publisher) = live_node(4, false);
        let a = node.attach_subscriber(readiness());
        let b = node.attach_subscriber(readiness());
        node.set_interval(a, 10_000).unwrap();
        node.set_interval(b, 2_000).unwrap();
        node.publish(&1u64.to_le_bytes(), 1).unwrap();

        let state = node.state();
        assert_eq!(state.max_frequency, 500);
        assert_eq!(state.queue_size, 4);
        assert_eq!(state.nsubscribers, 2);
        assert_eq!(state.generation, 1);

        assert_eq!(node.detach_subscriber(a), 1);
        assert_eq!(node.state().max_frequency, 500);
        assert_eq!(node.detach_subscriber(b), 0);
        assert_eq!(node.state().max_frequency, 0);
    }

    struct Doubler;

    impl ControlHandler for Doubler {
        fn control(&self, cmd: u32, arg: u64) -> Result<u64> {
            match cmd {
                0x100 => Ok(arg * 2),
                _ => Err(OrbError::unsupported("doubler")),
            }
        }
    }

    #[test]
    fn test_control_and_info() {
        let (node, _publisher) = live_node(1, false);
        assert!(matches!(node.control(0x100, 4), Err(OrbError::Unsupported { .. })));
        assert!(node.info().is_err());

        node.set_control_handler(Some(Arc::new(Doubler))).unwrap();
        assert_eq!(node.control(0x100, 4).unwrap(), 8);

        let info = DeviceInfo {
            name: "bmi088".into(),
            max_range: 16.0,
            ..Default::default()
        };
        node.set_info(info.clone()).unwrap();
        assert_eq!(node.info().unwrap(), info);

        node.retire();
        assert!(matches!(
            node.control(0x100, 4),
            Err(OrbError::NotAdvertised { .. })
        ));
    }
}
