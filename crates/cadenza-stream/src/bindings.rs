//! Transactional publication of shared-memory stream bindings.
//!
//! A graph update can introduce several nodes that each need a ring
//! (script processors, worklet ports). Publishing them must be
//! all-or-nothing: a half-wired update would silently mute part of the
//! graph. Rings are allocated first, the full descriptor list goes out in
//! one message, and on failure nothing is attached and a retry is
//! scheduled with doubling backoff up to an attempt cap.

use crate::descriptor::RingStreamDescriptor;
use crate::error::{Error, Result};
use crate::frame_ring::{
    frame_ring_region_len, FrameRingFormat, FrameRingProducer, OverflowPolicy,
};
use crate::shm::SharedRegion;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sends one batch of descriptors to the peer process. Implementations
/// must be atomic at the message level: either the peer sees the whole
/// list or none of it.
pub trait BindingTransport {
    fn publish(&mut self, bindings: &[RingStreamDescriptor]) -> std::result::Result<(), String>;
}

/// A fully allocated ring waiting to be (or already) published.
pub struct StreamBinding {
    pub descriptor: RingStreamDescriptor,
    pub region: Arc<SharedRegion>,
}

/// Allocates the shared ring for one binding and hands back the producer
/// half for the local side. Allocation happens before any publish attempt
/// so a publish failure never leaves a ring half-made.
pub fn allocate_binding(
    stream_id: u64,
    format: FrameRingFormat,
    policy: OverflowPolicy,
    notify_token: Option<String>,
) -> Result<(StreamBinding, FrameRingProducer)> {
    let shm_name = format!("stream_{stream_id}");
    let region = Arc::new(SharedRegion::create(
        &shm_name,
        frame_ring_region_len(&format),
    )?);
    let producer = FrameRingProducer::new(Arc::clone(&region), format, policy)?;
    let binding = StreamBinding {
        descriptor: RingStreamDescriptor {
            stream_id,
            format,
            policy,
            shm_name,
            notify_token,
        },
        region,
    };
    Ok((binding, producer))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { count: usize },
    RetryScheduled { attempt: u32, next_due: Instant },
    GaveUp { attempts: u32 },
}

struct RetryState {
    attempts: u32,
    delay: Duration,
    next_due: Instant,
}

pub struct BindingPublisher<T: BindingTransport> {
    transport: T,
    attached: HashMap<u64, StreamBinding>,
    pending: Vec<StreamBinding>,
    retry: Option<RetryState>,
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl<T: BindingTransport> BindingPublisher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            attached: HashMap::new(),
            pending: Vec::new(),
            retry: None,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            max_attempts: 6,
        }
    }

    pub fn with_retry_policy(
        mut self,
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self.max_attempts = max_attempts;
        self
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    pub fn is_attached(&self, stream_id: u64) -> bool {
        self.attached.contains_key(&stream_id)
    }

    pub fn detach(&mut self, stream_id: u64) -> Option<StreamBinding> {
        self.attached.remove(&stream_id)
    }

    /// Submits one graph update's worth of bindings and attempts to
    /// publish them (together with anything already pending).
    pub fn submit(&mut self, bindings: Vec<StreamBinding>, now: Instant) -> PublishOutcome {
        self.pending.extend(bindings);
        self.attempt(now)
    }

    /// Drives a scheduled retry if one is due. Call from the control
    /// thread's housekeeping loop.
    pub fn tick(&mut self, now: Instant) -> Option<PublishOutcome> {
        let due = self
            .retry
            .as_ref()
            .is_some_and(|retry| now >= retry.next_due);
        if !due || self.pending.is_empty() {
            return None;
        }
        Some(self.attempt(now))
    }

    pub fn pending_error(&self) -> Option<Error> {
        self.retry.as_ref().map(|retry| Error::PublishFailed(format!(
            "attempt {} of {} pending",
            retry.attempts, self.max_attempts
        )))
    }

    fn attempt(&mut self, now: Instant) -> PublishOutcome {
        let descriptors: Vec<RingStreamDescriptor> = self
            .pending
            .iter()
            .map(|binding| binding.descriptor.clone())
            .collect();
        match self.transport.publish(&descriptors) {
            Ok(()) => {
                let count = self.pending.len();
                for binding in self.pending.drain(..) {
                    self.attached.insert(binding.descriptor.stream_id, binding);
                }
                self.retry = None;
                PublishOutcome::Published { count }
            }
            Err(reason) => {
                let attempts = self.retry.as_ref().map_or(0, |retry| retry.attempts) + 1;
                if attempts >= self.max_attempts {
                    tracing::error!(%reason, attempts, "stream binding publish abandoned");
                    // Roll back: dropping the bindings releases their rings.
                    self.pending.clear();
                    self.retry = None;
                    return PublishOutcome::GaveUp { attempts };
                }
                let delay = self
                    .retry
                    .as_ref()
                    .map_or(self.base_delay, |retry| (retry.delay * 2).min(self.max_delay));
                let next_due = now + delay;
                tracing::warn!(%reason, attempts, ?delay, "stream binding publish failed; retrying");
                self.retry = Some(RetryState {
                    attempts,
                    delay,
                    next_due,
                });
                PublishOutcome::RetryScheduled {
                    attempt: attempts,
                    next_due,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyTransport {
        failures_left: u32,
        delivered: Vec<Vec<u64>>,
    }

    impl FlakyTransport {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: times,
                delivered: Vec::new(),
            }
        }
    }

    impl BindingTransport for FlakyTransport {
        fn publish(
            &mut self,
            bindings: &[RingStreamDescriptor],
        ) -> std::result::Result<(), String> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err("out of descriptors".to_string());
            }
            self.delivered
                .push(bindings.iter().map(|b| b.stream_id).collect());
            Ok(())
        }
    }

    fn bindings(tag: u64, count: u64) -> Vec<StreamBinding> {
        let format = FrameRingFormat {
            sample_rate_hz: 48_000,
            channel_count: 1,
            channel_capacity: 1,
            capacity_frames: 256,
        };
        (0..count)
            .map(|i| {
                // Offset ids by pid so parallel test runs do not collide
                // on segment names.
                let id = u64::from(std::process::id()) * 1000 + tag * 100 + i;
                let (binding, _producer) =
                    allocate_binding(id, format, OverflowPolicy::DropOldest, None).unwrap();
                binding
            })
            .collect()
    }

    #[test]
    fn test_successful_publish_attaches_everything() {
        let mut publisher = BindingPublisher::new(FlakyTransport::failing(0));
        let batch = bindings(1, 3);
        let ids: Vec<u64> = batch.iter().map(|b| b.descriptor.stream_id).collect();
        let outcome = publisher.submit(batch, Instant::now());
        assert_eq!(outcome, PublishOutcome::Published { count: 3 });
        assert_eq!(publisher.attached_count(), 3);
        for id in ids {
            assert!(publisher.is_attached(id));
        }
    }

    #[test]
    fn test_failed_publish_attaches_nothing() {
        let mut publisher = BindingPublisher::new(FlakyTransport::failing(1));
        let now = Instant::now();
        let outcome = publisher.submit(bindings(2, 3), now);
        assert!(matches!(
            outcome,
            PublishOutcome::RetryScheduled { attempt: 1, .. }
        ));
        // All-or-nothing: zero of the three are attached.
        assert_eq!(publisher.attached_count(), 0);
    }

    #[test]
    fn test_retry_succeeds_after_transient_failure() {
        let mut publisher = BindingPublisher::new(FlakyTransport::failing(2))
            .with_retry_policy(Duration::from_millis(1), Duration::from_millis(8), 6);
        let now = Instant::now();
        publisher.submit(bindings(3, 2), now);

        // Not yet due.
        assert!(publisher.tick(now).is_none());

        let later = now + Duration::from_millis(2);
        assert!(matches!(
            publisher.tick(later),
            Some(PublishOutcome::RetryScheduled { attempt: 2, .. })
        ));

        let much_later = later + Duration::from_millis(10);
        assert_eq!(
            publisher.tick(much_later),
            Some(PublishOutcome::Published { count: 2 })
        );
        assert_eq!(publisher.attached_count(), 2);
    }

    #[test]
    fn test_gives_up_after_attempt_cap() {
        let mut publisher = BindingPublisher::new(FlakyTransport::failing(u32::MAX))
            .with_retry_policy(Duration::from_millis(1), Duration::from_millis(4), 3);
        let mut now = Instant::now();
        publisher.submit(bindings(4, 1), now);
        let mut last = None;
        for _ in 0..10 {
            now += Duration::from_millis(20);
            if let Some(outcome) = publisher.tick(now) {
                last = Some(outcome);
                if matches!(outcome, PublishOutcome::GaveUp { .. }) {
                    break;
                }
            }
        }
        assert_eq!(last, Some(PublishOutcome::GaveUp { attempts: 3 }));
        assert_eq!(publisher.attached_count(), 0);
        // Nothing pending; further ticks are quiet.
        assert!(publisher.tick(now + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_backoff_delay_doubles_up_to_cap() {
        let mut publisher = BindingPublisher::new(FlakyTransport::failing(u32::MAX))
            .with_retry_policy(Duration::from_millis(10), Duration::from_millis(25), 10);
        let now = Instant::now();
        publisher.submit(bindings(5, 1), now);

        let mut due = now;
        let mut gaps = Vec::new();
        for _ in 0..3 {
            let fire = due + Duration::from_millis(500);
            match publisher.tick(fire) {
                Some(PublishOutcome::RetryScheduled { next_due, .. }) => {
                    gaps.push(next_due - fire);
                    due = next_due;
                }
                other => panic!("expected retry, got {other:?}"),
            }
        }
        assert_eq!(gaps, vec![
            Duration::from_millis(20),
            Duration::from_millis(25),
            Duration::from_millis(25),
        ]);
    }
}
