//! Bounded hand-off between the render thread and a scripting-capable
//! control thread.
//!
//! The render thread packages a quantum of planar input plus a sequence
//! number, wakes the control side through a condition variable, and waits
//! at most the configured timeout for the result. On timeout it proceeds
//! with whatever output it last had rather than stalling the quantum; the
//! control side's late completion is discarded by sequence check. Offline
//! rendering bypasses the wait entirely and runs the processor inline.

use cadenza_core::{AudioBus, ThrottleGate};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// User processing callback: planar input in, planar output out. Slices
/// are pre-sized to the endpoint's channel counts and quantum size.
pub type ProcessorFn = Box<dyn FnMut(&[Vec<f32>], &mut [Vec<f32>]) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Requested,
    Done,
}

struct Exchange {
    phase: Phase,
    /// Bumped by the render side per request; a `Done` only counts if its
    /// sequence matches, so late completions of older requests are ignored.
    sequence: u64,
    done_sequence: u64,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
}

/// One script processor's (or worklet's) hand-off channel. Shared between
/// the render node and the control-thread service.
pub struct BridgeEndpoint {
    state: Mutex<Exchange>,
    request_ready: Condvar,
    response_ready: Condvar,
    processor: Mutex<Option<ProcessorFn>>,
    stall_gate: ThrottleGate,
}

impl BridgeEndpoint {
    pub fn new(input_channels: usize, output_channels: usize, frames: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Exchange {
                phase: Phase::Idle,
                sequence: 0,
                done_sequence: 0,
                input: vec![vec![0.0; frames]; input_channels.max(1)],
                output: vec![vec![0.0; frames]; output_channels.max(1)],
            }),
            request_ready: Condvar::new(),
            response_ready: Condvar::new(),
            processor: Mutex::new(None),
            stall_gate: ThrottleGate::default(),
        })
    }

    /// Installs the user callback the control side runs per request.
    pub fn set_processor(&self, processor: ProcessorFn) {
        *self.processor.lock() = Some(processor);
    }

    /// Render-thread side. Publishes `input`, waits up to `timeout` for the
    /// control thread, and on success copies the result into `output`.
    ///
    /// Returns false on deadline miss or lock contention; the caller keeps
    /// its previous output. The wait is the only bounded blocking the
    /// render thread ever performs.
    pub fn exchange(&self, input: &AudioBus, output: &mut AudioBus, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Some(mut state) = self.state.try_lock_until(deadline) else {
            self.log_stall();
            return false;
        };

        let channels = state.input.len().min(input.channel_count());
        for ch in 0..channels {
            state.input[ch].copy_from_slice(input.channel(ch));
        }
        for ch in channels..state.input.len() {
            state.input[ch].fill(0.0);
        }
        state.sequence += 1;
        let sequence = state.sequence;
        state.phase = Phase::Requested;
        self.request_ready.notify_one();

        while !(state.phase == Phase::Done && state.done_sequence == sequence) {
            if self
                .response_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }

        if state.phase == Phase::Done && state.done_sequence == sequence {
            let channels = state.output.len().min(output.channel_count());
            for ch in 0..channels {
                output.channel_mut(ch).copy_from_slice(&state.output[ch]);
            }
            state.phase = Phase::Idle;
            true
        } else {
            self.log_stall();
            false
        }
    }

    /// Control-thread side: waits up to `timeout` for one request, runs the
    /// processor, and wakes the render thread. Returns false if no request
    /// arrived or no processor is installed.
    pub fn serve_one(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.phase != Phase::Requested {
            if self.request_ready.wait_until(&mut state, deadline).timed_out() {
                return false;
            }
        }

        let mut processor = self.processor.lock();
        let Some(processor) = processor.as_mut() else {
            return false;
        };
        let sequence = state.sequence;
        let Exchange {
            input: in_buf,
            output: out_buf,
            ..
        } = &mut *state;
        processor(in_buf, out_buf);
        state.done_sequence = sequence;
        state.phase = Phase::Done;
        self.response_ready.notify_one();
        true
    }

    /// Synchronous variant for offline rendering, where control and render
    /// execution share a thread and waiting would deadlock.
    pub fn process_sync(&self, input: &AudioBus, output: &mut AudioBus) -> bool {
        // Same acquisition order as `serve_one`: state before processor.
        let mut state = self.state.lock();
        let mut processor_slot = self.processor.lock();
        let Some(processor) = processor_slot.as_mut() else {
            return false;
        };
        let in_channels = state.input.len().min(input.channel_count());
        for ch in 0..in_channels {
            state.input[ch].copy_from_slice(input.channel(ch));
        }
        for ch in in_channels..state.input.len() {
            state.input[ch].fill(0.0);
        }
        let Exchange {
            input: in_buf,
            output: out_buf,
            ..
        } = &mut *state;
        processor(in_buf, out_buf);
        let channels = state.output.len().min(output.channel_count());
        for ch in 0..channels {
            output.channel_mut(ch).copy_from_slice(&state.output[ch]);
        }
        true
    }

    fn log_stall(&self) {
        if self.stall_gate.admit() {
            tracing::warn!("script processor missed its deadline; reusing last output");
        }
    }
}

/// Background service that drives a set of endpoints from a dedicated
/// control-side thread.
pub struct BridgeService {
    shutdown: Arc<cadenza_core::AtomicFlag>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl BridgeService {
    pub fn spawn(endpoints: Vec<Arc<BridgeEndpoint>>) -> Self {
        let shutdown = Arc::new(cadenza_core::AtomicFlag::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("script-bridge".to_string())
            .spawn(move || {
                let poll = Duration::from_millis(2);
                while !flag.get() {
                    let mut served = false;
                    for endpoint in &endpoints {
                        served |= endpoint.serve_one(poll);
                    }
                    if !served {
                        std::thread::yield_now();
                    }
                }
            })
            .ok();
        Self {
            shutdown,
            thread,
        }
    }
}

impl Drop for BridgeService {
    fn drop(&mut self) {
        self.shutdown.set(true);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
