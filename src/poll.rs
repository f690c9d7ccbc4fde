//! Repeat probes on a fixed interval.

use crate::config::Settings;
use crate::shutdown::ShutdownSignal;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Poll loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Running,
    Stopped,
}

/// Runs a probe once, or every `interval` until shut down.
#[derive(Debug)]
pub struct PollLoop {
    nonstop: bool,
    interval: Duration,
    state: PollState,
    cycles: u64,
}

impl PollLoop {
    pub fn new(nonstop: bool, interval: Duration) -> Self {
        Self {
            nonstop,
            interval,
            state: PollState::Running,
            cycles: 0,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.nonstop, settings.poll_interval())
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Probes started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Drive the loop until it stops.
    ///
    /// A shutdown during a probe abandons that probe; its future is dropped.
    pub async fn run<F, Fut>(&mut self, mut probe: F, mut shutdown: ShutdownSignal) -> PollState
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        while self.state == PollState::Running {
            if shutdown.is_shutdown() {
                self.stop();
                break;
            }

            self.cycles += 1;
            debug!("Poll cycle {}", self.cycles);

            tokio::select! {
                _ = probe() => {}
                _ = shutdown.recv() => {
                    info!("Interrupted during probe");
                    self.stop();
                    break;
                }
            }

            if !self.nonstop {
                self.stop();
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => {
                    self.stop();
                }
            }
        }

        self.state
    }

    fn stop(&mut self) {
        debug!("Poll loop stopped after {} cycles", self.cycles);
        self.state = PollState::Stopped;
    }
}
