//! Periodic release of stale seat holds.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

use seatbroker_service::SeatAllocator;

use crate::backoff::Backoff;

/// Background loop calling [`SeatAllocator::sweep_stale_holds`].
#[derive(Debug)]
pub struct SeatSweeper {
    allocator: SeatAllocator,
    interval: Duration,
    max_backoff: Duration,
}

impl SeatSweeper {
    /// Sweep every `interval`, backing off up to `max_backoff` on errors.
    pub fn new(allocator: SeatAllocator, interval: Duration, max_backoff: Duration) -> Self {
        Self {
            allocator,
            interval,
            max_backoff,
        }
    }

    /// Run until the stop signal flips to `true`.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(interval_seconds = self.interval.as_secs(), "Seat sweeper started");
        let mut backoff = Backoff::new(self.interval, self.max_backoff);
        loop {
            let pause = match self.allocator.sweep_stale_holds().await {
                Ok(_) => {
                    backoff.reset();
                    self.interval
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(error = %e, failures = backoff.failures(), delay_ms = delay.as_millis() as u64, "Seat sweep failed");
                    delay
                }
            };
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = time::sleep(pause) => {}
            }
            if *stop.borrow() {
                break;
            }
        }
        info!("Seat sweeper stopped");
    }
}
