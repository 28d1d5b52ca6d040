//! Drives the reconciler: one cycle (`--once`) or forever on a fixed cadence.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::reconcile::{Reconciler, StepOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Watch { interval: Duration },
}

impl RunMode {
    pub fn from_flag(once: bool, interval: Duration) -> Self {
        if once {
            RunMode::Once
        } else {
            RunMode::Watch { interval }
        }
    }
}

/// Run cycles until done. Returns how many cycles ran.
///
/// Cycles are strictly sequential. `shutdown` is only raced against the idle
/// delay, so a cycle in progress always completes.
pub async fn run<F>(reconciler: &mut Reconciler, mode: RunMode, shutdown: F) -> u64
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut cycles: u64 = 0;

    loop {
        cycles += 1;
        info!(
            cycle = cycles,
            at = %chrono::Local::now().format("%H:%M:%S"),
            "checking"
        );
        let outcome: StepOutcome = reconciler.step().await;
        debug!(cycle = cycles, ?outcome, "cycle done");

        let interval = match mode {
            RunMode::Once => return cycles,
            RunMode::Watch { interval } => interval,
        };

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => {
                info!(cycles, "shutdown signal received");
                return cycles;
            }
        }
    }
}
