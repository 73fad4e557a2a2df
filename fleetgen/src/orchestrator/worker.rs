//! The per-generator control loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::jobs::{BatchJob, execute};
use crate::lifecycle::{Lifecycle, LifecycleStatus, WaitOutcome, wait_until, wait_while_paused};
use crate::schedule::{Interval, IntervalScheduler};
use crate::state::StateStore;
use crate::time::TimeSource;

/// Everything a loop needs, passed explicitly instead of through globals.
#[derive(Clone)]
pub struct WorkerContext {
    pub lifecycle: Arc<Lifecycle>,
    pub state: Arc<StateStore>,
    pub clock: Arc<dyn TimeSource>,
    /// Batches hold a read guard; clean and baseline repair take the write side.
    pub gate: Arc<RwLock<()>>,
    pub poll_interval: Duration,
}

/// Run one generator until shutdown.
///
/// Each iteration waits for the end of the current interval, then writes the
/// batch for the interval that just closed. A batch always runs to completion
/// before the next pause check. Failed batches are logged and skipped.
pub async fn run_worker<J: BatchJob>(job: Arc<J>, ctx: WorkerContext) {
    let scheduler = job.scheduler();
    let mut status = ctx.lifecycle.subscribe();
    let mut current = scheduler.interval_containing(ctx.clock.now());
    info!(generator = J::NAME, next_boundary = %current.end, "Generator loop started");

    loop {
        ctx.state.flush();

        match wait_until(&mut status, ctx.clock.as_ref(), current.end, ctx.poll_interval).await {
            WaitOutcome::ShuttingDown => break,
            WaitOutcome::Paused => {
                info!(generator = J::NAME, "Generator loop paused");
                if !wait_while_paused(&mut status).await {
                    break;
                }
                // Intervals that closed while paused are not backfilled.
                let now = ctx.clock.now();
                if current.end <= now {
                    current = scheduler.interval_containing(now);
                }
                info!(generator = J::NAME, next_boundary = %current.end, "Generator loop resumed");
                continue;
            }
            WaitOutcome::Elapsed => {}
        }

        if ctx.lifecycle.is_degraded() {
            warn!(generator = J::NAME, batch_id = %current.batch_id(), "Baseline degraded, skipping batch");
        } else {
            let gate = ctx.gate.read().await;
            // Clean or pause may have won the race for the gate.
            if ctx.lifecycle.status() != LifecycleStatus::Running {
                drop(gate);
                continue;
            }
            if let Err(err) = execute(job.as_ref(), &ctx.state, current, ctx.clock.now()) {
                error!(generator = J::NAME, batch_id = %current.batch_id(), error = %err, "Batch failed, skipping");
            }
            drop(gate);
        }

        current = advance(J::NAME, &scheduler, current, ctx.clock.now());
    }

    info!(generator = J::NAME, "Generator loop stopped");
}

/// The interval to wait on next; skips ahead when the loop has fallen behind.
fn advance(name: &str, scheduler: &IntervalScheduler, current: Interval, now: chrono::DateTime<chrono::Utc>) -> Interval {
    let next = current.next();
    if next.end > now {
        return next;
    }
    let caught_up = scheduler.interval_containing(now);
    warn!(generator = name, from = %next.start, to = %caught_up.start, "Behind schedule, skipping missed intervals");
    caught_up
}
