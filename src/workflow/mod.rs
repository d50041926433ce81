//! Durable workflow orchestration (C8).
//!
//! Hand-rolled in-process activity runner: each `Activity` runs with a
//! start-to-close timeout, exponential-backoff retries, and a heartbeat
//! pacemaker, the way `orchestrator.rs`'s straight-line pipeline runs each
//! stage in sequence but generalized with the retry/timeout/heartbeat
//! contract of §4.8. There is no external durable-execution service here
//! (no Temporal Rust SDK exists) — workflows are plain async functions over
//! `Activity` impls, and durability comes from each activity's DB writes
//! being idempotent on retry (§4.1, §4.5, §4.8).

pub mod download;
pub mod transcribe;

use crate::error::{PipelineError, Result};
use crate::progress::{Event, ProgressBus};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

/// One durable step. `run` does the actual work; the engine wraps it with
/// timeout, retry, and heartbeat bookkeeping.
#[async_trait]
pub trait Activity: Send + Sync {
    type Output: Send;

    fn name(&self) -> &'static str;

    /// Maximum wall-clock time for one attempt (§4.8's "start-to-close timeout").
    fn timeout(&self) -> Duration;

    /// Number of attempts before the activity is considered failed.
    fn max_attempts(&self) -> u32;

    /// Run one attempt. Implementations must be safe to call again on retry
    /// (each activity's own DB writes are idempotent, not this trait).
    async fn run(&self, job_id: Uuid, progress: &ProgressBus) -> Result<Self::Output>;
}

/// Exponential backoff schedule shared by every activity (§4.8: 1s/5s seed,
/// doubling, capped, per-kind bounds noted on each `Activity` impl).
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Backoff {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
    }
}

/// Run `activity` to completion, retrying transient failures per `backoff`
/// and emitting heartbeats on `progress` so a stalled attempt is observable
/// (§4.8, §4.9).
///
/// A pacemaker ticks every `heartbeat_interval` for the whole attempt,
/// independent of whatever heartbeats the activity emits from inside its own
/// work loop — this is the backstop for activities (or inner loops) that
/// don't heartbeat on their own, so every attempt still heartbeats within
/// `heartbeat_timeout` as §4.8 requires.
pub async fn run_activity<A: Activity>(
    activity: &A,
    job_id: Uuid,
    progress: &ProgressBus,
    backoff: &Backoff,
    heartbeat_interval: Duration,
) -> Result<A::Output> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        info!(activity = activity.name(), attempt, %job_id, "starting activity attempt");

        let run_fut = activity.run(job_id, progress);
        tokio::pin!(run_fut);
        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.tick().await; // first tick fires immediately; consume it so pacing starts after one full interval

        let result = timeout(activity.timeout(), async {
            loop {
                tokio::select! {
                    biased;
                    res = &mut run_fut => return res,
                    _ = ticker.tick() => {
                        progress.publish(job_id, Event::processing(None));
                    }
                }
            }
        })
        .await;

        match result {
            Ok(Ok(output)) => {
                info!(activity = activity.name(), attempt, %job_id, "activity succeeded");
                return Ok(output);
            }
            Ok(Err(e)) if e.is_retryable() && attempt < activity.max_attempts() => {
                let delay = backoff.delay_for_attempt(attempt - 1);
                warn!(activity = activity.name(), attempt, %job_id, error = %e, delay_ms = delay.as_millis(), "activity failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
            Ok(Err(e)) => {
                warn!(activity = activity.name(), attempt, %job_id, error = %e, "activity failed, not retrying");
                return Err(e);
            }
            Err(_) => {
                if attempt < activity.max_attempts() {
                    warn!(activity = activity.name(), attempt, %job_id, "activity timed out, retrying");
                    continue;
                }
                warn!(activity = activity.name(), attempt, %job_id, "activity timed out, exhausted retries");
                return Err(PipelineError::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let backoff = Backoff {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        };
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(20));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(60));
    }
}
