use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tradegraph_models::HaltReason;

use crate::counters::StepBudget;

/// Run-scoped guard checked at every suspend point: the shared step budget,
/// the external cancel signal and the optional run deadline.
#[derive(Debug, Clone)]
pub struct RunContext {
    budget: StepBudget,
    cancel: CancellationToken,
    deadline: Option<(Instant, u64)>,
}

impl RunContext {
    pub fn new(step_limit: u32, cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            budget: StepBudget::new(step_limit),
            cancel,
            deadline: timeout.map(|t| (Instant::now() + t, t.as_secs())),
        }
    }

    pub fn steps_used(&self) -> u32 {
        self.budget.used()
    }

    /// Fail if the run was cancelled or its deadline has passed.
    pub fn checkpoint(&self) -> Result<(), HaltReason> {
        if self.cancel.is_cancelled() {
            return Err(HaltReason::Cancelled);
        }
        if let Some((deadline, after_seconds)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(HaltReason::TimedOut { after_seconds });
            }
        }
        Ok(())
    }

    /// Checkpoint, then claim one step of the recursion budget.
    pub fn begin_step(&self) -> Result<u32, HaltReason> {
        self.checkpoint()?;
        self.budget.consume()
    }

    /// Drive `fut` to completion unless the run is cancelled or times out first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, HaltReason> {
        match self.deadline {
            Some((deadline, after_seconds)) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(HaltReason::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(HaltReason::TimedOut { after_seconds }),
                    out = fut => Ok(out),
                }
            }
            None => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(HaltReason::Cancelled),
                    out = fut => Ok(out),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_context_halts_at_checkpoint() {
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(10, cancel.clone(), None);
        assert!(ctx.checkpoint().is_ok());
        cancel.cancel();
        assert_eq!(ctx.checkpoint(), Err(HaltReason::Cancelled));
        assert_eq!(ctx.begin_step(), Err(HaltReason::Cancelled));
        assert_eq!(ctx.steps_used(), 0);
    }

    #[tokio::test]
    async fn guard_races_cancellation() {
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(10, cancel.clone(), None);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = ctx
            .guard(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert_eq!(result, Err(HaltReason::Cancelled));
    }

    #[tokio::test]
    async fn guard_enforces_deadline() {
        let ctx = RunContext::new(10, CancellationToken::new(), Some(Duration::from_millis(30)));
        let result = ctx
            .guard(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert_eq!(result, Err(HaltReason::TimedOut { after_seconds: 0 }));
        assert!(matches!(ctx.checkpoint(), Err(HaltReason::TimedOut { .. })));
    }

    #[tokio::test]
    async fn guard_passes_through_output() {
        let ctx = RunContext::new(1, CancellationToken::new(), Some(Duration::from_secs(5)));
        assert_eq!(ctx.guard(async { 7 }).await, Ok(7));
        assert_eq!(ctx.begin_step(), Ok(1));
        assert_eq!(ctx.begin_step(), Err(HaltReason::RecursionLimit { limit: 1 }));
    }
}
