//! Fires due teardown triggers through the teardown service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ephemera_application::{
    DueTrigger, TeardownError, TeardownReport, TeardownService, TeardownTriggerSource,
};
use ephemera_core::{AppError, AppResult};
use tracing::{debug, error, info, warn};

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub claimed: usize,
    pub destroyed: usize,
    pub failed: usize,
}

pub struct TeardownRunner {
    service: TeardownService,
    triggers: Arc<dyn TeardownTriggerSource>,
    worker_id: String,
    claim_limit: usize,
    lease_seconds: u32,
}

impl TeardownRunner {
    pub fn new(
        service: TeardownService,
        triggers: Arc<dyn TeardownTriggerSource>,
        worker_id: impl Into<String>,
        claim_limit: usize,
        lease_seconds: u32,
    ) -> Self {
        Self {
            service,
            triggers,
            worker_id: worker_id.into(),
            claim_limit,
            lease_seconds,
        }
    }

    /// Tears down up to `claim_limit` due triggers.
    ///
    /// Triggers are claimed one at a time, right before their teardown, and
    /// the claim is renewed while the teardown runs. Triggers whose destroy
    /// fails are marked failed and not retried automatically; a claimed
    /// trigger left unmarked re-fires after its lease.
    pub async fn run_cycle(&self) -> AppResult<CycleSummary> {
        let mut summary = CycleSummary::default();

        while summary.claimed < self.claim_limit {
            let Some(trigger) = self
                .triggers
                .claim_due(Utc::now(), 1, self.lease_seconds, self.worker_id.as_str())
                .await?
                .into_iter()
                .next()
            else {
                break;
            };
            summary.claimed = summary.claimed.saturating_add(1);

            info!(
                worker_id = %self.worker_id,
                trigger = %trigger.name,
                "claimed due teardown trigger"
            );

            match self.destroy_while_renewing(&trigger).await {
                Ok(report) => {
                    summary.destroyed = summary.destroyed.saturating_add(1);
                    info!(
                        worker_id = %self.worker_id,
                        request_id = %report.request_id,
                        state = report.state.as_str(),
                        "teardown completed"
                    );
                }
                Err(teardown_error @ TeardownError::DestroyFailed { .. }) => {
                    summary.failed = summary.failed.saturating_add(1);
                    if let Err(mark_error) = self
                        .triggers
                        .mark_failed(trigger.name.as_str(), teardown_error.to_string().as_str())
                        .await
                    {
                        warn!(
                            worker_id = %self.worker_id,
                            trigger = %trigger.name,
                            error = %mark_error,
                            "failed to mark teardown trigger failed"
                        );
                    }
                }
                Err(teardown_error @ TeardownError::DeregistrationFailed { .. }) => {
                    summary.destroyed = summary.destroyed.saturating_add(1);
                    error!(
                        alert = true,
                        worker_id = %self.worker_id,
                        trigger = %trigger.name,
                        error = %teardown_error,
                        "teardown trigger requires manual deletion"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Runs one teardown, renewing its claim every third of the lease.
    async fn destroy_while_renewing(
        &self,
        trigger: &DueTrigger,
    ) -> Result<TeardownReport, TeardownError> {
        let period = renewal_period(self.lease_seconds);
        let destroy = self.service.destroy(&trigger.payload);
        tokio::pin!(destroy);
        let mut renewal = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                result = &mut destroy => return result,
                _ = renewal.tick() => self.renew_claim(trigger.name.as_str()).await,
            }
        }
    }

    async fn renew_claim(&self, name: &str) {
        match self
            .triggers
            .renew_claim(name, self.worker_id.as_str(), Utc::now(), self.lease_seconds)
            .await
        {
            Ok(true) => debug!(worker_id = %self.worker_id, trigger = %name, "claim renewed"),
            Ok(false) => warn!(
                worker_id = %self.worker_id,
                trigger = %name,
                "teardown claim lost while destroy is running"
            ),
            Err(error) => warn!(
                worker_id = %self.worker_id,
                trigger = %name,
                error = %error,
                "failed to renew teardown claim"
            ),
        }
    }

    /// Re-invokes the teardown of one registered trigger by name.
    pub async fn run_once(&self, request_id: &str) -> AppResult<()> {
        let payload = self
            .triggers
            .load_payload(request_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no teardown trigger payload for '{request_id}'"))
            })?;

        let report = self
            .service
            .destroy(&payload)
            .await
            .map_err(|teardown_error| AppError::Internal(teardown_error.to_string()))?;

        info!(
            worker_id = %self.worker_id,
            request_id = %report.request_id,
            state = report.state.as_str(),
            "manual teardown completed"
        );

        Ok(())
    }
}

fn renewal_period(lease_seconds: u32) -> Duration {
    Duration::from_millis((u64::from(lease_seconds) * 1000 / 3).max(1))
}
