use chrono::{DateTime, Duration, Utc};
use ephemera_core::{AppError, AppResult};

use crate::access::RequestId;
use crate::variables::VariablesDocument;

/// Lifecycle state of one access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantState {
    /// Command received, not yet authenticated.
    Requested,
    /// Command authenticated and parsed.
    Verified,
    /// Engine init/apply in progress.
    Provisioning,
    /// Resources exist and a teardown is expected.
    Active,
    /// Engine destroy in progress.
    TearingDown,
    /// Resources destroyed and trigger deregistered.
    Destroyed,
    /// Lifecycle aborted.
    Failed {
        /// Whether provisioned resources may still exist and need an operator.
        orphaned_resources: bool,
    },
}

impl GrantState {
    /// Returns stable state value used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Verified => "verified",
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::TearingDown => "tearing_down",
            Self::Destroyed => "destroyed",
            Self::Failed {
                orphaned_resources: true,
            } => "failed_with_orphan",
            Self::Failed {
                orphaned_resources: false,
            } => "failed",
        }
    }

    /// Returns true for states that accept no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed | Self::Failed { .. })
    }

    /// Moves along the happy path, rejecting any skipped or reversed step.
    pub fn advance(self, next: Self) -> AppResult<Self> {
        let allowed = matches!(
            (self, next),
            (Self::Requested, Self::Verified)
                | (Self::Verified, Self::Provisioning)
                | (Self::Provisioning, Self::Active)
                | (Self::Active, Self::TearingDown)
                | (Self::TearingDown, Self::Destroyed)
                | (
                    Self::Failed {
                        orphaned_resources: true,
                    },
                    Self::TearingDown
                )
        );

        if !allowed {
            return Err(AppError::Conflict(format!(
                "grant cannot move from '{}' to '{}'",
                self.as_str(),
                next.as_str()
            )));
        }

        Ok(next)
    }

    /// Fails the grant. Resources are presumed orphaned once apply has completed.
    pub fn fail(self) -> AppResult<Self> {
        if self.is_terminal() {
            return Err(AppError::Conflict(format!(
                "grant in terminal state '{}' cannot fail",
                self.as_str()
            )));
        }

        Ok(Self::Failed {
            orphaned_resources: matches!(self, Self::Active | Self::TearingDown),
        })
    }

    /// Fails a grant whose apply completed but left it unusable.
    pub fn fail_with_orphan(self) -> AppResult<Self> {
        if self != Self::Provisioning {
            return Err(AppError::Conflict(format!(
                "only a provisioning grant can fail with orphaned resources, found '{}'",
                self.as_str()
            )));
        }

        Ok(Self::Failed {
            orphaned_resources: true,
        })
    }
}

/// Lifecycle record of one provisioned access window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    request_id: RequestId,
    variables: VariablesDocument,
    state: GrantState,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    failure_reason: Option<String>,
}

impl AccessGrant {
    /// Opens a grant record for a verified command.
    #[must_use]
    pub fn open(
        request_id: RequestId,
        variables: VariablesDocument,
        created_at: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Self {
        Self {
            request_id,
            variables,
            state: GrantState::Verified,
            created_at,
            expires_at: created_at + Duration::minutes(i64::from(duration_minutes)),
            failure_reason: None,
        }
    }

    /// Advances the grant along the happy path.
    pub fn advance(&mut self, next: GrantState) -> AppResult<()> {
        self.state = self.state.advance(next)?;
        Ok(())
    }

    /// Marks the grant failed, recording the reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> AppResult<()> {
        self.state = self.state.fail()?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Marks a provisioning grant failed with resources left behind.
    pub fn fail_with_orphan(&mut self, reason: impl Into<String>) -> AppResult<()> {
        self.state = self.state.fail_with_orphan()?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the apply-time variables document.
    #[must_use]
    pub fn variables(&self) -> &VariablesDocument {
        &self.variables
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> GrantState {
        self.state
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the teardown is due.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the failure reason when the grant failed.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::GrantState;

    #[test]
    fn happy_path_reaches_destroyed() {
        let state = GrantState::Requested
            .advance(GrantState::Verified)
            .and_then(|state| state.advance(GrantState::Provisioning))
            .and_then(|state| state.advance(GrantState::Active))
            .and_then(|state| state.advance(GrantState::TearingDown))
            .and_then(|state| state.advance(GrantState::Destroyed));

        assert!(state.is_ok());
        assert_eq!(
            state.unwrap_or(GrantState::Requested),
            GrantState::Destroyed
        );
    }

    #[test]
    fn skipping_provisioning_is_rejected() {
        assert!(GrantState::Verified.advance(GrantState::Active).is_err());
    }

    #[test]
    fn failure_before_active_owes_no_cleanup() {
        let state = GrantState::Provisioning.fail();
        assert_eq!(
            state.unwrap_or(GrantState::Requested),
            GrantState::Failed {
                orphaned_resources: false
            }
        );
    }

    #[test]
    fn failure_after_active_is_orphaned() {
        for state in [GrantState::Active, GrantState::TearingDown] {
            assert_eq!(
                state.fail().unwrap_or(GrantState::Requested),
                GrantState::Failed {
                    orphaned_resources: true
                }
            );
        }
    }

    #[test]
    fn terminal_states_cannot_fail_again() {
        assert!(GrantState::Destroyed.fail().is_err());
        assert!(
            GrantState::Failed {
                orphaned_resources: false
            }
            .fail()
            .is_err()
        );
    }

    #[test]
    fn orphaned_failure_can_be_torn_down() {
        let state = GrantState::Provisioning
            .fail_with_orphan()
            .and_then(|state| state.advance(GrantState::TearingDown))
            .and_then(|state| state.advance(GrantState::Destroyed));
        assert_eq!(
            state.unwrap_or(GrantState::Requested),
            GrantState::Destroyed
        );
    }

    #[test]
    fn clean_failure_cannot_be_torn_down() {
        let failed = GrantState::Failed {
            orphaned_resources: false,
        };
        assert!(failed.advance(GrantState::TearingDown).is_err());
    }
}
