use std::path::Path;

use async_trait::async_trait;
use ephemera_core::{AppError, AppResult};
use secrecy::SecretString;

const MAX_DIAGNOSTIC_CHARS: usize = 4000;

/// Provisioning engine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Idempotent backend and provider setup.
    Init,
    /// Mutating resource creation.
    Apply,
    /// Named output lookup.
    Output,
    /// Resource destruction.
    Destroy,
}

impl EnginePhase {
    /// Returns stable phase value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Apply => "apply",
            Self::Output => "output",
            Self::Destroy => "destroy",
        }
    }
}

/// Structured result of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    /// Phase that ran.
    pub phase: EnginePhase,
    /// Process exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl EngineOutcome {
    /// Returns true when the process exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Converts a non-zero exit into an engine failure carrying diagnostics.
    pub fn into_result(self) -> AppResult<Self> {
        if self.succeeded() {
            return Ok(self);
        }

        Err(AppError::Engine {
            phase: self.phase.as_str().to_owned(),
            diagnostics: self.diagnostics(),
        })
    }

    /// Returns the tail of stderr, falling back to stdout when stderr is empty.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        let captured = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };

        let char_count = captured.chars().count();
        let mut diagnostics = if char_count > MAX_DIAGNOSTIC_CHARS {
            captured
                .chars()
                .skip(char_count - MAX_DIAGNOSTIC_CHARS)
                .collect()
        } else {
            captured.to_owned()
        };

        if diagnostics.is_empty() {
            diagnostics = match self.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_owned(),
            };
        }

        diagnostics
    }
}

/// Infrastructure-provisioning engine capability.
///
/// Each call blocks until the external process exits. `Err` is reserved for
/// failures to run the engine at all; a process that ran and failed is
/// reported through [`EngineOutcome`].
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Runs idempotent setup inside the workspace.
    async fn init(&self, workspace: &Path) -> AppResult<EngineOutcome>;

    /// Creates resources non-interactively.
    async fn apply(&self, workspace: &Path) -> AppResult<EngineOutcome>;

    /// Destroys resources non-interactively.
    async fn destroy(&self, workspace: &Path) -> AppResult<EngineOutcome>;

    /// Reads one named output after apply, `None` when it is absent.
    async fn read_output(&self, workspace: &Path, name: &str) -> AppResult<Option<SecretString>>;
}
