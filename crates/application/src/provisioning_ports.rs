mod chat;
mod config_source;
mod engine;
mod scheduler;
mod workspace;

pub use chat::{ChatNotifier, CredentialAttachment};
pub use config_source::ConfigSource;
pub use engine::{EngineOutcome, EnginePhase, ProvisioningEngine};
pub use scheduler::{DueTrigger, TeardownScheduler, TeardownTriggerSource, TriggerRegistration};
pub use workspace::{Workspace, WorkspaceFactory};
