//! Application services and ports.

#![forbid(unsafe_code)]

mod command_parser;
mod config_service;
mod provisioning_ports;
mod provisioning_service;
mod request_verifier;
mod teardown_service;

pub use command_parser::parse_command;
pub use config_service::{BrokerConfig, ConfigService};
pub use provisioning_ports::{
    ChatNotifier, ConfigSource, CredentialAttachment, DueTrigger, EngineOutcome, EnginePhase,
    ProvisioningEngine, TeardownScheduler, TeardownTriggerSource, TriggerRegistration, Workspace,
    WorkspaceFactory,
};
pub use provisioning_service::{
    BASTION_ENDPOINT_OUTPUT, MissingOutputPolicy, PRIVATE_KEY_OUTPUT, ProvisioningService,
    ProvisioningSettings,
};
pub use request_verifier::{
    FRESHNESS_WINDOW_SECONDS, SignatureHeaders, compute_signature, verify_request,
};
pub use teardown_service::{TeardownError, TeardownReport, TeardownService};
