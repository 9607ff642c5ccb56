//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod console_chat_notifier;
mod file_config_source;
mod http_config_source;
mod redis_teardown_scheduler;
mod slack_chat_notifier;
mod template_workspace_factory;
mod terraform_engine;

pub use console_chat_notifier::ConsoleChatNotifier;
pub use file_config_source::FileConfigSource;
pub use http_config_source::HttpConfigSource;
pub use redis_teardown_scheduler::RedisTeardownScheduler;
pub use slack_chat_notifier::{DEFAULT_SLACK_API_BASE_URL, SlackChatNotifier};
pub use template_workspace_factory::{TempWorkspace, TemplateWorkspaceFactory, VARIABLES_FILE};
pub use terraform_engine::{BACKEND_CONFIG_FILE, TerraformEngine};
