//! Ephemera teardown worker runtime.

#![forbid(unsafe_code)]

mod teardown_runner;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ephemera_application::TeardownService;
use ephemera_core::{AppError, AppResult};
use ephemera_infrastructure::{
    RedisTeardownScheduler, TemplateWorkspaceFactory, TerraformEngine,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::teardown_runner::TeardownRunner;

#[derive(Debug, Clone)]
struct WorkerConfig {
    redis_url: String,
    scheduler_key_prefix: String,
    template_root: PathBuf,
    terraform_bin: PathBuf,
    terraform_timeout_seconds: u64,
    state_key_prefix: String,
    destroyer_target_id: String,
    worker_id: String,
    claim_limit: usize,
    lease_seconds: u32,
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let runner = build_runner(&config)?;

    let mut args = env::args().skip(1);
    if args.next().as_deref() == Some("teardown") {
        let request_id = args.next().ok_or_else(|| {
            AppError::Validation("usage: ephemera-worker teardown <request_id>".to_owned())
        })?;
        return runner.run_once(request_id.as_str()).await;
    }

    info!(
        worker_id = %config.worker_id,
        claim_limit = config.claim_limit,
        lease_seconds = config.lease_seconds,
        poll_interval_ms = config.poll_interval_ms,
        "ephemera-worker started"
    );

    loop {
        match runner.run_cycle().await {
            Ok(summary) if summary.claimed > 0 => {
                info!(
                    worker_id = %config.worker_id,
                    claimed = summary.claimed,
                    destroyed = summary.destroyed,
                    failed = summary.failed,
                    "teardown cycle finished"
                );
            }
            Ok(_) => {}
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "failed to claim teardown triggers"
                );
            }
        }

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

fn build_runner(config: &WorkerConfig) -> AppResult<TeardownRunner> {
    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Internal(format!("invalid REDIS_URL: {error}")))?;
    let scheduler = Arc::new(RedisTeardownScheduler::new(
        redis_client,
        config.scheduler_key_prefix.clone(),
    ));
    let engine = Arc::new(TerraformEngine::new(
        config.terraform_bin.clone(),
        Duration::from_secs(config.terraform_timeout_seconds),
    ));
    let workspaces = Arc::new(TemplateWorkspaceFactory::new(
        config.template_root.clone(),
        config.state_key_prefix.clone(),
    ));

    let service = TeardownService::new(
        engine,
        workspaces,
        scheduler.clone(),
        config.destroyer_target_id.clone(),
    );

    Ok(TeardownRunner::new(
        service,
        scheduler,
        config.worker_id.clone(),
        config.claim_limit,
        config.lease_seconds,
    ))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let redis_url = required_env("REDIS_URL")?;
        let scheduler_key_prefix = env::var("SCHEDULER_KEY_PREFIX")
            .unwrap_or_else(|_| "ephemera:teardown".to_owned());
        let template_root = PathBuf::from(required_env("TEMPLATE_ROOT")?);
        let terraform_bin =
            PathBuf::from(env::var("TERRAFORM_BIN").unwrap_or_else(|_| "terraform".to_owned()));
        let terraform_timeout_seconds = parse_env_u64("TERRAFORM_TIMEOUT_SECONDS", 900)?;
        let state_key_prefix =
            parse_state_key_prefix(env::var("TERRAFORM_STATE_KEY_PREFIX").ok().as_deref())?;
        let destroyer_target_id = optional_env("DESTROYER_TARGET_ID")
            .unwrap_or_else(|| "destroyer-worker".to_owned());
        let worker_id = optional_env("WORKER_ID")
            .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()));
        let claim_limit = parse_env_usize("WORKER_CLAIM_LIMIT", 10)?;
        let lease_seconds = parse_env_u32("WORKER_LEASE_SECONDS", 1800)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 5000)?;

        if terraform_timeout_seconds == 0 {
            return Err(AppError::Validation(
                "TERRAFORM_TIMEOUT_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "WORKER_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            redis_url,
            scheduler_key_prefix,
            template_root,
            terraform_bin,
            terraform_timeout_seconds,
            state_key_prefix,
            destroyer_target_id,
            worker_id,
            claim_limit,
            lease_seconds,
            poll_interval_ms,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_state_key_prefix(raw: Option<&str>) -> AppResult<String> {
    let prefix = raw.unwrap_or_default().trim().trim_end_matches('/');
    if prefix.is_empty() {
        return Err(AppError::Validation(
            "TERRAFORM_STATE_KEY_PREFIX is required and must not be empty".to_owned(),
        ));
    }

    Ok(prefix.to_owned())
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
