use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ephemera_core::{AppError, AppResult, Requester};
use ephemera_domain::{
    AccessRequest, GrantState, RequestId, TargetDefinition, TeardownPayload, VariablesDocument,
};
use secrecy::SecretString;
use tokio::sync::Mutex;

use crate::provisioning_ports::{
    EngineOutcome, EnginePhase, ProvisioningEngine, TeardownScheduler, TriggerRegistration,
    Workspace, WorkspaceFactory,
};

use super::{TeardownError, TeardownService};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Materialize(Vec<u8>),
    Engine(EnginePhase),
    RemoveTarget { name: String, target_id: String },
    DeleteTrigger(String),
}

type CallLog = Arc<Mutex<Vec<Call>>>;

struct FakeWorkspace(PathBuf);

impl Workspace for FakeWorkspace {
    fn path(&self) -> &Path {
        self.0.as_path()
    }
}

struct FakeWorkspaceFactory {
    calls: CallLog,
}

#[async_trait]
impl WorkspaceFactory for FakeWorkspaceFactory {
    async fn materialize(
        &self,
        request_id: &RequestId,
        variables: &VariablesDocument,
    ) -> AppResult<Box<dyn Workspace>> {
        self.calls
            .lock()
            .await
            .push(Call::Materialize(variables.to_json_bytes()?));
        Ok(Box::new(FakeWorkspace(PathBuf::from(format!(
            "/workspaces/{request_id}"
        )))))
    }
}

struct FakeEngine {
    calls: CallLog,
    failing_phase: Option<EnginePhase>,
}

impl FakeEngine {
    async fn run(&self, phase: EnginePhase) -> AppResult<EngineOutcome> {
        self.calls.lock().await.push(Call::Engine(phase));
        let failed = self.failing_phase == Some(phase);

        Ok(EngineOutcome {
            phase,
            exit_code: Some(if failed { 1 } else { 0 }),
            stdout: String::new(),
            stderr: if failed {
                "Error: security group in use".to_owned()
            } else {
                String::new()
            },
        })
    }
}

#[async_trait]
impl ProvisioningEngine for FakeEngine {
    async fn init(&self, _workspace: &Path) -> AppResult<EngineOutcome> {
        self.run(EnginePhase::Init).await
    }

    async fn apply(&self, _workspace: &Path) -> AppResult<EngineOutcome> {
        self.run(EnginePhase::Apply).await
    }

    async fn destroy(&self, _workspace: &Path) -> AppResult<EngineOutcome> {
        self.run(EnginePhase::Destroy).await
    }

    async fn read_output(&self, _workspace: &Path, _name: &str) -> AppResult<Option<SecretString>> {
        Ok(None)
    }
}

struct FakeScheduler {
    calls: CallLog,
    fail_remove_target: bool,
}

#[async_trait]
impl TeardownScheduler for FakeScheduler {
    async fn trigger_exists(&self, _name: &str) -> AppResult<bool> {
        Ok(true)
    }

    async fn create_trigger(&self, _registration: TriggerRegistration) -> AppResult<()> {
        Ok(())
    }

    async fn remove_target(&self, name: &str, target_id: &str) -> AppResult<()> {
        if self.fail_remove_target {
            return Err(AppError::Internal("scheduler unavailable".to_owned()));
        }

        self.calls.lock().await.push(Call::RemoveTarget {
            name: name.to_owned(),
            target_id: target_id.to_owned(),
        });
        Ok(())
    }

    async fn delete_trigger(&self, name: &str) -> AppResult<()> {
        self.calls
            .lock()
            .await
            .push(Call::DeleteTrigger(name.to_owned()));
        Ok(())
    }
}

fn service(failing_phase: Option<EnginePhase>, fail_remove_target: bool) -> (TeardownService, CallLog) {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let service = TeardownService::new(
        Arc::new(FakeEngine {
            calls: Arc::clone(&calls),
            failing_phase,
        }),
        Arc::new(FakeWorkspaceFactory {
            calls: Arc::clone(&calls),
        }),
        Arc::new(FakeScheduler {
            calls: Arc::clone(&calls),
            fail_remove_target,
        }),
        "destroyer-worker",
    );

    (service, calls)
}

fn payload() -> TeardownPayload {
    let request = AccessRequest::new(
        "db1",
        15,
        Requester::new("U1", "bob"),
        "",
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
    )
    .unwrap_or_else(|_| unreachable!());
    let target =
        TargetDefinition::new("sg-1", 5432, "db.internal").unwrap_or_else(|_| unreachable!());
    let now = Utc
        .timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_default();
    let request_id = RequestId::generate("bob", now);
    let variables = VariablesDocument::build(&request_id, &request, &target, "eu-west-1");

    TeardownPayload::new(request_id, variables).unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn successful_destroy_deregisters_target_then_trigger() {
    let (service, calls) = service(None, false);
    let payload = payload();

    let report = service.destroy(&payload).await;
    assert!(report.is_ok());
    let report = report.unwrap_or_else(|_| unreachable!());
    assert_eq!(report.request_id.as_str(), "bob-1700000000");
    assert_eq!(report.state, GrantState::Destroyed);

    let expected_variables = payload.variables().to_json_bytes().unwrap_or_default();
    assert_eq!(
        *calls.lock().await,
        vec![
            Call::Materialize(expected_variables),
            Call::Engine(EnginePhase::Init),
            Call::Engine(EnginePhase::Destroy),
            Call::RemoveTarget {
                name: "bob-1700000000".to_owned(),
                target_id: "destroyer-worker".to_owned(),
            },
            Call::DeleteTrigger("bob-1700000000".to_owned()),
        ]
    );
}

#[tokio::test]
async fn failed_destroy_keeps_trigger_registered() {
    let (service, calls) = service(Some(EnginePhase::Destroy), false);

    let result = service.destroy(&payload()).await;

    match result {
        Err(error @ TeardownError::DestroyFailed { .. }) => {
            assert!(error.resources_remain());
            assert_eq!(error.request_id().as_str(), "bob-1700000000");
            assert!(error.to_string().contains("security group in use"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let calls = calls.lock().await;
    assert!(!calls.iter().any(|call| matches!(
        call,
        Call::RemoveTarget { .. } | Call::DeleteTrigger(_)
    )));
}

#[tokio::test]
async fn failed_init_never_runs_destroy() {
    let (service, calls) = service(Some(EnginePhase::Init), false);

    let result = service.destroy(&payload()).await;

    assert!(matches!(result, Err(TeardownError::DestroyFailed { .. })));
    assert!(
        !calls
            .lock()
            .await
            .contains(&Call::Engine(EnginePhase::Destroy))
    );
}

#[tokio::test]
async fn deregistration_failure_is_distinct_from_destroy_failure() {
    let (service, calls) = service(None, true);

    let result = service.destroy(&payload()).await;

    match result {
        Err(error @ TeardownError::DeregistrationFailed { .. }) => {
            assert!(!error.resources_remain());
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(
        calls
            .lock()
            .await
            .contains(&Call::Engine(EnginePhase::Destroy))
    );
}
