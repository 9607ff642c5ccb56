use ephemera_core::AppError;
use ephemera_domain::{AccessRequest, Credential, RequestId, TargetDefinition};
use secrecy::SecretString;

use crate::provisioning_ports::CredentialAttachment;

const MAX_FAILURE_CHARS: usize = 1500;

pub(super) fn acknowledgement_text(request: &AccessRequest) -> String {
    format!(
        "Got it, {}! Provisioning access to `{}`. This might take a minute...",
        request.requester().user_name(),
        request.target()
    )
}

pub(super) fn failure_text(error: &AppError) -> String {
    let mut detail = error.to_string();
    if detail.chars().count() > MAX_FAILURE_CHARS {
        detail = detail.chars().take(MAX_FAILURE_CHARS).collect();
        detail.push_str("...");
    }

    format!("Sorry, something went wrong while provisioning access: `{detail}`")
}

pub(super) fn ssh_command(
    request_id: &RequestId,
    target: &TargetDefinition,
    endpoint: &str,
) -> String {
    format!(
        "ssh -i {request_id}.pem -L {port}:{host}:{port} ec2-user@{endpoint}",
        port = target.port(),
        host = target.host(),
    )
}

pub(super) fn connection_instructions(
    request: &AccessRequest,
    request_id: &RequestId,
    target: &TargetDefinition,
    endpoint: &str,
) -> String {
    format!(
        "Access granted for *{duration} minutes*!\n\n\
         1. Save the attached file as `{request_id}.pem` and run `chmod 400 {request_id}.pem`.\n\
         2. Use this command to connect:\n\
         ```{command}```\n\n\
         This key is single-use and stops working when the bastion is torn down. \
         Delete it once you are done.",
        duration = request.duration_minutes(),
        command = ssh_command(request_id, target, endpoint),
    )
}

pub(super) fn credential_attachment(
    request: &AccessRequest,
    request_id: &RequestId,
    target: &TargetDefinition,
    credential: &Credential,
) -> CredentialAttachment {
    let filename = format!("{request_id}.pem");

    CredentialAttachment {
        channel: request.requester().user_id().to_owned(),
        title: filename.clone(),
        filename,
        content: SecretString::new(credential.private_key_pem().to_owned()),
        initial_comment: connection_instructions(
            request,
            request_id,
            target,
            credential.endpoint(),
        ),
    }
}
