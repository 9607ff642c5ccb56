//! Slash command parsing.

use std::collections::HashMap;
use std::net::IpAddr;

use ephemera_core::{AppError, AppResult, Requester};
use ephemera_domain::{AccessRequest, DEFAULT_DURATION_MINUTES};

/// Parses a form-encoded command body into an access request.
///
/// The `text` field holds whitespace-separated `key:value` tokens; only
/// `target` and `duration` are recognized and later tokens win. Target
/// existence is not checked here.
pub fn parse_command(raw_body: &str, source_ip: IpAddr) -> AppResult<AccessRequest> {
    let mut fields: HashMap<String, String> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw_body.as_bytes()) {
        fields
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }

    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

    let mut target = String::new();
    let mut duration = None;
    for token in field("text").split_whitespace() {
        match token.split_once(':') {
            Some(("target", value)) => target = value.to_owned(),
            Some(("duration", value)) => duration = Some(value.to_owned()),
            _ => {}
        }
    }

    let duration_minutes = match duration {
        Some(value) => value.parse::<u32>().map_err(|_| {
            AppError::Validation(format!(
                "invalid duration '{value}': expected a whole number of minutes"
            ))
        })?,
        None => DEFAULT_DURATION_MINUTES,
    };

    AccessRequest::new(
        target,
        duration_minutes,
        Requester::new(field("user_id"), field("user_name")),
        field("response_url"),
        source_ip,
    )
}
