use std::fmt::{Display, Formatter};
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ephemera_core::{AppError, AppResult, Requester};
use serde::{Deserialize, Serialize};

/// Access window used when a command omits `duration`.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

/// Parsed, immutable access command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    target: String,
    duration_minutes: u32,
    requester: Requester,
    response_url: String,
    source_ip: IpAddr,
}

impl AccessRequest {
    /// Creates an access request.
    pub fn new(
        target: impl Into<String>,
        duration_minutes: u32,
        requester: Requester,
        response_url: impl Into<String>,
        source_ip: IpAddr,
    ) -> AppResult<Self> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(AppError::Validation(
                "command must include 'target:<name>'".to_owned(),
            ));
        }

        if duration_minutes == 0 {
            return Err(AppError::Validation(
                "duration must be at least 1 minute".to_owned(),
            ));
        }

        Ok(Self {
            target,
            duration_minutes,
            requester,
            response_url: response_url.into(),
            source_ip,
        })
    }

    /// Returns the requested target name.
    #[must_use]
    pub fn target(&self) -> &str {
        self.target.as_str()
    }

    /// Returns the requested access window in minutes.
    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    /// Returns the requesting chat user.
    #[must_use]
    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Returns the response callback address sent with the command.
    #[must_use]
    pub fn response_url(&self) -> &str {
        self.response_url.as_str()
    }

    /// Returns the address access will be granted to.
    #[must_use]
    pub fn source_ip(&self) -> IpAddr {
        self.source_ip
    }
}

/// Identifier shared by the provisioning workspace, key pair and teardown trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Derives `{user_name}-{unix_timestamp}`.
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced with `-` because the
    /// value is reused as a key pair name and a trigger name.
    #[must_use]
    pub fn generate(user_name: &str, now: DateTime<Utc>) -> Self {
        let sanitized: String = user_name
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-') {
                    character
                } else {
                    '-'
                }
            })
            .collect();
        let prefix = if sanitized.is_empty() {
            "user"
        } else {
            sanitized.as_str()
        };

        Self(format!("{prefix}-{}", now.timestamp()))
    }

    /// Wraps an existing request id, e.g. one read back from a trigger.
    pub fn parse(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "request id must not be empty".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for RequestId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use chrono::{TimeZone, Utc};
    use ephemera_core::Requester;
    use proptest::prelude::*;

    use super::{AccessRequest, RequestId};

    #[test]
    fn request_id_joins_user_name_and_timestamp() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).single();
        assert!(now.is_some());
        let request_id = RequestId::generate("bob", now.unwrap_or_default());
        assert_eq!(request_id.as_str(), "bob-1700000000");
    }

    #[test]
    fn request_id_replaces_unsafe_characters() {
        let request_id = RequestId::generate("jane doe/ops", Utc::now());
        assert!(request_id.as_str().starts_with("jane-doe-ops-"));
    }

    #[test]
    fn request_id_falls_back_for_empty_user_name() {
        let request_id = RequestId::generate("", Utc::now());
        assert!(request_id.as_str().starts_with("user-"));
    }

    #[test]
    fn access_request_rejects_zero_duration() {
        let request = AccessRequest::new(
            "db1",
            0,
            Requester::new("U1", "bob"),
            "",
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        );
        assert!(request.is_err());
    }

    #[test]
    fn access_request_rejects_missing_target() {
        let request = AccessRequest::new(
            " ",
            30,
            Requester::new("U1", "bob"),
            "",
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        );
        assert!(request.is_err());
    }

    proptest! {
        #[test]
        fn generated_request_ids_only_contain_safe_characters(name in ".{0,40}", seconds in 0_i64..4_000_000_000) {
            let now = Utc.timestamp_opt(seconds, 0).single().unwrap_or_default();
            let request_id = RequestId::generate(name.as_str(), now);
            let all_safe = request_id
                .as_str()
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-'));
            prop_assert!(all_safe);
            let expected_suffix = format!("-{seconds}");
            prop_assert!(request_id.as_str().ends_with(expected_suffix.as_str()));
        }
    }
}
