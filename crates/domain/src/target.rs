use ephemera_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Protected network target that access can be requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDefinition {
    #[serde(rename = "target_sg_id")]
    security_group_id: String,
    #[serde(rename = "target_port")]
    port: u16,
    #[serde(rename = "target_host")]
    host: String,
}

impl TargetDefinition {
    /// Creates a validated target definition.
    pub fn new(
        security_group_id: impl Into<String>,
        port: u16,
        host: impl Into<String>,
    ) -> AppResult<Self> {
        let target = Self {
            security_group_id: security_group_id.into(),
            port,
            host: host.into(),
        };
        target.validate()?;
        Ok(target)
    }

    /// Checks invariants that deserialization cannot express.
    pub fn validate(&self) -> AppResult<()> {
        if self.security_group_id.trim().is_empty() {
            return Err(AppError::Validation(
                "target_sg_id must not be empty".to_owned(),
            ));
        }

        if self.port == 0 {
            return Err(AppError::Validation(
                "target_port must be greater than zero".to_owned(),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(AppError::Validation(
                "target_host must not be empty".to_owned(),
            ));
        }

        Ok(())
    }

    /// Returns the security group that fronts the target.
    #[must_use]
    pub fn security_group_id(&self) -> &str {
        self.security_group_id.as_str()
    }

    /// Returns the port forwarded to the target.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the target host reachable from the bastion.
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::TargetDefinition;

    #[test]
    fn target_rejects_zero_port() {
        assert!(TargetDefinition::new("sg-1", 0, "db.internal").is_err());
    }

    #[test]
    fn target_rejects_blank_host() {
        assert!(TargetDefinition::new("sg-1", 5432, " ").is_err());
    }

    #[test]
    fn target_deserializes_from_config_field_names() {
        let target = serde_json::from_value::<TargetDefinition>(serde_json::json!({
            "target_sg_id": "sg-1",
            "target_port": 5432,
            "target_host": "db.internal"
        }));
        assert!(target.is_ok());
        let target = target.unwrap_or_else(|_| unreachable!());
        assert!(target.validate().is_ok());
        assert_eq!(target.security_group_id(), "sg-1");
        assert_eq!(target.port(), 5432);
        assert_eq!(target.host(), "db.internal");
    }
}
