use std::sync::Arc;

use ephemera_application::{ConfigService, ProvisioningService};
use ipnet::IpNet;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config_service: ConfigService,
    pub provisioning_service: ProvisioningService,
    pub trusted_proxies: Arc<Vec<IpNet>>,
}
