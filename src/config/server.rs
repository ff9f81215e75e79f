use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// HTTP listener for the metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the `/metrics` and `/ready` endpoints listen on.
    #[validate(custom(function = "validate_listen_address"))]
    pub listen_address: String,
}

fn validate_listen_address(address: &str) -> Result<(), ValidationError> {
    address.parse::<SocketAddr>().map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("invalid_listen_address");
        err.message = Some(format!("Invalid listen address: {}", address).into());
        err
    })
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_address: "0.0.0.0:9348".to_string(),
        }
    }
}
