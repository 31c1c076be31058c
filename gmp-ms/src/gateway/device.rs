//! HTTP client for the remote sensor controller

use super::{DeviceGateway, GatewayError};
use crate::models::DeviceCommand;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("gmp-ms/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct CommandBody {
    command: DeviceCommand,
    patient_id: i64,
}

/// Posts `{ command, patient_id }` to `<base_url>/device/command`
pub struct HttpDeviceGateway {
    http_client: reqwest::Client,
    command_url: String,
}

impl HttpDeviceGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            command_url: format!("{}/device/command", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl DeviceGateway for HttpDeviceGateway {
    async fn send_command(
        &self,
        command: DeviceCommand,
        patient_id: i64,
    ) -> Result<(), GatewayError> {
        debug!(%command, patient_id, url = %self.command_url, "Sending device command");

        let response = self
            .http_client
            .post(&self.command_url)
            .json(&CommandBody {
                command,
                patient_id,
            })
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
