//! AWS STS role assumption.

use async_trait::async_trait;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_sts::Client;
use chrono::{DateTime, Utc};

use super::AssumedCredentials;
use crate::interfaces::{AssumeRoleFailure, AssumeRoleRequest, RoleAssumer};

/// Error code STS returns when the caller is not allowed to assume.
const ACCESS_DENIED: &str = "AccessDenied";
/// Message fragment STS uses when a root identity tries to assume a role.
const ROOT_CANNOT_ASSUME: &str = "may not be assumed by root accounts";

/// Role assumer backed by AWS STS `AssumeRole`.
#[derive(Clone, Debug)]
pub struct StsRoleAssumer {
    client: Client,
}

impl StsRoleAssumer {
    /// Create an assumer using the base identity from the SDK config.
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    /// Create from a pre-built client (for testing)
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(
        &self,
        request: AssumeRoleRequest,
    ) -> std::result::Result<AssumedCredentials, AssumeRoleFailure> {
        let output = self
            .client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                match classify_assume_failure(e.code(), e.message()) {
                    AssumeRoleFailure::Incapable(_) => AssumeRoleFailure::Incapable(detail),
                    AssumeRoleFailure::Transient(_) => AssumeRoleFailure::Transient(detail),
                }
            })?;

        let credentials = output.credentials().ok_or_else(|| {
            AssumeRoleFailure::Transient("AssumeRole response carried no credentials".to_string())
        })?;

        let expiration = credentials.expiration();
        let expiration: DateTime<Utc> =
            DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos()).ok_or_else(
                || AssumeRoleFailure::Transient(format!("Invalid expiration: {:?}", expiration)),
            )?;

        Ok(AssumedCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }
}

/// Classify an STS error by code and message.
///
/// Only an identity that can never assume any role is `Incapable`; every
/// other failure is `Transient`.
pub fn classify_assume_failure(code: Option<&str>, message: Option<&str>) -> AssumeRoleFailure {
    let message = message.unwrap_or_default();
    if code == Some(ACCESS_DENIED) && message.contains(ROOT_CANNOT_ASSUME) {
        AssumeRoleFailure::Incapable(message.to_string())
    } else {
        AssumeRoleFailure::Transient(format!(
            "{}: {}",
            code.unwrap_or("Unknown"),
            message
        ))
    }
}
