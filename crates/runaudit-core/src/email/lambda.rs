//! AWS Lambda backed function invoker

use aws_config::{BehaviorVersion, Region};
use aws_sdk_lambda::config::Credentials;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::EmailConfig;
use crate::error::{Error, Result};

use super::FunctionInvoker;

/// Invokes Lambda functions with `RequestResponse` semantics
#[derive(Clone)]
pub struct LambdaInvoker {
    client: Client,
}

impl LambdaInvoker {
    /// Build a Lambda client for the configured region and credentials
    pub async fn new(config: &EmailConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let Some(creds) = &config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                None,
                None,
                "runaudit-env",
            ));
        }

        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait::async_trait]
impl FunctionInvoker for LambdaInvoker {
    async fn invoke(&self, function: &str, payload: &Value) -> Result<Option<Value>> {
        let body = serde_json::to_vec(payload)?;

        let output = self
            .client
            .invoke()
            .function_name(function)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(body))
            .send()
            .await
            .map_err(|e| Error::invoke(function, DisplayErrorContext(&e).to_string()))?;

        if let Some(kind) = output.function_error() {
            let detail = output
                .payload()
                .map(|blob| String::from_utf8_lossy(blob.as_ref()).into_owned())
                .unwrap_or_default();
            return Err(Error::invoke(function, format!("{kind}: {detail}")));
        }

        debug!(function, status = output.status_code(), "Function invoked");

        match output.payload() {
            Some(blob) if !blob.as_ref().is_empty() => {
                Ok(Some(serde_json::from_slice(blob.as_ref())?))
            }
            _ => Ok(None),
        }
    }
}
