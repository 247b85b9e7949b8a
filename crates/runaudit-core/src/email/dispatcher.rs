//! Email dispatch payload and error mapping

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::EmailConfig;
use crate::error::{Error, Result};
use crate::models::EmailAck;

use super::FunctionInvoker;

/// Body sent to the send-email function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailPayload {
    /// Tenant the email is sent for
    #[serde(rename = "orgId")]
    pub org_id: String,
    /// Sender address
    pub from: String,
    /// Recipient addresses
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// Sends emails by invoking the configured remote function
pub struct EmailDispatcher {
    invoker: Arc<dyn FunctionInvoker>,
    function_name: String,
    org_id: String,
    sender: String,
}

impl EmailDispatcher {
    /// Create a dispatcher for the configured function
    pub fn new(invoker: Arc<dyn FunctionInvoker>, config: &EmailConfig, org_id: &str) -> Self {
        Self {
            invoker,
            function_name: config.function_name.clone(),
            org_id: org_id.to_string(),
            sender: config.sender.clone(),
        }
    }

    /// Build the payload for a message
    pub fn payload(&self, to: &[String], subject: &str, body: &str) -> EmailPayload {
        EmailPayload {
            org_id: self.org_id.clone(),
            from: self.sender.clone(),
            to: to.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    /// Send an email and wait for the function to answer.
    ///
    /// Any failure is logged here and returned as [`Error::Dispatch`], which
    /// API callers receive as a 500.
    pub async fn send_email(&self, to: &[String], subject: &str, body: &str) -> Result<EmailAck> {
        let payload = self.payload(to, subject, body);

        match self.invoke(&payload).await {
            Ok(response) => {
                debug!(function = %self.function_name, response = ?response, "Send-email response");
                info!(recipients = ?to, subject, "Email sent");
                Ok(EmailAck {
                    success: true,
                    message: "Email sent successfully".to_string(),
                    email_addresses: to.to_vec(),
                })
            }
            Err(e) => {
                error!(
                    function = %self.function_name,
                    recipients = ?to,
                    subject,
                    error = %e,
                    error_debug = ?e,
                    "Error sending email"
                );
                Err(Error::Dispatch(e.to_string()))
            }
        }
    }

    async fn invoke(&self, payload: &EmailPayload) -> Result<Option<serde_json::Value>> {
        let value = serde_json::to_value(payload)?;
        self.invoker.invoke(&self.function_name, &value).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    /// Records invocations; fails every call when `fail_with` is set
    #[derive(Default)]
    pub(crate) struct RecordingInvoker {
        pub calls: Mutex<Vec<(String, Value)>>,
        pub fail_with: Option<String>,
    }

    impl RecordingInvoker {
        pub(crate) fn failing(message: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_with: Some(message.to_string()),
            }
        }
    }

    #[async_trait::async_trait]
    impl FunctionInvoker for RecordingInvoker {
        async fn invoke(&self, function: &str, payload: &Value) -> Result<Option<Value>> {
            self.calls.lock().push((function.to_string(), payload.clone()));
            match &self.fail_with {
                Some(message) => Err(Error::invoke(function, message.clone())),
                None => Ok(Some(json!({"statusCode": 200}))),
            }
        }
    }

    pub(crate) fn email_config() -> EmailConfig {
        EmailConfig {
            sender: "alerts@example.com".to_string(),
            recipient: "ops@example.com".to_string(),
            region: "us-east-2".to_string(),
            function_name: "send-email".to_string(),
            credentials: None,
        }
    }

    #[tokio::test]
    async fn test_send_email_builds_payload() {
        let invoker = Arc::new(RecordingInvoker::default());
        let dispatcher = EmailDispatcher::new(invoker.clone(), &email_config(), "org-1");
        let to = vec!["ops@example.com".to_string()];

        let ack = dispatcher.send_email(&to, "Subject", "Body").await.unwrap();

        assert_eq!(
            ack,
            EmailAck {
                success: true,
                message: "Email sent successfully".to_string(),
                email_addresses: to.clone(),
            }
        );

        let calls = invoker.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "send-email");
        assert_eq!(
            calls[0].1,
            json!({
                "orgId": "org-1",
                "from": "alerts@example.com",
                "to": ["ops@example.com"],
                "subject": "Subject",
                "body": "Body"
            })
        );
    }

    #[tokio::test]
    async fn test_invoke_failure_becomes_dispatch_error() {
        let invoker = Arc::new(RecordingInvoker::failing("AccessDenied"));
        let dispatcher = EmailDispatcher::new(invoker, &email_config(), "org-1");

        let err = dispatcher
            .send_email(&["ops@example.com".to_string()], "s", "b")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Dispatch(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Error sending email: Error invoking function send-email: AccessDenied"
        );
    }
}
