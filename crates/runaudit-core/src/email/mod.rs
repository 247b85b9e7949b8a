//! Email delivery through a remote send-email function
//!
//! The function runs out of process (an AWS Lambda in production) and is
//! invoked synchronously with a JSON payload.

mod dispatcher;
mod lambda;

pub use dispatcher::{EmailDispatcher, EmailPayload};
pub use lambda::LambdaInvoker;

#[cfg(test)]
pub(crate) use dispatcher::tests;

use serde_json::Value;

use crate::error::Result;

/// Synchronous remote function invocation
#[async_trait::async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Invoke `function` with `payload`; returns the decoded response payload, if any
    async fn invoke(&self, function: &str, payload: &Value) -> Result<Option<Value>>;
}
