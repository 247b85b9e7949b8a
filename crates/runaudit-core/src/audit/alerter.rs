//! Threshold decision and alert message construction

use std::time::Duration;

use tracing::info;

use crate::email::EmailDispatcher;
use crate::error::Result;
use crate::models::{AlertMessage, AuditResult, EmailAck};

/// Sends an alert email when the failure ratio exceeds a threshold
#[derive(Debug, Clone)]
pub struct ThresholdAlerter {
    threshold: f64,
    recipient: String,
    subject: String,
    lookback: Duration,
}

impl ThresholdAlerter {
    /// Create an alerter for a single recipient
    pub fn new(
        threshold: f64,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        lookback: Duration,
    ) -> Self {
        Self {
            threshold,
            recipient: recipient.into(),
            subject: subject.into(),
            lookback,
        }
    }

    /// Strictly greater than the threshold
    pub fn is_breached(&self, result: &AuditResult) -> bool {
        result.ratio > self.threshold
    }

    /// Alert to send for `result`, if any
    pub fn message(&self, result: &AuditResult) -> Option<AlertMessage> {
        if !self.is_breached(result) {
            return None;
        }

        let window = describe_window(self.lookback);
        let threshold = trim_percent(self.threshold * 100.0);
        let body = format!(
            "Total calls past {window} failed percentage is greater than {threshold}%. \
             We are seeing a rate of {:.1}% of calls failing to find a load id.",
            result.percentage()
        );

        Some(AlertMessage {
            recipients: vec![self.recipient.clone()],
            subject: self.subject.clone(),
            body,
        })
    }

    /// Dispatch the alert for `result` if the threshold is breached.
    ///
    /// Returns the acknowledgment when an email went out, `None` when the
    /// ratio was at or below the threshold.
    pub async fn alert(
        &self,
        result: &AuditResult,
        dispatcher: &EmailDispatcher,
    ) -> Result<Option<EmailAck>> {
        let Some(message) = self.message(result) else {
            info!(
                ratio = result.ratio,
                threshold = self.threshold,
                "Failure ratio within threshold"
            );
            return Ok(None);
        };

        info!(
            ratio = result.ratio,
            threshold = self.threshold,
            recipients = ?message.recipients,
            "Failure ratio above threshold, sending alert"
        );

        let ack = dispatcher
            .send_email(&message.recipients, &message.subject, &message.body)
            .await?;

        Ok(Some(ack))
    }
}

fn describe_window(lookback: Duration) -> String {
    let secs = lookback.as_secs();
    if secs == 3600 {
        "1 hour".to_string()
    } else if secs > 0 && secs % 3600 == 0 {
        format!("{} hours", secs / 3600)
    } else {
        humantime::format_duration(lookback).to_string()
    }
}

fn trim_percent(value: f64) -> String {
    let formatted = format!("{value:.1}");
    match formatted.strip_suffix(".0") {
        Some(whole) => whole.to_string(),
        None => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn alerter() -> ThresholdAlerter {
        ThresholdAlerter::new(
            0.25,
            "ops@example.com",
            "Payment Status Audit Happy Robot",
            Duration::from_secs(12 * 3600),
        )
    }

    fn result(total: usize, failed: usize) -> AuditResult {
        AuditResult {
            total,
            failed,
            ratio: failed as f64 / total as f64,
        }
    }

    #[rstest]
    #[case(100, 0, false)]
    #[case(100, 24, false)]
    #[case(100, 25, false)]
    #[case(4, 1, false)]
    #[case(100, 26, true)]
    #[case(100, 30, true)]
    #[case(3, 3, true)]
    fn test_threshold_is_strict(#[case] total: usize, #[case] failed: usize, #[case] fires: bool) {
        assert_eq!(alerter().is_breached(&result(total, failed)), fires);
        assert_eq!(alerter().message(&result(total, failed)).is_some(), fires);
    }

    #[test]
    fn test_message_embeds_percentage() {
        let message = alerter().message(&result(100, 30)).unwrap();

        assert_eq!(message.recipients, vec!["ops@example.com".to_string()]);
        assert_eq!(message.subject, "Payment Status Audit Happy Robot");
        assert_eq!(
            message.body,
            "Total calls past 12 hours failed percentage is greater than 25%. \
             We are seeing a rate of 30.0% of calls failing to find a load id."
        );
    }

    #[test]
    fn test_window_description() {
        assert_eq!(describe_window(Duration::from_secs(6 * 3600)), "6 hours");
        assert_eq!(describe_window(Duration::from_secs(3600)), "1 hour");
        assert_eq!(describe_window(Duration::from_secs(90 * 60)), "1h 30m");
        assert_eq!(trim_percent(12.5), "12.5");
        assert_eq!(trim_percent(25.0), "25");
    }
}
