//! Email delivery for reports and payment-failure notices.

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::Path;

use crate::config::{EmailConfig, EmailTransportConfig};
use crate::fulfillment::FulfillmentError;
use crate::report::ReportArtifact;

/// Terminal record of a delivery attempt. Not persisted beyond logging.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub accepted: bool,
    pub message_id: Option<String>,
}

/// Seam for the message-transport collaborator, mockable in tests.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the rendered report as a PDF attachment.
    async fn send_report(
        &self,
        email: &str,
        artifact: &ReportArtifact,
        payment_id: &str,
    ) -> Result<DeliveryReceipt, FulfillmentError>;

    /// Deliver a payment-failure notice (no attachment).
    async fn send_failure_notice(&self, email: &str, reason: Option<&str>) -> Result<DeliveryReceipt, FulfillmentError>;
}

pub struct EmailNotifier {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                }
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                // File transport for development and testing
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir)?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    fn mailboxes(&self, to_email: &str) -> Result<(Mailbox, Mailbox), FulfillmentError> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| FulfillmentError::TransportRejected(format!("invalid from address: {e}")))?;
        let to = to_email
            .parse::<Mailbox>()
            .map_err(|e| FulfillmentError::TransportRejected(format!("invalid recipient address: {e}")))?;
        Ok((from, to))
    }

    async fn deliver(&self, message: Message) -> Result<DeliveryReceipt, FulfillmentError> {
        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                let response = smtp.send(message).await.map_err(|e| {
                    if e.is_permanent() {
                        FulfillmentError::TransportRejected(e.to_string())
                    } else {
                        FulfillmentError::TransportUnavailable(e.to_string())
                    }
                })?;
                Ok(DeliveryReceipt {
                    accepted: response.is_positive(),
                    message_id: response.first_line().map(str::to_string),
                })
            }
            EmailTransport::File(file) => {
                let id = file
                    .send(message)
                    .await
                    .map_err(|e| FulfillmentError::TransportUnavailable(e.to_string()))?;
                Ok(DeliveryReceipt {
                    accepted: true,
                    message_id: Some(id.to_string()),
                })
            }
        }
    }

    fn report_subject(breach_count: u32) -> String {
        if breach_count > 0 {
            let plural = if breach_count > 1 { "es" } else { "" };
            format!("URGENT: Your Email Risk Analysis Report - {breach_count} Breach{plural} Found")
        } else {
            "Your Email Risk Analysis Report - No Breaches Found".to_string()
        }
    }

    fn report_body(&self, breach_count: u32, payment_id: &str) -> String {
        let (headline, summary) = if breach_count > 0 {
            let plural = if breach_count > 1 { "es" } else { "" };
            (
                "Breaches Detected".to_string(),
                format!(
                    "Your email was found in <strong>{breach_count} data breach{plural}</strong>. \
                     Please review the attached report and take the recommended security actions."
                ),
            )
        } else {
            (
                "No Breaches Found".to_string(),
                "Good news! Your email was not found in any known data breach. \
                 We still recommend following security best practices."
                    .to_string(),
            )
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; }}
        .alert-box {{ border-left: 4px solid #888; padding: 15px; margin: 20px 0; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <h2>Your Email Risk Analysis Report is Ready</h2>

    <p>Dear Customer,</p>

    <p>Thank you for using our Email Risk Analysis service. We've completed a scan of your
    email address against our database of known data breaches.</p>

    <div class="alert-box">
        <h2>{headline}</h2>
        <p>{summary}</p>
    </div>

    <p><strong>Your detailed report is attached to this email as a PDF.</strong></p>

    <p><strong>Payment confirmation:</strong><br>
    Payment ID: {payment_id}</p>

    <p>If you have any questions, please don't hesitate to contact us.</p>

    <div class="footer">
        <p>This report is confidential and intended solely for the recipient.</p>
    </div>
</body>
</html>"#
        )
    }

    fn failure_body(&self, reason: Option<&str>) -> String {
        let reason = reason.unwrap_or("Payment processing failed");

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; }}
    </style>
</head>
<body>
    <h2>Payment Failed</h2>

    <p>Dear Customer,</p>

    <p>We're sorry, but your payment for the Email Risk Analysis service could not be processed.</p>

    <p><strong>Error:</strong> {reason}</p>

    <p>Please try again or contact your bank if the issue persists.</p>

    <p>If you need assistance, please contact us at {from_email}.</p>
</body>
</html>"#,
            from_email = self.from_email
        )
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_report(
        &self,
        email: &str,
        artifact: &ReportArtifact,
        payment_id: &str,
    ) -> Result<DeliveryReceipt, FulfillmentError> {
        let (from, to) = self.mailboxes(email)?;

        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| FulfillmentError::TransportRejected(format!("invalid attachment content type: {e}")))?;
        let attachment = Attachment::new(format!("email-risk-report-{}.pdf", Utc::now().timestamp()))
            .body(artifact.content.clone(), pdf_type);
        let html = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(self.report_body(artifact.breach_count, payment_id));

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(Self::report_subject(artifact.breach_count))
            .multipart(MultiPart::mixed().singlepart(html).singlepart(attachment))
            .map_err(|e| FulfillmentError::TransportRejected(format!("failed to build report email: {e}")))?;

        self.deliver(message).await
    }

    async fn send_failure_notice(&self, email: &str, reason: Option<&str>) -> Result<DeliveryReceipt, FulfillmentError> {
        let (from, to) = self.mailboxes(email)?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject("Payment Failed - Email Risk Analysis")
            .header(ContentType::TEXT_HTML)
            .body(self.failure_body(reason))
            .map_err(|e| FulfillmentError::TransportRejected(format!("failed to build failure notice: {e}")))?;

        self.deliver(message).await
    }
}
