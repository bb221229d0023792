//! Email service for merchant notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.
//! Messages are sent from the job queue, never inline in a request.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EmailConfig;

/// HTML template for the post-install welcome email.
#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmailHtml<'a> {
    shop_name: &'a str,
    admin_url: &'a str,
}

/// Plain text template for the post-install welcome email.
#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeEmailText<'a> {
    shop_name: &'a str,
    admin_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/report_ready.html")]
struct ReportReadyEmailHtml<'a> {
    shop_name: &'a str,
    period_label: &'a str,
    admin_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/report_ready.txt")]
struct ReportReadyEmailText<'a> {
    shop_name: &'a str,
    period_label: &'a str,
    admin_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/usage_alert.html")]
struct UsageAlertEmailHtml<'a> {
    shop_name: &'a str,
    percent_used: u8,
    used: &'a str,
    cap: &'a str,
    admin_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/usage_alert.txt")]
struct UsageAlertEmailText<'a> {
    shop_name: &'a str,
    percent_used: u8,
    used: &'a str,
    cap: &'a str,
    admin_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// SMTP settings are missing.
    #[error("Email delivery is not configured")]
    NotConfigured,
}

/// A notification the app can send, as stored in email job payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum EmailMessage {
    Welcome {
        shop_name: String,
        admin_url: String,
    },
    ReportReady {
        shop_name: String,
        period_label: String,
        admin_url: String,
    },
    UsageAlert {
        shop_name: String,
        percent_used: u8,
        used: String,
        cap: String,
        admin_url: String,
    },
}

/// A file attached to an outgoing email.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Subject, text and HTML of a rendered message.
#[derive(Debug)]
struct RenderedEmail {
    subject: String,
    text: String,
    html: String,
}

impl EmailMessage {
    fn render(&self) -> Result<RenderedEmail, EmailError> {
        Ok(match self {
            Self::Welcome {
                shop_name,
                admin_url,
            } => RenderedEmail {
                subject: "Welcome to Storekeep".to_string(),
                text: WelcomeEmailText {
                    shop_name,
                    admin_url,
                }
                .render()?,
                html: WelcomeEmailHtml {
                    shop_name,
                    admin_url,
                }
                .render()?,
            },
            Self::ReportReady {
                shop_name,
                period_label,
                admin_url,
            } => RenderedEmail {
                subject: format!("Your billing report for {period_label}"),
                text: ReportReadyEmailText {
                    shop_name,
                    period_label,
                    admin_url,
                }
                .render()?,
                html: ReportReadyEmailHtml {
                    shop_name,
                    period_label,
                    admin_url,
                }
                .render()?,
            },
            Self::UsageAlert {
                shop_name,
                percent_used,
                used,
                cap,
                admin_url,
            } => RenderedEmail {
                subject: format!("You've used {percent_used}% of your usage allowance"),
                text: UsageAlertEmailText {
                    shop_name,
                    percent_used: *percent_used,
                    used,
                    cap,
                    admin_url,
                }
                .render()?,
                html: UsageAlertEmailHtml {
                    shop_name,
                    percent_used: *percent_used,
                    used,
                    cap,
                    admin_url,
                }
                .render()?,
            },
        })
    }
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Render and send `message` to `to`.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render, an address is invalid
    /// or SMTP delivery fails.
    pub async fn send(
        &self,
        to: &str,
        message: &EmailMessage,
        attachment: Option<EmailAttachment>,
    ) -> Result<(), EmailError> {
        let rendered = message.render()?;
        let email = build_message(&self.from_address, to, &rendered, attachment)?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %rendered.subject, "Email sent successfully");
        Ok(())
    }
}

/// Build a multipart email with plain text and HTML versions, plus an
/// optional attachment.
fn build_message(
    from: &str,
    to: &str,
    rendered: &RenderedEmail,
    attachment: Option<EmailAttachment>,
) -> Result<Message, EmailError> {
    let alternative = MultiPart::alternative()
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(rendered.text.clone()),
        )
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(rendered.html.clone()),
        );

    let body = match attachment {
        Some(file) => {
            let content_type = ContentType::parse(&file.content_type)
                .unwrap_or(ContentType::TEXT_PLAIN);
            MultiPart::mixed()
                .multipart(alternative)
                .singlepart(Attachment::new(file.filename).body(file.body, content_type))
        }
        None => alternative,
    };

    Ok(Message::builder()
        .from(
            from.parse()
                .map_err(|_| EmailError::InvalidAddress(from.to_string()))?,
        )
        .to(to
            .parse()
            .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
        .subject(&rendered.subject)
        .multipart(body)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn report() -> EmailMessage {
        EmailMessage::ReportReady {
            shop_name: "Cool Shop".to_string(),
            period_label: "September 2026".to_string(),
            admin_url: "https://admin.shopify.com/store/cool-shop/apps/key".to_string(),
        }
    }

    #[test]
    fn test_message_payload_is_tagged() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["template"], "report_ready");
        let back: EmailMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, report());
    }

    #[test]
    fn test_render_report_subject() {
        let rendered = report().render().unwrap();
        assert_eq!(rendered.subject, "Your billing report for September 2026");
        assert!(rendered.text.contains("Cool Shop"));
        assert!(rendered.html.contains("September 2026"));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let rendered = report().render().unwrap();
        let message = build_message(
            "Storekeep <billing@storekeep.dev>",
            "owner@cool-shop.com",
            &rendered,
            Some(EmailAttachment {
                filename: "billing-2026-09.csv".to_string(),
                content_type: "text/csv".to_string(),
                body: b"date,description,amount\n".to_vec(),
            }),
        )
        .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("billing-2026-09.csv"));
    }

    #[test]
    fn test_invalid_recipient() {
        let rendered = report().render().unwrap();
        let err = build_message("billing@storekeep.dev", "not an address", &rendered, None)
            .unwrap_err();
        assert!(matches!(err, EmailError::InvalidAddress(_)));
    }
}
