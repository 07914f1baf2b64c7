//! Transactional email: rendering and delivery.
//!
//! Emails are rendered with Askama templates when the business change
//! happens and stored in the outbox; [`EmailService::deliver`] is called later
//! by the outbox worker. Delivery goes through one of three transports:
//!
//! - `smtp` - lettre over a STARTTLS relay
//! - `brevo` - Brevo transactional email HTTP API
//! - `log` - development only, logs the message and succeeds

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;

use simonia_core::{Email, EmailKind, Money};

use crate::config::{EmailConfig, EmailTransport};
use crate::db::outbox::{NewEmail, OutboxMessage};
use crate::models::Order;

/// Brevo transactional email endpoint.
const BREVO_URL: &str = "https://api.brevo.com/v3/smtp/email";

/// Hours a verification link stays valid.
pub const VERIFICATION_TTL_HOURS: i64 = 24;

/// One rendered order line.
struct OrderLine<'a> {
    name: &'a str,
    quantity: i32,
    total: Money,
}

/// HTML template for the shop's new-order notification.
#[derive(Template)]
#[template(path = "email/order_notification.html")]
struct OrderNotificationHtml<'a> {
    order_id: i32,
    name: &'a str,
    phone: &'a str,
    email: &'a str,
    address: &'a str,
    city: &'a str,
    notes: &'a str,
    lines: &'a [OrderLine<'a>],
    total: Money,
}

/// Plain text template for the shop's new-order notification.
#[derive(Template)]
#[template(path = "email/order_notification.txt")]
struct OrderNotificationText<'a> {
    order_id: i32,
    name: &'a str,
    phone: &'a str,
    email: &'a str,
    address: &'a str,
    city: &'a str,
    notes: &'a str,
    lines: &'a [OrderLine<'a>],
    total: Money,
}

/// HTML template for the account verification email.
#[derive(Template)]
#[template(path = "email/verify_email.html")]
struct VerifyEmailHtml<'a> {
    name: &'a str,
    link: &'a str,
    expires_hours: i64,
}

/// Plain text template for the account verification email.
#[derive(Template)]
#[template(path = "email/verify_email.txt")]
struct VerifyEmailText<'a> {
    name: &'a str,
    link: &'a str,
    expires_hours: i64,
}

/// Errors that can occur when rendering or sending email.
#[derive(Debug, Error)]
pub enum MailError {
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

    /// HTTP request to the email API failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Email API rejected the message.
    #[error("Brevo API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Transport misconfigured.
    #[error("Email configuration error: {0}")]
    Config(String),
}

/// How messages leave the process.
#[derive(Clone)]
enum Mailer {
    Log,
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Brevo(reqwest::Client),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoRequest<'a> {
    sender: BrevoContact<'a>,
    to: [BrevoContact<'a>; 1],
    subject: &'a str,
    html_content: &'a str,
    text_content: &'a str,
}

#[derive(Serialize)]
struct BrevoContact<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

/// Email service for rendering and sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: Mailer,
    from_address: String,
    from_name: String,
    notify_address: String,
    base_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// `base_url` is the public URL of this API, used in verification links.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay or HTTP client cannot be built.
    pub fn new(config: &EmailConfig, base_url: &str) -> Result<Self, MailError> {
        let mailer = match &config.transport {
            EmailTransport::Log => Mailer::Log,
            EmailTransport::Smtp(smtp) => {
                let credentials = Credentials::new(
                    smtp.username.clone(),
                    smtp.password.expose_secret().to_string(),
                );
                let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
                    .port(smtp.port)
                    .credentials(credentials)
                    .build();
                Mailer::Smtp(transport)
            }
            EmailTransport::Brevo(brevo) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(brevo.api_key.expose_secret())
                        .map_err(|e| MailError::Config(format!("Invalid API key format: {e}")))?,
                );
                headers.insert("accept", HeaderValue::from_static("application/json"));
                let client = reqwest::Client::builder()
                    .default_headers(headers)
                    .timeout(std::time::Duration::from_secs(10))
                    .build()?;
                Mailer::Brevo(client)
            }
        };

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
            notify_address: config.notify_address.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Render the new-order notification sent to the shop.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    pub fn order_notification(&self, order: &Order) -> Result<NewEmail, MailError> {
        let lines: Vec<OrderLine<'_>> = order
            .items
            .iter()
            .map(|item| OrderLine {
                name: &item.product_name,
                quantity: item.quantity,
                total: item.line_total(),
            })
            .collect();

        let order_id = order.id.get();
        let html = OrderNotificationHtml {
            order_id,
            name: &order.name,
            phone: &order.phone,
            email: &order.email,
            address: &order.address,
            city: &order.city,
            notes: &order.notes,
            lines: &lines,
            total: order.total_cents,
        }
        .render()?;
        let text = OrderNotificationText {
            order_id,
            name: &order.name,
            phone: &order.phone,
            email: &order.email,
            address: &order.address,
            city: &order.city,
            notes: &order.notes,
            lines: &lines,
            total: order.total_cents,
        }
        .render()?;

        Ok(NewEmail {
            kind: EmailKind::OrderNotification,
            recipient: self.notify_address.clone(),
            subject: format!("Comandă Nouă #{order_id} de la {}", order.name),
            html_body: html,
            text_body: text,
            order_id: Some(order.id),
        })
    }

    /// Render the account verification email.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    pub fn verification_email(
        &self,
        to: &Email,
        name: &str,
        token: &str,
    ) -> Result<NewEmail, MailError> {
        let link = self.verification_link(token);
        let html = VerifyEmailHtml {
            name,
            link: &link,
            expires_hours: VERIFICATION_TTL_HOURS,
        }
        .render()?;
        let text = VerifyEmailText {
            name,
            link: &link,
            expires_hours: VERIFICATION_TTL_HOURS,
        }
        .render()?;

        Ok(NewEmail {
            kind: EmailKind::VerifyEmail,
            recipient: to.to_string(),
            subject: "Confirmă-ți adresa de email".to_string(),
            html_body: html,
            text_body: text,
            order_id: None,
        })
    }

    fn verification_link(&self, token: &str) -> String {
        format!(
            "{}/api/verify?token={}&redirect=1",
            self.base_url,
            urlencoding::encode(token)
        )
    }

    /// Deliver one outbox message through the configured transport.
    ///
    /// # Errors
    ///
    /// Returns error if the transport rejects or fails to send the message.
    pub async fn deliver(&self, message: &OutboxMessage) -> Result<(), MailError> {
        match &self.mailer {
            Mailer::Log => {
                tracing::info!(
                    to = %message.recipient,
                    subject = %message.subject,
                    kind = %message.kind,
                    body = %message.text_body,
                    "Email transport is 'log', not sending"
                );
                Ok(())
            }
            Mailer::Smtp(transport) => self.send_smtp(transport, message).await,
            Mailer::Brevo(client) => self.send_brevo(client, message).await,
        }
    }

    async fn send_smtp(
        &self,
        transport: &AsyncSmtpTransport<Tokio1Executor>,
        message: &OutboxMessage,
    ) -> Result<(), MailError> {
        let from = Mailbox::new(
            Some(self.from_name.clone()),
            self.from_address
                .parse()
                .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
        );
        let to: Mailbox = message
            .recipient
            .parse()
            .map_err(|_| MailError::InvalidAddress(message.recipient.clone()))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html_body.clone()),
                    ),
            )?;

        transport.send(email).await?;

        tracing::info!(to = %message.recipient, subject = %message.subject, "Email sent via SMTP");
        Ok(())
    }

    async fn send_brevo(
        &self,
        client: &reqwest::Client,
        message: &OutboxMessage,
    ) -> Result<(), MailError> {
        let body = BrevoRequest {
            sender: BrevoContact {
                email: &self.from_address,
                name: Some(&self.from_name),
            },
            to: [BrevoContact {
                email: &message.recipient,
                name: None,
            }],
            subject: &message.subject,
            html_content: &message.html_body,
            text_content: &message.text_body,
        };

        let response = client.post(BREVO_URL).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!(to = %message.recipient, subject = %message.subject, "Email sent via Brevo");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::time::Duration;

    use simonia_core::{OrderId, OrderItemId, OrderStatus, OutboxId, ProductId};

    use super::*;
    use crate::models::OrderItem;

    fn service() -> EmailService {
        let config = EmailConfig {
            transport: EmailTransport::Log,
            from_address: "noreply@simonia.md".to_string(),
            from_name: "Simonia Luxury".to_string(),
            notify_address: "orders@simonia.md".to_string(),
            outbox_poll_interval: Duration::from_secs(5),
        };
        EmailService::new(&config, "https://api.simonia.md/").unwrap()
    }

    fn order() -> Order {
        let now = Utc::now();
        let item = |id: i32, name: &str, quantity: i32, cents: i64| OrderItem {
            id: OrderItemId::new(id),
            product_id: Some(ProductId::new(id)),
            product_name: name.to_string(),
            quantity,
            price_cents: Money::from_cents(cents),
            price: Decimal::new(cents, 2),
            product: None,
        };
        Order {
            id: OrderId::new(42),
            user_id: None,
            name: "Ion Popescu".to_string(),
            phone: "+37369123456".to_string(),
            email: "ion@mail.md".to_string(),
            address: "Str. Independentei 5".to_string(),
            city: "Chisinau".to_string(),
            notes: "<b>suna inainte</b>".to_string(),
            status: OrderStatus::Pending,
            total_cents: Money::from_cents(230_000),
            total: Decimal::new(230_000, 2),
            email_sent: false,
            email_error: None,
            created_at: now,
            updated_at: now,
            items: vec![
                item(1, "Canapea Roma", 2, 35_000),
                item(2, "Pat Verona", 1, 160_000),
            ],
        }
    }

    #[test]
    fn test_order_notification_subject_and_recipient() {
        let email = service().order_notification(&order()).unwrap();
        assert_eq!(email.subject, "Comandă Nouă #42 de la Ion Popescu");
        assert_eq!(email.recipient, "orders@simonia.md");
        assert_eq!(email.kind, EmailKind::OrderNotification);
        assert_eq!(email.order_id, Some(OrderId::new(42)));
    }

    #[test]
    fn test_order_notification_lists_lines() {
        let email = service().order_notification(&order()).unwrap();
        assert!(email.html_body.contains("Canapea Roma × 2 — 700.00 MDL"));
        assert!(email.html_body.contains("Pat Verona × 1 — 1600.00 MDL"));
        assert!(email.html_body.contains("Total: 2300.00 MDL"));
        assert!(email.text_body.contains("- Canapea Roma × 2 — 700.00 MDL"));
        assert!(email.text_body.contains("Total: 2300.00 MDL"));
    }

    #[test]
    fn test_order_notification_escapes_html() {
        let email = service().order_notification(&order()).unwrap();
        assert!(!email.html_body.contains("<b>suna inainte</b>"));
        assert!(email.text_body.contains("<b>suna inainte</b>"));
    }

    #[test]
    fn test_verification_email_link() {
        let to = Email::parse("ana@mail.md").unwrap();
        let email = service().verification_email(&to, "Ana", "abc123").unwrap();
        assert_eq!(email.recipient, "ana@mail.md");
        assert_eq!(email.kind, EmailKind::VerifyEmail);
        assert!(
            email
                .text_body
                .contains("https://api.simonia.md/api/verify?token=abc123")
        );
        assert!(email.text_body.contains("Salut Ana,"));
        assert!(email.text_body.contains("24 ore"));
    }

    #[tokio::test]
    async fn test_log_transport_delivers() {
        let message = OutboxMessage {
            id: OutboxId::new(1),
            kind: EmailKind::VerifyEmail,
            recipient: "ana@mail.md".to_string(),
            subject: "Test".to_string(),
            html_body: "<p>hi</p>".to_string(),
            text_body: "hi".to_string(),
            order_id: None,
            attempts: 1,
            max_attempts: 5,
        };
        service().deliver(&message).await.unwrap();
    }
}
