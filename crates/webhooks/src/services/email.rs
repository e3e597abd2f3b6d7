//! Order confirmation email.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.

use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::instrument;

use crate::config::EmailConfig;
use crate::pipeline::{BoxError, EmailSender, OrderConfirmation};

/// HTML template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    order_number: Option<&'a str>,
    order_date: &'a str,
    total: &'a str,
    currency: &'a str,
}

/// Plain text template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    order_number: Option<&'a str>,
    order_date: &'a str,
    total: &'a str,
    currency: &'a str,
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
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    timeout: Duration,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("from", &self.from.to_string())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be configured or the sender address
    /// is invalid.
    pub fn new(config: &EmailConfig, timeout: Duration) -> Result<Self, EmailError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(timeout))
            .build();

        let address = config
            .from_address
            .parse()
            .map_err(|_| EmailError::InvalidAddress(config.from_address.clone()))?;

        Ok(Self {
            mailer,
            from: Mailbox::new(config.from_name.clone(), address),
            timeout,
        })
    }

    /// Send the order confirmation to the customer.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[instrument(skip_all, fields(order_number = message.order_number.as_deref()))]
    pub async fn send_confirmation(
        &self,
        message: &OrderConfirmation,
    ) -> Result<(), EmailError> {
        let (subject, text, html) = render_order_confirmation(message)?;

        let to = message
            .to
            .as_str()
            .parse()
            .map(|address| Mailbox::new(Some(message.display_name.clone()), address))
            .map_err(|_| EmailError::InvalidAddress(message.to.to_string()))?;

        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: Mailbox,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let recipient = to.email.to_string();
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %recipient, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Render subject, text body and HTML body.
fn render_order_confirmation(
    message: &OrderConfirmation,
) -> Result<(String, String, String), EmailError> {
    let html = OrderConfirmationHtml {
        name: &message.display_name,
        order_number: message.order_number.as_deref(),
        order_date: &message.order_date,
        total: &message.total,
        currency: &message.currency,
    }
    .render()?;
    let text = OrderConfirmationText {
        name: &message.display_name,
        order_number: message.order_number.as_deref(),
        order_date: &message.order_date,
        total: &message.total,
        currency: &message.currency,
    }
    .render()?;
    let subject = match &message.order_number {
        Some(number) => format!("Order confirmed: {number}"),
        None => "Order confirmed".to_string(),
    };

    Ok((subject, text, html))
}

#[async_trait]
impl EmailSender for EmailService {
    async fn send_order_confirmation(&self, message: &OrderConfirmation) -> Result<(), BoxError> {
        Ok(self.send_confirmation(message).await?)
    }
}
