use crate::render::{render_html, render_markdown};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use interfaces::defs::{Digest, DigestSink};
use interfaces::error::SinkError;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fmt;
use tracing::info;

pub const SMTP_USER_VAR: &str = "SMTP_USER";
pub const SMTP_PASSWORD_VAR: &str = "SMTP_PASSWORD";
pub const RECIPIENTS_VAR: &str = "EMAIL_RECIPIENTS";

#[derive(Clone)]
pub struct EmailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub recipients: Vec<String>,
    pub subject: String,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("recipients", &self.recipients.len())
            .field("subject", &self.subject)
            .finish()
    }
}

impl EmailConfig {
    /// Credentials and recipients come from the environment; host, port and
    /// subject from configuration.
    pub fn from_env(server: &str, port: u16, subject: &str) -> Result<Self> {
        let username = std::env::var(SMTP_USER_VAR).with_context(|| format!("{} is not set", SMTP_USER_VAR))?;
        let password =
            std::env::var(SMTP_PASSWORD_VAR).with_context(|| format!("{} is not set", SMTP_PASSWORD_VAR))?;
        let recipients = parse_recipients(&std::env::var(RECIPIENTS_VAR).unwrap_or_default());

        if recipients.is_empty() {
            return Err(anyhow!("{} has no recipients", RECIPIENTS_VAR));
        }

        Ok(Self {
            server: server.to_string(),
            port,
            username,
            password,
            recipients,
            subject: subject.to_string(),
        })
    }
}

/// Comma-separated list; blanks are skipped.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// One message for everyone: addressed to the sender, every reader in Bcc so
/// no recipient sees another's address.
pub fn build_message(config: &EmailConfig, digest: &Digest) -> Result<Message> {
    let sender: Mailbox = config
        .username
        .parse()
        .map_err(|e| anyhow!("Invalid sender address '{}': {}", config.username, e))?;

    let mut builder = Message::builder()
        .from(sender.clone())
        .to(sender)
        .subject(format!("{} - {}", config.subject, digest.date.format("%B %-d, %Y")));

    for recipient in &config.recipients {
        let mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| anyhow!("Invalid recipient address '{}': {}", recipient, e))?;
        builder = builder.bcc(mailbox);
    }

    let message = builder
        .multipart(MultiPart::alternative_plain_html(
            render_markdown(digest),
            render_html(digest),
        ))
        .context("Failed to build digest email")?;
    Ok(message)
}

pub struct SmtpSink {
    config: EmailConfig,
}

impl SmtpSink {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let builder = if self.config.port == 465 {
            SmtpTransport::relay(&self.config.server)
        } else {
            SmtpTransport::starttls_relay(&self.config.server)
        }
        .with_context(|| format!("Failed to configure SMTP relay {}", self.config.server))?;

        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build())
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        let message = build_message(&self.config, digest)?;
        let mailer = self.transport()?;

        // lettre's SmtpTransport blocks
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .context("Email task panicked")?
            .map_err(|e| anyhow!("Failed to send email via SMTP: {}", e))?;

        info!("Sent digest to {} recipients", self.config.recipients.len());
        Ok(())
    }
}

#[async_trait]
impl DigestSink for SmtpSink {
    fn sink_name(&self) -> String {
        format!("email ({}:{})", self.config.server, self.config.port)
    }

    async fn deliver(&self, digest: &Digest) -> Result<(), SinkError> {
        self.send(digest)
            .await
            .map_err(|e| SinkError::Delivery(format!("{:#}", e)))
    }
}
