//! Outbound mail for the user notifier.
//!
//! A thin abstraction over [lettre](https://lettre.rs): the [`Mailer`]
//! trait sends one message to one address, [`SmtpMailer`] implements it
//! over SMTP, and [`MockMailer`] records messages for tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use notifier_mail::{Mailer, OutgoingMail, SmtpMailer, SmtpMailerConfig};
//!
//! # async fn run() -> Result<(), notifier_mail::MailError> {
//! let mailer = SmtpMailer::new(SmtpMailerConfig::new("smtp.example.com", "noreply@example.com"))?;
//! mailer
//!     .send(&OutgoingMail::new("user@example.com", "Welcome!", "Thanks for signing up."))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod mock;
mod smtp;

pub use mock::MockMailer;
pub use smtp::{SmtpMailer, SmtpMailerConfig};

use async_trait::async_trait;
use thiserror::Error;

/// Errors for anything that keeps a message from being delivered.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    /// Connection, TLS, authentication, or server rejection
    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Invalid mailer configuration: {0}")]
    Config(String),
}

/// A single plain-text message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `mail`; any non-delivery condition is an error.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}
