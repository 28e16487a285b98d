//! Mock mailer for testing.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{MailError, Mailer, OutgoingMail};

/// Mailer that records messages instead of sending them.
///
/// Recipients added with [`MockMailer::failing_for`] get a
/// `MailError::Transport` instead.
#[derive(Default)]
pub struct MockMailer {
    failing: Mutex<HashSet<String>>,
    sent: Mutex<Vec<OutgoingMail>>,
    attempts: Mutex<Vec<String>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(self, address: impl Into<String>) -> Self {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.into());
        self
    }

    /// Messages that were "delivered".
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every recipient passed to `send`, including failed ones.
    pub fn attempted_recipients(&self) -> Vec<String> {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(mail.to.clone());

        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&mail.to)
        {
            return Err(MailError::Transport(format!(
                "mock delivery failure for {}",
                mail.to
            )));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_sent_mail() {
        let mailer = MockMailer::new();
        let mail = OutgoingMail::new("a@x.com", "Hi", "Body");

        mailer.send(&mail).await.unwrap();

        assert_eq!(mailer.sent(), vec![mail]);
        assert_eq!(mailer.attempted_recipients(), vec!["a@x.com".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let mailer = MockMailer::new().failing_for("b@x.com");

        let result = mailer.send(&OutgoingMail::new("b@x.com", "Hi", "Body")).await;

        assert!(matches!(result, Err(MailError::Transport(_))));
        assert!(mailer.sent().is_empty());
        assert_eq!(mailer.attempted_recipients(), vec!["b@x.com".to_string()]);
    }
}
