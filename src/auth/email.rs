//! Outgoing email.
//!
//! Delivery itself is someone else's job; this module only defines the seam
//! and two senders that never leave the process.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Logs the message instead of sending it. For local runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(to = %message.to, subject = %message.subject, body = %message.body, "email not delivered (log sender)");
        Ok(())
    }
}

/// Collects messages in memory.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    sent: Mutex<Vec<EmailMessage>>,
}

impl MemoryOutbox {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl EmailSender for MemoryOutbox {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}
