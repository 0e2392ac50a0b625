//! Delivering codes to phones.

use async_trait::async_trait;

/// Sends an issued code to its phone number.
#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn send(&self, phone: &str, code: &str) -> anyhow::Result<()>;
}

/// Writes codes to the log instead of sending them. Used until an SMS
/// provider is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCodeSender;

#[async_trait]
impl CodeSender for LogCodeSender {
    async fn send(&self, phone: &str, code: &str) -> anyhow::Result<()> {
        log::info!("Verification code for {}: {}", phone, code);
        Ok(())
    }
}
