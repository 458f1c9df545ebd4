//! Digest delivery over SMTP.

use anyhow::Context;
use async_trait::async_trait;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor, address::Envelope};

/// Something that can deliver a rendered digest.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Sends `content`, a complete message including its headers.
    async fn send(&self, to: &str, from: &str, content: &str) -> anyhow::Result<()>;
}

/// Hands messages to an SMTP relay, usually the local MTA.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    relay: String,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16) -> Self {
        // No TLS or auth: the relay is expected to be local and trusted.
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();

        Self {
            transport,
            relay: format!("{host}:{port}"),
        }
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, to: &str, from: &str, content: &str) -> anyhow::Result<()> {
        let to: Address = to.parse().context("Invalid recipient address")?;
        let from: Address = from.parse().context("Invalid sender address")?;
        let envelope =
            Envelope::new(Some(from), vec![to]).context("Failed to build mail envelope")?;

        let content = crlf_line_endings(content);
        tracing::debug!("Sending {} bytes through {}", content.len(), self.relay);
        self.transport
            .send_raw(&envelope, content.as_bytes())
            .await
            .with_context(|| {
                format!(
                    "Could not send e-mail, check the SMTP relay at {}",
                    self.relay
                )
            })?;

        Ok(())
    }
}

/// SMTP wants CRLF everywhere; templates and digests are written with bare LF.
fn crlf_line_endings(content: &str) -> String {
    let mut output = String::with_capacity(content.len() + content.len() / 16);
    let mut previous = None;
    for c in content.chars() {
        if c == '\n' && previous != Some('\r') {
            output.push('\r');
        }
        output.push(c);
        previous = Some(c);
    }
    output
}
