use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("smtp relay")?
            .credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ))
            .port(cfg.port)
            .build();
        let from = format!("Quillpost <{}>", cfg.from)
            .parse()
            .context("parse MAIL_FROM")?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse().context("parse recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build message")?;
        self.transport.send(email).await.context("smtp send")?;
        Ok(())
    }
}

/// Subject and body of the password-reset mail. `link` is the absolute
/// verification URL carrying the token.
pub fn reset_message(link: &str) -> (String, String) {
    let subject = "Quillpost: Password Reset Request".to_string();
    let body = format!(
        "To reset your password, visit the following link:\n\
        \n\
        {link}\n\
        \n\
        The link expires in 30 minutes. If you did not make this request,\n\
        simply ignore this email and no changes will be made.\n"
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_message_embeds_link() {
        let link = "http://localhost:8080/reset_password/abc.def.ghi";
        let (subject, body) = reset_message(link);
        assert!(subject.contains("Password Reset"));
        assert!(body.contains(link));
        assert!(body.contains("ignore this email"));
    }
}
