use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use serde_json::json;

use crate::config::{MailerSettings, SmtpEncryption};

const MAGIC_LINK_SUBJECT: &str = "Your one-time sign-in link";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Failed to build email message: {0}")]
    MessageBuild(String),
    #[error("Failed to send email: {0}")]
    SendFailed(String),
    #[error("Email provider rejected the message: {status} - {body}")]
    Rejected { status: u16, body: String },
    #[error("Email delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Delivers magic links. Implementations must not retry internally; a failure
/// is reported straight back to the caller.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_magic_link(&self, to_email: &str, link: &str) -> Result<(), EmailError>;
}

fn magic_link_html(link: &str) -> String {
    format!(
        r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">Sign in to Quickr</h1>
    <p>Click the button below to sign in. This link works once and expires after a limited time.</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{link}" style="background-color: #2196F3; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px; display: inline-block;">Sign in</a>
    </p>
    <p style="color: #666; font-size: 14px;">Or copy and paste this link into your browser:</p>
    <p style="color: #666; font-size: 14px; word-break: break-all;">{link}</p>
    <p style="color: #999; font-size: 12px; margin-top: 40px;">If you didn't request this link, you can safely ignore this email.</p>
</body>
</html>
"#
    )
}

/// Development mailer: writes the link to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_magic_link(&self, to_email: &str, link: &str) -> Result<(), EmailError> {
        tracing::info!("📧 [LOG MAILER] Magic link to: {}", to_email);
        tracing::info!("   Subject: {}", MAGIC_LINK_SUBJECT);
        tracing::info!("   Link: {}", link);
        Ok(())
    }
}

/// Brevo (formerly Sendinblue) transactional email API.
pub struct BrevoMailer {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    sender_email: String,
    sender_name: String,
}

impl BrevoMailer {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        sender_email: impl Into<String>,
        sender_name: impl Into<String>,
    ) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| EmailError::ConfigError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            sender_email: sender_email.into(),
            sender_name: sender_name.into(),
        })
    }
}

#[async_trait]
impl Mailer for BrevoMailer {
    async fn send_magic_link(&self, to_email: &str, link: &str) -> Result<(), EmailError> {
        let payload = json!({
            "sender": { "name": self.sender_name, "email": self.sender_email },
            "to": [{ "email": to_email }],
            "subject": MAGIC_LINK_SUBJECT,
            "htmlContent": magic_link_html(link),
        });

        let response = self
            .client
            .post(format!("{}/v3/smtp/email", self.api_base))
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("Email sent via Brevo to {}", to_email);
        Ok(())
    }
}

pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        from_email: &str,
        from_name: &str,
        encryption: SmtpEncryption,
    ) -> Result<Self, EmailError> {
        let credentials = Credentials::new(username.to_string(), password.to_string());

        let mailer = match encryption {
            SmtpEncryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| EmailError::ConfigError(format!("SMTP relay error: {}", e)))?
                .port(port)
                .credentials(credentials)
                .timeout(Some(HTTP_TIMEOUT))
                .build(),
            SmtpEncryption::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| EmailError::ConfigError(format!("SMTP starttls error: {}", e)))?
                .port(port)
                .credentials(credentials)
                .timeout(Some(HTTP_TIMEOUT))
                .build(),
            SmtpEncryption::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(port)
                .credentials(credentials)
                .timeout(Some(HTTP_TIMEOUT))
                .build(),
        };

        Ok(Self {
            mailer,
            from_email: from_email.to_string(),
            from_name: from_name.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_magic_link(&self, to_email: &str, link: &str) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_email)
                    .parse()
                    .map_err(|e| {
                        EmailError::MessageBuild(format!("Invalid from address: {}", e))
                    })?,
            )
            .to(to_email
                .parse()
                .map_err(|e| EmailError::MessageBuild(format!("Invalid to address: {}", e)))?)
            .subject(MAGIC_LINK_SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(magic_link_html(link))
            .map_err(|e| EmailError::MessageBuild(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

/// Build the configured mailer, falling back to the log mailer if the
/// transport can't be set up.
pub fn create_mailer(settings: &MailerSettings) -> Box<dyn Mailer> {
    let built: Result<Box<dyn Mailer>, EmailError> = match settings {
        MailerSettings::Log => {
            tracing::info!(
                "No mail provider configured. Using log mailer (links will be written to the log)"
            );
            return Box::new(LogMailer);
        }
        MailerSettings::Brevo {
            api_key,
            api_base,
            sender_email,
            sender_name,
        } => BrevoMailer::new(
            api_key.as_str(),
            api_base.as_str(),
            sender_email.as_str(),
            sender_name.as_str(),
        )
        .map(|m| Box::new(m) as Box<dyn Mailer>),
        MailerSettings::Smtp {
            host,
            port,
            username,
            password,
            from_email,
            from_name,
            encryption,
        } => SmtpMailer::new(
            host,
            *port,
            username,
            password,
            from_email,
            from_name,
            *encryption,
        )
        .map(|m| Box::new(m) as Box<dyn Mailer>),
    };

    match built {
        Ok(mailer) => {
            tracing::info!("Using {:?} mailer", settings);
            mailer
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize mail transport: {}. Falling back to log mailer",
                e
            );
            Box::new(LogMailer)
        }
    }
}
