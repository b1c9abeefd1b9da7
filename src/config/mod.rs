pub mod app;
pub mod session;

pub use app::{AppConfig, AuthSettings, ConfigError, MailerSettings, SmtpEncryption};
pub use session::{validate_production_config, SessionSettings};
