pub mod auth_service;
pub mod email_service;
pub mod token;

pub use auth_service::{build_magic_link, AuthService, AuthServiceError};
pub use email_service::{
    create_mailer, BrevoMailer, EmailError, LogMailer, Mailer, SmtpMailer,
};
pub use token::{generate_token, TokenError, MAGIC_TOKEN_BYTES};
