pub mod test_helpers {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
    use tempfile::NamedTempFile;

    use crate::auth::session::SessionManager;
    use crate::config::{AppConfig, AuthSettings, MailerSettings, SessionSettings};
    use crate::middleware::rate_limit::IpRateLimiter;
    use crate::repositories::{SqliteInvitationRepository, SqliteUserRepository};
    use crate::services::auth_service::AuthService;
    use crate::services::email_service::{EmailError, Mailer};
    use crate::AppState;

    pub const TEST_ADMIN_EMAIL: &str = "admin@example.com";
    pub const TEST_SECRET: &[u8] = b"test-secret-that-is-at-least-32-bytes!";

    /// Create a new in-memory SQLite database for testing
    pub async fn create_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    /// Create a temporary file-based SQLite database for testing
    /// Useful when several connections must see the same data concurrently
    pub async fn create_test_db_file() -> Result<(SqlitePool, NamedTempFile), sqlx::Error> {
        let temp_file = NamedTempFile::new().map_err(sqlx::Error::Io)?;
        let db_path = temp_file
            .path()
            .to_str()
            .ok_or_else(|| sqlx::Error::Configuration("Invalid database path".into()))?;
        let database_url = format!("sqlite://{}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok((pool, temp_file))
    }

    /// A mail delivered to a `RecordingMailer`.
    #[derive(Debug, Clone, PartialEq)]
    pub struct SentMail {
        pub to: String,
        pub link: String,
    }

    impl SentMail {
        /// Token carried by the magic link.
        pub fn token(&self) -> &str {
            self.link
                .split_once("token=")
                .map(|(_, token)| token)
                .unwrap_or_default()
        }
    }

    /// Accepts every message and remembers it.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<SentMail>>,
    }

    impl RecordingMailer {
        pub fn sent(&self) -> Vec<SentMail> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }

        pub fn last(&self) -> Option<SentMail> {
            self.sent().pop()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_magic_link(&self, to_email: &str, link: &str) -> Result<(), EmailError> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(SentMail {
                    to: to_email.to_string(),
                    link: link.to_string(),
                });
            }
            Ok(())
        }
    }

    /// Rejects every message.
    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_magic_link(&self, _to_email: &str, _link: &str) -> Result<(), EmailError> {
            Err(EmailError::SendFailed("smtp unavailable".to_string()))
        }
    }

    /// Never answers within any reasonable timeout.
    pub struct SlowMailer(pub Duration);

    #[async_trait]
    impl Mailer for SlowMailer {
        async fn send_magic_link(&self, _to_email: &str, _link: &str) -> Result<(), EmailError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    pub fn test_auth_settings() -> AuthSettings {
        AuthSettings {
            mail_timeout: Duration::from_millis(200),
            ..AuthSettings::default()
        }
    }

    pub fn test_config() -> AppConfig {
        let mut session = SessionSettings::new(TEST_SECRET.to_vec());
        session.secure = false;

        AppConfig {
            environment: "test".to_string(),
            database_url: ":memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            app_base_url: "http://localhost:8080".to_string(),
            admin_email: Some(TEST_ADMIN_EMAIL.to_string()),
            admin_auto_login: false,
            trust_proxy_headers: true,
            login_rate_per_minute: 20,
            auth: test_auth_settings(),
            session,
            mailer: MailerSettings::Log,
        }
    }

    pub fn create_auth_service(pool: &SqlitePool, mailer: Arc<dyn Mailer>) -> AuthService {
        AuthService::new(
            Arc::new(SqliteUserRepository::new(pool.clone())),
            Arc::new(SqliteInvitationRepository::new(pool.clone())),
            mailer,
            &test_auth_settings(),
        )
    }

    /// Full application state over the given pool and mailer.
    pub fn create_test_state(pool: &SqlitePool, mailer: Arc<dyn Mailer>, config: AppConfig) -> AppState {
        AppState {
            auth_service: Arc::new(AuthService::new(
                Arc::new(SqliteUserRepository::new(pool.clone())),
                Arc::new(SqliteInvitationRepository::new(pool.clone())),
                mailer,
                &config.auth,
            )),
            session_manager: Arc::new(SessionManager::new(&config.session)),
            rate_limiter: Arc::new(IpRateLimiter::new(config.login_rate_per_minute)),
            config: Arc::new(config),
        }
    }
}
