use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub session_ttl_minutes: i64,
    pub remember_ttl_minutes: i64,
    pub reset_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Absolute base URL used when composing links in outgoing mail.
    pub base_url: String,
    pub avatar_dir: String,
    pub avatar_public_path: String,
    pub tokens: TokenConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let tokens = TokenConfig {
            secret: std::env::var("SECRET_KEY")?,
            issuer: std::env::var("TOKEN_ISSUER").unwrap_or_else(|_| "quillpost".into()),
            audience: std::env::var("TOKEN_AUDIENCE").unwrap_or_else(|_| "quillpost-users".into()),
            session_ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 12),
            remember_ttl_minutes: std::env::var("REMEMBER_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 30),
            reset_ttl_seconds: std::env::var("RESET_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(1800),
        };
        let mail = MailConfig {
            host: std::env::var("MAIL_HOST").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("MAIL_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            username: std::env::var("MAIL_USERNAME").unwrap_or_default(),
            password: std::env::var("MAIL_PASSWORD").unwrap_or_default(),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@quillpost.dev".into()),
        };
        Ok(Self {
            database_url,
            base_url: std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into()),
            avatar_dir: std::env::var("AVATAR_DIR")
                .unwrap_or_else(|_| "static/profile_pics".into()),
            avatar_public_path: std::env::var("AVATAR_PUBLIC_PATH")
                .unwrap_or_else(|_| "/static/profile_pics".into()),
            tokens,
            mail,
        })
    }
}
