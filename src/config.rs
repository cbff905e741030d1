/// Configuration management for the Skein server
use crate::error::{SkeinError, SkeinResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub email: Option<EmailConfig>,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub public_url: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret for signing and verifying bearer tokens
    pub jwt_secret: String,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 100,
            unauthenticated_rps: 10,
            burst_size: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SkeinResult<Self> {
        let data_directory =
            PathBuf::from(env::var("SKEIN_DATA_DIR").unwrap_or_else(|_| "./data".to_string()));

        let database = env::var("SKEIN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("skein.sqlite"));

        let hostname = env::var("SKEIN_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("SKEIN_PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse::<u16>()
            .map_err(|e| SkeinError::Internal(format!("Invalid SKEIN_PORT: {}", e)))?;

        let public_url = env::var("SKEIN_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));

        let jwt_secret = env::var("SKEIN_JWT_SECRET")
            .map_err(|_| SkeinError::Internal("SKEIN_JWT_SECRET must be set".to_string()))?;

        // Email is optional; both variables must be present to enable it
        let email = match (env::var("SKEIN_SMTP_URL"), env::var("SKEIN_EMAIL_FROM")) {
            (Ok(smtp_url), Ok(from_address)) => Some(EmailConfig {
                smtp_url,
                from_address,
            }),
            _ => None,
        };

        let rate_limit = RateLimitSettings {
            enabled: env::var("SKEIN_RATE_LIMIT_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            ..RateLimitSettings::default()
        };

        let logging = LoggingConfig {
            level: env::var("SKEIN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(Self {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            auth: AuthConfig { jwt_secret },
            email,
            rate_limit,
            logging,
        })
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> SkeinResult<()> {
        if self.auth.jwt_secret.len() < 16 {
            return Err(SkeinError::Internal(
                "JWT secret must be at least 16 characters".to_string(),
            ));
        }

        if let Some(ref email) = self.email {
            if !email.smtp_url.starts_with("smtp://") {
                return Err(SkeinError::Internal(
                    "SMTP URL must start with smtp://".to_string(),
                ));
            }
            if !email.from_address.contains('@') {
                return Err(SkeinError::Internal(
                    "Email from address is not valid".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 4000,
                public_url: "http://127.0.0.1:4000".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from("./data/skein.sqlite"),
            },
            auth: AuthConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            },
            email: None,
            rate_limit: RateLimitSettings::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_sane_config() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_jwt_secret() {
        let mut config = sample_config();
        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_smtp_url() {
        let mut config = sample_config();
        config.email = Some(EmailConfig {
            smtp_url: "http://mail.example.com".to_string(),
            from_address: "noreply@example.com".to_string(),
        });
        assert!(config.validate().is_err());
    }
}
