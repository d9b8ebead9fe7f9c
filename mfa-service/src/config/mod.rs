use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MfaConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub provider: ProviderConfig,
    pub mfa: MfaSettings,
    pub credential_verifier: CredentialVerifierKind,
    pub demo: DemoConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub timeout_ms: u64,
    pub retry_max: u32,
    pub retry_backoff_ms: u64,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone)]
pub struct MfaSettings {
    pub challenge_ttl_seconds: i64,
    pub nonce_ttl_seconds: u64,
    pub idempotency_ttl_seconds: u64,
}

impl MfaSettings {
    pub fn challenge_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.challenge_ttl_seconds)
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_seconds)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_seconds)
    }
}

impl Default for MfaSettings {
    fn default() -> Self {
        Self {
            challenge_ttl_seconds: 120,
            nonce_ttl_seconds: 300,
            idempotency_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialVerifierKind {
    /// Verify against the user's stored Argon2 hash.
    Argon2,
    /// Accept any non-empty password.
    NonEmpty,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub tenant_id: String,
    pub username: String,
    pub password: Option<Secret<String>>,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: bool,
}

impl MfaConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = MfaConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("mfa-service"), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: required_in_prod("DATABASE_URL", is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
            },
            redis: RedisConfig {
                url: required_in_prod("REDIS_URL", is_prod)?,
            },
            jwt: JwtConfig {
                private_key_path: get_env(
                    "JWT_PRIVATE_KEY_PATH",
                    Some("keys/jwt_private.pem"),
                    is_prod,
                )?,
                public_key_path: get_env(
                    "JWT_PUBLIC_KEY_PATH",
                    Some("keys/jwt_public.pem"),
                    is_prod,
                )?,
                issuer: get_env("JWT_ISSUER", Some("trustpin"), false)?,
                audience: get_env("JWT_AUDIENCE", Some("mobile"), false)?,
                access_token_expiry_minutes: parse_env("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", "15")?,
            },
            provider: ProviderConfig {
                base_url: get_env(
                    "TRUSTPIN_BASE_URL",
                    Some("http://trustpin.kaizen3.online"),
                    is_prod,
                )?,
                api_key: Secret::new(get_env("TRUSTPIN_API_KEY", Some(""), is_prod)?),
                timeout_ms: parse_env("HTTP_TIMEOUT_MS", "5000")?,
                retry_max: parse_env("RETRY_MAX", "2")?,
                retry_backoff_ms: parse_env("RETRY_BACKOFF_MS", "200")?,
            },
            mfa: MfaSettings {
                challenge_ttl_seconds: parse_env("CHALLENGE_TTL_SECONDS", "120")?,
                nonce_ttl_seconds: parse_env("NONCE_TTL_SECONDS", "300")?,
                idempotency_ttl_seconds: parse_env("IDEMPOTENCY_TTL_SECONDS", "300")?,
            },
            credential_verifier: get_env(
                "CREDENTIAL_VERIFIER",
                Some(if is_prod { "argon2" } else { "non_empty" }),
                false,
            )?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            demo: DemoConfig {
                tenant_id: get_env("DEMO_TENANT_ID", Some("demo-tenant"), false)?,
                username: get_env("DEMO_USERNAME", Some("demo"), false)?,
                password: get_optional_env("DEMO_PASSWORD").map(Secret::new),
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    false,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env(
                    "ENABLE_SWAGGER",
                    Some(if is_prod { "false" } else { "true" }),
                    false,
                )?
                .parse()
                .unwrap_or(false),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// External stores are used only when both URLs are configured.
    pub fn uses_external_stores(&self) -> bool {
        self.database.url.is_some() && self.redis.url.is_some()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.mfa.challenge_ttl_seconds <= 0
            || self.mfa.nonce_ttl_seconds == 0
            || self.mfa.idempotency_ttl_seconds == 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MFA TTLs must be positive"
            )));
        }

        if self.provider.timeout_ms == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HTTP_TIMEOUT_MS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.credential_verifier == CredentialVerifierKind::NonEmpty {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "CREDENTIAL_VERIFIER=non_empty is not allowed in production"
                )));
            }

            if self.swagger.enabled {
                tracing::warn!("Swagger UI is enabled in production");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_in_prod(key: &str, is_prod: bool) -> Result<Option<String>, AppError> {
    match get_optional_env(key) {
        Some(val) => Ok(Some(val)),
        None if is_prod => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} is required in production but not set",
            key
        ))),
        None => Ok(None),
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for CredentialVerifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "argon2" => Ok(CredentialVerifierKind::Argon2),
            "non_empty" => Ok(CredentialVerifierKind::NonEmpty),
            _ => Err(format!("Invalid credential verifier: {}", s)),
        }
    }
}
