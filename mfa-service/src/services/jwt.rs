use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::TenantId;

/// RS256 access-token issuer and validator.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_expiry_minutes: i64,
}

/// Claims for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub tenant_id: String,
    pub iss: String,
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID, also the session's token id
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

impl JwtService {
    /// Create a new JWT service by loading RSA keys from files
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(&config.private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                config.private_key_path,
                e
            )
        })?;

        let public_key_pem = fs::read_to_string(&config.public_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                config.public_key_path,
                e
            )
        })?;

        Self::from_pem(private_key_pem.as_bytes(), public_key_pem.as_bytes(), config)
    }

    pub fn from_pem(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        config: &JwtConfig,
    ) -> Result<Self, anyhow::Error> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        tracing::info!("JWT service initialized with RS256 keys");

        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        })
    }

    /// Issue an access token for `(tenant, user)` with a fresh `jti`.
    pub fn issue(&self, tenant_id: &TenantId, user_id: &str) -> Result<IssuedToken, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = Header::new(Algorithm::RS256);
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;

        // Report the second-precision expiry actually encoded in the token.
        let expires_at = Utc.timestamp_opt(claims.exp, 0).single().unwrap_or(exp);

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    /// Verify signature, issuer, audience and expiry.
    pub fn validate(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/jwt_private.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/jwt_public.pem");

    fn config(issuer: &str, audience: &str) -> JwtConfig {
        JwtConfig {
            private_key_path: String::new(),
            public_key_path: String::new(),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            access_token_expiry_minutes: 15,
        }
    }

    fn service(issuer: &str, audience: &str) -> JwtService {
        JwtService::from_pem(
            PRIVATE_KEY.as_bytes(),
            PUBLIC_KEY.as_bytes(),
            &config(issuer, audience),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_validate() {
        let jwt = service("trustpin", "mobile");
        let issued = jwt.issue(&TenantId::new("t1"), "u1").unwrap();

        assert!(!issued.token.is_empty());
        assert!(issued.expires_at > Utc::now());

        let claims = jwt.validate(&issued.token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.tenant_id, "t1");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_each_token_has_unique_jti() {
        let jwt = service("trustpin", "mobile");
        let a = jwt.issue(&TenantId::new("t1"), "u1").unwrap();
        let b = jwt.issue(&TenantId::new("t1"), "u1").unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_wrong_issuer_or_audience_is_rejected() {
        let token = service("someone-else", "mobile")
            .issue(&TenantId::new("t1"), "u1")
            .unwrap()
            .token;
        assert!(service("trustpin", "mobile").validate(&token).is_err());

        let token = service("trustpin", "web")
            .issue(&TenantId::new("t1"), "u1")
            .unwrap()
            .token;
        assert!(service("trustpin", "mobile").validate(&token).is_err());
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let jwt = service("trustpin", "mobile");
        let mut token = jwt.issue(&TenantId::new("t1"), "u1").unwrap().token;
        token.push('x');
        assert!(jwt.validate(&token).is_err());
        assert!(jwt.validate("not.a.jwt").is_err());
    }

    #[test]
    fn test_missing_key_file_fails() {
        let mut cfg = config("trustpin", "mobile");
        cfg.private_key_path = "/nonexistent/private.pem".to_string();
        assert!(JwtService::new(&cfg).is_err());
    }
}
