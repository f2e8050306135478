use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::config::JwtSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "quodo".into(),
            audience: "quodo-api".into(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 7,
            leeway_seconds: 30,
        }
    }
}

impl From<&JwtSettings> for JwtConfig {
    fn from(settings: &JwtSettings) -> Self {
        Self {
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            access_token_expiry_minutes: settings.access_token_minutes,
            refresh_token_expiry_days: settings.refresh_token_days,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub office: Option<String>,
}

impl Claims {
    pub fn new(
        user_id: &str,
        issuer: &str,
        audience: &str,
        token_type: TokenType,
        expiry: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: token_type.as_str().to_string(),
            username: None,
            role: None,
            office: None,
        }
    }

    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    pub fn with_role(mut self, role: String) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_office(mut self, office: Option<String>) -> Self {
        self.office = office;
        self
    }

    pub fn is_access_token(&self) -> bool {
        self.token_type == TokenType::Access.as_str()
    }

    pub fn is_refresh_token(&self) -> bool {
        self.token_type == TokenType::Refresh.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// Identity data copied into issued tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenSubject {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub office: Option<String>,
}

pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    // jti -> token expiry (unix seconds)
    blacklist: Arc<RwLock<HashMap<String, i64>>>,
}

impl JwtManager {
    pub fn new(config: JwtConfig, secret: &str) -> Result<Self> {
        if secret.len() < 16 {
            return Err(anyhow!("JWT secret must be at least 16 characters"));
        }
        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            blacklist: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn from_settings(settings: &JwtSettings) -> Result<Self> {
        Self::new(JwtConfig::from(settings), &settings.secret)
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode token: {e}"))
    }

    fn subject_claims(&self, subject: &TokenSubject, token_type: TokenType, expiry: DateTime<Utc>) -> Claims {
        Claims::new(
            &subject.user_id,
            &self.config.issuer,
            &self.config.audience,
            token_type,
            expiry,
        )
        .with_username(subject.username.clone())
        .with_role(subject.role.clone())
        .with_office(subject.office.clone())
    }

    pub fn generate_token_pair(&self, subject: &TokenSubject) -> Result<TokenPair> {
        let access_expiry = Utc::now() + Duration::minutes(self.config.access_token_expiry_minutes);
        let refresh_expiry = Utc::now() + Duration::days(self.config.refresh_token_expiry_days);

        let access_claims = self.subject_claims(subject, TokenType::Access, access_expiry);
        let refresh_claims = self.subject_claims(subject, TokenType::Refresh, refresh_expiry);

        let access_token = self.encode_claims(&access_claims)?;
        let refresh_token = self.encode_claims(&refresh_claims)?;

        debug!("Generated token pair for user {}", subject.user_id);

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiry_minutes * 60,
            refresh_expires_in: self.config.refresh_token_expiry_days * 24 * 60 * 60,
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = self.config.leeway_seconds;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow!("Token validation failed: {e}"))
    }

    pub async fn validate_token_with_blacklist(&self, token: &str) -> Result<TokenData<Claims>> {
        let token_data = self.validate_token(token)?;

        if self.is_revoked(&token_data.claims.jti).await {
            return Err(anyhow!("Token has been revoked"));
        }

        Ok(token_data)
    }

    pub async fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let token_data = self.validate_token_with_blacklist(token).await?;

        if !token_data.claims.is_access_token() {
            return Err(anyhow!("Expected access token"));
        }

        Ok(token_data.claims)
    }

    pub async fn validate_refresh_token(&self, token: &str) -> Result<Claims> {
        let token_data = self.validate_token_with_blacklist(token).await?;

        if !token_data.claims.is_refresh_token() {
            return Err(anyhow!("Expected refresh token"));
        }

        Ok(token_data.claims)
    }

    /// Validates a refresh token and revokes it, so it can be exchanged only once.
    pub async fn consume_refresh_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_refresh_token(token).await?;
        self.revoke_token(&claims.jti, claims.exp).await;
        Ok(claims)
    }

    pub async fn revoke_token(&self, jti: &str, expires_at: i64) {
        let mut blacklist = self.blacklist.write().await;
        blacklist.insert(jti.to_string(), expires_at);
        debug!("Revoked token {jti}");
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        let blacklist = self.blacklist.read().await;
        blacklist.contains_key(jti)
    }

    /// Drops revoked entries whose token has expired on its own.
    pub async fn cleanup_blacklist(&self) -> usize {
        let now = Utc::now().timestamp() - self.config.leeway_seconds as i64;
        let mut blacklist = self.blacklist.write().await;
        let before = blacklist.len();
        blacklist.retain(|_, exp| *exp >= now);
        before - blacklist.len()
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let header = auth_header.trim();
    match header.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => {
            let token = header[7..].trim();
            if token.is_empty() {
                None
            } else {
                Some(token)
            }
        }
        _ => None,
    }
}
