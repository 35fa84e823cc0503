//! GitHub App authentication
//!
//! An RS256 JWT signed with the app's private key is exchanged for a
//! short-lived installation token. The JWT is backdated 60 seconds to absorb
//! clock drift and lives 9 minutes (GitHub caps it at 10).

use crate::controller::tracker::TrackerError;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// How the client authenticates
#[derive(Clone)]
pub enum Credentials {
    App(AppCredentials),
    /// Personal access or Actions token
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::App(app) => f.debug_tuple("App").field(app).finish(),
            Credentials::Token(_) => f.write_str("Token(<redacted>)"),
        }
    }
}

#[derive(Clone)]
pub struct AppCredentials {
    pub app_id: u64,
    pub installation_id: u64,
    /// PEM, PKCS#1 or PKCS#8
    pub private_key: String,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Sign the app JWT used for `/app` endpoints
pub fn build_app_jwt(app: &AppCredentials, now: DateTime<Utc>) -> Result<String, TrackerError> {
    let claims = AppClaims {
        iat: (now - Duration::seconds(60)).timestamp(),
        exp: (now + Duration::minutes(9)).timestamp(),
        iss: app.app_id.to_string(),
    };

    let key = EncodingKey::from_rsa_pem(app.private_key.as_bytes())
        .map_err(|e| TrackerError::Auth(format!("invalid app private key: {}", e)))?;

    encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| TrackerError::Auth(format!("failed to sign app JWT: {}", e)))
}

/// Installation token with its expiry
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    /// Usable for at least another minute
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::minutes(1) > now
    }
}
