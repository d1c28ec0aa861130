use std::ops::Deref;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts},
};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::{Config, JwtSettings};
use crate::db::models::User;
use crate::db::Store;
use crate::error::{ApiError, ApiResult, AuthError};
use crate::extract::{Form, Json};
use crate::policy::{self, Action};
use crate::AppState;

/// Prefix of the unsigned tokens issued before signed tokens existed. The
/// remainder of the string is the user id verbatim.
pub const LEGACY_TOKEN_PREFIX: &str = "mock-token-";

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

// Claims for our JWT
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    role: String,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<String>,
}

#[derive(Clone)]
struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: Option<String>,
    audience: Option<String>,
    /// `None` when the configured lifetime does not fit a `TimeDelta`.
    ttl: Option<TimeDelta>,
}

impl JwtKeys {
    fn new(settings: &JwtSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            ttl: TimeDelta::try_minutes(settings.ttl_minutes),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience.as_str()]);
        }
        validation
    }
}

/// Issues access tokens and maps presented tokens back to a user id.
#[derive(Clone)]
pub struct TokenService {
    jwt: Option<JwtKeys>,
    accept_legacy: bool,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        Self {
            jwt: config.jwt.as_ref().map(JwtKeys::new),
            accept_legacy: config.accept_legacy_tokens,
        }
    }

    pub fn issue(&self, user: &User) -> ApiResult<String> {
        let Some(keys) = &self.jwt else {
            return Ok(format!("{}{}", LEGACY_TOKEN_PREFIX, user.id));
        };

        let now = Utc::now();
        let expires = keys
            .ttl
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| ApiError::Internal("token lifetime is out of range".to_string()))?;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| ApiError::Internal(format!("JWT creation failed: {}", e)))
    }

    /// Extract the user id a token speaks for, without consulting the store.
    pub fn subject(&self, token: &str) -> Result<String, AuthError> {
        if let Some(rest) = token.strip_prefix(LEGACY_TOKEN_PREFIX) {
            if !self.accept_legacy {
                return Err(AuthError::InvalidToken("legacy tokens are not accepted".to_string()));
            }
            if rest.is_empty() {
                return Err(AuthError::MalformedToken);
            }
            return Ok(rest.to_string());
        }

        let Some(keys) = &self.jwt else {
            return Err(AuthError::MalformedToken);
        };
        let data = decode::<Claims>(token, &keys.decoding, &keys.validation()).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    AuthError::MalformedToken
                }
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;
        Ok(data.claims.sub)
    }

    pub async fn resolve(&self, store: &dyn Store, token: &str) -> ApiResult<User> {
        let user_id = self.subject(token)?;
        store
            .find_user(&user_id)
            .await?
            .ok_or(ApiError::Unauthenticated(AuthError::UnknownSubject))
    }
}

pub fn hash_password(plain: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

/// Check a plaintext password against the stored PHC hash. An unreadable
/// stored hash never verifies.
pub fn verify_password(user: &User, plain: &str) -> bool {
    match PasswordHash::new(&user.password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash for user {} is unreadable: {}", user.id, e);
            false
        }
    }
}

/// The caller behind the request's bearer token.
pub struct AuthenticatedUser(pub User);

impl Deref for AuthenticatedUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts).ok_or(AuthError::MissingToken);
        let result = match token {
            Ok(token) => state.tokens.resolve(state.db.as_ref(), &token).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(user) => Ok(AuthenticatedUser(user)),
            Err(e) => {
                if let ApiError::Unauthenticated(reason) = &e {
                    tracing::warn!(path = %parts.uri.path(), "Rejected request: {}", reason);
                }
                Err(e)
            }
        }
    }
}

fn extract_token(parts: &Parts) -> Option<String> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    let (scheme, token) = auth_header.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Json<TokenResponse>> {
    let user = match state.db.find_user_by_email(&form.username).await? {
        Some(user) => user,
        None => {
            tracing::warn!("Login failed: unknown account");
            return Err(AuthError::BadCredentials.into());
        }
    };

    let candidate = user.clone();
    let password = form.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&candidate, &password))
        .await
        .map_err(|e| ApiError::Internal(format!("password verification task failed: {}", e)))?;
    if !verified {
        tracing::warn!(user_id = %user.id, "Login failed: wrong password");
        return Err(AuthError::BadCredentials.into());
    }

    let access_token = state.tokens.issue(&user)?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

pub async fn me(user: AuthenticatedUser) -> ApiResult<Json<User>> {
    policy::require(&user, Action::ReadOwnProfile)?;
    Ok(Json(user.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;
    use crate::db::MemoryStore;

    fn user() -> User {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            email: "staff@parish.org".to_string(),
            name: "Staff".to_string(),
            password_hash: String::new(),
            role: Role::Staff,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn signed_config(ttl_minutes: i64) -> Config {
        Config {
            jwt: Some(JwtSettings {
                secret: "test-secret".to_string(),
                issuer: Some("parish-finance".to_string()),
                audience: None,
                ttl_minutes,
            }),
            accept_legacy_tokens: false,
            ..Config::default()
        }
    }

    #[test]
    fn password_round_trip() {
        let mut u = user();
        u.password_hash = hash_password("pw1").unwrap();
        assert!(u.password_hash.starts_with("$argon2"));
        assert!(verify_password(&u, "pw1"));
        assert!(!verify_password(&u, "pw2"));
    }

    #[test]
    fn corrupt_hash_never_verifies() {
        let mut u = user();
        u.password_hash = "pw1".to_string();
        assert!(!verify_password(&u, "pw1"));
    }

    #[test]
    fn legacy_token_keeps_full_hyphenated_id() {
        let tokens = TokenService::new(&Config::default());
        let u = user();
        let token = tokens.issue(&u).unwrap();
        assert_eq!(token, format!("mock-token-{}", u.id));
        assert_eq!(tokens.subject(&token).unwrap(), u.id);
    }

    #[test]
    fn legacy_token_errors_are_distinguished() {
        let tokens = TokenService::new(&Config::default());
        assert_eq!(tokens.subject("mock-token-"), Err(AuthError::MalformedToken));
        assert_eq!(tokens.subject("garbage"), Err(AuthError::MalformedToken));
    }

    #[test]
    fn signed_token_round_trip() {
        let tokens = TokenService::new(&signed_config(60));
        let u = user();
        let token = tokens.issue(&u).unwrap();
        assert!(!token.starts_with(LEGACY_TOKEN_PREFIX));
        assert_eq!(tokens.subject(&token).unwrap(), u.id);
    }

    #[test]
    fn signed_mode_rejects_legacy_tokens_when_disabled() {
        let tokens = TokenService::new(&signed_config(60));
        let u = user();
        assert!(matches!(
            tokens.subject(&format!("mock-token-{}", u.id)),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let u = user();
        let expired = TokenService::new(&signed_config(-120)).issue(&u).unwrap();
        let tokens = TokenService::new(&signed_config(60));
        assert_eq!(tokens.subject(&expired), Err(AuthError::ExpiredToken));

        let mut other = signed_config(60);
        if let Some(jwt) = other.jwt.as_mut() {
            jwt.secret = "another-secret".to_string();
        }
        let forged = TokenService::new(&other).issue(&u).unwrap();
        assert!(matches!(tokens.subject(&forged), Err(AuthError::InvalidToken(_))));
        assert_eq!(tokens.subject("not.a.jwt"), Err(AuthError::MalformedToken));
    }

    #[test]
    fn oversized_lifetime_fails_issue_instead_of_panicking() {
        let u = user();
        for ttl in [i64::MAX, 100_000_000_000_000] {
            let err = TokenService::new(&signed_config(ttl)).issue(&u).unwrap_err();
            assert!(matches!(err, ApiError::Internal(_)), "ttl {}", ttl);
        }
    }

    #[tokio::test]
    async fn resolve_requires_existing_user() {
        let store = MemoryStore::new();
        let u = user();
        store.create_user(u.clone()).await.unwrap();
        let tokens = TokenService::new(&Config::default());

        let found = tokens.resolve(&store, &format!("mock-token-{}", u.id)).await.unwrap();
        assert_eq!(found.id, u.id);

        let err = tokens
            .resolve(&store, "mock-token-00000000-0000-0000-0000-000000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(AuthError::UnknownSubject)));
    }
}
