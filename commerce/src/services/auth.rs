use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::config::AuthConfig;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::model::{User, UserRole};
use crate::storage::UserStorage;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// Why a request could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("Authentication token is required")]
    MissingToken,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Authentication token has expired")]
    ExpiredToken,
    #[error("User not found")]
    UserNotFound,
    #[error("User account is deactivated")]
    UserDeactivated,
}

impl AuthFailure {
    pub fn code(self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "MISSING_TOKEN",
            AuthFailure::InvalidToken => "INVALID_TOKEN",
            AuthFailure::ExpiredToken => "EXPIRED_TOKEN",
            AuthFailure::UserNotFound => "USER_NOT_FOUND",
            AuthFailure::UserDeactivated => "USER_DEACTIVATED",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStorage>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStorage>, config: &AuthConfig) -> Self {
        Self {
            users,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: Duration::hours(config.token_ttl_hours.max(1)),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn hash_password(&self, password: &str) -> CommerceResult<String> {
        bcrypt::hash(password, self.bcrypt_cost).map_err(CommerceError::storage)
    }

    pub fn issue_token(&self, user: &User, now: DateTime<Utc>) -> CommerceResult<String> {
        let claims = Claims {
            sub: user.id,
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(CommerceError::storage)
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, AuthFailure> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthFailure::ExpiredToken,
                _ => AuthFailure::InvalidToken,
            })
    }

    /// Resolves a bearer token to an active user.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthFailure> {
        let claims = self.decode_token(token)?;
        let user = self
            .users
            .get_user(claims.sub)
            .await
            .map_err(|e| {
                warn!(error = %e, "User lookup failed during authentication");
                AuthFailure::UserNotFound
            })?
            .ok_or(AuthFailure::UserNotFound)?;
        if !user.is_active {
            return Err(AuthFailure::UserDeactivated);
        }
        Ok(user)
    }

    pub async fn register(&self, request: RegisterRequest, now: DateTime<Utc>) -> CommerceResult<Session> {
        let email = request.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(CommerceError::validation("A valid email is required"));
        }
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(CommerceError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            return Err(CommerceError::validation("First and last name are required"));
        }

        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: self.hash_password(&request.password)?,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            phone: request.phone.filter(|p| !p.trim().is_empty()),
            role: UserRole::Customer,
            is_active: true,
            last_login_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        self.users.create_user(&user).await?;
        info!(user_id = %user.id, "User registered");

        let token = self.issue_token(&user, now)?;
        Ok(Session { user, token })
    }

    pub async fn login(&self, request: LoginRequest, now: DateTime<Utc>) -> CommerceResult<Session> {
        let invalid = || CommerceError::Unauthorized("Invalid email or password".to_string());
        let mut user = self.users.find_user_by_email(&request.email).await?.ok_or_else(invalid)?;
        let matches = bcrypt::verify(&request.password, &user.password_hash).unwrap_or(false);
        if !matches {
            warn!(user_id = %user.id, "Failed login attempt");
            return Err(invalid());
        }
        if !user.is_active {
            return Err(CommerceError::Forbidden("User account is deactivated".to_string()));
        }

        user.last_login_at = Some(now);
        user.updated_at = now;
        self.users.update_user(&user).await?;
        let token = self.issue_token(&user, now)?;
        Ok(Session { user, token })
    }

    pub async fn update_profile(&self, mut user: User, update: ProfileUpdate, now: DateTime<Utc>) -> CommerceResult<User> {
        if let Some(first_name) = update.first_name.filter(|n| !n.trim().is_empty()) {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = update.last_name.filter(|n| !n.trim().is_empty()) {
            user.last_name = last_name.trim().to_string();
        }
        if update.phone.is_some() {
            user.phone = update.phone.filter(|p| !p.trim().is_empty());
        }
        user.updated_at = now;
        self.users.update_user(&user).await?;
        Ok(user)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'),
        None => false,
    }
}
