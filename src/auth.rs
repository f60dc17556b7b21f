use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::AppState;
use crate::constants::*;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AuthResponse, Category, CategoryKind, LoginPayload, Notifications, RegisterPayload, Security,
    User,
};
use crate::user::{find_user_by_email, find_user_by_id, insert_user};
use crate::utils::{now, validate_string_length};

const DEFAULT_CATEGORIES: [(&str, CategoryKind, &str, &str); 7] = [
    ("Food & Dining", CategoryKind::Expense, "Utensils", "bg-orange-500"),
    ("Transport", CategoryKind::Expense, "Car", "bg-blue-500"),
    ("Utilities", CategoryKind::Expense, "Zap", "bg-yellow-500"),
    ("Shopping", CategoryKind::Expense, "ShoppingBag", "bg-pink-500"),
    ("Entertainment", CategoryKind::Expense, "Film", "bg-purple-500"),
    ("Salary", CategoryKind::Income, "DollarSign", "bg-green-500"),
    ("Freelance", CategoryKind::Income, "Briefcase", "bg-teal-500"),
];

/// Categories every new account starts with.
pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, kind, icon, color)| Category {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            kind: *kind,
            icon: icon.to_string(),
            color: color.to_string(),
            is_default: true,
        })
        .collect()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue_token(state: &AppState, user_id: &str) -> ApiResult<String> {
    state
        .tokens
        .create(user_id)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
}

fn new_user(display_name: String, email: String, password_hash: String) -> User {
    let created = now();
    User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash,
        display_name,
        bio: DEFAULT_BIO.to_string(),
        currency: DEFAULT_CURRENCY.to_string(),
        monthly_income: DEFAULT_MONTHLY_INCOME,
        notifications: Notifications::default(),
        security: Security::default(),
        categories: default_categories(),
        created_at: created,
        updated_at: created,
    }
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let Json(payload) = payload?;

    let (display_name, email, password) =
        match (payload.display_name, payload.email, payload.password) {
            (Some(name), Some(email), Some(password))
                if !name.trim().is_empty() && !email.trim().is_empty() && !password.is_empty() =>
            {
                (name.trim().to_string(), normalize_email(&email), password)
            }
            _ => return Err(ApiError::bad_request(ERR_MISSING_FIELDS)),
        };

    validate_password(&password)?;
    validate_string_length(&display_name, "Display name", MAX_TEXT_LENGTH)?;
    validate_string_length(&email, "Email", MAX_TEXT_LENGTH)?;

    if find_user_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::bad_request(ERR_USER_EXISTS));
    }

    let user = new_user(display_name, email, hash_password(&password)?);

    // The UNIQUE index still guards a registration racing this one.
    insert_user(&state.db, &user).await?;

    let token = issue_token(&state, &user.id)?;
    tracing::info!(user_id = %user.id, "registered new user");

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);

    let Some(user) = find_user_by_email(&state.db, &email).await? else {
        tracing::warn!("login attempt for unknown email");
        return Err(ApiError::bad_request(ERR_INVALID_CREDENTIALS));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        tracing::warn!(user_id = %user.id, "login attempt with wrong password");
        return Err(ApiError::bad_request(ERR_INVALID_CREDENTIALS));
    }

    let token = issue_token(&state, &user.id)?;
    Ok(Json(AuthResponse { user, token }))
}

pub async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn unauthorized() -> ApiError {
    ApiError::Unauthorized(ERR_UNAUTHORIZED.to_string())
}

/// Rejects the request unless it carries a valid bearer token for an existing
/// user, whom it attaches to the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(request.headers()).ok_or_else(unauthorized)?;
    let claims = state.tokens.verify(token).map_err(|err| {
        tracing::debug!("rejected bearer token: {err}");
        unauthorized()
    })?;

    let user = find_user_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(unauthorized)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn default_categories_are_seeded() {
        let categories = default_categories();
        assert_eq!(categories.len(), 7);
        assert!(categories.iter().all(|c| c.is_default));
        assert_eq!(
            categories
                .iter()
                .filter(|c| c.kind == CategoryKind::Income)
                .count(),
            2
        );
        assert_eq!(categories[0].name, "Food & Dining");
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
