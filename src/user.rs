use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use libsql::{Value, params::Params};

use crate::AppState;
use crate::auth::{hash_password, normalize_email, validate_password, verify_password};
use crate::constants::{ERR_USER_EXISTS, MAX_BIO_LENGTH, MAX_TEXT_LENGTH};
use crate::database::{Db, is_unique_violation};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Category, MessageResponse, Notifications, PasswordChange, ProfileUpdate, Security, User,
};
use crate::utils::{from_timestamp, now, numeric, validate_amount, validate_string_length};

const USER_COLUMNS: &str = "id, email, password_hash, display_name, bio, currency, monthly_income, \
     spending_alerts, weekly_reports, bill_reminders, two_factor_enabled, categories, created_at, updated_at";

pub fn extract_user_from_row(row: libsql::Row) -> ApiResult<User> {
    let categories: String = row.get(11)?;
    let categories: Vec<Category> = serde_json::from_str(&categories)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("invalid category data: {}", e)))?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        display_name: row.get(3)?,
        bio: row.get(4)?,
        currency: row.get(5)?,
        monthly_income: numeric(row.get_value(6)?)?,
        notifications: Notifications {
            spending_alerts: row.get::<i64>(7)? != 0,
            weekly_reports: row.get::<i64>(8)? != 0,
            bill_reminders: row.get::<i64>(9)? != 0,
        },
        security: Security {
            two_factor_enabled: row.get::<i64>(10)? != 0,
        },
        categories,
        created_at: from_timestamp(row.get(12)?)?,
        updated_at: from_timestamp(row.get(13)?)?,
    })
}

pub fn encode_categories(categories: &[Category]) -> ApiResult<String> {
    serde_json::to_string(categories)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to encode categories: {}", e)))
}

async fn find_user_where(db: &Db, column: &str, value: &str) -> ApiResult<Option<User>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?"),
            [value],
        )
        .await?;

    match rows.next().await? {
        Some(row) => extract_user_from_row(row).map(Some),
        None => Ok(None),
    }
}

pub async fn find_user_by_id(db: &Db, id: &str) -> ApiResult<Option<User>> {
    find_user_where(db, "id", id).await
}

pub async fn find_user_by_email(db: &Db, email: &str) -> ApiResult<Option<User>> {
    find_user_where(db, "email", email).await
}

fn user_values(user: &User) -> ApiResult<Vec<Value>> {
    Ok(vec![
        Value::Text(user.id.clone()),
        Value::Text(user.email.clone()),
        Value::Text(user.password_hash.clone()),
        Value::Text(user.display_name.clone()),
        Value::Text(user.bio.clone()),
        Value::Text(user.currency.clone()),
        Value::Real(user.monthly_income),
        Value::Integer(user.notifications.spending_alerts as i64),
        Value::Integer(user.notifications.weekly_reports as i64),
        Value::Integer(user.notifications.bill_reminders as i64),
        Value::Integer(user.security.two_factor_enabled as i64),
        Value::Text(encode_categories(&user.categories)?),
        Value::Integer(user.created_at.unix_timestamp()),
        Value::Integer(user.updated_at.unix_timestamp()),
    ])
}

pub async fn insert_user(db: &Db, user: &User) -> ApiResult<()> {
    let values = user_values(user)?;
    let conn = db.write().await;
    conn.execute(
        &format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ),
        Params::Positional(values),
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::bad_request(ERR_USER_EXISTS)
        } else {
            ApiError::Database(e)
        }
    })?;
    Ok(())
}

/// Overwrites every mutable column of an existing user.
pub async fn save_user(db: &Db, user: &User) -> ApiResult<()> {
    let values = vec![
        Value::Text(user.email.clone()),
        Value::Text(user.password_hash.clone()),
        Value::Text(user.display_name.clone()),
        Value::Text(user.bio.clone()),
        Value::Text(user.currency.clone()),
        Value::Real(user.monthly_income),
        Value::Integer(user.notifications.spending_alerts as i64),
        Value::Integer(user.notifications.weekly_reports as i64),
        Value::Integer(user.notifications.bill_reminders as i64),
        Value::Integer(user.security.two_factor_enabled as i64),
        Value::Text(encode_categories(&user.categories)?),
        Value::Integer(user.updated_at.unix_timestamp()),
        Value::Text(user.id.clone()),
    ];

    let conn = db.write().await;
    let affected = conn
        .execute(
            "UPDATE users SET email = ?, password_hash = ?, display_name = ?, bio = ?, currency = ?, \
             monthly_income = ?, spending_alerts = ?, weekly_reports = ?, bill_reminders = ?, \
             two_factor_enabled = ?, categories = ?, updated_at = ? WHERE id = ?",
            Params::Positional(values),
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::bad_request("Email already in use")
            } else {
                ApiError::Database(e)
            }
        })?;

    if affected == 0 {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(())
}

/// Applies the provided profile fields, merging the notification and
/// security sub-objects into their current values.
pub fn apply_profile_update(user: &mut User, update: ProfileUpdate) -> ApiResult<()> {
    if let Some(display_name) = update.display_name {
        validate_string_length(&display_name, "Display name", MAX_TEXT_LENGTH)?;
        user.display_name = display_name.trim().to_string();
    }
    if let Some(email) = update.email {
        validate_string_length(&email, "Email", MAX_TEXT_LENGTH)?;
        user.email = normalize_email(&email);
    }
    if let Some(bio) = update.bio {
        if bio.len() > MAX_BIO_LENGTH {
            return Err(ApiError::bad_request(format!(
                "Bio must be less than {} characters",
                MAX_BIO_LENGTH
            )));
        }
        user.bio = bio;
    }
    if let Some(currency) = update.currency {
        validate_string_length(&currency, "Currency", MAX_TEXT_LENGTH)?;
        user.currency = currency.trim().to_string();
    }
    if let Some(income) = update.monthly_income {
        user.monthly_income = validate_amount(income, "Monthly income")?;
    }
    if let Some(patch) = update.notifications {
        let current = &mut user.notifications;
        current.spending_alerts = patch.spending_alerts.unwrap_or(current.spending_alerts);
        current.weekly_reports = patch.weekly_reports.unwrap_or(current.weekly_reports);
        current.bill_reminders = patch.bill_reminders.unwrap_or(current.bill_reminders);
    }
    if let Some(enabled) = update.security.and_then(|s| s.two_factor_enabled) {
        user.security.two_factor_enabled = enabled;
    }
    Ok(())
}

pub async fn get_profile(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let Json(update) = payload?;
    apply_profile_update(&mut user, update)?;
    user.updated_at = now();

    save_user(&state.db, &user).await?;
    Ok(Json(user))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    payload: Result<Json<PasswordChange>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(payload) = payload?;
    let (Some(current), Some(new)) = (payload.current_password, payload.new_password) else {
        return Err(ApiError::bad_request(
            "Please provide both current and new passwords",
        ));
    };

    if !verify_password(&current, &user.password_hash)? {
        return Err(ApiError::bad_request("Invalid current password"));
    }
    validate_password(&new)?;

    user.password_hash = hash_password(&new)?;
    user.updated_at = now();
    save_user(&state.db, &user).await?;

    tracing::info!(user_id = %user.id, "password changed");
    Ok(Json(MessageResponse::new("Password updated successfully")))
}

/// Removes the account; owned expenses, budgets and subscriptions go with it.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<MessageResponse>> {
    let conn = state.db.write().await;
    conn.execute("DELETE FROM users WHERE id = ?", [user.id.as_str()]).await?;

    tracing::info!(user_id = %user.id, "account deleted");
    Ok(Json(MessageResponse::new("Account deleted")))
}
