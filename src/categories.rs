use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use uuid::Uuid;

use crate::AppState;
use crate::constants::{DEFAULT_CATEGORY_COLOR, DEFAULT_CATEGORY_ICON, MAX_TEXT_LENGTH};
use crate::database::Db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Category, CategoryPayload, User};
use crate::user::encode_categories;
use crate::utils::{now, require_text, validate_string_length};

pub fn validate_category_name(name: &str) -> ApiResult<()> {
    validate_string_length(name, "Category name", MAX_TEXT_LENGTH)
}

/// Builds a category with a fresh id from a create payload.
pub fn new_category(payload: CategoryPayload) -> ApiResult<Category> {
    let name = require_text(payload.name, "Category name", MAX_TEXT_LENGTH)?;
    let kind = payload
        .kind
        .ok_or_else(|| ApiError::bad_request("Category type is required"))?;

    Ok(Category {
        id: Uuid::new_v4().to_string(),
        name,
        kind,
        icon: payload
            .icon
            .unwrap_or_else(|| DEFAULT_CATEGORY_ICON.to_string()),
        color: payload
            .color
            .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
        is_default: payload.is_default.unwrap_or(false),
    })
}

pub fn apply_category_patch(category: &mut Category, payload: CategoryPayload) -> ApiResult<()> {
    if let Some(name) = payload.name {
        validate_category_name(&name)?;
        category.name = name.trim().to_string();
    }
    if let Some(kind) = payload.kind {
        category.kind = kind;
    }
    if let Some(icon) = payload.icon {
        category.icon = icon;
    }
    if let Some(color) = payload.color {
        category.color = color;
    }
    if let Some(is_default) = payload.is_default {
        category.is_default = is_default;
    }
    Ok(())
}

fn position_of(categories: &[Category], id: &str) -> ApiResult<usize> {
    categories
        .iter()
        .position(|category| category.id == id)
        .ok_or_else(|| ApiError::not_found("Category not found"))
}

/// Persists the embedded category list of a user.
pub async fn save_categories(db: &Db, user_id: &str, categories: &[Category]) -> ApiResult<()> {
    let encoded = encode_categories(categories)?;
    let conn = db.write().await;
    let affected = conn
        .execute(
            "UPDATE users SET categories = ?, updated_at = ? WHERE id = ?",
            (encoded, now().unix_timestamp(), user_id),
        )
        .await?;

    if affected == 0 {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(())
}

pub async fn add_category(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    payload: Result<Json<CategoryPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Vec<Category>>)> {
    let Json(payload) = payload?;
    let category = new_category(payload)?;
    user.categories.push(category);

    save_categories(&state.db, &user.id, &user.categories).await?;
    Ok((StatusCode::CREATED, Json(user.categories)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Path(category_id): Path<String>,
    payload: Result<Json<CategoryPayload>, JsonRejection>,
) -> ApiResult<Json<Vec<Category>>> {
    let Json(payload) = payload?;
    let index = position_of(&user.categories, &category_id)?;
    apply_category_patch(&mut user.categories[index], payload)?;

    save_categories(&state.db, &user.id, &user.categories).await?;
    Ok(Json(user.categories))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Path(category_id): Path<String>,
) -> ApiResult<Json<Vec<Category>>> {
    let index = position_of(&user.categories, &category_id)?;
    user.categories.remove(index);

    save_categories(&state.db, &user.id, &user.categories).await?;
    Ok(Json(user.categories))
}
