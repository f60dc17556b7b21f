use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use libsql::{Value, params::Params};
use uuid::Uuid;

use crate::AppState;
use crate::constants::{DEFAULT_BUDGET_COLOR, MAX_TEXT_LENGTH};
use crate::database::{Db, is_unique_violation};
use crate::error::{ApiError, ApiResult};
use crate::models::{Budget, BudgetPayload, MessageResponse, User};
use crate::utils::{
    from_timestamp, now, numeric, require_amount, require_text, validate_amount,
    validate_string_length,
};

// `spent` is the sum of the owner's expenses in the budget's category.
const BUDGET_SELECT: &str = "SELECT b.id, b.user_id, b.category, b.budget_limit, \
     COALESCE((SELECT SUM(e.amount) FROM expenses e \
               WHERE e.user_id = b.user_id AND e.category = b.category), 0.0), \
     b.color, b.created_at, b.updated_at FROM budgets b";

pub fn extract_budget_from_row(row: libsql::Row) -> ApiResult<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: row.get(2)?,
        limit: numeric(row.get_value(3)?)?,
        spent: numeric(row.get_value(4)?)?,
        color: row.get(5)?,
        created_at: from_timestamp(row.get(6)?)?,
        updated_at: from_timestamp(row.get(7)?)?,
    })
}

fn duplicate_category(category: &str) -> ApiError {
    ApiError::bad_request(format!("A budget for category {} already exists", category))
}

pub async fn query_budgets(db: &Db, user_id: &str) -> ApiResult<Vec<Budget>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            &format!("{BUDGET_SELECT} WHERE b.user_id = ? ORDER BY b.created_at ASC"),
            [user_id],
        )
        .await?;

    let mut budgets = Vec::new();
    while let Some(row) = rows.next().await? {
        budgets.push(extract_budget_from_row(row)?);
    }
    Ok(budgets)
}

async fn find_budget(db: &Db, user_id: &str, budget_id: &str) -> ApiResult<Option<Budget>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            &format!("{BUDGET_SELECT} WHERE b.id = ? AND b.user_id = ?"),
            [budget_id, user_id],
        )
        .await?;

    match rows.next().await? {
        Some(row) => extract_budget_from_row(row).map(Some),
        None => Ok(None),
    }
}

pub async fn list_budgets(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Vec<Budget>>> {
    Ok(Json(query_budgets(&state.db, &user.id).await?))
}

pub async fn create_budget(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<BudgetPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Budget>)> {
    let Json(payload) = payload?;
    let category = require_text(payload.category, "Category", MAX_TEXT_LENGTH)?;
    let limit = require_amount(payload.limit, "Limit")?;
    let color = payload
        .color
        .unwrap_or_else(|| DEFAULT_BUDGET_COLOR.to_string());

    let id = Uuid::new_v4().to_string();
    let created = now().unix_timestamp();
    {
        let conn = state.db.write().await;
        conn.execute(
            "INSERT INTO budgets (id, user_id, category, budget_limit, color, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            Params::Positional(vec![
                Value::Text(id.clone()),
                Value::Text(user.id.clone()),
                Value::Text(category.clone()),
                Value::Real(limit),
                Value::Text(color),
                Value::Integer(created),
                Value::Integer(created),
            ]),
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_category(&category)
            } else {
                ApiError::Database(e)
            }
        })?;
    }

    let budget = find_budget(&state.db, &user.id, &id)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("budget {id} vanished after insert")))?;
    Ok((StatusCode::CREATED, Json(budget)))
}

/// Replaces whichever of category, limit and color are present.
pub async fn update_budget(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(budget_id): Path<String>,
    payload: Result<Json<BudgetPayload>, JsonRejection>,
) -> ApiResult<Json<Budget>> {
    let Json(payload) = payload?;
    let mut budget = find_budget(&state.db, &user.id, &budget_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Budget not found"))?;

    if let Some(category) = payload.category {
        validate_string_length(&category, "Category", MAX_TEXT_LENGTH)?;
        budget.category = category.trim().to_string();
    }
    if let Some(limit) = payload.limit {
        budget.limit = validate_amount(limit, "Limit")?;
    }
    if let Some(color) = payload.color {
        budget.color = color;
    }

    {
        let conn = state.db.write().await;
        let affected = conn
            .execute(
                "UPDATE budgets SET category = ?, budget_limit = ?, color = ?, updated_at = ? \
                 WHERE id = ? AND user_id = ?",
                Params::Positional(vec![
                    Value::Text(budget.category.clone()),
                    Value::Real(budget.limit),
                    Value::Text(budget.color.clone()),
                    Value::Integer(now().unix_timestamp()),
                    Value::Text(budget.id.clone()),
                    Value::Text(user.id.clone()),
                ]),
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    duplicate_category(&budget.category)
                } else {
                    ApiError::Database(e)
                }
            })?;

        if affected == 0 {
            return Err(ApiError::not_found("Budget not found"));
        }
    }

    // Re-read so `spent` reflects a changed category.
    let budget = find_budget(&state.db, &user.id, &budget_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Budget not found"))?;
    Ok(Json(budget))
}

pub async fn delete_budget(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(budget_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let conn = state.db.write().await;
    let affected = conn
        .execute(
            "DELETE FROM budgets WHERE id = ? AND user_id = ?",
            [budget_id.as_str(), user.id.as_str()],
        )
        .await?;

    if affected == 0 {
        return Err(ApiError::not_found("Budget not found"));
    }
    Ok(Json(MessageResponse::new("Budget deleted")))
}
