use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use libsql::{Connection, Value, params::Params};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::AppState;
use crate::constants::{
    DEFAULT_CURRENCY, DEFAULT_SUBSCRIPTION_CATEGORY, ERR_INVALID_UPDATES, MAX_TEXT_LENGTH,
};
use crate::database::Db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Subscription, SubscriptionPayload, User};
use crate::utils::{
    from_timestamp, now, numeric, parse_date, require_amount, require_text, validate_amount,
    validate_string_length,
};

/// Keys a partial update may carry.
pub const ALLOWED_UPDATES: [&str; 8] = [
    "serviceName",
    "amount",
    "currency",
    "billingCycle",
    "nextDueDate",
    "category",
    "status",
    "icon",
];

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, service_name, amount, currency, billing_cycle, \
     next_due_date, category, status, icon, created_at, updated_at";

pub fn extract_subscription_from_row(row: libsql::Row) -> ApiResult<Subscription> {
    let billing_cycle: String = row.get(5)?;
    let status: String = row.get(8)?;

    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        service_name: row.get(2)?,
        amount: numeric(row.get_value(3)?)?,
        currency: row.get(4)?,
        billing_cycle: billing_cycle
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored billing cycle: {}", e)))?,
        next_due_date: from_timestamp(row.get(6)?)?,
        category: row.get(7)?,
        status: status
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored status: {}", e)))?,
        icon: row.get(9)?,
        created_at: from_timestamp(row.get(10)?)?,
        updated_at: from_timestamp(row.get(11)?)?,
    })
}

fn subscription_values(subscription: &Subscription) -> Vec<Value> {
    vec![
        Value::Text(subscription.id.clone()),
        Value::Text(subscription.user_id.clone()),
        Value::Text(subscription.service_name.clone()),
        Value::Real(subscription.amount),
        Value::Text(subscription.currency.clone()),
        Value::Text(subscription.billing_cycle.as_str().to_string()),
        Value::Integer(subscription.next_due_date.unix_timestamp()),
        Value::Text(subscription.category.clone()),
        Value::Text(subscription.status.as_str().to_string()),
        Value::Text(subscription.icon.clone()),
        Value::Integer(subscription.created_at.unix_timestamp()),
        Value::Integer(subscription.updated_at.unix_timestamp()),
    ]
}

/// Rejects any key outside [`ALLOWED_UPDATES`].
pub fn check_update_keys(update: &Map<String, JsonValue>) -> ApiResult<()> {
    if update
        .keys()
        .all(|key| ALLOWED_UPDATES.contains(&key.as_str()))
    {
        Ok(())
    } else {
        Err(ApiError::bad_request(ERR_INVALID_UPDATES))
    }
}

/// Builds a subscription for `user_id`, applying defaults to omitted fields.
pub fn new_subscription(user_id: &str, payload: SubscriptionPayload) -> ApiResult<Subscription> {
    let service_name = require_text(payload.service_name, "Service name", MAX_TEXT_LENGTH)?;
    let amount = require_amount(payload.amount, "Amount")?;
    let next_due_date = match payload.next_due_date {
        Some(date) => parse_date(&date)?,
        None => return Err(ApiError::bad_request("Next due date is required")),
    };
    let created = now();

    Ok(Subscription {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        service_name,
        amount,
        currency: payload
            .currency
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        billing_cycle: payload.billing_cycle.unwrap_or_default(),
        next_due_date,
        category: payload
            .category
            .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_CATEGORY.to_string()),
        status: payload.status.unwrap_or_default(),
        icon: payload.icon.unwrap_or_default(),
        created_at: created,
        updated_at: created,
    })
}

pub fn apply_subscription_patch(
    subscription: &mut Subscription,
    patch: SubscriptionPayload,
) -> ApiResult<()> {
    if let Some(name) = patch.service_name {
        validate_string_length(&name, "Service name", MAX_TEXT_LENGTH)?;
        subscription.service_name = name.trim().to_string();
    }
    if let Some(amount) = patch.amount {
        subscription.amount = validate_amount(amount, "Amount")?;
    }
    if let Some(currency) = patch.currency {
        subscription.currency = currency;
    }
    if let Some(cycle) = patch.billing_cycle {
        subscription.billing_cycle = cycle;
    }
    if let Some(date) = patch.next_due_date {
        subscription.next_due_date = parse_date(&date)?;
    }
    if let Some(category) = patch.category {
        subscription.category = category;
    }
    if let Some(status) = patch.status {
        subscription.status = status;
    }
    if let Some(icon) = patch.icon {
        subscription.icon = icon;
    }
    Ok(())
}

/// Lists a user's subscriptions, soonest due first.
pub async fn query_subscriptions(db: &Db, user_id: &str) -> ApiResult<Vec<Subscription>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            &format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ? \
                 ORDER BY next_due_date ASC"
            ),
            [user_id],
        )
        .await?;

    let mut subscriptions = Vec::new();
    while let Some(row) = rows.next().await? {
        subscriptions.push(extract_subscription_from_row(row)?);
    }
    Ok(subscriptions)
}

async fn find_subscription(
    conn: &Connection,
    user_id: &str,
    subscription_id: &str,
) -> ApiResult<Option<Subscription>> {
    let mut rows = conn
        .query(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ? AND user_id = ?"),
            [subscription_id, user_id],
        )
        .await?;

    match rows.next().await? {
        Some(row) => extract_subscription_from_row(row).map(Some),
        None => Ok(None),
    }
}

fn not_found() -> ApiError {
    ApiError::not_found("Subscription not found")
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Vec<Subscription>>> {
    Ok(Json(query_subscriptions(&state.db, &user.id).await?))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<SubscriptionPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    let Json(payload) = payload?;
    let subscription = new_subscription(&user.id, payload)?;

    let conn = state.db.write().await;
    conn.execute(
        &format!(
            "INSERT INTO subscriptions ({SUBSCRIPTION_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ),
        Params::Positional(subscription_values(&subscription)),
    )
    .await?;

    tracing::debug!(user_id = %user.id, subscription_id = %subscription.id, "subscription created");
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(subscription_id): Path<String>,
    payload: Result<Json<Map<String, JsonValue>>, JsonRejection>,
) -> ApiResult<Json<Subscription>> {
    let Json(update) = payload?;
    check_update_keys(&update)?;
    let patch: SubscriptionPayload = serde_json::from_value(JsonValue::Object(update))
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let conn = state.db.write().await;
    let mut subscription = find_subscription(&conn, &user.id, &subscription_id)
        .await?
        .ok_or_else(not_found)?;

    apply_subscription_patch(&mut subscription, patch)?;
    subscription.updated_at = now();

    let values = vec![
        Value::Text(subscription.service_name.clone()),
        Value::Real(subscription.amount),
        Value::Text(subscription.currency.clone()),
        Value::Text(subscription.billing_cycle.as_str().to_string()),
        Value::Integer(subscription.next_due_date.unix_timestamp()),
        Value::Text(subscription.category.clone()),
        Value::Text(subscription.status.as_str().to_string()),
        Value::Text(subscription.icon.clone()),
        Value::Integer(subscription.updated_at.unix_timestamp()),
        Value::Text(subscription.id.clone()),
        Value::Text(user.id.clone()),
    ];

    conn.execute(
        "UPDATE subscriptions SET service_name = ?, amount = ?, currency = ?, billing_cycle = ?, \
         next_due_date = ?, category = ?, status = ?, icon = ?, updated_at = ? \
         WHERE id = ? AND user_id = ?",
        Params::Positional(values),
    )
    .await?;

    Ok(Json(subscription))
}

/// Removes the subscription and returns it as it was.
pub async fn delete_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    let conn = state.db.write().await;
    let subscription = find_subscription(&conn, &user.id, &subscription_id)
        .await?
        .ok_or_else(not_found)?;

    conn.execute(
        "DELETE FROM subscriptions WHERE id = ? AND user_id = ?",
        [subscription_id.as_str(), user.id.as_str()],
    )
    .await?;

    Ok(Json(subscription))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingCycle, SubscriptionStatus};
    use serde_json::json;

    fn payload() -> SubscriptionPayload {
        SubscriptionPayload {
            service_name: Some(" Netflix ".to_string()),
            amount: Some(649.0),
            next_due_date: Some("2025-01-15".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_omitted_fields() {
        let subscription = new_subscription("u1", payload()).unwrap();
        assert_eq!(subscription.service_name, "Netflix");
        assert_eq!(subscription.currency, "INR");
        assert_eq!(subscription.billing_cycle, BillingCycle::Monthly);
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.category, "Other");
        assert_eq!(subscription.icon, "");
    }

    #[test]
    fn due_date_is_required() {
        let err = new_subscription(
            "u1",
            SubscriptionPayload {
                next_due_date: None,
                ..payload()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Next due date is required");
    }

    #[test]
    fn unknown_update_keys_are_rejected() {
        let update = json!({"status": "Cancelled", "user": "someone-else"});
        let err = check_update_keys(update.as_object().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), ERR_INVALID_UPDATES);

        let update = json!({"status": "Cancelled", "amount": 10.0});
        assert!(check_update_keys(update.as_object().unwrap()).is_ok());
    }

    #[test]
    fn patch_changes_only_given_fields() {
        let mut subscription = new_subscription("u1", payload()).unwrap();
        apply_subscription_patch(
            &mut subscription,
            SubscriptionPayload {
                status: Some(SubscriptionStatus::Cancelled),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(subscription.status, SubscriptionStatus::Cancelled);
        assert_eq!(subscription.amount, 649.0);
        assert_eq!(subscription.service_name, "Netflix");
    }
}
