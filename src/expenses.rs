use axum::{
    Extension, Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    body::Bytes,
    http::{StatusCode, header::CONTENT_TYPE},
};
use libsql::{Value, params::Params};
use std::path::Path as FsPath;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppState;
use crate::constants::{ALL_CATEGORIES, MAX_TEXT_LENGTH, UPLOADS_ROUTE};
use crate::database::Db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Expense, ExpensePayload, ExpenseQuery, MessageResponse, User};
use crate::utils::{
    from_timestamp, now, numeric, optional_text, optional_value, parse_date, require_amount,
    require_text,
};

const EXPENSE_COLUMNS: &str =
    "id, user_id, amount, category, description, date, receipt, created_at, updated_at";

/// Orderings accepted by the `sort` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpenseSort {
    #[default]
    Newest,
    Oldest,
    Highest,
    Lowest,
}

impl ExpenseSort {
    /// Unrecognised values fall back to newest first.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("oldest") => ExpenseSort::Oldest,
            Some("highest") => ExpenseSort::Highest,
            Some("lowest") => ExpenseSort::Lowest,
            _ => ExpenseSort::Newest,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            ExpenseSort::Newest => "date DESC, created_at DESC",
            ExpenseSort::Oldest => "date ASC, created_at ASC",
            ExpenseSort::Highest => "amount DESC, date DESC",
            ExpenseSort::Lowest => "amount ASC, date DESC",
        }
    }
}

/// A validated expense ready to be stored.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub date: OffsetDateTime,
    pub receipt: Option<String>,
}

impl NewExpense {
    pub fn from_payload(payload: ExpensePayload, receipt: Option<String>) -> ApiResult<Self> {
        let amount = require_amount(payload.amount, "Amount")?;
        let category = require_text(payload.category, "Category", MAX_TEXT_LENGTH)?;
        let description = require_text(payload.description, "Description", MAX_TEXT_LENGTH)?;
        let date = match payload.date.as_deref().map(str::trim) {
            Some(date) if !date.is_empty() => parse_date(date)?,
            _ => now(),
        };

        Ok(Self {
            amount,
            category,
            description,
            date,
            receipt,
        })
    }
}

pub fn extract_expense_from_row(row: libsql::Row) -> ApiResult<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: numeric(row.get_value(2)?)?,
        category: row.get(3)?,
        description: row.get(4)?,
        date: from_timestamp(row.get(5)?)?,
        receipt: optional_text(row.get_value(6)?),
        created_at: from_timestamp(row.get(7)?)?,
        updated_at: from_timestamp(row.get(8)?)?,
    })
}

/// Lists a user's expenses, optionally restricted to one exact category.
pub async fn query_expenses(
    db: &Db,
    user_id: &str,
    category: Option<&str>,
    sort: ExpenseSort,
) -> ApiResult<Vec<Expense>> {
    let category = category
        .map(str::trim)
        .filter(|c| !c.is_empty() && *c != ALL_CATEGORIES);

    let conn = db.read().await;
    let mut rows = match category {
        Some(category) => {
            conn.query(
                &format!(
                    "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = ? AND category = ? ORDER BY {}",
                    sort.order_by()
                ),
                [user_id, category],
            )
            .await?
        }
        None => {
            conn.query(
                &format!(
                    "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = ? ORDER BY {}",
                    sort.order_by()
                ),
                [user_id],
            )
            .await?
        }
    };

    let mut expenses = Vec::new();
    while let Some(row) = rows.next().await? {
        expenses.push(extract_expense_from_row(row)?);
    }
    Ok(expenses)
}

pub async fn insert_expense(db: &Db, user_id: &str, expense: NewExpense) -> ApiResult<Expense> {
    let created = now();
    let expense = Expense {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        amount: expense.amount,
        category: expense.category,
        description: expense.description,
        date: expense.date,
        receipt: expense.receipt,
        created_at: created,
        updated_at: created,
    };

    let conn = db.write().await;
    conn.execute(
        &format!("INSERT INTO expenses ({EXPENSE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        Params::Positional(vec![
            Value::Text(expense.id.clone()),
            Value::Text(expense.user_id.clone()),
            Value::Real(expense.amount),
            Value::Text(expense.category.clone()),
            Value::Text(expense.description.clone()),
            Value::Integer(expense.date.unix_timestamp()),
            optional_value(expense.receipt.clone()),
            Value::Integer(created.unix_timestamp()),
            Value::Integer(created.unix_timestamp()),
        ]),
    )
    .await?;

    Ok(expense)
}

/// Keeps only characters that are safe in a file name.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "receipt".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Writes the receipt under `upload_dir` and returns the public relative path.
pub async fn store_receipt(
    upload_dir: &FsPath,
    original_name: &str,
    bytes: &[u8],
) -> ApiResult<String> {
    let file_name = format!(
        "{}-{}",
        Uuid::new_v4().simple(),
        sanitize_file_name(original_name)
    );
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    tokio::fs::write(upload_dir.join(&file_name), bytes)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(format!(
        "{}/{}",
        UPLOADS_ROUTE.trim_start_matches('/'),
        file_name
    ))
}

/// A receipt held in memory until the rest of the form validates.
struct ReceiptUpload {
    file_name: String,
    bytes: Bytes,
}

/// Best-effort cleanup of a receipt whose expense was never stored.
async fn remove_receipt(upload_dir: &FsPath, path: &str) {
    let Some(file_name) = path.rsplit('/').next() else {
        return;
    };
    if let Err(err) = tokio::fs::remove_file(upload_dir.join(file_name)).await {
        tracing::warn!(path, "failed to remove orphaned receipt: {err}");
    }
}

async fn read_multipart(
    mut multipart: Multipart,
) -> ApiResult<(ExpensePayload, Option<ReceiptUpload>)> {
    let mut payload = ExpensePayload::default();
    let mut receipt = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "receipt" => {
                let file_name = field.file_name().unwrap_or("receipt").to_string();
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    receipt = Some(ReceiptUpload { file_name, bytes });
                }
            }
            "amount" => {
                let text = field.text().await?;
                let amount = text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ApiError::bad_request("Amount must be a number"))?;
                payload.amount = Some(amount);
            }
            "category" => payload.category = Some(field.text().await?),
            "description" => payload.description = Some(field.text().await?),
            "date" => payload.date = Some(field.text().await?),
            _ => {}
        }
    }

    Ok((payload, receipt))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ExpenseQuery>,
) -> ApiResult<Json<Vec<Expense>>> {
    let sort = ExpenseSort::from_param(query.sort.as_deref());
    let expenses = query_expenses(&state.db, &user.id, query.category.as_deref(), sort).await?;
    Ok(Json(expenses))
}

/// Accepts a JSON body, or a multipart form when a receipt file is attached.
pub async fn create_expense(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    request: Request,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    let (payload, upload) = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state).await?;
        read_multipart(multipart).await?
    } else {
        let Json(payload) = Json::<ExpensePayload>::from_request(request, &state).await?;
        (payload, None)
    };

    let mut expense = NewExpense::from_payload(payload, None)?;
    if let Some(upload) = upload {
        let path = store_receipt(&state.upload_dir, &upload.file_name, &upload.bytes).await?;
        expense.receipt = Some(path);
    }

    let expense = match insert_expense(&state.db, &user.id, expense.clone()).await {
        Ok(expense) => expense,
        Err(err) => {
            if let Some(path) = &expense.receipt {
                remove_receipt(&state.upload_dir, path).await;
            }
            return Err(err);
        }
    };

    tracing::debug!(user_id = %user.id, expense_id = %expense.id, "expense created");
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(expense_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let conn = state.db.write().await;
    let affected = conn
        .execute(
            "DELETE FROM expenses WHERE id = ? AND user_id = ?",
            [expense_id.as_str(), user.id.as_str()],
        )
        .await?;

    if affected == 0 {
        return Err(ApiError::not_found("Expense not found"));
    }
    Ok(Json(MessageResponse::new("Expense deleted.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_param_falls_back_to_newest() {
        assert_eq!(ExpenseSort::from_param(None), ExpenseSort::Newest);
        assert_eq!(ExpenseSort::from_param(Some("bogus")), ExpenseSort::Newest);
        assert_eq!(ExpenseSort::from_param(Some("highest")), ExpenseSort::Highest);
        assert_eq!(ExpenseSort::from_param(Some("oldest")), ExpenseSort::Oldest);
        assert_eq!(ExpenseSort::from_param(Some("lowest")), ExpenseSort::Lowest);
    }

    #[test]
    fn payload_without_date_defaults_to_now() {
        let before = now();
        let expense = NewExpense::from_payload(
            ExpensePayload {
                amount: Some(12.0),
                category: Some("Transport".to_string()),
                description: Some("Bus".to_string()),
                date: None,
            },
            None,
        )
        .unwrap();
        assert!(expense.date >= before);
    }

    #[test]
    fn payload_requires_description() {
        let err = NewExpense::from_payload(
            ExpensePayload {
                amount: Some(12.0),
                category: Some("Transport".to_string()),
                ..Default::default()
            },
            None,
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_file_name("my receipt (1).png"), "myreceipt1.png");
        assert_eq!(sanitize_file_name("///"), "receipt");
    }

    #[tokio::test]
    async fn stored_receipt_lands_in_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_receipt(dir.path(), "scan.pdf", b"%PDF").await.unwrap();

        assert!(path.starts_with("uploads/"));
        assert!(path.ends_with("-scan.pdf"));
        let file_name = path.trim_start_matches("uploads/");
        let stored = tokio::fs::read(dir.path().join(file_name)).await.unwrap();
        assert_eq!(stored, b"%PDF");
    }

    #[tokio::test]
    async fn removed_receipt_leaves_upload_dir_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_receipt(dir.path(), "scan.pdf", b"%PDF").await.unwrap();

        remove_receipt(dir.path(), &path).await;
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
