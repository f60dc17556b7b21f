use anyhow::Result;
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

use crate::config::BudgetCategoryScope;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                 TEXT    PRIMARY KEY,
    email              TEXT    UNIQUE NOT NULL,
    password_hash      TEXT    NOT NULL,
    display_name       TEXT    NOT NULL,
    bio                TEXT    NOT NULL,
    currency           TEXT    NOT NULL,
    monthly_income     REAL    NOT NULL,
    spending_alerts    INTEGER NOT NULL DEFAULT 1,
    weekly_reports     INTEGER NOT NULL DEFAULT 0,
    bill_reminders     INTEGER NOT NULL DEFAULT 1,
    two_factor_enabled INTEGER NOT NULL DEFAULT 0,
    categories         TEXT    NOT NULL DEFAULT '[]',
    created_at         INTEGER NOT NULL,
    updated_at         INTEGER NOT NULL
);
"#;

const CREATE_EXPENSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS expenses (
    id          TEXT    PRIMARY KEY,
    user_id     TEXT    NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    amount      REAL    NOT NULL,
    category    TEXT    NOT NULL,
    description TEXT    NOT NULL,
    date        INTEGER NOT NULL,
    receipt     TEXT,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
"#;

const CREATE_EXPENSES_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS expenses_user_date ON expenses(user_id, date);";

const CREATE_BUDGETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS budgets (
    id          TEXT    PRIMARY KEY,
    user_id     TEXT    NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    category    TEXT    NOT NULL,
    budget_limit REAL   NOT NULL,
    color       TEXT    NOT NULL,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
"#;

const CREATE_SUBSCRIPTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    id            TEXT    PRIMARY KEY,
    user_id       TEXT    NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    service_name  TEXT    NOT NULL,
    amount        REAL    NOT NULL,
    currency      TEXT    NOT NULL,
    billing_cycle TEXT    NOT NULL,
    next_due_date INTEGER NOT NULL,
    category      TEXT    NOT NULL,
    status        TEXT    NOT NULL,
    icon          TEXT    NOT NULL,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
);
"#;

const GLOBAL_BUDGET_INDEX: &str = "budgets_category_global";
const PER_USER_BUDGET_INDEX: &str = "budgets_category_per_user";

pub type Db = Arc<RwLock<Connection>>;

/// Opens (creating if needed) `expenses.db` under `data_dir` and applies the schema.
pub async fn init_db(data_dir: &str, budget_scope: BudgetCategoryScope) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join("expenses.db");
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute("PRAGMA foreign_keys = ON", ()).await?;
    conn.execute(CREATE_USERS_TABLE, ()).await?;
    conn.execute(CREATE_EXPENSES_TABLE, ()).await?;
    conn.execute(CREATE_EXPENSES_INDEX, ()).await?;
    conn.execute(CREATE_BUDGETS_TABLE, ()).await?;
    conn.execute(CREATE_SUBSCRIPTIONS_TABLE, ()).await?;
    apply_budget_scope(&conn, budget_scope).await?;

    tracing::debug!(data_dir, ?budget_scope, "database schema ready");
    Ok(Arc::new(RwLock::new(conn)))
}

async fn apply_budget_scope(conn: &Connection, scope: BudgetCategoryScope) -> Result<()> {
    let (keep, drop, columns) = match scope {
        BudgetCategoryScope::Global => (GLOBAL_BUDGET_INDEX, PER_USER_BUDGET_INDEX, "category"),
        BudgetCategoryScope::PerUser => {
            (PER_USER_BUDGET_INDEX, GLOBAL_BUDGET_INDEX, "user_id, category")
        }
    };

    conn.execute(&format!("DROP INDEX IF EXISTS {drop}"), ()).await?;
    conn.execute(
        &format!("CREATE UNIQUE INDEX IF NOT EXISTS {keep} ON budgets({columns})"),
        (),
    )
    .await?;
    Ok(())
}

/// True when the error came from a UNIQUE constraint.
pub fn is_unique_violation(err: &libsql::Error) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}
