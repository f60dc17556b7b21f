use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::AppState;
use crate::budgets::query_budgets;
use crate::error::ApiResult;
use crate::expenses::{ExpenseSort, query_expenses};
use crate::models::{BillingCycle, Budget, Expense, Subscription, User};
use crate::subscriptions::query_subscriptions;
use crate::utils::now;

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// What a subscription costs per month; yearly plans are spread over 12 months.
pub fn monthly_cost(subscription: &Subscription) -> f64 {
    match subscription.billing_cycle {
        BillingCycle::Monthly => subscription.amount,
        BillingCycle::Yearly => subscription.amount / 12.0,
    }
}

pub fn total_monthly_cost(subscriptions: &[Subscription]) -> f64 {
    round_cents(subscriptions.iter().map(monthly_cost).sum())
}

/// Share of `limit` consumed by `spent`, as a percentage capped at 100.
pub fn percent_used(spent: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return 0.0;
    }
    round_cents((spent / limit * 100.0).min(100.0))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUsage {
    pub id: String,
    pub category: String,
    pub limit: f64,
    pub spent: f64,
    pub remaining: f64,
    pub percent_used: f64,
    pub color: String,
}

pub fn budget_usage(budget: &Budget) -> BudgetUsage {
    BudgetUsage {
        id: budget.id.clone(),
        category: budget.category.clone(),
        limit: budget.limit,
        spent: round_cents(budget.spent),
        remaining: round_cents(budget.limit - budget.spent),
        percent_used: percent_used(budget.spent, budget.limit),
        color: budget.color.clone(),
    }
}

pub fn total_spending(expenses: &[Expense]) -> f64 {
    round_cents(expenses.iter().map(|e| e.amount).sum())
}

pub fn spending_in_month(expenses: &[Expense], year: i32, month: Month) -> f64 {
    round_cents(
        expenses
            .iter()
            .filter(|e| e.date.year() == year && e.date.month() == month)
            .map(|e| e.amount)
            .sum(),
    )
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_spending: f64,
    pub monthly_spending: f64,
    pub total_budget: f64,
    pub total_spent: f64,
    pub budget_percent_used: f64,
    pub budgets: Vec<BudgetUsage>,
    pub subscriptions_monthly: f64,
    pub subscriptions_yearly: f64,
    pub monthly_income: f64,
    pub net_savings: f64,
}

/// Aggregates a user's records; `today` selects the month for `monthly_spending`.
pub fn summarize(
    user: &User,
    expenses: &[Expense],
    budgets: &[Budget],
    subscriptions: &[Subscription],
    today: Date,
) -> ReportSummary {
    let total_spending = total_spending(expenses);
    let total_budget = round_cents(budgets.iter().map(|b| b.limit).sum());
    let total_spent = round_cents(budgets.iter().map(|b| b.spent).sum());
    let subscriptions_monthly = total_monthly_cost(subscriptions);

    ReportSummary {
        total_spending,
        monthly_spending: spending_in_month(expenses, today.year(), today.month()),
        total_budget,
        total_spent,
        budget_percent_used: percent_used(total_spent, total_budget),
        budgets: budgets.iter().map(budget_usage).collect(),
        subscriptions_monthly,
        subscriptions_yearly: round_cents(subscriptions_monthly * 12.0),
        monthly_income: user.monthly_income,
        net_savings: round_cents(user.monthly_income - total_spending),
    }
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<ReportSummary>> {
    let expenses = query_expenses(&state.db, &user.id, None, ExpenseSort::Newest).await?;
    let budgets = query_budgets(&state.db, &user.id).await?;
    let subscriptions = query_subscriptions(&state.db, &user.id).await?;

    Ok(Json(summarize(
        &user,
        &expenses,
        &budgets,
        &subscriptions,
        now().date(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Notifications, Security, SubscriptionStatus};
    use time::{OffsetDateTime, macros::datetime};

    fn subscription(amount: f64, billing_cycle: BillingCycle) -> Subscription {
        Subscription {
            id: "s".to_string(),
            user_id: "u".to_string(),
            service_name: "Service".to_string(),
            amount,
            currency: "INR".to_string(),
            billing_cycle,
            next_due_date: OffsetDateTime::UNIX_EPOCH,
            category: "Other".to_string(),
            status: SubscriptionStatus::Active,
            icon: String::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn expense(amount: f64, date: OffsetDateTime) -> Expense {
        Expense {
            id: "e".to_string(),
            user_id: "u".to_string(),
            amount,
            category: "Food & Dining".to_string(),
            description: "Lunch".to_string(),
            date,
            receipt: None,
            created_at: date,
            updated_at: date,
        }
    }

    fn budget(limit: f64, spent: f64) -> Budget {
        Budget {
            id: "b".to_string(),
            user_id: "u".to_string(),
            category: "Food & Dining".to_string(),
            limit,
            spent,
            color: "bg-green-500".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn yearly_plans_are_spread_over_twelve_months() {
        assert_eq!(monthly_cost(&subscription(1200.0, BillingCycle::Yearly)), 100.0);
        assert_eq!(monthly_cost(&subscription(199.0, BillingCycle::Monthly)), 199.0);
    }

    #[test]
    fn monthly_total_rounds_to_cents() {
        let subs = vec![
            subscription(1000.0, BillingCycle::Yearly),
            subscription(10.0, BillingCycle::Monthly),
        ];
        assert_eq!(total_monthly_cost(&subs), 93.33);
    }

    #[test]
    fn percent_used_is_capped_and_guarded() {
        assert_eq!(percent_used(50.0, 200.0), 25.0);
        assert_eq!(percent_used(500.0, 200.0), 100.0);
        assert_eq!(percent_used(10.0, 0.0), 0.0);
    }

    #[test]
    fn month_filter_matches_year_and_month() {
        let expenses = vec![
            expense(10.0, datetime!(2024-03-01 00:00 UTC)),
            expense(20.0, datetime!(2024-03-31 23:59 UTC)),
            expense(40.0, datetime!(2023-03-15 12:00 UTC)),
            expense(80.0, datetime!(2024-04-01 00:00 UTC)),
        ];
        assert_eq!(spending_in_month(&expenses, 2024, Month::March), 30.0);
        assert_eq!(total_spending(&expenses), 150.0);
    }

    #[test]
    fn summary_combines_all_records() {
        let created = OffsetDateTime::UNIX_EPOCH;
        let user = User {
            id: "u".to_string(),
            email: "u@example.com".to_string(),
            password_hash: String::new(),
            display_name: "U".to_string(),
            bio: String::new(),
            currency: "INR".to_string(),
            monthly_income: 1000.0,
            notifications: Notifications::default(),
            security: Security::default(),
            categories: Vec::new(),
            created_at: created,
            updated_at: created,
        };
        let expenses = vec![
            expense(100.0, datetime!(2024-05-02 10:00 UTC)),
            expense(50.0, datetime!(2024-04-02 10:00 UTC)),
        ];
        let budgets = vec![budget(300.0, 150.0)];
        let subs = vec![subscription(1200.0, BillingCycle::Yearly)];

        let report = summarize(
            &user,
            &expenses,
            &budgets,
            &subs,
            datetime!(2024-05-20 00:00 UTC).date(),
        );

        assert_eq!(report.total_spending, 150.0);
        assert_eq!(report.monthly_spending, 100.0);
        assert_eq!(report.total_budget, 300.0);
        assert_eq!(report.budget_percent_used, 50.0);
        assert_eq!(report.budgets[0].remaining, 150.0);
        assert_eq!(report.subscriptions_monthly, 100.0);
        assert_eq!(report.subscriptions_yearly, 1200.0);
        assert_eq!(report.net_savings, 850.0);
    }
}
