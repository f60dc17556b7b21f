// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3001";
pub const DEFAULT_DATA_PATH: &str = "data";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_LOG_FILTER: &str = "expense_tracker_server=info,tower_http=info";
pub const API_PREFIX: &str = "/api";
pub const UPLOADS_ROUTE: &str = "/uploads";

// Token configuration
pub const TOKEN_EXPIRY_DAYS: i64 = 7;
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

// Request limits
pub const MAX_RECEIPT_BYTES: usize = 10 * 1024 * 1024;

// Validation limits
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_TEXT_LENGTH: usize = 255;
pub const MAX_BIO_LENGTH: usize = 1000;

// User defaults
pub const DEFAULT_BIO: &str =
    "Freelance designer and finance enthusiast tracking expenses for better saving habits.";
pub const DEFAULT_CURRENCY: &str = "INR";
pub const DEFAULT_MONTHLY_INCOME: f64 = 50_000.0;

// Entity defaults
pub const DEFAULT_CATEGORY_ICON: &str = "Circle";
pub const DEFAULT_CATEGORY_COLOR: &str = "bg-gray-500";
pub const DEFAULT_BUDGET_COLOR: &str = "bg-green-500";
pub const DEFAULT_SUBSCRIPTION_CATEGORY: &str = "Other";

/// Expense list filter value that means "no category filter".
pub const ALL_CATEGORIES: &str = "All Categories";

// Error messages
pub const ERR_INTERNAL: &str = "Internal server error";
pub const ERR_UNAUTHORIZED: &str = "Please authenticate";
pub const ERR_INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const ERR_MISSING_FIELDS: &str = "Please fill in all fields.";
pub const ERR_USER_EXISTS: &str = "User already exists";
pub const ERR_INVALID_UPDATES: &str = "Invalid updates!";
