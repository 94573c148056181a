use thiserror::Error;

/// Every failure the crate can surface to an operator.
///
/// Scan outcomes such as a malformed payload or an already redeemed coupon are
/// not errors; they are reported as a [`Verdict`](crate::core::redemption::Verdict).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Student not found: {id}")]
    StudentNotFound { id: String },

    #[error("Cannot issue a coupon to unpaid student {id}")]
    Unpaid { id: String },

    #[error("Email API URL is not configured")]
    EmailNotConfigured,

    #[error("Email delivery failed: {reason}")]
    EmailDelivery { reason: String },

    #[error("Failed to generate QR code: {message}")]
    QrEncode { message: String },

    #[error("Camera permission denied")]
    CameraPermissionDenied,

    #[error("Camera error: {message}")]
    Camera { message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Login required")]
    Unauthorized,

    #[error("Access forbidden: requires the {required} role")]
    Forbidden { required: String },

    #[error("{feature} is disabled")]
    FeatureDisabled { feature: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
