//! Error taxonomy and the `AppError` type shared by every layer.
//!
//! Every failure in the services is expressed as an [`AppError`]. The error
//! carries a closed [`ErrorCode`], a [`ErrorCategory`] that tells expected
//! domain outcomes apart from infrastructure faults, and diagnostic data
//! (cause, request ID, context) that is logged and traced but never rendered
//! to clients.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RequestId;

/// Boxed diagnostic cause attached to an [`AppError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Distinguishes expected domain outcomes from technical failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// A domain rule was violated (not found, insufficient stock, ...).
    Business,
    /// An infrastructure or technical fault (storage, network, validation, panic).
    Application,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Business => "business",
            ErrorCategory::Application => "application",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of error codes exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Business
    ProductNotFound,
    InsufficientStock,
    InvalidProductData,
    OrderLimitExceeded,
    PriceMismatch,
    // Application
    DatabaseAccess,
    ServiceUnavailable,
    RequestValidation,
    InternalProcessing,
    ResourceConstraint,
    SystemPanic,
    NetworkError,
    MalformedData,
    RequestTimeout,
    Unknown,
}

impl ErrorCode {
    /// Every code, business codes first.
    pub const ALL: [ErrorCode; 15] = [
        ErrorCode::ProductNotFound,
        ErrorCode::InsufficientStock,
        ErrorCode::InvalidProductData,
        ErrorCode::OrderLimitExceeded,
        ErrorCode::PriceMismatch,
        ErrorCode::DatabaseAccess,
        ErrorCode::ServiceUnavailable,
        ErrorCode::RequestValidation,
        ErrorCode::InternalProcessing,
        ErrorCode::ResourceConstraint,
        ErrorCode::SystemPanic,
        ErrorCode::NetworkError,
        ErrorCode::MalformedData,
        ErrorCode::RequestTimeout,
        ErrorCode::Unknown,
    ];

    /// Returns the canonical wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProductNotFound => "PRODUCT_NOT_FOUND",
            ErrorCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorCode::InvalidProductData => "INVALID_PRODUCT_DATA",
            ErrorCode::OrderLimitExceeded => "ORDER_LIMIT_EXCEEDED",
            ErrorCode::PriceMismatch => "PRICE_MISMATCH",
            ErrorCode::DatabaseAccess => "DATABASE_ACCESS_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::RequestValidation => "REQUEST_VALIDATION_ERROR",
            ErrorCode::InternalProcessing => "INTERNAL_PROCESSING_ERROR",
            ErrorCode::ResourceConstraint => "RESOURCE_CONSTRAINT_ERROR",
            ErrorCode::SystemPanic => "SYSTEM_PANIC",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::MalformedData => "MALFORMED_DATA",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Infers the category of a code from the business allow-list.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::ProductNotFound
            | ErrorCode::InsufficientStock
            | ErrorCode::InvalidProductData
            | ErrorCode::OrderLimitExceeded
            | ErrorCode::PriceMismatch => ErrorCategory::Business,
            _ => ErrorCategory::Application,
        }
    }

    /// Resolves a wire string to a code.
    ///
    /// Deprecated aliases resolve to their canonical code; anything
    /// unrecognised becomes [`ErrorCode::Unknown`].
    pub fn parse(code: &str) -> Self {
        match code {
            "RESOURCE_NOT_FOUND" => ErrorCode::ProductNotFound,
            "VALIDATION_ERROR" => ErrorCode::RequestValidation,
            "DATABASE_ERROR" => ErrorCode::DatabaseAccess,
            "INTERNAL_ERROR" => ErrorCode::InternalProcessing,
            other => ErrorCode::ALL
                .into_iter()
                .find(|c| c.as_str() == other)
                .unwrap_or(ErrorCode::Unknown),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ErrorCode::parse(s))
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ErrorCode::parse(&raw))
    }
}

/// The single error currency of the services.
///
/// Code, category and timestamp are fixed when the error is built. The
/// request ID and each context key can be written once; later writes are
/// ignored so outer layers never overwrite what an inner layer recorded.
#[derive(Debug)]
pub struct AppError {
    code: ErrorCode,
    category: ErrorCategory,
    message: String,
    cause: Option<BoxError>,
    request_id: Option<RequestId>,
    context: Option<HashMap<String, String>>,
    timestamp: DateTime<Utc>,
}

impl AppError {
    /// Creates an error whose category is inferred from the code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::builder(code, message).build()
    }

    /// Creates a business-category error.
    pub fn business(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::builder(code, message)
            .category(ErrorCategory::Business)
            .build()
    }

    /// Creates an application-category error.
    pub fn application(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::builder(code, message)
            .category(ErrorCategory::Application)
            .build()
    }

    /// Starts building an error; the category can only be overridden here.
    pub fn builder(code: ErrorCode, message: impl Into<String>) -> AppErrorBuilder {
        AppErrorBuilder {
            code,
            category: None,
            message: message.into(),
            cause: None,
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self::business(
            ErrorCode::ProductNotFound,
            format!("Product with name '{name}' not found"),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::application(ErrorCode::RequestValidation, message)
    }

    pub fn database(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::application(ErrorCode::DatabaseAccess, message).with_cause(cause)
    }

    /// Attaches the underlying cause. A cause set at construction is kept.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        if self.cause.is_none() {
            self.cause = Some(cause.into());
        }
        self
    }

    /// Sets the request ID unless one is already recorded.
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.stamp_request_id(request_id);
        self
    }

    /// In-place form of [`AppError::with_request_id`].
    pub fn stamp_request_id(&mut self, request_id: RequestId) {
        if self.request_id.is_none() {
            self.request_id = Some(request_id);
        }
    }

    /// Adds a diagnostic key/value pair unless the key is already present.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context
            .get_or_insert_with(HashMap::new)
            .entry(key.into())
            .or_insert_with(|| value.to_string());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn context(&self) -> Option<&HashMap<String, String>> {
        self.context.as_ref()
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.as_ref()?.get(key).map(String::as_str)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_business(&self) -> bool {
        self.category == ErrorCategory::Business
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.code, self.category, self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request_id={request_id})")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " cause: {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// Builder returned by [`AppError::builder`].
#[derive(Debug)]
pub struct AppErrorBuilder {
    code: ErrorCode,
    category: Option<ErrorCategory>,
    message: String,
    cause: Option<BoxError>,
}

impl AppErrorBuilder {
    /// Overrides the category inferred from the code.
    pub fn category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn build(self) -> AppError {
        AppError {
            code: self.code,
            category: self.category.unwrap_or_else(|| self.code.category()),
            message: self.message,
            cause: self.cause,
            request_id: None,
            context: None,
            timestamp: Utc::now(),
        }
    }
}
