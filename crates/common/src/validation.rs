//! Adapter from `validator` failures to [`AppError`].

use validator::{Validate, ValidationErrors};

use crate::error::{AppError, ErrorCategory, ErrorCode};

/// Validates a payload against its declared constraints.
///
/// All field violations are folded into one `REQUEST_VALIDATION_ERROR`
/// whose cause is the original [`ValidationErrors`].
pub fn validate_request<T: Validate>(payload: &T) -> Result<(), AppError> {
    match payload.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let message = format!("Validation failed: {}", describe(&errors));
            Err(AppError::builder(ErrorCode::RequestValidation, message)
                .category(ErrorCategory::Application)
                .cause(errors)
                .build())
        }
    }
}

fn describe(errors: &ValidationErrors) -> String {
    let mut violations: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter()
                .map(move |e| (field.to_string(), e.code.to_string()))
        })
        .collect();
    violations.sort();

    violations
        .into_iter()
        .map(|(field, rule)| format!("Field '{field}' failed validation on '{rule}' tag"))
        .collect::<Vec<_>>()
        .join("; ")
}
