use validator::Validate;

use crate::error::ApiError;

/// Shape checks on request bodies; content rules (trimming, length in chars) are
/// enforced again by the domain services.
pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value
        .validate()
        .map_err(|err| ApiError::Validation(err.to_string()))
}
