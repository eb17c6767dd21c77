//! Result type alias for the courier pipeline

use super::errors::CourierError;

/// Result type alias for courier operations
///
/// This is a convenience type alias that uses `CourierError` as the error type.
/// Use this throughout the codebase for fallible operations.
///
/// # Examples
///
/// ```
/// use study_courier::domain::result::Result;
/// use study_courier::domain::errors::CourierError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(CourierError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, CourierError>;
