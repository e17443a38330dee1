use serde::Serialize;

use crate::error::{ErrorKind, ProgressError};

/// Uniform result envelope returned to any boundary caller (CLI job, API
/// handler, another service). No raw errors cross this boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
}

impl<T> OperationOutcome<T> {
    #[must_use]
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
            error_kind: None,
        }
    }

    #[must_use]
    pub fn err(error: &ProgressError) -> Self {
        Self {
            success: false,
            data: None,
            message: error.to_string(),
            error_kind: Some(error.kind()),
        }
    }
}

impl<T> From<Result<T, ProgressError>> for OperationOutcome<T> {
    fn from(result: Result<T, ProgressError>) -> Self {
        match result {
            Ok(data) => Self::ok(data, "ok"),
            Err(error) => Self::err(&error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::ModuleId;

    #[test]
    fn success_envelope_has_no_error_kind() {
        let outcome = OperationOutcome::ok(42_u32, "done");
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"data\":42"));
        assert!(json.contains("\"error_kind\":null"));
    }

    #[test]
    fn failure_envelope_carries_kind_and_message() {
        let error = ProgressError::ModuleNotFound(ModuleId::new(5));
        let outcome: OperationOutcome<u32> = OperationOutcome::err(&error);

        assert!(!outcome.success);
        assert_eq!(outcome.data, None);
        assert_eq!(outcome.error_kind, Some(ErrorKind::NotFound));

        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"error_kind\":\"not_found\""));
    }

    #[test]
    fn from_result_maps_both_arms() {
        let ok: OperationOutcome<u32> = Ok(7).into();
        assert!(ok.success);

        let err: OperationOutcome<u32> =
            Err(ProgressError::ModuleNotFound(ModuleId::new(1))).into();
        assert!(!err.success);
    }
}
