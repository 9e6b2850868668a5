//! RFC-7807 problem envelope shared by the gateway and all services.

use serde::{Deserialize, Serialize};

use crate::codes;

/// A single field-level validation failure, attached to 422 responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// RFC-7807 error body. `code` is the machine-readable discriminator from
/// [`crate::codes`]; `type` derives from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<ValidationIssue>,
}

impl Problem {
    pub fn new(status: u16, code: &str, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            type_uri: codes::problem_type(code),
            title: title.into(),
            status,
            detail: detail.into(),
            instance: None,
            code: code.to_string(),
            errors: Vec::new(),
        }
    }

    /// Set `instance` to the request path that produced the problem.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<ValidationIssue>) -> Self {
        self.errors = errors;
        self
    }

    /// 422 body from a list of field issues.
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self::new(
            422,
            codes::VALIDATION_FAILED,
            "Validation failed",
            "One or more request fields are invalid",
        )
        .with_errors(issues)
    }

    /// Generic 500 body that never leaks internals.
    pub fn internal() -> Self {
        Self::new(
            500,
            codes::INTERNAL,
            "Internal error",
            "The request could not be processed",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_serializes_rfc7807_fields() {
        let problem = Problem::new(429, codes::RATE_LIMITED, "Too many requests", "limit hit")
            .with_instance("/api/v1/orders");
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["status"], 429);
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["instance"], "/api/v1/orders");
        assert!(json["type"].as_str().unwrap().starts_with(codes::PROBLEM_BASE));
        // No empty errors array on non-validation problems
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_validation_problem_carries_issues() {
        let problem = Problem::validation(vec![
            ValidationIssue::new("quantity", "must be positive")
                .with_value(serde_json::json!(-3)),
        ]);
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["status"], 422);
        assert_eq!(json["errors"][0]["field"], "quantity");
        assert_eq!(json["errors"][0]["value"], -3);
    }

    #[test]
    fn test_internal_problem_is_generic() {
        let problem = Problem::internal();
        assert_eq!(problem.status, 500);
        assert_eq!(problem.detail, "The request could not be processed");
    }
}
