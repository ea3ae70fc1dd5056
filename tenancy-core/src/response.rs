//! Generic api response types
use serde::{Deserialize, Serialize};

/// A Kubernetes status object
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Status {
    /// Status of the operation
    ///
    /// One of: `Success` or `Failure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSummary>,

    /// Suggested HTTP return code (0 if unset)
    #[serde(default, skip_serializing_if = "is_u16_zero")]
    pub code: u16,

    /// A human-readable description of the status of this operation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// A machine-readable description of why this operation is in the `Failure` status.
    ///
    /// See [`reason`] for the known values.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Extended data associated with the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
}

impl Status {
    /// Returns a successful `Status`
    pub fn success() -> Self {
        Status {
            status: Some(StatusSummary::Success),
            ..Status::default()
        }
    }

    /// Returns an unsuccessful `Status`
    pub fn failure(message: &str, reason: &str) -> Self {
        Status {
            status: Some(StatusSummary::Failure),
            message: message.to_string(),
            reason: reason.to_string(),
            ..Status::default()
        }
    }

    /// Sets an explicit HTTP status code
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    /// Adds details to the `Status`
    pub fn with_details(mut self, details: StatusDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Checks if this `Status` represents success
    pub fn is_success(&self) -> bool {
        self.status == Some(StatusSummary::Success)
    }

    /// Checks if this `Status` represents failure
    pub fn is_failure(&self) -> bool {
        self.status == Some(StatusSummary::Failure)
    }
}

/// Overall status of the operation - whether it succeeded or not
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum StatusSummary {
    /// Operation succeeded
    Success,
    /// Operation failed
    Failure,
}

/// Status details object on the [`Status`] object
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetails {
    /// The name of the resource the status is about, when there is a single one
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// The group of the resource
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    /// The kind (plural resource) the status is about
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// UID of the resource, when there is a single one
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    /// Per-field causes of a failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<StatusCause>,

    /// If specified, the time in seconds before the operation should be retried.
    #[serde(default, skip_serializing_if = "is_u32_zero")]
    pub retry_after_seconds: u32,
}

/// Status cause object on the [`StatusDetails`] object
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct StatusCause {
    /// A machine-readable description of the cause of the error
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// A human-readable description of the cause of the error
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// The field of the resource that has caused this error, as named by its JSON serialization
    ///
    /// May include dot and postfix notation for nested attributes, e.g. `spec.clusterName`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
}

impl StatusCause {
    /// `field` holds a value that is not allowed
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self {
            reason: "FieldValueInvalid".into(),
            message: message.into(),
            field: field.into(),
        }
    }

    /// `field` must be set
    pub fn required(field: &str) -> Self {
        Self {
            reason: "FieldValueRequired".into(),
            message: "Required value".into(),
            field: field.into(),
        }
    }

    /// `field` may not be set or changed
    pub fn forbidden(field: &str, message: impl Into<String>) -> Self {
        Self {
            reason: "FieldValueForbidden".into(),
            message: message.into(),
            field: field.into(),
        }
    }
}

impl std::fmt::Display for StatusCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

fn is_u16_zero(&v: &u16) -> bool {
    v == 0
}

fn is_u32_zero(&v: &u32) -> bool {
    v == 0
}

/// Machine-readable failure reasons
///
/// Each reason maps to a single HTTP status code, but multiple reasons may map to the same code.
pub mod reason {
    /// The server declined to indicate a specific reason. Status code 500.
    pub const UNKNOWN: &str = "";
    /// One or more resources required for this operation could not be found. Status code 404.
    pub const NOT_FOUND: &str = "NotFound";
    /// The resource being created already exists. Status code 409.
    pub const ALREADY_EXISTS: &str = "AlreadyExists";
    /// The operation cannot be completed due to a conflicting modification. Status code 409.
    pub const CONFLICT: &str = "Conflict";
    /// The item is no longer available at the server. Status code 410.
    pub const GONE: &str = "Gone";
    /// Create or update data failed validation. Status code 422.
    pub const INVALID: &str = "Invalid";
    /// The request itself was invalid. Status code 400.
    pub const BAD_REQUEST: &str = "BadRequest";
    /// The content requested has expired, e.g. a too old watch resource version. Status code 410.
    pub const EXPIRED: &str = "Expired";
    /// An internal error occurred. Status code 500.
    pub const INTERNAL_ERROR: &str = "InternalError";
}

#[cfg(test)]
mod test {
    use super::{Status, StatusCause};

    #[test]
    fn delete_deserialize_test() {
        let statusresp = r#"{"kind":"Status","apiVersion":"v1","metadata":{},"status":"Success","details":{"name":"some-addon","group":"platform.tkestack.io","kind":"cronhpas","uid":"1234-some-uid"}}"#;
        let s: Status = serde_json::from_str::<Status>(statusresp).unwrap();
        assert!(s.is_success());
        assert_eq!(s.details.unwrap().name, "some-addon");
    }

    #[test]
    fn cause_display() {
        assert_eq!(
            StatusCause::required("spec.clusterName").to_string(),
            "spec.clusterName: Required value"
        );
        let bare = StatusCause {
            message: "bad".into(),
            ..StatusCause::default()
        };
        assert_eq!(bare.to_string(), "bad");
    }
}
