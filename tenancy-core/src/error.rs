use crate::{
    resource::GroupResource,
    response::{reason, Status, StatusCause, StatusDetails},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Possible errors when serving a resource request
///
/// Variants mirror the apimachinery status reasons. Store errors already carry these
/// semantics, so layers above the store pass them through unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The object does not exist, or exists but is not visible to the caller
    #[error("{resource} \"{name}\" not found")]
    NotFound {
        /// Resource that was addressed
        resource: GroupResource,
        /// Name that was addressed
        name: String,
    },

    /// An object with the same identity already exists
    #[error("{resource} \"{name}\" already exists")]
    AlreadyExists {
        /// Resource that was addressed
        resource: GroupResource,
        /// Name that was addressed
        name: String,
    },

    /// A concurrent modification or failed precondition
    #[error("Operation cannot be fulfilled on {resource} \"{name}\": {message}")]
    Conflict {
        /// Resource that was addressed
        resource: GroupResource,
        /// Name that was addressed
        name: String,
        /// What conflicted
        message: String,
    },

    /// The payload failed strategy validation
    #[error("{resource} \"{name}\" is invalid: {}", join_causes(.causes))]
    Invalid {
        /// Resource that was addressed
        resource: GroupResource,
        /// Name that was addressed
        name: String,
        /// Per-field failures
        causes: Vec<StatusCause>,
    },

    /// The request could not be understood, e.g. an unparseable selector
    #[error("{0}")]
    BadRequest(String),

    /// A watch was requested from a resource version that is no longer retained
    #[error("too old resource version: {requested} ({oldest})")]
    Expired {
        /// Version the caller asked for
        requested: String,
        /// Oldest version still available
        oldest: String,
    },

    /// A store failure unrelated to the validity of the request
    #[error("Internal error occurred: {0}")]
    Internal(String),
}

fn join_causes(causes: &[StatusCause]) -> String {
    let mut parts: Vec<String> = causes.iter().map(ToString::to_string).collect();
    if parts.len() > 1 {
        parts = vec![format!("[{}]", parts.join(", "))];
    }
    parts.concat()
}

impl Error {
    /// NotFound for `name` of `resource`
    pub fn not_found(resource: &GroupResource, name: &str) -> Self {
        Self::NotFound {
            resource: resource.clone(),
            name: name.into(),
        }
    }

    /// AlreadyExists for `name` of `resource`
    pub fn already_exists(resource: &GroupResource, name: &str) -> Self {
        Self::AlreadyExists {
            resource: resource.clone(),
            name: name.into(),
        }
    }

    /// Conflict on `name` of `resource`
    pub fn conflict(resource: &GroupResource, name: &str, message: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.clone(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Invalid `name` of `resource`
    pub fn invalid(resource: &GroupResource, name: &str, causes: Vec<StatusCause>) -> Self {
        Self::Invalid {
            resource: resource.clone(),
            name: name.into(),
            causes,
        }
    }

    /// Internal failure
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal(message.to_string())
    }

    /// Machine readable reason, see [`reason`]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => reason::NOT_FOUND,
            Self::AlreadyExists { .. } => reason::ALREADY_EXISTS,
            Self::Conflict { .. } => reason::CONFLICT,
            Self::Invalid { .. } => reason::INVALID,
            Self::BadRequest(_) => reason::BAD_REQUEST,
            Self::Expired { .. } => reason::EXPIRED,
            Self::Internal(_) => reason::INTERNAL_ERROR,
        }
    }

    /// Suggested HTTP status code
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => 409,
            Self::Invalid { .. } => 422,
            Self::BadRequest(_) => 400,
            Self::Expired { .. } => 410,
            Self::Internal(_) => 500,
        }
    }

    /// Whether this is a NotFound
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a Conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this is an Invalid
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    fn details(&self) -> Option<StatusDetails> {
        let (resource, name, causes) = match self {
            Self::NotFound { resource, name } | Self::AlreadyExists { resource, name } => {
                (resource, name, vec![])
            }
            Self::Conflict { resource, name, .. } => (resource, name, vec![]),
            Self::Invalid {
                resource,
                name,
                causes,
            } => (resource, name, causes.clone()),
            _ => return None,
        };
        Some(StatusDetails {
            name: name.clone(),
            group: resource.group.clone(),
            kind: resource.resource.clone(),
            causes,
            ..StatusDetails::default()
        })
    }
}

/// An error response in the shape the api returns it.
#[derive(Error, Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[error("{message}: {reason}")]
pub struct ErrorResponse {
    /// The status
    pub status: String,
    /// A message about the error
    #[serde(default)]
    pub message: String,
    /// The reason for the error
    #[serde(default)]
    pub reason: String,
    /// The error code
    pub code: u16,
    /// Extended data associated with the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            status: "Failure".into(),
            message: err.to_string(),
            reason: err.reason().into(),
            code: err.code(),
            details: err.details(),
        }
    }
}

impl From<Error> for ErrorResponse {
    fn from(err: Error) -> Self {
        (&err).into()
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        let status = Status::failure(&err.to_string(), err.reason()).with_code(err.code());
        match err.details() {
            Some(details) => status.with_details(details),
            None => status,
        }
    }
}
