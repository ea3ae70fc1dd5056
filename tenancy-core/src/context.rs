//! Per-request call context handed from the transport layer to storage
//!
//! A [`Context`] carries who is calling (and on behalf of which tenant), the namespace the
//! request addresses, and a cancellation token tied to the lifetime of the request.
use tokio_util::sync::CancellationToken;

/// The authenticated caller of a request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// The name that uniquely identifies this user among all active users.
    pub username: String,
    /// The tenant the user belongs to.
    ///
    /// An empty or missing tenant marks a platform-level caller that is not scoped to any tenant.
    pub tenant_id: Option<String>,
    /// The names of groups this user is a part of.
    pub groups: Vec<String>,
}

impl UserInfo {
    /// A user belonging to `tenant`
    pub fn new(username: &str, tenant: &str) -> Self {
        Self {
            username: username.into(),
            tenant_id: Some(tenant.into()),
            groups: vec![],
        }
    }

    /// A platform-level user without a tenant
    pub fn platform(username: &str) -> Self {
        Self {
            username: username.into(),
            tenant_id: None,
            groups: vec![],
        }
    }
}

/// Request-scoped call context
///
/// Cloning a `Context` shares the cancellation token, so cancelling any clone cancels the request.
#[derive(Clone, Debug, Default)]
pub struct Context {
    namespace: Option<String>,
    user: Option<UserInfo>,
    cancel: CancellationToken,
}

impl Context {
    /// A context for an unauthenticated, cluster-wide request
    pub fn new() -> Self {
        Self::default()
    }

    /// A context acting as `user`
    pub fn for_user(user: UserInfo) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    /// Address the request at `namespace`
    #[must_use]
    pub fn within(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The namespace the request addresses, if any
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The authenticated caller, if any
    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// The caller's username, or the empty string
    pub fn username(&self) -> &str {
        self.user.as_ref().map(|u| u.username.as_str()).unwrap_or_default()
    }

    /// The caller's tenant
    ///
    /// Returns `None` both for anonymous callers and for users with an empty tenant.
    pub fn tenant_id(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|u| u.tenant_id.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Token cancelled when the request is abandoned
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abandon the request
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the request has been abandoned
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
