//! A port of request parameter *Options from apimachinery/types.go
use crate::{fields::FieldSelector, Error};
use serde::Serialize;

/// Access to the selectors shared by list, watch and delete collection calls
pub trait Selectors {
    /// The raw label selector, if any
    fn label_selector(&self) -> Option<&str>;
    /// The raw field selector, if any
    fn field_selector(&self) -> Option<&str>;
    /// Field requirements that hold on top of the raw field selector
    fn required_fields(&self) -> &FieldSelector;
    /// Mutable access to the field requirements
    fn required_fields_mut(&mut self) -> &mut FieldSelector;
}

/// Common query parameters used in list/delete calls on collections
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListParams {
    /// A selector to restrict the list of returned objects by their labels.
    ///
    /// Defaults to everything if `None`.
    pub label_selector: Option<String>,

    /// A selector to restrict the list of returned objects by their fields.
    ///
    /// Defaults to everything if `None`.
    pub field_selector: Option<String>,

    /// Field requirements ANDed with `field_selector`, never parsed from text
    pub required_fields: FieldSelector,

    /// Timeout for the list call, passed through to the store.
    pub timeout: Option<u32>,

    /// Limit the number of results.
    ///
    /// If there are more results, the store will respond with a continue token which can be used to fetch
    /// another page of results.
    pub limit: Option<u32>,

    /// Fetch a second page of results.
    ///
    /// After listing results with a limit, a continue token can be used to fetch another page of results.
    pub continue_token: Option<String>,

    /// An explicit resourceVersion to list at
    ///
    /// Stores serving only the latest state accept "0" and the current version.
    pub resource_version: Option<String>,
}

impl ListParams {
    /// Check the params make sense before handing them to a store
    pub fn validate(&self) -> Result<(), Error> {
        if self.limit == Some(0) {
            return Err(Error::BadRequest("ListParams::limit must be positive when set".into()));
        }
        if self.continue_token.is_some() && self.resource_version.is_some() {
            return Err(Error::BadRequest(
                "specifying resource version is not allowed when using continue".into(),
            ));
        }
        Ok(())
    }
}

/// Builder interface to ListParams
///
/// Usage:
/// ```
/// use tenancy_core::params::ListParams;
/// let lp = ListParams::default()
///     .timeout(60)
///     .labels("app=cron");
/// ```
impl ListParams {
    /// Configure the timeout for list calls
    #[must_use]
    pub fn timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    /// Configure the selector to restrict the list of returned objects by their fields.
    ///
    /// Supports `=`, `==`, `!=`, and can be comma separated: `key1=value1,key2=value2`.
    /// Only the fields a kind declares as indexable can be selected on.
    #[must_use]
    pub fn fields(mut self, field_selector: &str) -> Self {
        self.field_selector = Some(field_selector.to_string());
        self
    }

    /// Configure the selector to restrict the list of returned objects by their labels.
    ///
    /// Supports `=`, `==`, `!=`, `in`, `notin`, existence, and can be comma separated.
    #[must_use]
    pub fn labels(mut self, label_selector: &str) -> Self {
        self.label_selector = Some(label_selector.to_string());
        self
    }

    /// Sets a result limit.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets a continue token.
    #[must_use]
    pub fn continue_token(mut self, token: &str) -> Self {
        self.continue_token = Some(token.to_string());
        self
    }

    /// Sets the resource version
    #[must_use]
    pub fn at(mut self, resource_version: &str) -> Self {
        self.resource_version = Some(resource_version.into());
        self
    }
}

impl Selectors for ListParams {
    fn label_selector(&self) -> Option<&str> {
        self.label_selector.as_deref()
    }

    fn field_selector(&self) -> Option<&str> {
        self.field_selector.as_deref()
    }

    fn required_fields(&self) -> &FieldSelector {
        &self.required_fields
    }

    fn required_fields_mut(&mut self) -> &mut FieldSelector {
        &mut self.required_fields
    }
}

/// Common query parameters used in get calls
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetParams {
    /// An explicit resourceVersion with implicit version matching strategies
    ///
    /// Default (unset) gives the most recent version.
    pub resource_version: Option<String>,
}

impl GetParams {
    /// Sets the resource version, implicitly applying a 'NotOlderThan' match
    #[must_use]
    pub fn at(resource_version: &str) -> Self {
        Self {
            resource_version: Some(resource_version.into()),
        }
    }

    /// Sets the resource version to "0"
    #[must_use]
    pub fn any() -> Self {
        Self::at("0")
    }
}

/// Common query parameters used in watch calls on collections
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WatchParams {
    /// A selector to restrict returned objects by their labels.
    ///
    /// Defaults to everything if `None`.
    pub label_selector: Option<String>,

    /// A selector to restrict returned objects by their fields.
    ///
    /// Defaults to everything if `None`.
    pub field_selector: Option<String>,

    /// Field requirements ANDed with `field_selector`, never parsed from text
    pub required_fields: FieldSelector,

    /// Timeout for the watch call, passed through to the store.
    ///
    /// The stream ends once the timeout elapses, regardless of any activity or inactivity.
    /// Unset means the watch lasts until it is stopped or its context is cancelled.
    pub timeout: Option<u32>,

    /// Begin the stream with synthetic `Added` events for the current state
    ///
    /// Only meaningful when watching without a resource version.
    pub send_initial_events: bool,
}

impl WatchParams {
    /// Configure the timeout for watch calls
    #[must_use]
    pub fn timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    /// Configure the selector to restrict the list of returned objects by their fields.
    #[must_use]
    pub fn fields(mut self, field_selector: &str) -> Self {
        self.field_selector = Some(field_selector.to_string());
        self
    }

    /// Configure the selector to restrict the list of returned objects by their labels.
    #[must_use]
    pub fn labels(mut self, label_selector: &str) -> Self {
        self.label_selector = Some(label_selector.to_string());
        self
    }

    /// Start the stream with the current state
    #[must_use]
    pub fn initial_events(mut self) -> Self {
        self.send_initial_events = true;
        self
    }
}

impl Selectors for WatchParams {
    fn label_selector(&self) -> Option<&str> {
        self.label_selector.as_deref()
    }

    fn field_selector(&self) -> Option<&str> {
        self.field_selector.as_deref()
    }

    fn required_fields(&self) -> &FieldSelector {
        &self.required_fields
    }

    fn required_fields_mut(&mut self) -> &mut FieldSelector {
        &mut self.required_fields
    }
}

/// Parameters of create and replace calls
#[derive(Default, Clone, Debug, PartialEq)]
pub struct PostParams {
    /// Validate and return the result without persisting it
    pub dry_run: bool,
}

impl PostParams {
    /// Perform a dryRun only
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Describes changes that should be applied to a resource
///
/// Patches are applied to the currently stored object and the result is submitted as an update,
/// so they pass through the same tenant checks and update strategies as a full replace.
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone)]
pub enum Patch<T: Serialize> {
    /// [JSON patch](https://tools.ietf.org/html/rfc6902)
    #[cfg(feature = "jsonpatch")]
    #[cfg_attr(docsrs, doc(cfg(feature = "jsonpatch")))]
    Json(json_patch::Patch),

    /// [JSON Merge patch](https://tools.ietf.org/html/rfc7386)
    Merge(T),
}

/// Parameters of patch calls
#[derive(Default, Clone, Debug)]
pub struct PatchParams {
    /// Validate and return the patched object without persisting it
    pub dry_run: bool,
}

impl PatchParams {
    /// Perform a dryRun only
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// The update params the patched object is submitted with
    pub fn as_post_params(&self) -> PostParams {
        PostParams { dry_run: self.dry_run }
    }
}

/// Parameters of delete and delete collection calls
///
/// Deletion is immediate; there are no finalizers or grace periods to wait for.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct DeleteParams {
    /// Report what would be deleted without deleting it
    pub dry_run: bool,

    /// Identity checks on the stored object; a mismatch is a Conflict
    pub preconditions: Option<Preconditions>,
}

impl DeleteParams {
    /// Perform a dryRun only
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Only delete if the stored object still satisfies `preconditions`
    #[must_use]
    pub fn preconditions(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = Some(preconditions);
        self
    }
}

/// Expected identity of the stored object for an operation to proceed
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Preconditions {
    /// The resourceVersion the object must be at
    pub resource_version: Option<String>,
    /// The uid the object must have; guards against a deleted and recreated namesake
    pub uid: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn list_params_validation() {
        assert!(ListParams::default().validate().is_ok());
        assert!(ListParams::default().limit(0).validate().is_err());
        assert!(ListParams::default()
            .continue_token("x")
            .at("10")
            .validate()
            .is_err());
    }

    #[test]
    fn selector_access() {
        let mut wp = WatchParams::default().fields("metadata.name=a");
        assert_eq!(Selectors::field_selector(&wp), Some("metadata.name=a"));
        assert_eq!(Selectors::label_selector(&wp), None);
        assert_eq!(wp.required_fields(), &FieldSelector::default());
        *wp.required_fields_mut() = FieldSelector::one_term_equal("spec.tenantID", "t1");
        assert_eq!(wp.required_fields, FieldSelector::one_term_equal("spec.tenantID", "t1"));
        assert_eq!(Selectors::field_selector(&wp), Some("metadata.name=a"));
    }

    #[test]
    fn patch_params_carry_dry_run() {
        let pp = PatchParams::default().dry_run().as_post_params();
        assert!(pp.dry_run);
        assert!(!PatchParams::default().as_post_params().dry_run);
    }
}
