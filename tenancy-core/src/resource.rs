pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::{collections::BTreeMap, fmt};

/// A resource type qualified by its api group, e.g. `cronhpas.platform.tkestack.io`
///
/// This is what errors and storage keys refer to, rather than a full group/version/kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupResource {
    /// Api group, empty for the core group
    pub group: String,
    /// Plural resource name
    pub resource: String,
}

impl GroupResource {
    /// Construct from a group and a plural resource name
    pub fn new(group: &str, resource: &str) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    /// Whether the resource name is set
    pub fn is_empty(&self) -> bool {
        self.resource.is_empty()
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// An accessor trait for a stored resource kind.
///
/// Implementors SHOULD all have required properties:
/// - `.metadata`
/// - `.metadata.name`
///
/// And these optional properties:
/// - `.metadata.namespace`
/// - `.metadata.resource_version`
///
/// Type information is known at compile time; there is no dynamic variant.
pub trait Resource {
    /// Kind of this object, e.g. `CronHPA`
    const KIND: &'static str;
    /// Api group of this object
    const GROUP: &'static str;
    /// Api version of this object within its group
    const VERSION: &'static str;
    /// The plural name of the kind, known as the resource in apimachinery
    const PLURAL: &'static str;
    /// Whether instances live inside a namespace
    const NAMESPACED: bool;

    /// Abbreviations accepted for interactive lookup of this kind
    fn short_names() -> &'static [&'static str] {
        &[]
    }

    /// Returns apiVersion of this object
    fn api_version() -> String {
        if Self::GROUP.is_empty() {
            return Self::VERSION.to_string();
        }
        format!("{}/{}", Self::GROUP, Self::VERSION)
    }

    /// The group-qualified resource of this kind
    fn group_resource() -> GroupResource {
        GroupResource::new(Self::GROUP, Self::PLURAL)
    }

    /// Creates a url path for requests addressing this resource
    fn url_path(namespace: Option<&str>) -> String {
        let n = match namespace {
            Some(ns) if Self::NAMESPACED => format!("namespaces/{ns}/"),
            _ => "".into(),
        };
        format!(
            "/{root}/{api_version}/{n}{plural}",
            root = if Self::GROUP.is_empty() { "api" } else { "apis" },
            api_version = Self::api_version(),
            plural = Self::PLURAL,
        )
    }

    /// Metadata that all persisted resources must have
    fn meta(&self) -> &ObjectMeta;
    /// Metadata that all persisted resources must have
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

/// Helper methods for resources.
pub trait ResourceExt: Resource {
    /// Returns the most useful name identifier available
    ///
    /// This is tries `name`, then `generateName`, and falls back on an empty string when neither is set.
    fn name_any(&self) -> String;

    /// The namespace the resource is in
    fn namespace(&self) -> Option<String>;

    /// The resource version
    fn resource_version(&self) -> Option<String>;

    /// Unique ID (if you delete resource and then create a new
    /// resource with the same name, it will have different ID)
    fn uid(&self) -> Option<String>;

    /// Returns resource labels
    fn labels(&self) -> &BTreeMap<String, String>;

    /// Provides mutable access to the labels
    fn labels_mut(&mut self) -> &mut BTreeMap<String, String>;

    /// Returns resource annotations
    fn annotations(&self) -> &BTreeMap<String, String>;

    /// Provider mutable access to the annotations
    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String>;
}

static EMPTY_MAP: BTreeMap<String, String> = BTreeMap::new();

impl<K: Resource> ResourceExt for K {
    fn name_any(&self) -> String {
        self.meta()
            .name
            .clone()
            .or_else(|| self.meta().generate_name.clone())
            .unwrap_or_default()
    }

    fn namespace(&self) -> Option<String> {
        self.meta().namespace.clone()
    }

    fn resource_version(&self) -> Option<String> {
        self.meta().resource_version.clone()
    }

    fn uid(&self) -> Option<String> {
        self.meta().uid.clone()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        self.meta().labels.as_ref().unwrap_or(&EMPTY_MAP)
    }

    fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.meta_mut().labels.get_or_insert_with(BTreeMap::new)
    }

    fn annotations(&self) -> &BTreeMap<String, String> {
        self.meta().annotations.as_ref().unwrap_or(&EMPTY_MAP)
    }

    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.meta_mut().annotations.get_or_insert_with(BTreeMap::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Widget {
        metadata: ObjectMeta,
    }

    impl Resource for Widget {
        const GROUP: &'static str = "example.io";
        const KIND: &'static str = "Widget";
        const NAMESPACED: bool = true;
        const PLURAL: &'static str = "widgets";
        const VERSION: &'static str = "v1";

        fn meta(&self) -> &ObjectMeta {
            &self.metadata
        }

        fn meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    #[test]
    fn paths_and_names() {
        assert_eq!(Widget::api_version(), "example.io/v1");
        assert_eq!(Widget::url_path(Some("ns")), "/apis/example.io/v1/namespaces/ns/widgets");
        assert_eq!(Widget::url_path(None), "/apis/example.io/v1/widgets");
        assert_eq!(Widget::group_resource().to_string(), "widgets.example.io");
        assert_eq!(GroupResource::new("", "pods").to_string(), "pods");
    }

    #[test]
    fn label_access() {
        let mut w = Widget::default();
        assert!(w.labels().is_empty());
        w.labels_mut().insert("app".into(), "web".into());
        assert_eq!(w.labels().get("app").map(String::as_str), Some("web"));
        w.metadata.generate_name = Some("w-".into());
        assert_eq!(w.name_any(), "w-");
    }
}
