use crate::metadata::ObjectMeta;

use crate::gvk::GroupVersionKind;
use std::{borrow::Cow, collections::BTreeMap};

/// An accessor trait for a versioned resource object.
///
/// Every object a lifecycle adapter reconciles must expose its type information
/// and its [`ObjectMeta`]. Unlike the type-level constants on `k8s_openapi` types,
/// type information is read from the instance, so objects whose kind is only known
/// at runtime (see [`DynamicObject`](crate::dynamic::DynamicObject)) report their own.
///
/// These objects SHOULD all have:
/// - `.metadata.name`
///
/// And these optional properties:
/// - `.metadata.namespace`
/// - `.metadata.resource_version`
/// - `.metadata.deletion_timestamp`
pub trait Resource {
    /// Returns kind of this object
    fn kind(&self) -> Cow<'_, str>;
    /// Returns group of this object
    fn group(&self) -> Cow<'_, str>;
    /// Returns version of this object
    fn version(&self) -> Cow<'_, str>;

    /// Returns the group, version and kind of this object
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group(), &self.version(), &self.kind())
    }

    /// Metadata that all persisted resources must have
    fn meta(&self) -> &ObjectMeta;
    /// Metadata that all persisted resources must have
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

/// Implement accessor trait for any ObjectMeta-using `k8s_openapi` type
impl<K> Resource for K
where
    K: k8s_openapi::Metadata<Ty = ObjectMeta>,
    K: k8s_openapi::Resource,
{
    fn kind(&self) -> Cow<'_, str> {
        K::KIND.into()
    }

    fn group(&self) -> Cow<'_, str> {
        K::GROUP.into()
    }

    fn version(&self) -> Cow<'_, str> {
        K::VERSION.into()
    }

    fn meta(&self) -> &ObjectMeta {
        self.metadata()
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        self.metadata_mut()
    }
}

/// Helper methods for resources.
pub trait ResourceExt: Resource {
    /// Returns the most useful name identifier available
    ///
    /// This is tries `name`, then `generateName`, and falls back on an empty string when neither is set.
    /// This is intended for logging; writes must use `.meta().name`.
    fn name_any(&self) -> String;
    /// The namespace the resource is in
    fn namespace(&self) -> Option<String>;
    /// The resource version
    fn resource_version(&self) -> Option<String>;
    /// Returns resource annotations
    fn annotations(&self) -> &BTreeMap<String, String>;
    /// Provider mutable access to the annotations
    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String>;
    /// Returns resource finalizers
    fn finalizers(&self) -> &[String];
    /// Provides mutable access to the finalizers
    fn finalizers_mut(&mut self) -> &mut Vec<String>;
    /// Whether `finalizer` is present in the finalizer list
    fn has_finalizer(&self, finalizer: &str) -> bool;
    /// Whether the store has marked the object for deletion
    fn is_deleting(&self) -> bool;
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

    fn annotations(&self) -> &BTreeMap<String, String> {
        self.meta().annotations.as_ref().unwrap_or(&EMPTY_MAP)
    }

    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.meta_mut().annotations.get_or_insert_with(BTreeMap::new)
    }

    fn finalizers(&self) -> &[String] {
        self.meta().finalizers.as_deref().unwrap_or_default()
    }

    fn finalizers_mut(&mut self) -> &mut Vec<String> {
        self.meta_mut().finalizers.get_or_insert_with(Vec::new)
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{Resource, ResourceExt};
    use crate::gvk::GroupVersionKind;
    use k8s_openapi::api::{apps::v1::Deployment, core::v1::ConfigMap};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn openapi_types_report_static_type_info() {
        let cm = ConfigMap::default();
        assert_eq!(cm.gvk(), GroupVersionKind::gvk("", "v1", "ConfigMap"));
        let deploy = Deployment::default();
        assert_eq!(deploy.gvk().to_string(), "apps/v1, Kind=Deployment");
    }

    #[test]
    fn bookkeeping_accessors_default_to_empty() {
        let mut cm = ConfigMap {
            metadata: ObjectMeta {
                generate_name: Some("cm-".into()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        };
        assert_eq!(cm.name_any(), "cm-");
        assert!(cm.annotations().is_empty());
        assert!(cm.finalizers().is_empty());
        assert!(!cm.is_deleting());

        cm.finalizers_mut().push("controller.cattle.io/foo".into());
        cm.annotations_mut().insert("a".into(), "b".into());
        assert!(cm.has_finalizer("controller.cattle.io/foo"));
        assert!(!cm.has_finalizer("controller.cattle.io/bar"));
        assert_eq!(cm.annotations().get("a").map(String::as_str), Some("b"));
    }
}
