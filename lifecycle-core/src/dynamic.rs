//! Contains types for reconciling resource kinds not known at compile-time.
use crate::{gvk::GroupVersionKind, metadata::TypeMeta, resource::Resource};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to parse this DynamicObject into a Resource: {source}")]
/// Failed to parse `DynamicObject` into `Resource`
pub struct ParseDynamicObjectError {
    #[from]
    source: serde_json::Error,
}

/// A dynamic representation of a versioned resource object
///
/// This will work with any non-list type object. Type information is taken from
/// the object's own `apiVersion` and `kind`; an object without them has an empty kind.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct DynamicObject {
    /// The type fields, not always present
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// All other keys
    #[serde(flatten)]
    pub data: serde_json::Value,
}

impl DynamicObject {
    /// Create a DynamicObject with minimal values set from a GroupVersionKind.
    #[must_use]
    pub fn new(name: &str, gvk: &GroupVersionKind) -> Self {
        Self {
            types: Some(TypeMeta {
                api_version: gvk.api_version(),
                kind: gvk.kind.clone(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            data: Default::default(),
        }
    }

    /// Attach dynamic data to a DynamicObject
    #[must_use]
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Attach a namespace to a DynamicObject
    #[must_use]
    pub fn within(mut self, ns: &str) -> Self {
        self.metadata.namespace = Some(ns.into());
        self
    }

    /// Attempt to convert this `DynamicObject` to a typed object
    pub fn try_parse<K: Resource + for<'a> serde::Deserialize<'a>>(
        self,
    ) -> Result<K, ParseDynamicObjectError> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }
}

impl Resource for DynamicObject {
    fn kind(&self) -> Cow<'_, str> {
        self.types.as_ref().map_or("", |t| t.kind.as_str()).into()
    }

    fn group(&self) -> Cow<'_, str> {
        self.types.as_ref().map_or("", TypeMeta::group).into()
    }

    fn version(&self) -> Cow<'_, str> {
        self.types.as_ref().map_or("", TypeMeta::version).into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod test {
    use crate::{
        dynamic::DynamicObject,
        gvk::GroupVersionKind,
        resource::{Resource, ResourceExt},
    };
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn reports_type_information_from_instance() {
        let gvk = GroupVersionKind::gvk("management.cattle.io", "v3", "Cluster");
        let obj = DynamicObject::new("local", &gvk);
        assert_eq!(obj.gvk(), gvk);
        assert_eq!(obj.kind(), "Cluster");

        let untyped: DynamicObject = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "anon" }
        }))
        .unwrap();
        assert_eq!(untyped.kind(), "");
        assert_eq!(untyped.gvk().to_string(), "/, Kind=");
    }

    #[test]
    fn deserializes_deletion_bookkeeping() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "cm",
                "namespace": "prod",
                "deletionTimestamp": "2024-01-01T00:00:00Z",
                "finalizers": ["controller.cattle.io/foo"]
            },
            "data": { "key": "value" }
        }))
        .unwrap();
        assert!(obj.is_deleting());
        assert!(obj.has_finalizer("controller.cattle.io/foo"));
        assert_eq!(obj.namespace().as_deref(), Some("prod"));

        let cm: ConfigMap = obj.try_parse().unwrap();
        assert_eq!(cm.data.unwrap().get("key").map(String::as_str), Some("value"));
    }
}
