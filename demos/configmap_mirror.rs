// Mirrors ConfigMaps into an outside registry, and removes the mirror once the ConfigMap is deleted.
//
// Objects live in a MemoryStore, so this runs without a cluster. Set
// LIFECYCLE_DISALLOWED_NAMESPACES=kube- to see objects in blocked namespaces skipped.
use async_trait::async_trait;
use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use lifecycle::{
    runtime::{store::ObjectRef, Blocklist, HookResult, MemoryStore, ObjectLifecycle, ObjectLifecycleAdapter},
    ResourceExt,
};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::*;

#[derive(Debug, Error)]
enum Error {
    #[error("ConfigMap has no namespace")]
    NoNamespace,
}

/// Stands in for some system outside the store
#[derive(Default)]
struct Registry {
    mirrors: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl Registry {
    async fn publish(&self, cm: &ConfigMap) -> Result<(), Error> {
        let ns = cm.namespace().ok_or(Error::NoNamespace)?;
        let key = format!("{ns}/{}", cm.name_any());
        let data = cm.data.clone().unwrap_or_default();
        info!(%key, entries = data.len(), "publishing mirror");
        self.mirrors.lock().await.insert(key, data);
        Ok(())
    }
}

struct Mirror {
    registry: Arc<Registry>,
}

#[async_trait]
impl ObjectLifecycle<ConfigMap> for Mirror {
    type Error = Error;

    async fn create(&self, mut cm: ConfigMap) -> HookResult<ConfigMap, Error> {
        self.registry.publish(&cm).await?;
        cm.annotations_mut().insert("mirror.example.com/published".into(), "true".into());
        Ok(Some(cm))
    }

    async fn updated(&self, cm: ConfigMap) -> HookResult<ConfigMap, Error> {
        self.registry.publish(&cm).await?;
        Ok(None)
    }

    async fn finalize(&self, cm: ConfigMap) -> HookResult<ConfigMap, Error> {
        let ns = cm.namespace().ok_or(Error::NoNamespace)?;
        let key = format!("{ns}/{}", cm.name_any());
        info!(%key, "removing mirror");
        self.registry.mirrors.lock().await.remove(&key);
        Ok(None)
    }
}

fn configmap(ns: &str, name: &str, content: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(ns.into()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([("content".to_string(), content.to_string())])),
        ..ConfigMap::default()
    }
}

/// What the store does when someone deletes an object that still has finalizers
fn mark_deleted(cm: &ConfigMap) -> anyhow::Result<ConfigMap> {
    let mut value = serde_json::to_value(cm)?;
    value["metadata"]["deletionTimestamp"] = serde_json::json!("2024-01-01T00:00:00Z");
    Ok(serde_json::from_value(value)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let registry = Arc::new(Registry::default());
    let store = MemoryStore::new();
    let adapter = ObjectLifecycleAdapter::new(
        "configmap-mirror",
        false,
        Mirror {
            registry: registry.clone(),
        },
        store.clone(),
    )
    .with_blocklist(Blocklist::from_env()?.into());
    let reconcile = adapter.into_reconciler();

    let cms = [
        configmap("default", "app-config", "hello"),
        configmap("kube-system", "coredns", "."),
    ];
    for cm in cms {
        let key = ObjectRef::from_obj(&cm);
        let seeded = store.insert(cm);
        // First pass adds the finalizer and runs create, the second runs updated
        let created = reconcile(key.to_string(), Some(Arc::new(seeded))).await?;
        reconcile(key.to_string(), created).await?;
    }
    info!(mirrors = ?registry.mirrors.lock().await.keys().collect::<Vec<_>>(), "mirrored");

    let key = ObjectRef::new("app-config").within("default");
    if let Some(current) = store.get_cached(&key) {
        let deleting = store.insert(mark_deleted(&current)?);
        reconcile(key.to_string(), Some(Arc::new(deleting))).await?;
    }
    let gone = store.get_cached(&key).is_none();
    info!(%key, gone, writes = store.writes(), "deleted");
    info!(mirrors = ?registry.mirrors.lock().await.keys().collect::<Vec<_>>(), "mirrored");
    Ok(())
}
