//! Block-lists of namespaces and kinds that controllers must not write to
use lifecycle_core::{GroupVersionKind, Resource};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

/// Environment variable holding comma-separated disallowed namespace prefixes
pub const DISALLOWED_NAMESPACES_ENV: &str = "LIFECYCLE_DISALLOWED_NAMESPACES";
/// Environment variable holding comma-separated disallowed kinds, as `group/version/Kind`
pub const DISALLOWED_KINDS_ENV: &str = "LIFECYCLE_DISALLOWED_KINDS";

/// Errors loading a [`Blocklist`]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a block-list file
    #[error("failed to read blocklist from {path:?}: {source}")]
    ReadFile {
        /// The file that was read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse block-list YAML
    #[error("failed to parse blocklist yaml: {0}")]
    ParseYaml(#[source] serde_yaml::Error),

    /// A disallowed kind was not in `group/version/Kind` form
    #[error("invalid disallowed kind: {0}")]
    ParseKind(#[source] lifecycle_core::gvk::ParseGroupVersionKindError),
}

/// Namespaces and kinds that controllers should leave alone
///
/// ```yaml
/// disallowedNamespaces:
///   - gke-
///   - kube-system
/// disallowedKinds:
///   - { group: "", version: v1, kind: Node }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blocklist {
    /// Namespace name prefixes, matched literally
    ///
    /// `gke-` blocks every namespace beginning with `gke-`.
    #[serde(default)]
    pub disallowed_namespaces: Vec<String>,
    /// Kinds matched exactly on group, version and kind
    #[serde(default)]
    pub disallowed_kinds: Vec<GroupVersionKind>,
}

impl Blocklist {
    /// Whether `obj` lives in, or is, a disallowed namespace
    ///
    /// A `Namespace` object is checked by its own name, anything else by its namespace.
    /// Cluster-scoped objects are never in a disallowed namespace.
    pub fn is_disallowed_namespace<K: Resource>(&self, obj: &K) -> bool {
        let namespace = if obj.kind() == "Namespace" {
            obj.meta().name.as_deref()
        } else {
            obj.meta().namespace.as_deref()
        };
        match namespace {
            None | Some("") => false,
            Some(ns) => self
                .disallowed_namespaces
                .iter()
                .any(|prefix| ns.starts_with(prefix.as_str())),
        }
    }

    /// Whether the kind of `obj` is disallowed
    pub fn is_disallowed_kind<K: Resource>(&self, obj: &K) -> bool {
        let gvk = obj.gvk();
        self.disallowed_kinds.iter().any(|kind| *kind == gvk)
    }

    /// Parse a block-list from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(ConfigError::ParseYaml)
    }

    /// Read a YAML block-list from `path`
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Build a block-list from [`DISALLOWED_NAMESPACES_ENV`] and [`DISALLOWED_KINDS_ENV`]
    ///
    /// Unset variables leave the corresponding list empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let namespaces = std::env::var(DISALLOWED_NAMESPACES_ENV).unwrap_or_default();
        let kinds = std::env::var(DISALLOWED_KINDS_ENV).unwrap_or_default();
        Self::from_lists(&namespaces, &kinds)
    }

    fn from_lists(namespaces: &str, kinds: &str) -> Result<Self, ConfigError> {
        let disallowed_namespaces = split_list(namespaces).map(String::from).collect();
        let disallowed_kinds = split_list(kinds)
            .map(str::parse::<GroupVersionKind>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConfigError::ParseKind)?;
        Ok(Self {
            disallowed_namespaces,
            disallowed_kinds,
        })
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// A process-wide [`Blocklist`] shared between adapters
///
/// Cloning produces a new handle to the same block-list. Updates publish a whole new
/// block-list, so a [`snapshot`](SharedBlocklist::snapshot) never changes once taken.
#[derive(Clone, Debug, Default)]
pub struct SharedBlocklist {
    current: Arc<RwLock<Arc<Blocklist>>>,
}

impl SharedBlocklist {
    /// Share `blocklist`
    #[must_use]
    pub fn new(blocklist: Blocklist) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(blocklist))),
        }
    }

    /// The block-list as of now
    #[must_use]
    pub fn snapshot(&self) -> Arc<Blocklist> {
        self.current.read().clone()
    }

    /// Publish a new block-list
    pub fn replace(&self, blocklist: Blocklist) {
        *self.current.write() = Arc::new(blocklist);
    }

    /// Publish a modified copy of the current block-list
    pub fn modify(&self, f: impl FnOnce(&mut Blocklist)) {
        let mut current = self.current.write();
        let mut next = Blocklist::clone(&current);
        f(&mut next);
        *current = Arc::new(next);
    }
}

impl From<Blocklist> for SharedBlocklist {
    fn from(blocklist: Blocklist) -> Self {
        Self::new(blocklist)
    }
}

#[cfg(test)]
mod tests {
    use super::{Blocklist, ConfigError, SharedBlocklist, DISALLOWED_KINDS_ENV, DISALLOWED_NAMESPACES_ENV};
    use k8s_openapi::{
        api::core::v1::{ConfigMap, Namespace, Node},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use lifecycle_core::{DynamicObject, GroupVersionKind};
    use std::io::Write;

    fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }
    }

    fn configmap(ns: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("test-configmap".into()),
                namespace: Some(ns.into()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    fn blocked() -> Blocklist {
        Blocklist {
            disallowed_namespaces: vec!["disallowed-ns".into(), "disallowed-prefix-".into()],
            ..Blocklist::default()
        }
    }

    #[test]
    fn namespace_objects_are_matched_by_name() {
        let blocklist = blocked();
        assert!(blocklist.is_disallowed_namespace(&namespace("disallowed-ns")));
        assert!(blocklist.is_disallowed_namespace(&namespace("disallowed-prefix-")));
        assert!(blocklist.is_disallowed_namespace(&namespace("disallowed-prefix-abc")));
        assert!(!blocklist.is_disallowed_namespace(&namespace("allowed-ns")));
    }

    #[test]
    fn namespaced_objects_are_matched_by_namespace() {
        let blocklist = blocked();
        assert!(blocklist.is_disallowed_namespace(&configmap("disallowed-ns")));
        assert!(!blocklist.is_disallowed_namespace(&configmap("allowed-ns")));
    }

    #[test]
    fn nothing_is_disallowed_by_default() {
        let blocklist = Blocklist::default();
        assert!(!blocklist.is_disallowed_namespace(&configmap("allowed-ns")));
        assert!(!blocklist.is_disallowed_namespace(&namespace("test-ns")));
    }

    #[test]
    fn cluster_scoped_objects_are_never_in_a_disallowed_namespace() {
        let blocklist = Blocklist {
            disallowed_namespaces: vec!["".into()],
            ..Blocklist::default()
        };
        let node = Node {
            metadata: ObjectMeta {
                name: Some("localhost.localdomain".into()),
                ..ObjectMeta::default()
            },
            ..Node::default()
        };
        assert!(!blocklist.is_disallowed_namespace(&node));
    }

    #[test]
    fn dynamic_namespaces_use_their_own_kind() {
        let blocklist = Blocklist {
            disallowed_namespaces: vec!["gke-".into()],
            ..Blocklist::default()
        };
        let ns = DynamicObject::new("gke-test", &GroupVersionKind::gvk("", "v1", "Namespace"));
        assert!(blocklist.is_disallowed_namespace(&ns));
        let untyped = DynamicObject::new("gke-test", &GroupVersionKind::default());
        assert!(!blocklist.is_disallowed_namespace(&untyped));
    }

    #[test]
    fn kinds_are_matched_exactly() {
        let blocklist = Blocklist {
            disallowed_kinds: vec![GroupVersionKind::gvk("", "v1", "Node")],
            ..Blocklist::default()
        };
        assert!(blocklist.is_disallowed_kind(&Node::default()));
        assert!(!blocklist.is_disallowed_kind(&namespace("allowed-ns")));
        let other_group = DynamicObject::new("n", &GroupVersionKind::gvk("example.com", "v1", "Node"));
        assert!(!blocklist.is_disallowed_kind(&other_group));
    }

    #[test]
    fn loads_from_yaml() {
        let blocklist = Blocklist::from_yaml(
            r#"
disallowedNamespaces:
  - gke-
disallowedKinds:
  - version: v1
    kind: Node
"#,
        )
        .unwrap();
        assert_eq!(blocklist.disallowed_namespaces, vec!["gke-".to_string()]);
        assert_eq!(blocklist.disallowed_kinds, vec![GroupVersionKind::gvk("", "v1", "Node")]);
        assert!(matches!(
            Blocklist::from_yaml("disallowedNamespaces: 3"),
            Err(ConfigError::ParseYaml(_))
        ));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "disallowedNamespaces: [cattle-, kube-system]").unwrap();
        let blocklist = Blocklist::read_from(file.path()).unwrap();
        assert_eq!(blocklist.disallowed_namespaces, vec!["cattle-", "kube-system"]);

        let missing = Blocklist::read_from("/nonexistent/blocklist.yaml");
        assert!(matches!(missing, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn parses_comma_separated_lists() {
        let blocklist = Blocklist::from_lists(" gke-, ,kube-system ", "v1/Node,apps/v1/Deployment").unwrap();
        assert_eq!(blocklist.disallowed_namespaces, vec!["gke-", "kube-system"]);
        assert_eq!(blocklist.disallowed_kinds, vec![
            GroupVersionKind::gvk("", "v1", "Node"),
            GroupVersionKind::gvk("apps", "v1", "Deployment"),
        ]);
        assert!(matches!(
            Blocklist::from_lists("", "Node"),
            Err(ConfigError::ParseKind(_))
        ));
        assert_eq!(Blocklist::from_lists("", "").unwrap(), Blocklist::default());
    }

    // only test touching these variables
    #[test]
    fn loads_from_environment() {
        std::env::set_var(DISALLOWED_NAMESPACES_ENV, "gke-,kube-system");
        std::env::set_var(DISALLOWED_KINDS_ENV, "v1/Node");
        let blocklist = Blocklist::from_env().unwrap();
        assert_eq!(blocklist.disallowed_namespaces, vec!["gke-", "kube-system"]);
        assert_eq!(blocklist.disallowed_kinds, vec![GroupVersionKind::gvk("", "v1", "Node")]);

        std::env::set_var(DISALLOWED_KINDS_ENV, "Node");
        assert!(matches!(Blocklist::from_env(), Err(ConfigError::ParseKind(_))));

        std::env::remove_var(DISALLOWED_NAMESPACES_ENV);
        std::env::remove_var(DISALLOWED_KINDS_ENV);
        assert_eq!(Blocklist::from_env().unwrap(), Blocklist::default());
    }

    #[test]
    fn snapshots_survive_updates() {
        let shared = SharedBlocklist::default();
        let before = shared.snapshot();
        shared.modify(|b| b.disallowed_namespaces.push("gke-".into()));
        assert!(before.disallowed_namespaces.is_empty());
        assert_eq!(shared.snapshot().disallowed_namespaces, vec!["gke-"]);

        let handle = shared.clone();
        handle.replace(Blocklist::default());
        assert!(shared.snapshot().disallowed_namespaces.is_empty());
    }
}
