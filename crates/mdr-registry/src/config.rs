//! Repository configuration via `mdr.toml`.
//!
//! Every field has a default, so an empty file is a valid configuration
//! rooted at the file's own directory. Unknown keys and unknown backend or
//! strategy names are rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mdr_store::SlotLayout;
use mdr_types::{Namespace, DEFAULT_ID_WIDTH};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Config file name looked up in a repository directory.
pub const CONFIG_FILE_NAME: &str = "mdr.toml";

/// Directory under `base_dir` holding counter files unless overridden.
const DEFAULT_COUNTER_DIR: &str = ".counters";

/// Storage backend for a namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Memory,
    Filesystem,
    Versioned,
    ContentAddressed,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Memory,
        BackendKind::Filesystem,
        BackendKind::Versioned,
        BackendKind::ContentAddressed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Filesystem => "filesystem",
            BackendKind::Versioned => "versioned",
            BackendKind::ContentAddressed => "content-addressed",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RegistryError::Configuration(format!("unknown backend {s:?}")))
    }
}

/// Where the allocator keeps last-issued numbers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStrategy {
    /// One durable counter file per namespace.
    #[default]
    File,
    /// Process memory; recovered from the stores after restart.
    Memory,
}

/// The `[allocation]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationConfig {
    #[serde(default)]
    pub strategy: AllocationStrategy,
    /// Gap before the first number issued in a namespace after start.
    #[serde(default = "default_distance")]
    pub initial_distance: u32,
    /// Gap between subsequent numbers.
    #[serde(default = "default_distance")]
    pub distance: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            strategy: AllocationStrategy::File,
            initial_distance: default_distance(),
            distance: default_distance(),
        }
    }
}

/// Per-namespace overrides under `[namespaces.{project}_{type}]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_layout: Option<SlotLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_distance: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
}

/// Repository configuration loaded from `mdr.toml`.
///
/// # Example
///
/// ```toml
/// base_dir = "/var/lib/mdr"
/// id_width = 8
/// slot_layout = "4-2-2"
/// backend = "versioned"
///
/// [allocation]
/// strategy = "file"
///
/// [namespaces.DocPortal_document]
/// backend = "filesystem"
/// location = "/srv/docportal"
/// initial_distance = 10
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Root of all default storage locations.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Counter file directory; `{base_dir}/.counters` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_dir: Option<PathBuf>,
    /// Digits in a rendered document number.
    #[serde(default = "default_id_width")]
    pub id_width: usize,
    #[serde(default)]
    pub slot_layout: SlotLayout,
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Extension of document files for the filesystem backend.
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceConfig>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_id_width() -> usize {
    DEFAULT_ID_WIDTH
}

fn default_backend() -> BackendKind {
    BackendKind::Versioned
}

fn default_file_suffix() -> String {
    "xml".to_string()
}

fn default_distance() -> u32 {
    1
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            counter_dir: None,
            id_width: default_id_width(),
            slot_layout: SlotLayout::default(),
            backend: default_backend(),
            file_suffix: default_file_suffix(),
            allocation: AllocationConfig::default(),
            namespaces: BTreeMap::new(),
        }
    }
}

/// Fully resolved settings for one namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceSettings {
    pub namespace: Namespace,
    pub backend: BackendKind,
    pub location: PathBuf,
    pub layout: SlotLayout,
    pub file_suffix: String,
    pub initial_distance: u32,
    pub distance: u32,
}

fn configuration(what: impl fmt::Display) -> RegistryError {
    RegistryError::Configuration(what.to_string())
}

impl RepositoryConfig {
    /// Default configuration rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Builder-style default backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Builder-style allocation settings.
    pub fn with_allocation(mut self, allocation: AllocationConfig) -> Self {
        self.allocation = allocation;
        self
    }

    /// Builder-style namespace override.
    pub fn with_namespace(mut self, namespace: &Namespace, config: NamespaceConfig) -> Self {
        self.namespaces.insert(namespace.to_string(), config);
        self
    }

    /// Parse and validate TOML text. Relative paths are kept as given.
    pub fn from_toml_str(content: &str) -> RegistryResult<Self> {
        let config: RepositoryConfig = toml::from_str(content).map_err(configuration)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file. Relative paths inside it are resolved against the
    /// file's directory.
    pub fn from_file(path: &Path) -> RegistryResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: RepositoryConfig = toml::from_str(&content).map_err(|e| {
            configuration(format!("cannot parse {}: {e}", path.display()))
        })?;
        let anchor = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        config.anchor_paths(anchor);
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> RegistryResult<String> {
        toml::to_string_pretty(self).map_err(configuration)
    }

    fn anchor_paths(&mut self, anchor: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.as_os_str() == "." {
                *p = anchor.to_path_buf();
            } else if p.is_relative() {
                *p = anchor.join(&*p);
            }
        };
        resolve(&mut self.base_dir);
        if let Some(dir) = self.counter_dir.as_mut() {
            resolve(dir);
        }
        for ns in self.namespaces.values_mut() {
            if let Some(location) = ns.location.as_mut() {
                resolve(location);
            }
        }
    }

    /// Check every cross-field constraint.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.id_width == 0 || self.id_width > 10 {
            return Err(configuration(format!(
                "id_width must be between 1 and 10, got {}",
                self.id_width
            )));
        }
        self.slot_layout
            .check_width(self.id_width)
            .map_err(configuration)?;
        check_suffix(&self.file_suffix)?;
        check_distances(
            "allocation",
            self.allocation.initial_distance,
            self.allocation.distance,
        )?;
        for (key, ns) in &self.namespaces {
            let namespace: Namespace = key
                .parse()
                .map_err(|e| configuration(format!("namespace key {key:?}: {e}")))?;
            if let Some(layout) = &ns.slot_layout {
                layout
                    .check_width(self.id_width)
                    .map_err(|e| configuration(format!("{namespace}: {e}")))?;
            }
            if let Some(suffix) = &ns.file_suffix {
                check_suffix(suffix)?;
            }
            check_distances(
                key,
                ns.initial_distance.unwrap_or(self.allocation.initial_distance),
                ns.distance.unwrap_or(self.allocation.distance),
            )?;
        }
        Ok(())
    }

    /// Directory holding counter files.
    pub fn counter_dir(&self) -> PathBuf {
        self.counter_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join(DEFAULT_COUNTER_DIR))
    }

    /// Default storage location of `namespace`: `{base_dir}/{project}/{type}`.
    pub fn default_location(&self, namespace: &Namespace) -> PathBuf {
        self.base_dir.join(namespace.project()).join(namespace.kind())
    }

    /// Overrides configured for `namespace`, if any.
    pub fn namespace(&self, namespace: &Namespace) -> Option<&NamespaceConfig> {
        self.namespaces.get(&namespace.to_string())
    }

    /// Resolve the effective settings of `namespace`.
    pub fn settings(&self, namespace: &Namespace) -> NamespaceSettings {
        let overrides = self.namespace(namespace);
        let pick = |f: fn(&NamespaceConfig) -> Option<u32>, default: u32| {
            overrides.and_then(f).unwrap_or(default)
        };
        NamespaceSettings {
            namespace: namespace.clone(),
            backend: overrides.and_then(|o| o.backend).unwrap_or(self.backend),
            location: overrides
                .and_then(|o| o.location.clone())
                .unwrap_or_else(|| self.default_location(namespace)),
            layout: overrides
                .and_then(|o| o.slot_layout.clone())
                .unwrap_or_else(|| self.slot_layout.clone()),
            file_suffix: overrides
                .and_then(|o| o.file_suffix.clone())
                .unwrap_or_else(|| self.file_suffix.clone()),
            initial_distance: pick(|o| o.initial_distance, self.allocation.initial_distance),
            distance: pick(|o| o.distance, self.allocation.distance),
        }
    }
}

fn check_suffix(suffix: &str) -> RegistryResult<()> {
    if suffix.is_empty() || suffix.contains(['/', '.']) {
        return Err(configuration(format!("unusable file suffix {suffix:?}")));
    }
    Ok(())
}

fn check_distances(scope: &str, initial: u32, steady: u32) -> RegistryResult<()> {
    if initial == 0 || steady == 0 {
        return Err(configuration(format!(
            "{scope}: distances must be positive, got initial_distance={initial} distance={steady}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("DocPortal", "document").unwrap()
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn empty_file_uses_defaults() {
        let config = RepositoryConfig::from_toml_str("").unwrap();
        assert_eq!(config, RepositoryConfig::default());
        assert_eq!(config.id_width, 8);
        assert_eq!(config.slot_layout.to_string(), "4-2-2");
        assert_eq!(config.backend, BackendKind::Versioned);
        assert_eq!(config.allocation.strategy, AllocationStrategy::File);
    }

    #[test]
    fn full_file_parses() {
        let config = RepositoryConfig::from_toml_str(
            r#"
            base_dir = "/var/lib/mdr"
            counter_dir = "/var/lib/mdr-counters"
            id_width = 8
            slot_layout = "4-2-2"
            backend = "content-addressed"
            file_suffix = "json"

            [allocation]
            strategy = "memory"
            initial_distance = 2
            distance = 3

            [namespaces.DocPortal_document]
            backend = "filesystem"
            location = "/srv/docportal"
            slot_layout = "4-4"
            initial_distance = 10
            distance = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.counter_dir(), PathBuf::from("/var/lib/mdr-counters"));
        assert_eq!(config.allocation.strategy, AllocationStrategy::Memory);

        let doc = config.settings(&ns());
        assert_eq!(doc.backend, BackendKind::Filesystem);
        assert_eq!(doc.location, PathBuf::from("/srv/docportal"));
        assert_eq!(doc.layout.to_string(), "4-4");
        assert_eq!(doc.file_suffix, "json");
        assert_eq!((doc.initial_distance, doc.distance), (10, 1));

        let other = config.settings(&Namespace::new("DocPortal", "person").unwrap());
        assert_eq!(other.backend, BackendKind::ContentAddressed);
        assert_eq!(other.location, PathBuf::from("/var/lib/mdr/DocPortal/person"));
        assert_eq!((other.initial_distance, other.distance), (2, 3));
    }

    #[test]
    fn unknown_names_fail_loudly() {
        assert!(RepositoryConfig::from_toml_str(r#"backend = "oracle""#).is_err());
        assert!(RepositoryConfig::from_toml_str(
            r#"
            [allocation]
            strategy = "database"
            "#
        )
        .is_err());
        assert!(RepositoryConfig::from_toml_str("no_such_key = 1").is_err());
        assert!("oracle".parse::<BackendKind>().is_err());
        assert_eq!(
            "content-addressed".parse::<BackendKind>().unwrap(),
            BackendKind::ContentAddressed
        );
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn layout_must_cover_width() {
        let err = RepositoryConfig::from_toml_str(r#"slot_layout = "4-4-4""#).unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));
        assert!(RepositoryConfig::from_toml_str(
            r#"
            [namespaces.DocPortal_document]
            slot_layout = "2-2"
            "#
        )
        .is_err());
    }

    #[test]
    fn zero_distance_is_rejected() {
        assert!(RepositoryConfig::from_toml_str(
            r#"
            [allocation]
            distance = 0
            "#
        )
        .is_err());
        assert!(RepositoryConfig::from_toml_str(
            r#"
            [namespaces.DocPortal_document]
            initial_distance = 0
            "#
        )
        .is_err());
    }

    #[test]
    fn bad_namespace_key_is_rejected() {
        assert!(RepositoryConfig::from_toml_str(
            r#"
            [namespaces.nounderscore]
            backend = "memory"
            "#
        )
        .is_err());
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    #[test]
    fn relative_paths_resolve_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
            base_dir = "data"

            [namespaces.DocPortal_document]
            location = "docs"
            "#,
        )
        .unwrap();
        let config = RepositoryConfig::from_file(&path).unwrap();
        assert_eq!(config.base_dir, dir.path().join("data"));
        assert_eq!(config.counter_dir(), dir.path().join("data/.counters"));
        assert_eq!(config.settings(&ns()).location, dir.path().join("docs"));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RepositoryConfig::from_file(&dir.path().join(CONFIG_FILE_NAME)),
            Err(RegistryError::Configuration(_))
        ));
    }

    #[test]
    fn toml_output_reparses() {
        let config = RepositoryConfig::new("/srv/mdr")
            .with_backend(BackendKind::Filesystem)
            .with_namespace(
                &ns(),
                NamespaceConfig {
                    backend: Some(BackendKind::Memory),
                    initial_distance: Some(100),
                    ..NamespaceConfig::default()
                },
            );
        let text = config.to_toml().unwrap();
        assert_eq!(RepositoryConfig::from_toml_str(&text).unwrap(), config);
    }
}
