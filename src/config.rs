use crate::{error::BridgeError, reference::name_to_request};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};

/// Name of the profile used when none is requested.
pub const DEFAULT_PROFILE: &str = "default";

/// A name -> value binding table used to evaluate import expressions that reference variables.
pub type VariableTable = BTreeMap<String, String>;

/// File naming conventions of the stylesheet dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DialectConfig {
    /// Extension of dialect documents, without the dot.
    pub extension: String,
    /// Stem of the file tried when a request names a directory.
    pub index_file: String,
    /// Extensions of plain stylesheet files that are imported literally.
    pub literal_extensions: Vec<String>,
    /// Prefix marking a reference as resolvable only through the host.
    pub host_prefix: String,
}

impl Default for DialectConfig {
    fn default() -> Self {
        DialectConfig {
            extension: "styl".to_string(),
            index_file: "index".to_string(),
            literal_extensions: vec!["css".to_string()],
            host_prefix: "~".to_string(),
        }
    }
}

impl DialectConfig {
    pub fn is_dialect_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    /// Whether a request already names a concrete file and should be tried as-is.
    pub fn is_literal_request(&self, request: &str) -> bool {
        let trimmed = request.trim_end_matches(['"', '\'']);
        let Some((_, ext)) = trimmed.rsplit_once('.') else {
            return false;
        };
        if ext.contains('/') {
            return false;
        }
        ext.eq_ignore_ascii_case(&self.extension)
            || self
                .literal_extensions
                .iter()
                .any(|literal| ext.eq_ignore_ascii_case(literal))
    }

    /// Whether an import name names a plain stylesheet that the compiler emits verbatim.
    pub fn is_plain_stylesheet(&self, name: &str) -> bool {
        let trimmed = name.trim_end_matches(['"', '\'']);
        trimmed.rsplit_once('.').is_some_and(|(_, ext)| {
            self.literal_extensions
                .iter()
                .any(|literal| ext.eq_ignore_ascii_case(literal))
        })
    }

    pub fn is_host_reference(&self, name: &str) -> bool {
        !self.host_prefix.is_empty() && name.starts_with(&self.host_prefix)
    }

    pub fn with_extension(&self, request: &str) -> String {
        format!("{request}.{}", self.extension)
    }

    pub fn index_request(&self, request: &str) -> String {
        format!(
            "{}/{}.{}",
            request.trim_end_matches('/'),
            self.index_file,
            self.extension
        )
    }
}

/// Options for one compile job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoaderOptions {
    /// Root used to canonicalize root-relative (`/x`) import names.
    pub root: Option<String>,
    /// Extra directories searched by the compiler's native lookup.
    pub paths: Vec<PathBuf>,
    /// Variables defined for the real render.
    pub define: VariableTable,
    /// Alternative variable tables used only when speculatively scanning imports, e.g. one per
    /// build variant.
    pub import_variables: Vec<VariableTable>,
    /// Scan documents ahead of rendering and resolve their imports speculatively.
    pub prefetch: bool,
    /// Upper bound on concurrent document scans while prefetching.
    pub max_parallel_scans: usize,
    /// Ask the renderer for a source map.
    pub source_map: bool,
    pub dialect: DialectConfig,
    /// Request prefix -> directory aliases for the filesystem host.
    pub aliases: BTreeMap<String, PathBuf>,
    /// Directory names searched upwards from the context for package requests.
    pub module_dirs: Vec<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            root: None,
            paths: Vec::new(),
            define: VariableTable::new(),
            import_variables: Vec::new(),
            prefetch: true,
            max_parallel_scans: 8,
            source_map: false,
            dialect: DialectConfig::default(),
            aliases: BTreeMap::new(),
            module_dirs: vec!["node_modules".to_string()],
        }
    }
}

impl LoaderOptions {
    pub fn from_toml_str(content: &str) -> Result<Self, BridgeError> {
        Self::from_toml_profile(content, None)
    }

    /// Parse options out of a TOML document.
    ///
    /// Documents whose top level consists only of tables are treated as a set of named profiles
    /// and `profile` (default `"default"`) is selected. Anything else is read as one bundle.
    pub fn from_toml_profile(content: &str, profile: Option<&str>) -> Result<Self, BridgeError> {
        let document: toml::Table = toml::from_str(content)?;
        let is_profile_set = !document.is_empty()
            && document.values().all(|v| v.is_table())
            && !document.keys().any(|k| k == "dialect" || k == "define" || k == "aliases");

        let options = if is_profile_set {
            let name = profile.unwrap_or(DEFAULT_PROFILE);
            let table = document.get(name).cloned().ok_or_else(|| {
                BridgeError::Config(format!(
                    "profile '{name}' not found. Available: {}",
                    document.keys().cloned().collect::<Vec<String>>().join(", ")
                ))
            })?;
            table.try_into::<LoaderOptions>()?
        } else {
            if let Some(name) = profile.filter(|name| *name != DEFAULT_PROFILE) {
                return Err(BridgeError::Config(format!(
                    "profile '{name}' requested but the config has no profiles"
                )));
            }
            toml::Value::Table(document).try_into::<LoaderOptions>()?
        };
        options.validate()?;
        Ok(options)
    }

    pub fn load<P: AsRef<Path>>(path: P, profile: Option<&str>) -> Result<Self, BridgeError> {
        tracing::debug!("Reading loader options from {:?}", path.as_ref());
        let content = read_to_string(path)?;
        Self::from_toml_profile(&content, profile)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.max_parallel_scans == 0 {
            return Err(BridgeError::Config(
                "max-parallel-scans must be at least 1".to_string(),
            ));
        }
        if self.dialect.extension.is_empty() || self.dialect.extension.starts_with('.') {
            return Err(BridgeError::Config(format!(
                "dialect extension '{}' must be non-empty and given without the dot",
                self.dialect.extension
            )));
        }
        Ok(())
    }

    /// The host-resolver request for a raw import name. Host references lose their prefix;
    /// everything else is canonicalized against `root`.
    pub fn request_for(&self, name: &str) -> String {
        if self.dialect.is_host_reference(name) {
            name[self.dialect.host_prefix.len()..].to_string()
        } else {
            name_to_request(name, self.root.as_deref())
        }
    }

    /// Variable tables to scan with. Always at least one, possibly empty, table.
    pub fn scan_tables(&self) -> Vec<VariableTable> {
        if self.import_variables.is_empty() {
            vec![self.define.clone()]
        } else {
            self.import_variables.clone()
        }
    }
}
