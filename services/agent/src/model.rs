//! Data model: workload descriptors, normalized start commands,
//! operation keys, and remote config/secret object snapshots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Lifecycle action declared inside a workload descriptor.
///
/// The message operation is authoritative for routing; this field is
/// carried for descriptors produced by older control planes that put
/// the action in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    #[default]
    Create,
    Update,
    Delete,
}

/// Remote-issued specification of one native application instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    /// Namespace the instance lives in.
    pub namespace: String,

    /// Instance name, unique within the namespace.
    pub instance: String,

    /// Application name; also names the local config file.
    pub app_name: String,

    /// Absolute path of the executable.
    pub exec_path: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables appended to the parent environment.
    #[serde(default)]
    pub envs: BTreeMap<String, String>,

    /// Opaque version token used for duplicate suppression.
    #[serde(default)]
    pub version: Option<String>,

    /// Declared action (informational, see [`LifecycleAction`]).
    #[serde(default)]
    pub action: LifecycleAction,
}

/// Normalized start command for a native app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCommand {
    /// Program name; names the unit when an external supervisor runs it.
    pub name: String,

    /// Absolute executable path.
    pub path: PathBuf,

    /// Arguments.
    pub args: Vec<String>,

    /// Extra environment, appended after the parent environment so
    /// later entries win on conflicting names.
    pub envs: Vec<(String, String)>,
}

impl AppCommand {
    /// Build the start command a descriptor asks for.
    pub fn from_descriptor(desc: &WorkloadDescriptor) -> Self {
        Self {
            name: desc.app_name.clone(),
            path: PathBuf::from(&desc.exec_path),
            args: desc.args.clone(),
            envs: desc.envs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// Reconstruct a command from a raw argv list.
    ///
    /// The first element that `is_executable` accepts is the program
    /// path; elements before it are `KEY=VALUE` environment entries and
    /// elements after it are arguments. Returns `None` when no element
    /// resolves to an executable.
    pub fn from_argv<F>(argv: &[String], is_executable: F) -> Option<Self>
    where
        F: Fn(&Path) -> bool,
    {
        let path_index = argv
            .iter()
            .position(|arg| is_executable(Path::new(arg)))?;
        let path = PathBuf::from(&argv[path_index]);

        let envs = argv[..path_index]
            .iter()
            .filter_map(|e| {
                e.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();
        let args = argv[path_index + 1..].to_vec();

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Some(Self { name, path, args, envs })
    }
}

/// Composite identity of one reconcilable unit.
///
/// Stable across repeated deliveries of the same logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey(String);

impl OperationKey {
    /// Key for a descriptor-delivered workload: `namespace:instance:app`.
    pub fn workload(namespace: &str, instance: &str, app_name: &str) -> Self {
        Self(format!("{namespace}:{instance}:{app_name}"))
    }

    /// Key for a raw-command delivery: the executable path plus its
    /// argument string.
    pub fn command(cmd: &AppCommand) -> Self {
        Self(format!("{} {}", cmd.path.display(), cmd.args.join(" ")))
    }
}

impl std::fmt::Display for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object metadata as returned by the metadata authority.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    /// Free-form labels; the original control plane tags native-app
    /// configuration with `configType: native`.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Named key-value configuration bundle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigObject {
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Plain text values.
    #[serde(default)]
    pub data: BTreeMap<String, String>,

    /// Base64-encoded binary values.
    #[serde(default, rename = "binaryData")]
    pub binary_data: BTreeMap<String, String>,
}

impl ConfigObject {
    /// Render the bundle as local config file content: one sorted
    /// `key=value` line per entry.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.data {
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push('\n');
        }
        out
    }
}

/// Named key-value secret bundle; values are base64-encoded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretObject {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub data: BTreeMap<String, String>,
}
