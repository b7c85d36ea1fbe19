//! Manifest file parser
//!
//! Declarative packing through a `japp.toml` file:
//!
//! ```toml
//! [package]                    # Output identity
//! name = "hello"
//! output = "build/hello"       # default: <manifest dir>/<name>
//!
//! [launcher]                   # Native stub and JVM boot module
//! stub = "target/release/japp"
//! boot = "boot/japp-boot.jar"
//!
//! [app]                        # What to run
//! main_class = "org.example.Main"
//! main_module = "org.example"
//! module_path = ["mods/foo.jar?name=foo"]
//! class_path = ["libs/*", "build/classes"]
//! args = ["--verbose"]
//!
//! [jvm]                        # JVM flags recorded in the container
//! properties = { "file.encoding" = "UTF-8" }
//! add_opens = ["java.base/java.lang=org.example"]
//! options = [{ when = "os(windows)", option = "-Dsun.stdout.encoding=UTF-8" }]
//!
//! [compression]
//! method = "zstd"              # none | deflate | zstd | lz4
//! level = 19
//!
//! [copy]                       # Install into a shared directory
//! dir = "../dist"
//! name = "hello"
//! ```

use crate::collector::InputSpec;
use crate::compress::CompressionMethod;
use crate::launch::ConditionalOption;
use crate::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// File names searched by [`Manifest::find_in_dir`], in order
pub const MANIFEST_FILE_NAMES: &[&str] = &["japp.toml", ".japp/japp.toml"];

/// Normalize a path by removing `.` and resolving `..` components
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

/// Root manifest structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Package metadata
    pub package: PackageConfig,

    /// Launcher stub and boot module
    #[serde(default)]
    pub launcher: LauncherConfig,

    /// Application inputs and entry point
    #[serde(default)]
    pub app: AppConfig,

    /// JVM flags
    #[serde(default)]
    pub jvm: JvmConfig,

    /// Compression settings
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Copy to a shared directory after packing
    #[serde(default)]
    pub copy: Option<CopyConfig>,
}

/// Package metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Package name (default output file name)
    pub name: String,

    /// Package version
    #[serde(default = "default_version")]
    pub version: String,

    /// Output file, relative to the manifest
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// `[launcher]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Launcher executable used as the stub
    #[serde(default)]
    pub stub: Option<PathBuf>,

    /// Boot module jar
    #[serde(default)]
    pub boot: Option<PathBuf>,
}

/// `[app]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Main class
    #[serde(default)]
    pub main_class: Option<String>,

    /// Main module, `module` or `module/class`
    #[serde(default)]
    pub main_module: Option<String>,

    /// Module path inputs
    #[serde(default)]
    pub module_path: Vec<String>,

    /// Class path inputs
    #[serde(default)]
    pub class_path: Vec<String>,

    /// Default application arguments
    #[serde(default)]
    pub args: Vec<String>,
}

/// `[jvm]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JvmConfig {
    /// System properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub add_opens: Vec<String>,

    #[serde(default)]
    pub add_exports: Vec<String>,

    #[serde(default)]
    pub add_reads: Vec<String>,

    #[serde(default)]
    pub enable_native_access: Vec<String>,

    /// Guarded JVM options
    #[serde(default)]
    pub options: Vec<ConditionalOption>,
}

/// `[compression]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Default method for compressible resources
    #[serde(default)]
    pub method: CompressionMethod,

    /// Level; the method's default when omitted
    #[serde(default)]
    pub level: Option<i32>,

    /// Extra extensions that are always stored
    #[serde(default)]
    pub store: Vec<String>,
}

/// `[copy]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Target directory, relative to the manifest
    pub dir: PathBuf,

    /// File name inside `dir`
    #[serde(default)]
    pub name: Option<String>,
}

impl Manifest {
    /// Load manifest from file
    pub fn from_file(path: impl AsRef<Path>) -> PackResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PackError::Config(format!(
                "Failed to read manifest file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse manifest from TOML string
    pub fn parse(content: &str) -> PackResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Find manifest file in directory
    pub fn find_in_dir(dir: impl AsRef<Path>) -> Option<PathBuf> {
        let dir = dir.as_ref();
        MANIFEST_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Validate the manifest configuration
    pub fn validate(&self) -> PackResult<()> {
        if self.package.name.trim().is_empty() {
            return Err(PackError::InvalidManifest(
                "[package] name cannot be empty".to_string(),
            ));
        }

        if self.app.main_class.is_none() && self.app.main_module.is_none() {
            return Err(PackError::InvalidManifest(
                "[app] needs main_class or main_module".to_string(),
            ));
        }

        if self.app.module_path.is_empty() && self.app.class_path.is_empty() {
            return Err(PackError::InvalidManifest(
                "[app] needs module_path or class_path entries".to_string(),
            ));
        }

        for spec in self.app.module_path.iter().chain(&self.app.class_path) {
            spec.parse::<InputSpec>().map_err(|e| {
                PackError::InvalidManifest(format!("Invalid input '{}': {}", spec, e))
            })?;
        }

        if let Some(option) = self.jvm.options.iter().find(|o| o.option.trim().is_empty()) {
            return Err(PackError::InvalidManifest(format!(
                "[jvm] empty option guarded by '{}'",
                option.when
            )));
        }

        if let Some(level) = self.compression.level {
            let valid = match self.compression.method {
                CompressionMethod::Deflate => (0..=9).contains(&level),
                CompressionMethod::Zstd => (1..=22).contains(&level),
                CompressionMethod::None | CompressionMethod::Lz4 => true,
            };
            if !valid {
                return Err(PackError::InvalidManifest(format!(
                    "Compression level {} is out of range for {}",
                    level, self.compression.method
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_minimal_manifest() {
        let manifest = Manifest::parse(
            r#"
[package]
name = "hello"

[app]
main_class = "org.example.Main"
class_path = ["libs/*"]
"#,
        )
        .unwrap();
        assert_eq!(manifest.package.version, "0.1.0");
        assert_eq!(manifest.compression.method, CompressionMethod::Deflate);
        assert!(manifest.copy.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_level_range() {
        let manifest = Manifest::parse(
            r#"
[package]
name = "hello"

[app]
main_class = "a.Main"
class_path = ["a.jar"]

[compression]
method = "deflate"
level = 12
"#,
        )
        .unwrap();
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
