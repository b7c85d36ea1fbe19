//! Pack configuration types
//!
//! [`PackConfig`] is the merged result of defaults, a `japp.toml` manifest
//! and command line flags. The packer only ever sees this type.

use crate::collector::InputSpec;
use crate::compress::{CompressionMethod, DefaultCompressor};
use crate::launch::{ConditionalOption, LaunchConfig};
use crate::manifest::{normalize_path, Manifest};
use crate::{PackError, PackResult};
use std::path::{Path, PathBuf};

/// Launcher reference recorded when this crate was built
pub const BUILD_LAUNCHER: Option<&str> = option_env!("JAPP_LAUNCHER");

/// Runtime configuration for the packer
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Output file name without platform extension
    pub output_name: String,

    /// Output directory
    pub output_dir: PathBuf,

    /// Launcher stub; see [`PackConfig::resolve_launcher`]
    pub launcher: Option<PathBuf>,

    /// Boot module jar embedded into the output
    pub boot_jar: Option<PathBuf>,

    /// Module path inputs, in order
    pub module_path: Vec<InputSpec>,

    /// Class path inputs, in order
    pub class_path: Vec<InputSpec>,

    /// Launch manifest; its module and class path are filled while packing
    pub launch: LaunchConfig,

    /// Default compression method
    pub compression: CompressionMethod,

    /// Compression level, method default when unset
    pub compression_level: Option<i32>,

    /// Extra extensions that are always stored
    pub store_extensions: Vec<String>,

    /// Shared directory the output is copied into after packing
    pub copy_to: Option<PathBuf>,

    /// File name used inside `copy_to`, the output file name when unset
    pub copy_name: Option<String>,
}

impl PackConfig {
    /// Create a configuration writing `output_name` into the current directory
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
            output_dir: PathBuf::from("."),
            launcher: None,
            boot_jar: None,
            module_path: Vec::new(),
            class_path: Vec::new(),
            launch: LaunchConfig::new(),
            compression: CompressionMethod::default(),
            compression_level: None,
            store_extensions: Vec::new(),
            copy_to: None,
            copy_name: None,
        }
    }

    /// Set the output name
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    /// Set the output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the launcher stub
    pub fn with_launcher(mut self, path: impl Into<PathBuf>) -> Self {
        self.launcher = Some(path.into());
        self
    }

    /// Set the boot module jar
    pub fn with_boot_jar(mut self, path: impl Into<PathBuf>) -> Self {
        self.boot_jar = Some(path.into());
        self
    }

    /// Append a module path input
    pub fn with_module_path(mut self, spec: InputSpec) -> Self {
        self.module_path.push(spec);
        self
    }

    /// Append a class path input
    pub fn with_class_path(mut self, spec: InputSpec) -> Self {
        self.class_path.push(spec);
        self
    }

    /// Set the main class
    pub fn with_main_class(mut self, class: impl Into<String>) -> Self {
        self.launch.main_class = Some(class.into());
        self
    }

    /// Set the main module from `module` or `module/class`
    pub fn with_main_module(mut self, spec: &str) -> Self {
        self.launch = self.launch.with_main_module(spec);
        self
    }

    /// Replace the launch manifest
    pub fn with_launch(mut self, launch: LaunchConfig) -> Self {
        self.launch = launch;
        self
    }

    /// Add a system property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.launch.properties.insert(key.into(), value.into());
        self
    }

    /// Add a guarded JVM option
    pub fn with_jvm_option(mut self, option: ConditionalOption) -> Self {
        self.launch.jvm_options.push(option);
        self
    }

    /// Set the compression method
    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Set the compression level
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = Some(level);
        self
    }

    /// Copy the output into `dir` after packing
    pub fn with_copy_to(mut self, dir: impl Into<PathBuf>, name: Option<String>) -> Self {
        self.copy_to = Some(dir.into());
        self.copy_name = name;
        self
    }

    /// Output file name with the platform extension
    pub fn exe_name(&self) -> String {
        #[cfg(target_os = "windows")]
        {
            format!("{}.exe", self.output_name)
        }
        #[cfg(not(target_os = "windows"))]
        {
            self.output_name.clone()
        }
    }

    /// Full path of the output file
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.exe_name())
    }

    /// Compressor for this configuration
    pub fn compressor(&self) -> DefaultCompressor {
        let extensions: Vec<&str> = self.store_extensions.iter().map(String::as_str).collect();
        let compressor = DefaultCompressor::new(self.compression).store_extensions(&extensions);
        match self.compression_level {
            Some(level) => compressor.with_level(level),
            None => compressor,
        }
    }

    /// Locate the launcher stub
    ///
    /// Order: configured path, `JAPP_LAUNCHER` at run time, `JAPP_LAUNCHER`
    /// at build time, then the running executable.
    pub fn resolve_launcher(&self) -> PackResult<PathBuf> {
        let (path, source) = if let Some(ref path) = self.launcher {
            (path.clone(), "configuration")
        } else if let Some(path) = std::env::var_os("JAPP_LAUNCHER").filter(|v| !v.is_empty()) {
            (PathBuf::from(path), "JAPP_LAUNCHER")
        } else if let Some(path) = BUILD_LAUNCHER.filter(|v| !v.is_empty()) {
            (PathBuf::from(path), "build")
        } else {
            (std::env::current_exe()?, "current executable")
        };

        if !path.is_file() {
            return Err(PackError::Config(format!(
                "Launcher not found: {} (from {})",
                path.display(),
                source
            )));
        }
        tracing::debug!("Launcher stub {} (from {})", path.display(), source);
        Ok(path)
    }

    /// Check the configuration before packing
    pub fn validate(&self) -> PackResult<()> {
        if self.output_name.is_empty() {
            return Err(PackError::Config("Output name cannot be empty".to_string()));
        }
        if self.output_name.contains(['/', '\\']) {
            return Err(PackError::Config(format!(
                "Output name must be a file name: {}",
                self.output_name
            )));
        }
        if self.module_path.is_empty() && self.class_path.is_empty() {
            return Err(PackError::Config(
                "Nothing to pack: module path and class path are empty".to_string(),
            ));
        }
        if let Some(ref boot) = self.boot_jar {
            if !boot.is_file() {
                return Err(PackError::InputNotFound(boot.clone()));
            }
        }
        if let Some(ref name) = self.copy_name {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(PackError::Config(format!("Invalid copy name: '{}'", name)));
            }
        }
        self.launch.validate()
    }

    /// Create a configuration from a manifest
    ///
    /// Relative paths are resolved against `base_dir`, the manifest's directory.
    pub fn from_manifest(manifest: &Manifest, base_dir: &Path) -> PackResult<Self> {
        let resolve_path = |p: &Path| -> PathBuf {
            let joined = if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            };
            normalize_path(&joined)
        };

        tracing::debug!(
            "Manifest package {} {}",
            manifest.package.name,
            manifest.package.version
        );
        let mut config = Self::new(manifest.package.name.clone());

        if let Some(ref output) = manifest.package.output {
            let output = resolve_path(output);
            if let Some(name) = output.file_name() {
                config.output_name = name.to_string_lossy().into_owned();
            }
            if let Some(parent) = output.parent() {
                config.output_dir = parent.to_path_buf();
            }
        } else {
            config.output_dir = normalize_path(base_dir);
        }

        config.launcher = manifest.launcher.stub.as_deref().map(resolve_path);
        config.boot_jar = manifest.launcher.boot.as_deref().map(resolve_path);

        let resolve_inputs = |specs: &[String]| -> PackResult<Vec<InputSpec>> {
            specs
                .iter()
                .map(|s| Ok(s.parse::<InputSpec>()?.resolved_against(base_dir)))
                .collect()
        };
        config.module_path = resolve_inputs(&manifest.app.module_path)?;
        config.class_path = resolve_inputs(&manifest.app.class_path)?;

        let app = &manifest.app;
        let jvm = &manifest.jvm;
        let mut launch = LaunchConfig::new();
        if let Some(ref module) = app.main_module {
            launch = launch.with_main_module(module);
        }
        if let Some(ref class) = app.main_class {
            launch.main_class = Some(class.clone());
        }
        launch.args = app.args.clone();
        launch.properties = jvm.properties.clone();
        launch.add_opens = jvm.add_opens.clone();
        launch.add_exports = jvm.add_exports.clone();
        launch.add_reads = jvm.add_reads.clone();
        launch.enable_native_access = jvm.enable_native_access.clone();
        launch.jvm_options = jvm.options.clone();
        config.launch = launch;

        config.compression = manifest.compression.method;
        config.compression_level = manifest.compression.level;
        config.store_extensions = manifest.compression.store.clone();

        if let Some(ref copy) = manifest.copy {
            config.copy_to = Some(resolve_path(&copy.dir));
            config.copy_name = copy.name.clone();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_inputs_and_entry_point() {
        let config = PackConfig::new("app").with_main_class("a.Main");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Nothing to pack"));

        let config = PackConfig::new("app").with_class_path(InputSpec::new("libs/*"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("No main class specified"));

        let config = config.with_main_class("a.Main");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_path_like_names() {
        let config = PackConfig::new("bin/app")
            .with_class_path(InputSpec::new("libs/*"))
            .with_main_class("a.Main");
        assert!(config.validate().is_err());

        let config = PackConfig::new("app")
            .with_class_path(InputSpec::new("libs/*"))
            .with_main_class("a.Main")
            .with_copy_to("/tmp/shared", Some("../x".into()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_launcher_must_exist() {
        let config = PackConfig::new("app").with_launcher("/nonexistent/launcher");
        let err = config.resolve_launcher().unwrap_err();
        assert!(err.to_string().contains("Launcher not found"));
    }

    #[test]
    fn test_compressor_settings() {
        let compressor = PackConfig::new("app")
            .with_compression(CompressionMethod::Zstd)
            .with_compression_level(19)
            .compressor();
        assert_eq!(compressor.method(), CompressionMethod::Zstd);
        assert_eq!(compressor.level(), 19);
    }
}
