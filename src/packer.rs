//! Main packer implementation

use crate::collector;
use crate::container::{copy_stub, ContainerWriter};
use crate::progress::{PackProgress, ProgressExt};
use crate::{Manifest, PackConfig, PackError, PackResult};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of a pack operation
#[derive(Debug, Clone)]
pub struct PackOutput {
    /// Path to the generated executable
    pub executable: PathBuf,
    /// Size of the executable in bytes
    pub size: u64,
    /// Size of the launcher stub in front of the container
    pub stub_size: u64,
    /// Number of resource groups
    pub group_count: usize,
    /// Number of packed resources (boot module included)
    pub resource_count: usize,
    /// Hash over all payloads
    pub content_hash: String,
    /// Copy made into the shared directory, if configured
    pub installed: Option<PathBuf>,
}

impl PackOutput {
    /// Copy the executable into `dir` as `name` (its own file name when `None`)
    pub fn install_into(&self, dir: &Path, name: Option<&str>) -> PackResult<PathBuf> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .executable
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    PackError::Config(format!(
                        "Output has no file name: {}",
                        self.executable.display()
                    ))
                })?,
        };

        fs::create_dir_all(dir)?;
        let dest = dir.join(name);
        fs::copy(&self.executable, &dest)?;
        tracing::info!("Copied {} to {}", self.executable.display(), dest.display());
        Ok(dest)
    }
}

/// Main packer for creating self-contained executables
pub struct Packer {
    config: PackConfig,
    progress: Option<PackProgress>,
}

impl Packer {
    /// Create a new packer with configuration
    pub fn new(config: PackConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Create a packer from a manifest file
    pub fn from_manifest(manifest: &Manifest, base_dir: &Path) -> PackResult<Self> {
        manifest.validate()?;
        let config = PackConfig::from_manifest(manifest, base_dir)?;
        Ok(Self::new(config))
    }

    /// Report progress while packing
    pub fn with_progress(mut self, progress: PackProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The configuration being packed
    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Pack the application into a self-contained executable
    ///
    /// The launcher stub is copied (without any container it already
    /// carries), then module path and class path inputs are appended in
    /// order, followed by the boot module and the metadata. The result is
    /// written next to the output and renamed into place.
    pub fn pack(&self) -> PackResult<PackOutput> {
        let config = &self.config;
        config.validate()?;

        let launcher = config.resolve_launcher()?;
        let output_path = config.output_path();
        fs::create_dir_all(&config.output_dir)?;

        tracing::info!("Packing to: {}", output_path.display());

        let temp = tempfile::NamedTempFile::new_in(&config.output_dir)?;
        let mut out = BufWriter::new(temp.as_file().try_clone()?);

        let stub_size = copy_stub(&launcher, &mut out)?;
        tracing::info!("Launcher stub: {} ({} bytes)", launcher.display(), stub_size);

        let mut writer = ContainerWriter::new(out, stub_size, Arc::new(config.compressor()))?;

        let total = (config.module_path.len() + config.class_path.len()) as u64;
        let bar = self
            .progress
            .as_ref()
            .map(|p| p.inputs(total, "Collecting inputs"));

        let inputs = config
            .module_path
            .iter()
            .map(|spec| (spec, true))
            .chain(config.class_path.iter().map(|spec| (spec, false)));

        for (spec, is_module_path) in inputs {
            if let Some(ref pb) = bar {
                pb.tick_with_message(&spec.path);
            }
            if let Err(e) = collector::process(&mut writer, spec, is_module_path) {
                if let Some(ref pb) = bar {
                    pb.finish_error(&format!("{}: {}", spec, e));
                }
                return Err(e);
            }
        }

        if let Some(ref pb) = bar {
            pb.finish_success(&format!(
                "Collected {} module(s), {} class path item(s)",
                writer.module_path().len(),
                writer.class_path().len()
            ));
        }

        if let Some(ref boot) = config.boot_jar {
            let data = fs::read(boot)?;
            tracing::info!("Embedding boot module {} ({} bytes)", boot.display(), data.len());
            writer.set_boot(data)?;
        } else {
            tracing::warn!("No boot module embedded; launching will need JAPP_BOOT_JAR");
            if let Some(ref progress) = self.progress {
                progress.info("No boot module embedded; set JAPP_BOOT_JAR when launching");
            }
        }

        let spinner = self
            .progress
            .as_ref()
            .map(|p| p.spinner("Writing metadata"));
        let (out, summary) = match writer.finish(config.launch.clone()) {
            Ok(finished) => finished,
            Err(e) => {
                if let Some(ref pb) = spinner {
                    pb.finish_error(&e.to_string());
                }
                return Err(e);
            }
        };
        if let Some(ref pb) = spinner {
            pb.finish_success(&format!("Wrote {} resource group(s)", summary.group_count));
        }
        let file: File = out
            .into_inner()
            .map_err(|e| PackError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        make_executable(temp.path())?;
        temp.persist(&output_path)
            .map_err(|e| PackError::Io(e.error))?;

        let size = fs::metadata(&output_path)?.len();

        tracing::info!(
            "Pack complete: {} ({:.2} MB)",
            output_path.display(),
            size as f64 / (1024.0 * 1024.0)
        );

        let mut output = PackOutput {
            executable: output_path,
            size,
            stub_size,
            group_count: summary.group_count,
            resource_count: summary.resource_count,
            content_hash: summary.content_hash,
            installed: None,
        };

        if let Some(ref dir) = config.copy_to {
            output.installed = Some(output.install_into(dir, config.copy_name.as_deref())?);
        }

        if let Some(ref progress) = self.progress {
            progress.success(&format!(
                "{} ({} resources)",
                output.executable.display(),
                output.resource_count
            ));
        }

        Ok(output)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> PackResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> PackResult<()> {
    Ok(())
}
