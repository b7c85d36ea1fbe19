//! JApp Pack - Self-Contained JVM Application Packaging
//!
//! This crate packs a JVM application (module path, class path, launch
//! flags) into a single executable file and starts it again from there.
//!
//! # Design
//!
//! The `japp` binary is both the packer and the launcher:
//!
//! 1. During `pack`, a launcher stub (by default the `japp` binary itself) is
//!    copied and a container holding every jar entry and class file is
//!    appended to it
//! 2. On startup, a packed file finds its container, extracts the boot
//!    module if needed and runs `java` with the boot module, which reads the
//!    remaining resources straight out of the packed file
//!
//! Each resource is compressed on its own, so the boot module can load a
//! single class without inflating the rest of the application.
//!
//! # Quick Start
//!
//! ```bash
//! # Pack a class path application
//! japp pack --class-path 'libs/*' --class-path build/classes \
//!     --main-class org.example.Main --boot boot/japp-boot.jar --output hello
//!
//! # Pack from a manifest
//! japp pack --config japp.toml
//!
//! # Run it
//! ./hello --some-arg
//! ```
//!
//! # Library Usage
//!
//! ```no_run
//! use japp_pack::{InputSpec, PackConfig, Packer};
//!
//! let config = PackConfig::new("hello")
//!     .with_class_path(InputSpec::new("libs/*"))
//!     .with_main_class("org.example.Main")
//!     .with_boot_jar("boot/japp-boot.jar");
//! let output = Packer::new(config).pack()?;
//! println!("{} ({} bytes)", output.executable.display(), output.size);
//! # Ok::<(), japp_pack::PackError>(())
//! ```
//!
//! See [`container`] for the byte layout.

pub mod collector;
pub mod compress;
pub mod condition;
mod config;
pub mod container;
mod error;
pub mod launch;
pub mod launcher;
mod manifest;
mod metrics;
pub mod module_info;
mod packer;
pub mod progress;
pub mod resource;

pub use collector::InputSpec;
pub use compress::{CompressionMethod, Compressor, DefaultCompressor};
pub use condition::{Condition, RuntimeContext};
pub use config::{PackConfig, BUILD_LAUNCHER};
pub use container::{
    BootMetadata, ContainerLayout, ContainerReader, ContainerSummary, ContainerWriter,
    CONTAINER_MAGIC, CONTAINER_VERSION,
};
pub use error::{PackError, PackResult};
pub use launch::{ConditionalOption, LaunchConfig};
pub use launcher::{LaunchCommand, Launcher, LauncherOptions};
pub use manifest::{
    AppConfig, CompressionConfig, CopyConfig, JvmConfig, LauncherConfig, Manifest, PackageConfig,
};
pub use metrics::LaunchMetrics;
pub use packer::{PackOutput, Packer};
pub use progress::{PackProgress, ProgressExt, ProgressStyles};
pub use resource::{GroupReference, PathItem, Resource, ResourceGroup};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if the current executable carries a container (is a packed app)
pub fn is_packed() -> bool {
    let exe_path = match std::env::current_exe() {
        Ok(p) => p,
        Err(_) => return false,
    };
    ContainerReader::has_container(&exe_path).unwrap_or(false)
}

/// Open the container of the current executable
pub fn open_current() -> PackResult<Option<ContainerReader>> {
    let exe_path = std::env::current_exe()?;
    ContainerReader::open(&exe_path)
}
