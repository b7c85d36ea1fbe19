//! Starting a packed application
//!
//! The launcher recovers the container of a packed file, makes the boot
//! module available on disk and starts `java` with the boot module as the
//! only module path entry. Everything else the boot module needs is passed
//! as system properties:
//!
//! | Property                                | Value                               |
//! |-----------------------------------------|-------------------------------------|
//! | `org.glavo.japp.file`                   | packed file                         |
//! | `org.glavo.japp.file.offset`            | base offset (hex)                   |
//! | `org.glavo.japp.file.metadata.offset`   | metadata offset from base (hex)     |
//! | `org.glavo.japp.file.metadata.size`     | metadata size (hex)                 |
//! | `org.glavo.japp.modules`                | `name:ref` items joined by `,`      |
//! | `org.glavo.japp.classpath`              | `name:ref` items joined by `,`      |
//! | `org.glavo.japp.mainClass`              | main class                          |
//! | `org.glavo.mainModule`                  | main module                         |
//! | `org.glavo.japp.addopens.<n>`           | `module/package=target,...`         |
//! | `org.glavo.japp.addexports.<n>`         | `module/package=target,...`         |
//! | `org.glavo.japp.addreads.<n>`           | `module=target,...`                 |
//! | `org.glavo.japp.enableNativeAccess`     | modules joined by `,`               |

use crate::condition::RuntimeContext;
use crate::container::{ContainerLayout, ContainerReader, BOOT_RESOURCE_NAME};
use crate::launch::LaunchConfig;
use crate::metrics::LaunchMetrics;
use crate::resource::PathItem;
use crate::{PackError, PackResult};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// Property namespace read by the boot module
pub const PROPERTY_PREFIX: &str = "org.glavo.japp";

/// Name of the boot module
pub const BOOT_MODULE: &str = "org.glavo.japp";

/// Entry point inside the boot module
pub const BOOT_MAIN_CLASS: &str = "org.glavo.japp.launcher.BootLauncher";

/// Main module property; lives outside [`PROPERTY_PREFIX`]
pub const MAIN_MODULE_PROPERTY: &str = "org.glavo.mainModule";

#[cfg(windows)]
const JAVA_EXECUTABLE: &str = "java.exe";
#[cfg(not(windows))]
const JAVA_EXECUTABLE: &str = "java";

/// Where the launcher finds its collaborators
#[derive(Debug, Clone, Default)]
pub struct LauncherOptions {
    /// Explicit `java` executable
    pub java: Option<PathBuf>,
    /// Boot module used when the container embeds none
    pub boot_jar: Option<PathBuf>,
    /// Root for extracted files
    pub cache_dir: Option<PathBuf>,
    /// Java feature version, skipping detection
    pub java_version: Option<u32>,
}

impl LauncherOptions {
    /// Options from `JAPP_JAVA`, `JAPP_BOOT_JAR`, `JAPP_CACHE_DIR` and `JAPP_JAVA_VERSION`
    pub fn from_env() -> Self {
        let path_var = |name: &str| env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            java: path_var("JAPP_JAVA"),
            boot_jar: path_var("JAPP_BOOT_JAR"),
            cache_dir: path_var("JAPP_CACHE_DIR"),
            java_version: env::var("JAPP_JAVA_VERSION")
                .ok()
                .and_then(|v| parse_java_version(&v)),
        }
    }
}

/// Find the `java` executable
///
/// Order: `explicit`, `$JAVA_HOME/bin/java`, then the `PATH`.
pub fn find_java(explicit: Option<&Path>) -> PackResult<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(PackError::Launch(format!(
            "Java executable not found: {}",
            path.display()
        )));
    }

    if let Some(home) = env::var_os("JAVA_HOME").filter(|v| !v.is_empty()) {
        let candidate = PathBuf::from(home).join("bin").join(JAVA_EXECUTABLE);
        if candidate.is_file() {
            return Ok(candidate);
        }
        tracing::warn!("JAVA_HOME does not contain {}", candidate.display());
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let candidate = dir.join(JAVA_EXECUTABLE);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(PackError::Launch(
        "Cannot find java; set JAVA_HOME or add java to PATH".to_string(),
    ))
}

/// Feature version from a version string (`17.0.2`, `1.8.0_392`, `21-ea`)
pub fn parse_java_version(version: &str) -> Option<u32> {
    let version = version.trim().trim_matches('"');
    let mut parts = version.split(|c: char| !c.is_ascii_digit());
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(first)
    }
}

/// Feature version from the text of a JDK `release` file
pub fn parse_release_file(text: &str) -> Option<u32> {
    text.lines().find_map(|line| {
        line.trim()
            .strip_prefix("JAVA_VERSION=")
            .and_then(parse_java_version)
    })
}

/// Feature version of the runtime owning `java`, read from its `release` file
pub fn detect_java_version(java: &Path) -> Option<u32> {
    // <home>/bin/java
    let home = java.parent()?.parent()?;
    let text = fs::read_to_string(home.join("release")).ok()?;
    parse_release_file(&text)
}

/// Default root for extracted files
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(env::temp_dir)
}

/// System properties handed to the boot module, in command line order
pub fn boot_properties(
    file: &Path,
    layout: ContainerLayout,
    launch: &LaunchConfig,
    java_version: Option<u32>,
) -> Vec<(String, String)> {
    let key = |suffix: &str| format!("{}.{}", PROPERTY_PREFIX, suffix);
    let items = |items: &[PathItem]| {
        items
            .iter()
            .map(|item| item.encode(java_version))
            .collect::<Vec<_>>()
            .join(",")
    };

    let mut properties = vec![
        (key("file"), file.to_string_lossy().into_owned()),
        (key("file.offset"), format!("{:x}", layout.base_offset)),
        (
            key("file.metadata.offset"),
            format!("{:x}", layout.metadata_offset),
        ),
        (
            key("file.metadata.size"),
            format!("{:x}", layout.metadata_size),
        ),
    ];

    if !launch.module_path.is_empty() {
        properties.push((key("modules"), items(&launch.module_path)));
    }
    if !launch.class_path.is_empty() {
        properties.push((key("classpath"), items(&launch.class_path)));
    }
    if let Some(ref main_class) = launch.main_class {
        properties.push((key("mainClass"), main_class.clone()));
    }
    if let Some(ref main_module) = launch.main_module {
        properties.push((MAIN_MODULE_PROPERTY.to_string(), main_module.clone()));
    }

    for (kind, values) in [
        ("addopens", &launch.add_opens),
        ("addexports", &launch.add_exports),
        ("addreads", &launch.add_reads),
    ] {
        for (i, value) in values.iter().enumerate() {
            properties.push((key(&format!("{}.{}", kind, i)), value.clone()));
        }
    }

    if !launch.enable_native_access.is_empty() {
        properties.push((
            key("enableNativeAccess"),
            launch.enable_native_access.join(","),
        ));
    }

    for (name, value) in &launch.properties {
        properties.push((name.clone(), value.clone()));
    }

    properties
}

/// A composed `java` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// The `java` executable
    pub program: PathBuf,
    /// Arguments after the program
    pub args: Vec<String>,
}

impl LaunchCommand {
    /// Compose the command for a packed file
    pub fn compose(
        java: &Path,
        boot: &Path,
        file: &Path,
        layout: ContainerLayout,
        launch: &LaunchConfig,
        context: &RuntimeContext,
        user_args: &[String],
    ) -> Self {
        let mut args = vec![
            "--module-path".to_string(),
            boot.to_string_lossy().into_owned(),
        ];

        args.extend(
            boot_properties(file, layout, launch, context.java_version)
                .into_iter()
                .map(|(name, value)| format!("-D{}={}", name, value)),
        );
        args.extend(launch.active_jvm_options(context).map(str::to_string));

        args.extend([
            format!("--add-exports=java.base/jdk.internal.loader={}", BOOT_MODULE),
            format!("--add-exports=java.base/jdk.internal.module={}", BOOT_MODULE),
            format!("--add-opens=java.base/jdk.internal.loader={}", BOOT_MODULE),
            "--module".to_string(),
            format!("{}/{}", BOOT_MODULE, BOOT_MAIN_CLASS),
        ]);

        args.extend(launch.args.iter().cloned());
        args.extend(user_args.iter().cloned());

        Self {
            program: java.to_path_buf(),
            args,
        }
    }

    /// Process builder inheriting stdio
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Recovers a container and starts its application
#[derive(Debug)]
pub struct Launcher {
    options: LauncherOptions,
    metrics: Option<LaunchMetrics>,
}

impl Launcher {
    /// Create a launcher
    pub fn new(options: LauncherOptions) -> Self {
        let metrics = LaunchMetrics::enabled().then(LaunchMetrics::new);
        Self { options, metrics }
    }

    /// Launcher configured from the environment
    pub fn from_env() -> Self {
        Self::new(LauncherOptions::from_env())
    }

    /// Record startup timings regardless of `JAPP_METRICS`
    pub fn with_metrics(mut self, metrics: LaunchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Startup timings, when recorded
    pub fn metrics(&self) -> Option<&LaunchMetrics> {
        self.metrics.as_ref()
    }

    /// Compose the `java` command for `file` without running it
    pub fn prepare(&mut self, file: &Path, user_args: &[String]) -> PackResult<LaunchCommand> {
        let file = fs::canonicalize(file)?;
        let mut reader = ContainerReader::open_with_metrics(&file, self.metrics.as_mut())?
            .ok_or_else(|| {
                PackError::InvalidContainer(format!("{} is not a packed file", file.display()))
            })?;

        let java = find_java(self.options.java.as_deref())?;
        let configured = self.options.java_version;
        let detect = || configured.or_else(|| detect_java_version(&java));
        let java_version = match self.metrics {
            Some(ref mut m) => m.time_phase("Java version", detect),
            None => detect(),
        };
        match java_version {
            Some(v) => tracing::debug!("Using {} (Java {})", java.display(), v),
            None => tracing::warn!(
                "Cannot detect the version of {}; multi-release resources are ignored",
                java.display()
            ),
        }

        let boot = self.resolve_boot(&mut reader)?;
        if let Some(ref mut m) = self.metrics {
            m.mark_boot_ready();
        }

        let context = RuntimeContext::current(java_version);
        let command = LaunchCommand::compose(
            &java,
            &boot,
            &file,
            reader.layout(),
            &reader.metadata().launch,
            &context,
            user_args,
        );
        if let Some(ref mut m) = self.metrics {
            m.mark_command_built();
        }

        tracing::debug!("Command: {}", command);
        Ok(command)
    }

    /// Run `file` and wait, returning the exit code of the application
    pub fn run(mut self, file: &Path, user_args: &[String]) -> PackResult<i32> {
        let command = self.prepare(file, user_args)?;

        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| PackError::Launch(format!("Cannot start {}: {}", command.program.display(), e)))?;

        if let Some(ref mut m) = self.metrics {
            m.mark_spawned();
            m.log_report();
        }

        let status = child.wait()?;
        Ok(exit_code(status))
    }

    fn resolve_boot(&self, reader: &mut ContainerReader) -> PackResult<PathBuf> {
        if let Some(boot) = reader.metadata().boot.clone() {
            let root = self
                .options
                .cache_dir
                .clone()
                .unwrap_or_else(default_cache_dir);
            let dest = root
                .join("japp")
                .join(&reader.metadata().content_hash)
                .join(BOOT_RESOURCE_NAME);

            let cached = fs::metadata(&dest).is_ok_and(|m| m.is_file() && m.len() == boot.size);
            if cached {
                tracing::debug!("Boot module cached at {}", dest.display());
            } else {
                tracing::debug!("Extracting boot module to {}", dest.display());
                reader.extract_boot(&dest)?;
            }
            return Ok(dest);
        }

        match self.options.boot_jar {
            Some(ref jar) if jar.is_file() => Ok(jar.clone()),
            Some(ref jar) => Err(PackError::Launch(format!(
                "Boot module not found: {}",
                jar.display()
            ))),
            None => Err(PackError::Launch(
                "No boot module embedded; set JAPP_BOOT_JAR".to_string(),
            )),
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_java_version() {
        assert_eq!(parse_java_version("17.0.2"), Some(17));
        assert_eq!(parse_java_version("\"1.8.0_392\""), Some(8));
        assert_eq!(parse_java_version("21-ea"), Some(21));
        assert_eq!(parse_java_version("11"), Some(11));
        assert_eq!(parse_java_version("ea"), None);
    }

    #[test]
    fn test_parse_release_file() {
        let text = "IMPLEMENTOR=\"Eclipse Adoptium\"\nJAVA_VERSION=\"21.0.1\"\nOS_NAME=\"Linux\"\n";
        assert_eq!(parse_release_file(text), Some(21));
        assert_eq!(parse_release_file("OS_NAME=\"Linux\"\n"), None);
    }

    #[test]
    fn test_command_display_quotes_spaces() {
        let command = LaunchCommand {
            program: PathBuf::from("java"),
            args: vec!["-Da=b c".to_string(), "x".to_string()],
        };
        assert_eq!(command.to_string(), "java \"-Da=b c\" x");
    }
}
