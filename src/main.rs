use clap::{Args, Parser, Subcommand};
use japp_pack::launch::parse_property;
use japp_pack::{
    CompressionMethod, ConditionalOption, ContainerReader, GroupReference, InputSpec,
    LaunchMetrics, Launcher, Manifest, PackConfig, PackError, PackProgress, PackResult, Packer,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "japp", version, about = "Pack JVM applications into a single executable")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pack an application
    Pack(PackArgs),

    /// Run a packed file
    Run {
        file: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show the container of a packed file
    Inspect {
        file: PathBuf,
        /// Print the raw metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract packed resources into a directory
    Extract {
        file: PathBuf,
        dest: PathBuf,
        /// Extract a single group by index
        #[arg(long)]
        group: Option<usize>,
        /// Apply multi-release overlays up to this Java version
        #[arg(long)]
        java_version: Option<u32>,
    },
}

#[derive(Debug, Args)]
struct PackArgs {
    /// Manifest file (default: japp.toml in the current directory, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file name
    #[arg(short, long)]
    output: Option<String>,

    /// Output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Launcher stub
    #[arg(long)]
    launcher: Option<PathBuf>,

    /// Boot module jar to embed
    #[arg(long)]
    boot: Option<PathBuf>,

    /// Module path input (`path[?name=..,external]`)
    #[arg(short = 'p', long = "module-path")]
    module_path: Vec<String>,

    /// Class path input (`path[?name=..,external]`, `dir/*`)
    #[arg(long = "class-path", visible_alias = "cp")]
    class_path: Vec<String>,

    #[arg(long)]
    main_class: Option<String>,

    /// `module` or `module/class`
    #[arg(short = 'm', long)]
    main_module: Option<String>,

    /// System property `key=value`
    #[arg(short = 'D', long = "property")]
    properties: Vec<String>,

    #[arg(long)]
    add_opens: Vec<String>,

    #[arg(long)]
    add_exports: Vec<String>,

    #[arg(long)]
    add_reads: Vec<String>,

    #[arg(long)]
    enable_native_access: Vec<String>,

    /// JVM option, optionally guarded: `-Xss4m` or `os(windows):-Dfoo=bar`
    #[arg(long = "jvm-option", allow_hyphen_values = true)]
    jvm_options: Vec<String>,

    /// none, deflate, zstd or lz4
    #[arg(long)]
    compression: Option<CompressionMethod>,

    #[arg(long)]
    level: Option<i32>,

    /// Copy the result into this directory
    #[arg(long)]
    copy_to: Option<PathBuf>,

    /// File name used with --copy-to
    #[arg(long, requires = "copy_to")]
    copy_name: Option<String>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Default application arguments (after `--`)
    #[arg(last = true)]
    args: Vec<String>,
}

fn init_logger(verbose: bool, default: &str) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("japp_pack=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

fn main() -> ExitCode {
    // A packed executable hands every argument to the application.
    if japp_pack::is_packed() {
        let filter = LaunchMetrics::log_filter("japp_pack=warn", LaunchMetrics::enabled());
        init_logger(false, &filter);
        let args: Vec<String> = std::env::args_os()
            .skip(1)
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        return finish(
            std::env::current_exe()
                .map_err(PackError::from)
                .and_then(|exe| Launcher::from_env().run(&exe, &args)),
        );
    }

    let cli = Cli::parse();
    init_logger(cli.verbose, "japp_pack=info");

    let result = match cli.command {
        Commands::Pack(args) => pack(args).map(|_| 0),
        Commands::Run { file, args } => Launcher::from_env().run(&file, &args),
        Commands::Inspect { file, json } => inspect(&file, json).map(|_| 0),
        Commands::Extract {
            file,
            dest,
            group,
            java_version,
        } => extract(&file, &dest, group, java_version).map(|_| 0),
    };
    finish(result)
}

fn finish(result: PackResult<i32>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(u8::try_from(code & 0xff).unwrap_or(1)),
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn pack(mut args: PackArgs) -> PackResult<()> {
    let manifest_path = args.config.take().or_else(|| Manifest::find_in_dir("."));
    let no_progress = args.no_progress;

    let mut config = match manifest_path {
        Some(ref path) => {
            tracing::info!("Using manifest {}", path.display());
            let manifest = Manifest::from_file(path)?;
            let base_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            PackConfig::from_manifest(&manifest, base_dir)?
        }
        None => PackConfig::new(args.output.clone().unwrap_or_else(|| "app".to_string())),
    };

    apply_flags(&mut config, args)?;

    let mut packer = Packer::new(config);
    if !no_progress {
        packer = packer.with_progress(PackProgress::new());
    }
    let output = packer.pack()?;

    println!(
        "{} ({} bytes, {} resources, hash {})",
        output.executable.display(),
        output.size,
        output.resource_count,
        output.content_hash
    );
    if let Some(ref installed) = output.installed {
        println!("installed: {}", installed.display());
    }
    Ok(())
}

/// Layer command line values over the manifest
fn apply_flags(config: &mut PackConfig, flags: PackArgs) -> PackResult<()> {
    if let Some(output) = flags.output {
        config.output_name = output;
    }
    if let Some(dir) = flags.output_dir {
        config.output_dir = dir;
    }
    if flags.launcher.is_some() {
        config.launcher = flags.launcher;
    }
    if flags.boot.is_some() {
        config.boot_jar = flags.boot;
    }

    for spec in &flags.module_path {
        config.module_path.push(spec.parse::<InputSpec>()?);
    }
    for spec in &flags.class_path {
        config.class_path.push(spec.parse::<InputSpec>()?);
    }

    let launch = &mut config.launch;
    if let Some(ref module) = flags.main_module {
        *launch = std::mem::take(launch).with_main_module(module);
    }
    if flags.main_class.is_some() {
        launch.main_class = flags.main_class;
    }
    for property in &flags.properties {
        let (key, value) = parse_property(property)?;
        launch.properties.insert(key, value);
    }
    launch.add_opens.extend(flags.add_opens);
    launch.add_exports.extend(flags.add_exports);
    launch.add_reads.extend(flags.add_reads);
    launch.enable_native_access.extend(flags.enable_native_access);
    for option in &flags.jvm_options {
        launch.jvm_options.push(parse_jvm_option(option)?);
    }
    if !flags.args.is_empty() {
        launch.args = flags.args;
    }

    if let Some(method) = flags.compression {
        config.compression = method;
    }
    if flags.level.is_some() {
        config.compression_level = flags.level;
    }
    if let Some(dir) = flags.copy_to {
        config.copy_to = Some(dir);
        config.copy_name = flags.copy_name;
    }
    Ok(())
}

/// `option` or `condition:option`; a leading `-` always starts the option
fn parse_jvm_option(spec: &str) -> PackResult<ConditionalOption> {
    if spec.starts_with('-') {
        return Ok(ConditionalOption::always(spec));
    }
    match spec.split_once(":-") {
        Some((condition, option)) => Ok(ConditionalOption {
            when: condition.parse()?,
            option: format!("-{}", option),
        }),
        None => Err(PackError::Config(format!("Invalid JVM option: '{}'", spec))),
    }
}

fn open(file: &Path) -> PackResult<ContainerReader> {
    ContainerReader::open(file)?
        .ok_or_else(|| PackError::InvalidContainer(format!("{} is not packed", file.display())))
}

fn inspect(file: &Path, json: bool) -> PackResult<()> {
    let reader = open(file)?;
    let metadata = reader.metadata();

    if json {
        println!("{}", serde_json::to_string_pretty(metadata)?);
        return Ok(());
    }

    let layout = reader.layout();
    println!("file:         {}", file.display());
    println!("format:       v{}", layout.version);
    println!("stub size:    {}", layout.base_offset);
    println!("metadata:     {} bytes at +{}", layout.metadata_size, layout.metadata_offset);
    println!("content hash: {}", metadata.content_hash);
    match metadata.boot {
        Some(ref boot) => println!("boot module:  {} bytes", boot.size),
        None => println!("boot module:  (not embedded)"),
    }

    let launch = &metadata.launch;
    if let Some(ref class) = launch.main_class {
        println!("main class:   {}", class);
    }
    if let Some(ref module) = launch.main_module {
        println!("main module:  {}", module);
    }

    for (title, items) in [("module path", &launch.module_path), ("class path", &launch.class_path)] {
        if items.is_empty() {
            continue;
        }
        println!("{}:", title);
        for item in items {
            let name = if item.name.is_empty() { "(unnamed)" } else { &item.name };
            match item.reference {
                GroupReference::Local {
                    base,
                    ref multi_release,
                } => {
                    let Some(group) = metadata.pool.get(base) else {
                        println!("  {:<40} group {} (missing)", name, base);
                        continue;
                    };
                    print!(
                        "  {:<40} group {} ({} files, {} -> {} bytes)",
                        name,
                        base,
                        group.len(),
                        group.total_size(),
                        group.compressed_size()
                    );
                    if !multi_release.is_empty() {
                        print!(" multi-release {:?}", multi_release.keys().collect::<Vec<_>>());
                    }
                    println!();
                }
                GroupReference::External { ref path } => {
                    println!("  {:<40} external {}", name, path.display());
                }
            }
        }
    }

    for option in &launch.jvm_options {
        println!("jvm option:   {} when {}", option.option, option.when);
    }
    Ok(())
}

fn extract(
    file: &Path,
    dest: &Path,
    group: Option<usize>,
    java_version: Option<u32>,
) -> PackResult<()> {
    let mut reader = open(file)?;

    if let Some(index) = group {
        let count = reader.extract_groups(&[index], dest)?;
        println!("{} files extracted to {}", count, dest.display());
        return Ok(());
    }

    let launch = reader.metadata().launch.clone();
    let mut total = 0;
    let mut unnamed = 0;
    for (dir, items) in [("modules", &launch.module_path), ("classpath", &launch.class_path)] {
        for item in items {
            if matches!(item.reference, GroupReference::External { .. }) {
                continue;
            }
            let name = if item.name.is_empty() {
                unnamed += 1;
                format!("unnamed@{}", unnamed - 1)
            } else {
                item.name.clone()
            };
            let target = japp_pack::container::safe_join(&dest.join(dir), &name)?;
            total += reader.extract_groups(&item.reference.indices_for(java_version), &target)?;
        }
    }

    if reader.extract_boot(&dest.join(japp_pack::container::BOOT_RESOURCE_NAME))? {
        total += 1;
    }

    println!("{} files extracted to {}", total, dest.display());
    Ok(())
}
