//! Tests for the launch side: boot properties, command composition, boot extraction

mod common;

use common::{class_bytes, write_file, write_jar, STUB};
use japp_pack::launcher::{boot_properties, BOOT_MAIN_CLASS};
use japp_pack::{
    ConditionalOption, ContainerLayout, GroupReference, InputSpec, LaunchCommand, LaunchConfig,
    LaunchMetrics, Launcher, LauncherOptions, PackConfig, PackError, Packer, PathItem,
    RuntimeContext,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn layout() -> ContainerLayout {
    ContainerLayout {
        base_offset: 0x1000,
        metadata_offset: 0x2a0,
        metadata_size: 0x40,
        version: 1,
    }
}

fn launch() -> LaunchConfig {
    let mut multi_release = BTreeMap::new();
    multi_release.insert(11, 2);
    multi_release.insert(17, 3);

    let mut launch = LaunchConfig::new()
        .with_main_module("org.example/org.example.Main")
        .with_property("file.encoding", "UTF-8")
        .with_jvm_option(ConditionalOption::always("-Xss4m"))
        .with_jvm_option(ConditionalOption {
            when: "java(99)".parse().unwrap(),
            option: "-XX:+FutureFlag".to_string(),
        });
    launch.module_path = vec![
        PathItem::new("org.example", GroupReference::local(0)),
        PathItem::new(
            "org.example.mr",
            GroupReference::Local {
                base: 1,
                multi_release,
            },
        ),
    ];
    launch.class_path = vec![PathItem::new(
        "plugin.jar",
        GroupReference::External {
            path: PathBuf::from("/opt/plugins/plugin.jar"),
        },
    )];
    launch.add_opens = vec![
        "java.base/java.lang=org.example".to_string(),
        "java.base/java.io=org.example".to_string(),
    ];
    launch.add_reads = vec!["org.example=ALL-UNNAMED".to_string()];
    launch.enable_native_access = vec!["org.example".to_string(), "org.example.mr".to_string()];
    launch.args = vec!["--default".to_string()];
    launch
}

#[test]
fn test_boot_properties() {
    let properties = boot_properties(Path::new("/apps/hello"), layout(), &launch(), Some(17));
    let map: BTreeMap<&str, &str> = properties
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    assert_eq!(properties[0], ("org.glavo.japp.file".into(), "/apps/hello".into()));
    assert_eq!(map["org.glavo.japp.file.offset"], "1000");
    assert_eq!(map["org.glavo.japp.file.metadata.offset"], "2a0");
    assert_eq!(map["org.glavo.japp.file.metadata.size"], "40");
    assert_eq!(map["org.glavo.japp.modules"], "org.example:0,org.example.mr:1+2+3");
    assert_eq!(
        map["org.glavo.japp.classpath"],
        "plugin.jar:E/opt/plugins/plugin.jar"
    );
    assert_eq!(map["org.glavo.japp.mainClass"], "org.example.Main");
    assert_eq!(map["org.glavo.mainModule"], "org.example");
    assert_eq!(map["org.glavo.japp.addopens.0"], "java.base/java.lang=org.example");
    assert_eq!(map["org.glavo.japp.addopens.1"], "java.base/java.io=org.example");
    assert_eq!(map["org.glavo.japp.addreads.0"], "org.example=ALL-UNNAMED");
    assert!(!map.contains_key("org.glavo.japp.addexports.0"));
    assert_eq!(
        map["org.glavo.japp.enableNativeAccess"],
        "org.example,org.example.mr"
    );
    assert_eq!(map["file.encoding"], "UTF-8");
}

#[test]
fn test_boot_properties_version_selects_overlays() {
    let modules = |version| {
        boot_properties(Path::new("/a"), layout(), &launch(), version)
            .into_iter()
            .find(|(k, _)| k == "org.glavo.japp.modules")
            .map(|(_, v)| v)
            .unwrap()
    };
    assert_eq!(modules(None), "org.example:0,org.example.mr:1");
    assert_eq!(modules(Some(11)), "org.example:0,org.example.mr:1+2");
    assert_eq!(modules(Some(21)), "org.example:0,org.example.mr:1+2+3");
}

#[test]
fn test_compose_order() {
    let context = RuntimeContext::current(Some(17));
    let user_args = vec!["user arg".to_string(), "--flag".to_string()];
    let command = LaunchCommand::compose(
        Path::new("/jdk/bin/java"),
        Path::new("/cache/boot.jar"),
        Path::new("/apps/hello"),
        layout(),
        &launch(),
        &context,
        &user_args,
    );

    assert_eq!(command.program, PathBuf::from("/jdk/bin/java"));
    let args = &command.args;
    assert_eq!(args[0], "--module-path");
    assert_eq!(args[1], "/cache/boot.jar");
    assert_eq!(args[2], "-Dorg.glavo.japp.file=/apps/hello");

    let position = |needle: &str| args.iter().position(|a| a == needle).unwrap();
    let last_property = position("-Dfile.encoding=UTF-8");
    let option = position("-Xss4m");
    let module = position("--module");
    assert!(last_property < option);
    assert!(option < position("--add-exports=java.base/jdk.internal.loader=org.glavo.japp"));
    assert!(position("--add-opens=java.base/jdk.internal.loader=org.glavo.japp") < module);
    assert_eq!(args[module + 1], format!("org.glavo.japp/{}", BOOT_MAIN_CLASS));
    assert_eq!(&args[module + 2..], ["--default", "user arg", "--flag"]);

    // Guard does not hold on Java 17.
    assert!(!args.iter().any(|a| a == "-XX:+FutureFlag"));

    let line = command.to_string();
    assert!(line.starts_with("/jdk/bin/java --module-path /cache/boot.jar"));
    assert!(line.ends_with("--default \"user arg\" --flag"));
}

struct Packed {
    temp: TempDir,
    file: PathBuf,
    java: PathBuf,
}

const MULTI_RELEASE: &str = "Manifest-Version: 1.0\r\nMulti-Release: true\r\n\r\n";

fn pack(with_boot: bool) -> Packed {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let launcher = write_file(&root.join("japp"), STUB);
    let java = write_file(&root.join("jdk/bin/java"), b"");
    write_file(&root.join("jdk/release"), b"JAVA_VERSION=\"21.0.1\"\n");
    let jar = write_jar(
        &root.join("libs/app.jar"),
        Some(MULTI_RELEASE),
        &[
            ("org/example/Main.class", &class_bytes("main")),
            ("META-INF/versions/17/org/example/Main.class", &class_bytes("main17")),
        ],
    );

    let mut config = PackConfig::new("hello")
        .with_output_dir(root.join("out"))
        .with_launcher(launcher)
        .with_class_path(InputSpec::new(jar.to_string_lossy()))
        .with_main_class("org.example.Main");
    if with_boot {
        let boot = write_jar(
            &root.join("boot.jar"),
            None,
            &[("org/glavo/japp/launcher/BootLauncher.class", &class_bytes("boot"))],
        );
        config = config.with_boot_jar(boot);
    }
    let file = Packer::new(config).pack().unwrap().executable;
    Packed { temp, file, java }
}

#[test]
fn test_prepare_extracts_and_reuses_boot() {
    let packed = pack(true);
    let cache = packed.temp.path().join("cache");
    let mut launcher = Launcher::new(LauncherOptions {
        java: Some(packed.java.clone()),
        boot_jar: None,
        cache_dir: Some(cache.clone()),
        java_version: Some(17),
    });

    let command = launcher
        .prepare(&packed.file, &["x".to_string()])
        .unwrap();
    assert_eq!(command.program, packed.java);
    let boot = PathBuf::from(&command.args[1]);
    assert!(boot.starts_with(cache.join("japp")));
    assert!(boot.ends_with("boot.jar"));
    assert_eq!(
        fs::read(&boot).unwrap(),
        fs::read(packed.temp.path().join("boot.jar")).unwrap()
    );
    assert_eq!(command.args.last().map(String::as_str), Some("x"));

    let file = fs::canonicalize(&packed.file).unwrap();
    let expected = format!("-Dorg.glavo.japp.file={}", file.display());
    assert!(command.args.contains(&expected));

    // A second launch reuses the extracted module.
    let modified = fs::metadata(&boot).unwrap().modified().unwrap();
    let again = launcher.prepare(&packed.file, &[]).unwrap();
    assert_eq!(again.args[1], command.args[1]);
    assert_eq!(fs::metadata(&boot).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_prepare_detects_java_version() {
    let packed = pack(true);
    let mut launcher = Launcher::new(LauncherOptions {
        java: Some(packed.java.clone()),
        cache_dir: Some(packed.temp.path().join("cache")),
        ..Default::default()
    });
    // The release file says 21, so the Java 17 overlay applies.
    let command = launcher.prepare(&packed.file, &[]).unwrap();
    assert!(command
        .args
        .iter()
        .any(|a| a == "-Dorg.glavo.japp.classpath=app.jar:0+1"));

    let mut launcher = Launcher::new(LauncherOptions {
        java: Some(packed.java.clone()),
        cache_dir: Some(packed.temp.path().join("cache")),
        java_version: Some(11),
        ..Default::default()
    });
    let command = launcher.prepare(&packed.file, &[]).unwrap();
    assert!(command
        .args
        .iter()
        .any(|a| a == "-Dorg.glavo.japp.classpath=app.jar:0"));
}

#[test]
fn test_prepare_records_metrics() {
    let packed = pack(true);
    let mut launcher = Launcher::new(LauncherOptions {
        java: Some(packed.java.clone()),
        cache_dir: Some(packed.temp.path().join("cache")),
        ..Default::default()
    })
    .with_metrics(LaunchMetrics::new());
    launcher.prepare(&packed.file, &[]).unwrap();

    let metrics = launcher.metrics().unwrap();
    assert!(metrics.layout_read.is_some());
    assert!(metrics.metadata_read.is_some());
    assert!(metrics.boot_ready.is_some());
    assert!(metrics.command_built.is_some());
    assert!(metrics.spawned.is_none());
    assert!(metrics.report().contains("Java version"));
}

#[test]
fn test_prepare_without_boot() {
    let packed = pack(false);
    let options = LauncherOptions {
        java: Some(packed.java.clone()),
        java_version: Some(17),
        ..Default::default()
    };

    let err = Launcher::new(options.clone())
        .prepare(&packed.file, &[])
        .unwrap_err();
    assert!(matches!(err, PackError::Launch(_)));
    assert!(err.to_string().contains("JAPP_BOOT_JAR"));

    let boot = write_file(&packed.temp.path().join("external-boot.jar"), b"boot");
    let mut launcher = Launcher::new(LauncherOptions {
        boot_jar: Some(boot.clone()),
        ..options
    });
    let command = launcher.prepare(&packed.file, &[]).unwrap();
    assert_eq!(PathBuf::from(&command.args[1]), boot);
}

#[test]
fn test_prepare_rejects_plain_file() {
    let temp = TempDir::new().unwrap();
    let plain = write_file(&temp.path().join("plain"), STUB);
    let err = Launcher::new(LauncherOptions::default())
        .prepare(&plain, &[])
        .unwrap_err();
    assert!(matches!(err, PackError::InvalidContainer(_)));
}
