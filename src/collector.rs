//! Payload collection for module path and class path inputs
//!
//! An input is written as `path[?option,...]`:
//!
//! ```text
//! libs/foo.jar                  # a jar
//! build/classes                 # a class directory
//! libs/*                        # every jar directly inside libs (class path)
//! mods/*.jar                    # glob pattern
//! mods/foo.jar?name=foo         # override the recorded name
//! /opt/shared/bar.jar?external  # reference the file instead of packing it
//! ```

use crate::container::{system_time_millis, ContainerWriter, PendingResource};
use crate::module_info::{derive_automatic_module_name, read_module_name};
use crate::resource::{GroupReference, PathItem};
use crate::{PackError, PackResult};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

const MULTI_RELEASE_PREFIX: &str = "META-INF/versions/";
const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
const MODULE_INFO: &str = "module-info.class";

/// A module path or class path input with its options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    /// File, directory, `dir/*` or glob pattern
    pub path: String,
    /// Name recorded for the path item instead of the discovered one
    pub name: Option<String>,
    /// Reference the input by absolute path instead of packing it
    pub external: bool,
}

impl InputSpec {
    /// Input without options
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
            external: false,
        }
    }

    /// Resolve a relative path against `base`
    pub fn resolved_against(mut self, base: &Path) -> Self {
        let path = Path::new(&self.path);
        if !path.is_absolute() {
            self.path = base.join(path).to_string_lossy().into_owned();
        }
        self
    }
}

impl FromStr for InputSpec {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, options) = match s.rsplit_once('?') {
            Some((path, options)) => (path, Some(options)),
            None => (s, None),
        };
        if path.is_empty() {
            return Err(PackError::Config(format!("Empty input path in '{}'", s)));
        }

        let mut spec = InputSpec::new(path);
        let mut unrecognized = Vec::new();

        for option in options.into_iter().flat_map(|o| o.split(',')) {
            let (key, value) = match option.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (option.trim(), None),
            };
            match (key, value) {
                ("", None) => {}
                ("name", Some(value)) if !value.is_empty() => spec.name = Some(value.to_string()),
                ("external", None) | ("external", Some("true")) => spec.external = true,
                ("external", Some("false")) => spec.external = false,
                _ => unrecognized.push(key.to_string()),
            }
        }

        if !unrecognized.is_empty() {
            return Err(PackError::Config(format!(
                "Unrecognized options: {:?}",
                unrecognized
            )));
        }

        Ok(spec)
    }
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        let mut options = Vec::new();
        if let Some(ref name) = self.name {
            options.push(format!("name={}", name));
        }
        if self.external {
            options.push("external".to_string());
        }
        if !options.is_empty() {
            write!(f, "?{}", options.join(","))?;
        }
        Ok(())
    }
}

/// Collect one input into the container, returning the number of path items added
///
/// A path that exists is taken literally even if it contains glob characters.
pub fn process<W: Write>(
    writer: &mut ContainerWriter<W>,
    spec: &InputSpec,
    is_module_path: bool,
) -> PackResult<usize> {
    let path = spec.path.as_str();

    if !is_module_path && (path.ends_with("/*") || path.ends_with("\\*")) {
        let dir = Path::new(&path[..path.len() - 2]);
        return process_path(writer, dir, spec, is_module_path, true);
    }

    let literal = Path::new(path);
    if is_glob(path) && fs::symlink_metadata(literal).is_err() {
        return process_glob(writer, spec, is_module_path);
    }

    process_path(writer, literal, spec, is_module_path, false)
}

fn process_path<W: Write>(
    writer: &mut ContainerWriter<W>,
    p: &Path,
    spec: &InputSpec,
    is_module_path: bool,
    mut scan_files: bool,
) -> PackResult<usize> {
    let metadata = fs::metadata(p).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PackError::InputNotFound(p.to_path_buf()),
        _ => PackError::Io(e),
    })?;

    if scan_files && !metadata.is_dir() {
        return Err(PackError::UnsupportedInput(format!(
            "{} is not a directory",
            p.display()
        )));
    }

    if metadata.is_dir() {
        if is_module_path && !p.join(MODULE_INFO).is_file() {
            scan_files = true;
        }

        if scan_files {
            if spec.name.is_some() {
                return Err(PackError::Config(
                    "Name should not be set for multiple files".to_string(),
                ));
            }
            let jars = list_jars(p)?;
            tracing::info!("Scanning {}: {} jar(s)", p.display(), jars.len());
            for jar in &jars {
                add_jar(writer, jar, is_module_path, None, spec.external)?;
            }
            Ok(jars.len())
        } else {
            add_dir(writer, p, is_module_path, spec.name.as_deref(), spec.external)?;
            Ok(1)
        }
    } else if has_jar_extension(p) {
        add_jar(writer, p, is_module_path, spec.name.as_deref(), spec.external)?;
        Ok(1)
    } else {
        Err(PackError::UnsupportedInput(format!(
            "Unsupported file format: {}",
            p.display()
        )))
    }
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

fn process_glob<W: Write>(
    writer: &mut ContainerWriter<W>,
    spec: &InputSpec,
    is_module_path: bool,
) -> PackResult<usize> {
    let entries = glob::glob(&spec.path)
        .map_err(|e| PackError::Config(format!("Invalid pattern '{}': {}", spec.path, e)))?;

    let mut matches: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PackError::Io(e.into()))?;
        if path.is_dir() || has_jar_extension(&path) {
            matches.push(path);
        } else {
            tracing::debug!("Pattern {}: skipping {}", spec.path, path.display());
        }
    }
    matches.sort();

    if matches.is_empty() {
        return Err(PackError::InputNotFound(PathBuf::from(&spec.path)));
    }
    if matches.len() > 1 && spec.name.is_some() {
        return Err(PackError::Config(
            "Name should not be set for multiple files".to_string(),
        ));
    }

    let mut count = 0;
    for path in &matches {
        count += process_path(writer, path, spec, is_module_path, false)?;
    }
    Ok(count)
}

fn has_jar_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jar"))
}

fn list_jars(dir: &Path) -> PackResult<Vec<PathBuf>> {
    let mut jars = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_jar_extension(&path) {
            jars.push(path);
        }
    }
    jars.sort();
    Ok(jars)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn push_item<W: Write>(writer: &mut ContainerWriter<W>, is_module_path: bool, item: PathItem) {
    if is_module_path {
        writer.push_module(item);
    } else {
        writer.push_class_path(item);
    }
}

fn add_external<W: Write>(
    writer: &mut ContainerWriter<W>,
    path: &Path,
    is_module_path: bool,
    name: String,
) -> PackResult<()> {
    let absolute = fs::canonicalize(path)?;
    tracing::info!("External reference: {}", absolute.display());
    push_item(
        writer,
        is_module_path,
        PathItem::new(name, GroupReference::External { path: absolute }),
    );
    Ok(())
}

/// Pack a jar as one base group plus one group per multi-release version
pub fn add_jar<W: Write>(
    writer: &mut ContainerWriter<W>,
    jar: &Path,
    is_module_path: bool,
    name_override: Option<&str>,
    external: bool,
) -> PackResult<()> {
    let file_name = file_name_of(jar);

    if external {
        let name = match name_override {
            Some(name) => name.to_string(),
            None if is_module_path => derive_automatic_module_name(&file_name).unwrap_or_default(),
            None => file_name,
        };
        return add_external(writer, jar, is_module_path, name);
    }

    let mut archive = zip::ZipArchive::new(File::open(jar)?)?;

    let attributes = match archive.by_name(MANIFEST_NAME) {
        Ok(mut entry) => {
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            Some(parse_manifest_attributes(&text))
        }
        Err(zip::result::ZipError::FileNotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let multi_release = attributes
        .as_ref()
        .and_then(|a| a.get("Multi-Release"))
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let name = if let Some(name) = name_override {
        name.to_string()
    } else if is_module_path {
        jar_module_name(&mut archive, attributes.as_ref(), multi_release, &file_name)?
    } else {
        file_name.clone()
    };

    let mut base_entries = Vec::new();
    let mut versioned: BTreeMap<u32, Vec<PendingResource>> = BTreeMap::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || entry.name().ends_with('/') {
            continue;
        }

        let full_name = entry.name().to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;

        let mut pending = PendingResource::new(full_name.clone(), data);
        pending.last_modified_time = entry.last_modified().and_then(zip_datetime_millis);

        match versioned_name(&full_name, multi_release) {
            Some((version, rest)) => {
                pending.name = rest;
                versioned.entry(version).or_default().push(pending);
            }
            None => base_entries.push(pending),
        }
    }

    let base_group = writer.add_entries(base_entries)?;
    let resource_count = base_group.len();
    let base = writer.push_group(base_group);

    let mut multi = BTreeMap::new();
    for (version, entries) in versioned {
        let group = writer.add_entries(entries)?;
        tracing::debug!("{}: {} resources for Java {}", file_name, group.len(), version);
        multi.insert(version, writer.push_group(group));
    }

    tracing::info!(
        "Packed jar {} as '{}' ({} resources{})",
        jar.display(),
        name,
        resource_count,
        if multi.is_empty() {
            String::new()
        } else {
            format!(", multi-release {:?}", multi.keys().collect::<Vec<_>>())
        }
    );

    push_item(
        writer,
        is_module_path,
        PathItem::new(
            name,
            GroupReference::Local {
                base,
                multi_release: multi,
            },
        ),
    );
    Ok(())
}

/// Split `META-INF/versions/<v>/<rest>` when `v` is past 9
fn versioned_name(name: &str, multi_release: bool) -> Option<(u32, String)> {
    if !multi_release {
        return None;
    }
    let tail = name.strip_prefix(MULTI_RELEASE_PREFIX)?;
    let (version, rest) = tail.split_once('/')?;
    if version.is_empty() || rest.is_empty() {
        return None;
    }
    match version.parse::<u32>() {
        Ok(v) if v > 9 => Some((v, rest.to_string())),
        _ => None,
    }
}

fn jar_module_name<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    attributes: Option<&HashMap<String, String>>,
    multi_release: bool,
    file_name: &str,
) -> PackResult<String> {
    if let Some(name) = attributes.and_then(|a| a.get("Automatic-Module-Name")) {
        return Ok(name.clone());
    }

    let mut candidates: Vec<(u32, String)> = Vec::new();
    for name in archive.file_names() {
        if name == MODULE_INFO {
            candidates.push((0, name.to_string()));
        } else if multi_release {
            let version = name
                .strip_prefix(MULTI_RELEASE_PREFIX)
                .and_then(|t| t.strip_suffix("/module-info.class"))
                .and_then(|v| v.parse::<u32>().ok());
            if let Some(v) = version.filter(|v| *v >= 9) {
                candidates.push((v, name.to_string()));
            }
        }
    }
    candidates.sort();

    if let Some((_, entry_name)) = candidates.first() {
        let mut entry = archive.by_name(entry_name)?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        return read_module_name(&data);
    }

    derive_automatic_module_name(file_name).ok_or_else(|| {
        PackError::UnsupportedInput(format!("Cannot derive a module name for {}", file_name))
    })
}

/// Pack every regular file below `dir` as one group
pub fn add_dir<W: Write>(
    writer: &mut ContainerWriter<W>,
    dir: &Path,
    is_module_path: bool,
    name_override: Option<&str>,
    external: bool,
) -> PackResult<()> {
    let name = match name_override {
        Some(name) => name.to_string(),
        None if is_module_path => read_module_name(&fs::read(dir.join(MODULE_INFO))?)?,
        None => String::new(),
    };

    if external {
        return add_external(writer, dir, is_module_path, name);
    }

    let root = fs::canonicalize(dir)?;
    let mut entries = Vec::new();

    for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| PackError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(&root)
            .map_err(|e| PackError::UnsupportedInput(e.to_string()))?;
        let relative_str = relative.to_string_lossy().replace('\\', "/");

        let metadata = entry
            .metadata()
            .map_err(|e| PackError::Io(std::io::Error::other(e.to_string())))?;

        // Modification time only
        let mut pending = PendingResource::new(relative_str, fs::read(entry.path())?);
        pending.last_modified_time = system_time_millis(metadata.modified());
        entries.push(pending);
    }

    let group = writer.add_entries(entries)?;
    tracing::info!(
        "Packed directory {} as '{}' ({} files, {} bytes)",
        dir.display(),
        name,
        group.len(),
        group.total_size()
    );

    let base = writer.push_group(group);
    push_item(
        writer,
        is_module_path,
        PathItem::new(name, GroupReference::local(base)),
    );
    Ok(())
}

/// Main attributes of a jar manifest (section before the first blank line)
pub fn parse_manifest_attributes(text: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, ref mut value)) = current {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((key, value)) = current.take() {
            attributes.insert(key, value);
        }
        if let Some((key, value)) = line.split_once(':') {
            current = Some((key.trim().to_string(), value.trim_start().to_string()));
        }
    }
    if let Some((key, value)) = current {
        attributes.insert(key, value);
    }

    attributes
}

/// Zip timestamps carry no zone; they are read as UTC
fn zip_datetime_millis(dt: zip::DateTime) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(dt.year().into(), dt.month().into(), dt.day().into())?;
    let time = date.and_hms_opt(dt.hour().into(), dt.minute().into(), dt.second().into())?;
    Some(time.and_utc().timestamp_millis())
}
