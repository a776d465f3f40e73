//! Submission unpacking.
//!
//! Turns an uploaded zip archive into a [`DesignBundle`]. Entries are
//! extracted into a scoped temporary directory (removed when it goes out of
//! scope, on every exit path) with size limits enforced while bytes are
//! written, so an archive lying about its sizes cannot exhaust the disk.

use crate::domain::{BackendKind, DesignBundle, EvaluationOptions, SourceFile, SourceKind};
use crate::error::{GatewayError, InvalidSubmission, RejectReason};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use tracing::{debug, info};
use zip::ZipArchive;

/// Name of the options document at the archive root.
pub const OPTIONS_FILE: &str = "options.json";

/// Name of the optional top-module file at the archive root.
pub const TOP_MODULE_FILE: &str = "top_module.txt";

const HDL_EXTENSIONS: [&str; 2] = ["v", "sv"];
const AUXILIARY_EXTENSIONS: [&str; 6] = ["vh", "svh", "mem", "hex", "f", "vlt"];
const TESTBENCH_DIRS: [&str; 4] = ["tb", "test", "tests", "testbench"];

/// Limits applied to every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpackLimits {
    /// Ceiling on the raw archive size.
    pub max_archive_bytes: u64,

    /// Ceiling on the number of archive entries (directories included).
    pub max_entries: usize,

    /// Ceiling on the total extracted size.
    pub max_extracted_bytes: u64,
}

impl Default for UnpackLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 50 * 1024 * 1024,
            max_entries: 2_000,
            max_extracted_bytes: 200 * 1024 * 1024,
        }
    }
}

/// The options document as submitted. Validated into [`EvaluationOptions`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct OptionsDocument {
    top_module: Option<String>,
    target_technology: Option<String>,
    clock_frequency_mhz: Option<f64>,
    enabled_backends: Option<Vec<String>>,
    per_backend_timeout_overrides: BTreeMap<String, u64>,
    fast_mode: bool,
    functionality_check: Option<bool>,
}

/// Validate and extract a submission archive.
///
/// Fails with [`GatewayError::Invalid`] for anything wrong with the archive
/// itself; [`GatewayError::Scratch`] only if the scratch directory cannot be
/// used.
pub fn unpack(archive: &[u8], limits: &UnpackLimits) -> Result<DesignBundle, GatewayError> {
    if archive.len() as u64 > limits.max_archive_bytes {
        return Err(reject(
            RejectReason::TooLarge,
            format!(
                "archive is {} bytes, limit is {}",
                archive.len(),
                limits.max_archive_bytes
            ),
        ));
    }

    let mut zip = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| reject(RejectReason::NotAnArchive, e.to_string()))?;

    if zip.len() > limits.max_entries {
        return Err(reject(
            RejectReason::TooLarge,
            format!("archive has {} entries, limit is {}", zip.len(), limits.max_entries),
        ));
    }

    let scratch = tempfile::Builder::new().prefix("edagate-").tempdir()?;
    let extracted = extract_entries(&mut zip, scratch.path(), limits)?;
    let bundle = assemble_bundle(scratch.path(), &extracted)?;

    info!(
        submission_id = %bundle.id(),
        top_module = %bundle.top_module(),
        files = bundle.sources().len(),
        "Unpacked submission"
    );
    Ok(bundle)
}

/// Extract every file entry under `root`, returning normalized relative paths.
fn extract_entries(
    zip: &mut ZipArchive<Cursor<&[u8]>>,
    root: &Path,
    limits: &UnpackLimits,
) -> Result<Vec<String>, GatewayError> {
    let mut seen = BTreeSet::new();
    let mut dirs = BTreeSet::new();
    let mut total: u64 = 0;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| reject(RejectReason::NotAnArchive, e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let Some(rel) = normalize_entry_name(entry.name())? else {
            continue;
        };
        if !seen.insert(rel.clone()) {
            return Err(reject(
                RejectReason::DuplicateFile,
                format!("{} appears more than once", rel),
            ));
        }
        // A path must not be both a file and a directory of another entry.
        if dirs.contains(&rel) {
            return Err(reject(
                RejectReason::DuplicateFile,
                format!("{} is both a file and a directory", rel),
            ));
        }
        for parent in parent_dirs(&rel) {
            if seen.contains(parent) {
                return Err(reject(
                    RejectReason::DuplicateFile,
                    format!("{} is both a file and a directory", parent),
                ));
            }
            dirs.insert(parent.to_string());
        }

        let dest = root.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&dest)?;

        let remaining = limits.max_extracted_bytes.saturating_sub(total);
        let written = io::copy(&mut (&mut entry).take(remaining + 1), &mut out)
            .map_err(|e| reject(RejectReason::NotAnArchive, format!("{}: {}", rel, e)))?;
        if written > remaining {
            return Err(reject(
                RejectReason::TooLarge,
                format!(
                    "extracted size exceeds limit of {} bytes",
                    limits.max_extracted_bytes
                ),
            ));
        }
        total += written;
    }

    Ok(seen.into_iter().collect())
}

/// Normalize an archive entry name into a safe relative path.
///
/// Returns `Ok(None)` for entries that are skipped (resource-fork junk).
fn normalize_entry_name(name: &str) -> Result<Option<String>, GatewayError> {
    let unified = name.replace('\\', "/");
    if unified.starts_with('/') || unified.split('/').next().is_some_and(|c| c.ends_with(':')) {
        return Err(reject(
            RejectReason::UnsafePath,
            format!("absolute path {}", name),
        ));
    }

    let mut parts = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                return Err(reject(
                    RejectReason::UnsafePath,
                    format!("parent traversal in {}", name),
                ))
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(reject(RejectReason::UnsafePath, format!("empty path {:?}", name)));
    }
    if parts[0] == "__MACOSX" || parts.last().is_some_and(|p| p.starts_with("._")) {
        return Ok(None);
    }
    Ok(Some(parts.join("/")))
}

/// Every proper directory prefix of `path` (`a/b/c.v` yields `a`, `a/b`).
fn parent_dirs(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(idx, _)| &path[..idx])
}

/// Strip a single directory that wraps every file (`design/rtl/a.v` → `rtl/a.v`).
fn common_root(paths: &[String]) -> Option<String> {
    let first = paths.first()?.split_once('/')?.0;
    paths
        .iter()
        .all(|p| p.split_once('/').is_some_and(|(head, _)| head == first))
        .then(|| format!("{}/", first))
}

fn assemble_bundle(root: &Path, extracted: &[String]) -> Result<DesignBundle, GatewayError> {
    let prefix = common_root(extracted).unwrap_or_default();

    let mut options_doc: Option<OptionsDocument> = None;
    let mut top_module_file: Option<String> = None;
    let mut sources = Vec::new();

    for rel in extracted {
        let logical = &rel[prefix.len()..];
        let path = root.join(rel);

        if logical == OPTIONS_FILE {
            let text = read_utf8(&path, logical)?;
            let doc = serde_json::from_str(&text).map_err(|e| {
                reject(RejectReason::InvalidOptions, format!("{}: {}", OPTIONS_FILE, e))
            })?;
            options_doc = Some(doc);
            continue;
        }
        if logical == TOP_MODULE_FILE {
            let text = read_utf8(&path, logical)?;
            top_module_file = text
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string);
            continue;
        }

        match classify(logical) {
            Some(kind) => {
                let content = read_utf8(&path, logical)?;
                sources.push(SourceFile::new(logical, content, kind));
            }
            None => debug!(file = %logical, "Ignoring non-HDL file"),
        }
    }

    let doc = options_doc.unwrap_or_default();
    let top_module = doc
        .top_module
        .clone()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or(top_module_file)
        .ok_or_else(|| {
            reject(
                RejectReason::MissingTopModule,
                format!("set top_module in {} or provide {}", OPTIONS_FILE, TOP_MODULE_FILE),
            )
        })?;
    if !is_identifier(&top_module) {
        return Err(reject(
            RejectReason::InvalidOptions,
            format!("top module {:?} is not a valid identifier", top_module),
        ));
    }

    let options = validate_options(doc)?;

    if !sources.iter().any(|f| f.kind == SourceKind::Rtl) {
        return Err(reject(RejectReason::NoRtl, "archive contains no .v/.sv design sources"));
    }
    if options.functionality_check && !sources.iter().any(|f| f.kind == SourceKind::Testbench) {
        return Err(reject(
            RejectReason::NoTestbench,
            "archive contains no testbench and functionality_check is enabled",
        ));
    }

    Ok(DesignBundle::new(top_module, sources, options))
}

fn validate_options(doc: OptionsDocument) -> Result<EvaluationOptions, GatewayError> {
    let mut options = EvaluationOptions {
        target_technology: doc.target_technology,
        fast_mode: doc.fast_mode,
        functionality_check: doc.functionality_check.unwrap_or(true),
        ..EvaluationOptions::default()
    };

    if let Some(mhz) = doc.clock_frequency_mhz {
        if !mhz.is_finite() || mhz <= 0.0 {
            return Err(reject(
                RejectReason::InvalidOptions,
                format!("clock_frequency_mhz must be positive, got {}", mhz),
            ));
        }
        options.clock_frequency_mhz = Some(mhz);
    }

    if let Some(names) = doc.enabled_backends {
        options.enabled_backends = names
            .iter()
            .map(|n| parse_backend(n))
            .collect::<Result<_, _>>()?;
    }

    for (name, secs) in doc.per_backend_timeout_overrides {
        if secs == 0 {
            return Err(reject(
                RejectReason::InvalidOptions,
                format!("timeout override for {} must be positive", name),
            ));
        }
        options.timeout_overrides_secs.insert(parse_backend(&name)?, secs);
    }

    Ok(options)
}

fn parse_backend(name: &str) -> Result<BackendKind, GatewayError> {
    name.parse::<BackendKind>()
        .map_err(|e| reject(RejectReason::InvalidOptions, e.to_string()))
}

/// Classify a file by extension and location.
pub fn classify(path: &str) -> Option<SourceKind> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();

    if AUXILIARY_EXTENSIONS.contains(&ext.as_str()) {
        return Some(SourceKind::Auxiliary);
    }
    if !HDL_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }

    let stem = stem.to_ascii_lowercase();
    let in_tb_dir = path
        .split('/')
        .rev()
        .skip(1)
        .any(|dir| TESTBENCH_DIRS.contains(&dir.to_ascii_lowercase().as_str()));
    let tb_name = stem.starts_with("tb_")
        || stem.ends_with("_tb")
        || stem.ends_with("_test")
        || stem == "tb"
        || stem == "testbench";

    if in_tb_dir || tb_name {
        Some(SourceKind::Testbench)
    } else {
        Some(SourceKind::Rtl)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn read_utf8(path: &Path, logical: &str) -> Result<String, GatewayError> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes)
        .map_err(|_| reject(RejectReason::NotUtf8, format!("{} is not valid UTF-8", logical)))
}

fn reject(reason: RejectReason, detail: impl Into<String>) -> GatewayError {
    GatewayError::Invalid(InvalidSubmission::new(reason, detail))
}
