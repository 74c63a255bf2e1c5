//! Locating and extracting the engine's native artifacts.
//!
//! Two artifacts are needed at runtime: the platform-specific shared library
//! and the acoustic model file (`lynx_params.lyx`). Resolution order for
//! both is: explicit builder path, environment variable, then an ancestor
//! scan of the working directory for an unpacked SDK tree (`lib/...`).
//! Models may also ship as `lynx-model-*.zip` archives; those are unpacked
//! once into a content-addressed cache under the system temp directory and
//! reused on later runs.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::error::LynxError;
use crate::platform;

const SDK_LIB_DIR: &str = "lib";
const MODEL_RELATIVE_PATH: &str = "lib/common/lynx_params.lyx";
const MODEL_FILE_EXTENSION: &str = "lyx";
const MODEL_ARCHIVE_PREFIX: &str = "lynx-model-";
const CACHE_DIR_NAME: &str = "lynx-stt";

/// How many parent directories the SDK scan walks up.
const SCAN_DEPTH: usize = 3;

/// Best-effort default library path for `LynxBuilder`. Existence is checked
/// at init time, which produces the actionable error message.
pub fn default_library_path() -> PathBuf {
    match locate_library() {
        Ok(path) => path,
        Err(_) => platform::library_subpath()
            .map(|sub| Path::new(SDK_LIB_DIR).join(sub))
            .unwrap_or_else(|_| PathBuf::from(SDK_LIB_DIR)),
    }
}

/// Best-effort default model path for `LynxBuilder`.
pub fn default_model_path() -> PathBuf {
    locate_model().unwrap_or_else(|_| PathBuf::from(MODEL_RELATIVE_PATH))
}

/// Resolves the shared library: `LYNX_LIBRARY_PATH`, then the SDK scan.
pub fn locate_library() -> Result<PathBuf, LynxError> {
    if let Ok(path) = std::env::var("LYNX_LIBRARY_PATH") {
        let path = PathBuf::from(&path);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "engine library from LYNX_LIBRARY_PATH");
            return Ok(path);
        }
        return Err(LynxError::Resource(format!(
            "LYNX_LIBRARY_PATH is set but {} is not a file",
            path.display()
        )));
    }

    let cwd = current_dir()?;
    find_library_from(&cwd).ok_or_else(|| {
        LynxError::Resource(
            "engine library not found; set LYNX_LIBRARY_PATH or run inside an SDK checkout"
                .to_string(),
        )
    })
}

/// Resolves the model file: `LYNX_MODEL_PATH`, the SDK scan, then archive
/// extraction into the temp-dir cache.
pub fn locate_model() -> Result<PathBuf, LynxError> {
    if let Ok(path) = std::env::var("LYNX_MODEL_PATH") {
        let path = PathBuf::from(&path);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "model from LYNX_MODEL_PATH");
            return Ok(path);
        }
        return Err(LynxError::Resource(format!(
            "LYNX_MODEL_PATH is set but {} is not a file",
            path.display()
        )));
    }

    let cwd = current_dir()?;
    if let Some(path) = find_model_from(&cwd) {
        tracing::debug!(path = %path.display(), "model found in SDK tree");
        return Ok(path);
    }

    let mut archives = find_model_archives_from(&cwd);
    if archives.is_empty() {
        return Err(LynxError::Resource(
            "model file not found; set LYNX_MODEL_PATH or place a lynx-model-*.zip next to the \
             project"
                .to_string(),
        ));
    }
    // Archive names carry the version; the lexicographically greatest one
    // is the newest.
    archives.sort();
    let archive = archives.pop().filter(|p| p.is_file()).ok_or_else(|| {
        LynxError::Resource("model archive disappeared during resolution".to_string())
    })?;
    extract_model_archive(&archive)
}

/// Unpacks a model archive into the content-addressed cache and returns the
/// model file path inside it. A previously extracted copy is reused.
pub fn extract_model_archive(archive: &Path) -> Result<PathBuf, LynxError> {
    let bytes = std::fs::read(archive).map_err(|err| resource_io(archive, err))?;
    let cache_dir = std::env::temp_dir()
        .join(CACHE_DIR_NAME)
        .join(sha256_hex(&bytes));

    if let Some(model) = find_model_file(&cache_dir, SCAN_DEPTH) {
        tracing::debug!(path = %model.display(), "model archive already cached");
        return Ok(model);
    }

    std::fs::create_dir_all(&cache_dir).map_err(|err| resource_io(&cache_dir, err))?;

    let mut zip = ZipArchive::new(io::Cursor::new(bytes))
        .map_err(|err| LynxError::Resource(format!("{}: {}", archive.display(), err)))?;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|err| LynxError::Resource(format!("{}: {}", archive.display(), err)))?;
        // enclosed_name rejects entries that would escape the cache dir
        let Some(relative) = entry.enclosed_name() else {
            return Err(LynxError::Resource(format!(
                "{}: archive entry {:?} has an unsafe path",
                archive.display(),
                entry.name()
            )));
        };
        let target = cache_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|err| resource_io(&target, err))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|err| resource_io(parent, err))?;
            }
            let mut out =
                std::fs::File::create(&target).map_err(|err| resource_io(&target, err))?;
            io::copy(&mut entry, &mut out).map_err(|err| resource_io(&target, err))?;
        }
    }

    let model = find_model_file(&cache_dir, SCAN_DEPTH).ok_or_else(|| {
        LynxError::Resource(format!(
            "{} does not contain a .{} model file",
            archive.display(),
            MODEL_FILE_EXTENSION
        ))
    })?;
    tracing::info!(
        archive = %archive.display(),
        path = %model.display(),
        "model archive extracted to cache"
    );
    Ok(model)
}

fn current_dir() -> Result<PathBuf, LynxError> {
    std::env::current_dir()
        .map_err(|err| LynxError::Resource(format!("cannot resolve working directory: {}", err)))
}

/// The start directory plus up to `SCAN_DEPTH` ancestors.
fn search_roots(start: &Path) -> Vec<PathBuf> {
    let mut roots = vec![start.to_path_buf()];
    let mut cursor = start;
    for _ in 0..SCAN_DEPTH {
        match cursor.parent() {
            Some(parent) => {
                roots.push(parent.to_path_buf());
                cursor = parent;
            }
            None => break,
        }
    }
    roots
}

fn find_library_from(start: &Path) -> Option<PathBuf> {
    let subpath = platform::library_subpath().ok()?;
    search_roots(start)
        .into_iter()
        .map(|root| root.join(SDK_LIB_DIR).join(&subpath))
        .find(|candidate| candidate.is_file())
}

fn find_model_from(start: &Path) -> Option<PathBuf> {
    search_roots(start)
        .into_iter()
        .map(|root| root.join(MODEL_RELATIVE_PATH))
        .find(|candidate| candidate.is_file())
}

fn find_model_archives_from(start: &Path) -> Vec<PathBuf> {
    let mut archives = Vec::new();
    for root in search_roots(start) {
        for dir in [root.clone(), root.join(SDK_LIB_DIR)] {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(Result::ok) {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(MODEL_ARCHIVE_PREFIX)
                    && name.ends_with(".zip")
                    && entry.file_type().is_ok_and(|ft| ft.is_file())
                {
                    archives.push(entry.path());
                }
            }
        }
    }
    archives
}

/// Depth-limited search for a model file under `root`.
fn find_model_file(root: &Path, depth: usize) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == MODEL_FILE_EXTENSION) && path.is_file() {
            return Some(path);
        }
        if path.is_dir() {
            subdirs.push(path);
        }
    }
    if depth == 0 {
        return None;
    }
    subdirs
        .into_iter()
        .find_map(|dir| find_model_file(&dir, depth - 1))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

fn resource_io(path: &Path, err: io::Error) -> LynxError {
    LynxError::Resource(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn model_found_in_ancestor_sdk_tree() {
        let root = tempfile::tempdir().unwrap();
        let model = root.path().join(MODEL_RELATIVE_PATH);
        std::fs::create_dir_all(model.parent().unwrap()).unwrap();
        std::fs::write(&model, b"params").unwrap();

        // Three levels below the SDK root, still within scan depth.
        let nested = root.path().join("demo/target/debug");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_model_from(&nested), Some(model));
        assert_eq!(find_model_from(Path::new("/nonexistent")), None);
    }

    #[test]
    fn library_found_via_platform_subpath() {
        let root = tempfile::tempdir().unwrap();
        let lib = root
            .path()
            .join(SDK_LIB_DIR)
            .join(platform::library_subpath().unwrap());
        std::fs::create_dir_all(lib.parent().unwrap()).unwrap();
        std::fs::write(&lib, b"\x7fELF").unwrap();

        assert_eq!(find_library_from(root.path()), Some(lib));
    }

    #[test]
    fn model_env_override_wins_and_dangling_path_is_an_error() {
        let prev = std::env::var_os("LYNX_MODEL_PATH");

        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("lynx_params.lyx");
        std::fs::write(&model, b"params").unwrap();

        std::env::set_var("LYNX_MODEL_PATH", &model);
        let resolved = locate_model();

        // Set but missing must fail instead of falling back to the scan.
        std::env::set_var("LYNX_MODEL_PATH", dir.path().join("gone.lyx"));
        let dangling = locate_model();

        // Restore before asserting so a failure cannot leak the override.
        match prev {
            Some(value) => std::env::set_var("LYNX_MODEL_PATH", value),
            None => std::env::remove_var("LYNX_MODEL_PATH"),
        }

        assert_eq!(resolved.unwrap(), model);
        match dangling.unwrap_err() {
            LynxError::Resource(message) => {
                assert!(message.contains("LYNX_MODEL_PATH"), "{message}");
            }
            other => panic!("expected resource error, got {other}"),
        }
    }

    #[test]
    fn library_env_override_wins_and_dangling_path_is_an_error() {
        let prev = std::env::var_os("LYNX_LIBRARY_PATH");

        let dir = tempfile::tempdir().unwrap();
        let library = dir.path().join("liblynx.so");
        std::fs::write(&library, b"\x7fELF").unwrap();

        std::env::set_var("LYNX_LIBRARY_PATH", &library);
        let resolved = locate_library();

        std::env::set_var("LYNX_LIBRARY_PATH", dir.path().join("gone.so"));
        let dangling = locate_library();

        match prev {
            Some(value) => std::env::set_var("LYNX_LIBRARY_PATH", value),
            None => std::env::remove_var("LYNX_LIBRARY_PATH"),
        }

        assert_eq!(resolved.unwrap(), library);
        match dangling.unwrap_err() {
            LynxError::Resource(message) => {
                assert!(message.contains("LYNX_LIBRARY_PATH"), "{message}");
            }
            other => panic!("expected resource error, got {other}"),
        }
    }

    #[test]
    fn archive_discovery_matches_prefix_and_extension() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("lynx-model-en-1.2.zip"), b"zip").unwrap();
        std::fs::write(root.path().join("notes.zip"), b"zip").unwrap();
        std::fs::write(root.path().join("lynx-model-en-1.2.txt"), b"txt").unwrap();

        let archives = find_model_archives_from(root.path());
        assert_eq!(archives.len(), 1);
        assert!(archives[0].ends_with("lynx-model-en-1.2.zip"));
    }

    #[test]
    fn archive_extraction_caches_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lynx-model-en-9.9.zip");

        let file = std::fs::File::create(&archive).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(
                "lynx-model-en-9.9/lynx_params.lyx",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(b"model-bytes").unwrap();
        writer.finish().unwrap();

        let first = extract_model_archive(&archive).unwrap();
        assert!(first.is_file());
        assert_eq!(
            first.extension().and_then(|e| e.to_str()),
            Some(MODEL_FILE_EXTENSION)
        );
        assert_eq!(std::fs::read(&first).unwrap(), b"model-bytes");

        // Second resolution hits the cache and lands on the same path.
        let second = extract_model_archive(&archive).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn traversal_entries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lynx-model-evil-1.0.zip");

        let file = std::fs::File::create(&archive).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(
                "../escape.lyx",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(b"nope").unwrap();
        writer.finish().unwrap();

        let err = extract_model_archive(&archive).unwrap_err();
        assert!(matches!(err, LynxError::Resource(_)));
    }
}
