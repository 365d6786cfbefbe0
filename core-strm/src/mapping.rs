//! # Path Mapping
//!
//! Resolves remote drive paths to the local mirror directory that covers them.
//!
//! Matching is done on path segments, never on raw string prefixes: a remote
//! path `/Movies2/x.mkv` is not covered by a mapping rooted at `/Movies`.

use core_runtime::config::{normalize_remote_path, PathMapping};
use std::path::PathBuf;

/// Extension given to every pointer file
pub const POINTER_EXTENSION: &str = "strm";

/// Ordered list of `local_root#remote_root` pairs; the first covering mapping wins
#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    mappings: Vec<PathMapping>,
}

impl PathMapper {
    pub fn new(mappings: Vec<PathMapping>) -> Self {
        Self { mappings }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn mappings(&self) -> &[PathMapping] {
        &self.mappings
    }

    /// First mapping whose remote root is a segment-wise prefix of `remote_path`
    pub fn resolve(&self, remote_path: &str) -> Option<&PathMapping> {
        let remote_path = normalize_remote_path(remote_path);
        self.mappings
            .iter()
            .find(|mapping| relative_segments(&mapping.remote_root, &remote_path).is_some())
    }
}

/// Segments of `path` below `root`, or `None` when `root` does not cover it.
///
/// Both arguments must already be normalised.
pub fn relative_segments<'a>(root: &str, path: &'a str) -> Option<Vec<&'a str>> {
    let mut root_segments = root.split('/').filter(|s| !s.is_empty());
    let mut path_segments = path.split('/').filter(|s| !s.is_empty());

    loop {
        match root_segments.next() {
            Some(expected) => {
                if path_segments.next()? != expected {
                    return None;
                }
            }
            None => return Some(path_segments.collect()),
        }
    }
}

/// Local directory mirroring `remote_dir` under `mapping`
///
/// Returns `None` when the mapping does not cover the directory or when a
/// segment would climb out of the local root.
pub fn local_dir_for(mapping: &PathMapping, remote_dir: &str) -> Option<PathBuf> {
    let remote_dir = normalize_remote_path(remote_dir);
    let segments = relative_segments(&mapping.remote_root, &remote_dir)?;

    let mut local = mapping.local_root.clone();
    for segment in segments {
        if segment == "." || segment == ".." {
            return None;
        }
        local.push(segment);
    }
    Some(local)
}

/// Pointer file path for `file_name` living in `remote_dir`
pub fn pointer_path_for(mapping: &PathMapping, remote_dir: &str, file_name: &str) -> Option<PathBuf> {
    if file_name.contains(['/', '\\']) {
        return None;
    }
    let dir = local_dir_for(mapping, remote_dir)?;
    Some(dir.join(pointer_file_name(file_name)))
}

/// `S01E01.mkv` → `S01E01.strm`
pub fn pointer_file_name(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    format!("{}.{}", stem, POINTER_EXTENSION)
}

/// Parent directory and file name of a remote file path
pub fn split_remote_path(remote_path: &str) -> (String, String) {
    let normalized = normalize_remote_path(remote_path);
    match normalized.rsplit_once('/') {
        Some((dir, name)) => (normalize_remote_path(dir), name.to_string()),
        None => ("/".to_string(), normalized),
    }
}

/// Join a child name onto a normalised remote directory
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}
