//! Path and glob joining for config inheritance.
//!
//! Child `src` globs and `dest` paths are written relative to their parent.
//! This module joins them:
//! - Pure string manipulation (no filesystem I/O)
//! - Negated child globs (`!pattern`) keep their `!` in front of the joined path
//! - A parent glob contributes only its literal directory part unless forced
//! - Output always uses forward slashes

use std::path::{Component, Path, PathBuf};

/// Characters that make a path segment a glob pattern.
const GLOB_MAGIC: &[char] = &['*', '?', '[', ']', '{', '}', '(', ')', '!'];

/// Join every parent glob with every child glob (cartesian, parent-major order).
///
/// Negated parent globs cannot act as a directory prefix and are skipped. If no
/// usable parent remains the child globs are returned unchanged.
pub fn join_globs(parents: &[String], globs: &[String]) -> Vec<String> {
    let prefixes: Vec<&String> = parents.iter().filter(|p| !p.starts_with('!')).collect();
    if prefixes.is_empty() {
        return globs.to_vec();
    }

    let mut joined = Vec::with_capacity(prefixes.len() * globs.len());
    for parent in prefixes {
        for glob in globs {
            joined.push(join_path(parent, glob, false));
        }
    }
    joined
}

/// Join a single child path or glob under a parent.
///
/// With `force`, the parent is taken verbatim as a directory even if it looks
/// like a glob (used for `dest`, which may not exist yet).
pub fn join_path(parent: &str, child: &str, force: bool) -> String {
    let (negation, positive) = match child.strip_prefix('!') {
        Some(rest) => ("!", rest),
        None => ("", child),
    };

    // Absolute children are never re-rooted
    if Path::new(positive).is_absolute() {
        return child.to_string();
    }

    let prefix = if force { parent } else { glob_base(parent) };
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return format!("{}{}", negation, positive);
    }

    let joined = PathBuf::from(prefix).join(positive);
    let normalized = normalize_path_components(&joined);
    format!("{}{}", negation, path_to_forward_slashes(&normalized))
}

/// True if the pattern contains glob magic characters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(GLOB_MAGIC)
}

/// The literal leading directory part of a glob (`src/**/*.js` -> `src`).
///
/// A pattern without magic is returned as-is, since it names a directory.
pub fn glob_base(pattern: &str) -> &str {
    if !is_glob(pattern) {
        return pattern;
    }

    let mut end = 0;
    for (idx, segment) in segment_spans(pattern) {
        if segment.contains(GLOB_MAGIC) {
            break;
        }
        end = idx + segment.len();
    }
    &pattern[..end]
}

/// Segments of a slash-separated pattern with their byte offsets.
fn segment_spans(pattern: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    pattern.split('/').map(move |segment| {
        let start = offset;
        offset += segment.len() + 1;
        (start, segment)
    })
}

/// Normalize path components without touching the filesystem.
/// Handles `.` and `..` but does not resolve symlinks.
fn normalize_path_components(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => {
                // Windows drive prefix (e.g., C:)
                components.push(Component::Prefix(p));
            }
            Component::RootDir => {
                components.push(Component::RootDir);
            }
            Component::CurDir => {
                // Skip `.` - it refers to current directory
            }
            Component::ParentDir => {
                // Go up one directory if possible
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                } else {
                    components.push(Component::ParentDir);
                }
            }
            Component::Normal(name) => {
                components.push(Component::Normal(name));
            }
        }
    }

    components.iter().collect()
}

/// Convert path to string using forward slashes.
fn path_to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
