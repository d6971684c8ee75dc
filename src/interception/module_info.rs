// src/interception/module_info.rs
//! Mapping loaded files to the dependency they belong to

use std::path::{Component, Path, PathBuf};

/// Dependency a file belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIdentity {
    /// Package name, `@scope/name` for scoped packages
    pub name: String,

    /// Dependency root directory
    pub base: PathBuf,

    /// Path of the file relative to `base`, `/` separated
    pub path: String,
}

/// Derive the identity from the last `marker` segment in `path`
///
/// Returns `None` for files outside any dependency (application code) and
/// for the dependency directory itself.
pub fn module_identity_from_path(path: &Path, marker: &str) -> Option<ModuleIdentity> {
    let components: Vec<Component<'_>> = path.components().collect();
    let marker_index = components
        .iter()
        .rposition(|c| matches!(c, Component::Normal(s) if *s == marker))?;

    let first = normal_str(components.get(marker_index + 1)?)?;
    let (name, name_len) = if first.starts_with('@') {
        let second = normal_str(components.get(marker_index + 2)?)?;
        (format!("{}/{}", first, second), 2)
    } else {
        (first.to_string(), 1)
    };

    let root_end = marker_index + 1 + name_len;
    let rest: Vec<&str> = components[root_end..]
        .iter()
        .map(normal_str)
        .collect::<Option<Vec<_>>>()?;
    if rest.is_empty() {
        return None;
    }

    Some(ModuleIdentity {
        name,
        base: components[..root_end].iter().collect(),
        path: rest.join("/"),
    })
}

fn normal_str<'a>(component: &Component<'a>) -> Option<&'a str> {
    match component {
        Component::Normal(s) => s.to_str(),
        _ => None,
    }
}

/// Resolve `.` and `..` without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
