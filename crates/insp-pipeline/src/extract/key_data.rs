//! Storage key decomposition

use serde::Serialize;

/// Normalized view of a decoded object key
///
/// `path/to/file/1/file_123.txt` becomes:
///
/// | field                | value                      |
/// |----------------------|----------------------------|
/// | `path`               | `[path, to, file, 1, file_123.txt]` |
/// | `root_folder`        | `path`                     |
/// | `file_name`          | `file_123.txt`             |
/// | `file_base_name`     | `file_123`                 |
/// | `file_suffix`        | `txt`                      |
/// | `key_without_suffix` | `path/to/file/1/file_123`  |
///
/// A key whose last segment has no `.` is kept as one opaque segment: the
/// suffix is empty and `root_folder`, `file_name` and `path[0]` are all the
/// whole key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyData {
    pub key: String,
    pub path: Vec<String>,
    pub root_folder: String,
    pub file_name: String,
    pub file_base_name: String,
    pub file_suffix: String,
    pub key_without_suffix: String,
}

impl KeyData {
    /// Decompose a decoded (not URL-encoded) object key. Never fails.
    pub fn resolve(key: &str) -> Self {
        let last_segment = key.rsplit('/').next().unwrap_or(key);

        let Some(dot) = last_segment.rfind('.') else {
            return Self {
                key: key.to_string(),
                path: vec![key.to_string()],
                root_folder: key.to_string(),
                file_name: key.to_string(),
                file_base_name: key.to_string(),
                file_suffix: String::new(),
                key_without_suffix: key.to_string(),
            };
        };

        let path: Vec<String> = key.split('/').map(str::to_string).collect();
        let suffix_len = last_segment.len() - dot;

        Self {
            key: key.to_string(),
            root_folder: path.first().cloned().unwrap_or_default(),
            path,
            file_name: last_segment.to_string(),
            file_base_name: last_segment[..dot].to_string(),
            file_suffix: last_segment[dot + 1..].to_lowercase(),
            key_without_suffix: key[..key.len() - suffix_len].to_string(),
        }
    }

    /// Folder segments: the path without the trailing file name
    pub fn folders(&self) -> &[String] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    /// Folder part of the key joined back with `/` (empty at bucket root)
    pub fn folder_prefix(&self) -> String {
        self.folders().join("/")
    }

    pub fn has_suffix(&self) -> bool {
        !self.file_suffix.is_empty()
    }
}
