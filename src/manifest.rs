//! File manifests - the generated project as path -> file.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Package name -> version range.
pub type DependencyManifest = IndexMap<String, String>;

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSandboxFile")]
pub struct SandboxFile {
    pub code: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_only: bool,
}

/// Extra files may be given as a bare string of code.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSandboxFile {
    Code(String),
    #[serde(rename_all = "camelCase")]
    File {
        code: String,
        #[serde(default)]
        hidden: bool,
        #[serde(default)]
        active: bool,
        #[serde(default)]
        read_only: bool,
    },
}

impl From<RawSandboxFile> for SandboxFile {
    fn from(raw: RawSandboxFile) -> Self {
        match raw {
            RawSandboxFile::Code(code) => Self::new(code),
            RawSandboxFile::File {
                code,
                hidden,
                active,
                read_only,
            } => Self {
                code,
                hidden,
                active,
                read_only,
            },
        }
    }
}

impl SandboxFile {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }
}

/// Canonical form of a project path: no leading `/`.
pub fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Ordered set of project files. Insertion order is kept; inserting an
/// existing path replaces the file in place. Paths are stored normalized,
/// so `/src/App.js` and `src/App.js` name the same file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileManifest {
    files: IndexMap<String, SandboxFile>,
}

impl<'de> Deserialize<'de> for FileManifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IndexMap::<String, SandboxFile>::deserialize(deserializer).map(FileManifest::from_iter)
    }
}

impl FileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, file: SandboxFile) -> Option<SandboxFile> {
        let mut path = path.into();
        let stripped = path.len() - normalize_path(&path).len();
        path.drain(..stripped);
        self.files.insert(path, file)
    }

    pub fn get(&self, path: &str) -> Option<&SandboxFile> {
        self.files.get(normalize_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(normalize_path(path))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SandboxFile)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Layer `other` on top: its files replace same-path files here.
    pub fn merge(&mut self, other: FileManifest) {
        for (path, file) in other.files {
            self.insert(path, file);
        }
    }

    /// Path of the first file flagged active.
    pub fn active_file(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|(_, file)| file.active)
            .map(|(path, _)| path.as_str())
    }
}

impl FromIterator<(String, SandboxFile)> for FileManifest {
    fn from_iter<I: IntoIterator<Item = (String, SandboxFile)>>(iter: I) -> Self {
        let mut manifest = Self::new();
        for (path, file) in iter {
            manifest.insert(path, file);
        }
        manifest
    }
}

impl IntoIterator for FileManifest {
    type Item = (String, SandboxFile);
    type IntoIter = indexmap::map::IntoIter<String, SandboxFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides_in_place() {
        let mut base: FileManifest = [
            ("a.js".to_string(), SandboxFile::new("a")),
            ("b.js".to_string(), SandboxFile::new("b")),
        ]
        .into_iter()
        .collect();
        let extra: FileManifest = [
            ("a.js".to_string(), SandboxFile::new("override")),
            ("c.md".to_string(), SandboxFile::new("c")),
        ]
        .into_iter()
        .collect();

        base.merge(extra);
        assert_eq!(base.paths().collect::<Vec<_>>(), vec!["a.js", "b.js", "c.md"]);
        assert_eq!(base.get("a.js").map(|f| f.code.as_str()), Some("override"));
    }

    #[test]
    fn test_extra_files_accept_bare_strings() {
        let manifest: FileManifest = serde_json::from_str(
            r##"{"README.md": "# hi", "src/extra.js": {"code": "x", "readOnly": true}}"##,
        )
        .unwrap();
        assert_eq!(manifest.get("README.md"), Some(&SandboxFile::new("# hi")));
        assert!(manifest.get("src/extra.js").unwrap().read_only);
    }

    #[test]
    fn test_leading_slash_names_the_same_file() {
        let mut base = FileManifest::new();
        base.insert("src/App.js", SandboxFile::new("recipe"));
        let extra: FileManifest =
            serde_json::from_str(r#"{"/src/App.js": "caller", "//public/x.html": "x"}"#).unwrap();

        base.merge(extra);
        assert_eq!(base.paths().collect::<Vec<_>>(), vec!["src/App.js", "public/x.html"]);
        assert_eq!(base.get("/src/App.js"), Some(&SandboxFile::new("caller")));
        assert!(base.contains("public/x.html"));
    }

    #[test]
    fn test_flags_omitted_when_false() {
        let mut manifest = FileManifest::new();
        manifest.insert("src/App.js", SandboxFile::new("x").active());
        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(json, r#"{"src/App.js":{"code":"x","active":true}}"#);
        assert_eq!(manifest.active_file(), Some("src/App.js"));
    }
}
