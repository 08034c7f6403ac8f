//! Import Resolver
//!
//! Turns the configured import mapping (plus, optionally, the identifiers
//! the scanner found) into the import block of the generated component.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::scanner::FreeIdentifiers;

/// One entry of the import mapping. The three shapes are exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawImportSpec", into = "RawImportSpec")]
pub enum ImportSpec {
    /// `import { A, B } from 'mod';`
    NamedList(Vec<String>),
    /// `import A from 'mod';`
    Default(String),
    /// `import 'mod';`
    SideEffectOnly,
}

/// JSON shape of a mapping value: `["A", "B"]`, `"A"` or `true`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawImportSpec {
    List(Vec<String>),
    Name(String),
    Flag(bool),
}

impl TryFrom<RawImportSpec> for ImportSpec {
    type Error = String;

    fn try_from(raw: RawImportSpec) -> Result<Self, Self::Error> {
        match raw {
            RawImportSpec::List(names) => Ok(Self::NamedList(names)),
            RawImportSpec::Name(name) => Ok(Self::Default(name)),
            RawImportSpec::Flag(true) => Ok(Self::SideEffectOnly),
            RawImportSpec::Flag(false) => {
                Err("`false` is not an import; use `true` for a side-effect import".to_string())
            }
        }
    }
}

impl From<ImportSpec> for RawImportSpec {
    fn from(spec: ImportSpec) -> Self {
        match spec {
            ImportSpec::NamedList(names) => Self::List(names),
            ImportSpec::Default(name) => Self::Name(name),
            ImportSpec::SideEffectOnly => Self::Flag(true),
        }
    }
}

impl ImportSpec {
    pub fn shape(&self) -> &'static str {
        match self {
            Self::NamedList(_) => "named-list",
            Self::Default(_) => "default",
            Self::SideEffectOnly => "side-effect",
        }
    }

    /// Local names this import introduces.
    pub fn bindings(&self) -> &[String] {
        match self {
            Self::NamedList(names) => names,
            Self::Default(name) => std::slice::from_ref(name),
            Self::SideEffectOnly => &[],
        }
    }
}

/// Module path -> import spec, in configuration order.
pub type ImportMap = IndexMap<String, ImportSpec>;

/// Return a copy of `mapping` where `fallback` lists every discovered
/// identifier no other entry already binds.
pub fn merge_fallback(
    mapping: &ImportMap,
    fallback: &str,
    discovered: &FreeIdentifiers,
) -> Result<ImportMap, ConfigError> {
    let mut merged = mapping.clone();

    let bound_elsewhere: Vec<&String> = mapping
        .iter()
        .filter(|(module, _)| module.as_str() != fallback)
        .flat_map(|(_, spec)| spec.bindings())
        .collect();
    let wanted = discovered
        .iter()
        .filter(|name| !bound_elsewhere.contains(name));

    match merged.get_mut(fallback) {
        None => {
            merged.insert(
                fallback.to_string(),
                ImportSpec::NamedList(wanted.cloned().collect()),
            );
        }
        Some(ImportSpec::NamedList(names)) => {
            for name in wanted {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        Some(other) => {
            return Err(ConfigError::FallbackNotList {
                key: fallback.to_string(),
                shape: other.shape(),
            });
        }
    }

    debug!(fallback, discovered = discovered.len(), "merged fallback import");
    Ok(merged)
}

/// Resolve the mapping into import statements.
pub fn resolve_imports(
    mapping: &ImportMap,
    fallback: Option<&str>,
    discovered: &FreeIdentifiers,
) -> Result<ImportStatements, ConfigError> {
    let lines = match fallback {
        Some(key) => merge_fallback(mapping, key, discovered)?,
        None => mapping.clone(),
    };
    Ok(ImportStatements {
        lines: lines
            .into_iter()
            .map(|(module, spec)| ImportLine { module, spec })
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLine {
    pub module: String,
    pub spec: ImportSpec,
}

impl fmt::Display for ImportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = quote_module(&self.module);
        match &self.spec {
            ImportSpec::NamedList(names) if names.is_empty() => {
                write!(f, "import {{}} from {module};")
            }
            ImportSpec::NamedList(names) => {
                write!(f, "import {{ {} }} from {module};", names.join(", "))
            }
            ImportSpec::Default(name) => write!(f, "import {name} from {module};"),
            ImportSpec::SideEffectOnly => write!(f, "import {module};"),
        }
    }
}

/// Ordered import block, one statement per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStatements {
    lines: Vec<ImportLine>,
}

impl ImportStatements {
    pub fn lines(&self) -> &[ImportLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Every local name bound by the block, in order.
    pub fn bindings(&self) -> Vec<&str> {
        self.lines
            .iter()
            .flat_map(|line| line.spec.bindings())
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for ImportStatements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

fn quote_module(module: &str) -> String {
    format!("'{}'", module.replace('\\', "\\\\").replace('\'', "\\'"))
}
