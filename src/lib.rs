//! Story Sandbox Core - story to sandbox project synthesis
//!
//! # Guarantees
//! 1. Imports Come From the Story: free component tags are found by parsing,
//!    never by string matching
//! 2. Recipes Are Closed: a manifest holds its template's files plus the
//!    caller's extras, nothing else
//! 3. Deterministic Output: the same inputs give a byte-identical manifest
//! 4. Lossless Transport: the define token decodes back to the manifest
//! 5. Configuration Fails Early: no request is sent on a bad configuration

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod hashing;
pub mod imports;
pub mod jsx;
pub mod manifest;
pub mod pipeline;
pub mod scanner;
pub mod templates;

pub use client::SandboxClient;
pub use codec::{api_payload, decode_parameters, encode_parameters, CreateSandboxRequest, Privacy};
pub use config::{Endpoints, ExportOptions, LaunchMode};
pub use error::{
    CodecError, ConfigError, ExportError, ExportResult, FormatError, Notification, TransportError,
};
pub use format::{Formatter, SourceFormatter};
pub use hashing::{canonical_json, manifest_digest};
pub use imports::{resolve_imports, ImportSpec, ImportStatements};
pub use manifest::{DependencyManifest, FileManifest, SandboxFile};
pub use pipeline::{ExportPipeline, LaunchAction, Notifier, StorySource};
pub use scanner::{scan, FreeIdentifiers};
pub use templates::{assemble, AssembleContext, TemplateKind};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
