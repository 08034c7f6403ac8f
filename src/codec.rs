//! Manifest Codec
//!
//! Two encodings of one manifest:
//! - a URL-safe compressed token for the define endpoint (LZ-String base64
//!   with `+`/`/` swapped for `-`/`_` and padding stripped)
//! - the JSON body of the creation API

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CodecError;
use crate::manifest::{normalize_path, FileManifest, SandboxFile};

#[derive(Serialize, Deserialize)]
struct DefineEnvelope {
    files: IndexMap<String, DefineFile>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefineFile {
    content: String,
    is_binary: bool,
}

/// Encode `manifest` as a define-endpoint `parameters` token.
///
/// Only paths and contents are carried; file flags have no representation
/// in the define envelope.
pub fn encode_parameters(manifest: &FileManifest) -> Result<String, CodecError> {
    let envelope = DefineEnvelope {
        files: manifest
            .iter()
            .map(|(path, file)| {
                (
                    normalize_path(path).to_string(),
                    DefineFile {
                        content: file.code.clone(),
                        is_binary: false,
                    },
                )
            })
            .collect(),
    };
    let json = serde_json::to_string(&envelope)?;
    let token: String = lz_str::compress_to_base64(json.as_str())
        .chars()
        .filter_map(|c| match c {
            '+' => Some('-'),
            '/' => Some('_'),
            '=' => None,
            c => Some(c),
        })
        .collect();
    debug!(files = manifest.len(), json_bytes = json.len(), token_bytes = token.len(), "encoded parameters");
    Ok(token)
}

/// Inverse of [`encode_parameters`].
pub fn decode_parameters(token: &str) -> Result<FileManifest, CodecError> {
    let mut base64: String = token
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    match base64.len() % 4 {
        2 => base64.push_str("=="),
        3 => base64.push('='),
        _ => {}
    }

    let units = lz_str::decompress_from_base64(base64.as_str()).ok_or(CodecError::Decompress)?;
    let json = String::from_utf16(&units).map_err(|_| CodecError::Utf16)?;
    let envelope: DefineEnvelope = serde_json::from_str(&json)?;
    Ok(envelope
        .files
        .into_iter()
        .map(|(path, file)| (path, SandboxFile::new(file.content)))
        .collect())
}

/// Visibility of a sandbox created through the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    #[default]
    Private,
}

impl Privacy {
    /// The creation API's integer code.
    pub fn code(self) -> u8 {
        match self {
            Self::Public => 0,
            Self::Private => 2,
        }
    }
}

/// Body of `POST /sandbox`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSandboxRequest<'a> {
    pub title: &'a str,
    pub files: &'a FileManifest,
    pub privacy: u8,
}

pub fn api_payload<'a>(
    title: &'a str,
    files: &'a FileManifest,
    privacy: Privacy,
) -> CreateSandboxRequest<'a> {
    CreateSandboxRequest {
        title,
        files,
        privacy: privacy.code(),
    }
}
