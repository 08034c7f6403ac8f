//! Export configuration and remote endpoints.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::codec::Privacy;
use crate::error::ConfigError;
use crate::imports::{ImportMap, ImportSpec};
use crate::manifest::{DependencyManifest, FileManifest};
use crate::templates::TemplateKind;

/// Attribution sent with every launch.
pub const UTM_SOURCE: &str = "storybook-addon";

const DEFAULT_TITLE: &str = "Storybook sandbox";

/// How a synthesized project reaches the sandbox service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Browser form POST of the compressed manifest to the define endpoint.
    Define,
    /// Token-authenticated creation request, then a redirect to the viewer.
    Api,
}

/// Caller options, as declared in the story parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub map_component: ImportMap,
    #[serde(default)]
    pub dependencies: DependencyManifest,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub fallback_import: Option<String>,
    #[serde(default)]
    pub files: FileManifest,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub sandbox_id: Option<String>,
    #[serde(default)]
    pub query_params: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub mode: Option<LaunchMode>,
}

impl ExportOptions {
    /// Parse an options document.
    ///
    /// Import mapping entries are checked one by one first so a bad entry is
    /// reported with its module path.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if let Some(Value::Object(mapping)) = value.get("mapComponent") {
            for (key, entry) in mapping {
                serde_json::from_value::<ImportSpec>(entry.clone()).map_err(|e| {
                    ConfigError::InvalidImportSpec {
                        key: key.clone(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }

        serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// The API token, if a non-empty one was given.
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Selected template; `react` when unset.
    pub fn template_kind(&self) -> Result<TemplateKind, ConfigError> {
        self.template
            .as_deref()
            .map(str::parse::<TemplateKind>)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Explicit mode, else `api` when a token is present, else `define`.
    pub fn launch_mode(&self) -> LaunchMode {
        self.mode.unwrap_or(if self.api_token().is_some() {
            LaunchMode::Api
        } else {
            LaunchMode::Define
        })
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// Caller query parameters without a leading `?` or `&`.
    pub fn query_params(&self) -> Option<&str> {
        self.query_params
            .as_deref()
            .map(|q| q.trim_start_matches(['?', '&']))
            .filter(|q| !q.is_empty())
    }
}

fn default_api_url() -> String {
    "https://api.codesandbox.io".to_string()
}

fn default_viewer_url() -> String {
    "https://codesandbox.io".to_string()
}

fn default_define_url() -> String {
    "https://codesandbox.io/api/v1/sandboxes/define".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Remote service locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Base URL of the creation API.
    pub api: String,
    /// Base URL sandboxes are opened under.
    pub viewer: String,
    /// Define endpoint the launch form posts to.
    pub define: String,
    pub timeout: Duration,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api: default_api_url(),
            viewer: default_viewer_url(),
            define: default_define_url(),
            timeout: Duration::from_secs(default_timeout()),
        }
    }
}

impl Endpoints {
    /// Create endpoints from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CSB_API_URL` | Creation API base URL |
    /// | `CSB_VIEWER_URL` | Viewer base URL |
    /// | `CSB_DEFINE_URL` | Define endpoint |
    /// | `CSB_TIMEOUT_SECS` | Request timeout in seconds |
    pub fn from_env() -> Self {
        Self {
            api: std::env::var("CSB_API_URL").unwrap_or_else(|_| default_api_url()),
            viewer: std::env::var("CSB_VIEWER_URL").unwrap_or_else(|_| default_viewer_url()),
            define: std::env::var("CSB_DEFINE_URL").unwrap_or_else(|_| default_define_url()),
            timeout: Duration::from_secs(
                std::env::var("CSB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_timeout),
            ),
        }
    }

    pub fn with_api(mut self, url: impl Into<String>) -> Self {
        self.api = url.into();
        self
    }

    pub fn with_viewer(mut self, url: impl Into<String>) -> Self {
        self.viewer = url.into();
        self
    }

    pub fn with_define(mut self, url: impl Into<String>) -> Self {
        self.define = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn create_sandbox_url(&self) -> String {
        format!("{}/sandbox", self.api.trim_end_matches('/'))
    }

    /// `{viewer}/p/sandbox/<alias>?file=/<active>&utm-source=...[&extra]`
    pub fn viewer_url(
        &self,
        alias: &str,
        active_file: &str,
        query_params: Option<&str>,
    ) -> Result<Url, ConfigError> {
        let mut query = attribution_query(active_file);
        if let Some(extra) = query_params {
            query.push('&');
            query.push_str(extra);
        }
        self.sandbox_url(alias, Some(&query))
    }

    /// Link to an existing sandbox, bypassing synthesis.
    pub fn deep_link(&self, sandbox_id: &str, query_params: Option<&str>) -> Result<Url, ConfigError> {
        self.sandbox_url(sandbox_id, query_params)
    }

    fn sandbox_url(&self, id: &str, query: Option<&str>) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.viewer)
            .map_err(|e| ConfigError::Invalid(format!("viewer URL {}: {e}", self.viewer)))?;
        url.path_segments_mut()
            .map_err(|_| ConfigError::Invalid(format!("viewer URL {} cannot be a base", self.viewer)))?
            .pop_if_empty()
            .extend(["p", "sandbox", id]);
        url.set_query(query);
        Ok(url)
    }
}

/// `file=/<active>&utm-source=storybook-addon`
pub fn attribution_query(active_file: &str) -> String {
    format!(
        "file=/{}&utm-source={UTM_SOURCE}",
        active_file.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExportOptions::from_json("{}").unwrap();
        assert_eq!(options.template_kind().unwrap(), TemplateKind::React);
        assert_eq!(options.privacy, Privacy::Private);
        assert_eq!(options.launch_mode(), LaunchMode::Define);
        assert_eq!(options.title(), "Storybook sandbox");
        assert!(options.map_component.is_empty());
    }

    #[test]
    fn test_token_selects_api_mode() {
        let options = ExportOptions::from_json(r#"{"apiToken": "csb_1"}"#).unwrap();
        assert_eq!(options.launch_mode(), LaunchMode::Api);

        let forced = ExportOptions::from_json(r#"{"apiToken": "csb_1", "mode": "define"}"#).unwrap();
        assert_eq!(forced.launch_mode(), LaunchMode::Define);

        let empty = ExportOptions::from_json(r#"{"apiToken": ""}"#).unwrap();
        assert_eq!(empty.api_token(), None);
    }

    #[test]
    fn test_mapping_order_preserved() {
        let options = ExportOptions::from_json(
            r#"{"mapComponent": {"z-mod": ["Z"], "a-mod": "A", "m.css": true}}"#,
        )
        .unwrap();
        let keys: Vec<&String> = options.map_component.keys().collect();
        assert_eq!(keys, vec!["z-mod", "a-mod", "m.css"]);
    }

    #[test]
    fn test_bad_mapping_entry_names_key() {
        let err = ExportOptions::from_json(r#"{"mapComponent": {"@pkg/ui": false}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidImportSpec { key, .. } if key == "@pkg/ui"));
    }

    #[test]
    fn test_unsupported_template() {
        let options = ExportOptions::from_json(r#"{"template": "svelte"}"#).unwrap();
        assert!(matches!(
            options.template_kind(),
            Err(ConfigError::UnsupportedTemplate(name)) if name == "svelte"
        ));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            ExportOptions::from_json("{"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ExportOptions::from_json(r#"{"privacy": "secret"}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, r#"{"template": "angular", "queryParams": "?view=split"}"#).unwrap();
        let options = ExportOptions::load(&path).unwrap();
        assert_eq!(options.template_kind().unwrap(), TemplateKind::Angular);
        assert_eq!(options.query_params(), Some("view=split"));

        assert!(ExportOptions::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_token_never_serialized() {
        let options = ExportOptions::default().with_api_token("secret");
        let json = serde_json::to_string(&options).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_viewer_url() {
        let endpoints = Endpoints::default();
        let url = endpoints
            .viewer_url("abc123", "src/App.js", Some("view=preview"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://codesandbox.io/p/sandbox/abc123?file=/src/App.js&utm-source=storybook-addon&view=preview"
        );
    }

    #[test]
    fn test_deep_link() {
        let endpoints = Endpoints::default().with_viewer("http://localhost:9000/");
        assert_eq!(
            endpoints.deep_link("xyz", None).unwrap().as_str(),
            "http://localhost:9000/p/sandbox/xyz"
        );
        assert_eq!(
            endpoints.deep_link("xyz", Some("a=1")).unwrap().as_str(),
            "http://localhost:9000/p/sandbox/xyz?a=1"
        );
    }

    #[test]
    fn test_create_url_trims_slash() {
        let endpoints = Endpoints::default().with_api("http://127.0.0.1:4000/");
        assert_eq!(endpoints.create_sandbox_url(), "http://127.0.0.1:4000/sandbox");
    }
}
