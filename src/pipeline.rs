//! Export Pipeline - single entry point for story exports
//!
//! scan -> resolve -> assemble -> encode -> dispatch. Every configuration
//! check runs before the first network call, and nothing is dispatched until
//! every file of the manifest is fully formatted.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};
use url::form_urlencoded;

use crate::client::SandboxClient;
use crate::codec::{api_payload, encode_parameters};
use crate::config::{attribution_query, Endpoints, ExportOptions, LaunchMode};
use crate::error::{ConfigError, ExportResult, Notification};
use crate::format::{Formatter, SourceFormatter};
use crate::hashing::manifest_digest;
use crate::imports::{resolve_imports, ImportStatements};
use crate::manifest::FileManifest;
use crate::scanner::{scan, FreeIdentifiers};
use crate::templates::{assemble, AssembleContext};

/// What the host should do to open the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LaunchAction {
    /// Open `url` in a new tab.
    Redirect { url: String },
    /// Submit a hidden form, opening the response in `target`.
    SubmitForm {
        action: String,
        method: String,
        target: String,
        parameters: String,
        query: String,
    },
}

impl LaunchAction {
    fn submit_form(action: &str, parameters: String, query: String) -> Self {
        Self::SubmitForm {
            action: action.to_string(),
            method: "POST".to_string(),
            target: "_blank".to_string(),
            parameters,
            query,
        }
    }

    /// The URL a redirect opens.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Redirect { url } => Some(url.as_str()),
            Self::SubmitForm { .. } => None,
        }
    }

    /// GET equivalent of a form submission.
    pub fn define_url(&self) -> Option<String> {
        match self {
            Self::Redirect { .. } => None,
            Self::SubmitForm {
                action,
                parameters,
                query,
                ..
            } => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .append_pair("parameters", parameters)
                    .append_pair("query", query)
                    .finish();
                Some(format!("{action}?{encoded}"))
            }
        }
    }

    /// Standalone HTML page that submits the form on load.
    pub fn form_html(&self) -> Option<String> {
        let Self::SubmitForm {
            action,
            method,
            target,
            parameters,
            query,
        } = self
        else {
            return None;
        };

        let mut html = String::from("<!DOCTYPE html>\n<html>\n  <body>\n");
        html.push_str(&format!(
            "    <form id=\"launch\" action=\"{}\" method=\"{}\" target=\"{}\" style=\"display: none\">\n",
            escape_html(action),
            escape_html(method),
            escape_html(target)
        ));
        for (name, value) in [("parameters", parameters), ("query", query)] {
            html.push_str(&format!(
                "      <input type=\"hidden\" name=\"{name}\" value=\"{}\">\n",
                escape_html(value)
            ));
        }
        html.push_str("    </form>\n");
        html.push_str("    <script>document.getElementById(\"launch\").submit();</script>\n");
        html.push_str("  </body>\n</html>\n");
        Some(html)
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Receives the notification raised when an export fails.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<F> Notifier for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}

/// Latest rendered story source. Later updates replace earlier ones.
#[derive(Debug)]
pub struct StorySource {
    tx: watch::Sender<Option<String>>,
}

impl Default for StorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl StorySource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn publish(&self, source: impl Into<String>) {
        self.tx.send_replace(Some(source.into()));
    }

    pub fn latest(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

/// The export pipeline.
#[derive(Clone)]
pub struct ExportPipeline {
    endpoints: Endpoints,
    formatter: Arc<dyn Formatter>,
}

impl ExportPipeline {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            formatter: Arc::new(SourceFormatter::default()),
        }
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Import block for `story`. The story is only scanned when a fallback
    /// import is configured.
    pub fn resolve(&self, options: &ExportOptions, story: &str) -> ExportResult<ImportStatements> {
        let discovered = match options.fallback_import.as_deref() {
            Some(_) => scan(story)?,
            None => FreeIdentifiers::new(),
        };
        Ok(resolve_imports(
            &options.map_component,
            options.fallback_import.as_deref(),
            &discovered,
        )?)
    }

    /// Assemble the formatted project for `story`.
    pub async fn build_manifest(
        &self,
        options: &ExportOptions,
        story: &str,
    ) -> ExportResult<FileManifest> {
        let template = options.template_kind()?;
        let imports = self.resolve(options, story)?;
        let ctx = AssembleContext {
            imports: &imports,
            provider: options.provider.as_deref(),
            dependencies: &options.dependencies,
            story,
            extra_files: &options.files,
        };
        let manifest = assemble(template, &ctx, self.formatter.as_ref()).await?;
        let digest = manifest_digest(&manifest)?;
        info!(
            template = %template,
            files = manifest.len(),
            digest = %digest,
            "manifest assembled"
        );
        Ok(manifest)
    }

    /// Work out the launch for one export request.
    ///
    /// Returns `Ok(None)` when there is no story source yet.
    pub async fn launch(
        &self,
        options: &ExportOptions,
        story: Option<&str>,
    ) -> ExportResult<Option<LaunchAction>> {
        if let Some(sandbox_id) = options.sandbox_id.as_deref() {
            let url = self.endpoints.deep_link(sandbox_id, options.query_params())?;
            debug!(url = %url, "linking existing sandbox");
            return Ok(Some(LaunchAction::Redirect { url: url.into() }));
        }

        let Some(story) = story else {
            debug!("no story source, nothing to export");
            return Ok(None);
        };

        let template = options.template_kind()?;
        let mode = options.launch_mode();
        let token = match mode {
            LaunchMode::Api => Some(options.api_token().ok_or(ConfigError::MissingApiToken)?),
            LaunchMode::Define => None,
        };

        let manifest = self.build_manifest(options, story).await?;
        let active_file = template.active_file();

        let action = match token {
            None => {
                let parameters = encode_parameters(&manifest)?;
                LaunchAction::submit_form(
                    &self.endpoints.define,
                    parameters,
                    attribution_query(active_file),
                )
            }
            Some(token) => {
                let client = SandboxClient::new(&self.endpoints)?;
                let payload = api_payload(options.title(), &manifest, options.privacy);
                let alias = client.create_sandbox(token, &payload).await?;
                let url =
                    self.endpoints
                        .viewer_url(&alias, active_file, options.query_params())?;
                LaunchAction::Redirect { url: url.into() }
            }
        };
        Ok(Some(action))
    }

    /// [`launch`](Self::launch), with failures logged and reported to
    /// `notifier` before being returned.
    pub async fn export(
        &self,
        options: &ExportOptions,
        story: Option<&str>,
        notifier: &dyn Notifier,
    ) -> ExportResult<Option<LaunchAction>> {
        match self.launch(options, story).await {
            Ok(action) => Ok(action),
            Err(err) => {
                error!(error = %err, "story export failed");
                notifier.notify(err.notification());
                Err(err)
            }
        }
    }

    /// Export whatever story source was published last.
    pub async fn export_latest(
        &self,
        options: &ExportOptions,
        source: &StorySource,
        notifier: &dyn Notifier,
    ) -> ExportResult<Option<LaunchAction>> {
        let story = source.latest();
        self.export(options, story.as_deref(), notifier).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::{ExportError, NOTIFICATION_ID};

    #[test]
    fn test_story_source_latest_wins() {
        let source = StorySource::new();
        assert_eq!(source.latest(), None);
        source.publish("<A />");
        source.publish("<B />");
        assert_eq!(source.latest().as_deref(), Some("<B />"));
        assert_eq!(source.subscribe().borrow().as_deref(), Some("<B />"));
    }

    #[test]
    fn test_form_html_escapes_values() {
        let action = LaunchAction::submit_form("https://x.test/define", "a\"b".into(), "file=/a&b".into());
        let html = action.form_html().unwrap();
        assert!(html.contains("value=\"a&quot;b\""));
        assert!(html.contains("value=\"file=/a&amp;b\""));
        assert!(html.contains("target=\"_blank\""));
        assert!(LaunchAction::Redirect { url: "u".into() }.form_html().is_none());
    }

    #[test]
    fn test_define_url_encodes_fields() {
        let action = LaunchAction::submit_form("https://x.test/define", "abc-_".into(), "file=/src/App.js&utm-source=storybook-addon".into());
        assert_eq!(
            action.define_url().unwrap(),
            "https://x.test/define?parameters=abc-_&query=file%3D%2Fsrc%2FApp.js%26utm-source%3Dstorybook-addon"
        );
    }

    #[test]
    fn test_action_serializes_tagged() {
        let value = serde_json::to_value(LaunchAction::Redirect { url: "u".into() }).unwrap();
        assert_eq!(value, serde_json::json!({"type": "redirect", "url": "u"}));
    }

    #[tokio::test]
    async fn test_absent_story_is_a_no_op() {
        let pipeline = ExportPipeline::new(Endpoints::default());
        let action = pipeline.launch(&ExportOptions::default(), None).await.unwrap();
        assert!(action.is_none());
    }

    #[tokio::test]
    async fn test_sandbox_id_skips_synthesis() {
        let options = ExportOptions {
            sandbox_id: Some("abc".into()),
            template: Some("not-a-template".into()),
            ..ExportOptions::default()
        };
        let pipeline = ExportPipeline::new(Endpoints::default());
        let action = pipeline.launch(&options, None).await.unwrap().unwrap();
        assert_eq!(action.url(), Some("https://codesandbox.io/p/sandbox/abc"));
    }

    #[tokio::test]
    async fn test_define_launch() {
        let options = ExportOptions::from_json(r#"{"mapComponent": {"@pkg/ui": ["Button"]}}"#).unwrap();
        let pipeline = ExportPipeline::new(Endpoints::default());
        let action = pipeline
            .launch(&options, Some("<Button>Hi</Button>"))
            .await
            .unwrap()
            .unwrap();
        match action {
            LaunchAction::SubmitForm {
                action,
                method,
                parameters,
                query,
                ..
            } => {
                assert_eq!(action, "https://codesandbox.io/api/v1/sandboxes/define");
                assert_eq!(method, "POST");
                assert_eq!(query, "file=/src/App.js&utm-source=storybook-addon");
                let manifest = crate::codec::decode_parameters(&parameters).unwrap();
                assert!(manifest
                    .get("src/App.js")
                    .unwrap()
                    .code
                    .contains("import { Button } from '@pkg/ui';"));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_notifies() {
        let seen = Mutex::new(Vec::new());
        let notifier = |n: Notification| seen.lock().unwrap().push(n);
        let options = ExportOptions {
            template: Some("vue".into()),
            ..ExportOptions::default()
        };
        let pipeline = ExportPipeline::new(Endpoints::default());
        let err = pipeline
            .export(&options, Some("<Button />"), &notifier)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Configuration(ConfigError::UnsupportedTemplate(_))
        ));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, NOTIFICATION_ID);
    }

    #[tokio::test]
    async fn test_malformed_story_with_fallback_is_scan_error() {
        let options = ExportOptions {
            fallback_import: Some("@pkg/ui".into()),
            ..ExportOptions::default()
        };
        let pipeline = ExportPipeline::new(Endpoints::default());
        let err = pipeline.launch(&options, Some("<Button>")).await.unwrap_err();
        assert!(matches!(err, ExportError::Scan(_)));
    }
}
