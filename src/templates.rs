//! Template System - fixed project recipes per target framework
//!
//! A recipe is static boilerplate plus one synthesized entry component. The
//! assembled manifest holds exactly the recipe's files, plus whatever extra
//! files the caller layers on top.

use std::fmt;
use std::str::FromStr;

use futures::future::try_join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ConfigError, ExportError, FormatError};
use crate::format::{is_formatted, Formatter};
use crate::imports::ImportStatements;
use crate::manifest::{DependencyManifest, FileManifest, SandboxFile};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    #[default]
    React,
    Angular,
}

const REACT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Document</title>
  </head>
  <body>
    <div id="root"></div>
  </body>
</html>"#;

const REACT_INDEX: &str = r#"import React, { StrictMode } from "react";
import { createRoot } from "react-dom/client";
import GenericProvider from "./provider";

import App from "./App";

const root = createRoot(document.getElementById("root"));
root.render(
<StrictMode>
<GenericProvider>
<App />
</GenericProvider>
</StrictMode>
);
"#;

const REACT_PROVIDER: &str = r#"export default function GenericProvider({ children }) {
  return children;
}
"#;

const ANGULAR_MAIN: &str = r#"import "zone.js";
import "@angular/compiler";
import { bootstrapApplication } from "@angular/platform-browser";
import providers from "./provider";

import AppComponent from "./app.component";

bootstrapApplication(AppComponent, { providers }).catch((err) =>
console.error(err),
);
"#;

const ANGULAR_PROVIDER: &str = r#"export const providers = [];

export default providers;
"#;

/// Inputs a recipe is populated from.
#[derive(Debug, Clone, Copy)]
pub struct AssembleContext<'a> {
    pub imports: &'a ImportStatements,
    /// Provider source; `None` selects the template's passthrough provider.
    pub provider: Option<&'a str>,
    /// Caller dependencies, laid over the template defaults.
    pub dependencies: &'a DependencyManifest,
    pub story: &'a str,
    pub extra_files: &'a FileManifest,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 2] = [TemplateKind::React, TemplateKind::Angular];

    pub fn name(self) -> &'static str {
        match self {
            Self::React => "react",
            Self::Angular => "angular",
        }
    }

    /// File opened first in the viewer.
    pub fn active_file(self) -> &'static str {
        match self {
            Self::React => "src/App.js",
            Self::Angular => "app.component.ts",
        }
    }

    /// Recipe paths in emission order.
    pub fn paths(self) -> &'static [&'static str] {
        match self {
            Self::React => &[
                "public/index.html",
                "package.json",
                "src/provider.js",
                "src/index.js",
                "src/App.js",
            ],
            Self::Angular => &["package.json", "provider.ts", "main.ts", "app.component.ts"],
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            Self::React => "/src/index.js",
            Self::Angular => "/main.ts",
        }
    }

    pub fn default_provider(self) -> &'static str {
        match self {
            Self::React => REACT_PROVIDER,
            Self::Angular => ANGULAR_PROVIDER,
        }
    }

    pub fn default_dependencies(self) -> DependencyManifest {
        let pairs: &[(&str, &str)] = match self {
            Self::React => &[
                ("react", "^18.0.0"),
                ("react-dom", "^18.0.0"),
                ("react-scripts", "^5.0.0"),
            ],
            Self::Angular => &[
                ("@angular/common", "^17.0.0"),
                ("@angular/compiler", "^17.0.0"),
                ("@angular/core", "^17.0.0"),
                ("@angular/platform-browser", "^17.0.0"),
                ("rxjs", "^7.8.0"),
                ("tslib", "^2.6.0"),
                ("zone.js", "^0.14.0"),
            ],
        };
        pairs
            .iter()
            .map(|(name, range)| (name.to_string(), range.to_string()))
            .collect()
    }

    /// Populate the recipe. Pure and unformatted; extra files are not
    /// included.
    pub fn files(self, ctx: &AssembleContext<'_>) -> Result<FileManifest, serde_json::Error> {
        let package = self.package_json(ctx.dependencies)?;
        let provider = ctx.provider.unwrap_or(self.default_provider());
        let component = SandboxFile::new(self.component_source(ctx)).active();

        let files: Vec<(&str, SandboxFile)> = match self {
            Self::React => vec![
                ("public/index.html", SandboxFile::new(REACT_HTML)),
                ("package.json", SandboxFile::new(package)),
                ("src/provider.js", SandboxFile::new(provider)),
                ("src/index.js", SandboxFile::new(REACT_INDEX)),
                ("src/App.js", component),
            ],
            Self::Angular => vec![
                ("package.json", SandboxFile::new(package)),
                ("provider.ts", SandboxFile::new(provider)),
                ("main.ts", SandboxFile::new(ANGULAR_MAIN)),
                ("app.component.ts", component),
            ],
        };
        Ok(files
            .into_iter()
            .map(|(path, file)| (path.to_string(), file))
            .collect())
    }

    fn package_json(self, overrides: &DependencyManifest) -> Result<String, serde_json::Error> {
        let mut dependencies = self.default_dependencies();
        for (name, range) in overrides {
            dependencies.insert(name.clone(), range.clone());
        }
        serde_json::to_string_pretty(&json!({
            "dependencies": dependencies,
            "main": self.entry_point(),
        }))
    }

    fn component_source(self, ctx: &AssembleContext<'_>) -> String {
        let imports = ctx.imports;
        match self {
            Self::React => format!(
                "{imports}\nexport default function App() {{\n  return (\n    <>\n      {story}\n    </>\n  );\n}}\n",
                story = ctx.story,
            ),
            Self::Angular => format!(
                "{imports}import {{ Component }} from \"@angular/core\";\n\n\
                 @Component({{\n  selector: \"app-root\",\n  standalone: true,\n  \
                 imports: [{names}],\n  template: `{template}`,\n}})\n\
                 export default class AppComponent {{}}\n",
                names = imports.bindings().join(", "),
                template = escape_template_literal(ctx.story),
            ),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TemplateKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnsupportedTemplate(s.to_string()))
    }
}

/// Escape text for a JS template literal body.
fn escape_template_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out
}

fn check_dependency_ranges(dependencies: &DependencyManifest) {
    for (name, range) in dependencies {
        if semver::VersionReq::parse(range).is_err() {
            warn!(package = %name, range = %range, "dependency range is not a semver requirement, passing through");
        }
    }
}

/// Build the project for `template`: populate the recipe, format every
/// source file, then layer the caller's extra files on top unformatted.
///
/// Files are formatted concurrently. The first failure aborts the whole
/// assembly and nothing partial is returned.
pub async fn assemble(
    template: TemplateKind,
    ctx: &AssembleContext<'_>,
    formatter: &dyn Formatter,
) -> Result<FileManifest, ExportError> {
    check_dependency_ranges(ctx.dependencies);
    let recipe = template.files(ctx)?;

    let formatted = try_join_all(recipe.into_iter().map(|(path, file)| async move {
        if !is_formatted(&path) {
            return Ok::<_, FormatError>((path, file));
        }
        let code = formatter.format(&path, &file.code).await?;
        debug!(path = %path, bytes = code.len(), "formatted file");
        Ok((path, SandboxFile { code, ..file }))
    }))
    .await?;

    let mut manifest: FileManifest = formatted.into_iter().collect();
    manifest.merge(ctx.extra_files.clone());
    debug!(template = %template, files = manifest.len(), "assembled manifest");
    Ok(manifest)
}
