//! JSX Front End - tree-sitter Parsing and Scope Analysis
//!
//! Sources are parsed with the tree-sitter TSX and TypeScript grammars.
//! A tree is only handed out once it is free of error and missing nodes and
//! every closing tag matches its opening tag.

pub mod scope;

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

pub use scope::{ScopeArena, ScopeId, ScopeKind};

/// Syntax errors raised while parsing a source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("cannot load the {grammar} grammar: {reason}")]
    Grammar { grammar: &'static str, reason: String },

    #[error("parser produced no tree")]
    Aborted,

    #[error("unexpected `{found}` on line {line}")]
    Unexpected { found: String, line: usize },

    #[error("missing `{what}` on line {line}")]
    Missing { what: String, line: usize },

    #[error("closing tag </{found}> on line {line} does not match <{expected}>")]
    MismatchedTag {
        expected: String,
        found: String,
        line: usize,
    },
}

impl ParseError {
    /// Line the error points at (1-based). Zero when no line applies.
    pub fn line(&self) -> usize {
        match self {
            Self::Grammar { .. } | Self::Aborted => 0,
            Self::Unexpected { line, .. }
            | Self::Missing { line, .. }
            | Self::MismatchedTag { line, .. } => *line,
        }
    }

    fn clamp_line(self, max: usize) -> Self {
        match self {
            Self::Unexpected { found, line } => Self::Unexpected {
                found,
                line: line.min(max),
            },
            Self::Missing { what, line } => Self::Missing {
                what,
                line: line.min(max),
            },
            Self::MismatchedTag {
                expected,
                found,
                line,
            } => Self::MismatchedTag {
                expected,
                found,
                line: line.min(max),
            },
            other => other,
        }
    }
}

/// Source dialect, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// JavaScript or TypeScript with JSX.
    Jsx,
    /// TypeScript without JSX: `<` is always an operator or type bracket.
    TypeScript,
}

impl Dialect {
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        match name.rsplit_once('.')?.1 {
            "js" | "jsx" | "mjs" | "cjs" | "tsx" => Some(Self::Jsx),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            _ => None,
        }
    }

    fn grammar(self) -> (&'static str, tree_sitter::Language) {
        match self {
            Self::Jsx => ("tsx", tree_sitter_typescript::LANGUAGE_TSX.into()),
            Self::TypeScript => (
                "typescript",
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            ),
        }
    }
}

/// Parse a whole source file and reject it unless it is well formed.
pub fn parse_source(source: &str, dialect: Dialect) -> Result<Tree, ParseError> {
    let (grammar, language) = dialect.grammar();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| ParseError::Grammar {
            grammar,
            reason: e.to_string(),
        })?;
    let tree = parser.parse(source, None).ok_or(ParseError::Aborted)?;
    check(tree.root_node(), source)?;
    Ok(tree)
}

/// Parse a markup fragment as the children of a JSX fragment.
///
/// The wrapper opens on the fragment's first line, so line numbers in the
/// tree and in errors are the fragment's own.
pub fn parse_fragment(fragment: &str) -> Result<(Tree, String), ParseError> {
    let wrapped = format!("<>{fragment}\n</>");
    let lines = fragment.lines().count().max(1);
    let tree = parse_source(&wrapped, Dialect::Jsx).map_err(|e| e.clamp_line(lines))?;
    Ok((tree, wrapped))
}

/// Source text covered by `node`.
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// 1-based line on which `node` starts.
pub fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

fn check(root: Node<'_>, source: &str) -> Result<(), ParseError> {
    if root.has_error() {
        return Err(first_error(root, source).unwrap_or(ParseError::Unexpected {
            found: String::new(),
            line: line_of(root),
        }));
    }
    check_tags(root, source)
}

fn first_error(node: Node<'_>, source: &str) -> Option<ParseError> {
    if node.is_missing() {
        return Some(ParseError::Missing {
            what: node.kind().to_string(),
            line: line_of(node),
        });
    }
    if node.is_error() {
        let found = node_text(node, source)
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        return Some(ParseError::Unexpected {
            found,
            line: line_of(node),
        });
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(|child| first_error(child, source))
}

/// The grammar accepts any closing tag, so names are compared here.
fn check_tags(node: Node<'_>, source: &str) -> Result<(), ParseError> {
    if node.kind() == "jsx_element" {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        let open = children.iter().find(|c| c.kind() == "jsx_opening_element");
        let close = children.iter().rev().find(|c| c.kind() == "jsx_closing_element");
        if let (Some(open), Some(close)) = (open, close) {
            let expected = tag_name(*open, source);
            let found = tag_name(*close, source);
            if expected != found {
                return Err(ParseError::MismatchedTag {
                    expected: expected.to_string(),
                    found: found.to_string(),
                    line: line_of(*close),
                });
            }
        }
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .try_for_each(|child| check_tags(child, source))
}

/// Tag name of an opening, closing or self-closing element; empty for `<>`.
pub fn tag_name<'s>(element: Node<'_>, source: &'s str) -> &'s str {
    element
        .child_by_field_name("name")
        .map(|name| node_text(name, source))
        .unwrap_or("")
}
