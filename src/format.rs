//! Deterministic Source Formatter
//!
//! Output depends only on the syntax tree of the input, never on its
//! original indentation, so formatting is stable and idempotent:
//! - each line is indented one level per distinct line that opened a
//!   still-open bracket or element
//! - a line starting with closers (`)`, `}`, `</tag>`, `/>`, the `>` of a
//!   multiline opening tag) sits at the level of the line that opened the
//!   outermost of them
//! - lines starting inside a string, template literal or comment are kept
//!   byte for byte
//! - trailing whitespace is removed, blank runs collapse to one line and the
//!   file ends with a single newline
//!
//! The input must parse: syntax errors and mismatched closing tags are
//! errors, not silently reshaped output.

use async_trait::async_trait;
use tree_sitter::Node;

use crate::error::FormatError;
use crate::jsx::{line_of, parse_source, ParseError};

pub use crate::jsx::Dialect;

/// Files with these extensions are data or documents and pass through.
pub const IGNORED_EXTENSIONS: &[&str] = &["json", "html", "md"];

/// Whether the assembler sends `path` through the formatter.
pub fn is_formatted(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    !name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| IGNORED_EXTENSIONS.contains(&ext))
}

/// A source formatter. Implementations must be pure per input so files can
/// be formatted concurrently.
#[async_trait]
pub trait Formatter: Send + Sync {
    async fn format(&self, path: &str, source: &str) -> Result<String, FormatError>;
}

#[derive(Debug, Clone)]
pub struct SourceFormatter {
    indent_width: usize,
}

impl Default for SourceFormatter {
    fn default() -> Self {
        Self { indent_width: 2 }
    }
}

#[async_trait]
impl Formatter for SourceFormatter {
    async fn format(&self, path: &str, source: &str) -> Result<String, FormatError> {
        let dialect = Dialect::from_path(path).ok_or_else(|| FormatError::UnsupportedPath {
            path: path.to_string(),
        })?;
        tokio::task::yield_now().await;
        self.format_source(source, dialect)
            .map_err(|source| FormatError::Syntax {
                path: path.to_string(),
                source,
            })
    }
}

impl SourceFormatter {
    pub fn new(indent_width: usize) -> Self {
        Self { indent_width }
    }

    pub fn format_source(&self, source: &str, dialect: Dialect) -> Result<String, ParseError> {
        let source = source.replace("\r\n", "\n");
        let tree = parse_source(&source, dialect)?;
        let outline = Outline::of(tree.root_node());

        let mut lines: Vec<(String, bool)> = Vec::new();
        let mut nesting = Nesting::default();
        let mut next = 0;
        let mut offset = 0;

        for line in source.split('\n') {
            let line_end = offset + line.len();
            while let Some(mark) = outline.marks.get(next).filter(|m| m.start < offset) {
                nesting.apply(mark);
                next += 1;
            }

            let starts_in_literal = offset > 0 && covers(&outline.literals, offset - 1);
            if starts_in_literal {
                lines.push((line.to_string(), true));
                offset = line_end + 1;
                continue;
            }

            let keep_trailing = line_end < source.len() && covers(&outline.literals, line_end);
            let content = if keep_trailing {
                line.trim_start()
            } else {
                line.trim()
            };
            if content.is_empty() {
                lines.push((String::new(), false));
                offset = line_end + 1;
                continue;
            }

            let first = line_end - line.trim_start().len();
            let depth = if covers(&outline.texts, first) {
                nesting.depth(0)
            } else {
                nesting.depth(leading_closers(&outline.marks[next..], line, offset, first))
            };

            let indent = " ".repeat(depth * self.indent_width);
            lines.push((format!("{indent}{content}"), false));
            offset = line_end + 1;
        }

        Ok(join_lines(lines))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkKind {
    /// `(`, `[`, `{`, or the start of an element.
    Open,
    /// `)`, `]`, `}`, a closing tag, or the `/>` of a self-closing element.
    Close,
    /// The `>` ending an opening tag. Dedents its line, closes nothing.
    TagEnd,
}

/// A structural position in the source, in byte offsets.
#[derive(Debug, Clone, Copy)]
struct Mark {
    kind: MarkKind,
    start: usize,
    end: usize,
    line: usize,
}

/// Byte range of a node whose text is never reindented.
type Range = (usize, usize);

/// Everything the reindenter needs from a syntax tree, in source order.
#[derive(Debug, Default)]
struct Outline {
    marks: Vec<Mark>,
    literals: Vec<Range>,
    texts: Vec<Range>,
}

impl Outline {
    fn of(root: Node<'_>) -> Self {
        let mut outline = Self::default();
        outline.collect(root);
        outline.marks.sort_by_key(|m| m.start);
        outline
    }

    fn collect(&mut self, node: Node<'_>) {
        match node.kind() {
            "string" | "template_string" | "comment" | "regex" => {
                self.literals.push((node.start_byte(), node.end_byte()));
                return;
            }
            "jsx_text" => {
                self.texts.push((node.start_byte(), node.end_byte()));
                return;
            }
            "(" | "[" | "{" if !node.is_named() => self.mark(MarkKind::Open, node),
            ")" | "]" | "}" if !node.is_named() => self.mark(MarkKind::Close, node),
            "jsx_opening_element" => {
                self.mark(MarkKind::Open, node);
                self.marks.push(Mark {
                    kind: MarkKind::TagEnd,
                    start: node.end_byte().saturating_sub(1),
                    end: node.end_byte(),
                    line: node.end_position().row + 1,
                });
            }
            "jsx_self_closing_element" => {
                self.mark(MarkKind::Open, node);
                let slash = last_child(node, "/")
                    .map_or(node.end_byte().saturating_sub(2), |n| n.start_byte());
                self.marks.push(Mark {
                    kind: MarkKind::Close,
                    start: slash,
                    end: node.end_byte(),
                    line: node.end_position().row + 1,
                });
            }
            "jsx_closing_element" => {
                self.mark(MarkKind::Close, node);
                return;
            }
            _ => {}
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children {
            self.collect(child);
        }
    }

    fn mark(&mut self, kind: MarkKind, node: Node<'_>) {
        self.marks.push(Mark {
            kind,
            start: node.start_byte(),
            end: node.end_byte(),
            line: line_of(node),
        });
    }
}

fn last_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    children.into_iter().rev().find(|c| c.kind() == kind)
}

/// Closers at the very start of a line, each separated only by whitespace.
fn leading_closers(marks: &[Mark], line: &str, offset: usize, first: usize) -> usize {
    let mut cursor = first;
    let mut count = 0;
    for mark in marks.iter().skip_while(|m| m.start < first) {
        if mark.start != cursor || mark.kind == MarkKind::Open {
            break;
        }
        count += 1;
        let rest = line.get(mark.end.saturating_sub(offset)..).unwrap_or("");
        cursor = mark.end + (rest.len() - rest.trim_start().len());
    }
    count
}

/// Open brackets and elements, each tagged with the line that opened it.
#[derive(Default)]
struct Nesting {
    open: Vec<usize>,
}

impl Nesting {
    fn apply(&mut self, mark: &Mark) {
        match mark.kind {
            MarkKind::Open => self.open.push(mark.line),
            MarkKind::Close => {
                self.open.pop();
            }
            MarkKind::TagEnd => {}
        }
    }

    /// Indent level of a line starting with `closing` closers. Several units
    /// opened on one line count as one level, and a closing line sits at
    /// the level of the line that opened the outermost unit it closes.
    fn depth(&self, closing: usize) -> usize {
        let open = match closing {
            0 => &self.open[..],
            n => {
                let outermost = self.open.len().saturating_sub(n);
                let opened_on = self.open.get(outermost).copied().unwrap_or(0);
                let below = self.open.partition_point(|line| *line < opened_on);
                &self.open[..below]
            }
        };
        let mut levels = 0;
        let mut previous = None;
        for line in open {
            if previous != Some(line) {
                levels += 1;
                previous = Some(line);
            }
        }
        levels
    }
}

/// Whether byte `pos` falls inside one of the sorted, disjoint `ranges`.
fn covers(ranges: &[Range], pos: usize) -> bool {
    let idx = ranges.partition_point(|(start, _)| *start <= pos);
    idx.checked_sub(1)
        .and_then(|i| ranges.get(i))
        .is_some_and(|(_, end)| pos < *end)
}

fn join_lines(lines: Vec<(String, bool)>) -> String {
    let mut out = String::new();
    let mut pending_blank = false;
    for (text, verbatim) in lines {
        if text.is_empty() && !verbatim {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }
        out.push_str(&text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(src: &str) -> String {
        SourceFormatter::default()
            .format_source(src, Dialect::Jsx)
            .unwrap()
    }

    #[test]
    fn test_reindents_component() {
        let src = "export default function App() {\nreturn (\n<>\n<Button>Hi</Button>\n</>\n);\n}";
        assert_eq!(
            fmt(src),
            "export default function App() {\n  return (\n    <>\n      <Button>Hi</Button>\n    </>\n  );\n}\n"
        );
    }

    #[test]
    fn test_brackets_opened_on_one_line_count_once() {
        let src = "useEffect(() => {\n        run();\n    }, []);";
        assert_eq!(fmt(src), "useEffect(() => {\n  run();\n}, []);\n");
    }

    #[test]
    fn test_multiline_tag_attributes() {
        let src = "<Button\nkind=\"primary\"\nonClick={go}\n>\nGo\n</Button>";
        assert_eq!(
            fmt(src),
            "<Button\n  kind=\"primary\"\n  onClick={go}\n>\n  Go\n</Button>\n"
        );
    }

    #[test]
    fn test_text_before_closing_tag() {
        assert_eq!(fmt("<p>\nHello</p>"), "<p>\n  Hello</p>\n");
    }

    #[test]
    fn test_template_literal_kept_verbatim() {
        let src = "const a = `line one\n   keep   \ndone`;";
        assert_eq!(fmt(src), format!("{src}\n"));
    }

    #[test]
    fn test_blank_lines_collapse() {
        assert_eq!(fmt("\n\nimport a from 'a';\n\n\n\nrun(a);   \n\n"), "import a from 'a';\n\nrun(a);\n");
    }

    #[test]
    fn test_idempotent() {
        let src = "import { Button } from '@pkg/ui';\nexport default function App() {\n  return (\n    <>\n      <Button onClick={() => {\n  alert('hi');\n}}>Hi</Button>\n    </>\n  );\n}";
        let once = fmt(src);
        assert_eq!(fmt(&once), once);
    }

    #[test]
    fn test_typescript_generics() {
        let out = SourceFormatter::default()
            .format_source("const xs: Array<number> = [\n1,\n];", Dialect::TypeScript)
            .unwrap();
        assert_eq!(out, "const xs: Array<number> = [\n  1,\n];\n");
    }

    #[test]
    fn test_unclosed_element_fails() {
        assert!(SourceFormatter::default()
            .format_source("function App() {\n  return <Button>;\n}", Dialect::Jsx)
            .is_err());
    }

    #[test]
    fn test_mismatched_tag_fails_with_its_line() {
        let err = SourceFormatter::default()
            .format_source("const a = (\n<Card>\n</Button>\n);", Dialect::Jsx)
            .unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_self_closing_story_in_component() {
        let src = "export default function App() {\nreturn (\n<>\n<Button label=\"Don't\" onClick={go} />\n</>\n);\n}";
        assert_eq!(
            fmt(src),
            "export default function App() {\n  return (\n    <>\n      <Button label=\"Don't\" onClick={go} />\n    </>\n  );\n}\n"
        );
    }

    #[test]
    fn test_multi_root_story_in_component() {
        let src = "export default function App() {\nreturn (\n<>\n<Button/><Card/>\n</>\n);\n}";
        assert_eq!(
            fmt(src),
            "export default function App() {\n  return (\n    <>\n      <Button/><Card/>\n    </>\n  );\n}\n"
        );
    }

    #[test]
    fn test_self_closing_slash_on_own_line() {
        let src = "<Button\nlabel=\"Go\"\n/>";
        assert_eq!(fmt(src), "<Button\n  label=\"Go\"\n/>\n");
    }

    #[test]
    fn test_closers_sharing_a_line_dedent_once() {
        let src = "<ul>\n{rows.map((row) => {\nreturn <Row key={row} />;\n})}\n</ul>";
        assert_eq!(
            fmt(src),
            "<ul>\n  {rows.map((row) => {\n    return <Row key={row} />;\n  })}\n</ul>\n"
        );
    }

    #[test]
    fn test_ignored_extensions() {
        assert!(!is_formatted("package.json"));
        assert!(!is_formatted("public/index.html"));
        assert!(!is_formatted("README.md"));
        assert!(is_formatted("src/App.js"));
        assert!(is_formatted("app.component.ts"));
    }

    #[tokio::test]
    async fn test_format_error_names_path() {
        let err = SourceFormatter::default()
            .format("src/App.js", "<Button>")
            .await
            .unwrap_err();
        assert_eq!(err.path(), "src/App.js");
    }

    #[tokio::test]
    async fn test_unknown_extension_rejected() {
        let err = SourceFormatter::default()
            .format("styles.css", "a {}")
            .await
            .unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedPath { .. }));
    }
}
