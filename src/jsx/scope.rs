//! Scope Arena - Shallow Symbol Table for One Fragment
//!
//! Frames live in a flat arena and point at their parent. Lookup walks
//! outward from a frame until a binding is found or the root is passed.
//! Frames are filled from tree-sitter nodes: parameters, `let`/`const`
//! declarators, function and class declarations, `for` and `catch` heads.
//! `var` declarators land in the nearest function or the fragment root.

use std::collections::HashSet;

use tree_sitter::Node;

use super::node_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The whole fragment.
    Fragment,
    Function,
    Block,
}

impl ScopeKind {
    /// The scope a syntax node opens, if any.
    pub fn of(node: Node<'_>) -> Option<Self> {
        match node.kind() {
            "program" => Some(Self::Fragment),
            "function_declaration"
            | "function_expression"
            | "function"
            | "generator_function"
            | "generator_function_declaration"
            | "arrow_function"
            | "method_definition" => Some(Self::Function),
            "statement_block" | "for_statement" | "for_in_statement" | "catch_clause" => {
                Some(Self::Block)
            }
            _ => None,
        }
    }

    fn hoists_var(self) -> bool {
        !matches!(self, Self::Block)
    }
}

/// Index of a frame inside a [`ScopeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug)]
struct ScopeFrame {
    parent: Option<ScopeId>,
    names: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct ScopeArena {
    frames: Vec<ScopeFrame>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame declaring `names`, nested in `parent`.
    pub fn push<I>(&mut self, parent: Option<ScopeId>, names: I) -> ScopeId
    where
        I: IntoIterator<Item = String>,
    {
        let id = ScopeId(self.frames.len());
        self.frames.push(ScopeFrame {
            parent,
            names: names.into_iter().collect(),
        });
        id
    }

    /// Find the innermost frame, starting at `from`, that declares `name`.
    pub fn resolve(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let frame = self.frames.get(id.0)?;
            if frame.names.contains(name) {
                return Some(id);
            }
            current = frame.parent;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Names bound by the scope `node` opens. Empty when it opens none.
pub fn bindings(node: Node<'_>, source: &str) -> Vec<String> {
    let Some(kind) = ScopeKind::of(node) else {
        return Vec::new();
    };
    let mut names = Vec::new();
    for field in ["parameter", "parameters", "left"] {
        if let Some(head) = node.child_by_field_name(field) {
            pattern_names(head, source, &mut names);
        }
    }
    declarations(node, source, kind.hoists_var(), false, &mut names);

    let mut seen = HashSet::new();
    names.retain(|name| seen.insert(name.clone()));
    names
}

fn declarations(
    node: Node<'_>,
    source: &str,
    hoists_var: bool,
    nested: bool,
    out: &mut Vec<String>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_declaration" | "generator_function_declaration" | "class_declaration" => {
                if !nested {
                    if let Some(name) = child.child_by_field_name("name") {
                        out.push(node_text(name, source).to_string());
                    }
                }
                continue;
            }
            "variable_declarator" => {
                let is_var = node.kind() == "variable_declaration";
                let collect = if is_var { hoists_var } else { !nested };
                if let Some(name) = child.child_by_field_name("name").filter(|_| collect) {
                    pattern_names(name, source, out);
                }
                continue;
            }
            _ => {}
        }
        match ScopeKind::of(child) {
            Some(ScopeKind::Block) if hoists_var => {
                declarations(child, source, hoists_var, true, out)
            }
            Some(_) => {}
            None => declarations(child, source, hoists_var, nested, out),
        }
    }
}

/// Identifiers bound by a declaration target or parameter list.
fn pattern_names(node: Node<'_>, source: &str, out: &mut Vec<String>) {
    let field = match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            out.push(node_text(node, source).to_string());
            return;
        }
        "pair_pattern" => "value",
        "assignment_pattern" | "object_assignment_pattern" => "left",
        "required_parameter" | "optional_parameter" => "pattern",
        "rest_pattern" | "object_pattern" | "array_pattern" | "formal_parameters" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                pattern_names(child, source, out);
            }
            return;
        }
        _ => return,
    };
    if let Some(inner) = node.child_by_field_name(field) {
        pattern_names(inner, source, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsx::{parse_source, Dialect};

    /// Bindings of the first node of `kind` in `source`.
    fn bound(source: &str, kind: &str) -> Vec<String> {
        let tree = parse_source(source, Dialect::Jsx).unwrap();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            if node.kind() == kind {
                return bindings(node, source);
            }
            let mut cursor = node.walk();
            let mut children: Vec<_> = node.named_children(&mut cursor).collect();
            children.reverse();
            stack.extend(children);
        }
        panic!("no {kind} node in {source:?}");
    }

    #[test]
    fn test_lookup_walks_outward() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, ["Outer".to_string()]);
        let func = arena.push(Some(root), ["Item".to_string()]);
        let block = arena.push(Some(func), Vec::new());

        assert_eq!(arena.resolve(block, "Item"), Some(func));
        assert_eq!(arena.resolve(block, "Outer"), Some(root));
        assert_eq!(arena.resolve(root, "Item"), None);
    }

    #[test]
    fn test_inner_binding_shadows_outer() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, ["Row".to_string()]);
        let inner = arena.push(Some(root), ["Row".to_string()]);
        assert_eq!(arena.resolve(inner, "Row"), Some(inner));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_arrow_parameter_patterns() {
        assert_eq!(
            bound("f(({ a, b: B, c = 1 }, [D, ...E]) => 0);", "arrow_function"),
            vec!["a", "B", "c", "D", "E"]
        );
        assert_eq!(bound("f(Item => 0);", "arrow_function"), vec!["Item"]);
    }

    #[test]
    fn test_block_declarations() {
        let names = bound(
            "{ const Label = 1; let { Row } = x; function Cell() {} class Grid {} }",
            "statement_block",
        );
        assert_eq!(names, vec!["Label", "Row", "Cell", "Grid"]);
    }

    #[test]
    fn test_var_hoists_to_function() {
        let source = "function f(A) { if (x) { var Hoisted = 1; } }";
        assert_eq!(bound(source, "function_declaration"), vec!["A", "Hoisted"]);
    }

    #[test]
    fn test_for_and_catch_heads() {
        assert_eq!(bound("for (const Row of rows) {}", "for_in_statement"), vec!["Row"]);
        assert_eq!(bound("try {} catch (Err) {}", "catch_clause"), vec!["Err"]);
    }
}
