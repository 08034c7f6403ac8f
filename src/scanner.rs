//! Identifier Scanner
//!
//! Finds the capitalized tag names a fragment uses without declaring them.
//! Those are the components the generated project has to import.

use indexmap::IndexSet;
use tracing::debug;
use tree_sitter::Node;

use crate::jsx::scope::bindings;
use crate::jsx::{node_text, parse_fragment, ParseError, ScopeArena, ScopeId, ScopeKind};

/// Free identifiers in first-seen order.
pub type FreeIdentifiers = IndexSet<String>;

/// Parse `fragment` and return its free component names.
pub fn scan(fragment: &str) -> Result<FreeIdentifiers, ParseError> {
    let (tree, source) = parse_fragment(fragment)?;
    let mut walker = Walker {
        source: &source,
        arena: ScopeArena::new(),
        found: FreeIdentifiers::new(),
    };
    walker.visit(tree.root_node(), None);
    debug!(
        count = walker.found.len(),
        scopes = walker.arena.len(),
        "scanned story fragment"
    );
    Ok(walker.found)
}

struct Walker<'s> {
    source: &'s str,
    arena: ScopeArena,
    found: FreeIdentifiers,
}

impl Walker<'_> {
    /// Depth-first, opening tags before attributes before children.
    fn visit(&mut self, node: Node<'_>, scope: Option<ScopeId>) {
        let scope = match ScopeKind::of(node) {
            Some(_) => Some(self.arena.push(scope, bindings(node, self.source))),
            None => scope,
        };
        if matches!(node.kind(), "jsx_opening_element" | "jsx_self_closing_element") {
            self.visit_tag(node, scope);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, scope);
        }
    }

    fn visit_tag(&mut self, element: Node<'_>, scope: Option<ScopeId>) {
        // Member (`Menu.Item`) and namespaced (`svg:rect`) names are never imports.
        let Some(name) = element
            .child_by_field_name("name")
            .filter(|name| name.kind() == "identifier")
            .map(|name| node_text(name, self.source))
        else {
            return;
        };
        // Lowercase tags are intrinsic elements, dashed ones custom elements.
        let component =
            name.chars().next().is_some_and(char::is_uppercase) && !name.contains('-');
        let declared = scope.is_some_and(|id| self.arena.resolve(id, name).is_some());
        if component && !declared {
            self.found.insert(name.to_string());
        }
    }
}
