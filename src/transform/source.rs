// src/transform/source.rs
//! Parsing and source-level queries shared by the rewriters

use crate::transform::TransformError;
use serde::{Deserialize, Serialize};
use tree_sitter::{Language, Node, Parser, Tree};

/// Module system a source file is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDialect {
    CommonJs,
    Module,
    /// Decide from the presence of `import` / `export` statements
    Unambiguous,
}

impl SourceDialect {
    /// Map a host format or file-extension tag to a dialect
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "commonjs" | "cjs" | "script" => SourceDialect::CommonJs,
            "module" | "esm" | "mjs" => SourceDialect::Module,
            _ => SourceDialect::Unambiguous,
        }
    }

    pub(crate) fn is_module(&self, root: Node<'_>) -> bool {
        match self {
            SourceDialect::CommonJs => false,
            SourceDialect::Module => true,
            SourceDialect::Unambiguous => has_module_syntax(root),
        }
    }
}

pub(crate) fn parse(source: &str) -> Result<Tree, TransformError> {
    let language: Language = tree_sitter_javascript::LANGUAGE.into();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| TransformError::Parser(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| TransformError::Parser("parser produced no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(TransformError::Parse {
            diagnostic: describe_error(root, source),
        });
    }
    Ok(tree)
}

/// `line:column message` for the first syntax error, 1-based
fn describe_error(root: Node<'_>, source: &str) -> String {
    let Some(node) = first_error(root) else {
        return "1:1 syntax error".to_string();
    };

    let position = node.start_position();
    let location = format!("{}:{}", position.row + 1, position.column + 1);
    if node.is_missing() {
        return format!("{} missing `{}`", location, node.kind());
    }

    let snippet: String = text(node, source).chars().take(32).collect();
    if snippet.trim().is_empty() {
        format!("{} syntax error", location)
    } else {
        format!("{} unexpected `{}`", location, snippet.trim())
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(first_error)
}

pub(crate) fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}

fn has_module_syntax(root: Node<'_>) -> bool {
    let mut cursor = root.walk();
    let found = root
        .named_children(&mut cursor)
        .any(|child| matches!(child.kind(), "import_statement" | "export_statement"));
    found
}

/// `"use strict";` and friends
pub(crate) fn is_directive(statement: Node<'_>) -> bool {
    if statement.kind() != "expression_statement" {
        return false;
    }
    let mut cursor = statement.walk();
    let mut named = statement
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment");
    matches!((named.next(), named.next()), (Some(first), None) if first.kind() == "string")
}

/// Insertion point right after `statement`, with the separator it needs
pub(crate) fn after_statement(statement: Node<'_>, source: &str) -> (usize, &'static str) {
    let terminated = text(statement, source).trim_end().ends_with(';');
    (statement.end_byte(), if terminated { " " } else { "; " })
}

/// Where file-level code may be inserted: after a hashbang and any directives
pub(crate) fn prologue_insert_point(root: Node<'_>, source: &str) -> (usize, &'static str) {
    let mut point = (0, "");
    let mut cursor = root.walk();

    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "hash_bang_line" => {
                let end = child.end_byte();
                point = match source[end..].find('\n') {
                    Some(offset) => (end + offset + 1, ""),
                    None => (source.len(), "\n"),
                };
            }
            "comment" => continue,
            _ if is_directive(child) => point = after_statement(child, source),
            _ => break,
        }
    }

    point
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_diagnostic() {
        let err = parse("function broken( {").unwrap_err();
        match err {
            TransformError::Parse { diagnostic } => assert!(diagnostic.starts_with("1:")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_module_detection() {
        let esm = parse("import fs from 'fs';\nexport const a = 1;").unwrap();
        assert!(SourceDialect::Unambiguous.is_module(esm.root_node()));

        let cjs = parse("const fs = require('fs');\nmodule.exports = fs;").unwrap();
        assert!(!SourceDialect::Unambiguous.is_module(cjs.root_node()));
        assert!(SourceDialect::Module.is_module(cjs.root_node()));
    }

    #[test]
    fn test_prologue_after_directives() {
        let source = "#!/usr/bin/env node\n'use strict';\nmain();";
        let tree = parse(source).unwrap();
        let (at, prefix) = prologue_insert_point(tree.root_node(), source);
        assert_eq!(&source[..at], "#!/usr/bin/env node\n'use strict';");
        assert_eq!(prefix, " ");
    }

    #[test]
    fn test_prologue_unterminated_directive() {
        let source = "\"use strict\"\nmain();";
        let tree = parse(source).unwrap();
        let (at, prefix) = prologue_insert_point(tree.root_node(), source);
        assert_eq!(at, "\"use strict\"".len());
        assert_eq!(prefix, "; ");
    }

    #[test]
    fn test_dialect_tags() {
        assert_eq!(SourceDialect::from_tag("commonjs"), SourceDialect::CommonJs);
        assert_eq!(SourceDialect::from_tag("module"), SourceDialect::Module);
        assert_eq!(SourceDialect::from_tag("json"), SourceDialect::Unambiguous);
    }
}
