// src/transform/application.rs
//! Best-effort rewriting of application code
//!
//! String-producing expressions are routed through runtime hooks so the
//! agent can track tainted values through them:
//!
//! ```text
//! s.trim()          →  __wrapMethodCallResult(s, (__a) => __a.trim())
//! a + b             →  __wrapConcat(a , b)
//! a += b            →  a = __wrapConcat(a, b)
//! 'a'.concat(x, y)  →  __wrapConcat('a', x, y)
//! v.concat(x)       →  __wrapMethodCallResult(v, (__a) => __a.concat(x))
//! ```
//!
//! Calls whose arguments suspend (`await`, `yield`) or whose receiver
//! short-circuits through `?.` are left alone, since moving them into an
//! arrow would change what they do. Failure of any kind yields no
//! transformation.

use crate::transform::dependency::SourceTransformer;
use crate::transform::edits::EditBuffer;
use crate::transform::source::{parse, text, SourceDialect};
use crate::transform::{WRAP_CONCAT_FN, WRAP_METHOD_CALL_RESULT_FN};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};
use tree_sitter::Node;

/// String and array methods whose results are wrapped
pub const METHODS_TO_WRAP: &[&str] = &[
    "concat",
    "replace",
    "replaceAll",
    "slice",
    "substring",
    "substr",
    "trim",
    "trimStart",
    "trimEnd",
    "trimLeft",
    "trimRight",
    "toLowerCase",
    "toUpperCase",
    "toLocaleLowerCase",
    "toLocaleUpperCase",
    "normalize",
    "repeat",
    "padStart",
    "padEnd",
    "split",
    "charAt",
    "at",
    "join",
    "reverse",
];

impl SourceTransformer {
    /// Rewrite application code; `None` when nothing was (or could be) changed
    pub fn transform_best_effort(&self, source: &str, dialect: SourceDialect) -> Option<String> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.rewrite_application(source, dialect))) {
            Ok(result) => result,
            Err(_) => {
                warn!("Application code rewrite panicked, leaving source unchanged");
                None
            }
        }
    }

    fn rewrite_application(&self, source: &str, dialect: SourceDialect) -> Option<String> {
        if source.contains(WRAP_METHOD_CALL_RESULT_FN) || source.contains(WRAP_CONCAT_FN) {
            return None;
        }

        let tree = match parse(source) {
            Ok(tree) => tree,
            Err(err) => {
                debug!("Skipping application rewrite: {}", err);
                return None;
            }
        };
        let root = tree.root_node();

        let mut rewriter = ApplicationRewriter {
            source,
            edits: EditBuffer::new(),
            wraps_methods: false,
            wraps_concat: false,
        };
        rewriter.visit(root, 0);
        if rewriter.edits.is_empty() {
            return None;
        }

        let mut used = Vec::new();
        if rewriter.wraps_methods {
            used.push(WRAP_METHOD_CALL_RESULT_FN);
        }
        if rewriter.wraps_concat {
            used.push(WRAP_CONCAT_FN);
        }

        let mut edits = rewriter.edits;
        self.insert_import(&mut edits, root, source, &used, dialect.is_module(root));
        Some(edits.apply(source))
    }
}

struct ApplicationRewriter<'a> {
    source: &'a str,
    edits: EditBuffer,
    wraps_methods: bool,
    wraps_concat: bool,
}

impl<'a> ApplicationRewriter<'a> {
    fn visit(&mut self, node: Node<'_>, depth: usize) {
        match node.kind() {
            "call_expression" => self.rewrite_call(node, depth),
            "binary_expression" => self.rewrite_plus(node, depth),
            "augmented_assignment_expression" => self.rewrite_plus_assign(node),
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, depth + 1);
        }
    }

    fn rewrite_call(&mut self, call: Node<'_>, depth: usize) {
        let (Some(callee), Some(args)) = (call.child_by_field_name("function"), call.child_by_field_name("arguments")) else {
            return;
        };
        if callee.kind() != "member_expression" || args.kind() != "arguments" || has_optional_chain(call) {
            return;
        }
        let (Some(object), Some(property)) = (callee.child_by_field_name("object"), callee.child_by_field_name("property")) else {
            return;
        };
        if property.kind() != "property_identifier" || object.kind() == "super" {
            return;
        }

        let method = text(property, self.source);
        if !METHODS_TO_WRAP.contains(&method) || suspends(args) {
            return;
        }

        // Only a literal string receiver is known to concatenate like `+`
        if method == "concat" && matches!(object.kind(), "string" | "template_string") {
            let mut cursor = args.walk();
            let has_args = args.named_children(&mut cursor).any(|arg| arg.kind() != "comment");

            self.edits.open(object.start_byte(), depth, format!("{}(", WRAP_CONCAT_FN));
            if has_args {
                self.edits.replace(object.end_byte(), args.start_byte() + 1, ", ");
            } else {
                self.edits.replace(object.end_byte(), args.end_byte(), ")");
            }
            self.wraps_concat = true;
        } else {
            self.edits
                .open(object.start_byte(), depth, format!("{}(", WRAP_METHOD_CALL_RESULT_FN));
            self.edits.insert(object.end_byte(), ", (__a) => __a");
            self.edits.close(call.end_byte(), depth, ")");
            self.wraps_methods = true;
        }
    }

    fn rewrite_plus(&mut self, expression: Node<'_>, depth: usize) {
        let (Some(left), Some(operator), Some(right)) = (
            expression.child_by_field_name("left"),
            expression.child_by_field_name("operator"),
            expression.child_by_field_name("right"),
        ) else {
            return;
        };
        if operator.kind() != "+" {
            return;
        }

        self.edits.open(left.start_byte(), depth, format!("{}(", WRAP_CONCAT_FN));
        self.edits.replace(operator.start_byte(), operator.end_byte(), ",");
        self.edits.close(right.end_byte(), depth, ")");
        self.wraps_concat = true;
    }

    fn rewrite_plus_assign(&mut self, assignment: Node<'_>) {
        let (Some(left), Some(operator), Some(right)) = (
            assignment.child_by_field_name("left"),
            assignment.child_by_field_name("operator"),
            assignment.child_by_field_name("right"),
        ) else {
            return;
        };
        if operator.kind() != "+=" || left.kind() != "identifier" {
            return;
        }

        let target = text(left, self.source);
        self.edits.replace(
            operator.start_byte(),
            operator.end_byte(),
            format!("= {}({},", WRAP_CONCAT_FN, target),
        );
        // Right-hand side wrappers close deeper, so this one goes last
        self.edits.close(right.end_byte(), 0, ")");
        self.wraps_concat = true;
    }
}

/// Any `?.` along the callee's member chain
fn has_optional_chain(call: Node<'_>) -> bool {
    let mut node = call;
    loop {
        if node.child_by_field_name("optional_chain").is_some() {
            return true;
        }
        let next = match node.kind() {
            "member_expression" | "subscript_expression" => node.child_by_field_name("object"),
            "call_expression" => node.child_by_field_name("function"),
            _ => None,
        };
        match next {
            Some(inner) => node = inner,
            None => return false,
        }
    }
}

/// `await` or `yield` outside any nested function
fn suspends(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).any(|child| match child.kind() {
        "await_expression" | "yield_expression" => true,
        "function_expression" | "function" | "arrow_function" | "generator_function" | "method_definition" | "class" => false,
        _ => suspends(child),
    });
    found
}
