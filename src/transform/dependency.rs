// src/transform/dependency.rs
//! Rewriting of dependency files
//!
//! Functions named by [`FileInstructions`] get calls to the instrumentation
//! entry points injected at the top of their body (and around their return
//! values). Everything else in the file is left byte-for-byte intact.

use crate::transform::edits::EditBuffer;
use crate::transform::instructions::{FileInstructions, FunctionInstructions, NodeType};
use crate::transform::snippets::{entry_import, js_string};
use crate::transform::source::{after_statement, is_directive, parse, prologue_insert_point, text, SourceDialect};
use crate::transform::{
    TransformError, ACCESS_LOCAL_VARIABLES_FN, DEFAULT_ENTRY_MODULE, ENTRY_FUNCTIONS, INSPECT_ARGS_FN,
    MODIFY_ARGS_FN, MODIFY_RETURN_VALUE_FN, PACKAGE_LOADED_FN,
};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::debug;
use tree_sitter::Node;

const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
];

const FUNCTION_VALUE_KINDS: &[&str] = &["function_expression", "function", "generator_function", "arrow_function"];

/// Rewrites sources against compiled instructions
#[derive(Debug, Clone)]
pub struct SourceTransformer {
    entry_module: String,
    bundling: bool,
}

impl Default for SourceTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRY_MODULE)
    }
}

impl SourceTransformer {
    /// `entry_module` is the specifier injected imports load the entry functions from
    pub fn new(entry_module: impl Into<String>) -> Self {
        Self {
            entry_module: entry_module.into(),
            bundling: false,
        }
    }

    /// Also append a package-loaded notification to every rewritten file
    pub fn with_bundling(mut self, bundling: bool) -> Self {
        self.bundling = bundling;
        self
    }

    pub fn entry_module(&self) -> &str {
        &self.entry_module
    }

    pub fn transform(
        &self,
        dependency: &str,
        version: &str,
        file_path: &str,
        source: &str,
        dialect: SourceDialect,
        instructions: &FileInstructions,
    ) -> Result<String, TransformError> {
        if contains_instrumentation(source) {
            return Err(TransformError::AlreadyInstrumented);
        }

        let tree = parse(source)?;
        let root = tree.root_node();
        let is_module = dialect.is_module(root);

        let mut rewriter = FunctionRewriter::new(source, dependency, version, instructions);
        rewriter.visit(root, 0, None);
        let instrumented = rewriter.instrumented;
        let mut edits = rewriter.edits;
        debug!(
            "Instrumented {} of {} functions in {}@{}/{}",
            instrumented,
            instructions.functions.len(),
            dependency,
            version,
            file_path
        );

        let mut used = Vec::new();
        if instructions.uses_inspect_args() {
            used.push(INSPECT_ARGS_FN);
        }
        if instructions.uses_modify_args() {
            used.push(MODIFY_ARGS_FN);
        }
        if instructions.uses_modify_return_value() {
            used.push(MODIFY_RETURN_VALUE_FN);
        }
        if !instructions.access_local_variables.is_empty() {
            used.push(ACCESS_LOCAL_VARIABLES_FN);
        }
        if self.bundling {
            used.push(PACKAGE_LOADED_FN);
        }
        self.insert_import(&mut edits, root, source, &used, is_module);

        if !instructions.access_local_variables.is_empty() {
            edits.insert(
                source.len(),
                format!(
                    "\n{}({}, [{}]);\n",
                    ACCESS_LOCAL_VARIABLES_FN,
                    js_string(&instructions.identifier),
                    instructions.access_local_variables.join(", ")
                ),
            );
        }
        if self.bundling {
            edits.insert(source.len(), package_loaded_call(dependency, version));
        }

        Ok(edits.apply(source))
    }

    /// Same as [`transform`](Self::transform) with instructions given as JSON
    pub fn transform_json(
        &self,
        dependency: &str,
        version: &str,
        file_path: &str,
        source: &str,
        dialect: SourceDialect,
        instructions_json: &str,
    ) -> Result<String, TransformError> {
        let instructions: FileInstructions = serde_json::from_str(instructions_json)
            .map_err(|e| TransformError::InvalidInstructions(e.to_string()))?;
        self.transform(dependency, version, file_path, source, dialect, &instructions)
    }

    /// Append a single package-loaded notification to a file
    pub fn insert_package_loaded(
        &self,
        dependency: &str,
        version: &str,
        source: &str,
        dialect: SourceDialect,
    ) -> Result<String, TransformError> {
        if source.contains(PACKAGE_LOADED_FN) {
            return Err(TransformError::AlreadyInstrumented);
        }

        let tree = parse(source)?;
        let root = tree.root_node();
        let mut edits = EditBuffer::new();
        self.insert_import(&mut edits, root, source, &[PACKAGE_LOADED_FN], dialect.is_module(root));
        edits.insert(source.len(), package_loaded_call(dependency, version));
        Ok(edits.apply(source))
    }

    pub(crate) fn insert_import(
        &self,
        edits: &mut EditBuffer,
        root: Node<'_>,
        source: &str,
        functions: &[&str],
        is_module: bool,
    ) {
        if functions.is_empty() {
            return;
        }
        let (at, prefix) = prologue_insert_point(root, source);
        edits.insert(
            at,
            format!("{}{}", prefix, entry_import(functions, &self.entry_module, is_module)),
        );
    }
}

/// Whether `source` already calls any instrumentation entry point
pub fn contains_instrumentation(source: &str) -> bool {
    ENTRY_FUNCTIONS.iter().any(|name| source.contains(name))
}

fn package_loaded_call(dependency: &str, version: &str) -> String {
    format!(
        "\n{}({}, {});\n",
        PACKAGE_LOADED_FN,
        js_string(dependency),
        js_string(version)
    )
}

/// Return statements inside an instrumented function get wrapped with this
struct ReturnWrap {
    identifier: String,
    args: String,
}

struct FunctionRewriter<'a> {
    source: &'a str,
    dependency: &'a str,
    version: &'a str,
    instructions: &'a FileInstructions,
    edits: EditBuffer,
    /// Function nodes already matched through their declarator or assignment
    handled: HashSet<usize>,
    return_wraps: HashMap<usize, Rc<ReturnWrap>>,
    instrumented: usize,
}

impl<'a> FunctionRewriter<'a> {
    fn new(source: &'a str, dependency: &'a str, version: &'a str, instructions: &'a FileInstructions) -> Self {
        Self {
            source,
            dependency,
            version,
            instructions,
            edits: EditBuffer::new(),
            handled: HashSet::new(),
            return_wraps: HashMap::new(),
            instrumented: 0,
        }
    }

    fn visit(&mut self, node: Node<'_>, depth: usize, returns: Option<Rc<ReturnWrap>>) {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                self.match_own_name(node, NodeType::FunctionDeclaration, depth)
            }
            "function_expression" | "function" | "generator_function" if !self.handled.contains(&node.id()) => {
                self.match_own_name(node, NodeType::FunctionExpression, depth)
            }
            "method_definition" => self.match_method(node, depth),
            "variable_declarator" => self.match_declarator(node, depth),
            "assignment_expression" => self.match_assignment(node, depth),
            "return_statement" => {
                if let Some(wrap) = &returns {
                    self.wrap_return(node, depth, wrap);
                }
            }
            _ => {}
        }

        // Each function starts a new return scope
        let inner = if FUNCTION_KINDS.contains(&node.kind()) {
            self.return_wraps.get(&node.id()).cloned()
        } else {
            returns
        };

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, depth + 1, inner.clone());
        }
    }

    fn find(&self, node_type: NodeType, name: &str) -> Option<&'a FunctionInstructions> {
        self.instructions.find(node_type, name)
    }

    fn match_own_name(&mut self, function: Node<'_>, node_type: NodeType, depth: usize) {
        let Some(name) = function.child_by_field_name("name") else {
            return;
        };
        if let Some(instruction) = self.find(node_type, text(name, self.source)) {
            self.instrument(function, instruction, false, depth);
        }
    }

    fn match_method(&mut self, method: Node<'_>, depth: usize) {
        if method.parent().map(|p| p.kind()) != Some("class_body") {
            return;
        }

        let mut cursor = method.walk();
        let is_accessor = method
            .children(&mut cursor)
            .any(|child| !child.is_named() && matches!(child.kind(), "get" | "set"));
        if is_accessor {
            return;
        }

        let Some(name) = method.child_by_field_name("name") else {
            return;
        };
        if name.kind() != "property_identifier" {
            return;
        }

        let name = text(name, self.source);
        if let Some(instruction) = self.find(NodeType::MethodDefinition, name) {
            self.instrument(method, instruction, name == "constructor", depth);
        }
    }

    fn match_declarator(&mut self, declarator: Node<'_>, depth: usize) {
        let (Some(name), Some(value)) = (
            declarator.child_by_field_name("name"),
            declarator.child_by_field_name("value"),
        ) else {
            return;
        };
        if name.kind() != "identifier" || !FUNCTION_VALUE_KINDS.contains(&value.kind()) {
            return;
        }

        if let Some(instruction) = self.find(NodeType::FunctionVariableDeclaration, text(name, self.source)) {
            self.handled.insert(value.id());
            self.instrument(value, instruction, false, depth + 1);
        }
    }

    fn match_assignment(&mut self, assignment: Node<'_>, depth: usize) {
        let (Some(left), Some(right)) = (
            assignment.child_by_field_name("left"),
            assignment.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() != "member_expression" || !FUNCTION_VALUE_KINDS.contains(&right.kind()) {
            return;
        }
        let Some(name) = dotted_name(left, self.source) else {
            return;
        };

        if let Some(instruction) = self.find(NodeType::FunctionAssignment, &name) {
            self.handled.insert(right.id());
            self.instrument(right, instruction, false, depth + 1);
        }
    }

    fn instrument(&mut self, function: Node<'_>, instruction: &FunctionInstructions, is_constructor: bool, depth: usize) {
        let Some(body) = function.child_by_field_name("body") else {
            return;
        };

        let params = Parameters::of(function, self.source);
        let is_arrow = function.kind() == "arrow_function";
        let args = if is_arrow {
            params.array_literal()
        } else {
            "arguments".to_string()
        };
        let identifier = js_string(&instruction.identifier);
        // `this` is unusable until a derived constructor has called super()
        let receiver = if is_constructor && is_derived_class(function) && !has_top_level_super_call(body) {
            "undefined"
        } else {
            "this"
        };

        let mut statements = Vec::new();
        if instruction.inspect_args {
            statements.push(format!(
                "{}({}, {}, {}, {}, {}, {});",
                INSPECT_ARGS_FN,
                identifier,
                args,
                js_string(self.dependency),
                js_string(self.version),
                js_string(&instruction.name),
                receiver
            ));
        }
        if let Some(statement) = self.modify_args_statement(instruction, &params, is_arrow, &identifier, receiver) {
            statements.push(statement);
        }

        if body.kind() == "statement_block" {
            if !statements.is_empty() {
                let (at, prefix) = self.body_insert_point(body, is_constructor);
                self.edits.insert(at, format!("{}{}", prefix, statements.join(" ")));
            }
            if instruction.modify_return_value {
                self.return_wraps
                    .insert(function.id(), Rc::new(ReturnWrap { identifier, args }));
            }
        } else {
            // Concise arrow body: turn it into a block
            if statements.is_empty() && !instruction.modify_return_value {
                return;
            }
            let mut open = String::from("{ ");
            for statement in &statements {
                open.push_str(statement);
                open.push(' ');
            }
            open.push_str("return ");
            let mut close = String::new();
            if instruction.modify_return_value {
                open.push_str(&format!("{}({}, {}, (", MODIFY_RETURN_VALUE_FN, identifier, args));
                close.push_str("), this)");
            }
            close.push_str("; }");
            self.edits.open(body.start_byte(), depth + 1, open);
            self.edits.close(body.end_byte(), depth + 1, close);
        }

        self.instrumented += 1;
    }

    fn modify_args_statement(
        &self,
        instruction: &FunctionInstructions,
        params: &Parameters,
        is_arrow: bool,
        identifier: &str,
        receiver: &str,
    ) -> Option<String> {
        if !instruction.modify_args && !instruction.modify_arguments_object {
            return None;
        }
        if params.has_rest {
            debug!("Not modifying arguments of variadic function {}", instruction.name);
            return None;
        }

        if instruction.modify_arguments_object && !is_arrow {
            return Some(format!(
                "Object.assign(arguments, {}({}, Array.from(arguments), {}));",
                MODIFY_ARGS_FN, identifier, receiver
            ));
        }

        match params.assignable_list() {
            Some(targets) => Some(format!(
                "[{}] = {}({}, [{}], {});",
                targets, MODIFY_ARGS_FN, identifier, targets, receiver
            )),
            None => {
                debug!(
                    "Not modifying arguments of {}: no plain parameters",
                    instruction.name
                );
                None
            }
        }
    }

    /// After `{`, past directives and (in constructors) past `super(...)`
    fn body_insert_point(&self, body: Node<'_>, is_constructor: bool) -> (usize, &'static str) {
        let mut point = (body.start_byte() + 1, " ");

        let mut cursor = body.walk();
        let statements: Vec<Node<'_>> = body
            .named_children(&mut cursor)
            .filter(|child| child.kind() != "comment")
            .collect();

        for statement in &statements {
            if !is_directive(*statement) {
                break;
            }
            point = after_statement(*statement, self.source);
        }

        if is_constructor {
            if let Some(statement) = statements.iter().find(|s| is_super_call(**s)) {
                point = after_statement(*statement, self.source);
            }
        }

        point
    }

    fn wrap_return(&mut self, statement: Node<'_>, depth: usize, wrap: &ReturnWrap) {
        let mut cursor = statement.walk();
        let expression = statement
            .named_children(&mut cursor)
            .find(|child| child.kind() != "comment");
        let Some(expression) = expression else {
            return;
        };

        self.edits.open(
            expression.start_byte(),
            depth + 1,
            format!("{}({}, {}, (", MODIFY_RETURN_VALUE_FN, wrap.identifier, wrap.args),
        );
        self.edits.close(expression.end_byte(), depth + 1, "), this)");
    }
}

fn is_super_call(statement: Node<'_>) -> bool {
    if statement.kind() != "expression_statement" {
        return false;
    }
    let mut cursor = statement.walk();
    let call = statement.named_children(&mut cursor).next();
    matches!(
        call.and_then(|c| if c.kind() == "call_expression" { c.child_by_field_name("function") } else { None }),
        Some(callee) if callee.kind() == "super"
    )
}

/// Method belongs to a class with an `extends` clause
fn is_derived_class(method: Node<'_>) -> bool {
    let Some(class) = method.parent().and_then(|body| body.parent()) else {
        return false;
    };
    let mut cursor = class.walk();
    let derived = class.children(&mut cursor).any(|child| child.kind() == "class_heritage");
    derived
}

fn has_top_level_super_call(body: Node<'_>) -> bool {
    let mut cursor = body.walk();
    let found = body.named_children(&mut cursor).any(is_super_call);
    found
}

/// `a.b.c` for member chains of plain identifiers
fn dotted_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" | "this" => Some(text(node, source).to_string()),
        "member_expression" => {
            let object = dotted_name(node.child_by_field_name("object")?, source)?;
            let property = node.child_by_field_name("property")?;
            if property.kind() != "property_identifier" {
                return None;
            }
            Some(format!("{}.{}", object, text(property, source)))
        }
        _ => None,
    }
}

enum Param {
    Name(String),
    Rest(String),
    Pattern,
}

struct Parameters {
    entries: Vec<Param>,
    has_rest: bool,
    has_pattern: bool,
}

impl Parameters {
    fn of(function: Node<'_>, source: &str) -> Self {
        let mut params = Parameters {
            entries: Vec::new(),
            has_rest: false,
            has_pattern: false,
        };

        // `x => ...`
        if let Some(single) = function.child_by_field_name("parameter") {
            params.push_simple(single, source);
            return params;
        }

        let Some(list) = function.child_by_field_name("parameters") else {
            return params;
        };
        let mut cursor = list.walk();
        for child in list.named_children(&mut cursor) {
            match child.kind() {
                "comment" => {}
                "assignment_pattern" => match child.child_by_field_name("left") {
                    Some(left) => params.push_simple(left, source),
                    None => params.push_pattern(),
                },
                "rest_pattern" => {
                    params.has_rest = true;
                    let mut inner_cursor = child.walk();
                    let inner = child.named_children(&mut inner_cursor).next();
                    match inner {
                        Some(name) if name.kind() == "identifier" => {
                            params.entries.push(Param::Rest(text(name, source).to_string()))
                        }
                        _ => params.push_pattern(),
                    }
                }
                _ => params.push_simple(child, source),
            }
        }
        params
    }

    fn push_simple(&mut self, node: Node<'_>, source: &str) {
        if node.kind() == "identifier" {
            self.entries.push(Param::Name(text(node, source).to_string()));
        } else {
            self.push_pattern();
        }
    }

    fn push_pattern(&mut self) {
        self.has_pattern = true;
        self.entries.push(Param::Pattern);
    }

    /// Arguments array for arrow functions, which have no `arguments`
    fn array_literal(&self) -> String {
        let items: Vec<String> = self
            .entries
            .iter()
            .map(|param| match param {
                Param::Name(name) => name.clone(),
                Param::Rest(name) => format!("...{}", name),
                Param::Pattern => "undefined".to_string(),
            })
            .collect();
        format!("[{}]", items.join(", "))
    }

    /// Parameters that can be reassigned by a destructuring assignment
    fn assignable_list(&self) -> Option<String> {
        if self.has_rest || self.has_pattern || self.entries.is_empty() {
            return None;
        }
        let names: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|param| match param {
                Param::Name(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        Some(names.join(", "))
    }
}
