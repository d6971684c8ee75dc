// src/interception/builtin_shim.rs
//! Replacement source for builtin modules
//!
//! Builtins have no source text to rewrite. When the load hook sees one
//! with registered interceptors it serves a module that fetches the
//! unpatched builtin, hands it to the engine for wrapping and re-exports
//! every name of the original plus `default`.

use crate::transform::snippets::{entry_import, js_string};
use std::collections::BTreeSet;
use tracing::debug;

pub const BUILTIN_WITHOUT_PATCHING_FN: &str = "__instrumentBuiltinWithoutPatching";
pub const WRAP_BUILTIN_EXPORTS_FN: &str = "__instrumentWrapBuiltinExports";

/// Words that can not be used as binding names in module code
const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
    "implements", "import", "in", "instanceof", "interface", "let", "new", "null", "package",
    "private", "protected", "public", "return", "static", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Whether `name` can be re-exported with `export const <name> = ...`
pub fn is_valid_export_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') && !RESERVED_WORDS.contains(&name)
}

/// Generate the shim for builtin `name`
///
/// `None` when the export names are unknown, since the shim could not
/// re-export them.
pub fn generate_builtin_shim(name: &str, export_names: Option<&[String]>, entry_module: &str) -> Option<String> {
    let export_names = export_names?;

    let exports: BTreeSet<&str> = export_names
        .iter()
        .map(String::as_str)
        .filter(|export| is_valid_export_name(export))
        .collect();
    debug!("Generating shim for builtin {} ({} exports)", name, exports.len());

    let original = unused_binding("__original", &exports);
    let wrapped = unused_binding("__wrapped", &exports);

    let mut reexports = String::new();
    for export in &exports {
        reexports.push_str(&format!("export const {export} = {wrapped}[{}];\n", js_string(export)));
    }

    Some(format!(
        r#"{import}
const {original} = {without}({name});
const {wrapped} = {wrap}({name}, {original});
export default {wrapped};
{reexports}"#,
        import = entry_import(&[BUILTIN_WITHOUT_PATCHING_FN, WRAP_BUILTIN_EXPORTS_FN], entry_module, true),
        without = BUILTIN_WITHOUT_PATCHING_FN,
        wrap = WRAP_BUILTIN_EXPORTS_FN,
        name = js_string(name),
        reexports = reexports,
    ))
}

/// `base`, suffixed until no export of the builtin uses it
fn unused_binding(base: &str, exports: &BTreeSet<&str>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 0;
    while exports.contains(candidate.as_str()) {
        suffix += 1;
        candidate = format!("{}_{}", base, suffix);
    }
    candidate
}
