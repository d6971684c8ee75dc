// src/transform/snippets.rs
//! Text fragments injected into rewritten source

/// Quote `value` as a JavaScript string literal
pub(crate) fn js_string(value: &str) -> String {
    let mut quoted = serde_json::to_string(value).unwrap_or_else(|_| String::from("\"\""));
    // JSON allows these raw, older engines reject them inside string literals
    if quoted.contains(['\u{2028}', '\u{2029}']) {
        quoted = quoted.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029");
    }
    quoted
}

/// `import {..} from` or `const {..} = require(..)` for the given entry functions
pub(crate) fn entry_import(functions: &[&str], entry_module: &str, is_module: bool) -> String {
    let names = functions.join(", ");
    if is_module {
        format!("import {{ {} }} from {};", names, js_string(entry_module))
    } else {
        format!("const {{ {} }} = require({});", names, js_string(entry_module))
    }
}
