// src/transform/instructions.rs
//! Instructions consumed by the source rewriter
//!
//! Serialized as camelCase JSON so they can be handed to an out-of-process
//! rewriter unchanged:
//!
//! ```text
//! {"path":"lib/client.js","versionRange":"^8.0.0","identifier":"pg.lib/client.js.^8.0.0",
//!  "functions":[{"nodeType":"MethodDefinition","name":"query","identifier":"pg.lib/client.js.query.^8.0.0",
//!                "inspectArgs":true,"modifyArgs":false,"modifyReturnValue":false}],
//!  "accessLocalVariables":[]}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Syntactic shape a function is declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// `function name() {}`
    FunctionDeclaration,
    /// `const f = function name() {}` matched by the function's own name
    FunctionExpression,
    /// `class C { name() {} }`
    MethodDefinition,
    /// `obj.prop.name = function () {}` matched by the dotted target
    FunctionAssignment,
    /// `const name = () => {}` matched by the variable name
    FunctionVariableDeclaration,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Sink category of an instrumented function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SqlOp,
    NosqlOp,
    FsOp,
    OutgoingHttpOp,
    ExecOp,
    EvalOp,
    DeserializeOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInstructions {
    pub node_type: NodeType,
    pub name: String,
    pub identifier: String,
    #[serde(default)]
    pub inspect_args: bool,
    #[serde(default)]
    pub modify_args: bool,
    #[serde(default)]
    pub modify_return_value: bool,
    /// Replace the whole `arguments` object instead of named parameters
    #[serde(default)]
    pub modify_arguments_object: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInstructions {
    pub path: String,
    pub version_range: String,
    /// File-level identifier used for local-variable access
    #[serde(default)]
    pub identifier: String,
    pub functions: Vec<FunctionInstructions>,
    #[serde(default)]
    pub access_local_variables: Vec<String>,
}

impl FileInstructions {
    pub fn uses_inspect_args(&self) -> bool {
        self.functions.iter().any(|f| f.inspect_args)
    }

    pub fn uses_modify_args(&self) -> bool {
        self.functions
            .iter()
            .any(|f| f.modify_args || f.modify_arguments_object)
    }

    pub fn uses_modify_return_value(&self) -> bool {
        self.functions.iter().any(|f| f.modify_return_value)
    }

    pub fn find(&self, node_type: NodeType, name: &str) -> Option<&FunctionInstructions> {
        self.functions
            .iter()
            .find(|f| f.node_type == node_type && f.name == name)
    }
}
