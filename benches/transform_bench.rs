// benches/transform_bench.rs
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rasp_engine::hooks::VersionRange;
use rasp_engine::transform::{
    FileInstructions, FunctionInstructions, NodeType, SourceDialect, SourceTransformer,
};

const CLIENT_SOURCE: &str = r#"
"use strict";
const EventEmitter = require("events");

class Client extends EventEmitter {
  constructor(config) {
    super();
    this.config = config;
  }

  query(text, values, callback) {
    const sql = text.trim();
    return this.connection.send(sql, values, callback);
  }

  end() {
    return this.connection.close();
  }
}

function escapeIdentifier(str) {
  return '"' + str.replace(/"/g, '""') + '"';
}

module.exports = { Client, escapeIdentifier };
"#;

fn client_instructions() -> FileInstructions {
    let function = |node_type, name: &str| FunctionInstructions {
        node_type,
        name: name.to_string(),
        identifier: format!("pg.lib/client.js.{}.^8.0.0", name),
        inspect_args: true,
        modify_args: true,
        modify_return_value: false,
        modify_arguments_object: false,
    };

    FileInstructions {
        path: "lib/client.js".to_string(),
        version_range: "^8.0.0".to_string(),
        identifier: "pg.lib/client.js.^8.0.0".to_string(),
        functions: vec![
            function(NodeType::MethodDefinition, "query"),
            function(NodeType::FunctionDeclaration, "escapeIdentifier"),
        ],
        access_local_variables: Vec::new(),
    }
}

fn bench_dependency_transform(c: &mut Criterion) {
    let transformer = SourceTransformer::default();
    let instructions = client_instructions();

    c.bench_function("transform_dependency_file", |b| {
        b.iter(|| {
            transformer
                .transform(
                    "pg",
                    "8.11.0",
                    "lib/client.js",
                    black_box(CLIENT_SOURCE),
                    SourceDialect::CommonJs,
                    &instructions,
                )
                .expect("transform client");
        });
    });
}

fn bench_best_effort_transform(c: &mut Criterion) {
    let transformer = SourceTransformer::default();

    c.bench_function("transform_application_file", |b| {
        b.iter(|| transformer.transform_best_effort(black_box(CLIENT_SOURCE), SourceDialect::CommonJs));
    });
}

fn bench_version_range(c: &mut Criterion) {
    let range = VersionRange::parse(">=7.0.0 <8.4 || ^8.5.0").expect("parse range");

    c.bench_function("version_range_satisfies", |b| {
        b.iter(|| range.satisfies(black_box("8.11.0")));
    });
}

criterion_group!(
    benches,
    bench_dependency_transform,
    bench_best_effort_transform,
    bench_version_range
);
criterion_main!(benches);
