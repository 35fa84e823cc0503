//! Sykli CI pipeline for valvoja
//!
//! Run locally: sykli run
//! Or: cargo run --bin sykli --features sykli -- --emit | sykli run -

use sykli::{Condition, Pipeline, Template};

fn main() {
    let mut p = Pipeline::new();

    let src = p.dir(".");
    let cargo_registry = p.cache("cargo-registry");
    let cargo_git = p.cache("cargo-git");
    let target_cache = p.cache("target");

    let rust = Template::new()
        .container("rust:1.85")
        .mount_dir(&src, "/src")
        .mount_cache(&cargo_registry, "/usr/local/cargo/registry")
        .mount_cache(&cargo_git, "/usr/local/cargo/git")
        .mount_cache(&target_cache, "/src/target")
        .workdir("/src");

    // Unit tests run against mocks and wiremock; no network needed
    let _ = p
        .task("test")
        .from(&rust)
        .run("cargo test --all-features")
        .inputs(&["**/*.rs", "**/*.pem", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("lint")
        .from(&rust)
        .run("cargo clippy --all-targets --all-features -- -D warnings")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("fmt")
        .from(&rust)
        .run("cargo fmt -- --check")
        .inputs(&["**/*.rs"]);

    let _ = p
        .task("build")
        .from(&rust)
        .run("cargo build --release --bin valvoja")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"])
        .output("binary", "target/release/valvoja")
        .after(&["test", "lint", "fmt"]);

    // Config errors must fail fast with a non-zero exit before any request
    let _ = p
        .task("smoke-test")
        .from(&rust)
        .run(
            r#"#!/bin/bash
set -e

./target/release/valvoja --help > /dev/null

if CHECK_URL=https://example.com ISSUE_LABEL=x SERVICE_NAME=x GITHUB_REPOSITORY=broken \
    GITHUB_TOKEN=x ./target/release/valvoja once; then
  echo "ERROR: invalid GITHUB_REPOSITORY was accepted"
  exit 1
fi

echo "Smoke test passed"
"#,
        )
        .input_from("build", "binary", "/src/target/release/valvoja")
        .when_cond(Condition::event("push").or(Condition::negate(Condition::branch("*"))))
        .timeout(120);

    p.emit();
}
