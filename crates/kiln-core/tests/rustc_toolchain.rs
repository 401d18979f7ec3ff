//! Builds driven through the real rustc found in PATH.

use std::sync::Arc;

use kiln_core::{CompilerConfig, DynamicCompiler, EmptyNamespace, Error};

fn compiler() -> DynamicCompiler {
    DynamicCompiler::with_rustc(Arc::new(EmptyNamespace), CompilerConfig::default())
        .expect("rustc should be available")
}

#[test]
fn test_compiles_units_in_memory() {
    let mut compiler = compiler();
    compiler
        .add_source("app.math", "pub fn answer() -> u32 { 42 }")
        .unwrap();
    compiler
        .add_source("app.text", "pub fn greet() -> &'static str { \"hi\" }")
        .unwrap();

    let built = compiler.build().unwrap();
    assert_eq!(built.len(), 2);

    let math = &built["app.math"];
    assert_eq!(math.name(), "app.math");
    let ir = String::from_utf8_lossy(math.image());
    assert!(ir.contains("ModuleID"), "expected LLVM IR, got: {ir}");

    let again = compiler.loader().resolve("app.math").unwrap();
    assert!(Arc::ptr_eq(math, &again));
}

#[test]
fn test_syntax_error_fails_with_diagnostics() {
    let mut compiler = compiler();
    compiler
        .add_source("app.broken", "pub fn broken() -> u32 { let }\n")
        .unwrap();

    let err = compiler.build().unwrap_err();
    let Error::Compilation(failure) = err else {
        panic!("expected a compilation failure, got {err:?}");
    };

    assert!(failure.diagnostics().count() > 0);
    assert!(!failure.errors().is_empty());
    assert!(failure.errors().iter().any(|d| d.line == Some(1)));
    assert!(
        failure
            .errors()
            .iter()
            .all(|d| !d.message.starts_with("aborting due to"))
    );
    assert!(failure.cause().is_none());
    assert!(!compiler.loader().contains("app.broken"));
}

#[test]
fn test_warnings_do_not_fail_build() {
    let mut compiler = compiler();
    compiler
        .add_source("app.lint", "pub fn noisy() { let unused = 1; }")
        .unwrap();

    let built = compiler.build().unwrap();
    assert!(built.contains_key("app.lint"));
}

#[test]
fn test_rebuild_after_failure() {
    let mut compiler = compiler();
    compiler.add_source("app.first", "pub fn f( {").unwrap();
    assert!(compiler.build().is_err());

    compiler.add_source("app.second", "pub fn g() {}").unwrap();
    let built = compiler.build().unwrap();
    assert_eq!(built.len(), 1);
    assert!(built.contains_key("app.second"));
}
