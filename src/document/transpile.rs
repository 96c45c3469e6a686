//! JSX/TSX to plain ES module transpilation for the component dialect.
//!
//! Uses the classic runtime (`React.createElement`), so the script has to
//! import `React` itself; the import map in the document resolves it.

/// Error text of a failed transpilation (parse or transform diagnostics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileError(pub String);

impl std::fmt::Display for TranspileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TranspileError {}

/// Transpile TypeScript + JSX source to JavaScript.
#[cfg(feature = "jsx")]
pub fn transpile(source: &str) -> Result<String, TranspileError> {
    use std::path::Path;

    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_semantic::SemanticBuilder;
    use oxc_span::SourceType;
    use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};

    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true);

    let ret = Parser::new(&allocator, source, source_type).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(collect(ret.errors.iter().map(|e| e.to_string())));
    }
    let mut program = ret.program;

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let options = TransformOptions {
        jsx: JsxOptions {
            runtime: JsxRuntime::Classic,
            ..JsxOptions::default()
        },
        ..TransformOptions::default()
    };
    let transformed = Transformer::new(&allocator, Path::new("index.tsx"), &options)
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(collect(transformed.errors.iter().map(|e| e.to_string())));
    }

    Ok(Codegen::new().build(&program).code)
}

/// Without the `jsx` feature the source is embedded unchanged.
#[cfg(not(feature = "jsx"))]
pub fn transpile(source: &str) -> Result<String, TranspileError> {
    tracing::debug!("jsx feature disabled, embedding component script as is");
    Ok(source.to_string())
}

#[cfg(feature = "jsx")]
fn collect(messages: impl Iterator<Item = String>) -> TranspileError {
    let text = messages.collect::<Vec<_>>().join("\n");
    TranspileError(if text.is_empty() {
        "failed to parse script".to_string()
    } else {
        text
    })
}
