use crate::builder::DefinitionError;
use crate::environment::{Environment, EnvironmentError, Location};
use crate::language::errors::{ParseError, ParseErrorKind, ParseErrors};
use crate::loader::FileErrors;
use crate::resolver::NoTypeFoundError;
use crate::validator::ValidationError;
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: ParseError) -> Self {
        let label = match err.kind {
            ParseErrorKind::Syntax => "syntax error",
            ParseErrorKind::Semantics => "semantics error",
        };
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
            label: label.to_string(),
        }
    }
}

pub fn emit_parse_errors(path: &Path, source: &str, errors: &ParseErrors) {
    let src = NamedSource::new(path.display().to_string(), source.to_string());
    for err in &errors.errors {
        let diagnostic = SyntaxDiagnostic::from_error(src.clone(), err.clone());
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn emit_file_errors(files: &[FileErrors]) {
    for file in files {
        emit_parse_errors(&file.path, &file.source, &file.errors);
    }
}

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct SemanticDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{message}")]
    span: SourceSpan,
    message: String,
}

fn emit_located(env: &Environment, message: String, location: Option<Location>) {
    let buffer = location.and_then(|loc| env.buffer(loc.buffer).map(|buffer| (buffer, loc)));
    match buffer {
        Some((buffer, loc)) => {
            let diagnostic = SemanticDiagnostic {
                src: NamedSource::new(buffer.name.clone(), buffer.source.clone()),
                span: SourceSpan::from((loc.span.start, loc.span.len())),
                message,
            };
            eprintln!("{:?}", Report::new(diagnostic));
        }
        None => eprintln!("error: {}", message),
    }
}

pub fn emit_environment_errors(env: &Environment, errors: &[EnvironmentError]) {
    for err in errors {
        emit_located(env, err.to_string(), Some(err.location()));
    }
}

pub fn emit_resolve_errors(env: &Environment, errors: &[NoTypeFoundError]) {
    for err in errors {
        emit_located(env, err.to_string(), err.location);
    }
}

pub fn emit_definition_error(env: &Environment, err: &DefinitionError) {
    emit_located(env, err.to_string(), err.location());
}

pub fn emit_validation_errors(env: &Environment, errors: &[ValidationError]) {
    for err in errors {
        emit_located(env, err.to_string(), err.location());
    }
}

pub fn report_io_error(path: &Path, error: &std::io::Error) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}
