//! Authoring-time binding validation
//!
//! The validator checks authored bindings against static schemas and the declared
//! tag namespace. It parses tags and paths with [`parse_target`] and walks paths
//! with [`walk`], the exact functions the runtime uses, so a binding that passes
//! here cannot fail structurally at runtime.
//!
//! For every binding:
//!
//! 1. Parse the tag and the field path. Failure is an error.
//! 2. Collect the candidate types the namespace allows at the tag. None is an error.
//! 3. Build each candidate's schema and walk the path against it, checking the
//!    expected type if one was declared.
//! 4. If every candidate fails the binding can never resolve: error. If only some
//!    fail, the binding depends on which type a producer registers: warning.

pub mod namespace;

pub use namespace::{Candidates, DeclaredNamespace, NamespaceEntry};

use crate::binding::{parse_target, walk, ResolutionError};
use crate::path::FieldPath;
use crate::schema::SchemaStore;
use crate::types::TypeTag;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// An authored binding, as supplied by the visual graph or a project file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDeclaration {
    pub id: String,
    pub tag: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<TypeTag>,
}

impl BindingDeclaration {
    pub fn new(id: impl Into<String>, tag: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            path: path.into(),
            expect: None,
        }
    }

    pub fn expecting(mut self, tag: TypeTag) -> Self {
        self.expect = Some(tag);
        self
    }
}

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Allowed, but worth a look
    Warning,
    /// Blocks compilation
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One finding about one binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub binding_id: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    fn error(binding_id: &str, message: String) -> Self {
        Self {
            binding_id: binding_id.to_string(),
            severity: Severity::Error,
            message,
        }
    }

    fn warning(binding_id: &str, message: String) -> Self {
        Self {
            binding_id: binding_id.to_string(),
            severity: Severity::Warning,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.binding_id, self.message)
    }
}

/// Result of validating a set of bindings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Diagnostics for one binding id
    pub fn for_binding<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.binding_id == id)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

struct CandidateFailure {
    type_name: String,
    reason: String,
}

/// Checks bindings against schemas and a declared namespace
pub struct Validator<'a> {
    store: &'a SchemaStore,
    namespace: &'a DeclaredNamespace,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a SchemaStore, namespace: &'a DeclaredNamespace) -> Self {
        Self { store, namespace }
    }

    pub fn validate(&self, bindings: &[BindingDeclaration]) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut seen = HashSet::new();

        for binding in bindings {
            if !seen.insert(binding.id.as_str()) {
                report.diagnostics.push(Diagnostic::warning(
                    &binding.id,
                    "binding id is declared more than once".to_string(),
                ));
            }
            report.diagnostics.extend(self.validate_one(binding));
            report.checked += 1;
        }

        tracing::info!(
            "Validated {} bindings: {} errors, {} warnings",
            report.checked,
            report.error_count(),
            report.warning_count()
        );
        report
    }

    /// The diagnostic for a single binding, if it has one
    pub fn validate_one(&self, binding: &BindingDeclaration) -> Option<Diagnostic> {
        let (tag, path) = match parse_target(&binding.tag, &binding.path) {
            Ok(target) => target,
            Err(e) => return Some(Diagnostic::error(&binding.id, e.to_string())),
        };

        let candidates = self.namespace.candidates(tag);
        let types = candidates.types();
        if types.is_empty() {
            return Some(Diagnostic::error(
                &binding.id,
                format!("tag '{}' is not declared in the project namespace", tag),
            ));
        }

        let failures: Vec<CandidateFailure> = types
            .iter()
            .filter_map(|type_name| {
                self.check_candidate(type_name, &path, binding.expect)
                    .err()
                    .map(|reason| CandidateFailure {
                        type_name: type_name.clone(),
                        reason,
                    })
            })
            .collect();

        if failures.is_empty() {
            return None;
        }

        let listed = failures
            .iter()
            .map(|f| format!("{}: {}", f.type_name, f.reason))
            .collect::<Vec<_>>()
            .join("; ");

        if failures.len() == types.len() {
            Some(Diagnostic::error(
                &binding.id,
                if types.len() == 1 {
                    listed
                } else {
                    format!("no candidate type at '{}' resolves ({})", tag, listed)
                },
            ))
        } else {
            Some(Diagnostic::warning(
                &binding.id,
                format!("resolves only for some types registrable at '{}' ({})", tag, listed),
            ))
        }
    }

    fn check_candidate(
        &self,
        type_name: &str,
        path: &FieldPath,
        expected: Option<TypeTag>,
    ) -> Result<(), String> {
        let schema = self.store.get_or_build(type_name).map_err(|e| e.to_string())?;
        let resolved = walk(&schema, path).map_err(|e| e.to_string())?;
        match expected {
            Some(expected) if resolved.leaf_tag() != expected => Err(ResolutionError::TypeMismatch {
                field: resolved.field_name().to_string(),
                expected,
                found: resolved.leaf_tag(),
            }
            .to_string()),
            _ => Ok(()),
        }
    }
}
