// ============================================================================
// File: packages/adles/src/resolver/mod.rs
// ----------------------------------------------------------------------------
// Identifier resolution for exercise specifications.
//
// `resolve` is pure: it builds a symbol table of every group, service and
// network label and reports dangling references and policy violations as
// diagnostics. Callers decide whether errors abort the run.
// ============================================================================

mod checks;
mod diagnostics;

use std::collections::BTreeMap;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};

use crate::error::{AdlesError, AdlesResult};
use crate::spec::{GroupSpec, NetworkKind, NetworkSpec, ServiceSpec, Specification};

/// Label to definition lookup for one specification
#[derive(Debug, Clone, Default)]
pub struct SymbolTable<'a> {
    groups: BTreeMap<&'a str, &'a GroupSpec>,
    services: BTreeMap<&'a str, &'a ServiceSpec>,
    networks: BTreeMap<&'a str, (NetworkKind, &'a NetworkSpec)>,
}

impl<'a> SymbolTable<'a> {
    /// Index every definition of a specification
    pub fn new(spec: &'a Specification) -> Self {
        Self {
            groups: spec.groups.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            services: spec.services.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            networks: spec
                .networks
                .iter()
                .map(|(kind, label, net)| (label.as_str(), (kind, net)))
                .collect(),
        }
    }

    pub fn group(&self, label: &str) -> Option<&'a GroupSpec> {
        self.groups.get(label).copied()
    }

    pub fn service(&self, label: &str) -> Option<&'a ServiceSpec> {
        self.services.get(label).copied()
    }

    pub fn network(&self, label: &str) -> Option<(NetworkKind, &'a NetworkSpec)> {
        self.networks.get(label).copied()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&'a str, &'a GroupSpec)> + '_ {
        self.groups.iter().map(|(k, v)| (*k, *v))
    }

    pub fn networks(&self) -> impl Iterator<Item = (&'a str, NetworkKind, &'a NetworkSpec)> + '_ {
        self.networks.iter().map(|(k, (kind, net))| (*k, *kind, *net))
    }
}

/// Output of [`resolve`]
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub symbols: SymbolTable<'a>,
    pub diagnostics: Diagnostics,
}

impl<'a> Resolution<'a> {
    /// The symbol table, or a reference error carrying every fatal diagnostic
    pub fn into_result(self) -> AdlesResult<SymbolTable<'a>> {
        if self.diagnostics.has_errors() {
            return Err(AdlesError::Reference {
                diagnostics: self.diagnostics.errors().cloned().collect(),
            });
        }
        Ok(self.symbols)
    }
}

/// Resolve every label referenced by a specification
///
/// # Arguments
/// * `spec` - Parsed specification
///
/// # Returns
/// Symbol table and the complete list of diagnostics found in one pass
pub fn resolve(spec: &Specification) -> Resolution<'_> {
    let symbols = SymbolTable::new(spec);
    let mut diagnostics = Diagnostics::new();

    for warning in &spec.warnings {
        diagnostics.warning(warning.path.as_str(), warning.message.as_str());
    }
    checks::check_metadata(spec, &mut diagnostics);
    checks::check_networks(spec, &mut diagnostics);
    checks::check_folders(spec, &symbols, &mut diagnostics);

    log::debug!(
        "resolved {} groups, {} services, {} networks ({} diagnostics)",
        symbols.groups.len(),
        symbols.services.len(),
        symbols.networks.len(),
        diagnostics.len()
    );

    Resolution {
        symbols,
        diagnostics,
    }
}
