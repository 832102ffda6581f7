//! Output model: one [`SqlFileAnalysis`] per file
//!
//! Field names serialize in camelCase. Empty collections and absent
//! optionals are left out of the JSON; booleans are always written.

mod analysis;
mod operations;

pub use analysis::SqlFileAnalysis;
pub use operations::*;

use indexmap::IndexSet;
use serde::Serialize;

/// Relations (tables or views, undistinguished) read or written by a body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqlReferences {
    #[serde(skip_serializing_if = "IndexSet::is_empty")]
    pub relations: IndexSet<String>,
}

impl SqlReferences {
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Functions and procedures invoked by a body.
///
/// `HR.LOG_ACCESS` and `LOG_ACCESS` are kept as two entries; nothing here
/// resolves a call to a definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqlInvocations {
    #[serde(skip_serializing_if = "IndexSet::is_empty")]
    pub functions: IndexSet<String>,
    #[serde(skip_serializing_if = "IndexSet::is_empty")]
    pub procedures: IndexSet<String>,
}

impl SqlInvocations {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.procedures.is_empty()
    }
}

/// What a reference/call extraction found in one piece of SQL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyAnalysis {
    pub relations: IndexSet<String>,
    pub function_calls: IndexSet<String>,
    pub procedure_calls: IndexSet<String>,
}

impl BodyAnalysis {
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
            && self.function_calls.is_empty()
            && self.procedure_calls.is_empty()
    }

    /// Fold into an existing references/calls pair
    pub fn apply_to(self, references: &mut SqlReferences, calls: &mut SqlInvocations) {
        references.relations.extend(self.relations);
        calls.functions.extend(self.function_calls);
        calls.procedures.extend(self.procedure_calls);
    }
}

/// Capability of operations whose definition carries a body
pub trait HasReferencesAndCalls {
    fn references(&self) -> &SqlReferences;
    fn calls(&self) -> &SqlInvocations;
    fn references_mut(&mut self) -> &mut SqlReferences;
    fn calls_mut(&mut self) -> &mut SqlInvocations;

    fn absorb(&mut self, analysis: BodyAnalysis) {
        self.references_mut().relations.extend(analysis.relations);
        let calls = self.calls_mut();
        calls.functions.extend(analysis.function_calls);
        calls.procedures.extend(analysis.procedure_calls);
    }
}
