//! Operation variants

use serde::Serialize;

use super::{HasReferencesAndCalls, SqlInvocations, SqlReferences};

/// Closed set of everything the extractor can emit for a statement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Operation {
    CreateTable(CreateTableOperation),
    AlterTable(AlterTableOperation),
    CreateView(CreateViewOperation),
    AlterView(AlterViewOperation),
    CreateIndex(CreateIndexOperation),
    CreateProcedure(CreateProcedureOperation),
    AlterProcedure(AlterProcedureOperation),
    CreateFunction(CreateFunctionOperation),
    AlterFunction(AlterFunctionOperation),
    CreateTrigger(CreateTriggerOperation),
    Drop(DropOperation),
}

impl Operation {
    /// The body capability, for variants that have one
    pub fn body(&self) -> Option<&dyn HasReferencesAndCalls> {
        match self {
            Operation::CreateProcedure(op) => Some(op),
            Operation::AlterProcedure(op) => Some(op),
            Operation::CreateFunction(op) => Some(op),
            Operation::AlterFunction(op) => Some(op),
            Operation::CreateTrigger(op) => Some(op),
            _ => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut dyn HasReferencesAndCalls> {
        match self {
            Operation::CreateProcedure(op) => Some(op),
            Operation::AlterProcedure(op) => Some(op),
            Operation::CreateFunction(op) => Some(op),
            Operation::AlterFunction(op) => Some(op),
            Operation::CreateTrigger(op) => Some(op),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            constraints: Vec::new(),
        }
    }
}

/// Fixed order of column constraint labels
pub const COLUMN_CONSTRAINT_ORDER: [&str; 4] = ["NOT NULL", "UNIQUE", "PRIMARY KEY", "FOREIGN KEY"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    pub referenced_table: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub referenced_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterDirection {
    In,
    Out,
    InOut,
}

impl ParameterDirection {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "IN" => Some(ParameterDirection::In),
            "OUT" | "OUTPUT" => Some(ParameterDirection::Out),
            "INOUT" | "IN OUT" => Some(ParameterDirection::InOut),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<ParameterDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableOperation {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub if_not_exists: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnDefinition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub primary_keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlterTableOperationType {
    AddColumn,
    DropColumn,
    AddConstraint,
    DropConstraint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterTableOperation {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<AlterTableOperationType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added_columns: Vec<ColumnDefinition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added_constraints: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_constraints: Vec<String>,
}

impl AlterTableOperation {
    pub fn new(table_name: String, schema: Option<String>) -> Self {
        Self {
            table_name,
            schema,
            operation_type: None,
            added_columns: Vec::new(),
            dropped_columns: Vec::new(),
            added_constraints: Vec::new(),
            dropped_constraints: Vec::new(),
        }
    }

    /// The first recognized action decides the operation type
    pub fn record(&mut self, kind: AlterTableOperationType) {
        self.operation_type.get_or_insert(kind);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateViewOperation {
    pub view_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub or_replace: bool,
    #[serde(skip_serializing_if = "SqlReferences::is_empty")]
    pub references: SqlReferences,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterViewOperation {
    pub view_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "SqlReferences::is_empty")]
    pub references: SqlReferences,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndexOperation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub unique: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProcedureOperation {
    pub procedure_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub or_replace: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "SqlReferences::is_empty")]
    pub references: SqlReferences,
    #[serde(skip_serializing_if = "SqlInvocations::is_empty")]
    pub calls: SqlInvocations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterProcedureOperation {
    pub procedure_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "SqlReferences::is_empty")]
    pub references: SqlReferences,
    #[serde(skip_serializing_if = "SqlInvocations::is_empty")]
    pub calls: SqlInvocations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFunctionOperation {
    pub function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub or_replace: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "SqlReferences::is_empty")]
    pub references: SqlReferences,
    #[serde(skip_serializing_if = "SqlInvocations::is_empty")]
    pub calls: SqlInvocations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterFunctionOperation {
    pub function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "SqlReferences::is_empty")]
    pub references: SqlReferences,
    #[serde(skip_serializing_if = "SqlInvocations::is_empty")]
    pub calls: SqlInvocations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerTiming {
    #[serde(rename = "BEFORE")]
    Before,
    #[serde(rename = "AFTER")]
    After,
    #[serde(rename = "INSTEAD OF")]
    InsteadOf,
}

impl TriggerTiming {
    /// Uppercase, collapse whitespace; anything mentioning INSTEAD is
    /// `INSTEAD OF`. T-SQL `FOR` means `AFTER`.
    pub fn normalize(raw: &str) -> Option<Self> {
        let collapsed = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        if collapsed.contains("INSTEAD") {
            return Some(TriggerTiming::InsteadOf);
        }
        match collapsed.as_str() {
            "BEFORE" => Some(TriggerTiming::Before),
            "AFTER" | "FOR" => Some(TriggerTiming::After),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTriggerOperation {
    pub trigger_name: String,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub or_replace: bool,
    pub timing: TriggerTiming,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(skip_serializing_if = "SqlReferences::is_empty")]
    pub references: SqlReferences,
    #[serde(skip_serializing_if = "SqlInvocations::is_empty")]
    pub calls: SqlInvocations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropObjectType {
    Table,
    View,
    #[serde(rename = "MATERIALIZED VIEW")]
    MaterializedView,
    Index,
    Procedure,
    Function,
    Trigger,
}

impl DropObjectType {
    /// Map the keyword(s) after `DROP`; `PROC` is `PROCEDURE`.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let collapsed = word
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        match collapsed.as_str() {
            "TABLE" => Some(DropObjectType::Table),
            "VIEW" => Some(DropObjectType::View),
            "MATERIALIZED VIEW" => Some(DropObjectType::MaterializedView),
            "INDEX" => Some(DropObjectType::Index),
            "PROCEDURE" | "PROC" => Some(DropObjectType::Procedure),
            "FUNCTION" => Some(DropObjectType::Function),
            "TRIGGER" => Some(DropObjectType::Trigger),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOperation {
    pub object_type: DropObjectType,
    pub object_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub if_exists: bool,
}

macro_rules! impl_has_references_and_calls {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl HasReferencesAndCalls for $ty {
                fn references(&self) -> &SqlReferences {
                    &self.references
                }
                fn calls(&self) -> &SqlInvocations {
                    &self.calls
                }
                fn references_mut(&mut self) -> &mut SqlReferences {
                    &mut self.references
                }
                fn calls_mut(&mut self) -> &mut SqlInvocations {
                    &mut self.calls
                }
            }
        )+
    };
}

impl_has_references_and_calls!(
    CreateProcedureOperation,
    AlterProcedureOperation,
    CreateFunctionOperation,
    AlterFunctionOperation,
    CreateTriggerOperation,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BodyAnalysis;

    #[test]
    fn test_trigger_timing_normalize() {
        assert_eq!(TriggerTiming::normalize("after"), Some(TriggerTiming::After));
        assert_eq!(
            TriggerTiming::normalize("instead   of"),
            Some(TriggerTiming::InsteadOf)
        );
        assert_eq!(TriggerTiming::normalize("FOR"), Some(TriggerTiming::After));
        assert_eq!(TriggerTiming::normalize("during"), None);
    }

    #[test]
    fn test_drop_object_type_from_keyword() {
        assert_eq!(
            DropObjectType::from_keyword("proc"),
            Some(DropObjectType::Procedure)
        );
        assert_eq!(
            DropObjectType::from_keyword("MATERIALIZED  VIEW"),
            Some(DropObjectType::MaterializedView)
        );
        assert_eq!(DropObjectType::from_keyword("SEQUENCE"), None);
    }

    #[test]
    fn test_alter_table_first_action_wins() {
        let mut op = AlterTableOperation::new("t".into(), None);
        op.record(AlterTableOperationType::DropColumn);
        op.record(AlterTableOperationType::AddColumn);
        assert_eq!(op.operation_type, Some(AlterTableOperationType::DropColumn));
    }

    #[test]
    fn test_absorb_through_operation_body() {
        let mut op = Operation::CreateFunction(CreateFunctionOperation {
            function_name: "f".into(),
            ..Default::default()
        });
        let mut analysis = BodyAnalysis::default();
        analysis.relations.insert("orders".into());
        analysis.function_calls.insert("SUM".into());
        if let Some(body) = op.body_mut() {
            body.absorb(analysis);
        }
        let body = op.body().map(|b| (b.references().clone(), b.calls().clone()));
        let (refs, calls) = body.unwrap_or_default();
        assert!(refs.relations.contains("orders"));
        assert!(calls.functions.contains("SUM"));
        assert!(Operation::Drop(DropOperation {
            object_type: DropObjectType::Table,
            object_name: "t".into(),
            schema: None,
            if_exists: false,
        })
        .body()
        .is_none());
    }
}
