use serde::Serialize;

use super::{
    AlterFunctionOperation, AlterProcedureOperation, AlterTableOperation, AlterViewOperation,
    BodyAnalysis, CreateFunctionOperation, CreateIndexOperation, CreateProcedureOperation,
    CreateTableOperation, CreateTriggerOperation, CreateViewOperation, DropOperation, Operation,
    SqlInvocations, SqlReferences,
};

/// Everything extracted from one SQL file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlFileAnalysis {
    pub file_path: String,
    pub language: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub create_tables: Vec<CreateTableOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alter_tables: Vec<AlterTableOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub create_views: Vec<CreateViewOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alter_views: Vec<AlterViewOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub create_indexes: Vec<CreateIndexOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub create_procedures: Vec<CreateProcedureOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alter_procedures: Vec<AlterProcedureOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub create_functions: Vec<CreateFunctionOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alter_functions: Vec<AlterFunctionOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub create_triggers: Vec<CreateTriggerOperation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drop_operations: Vec<DropOperation>,
    #[serde(skip_serializing_if = "SqlReferences::is_empty")]
    pub top_level_references: SqlReferences,
    #[serde(skip_serializing_if = "SqlInvocations::is_empty")]
    pub top_level_calls: SqlInvocations,
}

impl SqlFileAnalysis {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language: "sql".to_string(),
            create_tables: Vec::new(),
            alter_tables: Vec::new(),
            create_views: Vec::new(),
            alter_views: Vec::new(),
            create_indexes: Vec::new(),
            create_procedures: Vec::new(),
            alter_procedures: Vec::new(),
            create_functions: Vec::new(),
            alter_functions: Vec::new(),
            create_triggers: Vec::new(),
            drop_operations: Vec::new(),
            top_level_references: SqlReferences::default(),
            top_level_calls: SqlInvocations::default(),
        }
    }

    /// Append an operation to the list for its kind
    pub fn push(&mut self, operation: Operation) {
        match operation {
            Operation::CreateTable(op) => self.create_tables.push(op),
            Operation::AlterTable(op) => self.alter_tables.push(op),
            Operation::CreateView(op) => self.create_views.push(op),
            Operation::AlterView(op) => self.alter_views.push(op),
            Operation::CreateIndex(op) => self.create_indexes.push(op),
            Operation::CreateProcedure(op) => self.create_procedures.push(op),
            Operation::AlterProcedure(op) => self.alter_procedures.push(op),
            Operation::CreateFunction(op) => self.create_functions.push(op),
            Operation::AlterFunction(op) => self.alter_functions.push(op),
            Operation::CreateTrigger(op) => self.create_triggers.push(op),
            Operation::Drop(op) => self.drop_operations.push(op),
        }
    }

    /// Merge a standalone statement's references and calls
    pub fn add_top_level(&mut self, analysis: BodyAnalysis) {
        analysis.apply_to(&mut self.top_level_references, &mut self.top_level_calls);
    }

    /// Total number of operations across all lists
    pub fn operation_count(&self) -> usize {
        self.create_tables.len()
            + self.alter_tables.len()
            + self.create_views.len()
            + self.alter_views.len()
            + self.create_indexes.len()
            + self.create_procedures.len()
            + self.alter_procedures.len()
            + self.create_functions.len()
            + self.alter_functions.len()
            + self.create_triggers.len()
            + self.drop_operations.len()
    }

    /// Drop column listings from table operations. Primary and foreign keys
    /// are kept.
    pub fn hide_table_columns(&mut self) {
        for table in &mut self.create_tables {
            table.columns.clear();
        }
        for alter in &mut self.alter_tables {
            alter.added_columns.clear();
        }
    }
}
