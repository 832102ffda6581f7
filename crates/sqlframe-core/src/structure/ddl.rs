//! Parsed DDL statements to operations

use sqlparser::ast::{
    AlterTableOperation as AstAlterOperation, ColumnDef, ColumnOption, CreateIndex, CreateTable,
    Expr, ObjectName, Query, ReferentialAction, Statement, TableConstraint,
};

use super::fallback::source_column_types;
use crate::model::{
    AlterTableOperation, AlterTableOperationType, AlterViewOperation, ColumnDefinition,
    CreateIndexOperation, CreateTableOperation, CreateViewOperation, DropObjectType,
    DropOperation, ForeignKeyDefinition, Operation, SqlReferences, COLUMN_CONSTRAINT_ORDER,
};
use crate::names;
use crate::references::ReferenceCollector;

/// Convert a parsed DDL statement. Statements with no structural meaning
/// here yield nothing.
///
/// Column types keep their spelling from `source`, the statement text.
pub fn convert_statement(statement: &Statement, source: &str) -> Vec<Operation> {
    let mut operations = convert(statement);
    if !matches!(statement, Statement::CreateTable(_) | Statement::AlterTable { .. }) {
        return operations;
    }
    let types = source_column_types(source);
    for operation in &mut operations {
        let columns = match operation {
            Operation::CreateTable(table) => &mut table.columns,
            Operation::AlterTable(alter) => &mut alter.added_columns,
            _ => continue,
        };
        for column in columns.iter_mut() {
            let spelled = types
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&column.name));
            if let Some((_, ty)) = spelled {
                column.data_type = Some(ty.clone());
            }
        }
    }
    operations
}

fn convert(statement: &Statement) -> Vec<Operation> {
    match statement {
        Statement::CreateTable(create) => convert_create_table(create)
            .map(Operation::CreateTable)
            .into_iter()
            .collect(),
        Statement::AlterTable {
            name, operations, ..
        } => convert_alter_table(name, operations)
            .map(Operation::AlterTable)
            .into_iter()
            .collect(),
        Statement::CreateView {
            or_replace,
            name,
            query,
            ..
        } => names::object_schema_and_name(name)
            .map(|(schema, view_name)| {
                Operation::CreateView(CreateViewOperation {
                    view_name,
                    schema,
                    or_replace: *or_replace,
                    references: query_references(query),
                })
            })
            .into_iter()
            .collect(),
        Statement::AlterView { name, query, .. } => names::object_schema_and_name(name)
            .map(|(schema, view_name)| {
                Operation::AlterView(AlterViewOperation {
                    view_name,
                    schema,
                    references: query_references(query),
                })
            })
            .into_iter()
            .collect(),
        Statement::CreateIndex(index) => convert_create_index(index)
            .map(Operation::CreateIndex)
            .into_iter()
            .collect(),
        Statement::Drop {
            object_type,
            if_exists,
            names: dropped,
            ..
        } => match DropObjectType::from_keyword(&object_type.to_string()) {
            Some(kind) => drops(kind, *if_exists, dropped.iter()),
            None => Vec::new(),
        },
        Statement::DropFunction {
            if_exists,
            func_desc,
            ..
        } => drops(
            DropObjectType::Function,
            *if_exists,
            func_desc.iter().map(|desc| &desc.name),
        ),
        Statement::DropProcedure {
            if_exists,
            proc_desc,
            ..
        } => drops(
            DropObjectType::Procedure,
            *if_exists,
            proc_desc.iter().map(|desc| &desc.name),
        ),
        Statement::DropTrigger {
            if_exists,
            trigger_name,
            ..
        } => drops(
            DropObjectType::Trigger,
            *if_exists,
            std::iter::once(trigger_name),
        ),
        _ => Vec::new(),
    }
}

fn convert_create_table(create: &CreateTable) -> Option<CreateTableOperation> {
    let (schema, table_name) = names::object_schema_and_name(&create.name)?;
    let mut table = CreateTableOperation {
        table_name,
        schema,
        if_not_exists: create.if_not_exists,
        ..Default::default()
    };

    for column in &create.columns {
        let (definition, foreign_key) = convert_column(column);
        if definition.constraints.iter().any(|c| c == "PRIMARY KEY") {
            push_unique(&mut table.primary_keys, &definition.name);
        }
        table.foreign_keys.extend(foreign_key);
        table.columns.push(definition);
    }

    for constraint in &create.constraints {
        match constraint {
            TableConstraint::PrimaryKey { columns, .. } => {
                for column in columns.iter().filter_map(names::ident_value) {
                    label_column(&mut table.columns, &column, "PRIMARY KEY");
                    push_unique(&mut table.primary_keys, &column);
                }
            }
            TableConstraint::ForeignKey {
                name,
                columns,
                foreign_table,
                referred_columns,
                on_delete,
                on_update,
                ..
            } => {
                let columns: Vec<String> = columns.iter().filter_map(names::ident_value).collect();
                for column in &columns {
                    label_column(&mut table.columns, column, "FOREIGN KEY");
                }
                table.foreign_keys.push(ForeignKeyDefinition {
                    name: name.as_ref().and_then(names::ident_value),
                    columns,
                    referenced_table: names::object_name(foreign_table).unwrap_or_default(),
                    referenced_columns: referred_columns
                        .iter()
                        .filter_map(names::ident_value)
                        .collect(),
                    on_delete: on_delete.as_ref().map(action),
                    on_update: on_update.as_ref().map(action),
                });
            }
            TableConstraint::Unique { columns, .. } => {
                if let [column] = columns.as_slice() {
                    if let Some(column) = names::ident_value(column) {
                        label_column(&mut table.columns, &column, "UNIQUE");
                    }
                }
            }
            _ => {}
        }
    }
    Some(table)
}

/// A column and, for an inline `REFERENCES`, its foreign key
fn convert_column(column: &ColumnDef) -> (ColumnDefinition, Option<ForeignKeyDefinition>) {
    let name = names::ident_value(&column.name).unwrap_or_default();
    let mut definition = ColumnDefinition::new(
        name.clone(),
        names::normalize_type_format(&column.data_type.to_string()),
    );
    let mut foreign_key = None;

    for option in &column.options {
        match &option.option {
            ColumnOption::NotNull => {
                definition.nullable = false;
                add_label(&mut definition, "NOT NULL");
            }
            ColumnOption::Unique { is_primary, .. } => {
                // inline PRIMARY KEY leaves nullability alone
                add_label(&mut definition, if *is_primary { "PRIMARY KEY" } else { "UNIQUE" });
            }
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                on_delete,
                on_update,
                ..
            } => {
                add_label(&mut definition, "FOREIGN KEY");
                foreign_key = Some(ForeignKeyDefinition {
                    name: option.name.as_ref().and_then(names::ident_value),
                    columns: vec![name.clone()],
                    referenced_table: names::object_name(foreign_table).unwrap_or_default(),
                    referenced_columns: referred_columns
                        .iter()
                        .filter_map(names::ident_value)
                        .collect(),
                    on_delete: on_delete.as_ref().map(action),
                    on_update: on_update.as_ref().map(action),
                });
            }
            _ => {}
        }
    }
    (definition, foreign_key)
}

fn convert_alter_table(
    name: &ObjectName,
    operations: &[AstAlterOperation],
) -> Option<AlterTableOperation> {
    let (schema, table_name) = names::object_schema_and_name(name)?;
    let mut alter = AlterTableOperation::new(table_name, schema);

    for operation in operations {
        match operation {
            AstAlterOperation::AddColumn { column_def, .. } => {
                let (column, _) = convert_column(column_def);
                alter.added_columns.push(column);
                alter.record(AlterTableOperationType::AddColumn);
            }
            AstAlterOperation::DropColumn { column_name, .. } => {
                if let Some(column) = names::ident_value(column_name) {
                    alter.dropped_columns.push(column);
                    alter.record(AlterTableOperationType::DropColumn);
                }
            }
            AstAlterOperation::AddConstraint(constraint) => {
                if let Some(text) = names::normalize_type_format(&constraint.to_string()) {
                    alter.added_constraints.push(text);
                    alter.record(AlterTableOperationType::AddConstraint);
                }
            }
            AstAlterOperation::DropConstraint { name, .. } => {
                if let Some(constraint) = names::ident_value(name) {
                    alter.dropped_constraints.push(constraint);
                    alter.record(AlterTableOperationType::DropConstraint);
                }
            }
            AstAlterOperation::DropPrimaryKey => {
                alter.dropped_constraints.push("PRIMARY KEY".to_string());
                alter.record(AlterTableOperationType::DropConstraint);
            }
            _ => {}
        }
    }

    // renames, defaults and other actions leave nothing to report
    let touched = alter.operation_type.is_some();
    touched.then_some(alter)
}

fn convert_create_index(index: &CreateIndex) -> Option<CreateIndexOperation> {
    let (schema, table_name) = names::object_schema_and_name(&index.table_name)?;
    let index_name = index
        .name
        .as_ref()
        .and_then(names::object_schema_and_name)
        .map(|(_, name)| name);
    let columns = index
        .columns
        .iter()
        .filter_map(|column| match &column.expr {
            Expr::Identifier(ident) => names::ident_value(ident),
            Expr::CompoundIdentifier(parts) => parts.last().and_then(names::ident_value),
            other => names::normalize_type_format(&other.to_string()),
        })
        .collect();
    Some(CreateIndexOperation {
        index_name,
        table_name,
        schema,
        unique: index.unique,
        columns,
    })
}

fn drops<'n>(
    object_type: DropObjectType,
    if_exists: bool,
    dropped: impl Iterator<Item = &'n ObjectName>,
) -> Vec<Operation> {
    dropped
        .filter_map(names::object_schema_and_name)
        .map(|(schema, object_name)| {
            Operation::Drop(DropOperation {
                object_type,
                object_name,
                schema,
                if_exists,
            })
        })
        .collect()
}

fn query_references(query: &Query) -> SqlReferences {
    let mut collector = ReferenceCollector::new();
    collector.collect_query(query);
    SqlReferences {
        relations: collector.finish().relations,
    }
}

fn action(action: &ReferentialAction) -> String {
    action.to_string()
}

/// Add a constraint label, keeping the fixed label order
pub(crate) fn add_label(column: &mut ColumnDefinition, label: &str) {
    if column.constraints.iter().any(|c| c == label) {
        return;
    }
    column.constraints.push(label.to_string());
    column.constraints.sort_by_key(|c| {
        COLUMN_CONSTRAINT_ORDER
            .iter()
            .position(|known| known == c)
            .unwrap_or(COLUMN_CONSTRAINT_ORDER.len())
    });
}

pub(crate) fn label_column(columns: &mut [ColumnDefinition], name: &str, label: &str) {
    if let Some(column) = columns
        .iter_mut()
        .find(|c| c.name.eq_ignore_ascii_case(name))
    {
        add_label(column, label);
    }
}

pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    fn convert(sql: &str) -> Vec<Operation> {
        let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).unwrap();
        statements
            .iter()
            .flat_map(|statement| convert_statement(statement, sql))
            .collect()
    }

    fn single_table(sql: &str) -> CreateTableOperation {
        match convert(sql).pop() {
            Some(Operation::CreateTable(table)) => table,
            other => panic!("expected a table, got {other:?}"),
        }
    }

    #[test]
    fn test_create_table_inline_constraints() {
        let table = single_table(
            "CREATE TABLE users (id INT PRIMARY KEY, email VARCHAR(255) UNIQUE NOT NULL)",
        );
        assert_eq!(table.table_name, "users");
        assert_eq!(table.primary_keys, vec!["id"]);

        let id = &table.columns[0];
        assert_eq!(id.data_type.as_deref(), Some("INT"));
        assert!(id.nullable);
        assert_eq!(id.constraints, vec!["PRIMARY KEY"]);

        let email = &table.columns[1];
        assert_eq!(email.data_type.as_deref(), Some("VARCHAR(255)"));
        assert!(!email.nullable);
        assert_eq!(email.constraints, vec!["NOT NULL", "UNIQUE"]);
    }

    #[test]
    fn test_create_table_level_constraints() {
        let table = single_table(
            "CREATE TABLE IF NOT EXISTS sales.order_items (
                order_id INT NOT NULL,
                line_no INT NOT NULL,
                sku TEXT,
                price DECIMAL ( 12 , 2 ),
                PRIMARY KEY (order_id, line_no),
                CONSTRAINT fk_order FOREIGN KEY (order_id) REFERENCES sales.orders (id) ON DELETE CASCADE,
                UNIQUE (sku)
            )",
        );
        assert!(table.if_not_exists);
        assert_eq!(table.schema.as_deref(), Some("sales"));
        assert_eq!(table.primary_keys, vec!["order_id", "line_no"]);
        assert_eq!(table.columns[0].constraints, vec!["NOT NULL", "PRIMARY KEY", "FOREIGN KEY"]);
        assert_eq!(table.columns[2].constraints, vec!["UNIQUE"]);
        assert_eq!(table.columns[3].data_type.as_deref(), Some("DECIMAL(12,2)"));

        let fk = &table.foreign_keys[0];
        assert_eq!(fk.name.as_deref(), Some("fk_order"));
        assert_eq!(fk.columns, vec!["order_id"]);
        assert_eq!(fk.referenced_table, "sales.orders");
        assert_eq!(fk.referenced_columns, vec!["id"]);
        assert_eq!(fk.on_delete.as_deref(), Some("CASCADE"));
        assert_eq!(fk.on_update, None);
    }

    #[test]
    fn test_column_types_keep_source_spelling() {
        let table =
            single_table("CREATE TABLE t (a integer, b int4 NOT NULL, c text, d numeric (8, 2))");
        let types: Vec<_> = table
            .columns
            .iter()
            .map(|c| c.data_type.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(types, vec!["integer", "int4", "text", "numeric(8,2)"]);

        let ops = convert("ALTER TABLE t ADD COLUMN e bigint");
        let [Operation::AlterTable(alter)] = ops.as_slice() else {
            panic!("expected one alter table");
        };
        assert_eq!(alter.added_columns[0].data_type.as_deref(), Some("bigint"));
    }

    #[test]
    fn test_inline_references() {
        let table = single_table("CREATE TABLE a (b_id INT REFERENCES b(id))");
        assert_eq!(table.columns[0].constraints, vec!["FOREIGN KEY"]);
        assert_eq!(table.foreign_keys[0].columns, vec!["b_id"]);
        assert_eq!(table.foreign_keys[0].referenced_table, "b");
    }

    #[test]
    fn test_alter_table_actions() {
        let ops = convert(
            "ALTER TABLE public.users DROP COLUMN legacy, ADD COLUMN age INT NOT NULL, DROP CONSTRAINT users_email_key",
        );
        let [Operation::AlterTable(alter)] = ops.as_slice() else {
            panic!("expected one alter table");
        };
        assert_eq!(alter.schema.as_deref(), Some("public"));
        assert_eq!(alter.operation_type, Some(AlterTableOperationType::DropColumn));
        assert_eq!(alter.dropped_columns, vec!["legacy"]);
        assert_eq!(alter.added_columns[0].name, "age");
        assert!(!alter.added_columns[0].nullable);
        assert_eq!(alter.dropped_constraints, vec!["users_email_key"]);
    }

    #[test]
    fn test_alter_table_add_constraint() {
        let ops = convert(
            "ALTER TABLE orders ADD CONSTRAINT fk_user FOREIGN KEY (user_id) REFERENCES users(id)",
        );
        let [Operation::AlterTable(alter)] = ops.as_slice() else {
            panic!("expected one alter table");
        };
        assert_eq!(alter.operation_type, Some(AlterTableOperationType::AddConstraint));
        assert!(alter.added_constraints[0].contains("FOREIGN KEY(user_id)"));
        assert!(alter.added_constraints[0].contains("REFERENCES users(id)"));
    }

    #[test]
    fn test_alter_table_rename_is_dropped() {
        assert!(convert("ALTER TABLE a RENAME TO b").is_empty());
    }

    #[test]
    fn test_views_and_indexes() {
        let ops = convert(
            "CREATE OR REPLACE VIEW v_active AS SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id;
             CREATE UNIQUE INDEX ix_users_email ON public.users (email, lower(name))",
        );
        let Operation::CreateView(view) = &ops[0] else {
            panic!("expected a view");
        };
        assert!(view.or_replace);
        assert_eq!(
            view.references.relations.iter().collect::<Vec<_>>(),
            vec!["users", "orders"]
        );

        let Operation::CreateIndex(index) = &ops[1] else {
            panic!("expected an index");
        };
        assert_eq!(index.index_name.as_deref(), Some("ix_users_email"));
        assert_eq!(index.schema.as_deref(), Some("public"));
        assert!(index.unique);
        assert_eq!(index.columns, vec!["email", "lower(name)"]);
    }

    #[test]
    fn test_drops() {
        let ops = convert(
            "DROP TABLE IF EXISTS a, s.b; DROP VIEW v; DROP INDEX ix; DROP FUNCTION IF EXISTS f(int)",
        );
        let drops: Vec<_> = ops
            .iter()
            .map(|op| match op {
                Operation::Drop(d) => (d.object_type, d.object_name.as_str(), d.if_exists),
                other => panic!("expected a drop, got {other:?}"),
            })
            .collect();
        assert_eq!(
            drops,
            vec![
                (DropObjectType::Table, "a", true),
                (DropObjectType::Table, "b", true),
                (DropObjectType::View, "v", false),
                (DropObjectType::Index, "ix", false),
                (DropObjectType::Function, "f", true),
            ]
        );
    }

    #[test]
    fn test_add_label_keeps_order() {
        let mut column = ColumnDefinition::new("c", None);
        add_label(&mut column, "FOREIGN KEY");
        add_label(&mut column, "UNIQUE");
        add_label(&mut column, "NOT NULL");
        add_label(&mut column, "UNIQUE");
        assert_eq!(column.constraints, vec!["NOT NULL", "UNIQUE", "FOREIGN KEY"]);
    }
}
