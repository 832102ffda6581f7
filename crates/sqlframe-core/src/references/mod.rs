//! Relation and call extraction
//!
//! [`ReferenceCollector`] walks parsed statements with sqlparser's
//! [`Visitor`]. Token streams that no grammar accepts go through
//! [`harvest`] instead, which applies the same classification to raw tokens.

mod harvest;

pub use harvest::{harvest, HarvestRules};

use indexmap::IndexSet;
use sqlparser::ast::{
    Expr, FunctionArguments, ObjectName, Query, Statement, TableFactor, Visit, Visitor,
};
use std::collections::HashSet;
use std::ops::ControlFlow;

use crate::model::BodyAnalysis;
use crate::names;

/// Accumulates relations, function calls and procedure calls
#[derive(Debug, Clone)]
pub struct ReferenceCollector {
    relations: IndexSet<String>,
    functions: IndexSet<String>,
    procedures: IndexSet<String>,
    ctes: HashSet<String>,
    table_functions: HashSet<String>,
    execute_is_call: bool,
}

impl ReferenceCollector {
    pub fn new() -> Self {
        Self {
            relations: IndexSet::new(),
            functions: IndexSet::new(),
            procedures: IndexSet::new(),
            ctes: HashSet::new(),
            table_functions: HashSet::new(),
            execute_is_call: true,
        }
    }

    /// Treat `EXECUTE x` as dynamic SQL rather than a procedure call
    pub fn with_dynamic_execute(mut self) -> Self {
        self.execute_is_call = false;
        self
    }

    pub fn execute_is_call(&self) -> bool {
        self.execute_is_call
    }

    pub fn collect_statement(&mut self, statement: &Statement) {
        let _ = statement.visit(self);
    }

    pub fn collect_query(&mut self, query: &Query) {
        let _ = query.visit(self);
    }

    /// Record a relation; T-SQL variables and bind variables are ignored
    pub fn add_relation(&mut self, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.starts_with('@') || trimmed.starts_with(':') {
            return;
        }
        if let Some(name) = names::normalize_function_name_chain(trimmed) {
            self.relations.insert(name);
        }
    }

    pub fn add_function(&mut self, raw: &str) {
        if let Some(name) = names::normalize_function_name_chain(raw) {
            self.functions.insert(name);
        }
    }

    pub fn add_procedure(&mut self, raw: &str) {
        if raw.trim().starts_with('@') {
            return;
        }
        if let Some(name) = names::normalize_function_name_chain(raw) {
            self.procedures.insert(name);
        }
    }

    pub fn add_cte(&mut self, name: &str) {
        if let Some(name) = names::strip_quotes(name) {
            self.ctes.insert(name.to_lowercase());
        }
    }

    pub fn finish(mut self) -> BodyAnalysis {
        let ctes = &self.ctes;
        let table_functions = &self.table_functions;
        self.relations.retain(|r| {
            let lower = r.to_lowercase();
            !ctes.contains(&lower) && !table_functions.contains(&lower)
        });
        BodyAnalysis {
            relations: self.relations,
            function_calls: self.functions,
            procedure_calls: self.procedures,
        }
    }
}

impl Default for ReferenceCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for ReferenceCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.add_cte(&cte.alias.name.value);
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if let Some(name) = names::object_name(relation) {
            self.add_relation(&name);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        // `FROM generate_series(1, 3)` is a call, not a relation
        if let TableFactor::Table {
            name,
            args: Some(_),
            ..
        } = table_factor
        {
            if let Some(name) = names::object_name(name) {
                self.table_functions.insert(name.to_lowercase());
                self.add_function(&name);
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let Expr::Function(function) = expr {
            if !matches!(function.args, FunctionArguments::None) {
                if let Some(name) = names::object_name(&function.name) {
                    self.add_function(&name);
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        match statement {
            Statement::Insert(insert) => {
                if let Some(name) = names::object_name(&insert.table_name) {
                    self.add_relation(&name);
                }
            }
            Statement::Call(function) => {
                if let Some(name) = names::object_name(&function.name) {
                    self.add_procedure(&name);
                }
            }
            Statement::Execute { name, .. } if self.execute_is_call => {
                // `EXECUTE IMMEDIATE '...'` parses with IMMEDIATE as the name
                let name = name.to_string();
                if !name.eq_ignore_ascii_case("IMMEDIATE") {
                    self.add_procedure(&name);
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    fn analyze(sql: &str) -> BodyAnalysis {
        let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).unwrap();
        let mut collector = ReferenceCollector::new();
        for statement in &statements {
            collector.collect_statement(statement);
        }
        collector.finish()
    }

    fn set(items: &[&str]) -> IndexSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collect_joins_and_subqueries() {
        let result = analyze(
            "SELECT COALESCE(o.total, 0) FROM sales.orders o \
             JOIN customers c ON c.id = o.customer_id \
             WHERE EXISTS (SELECT 1 FROM refunds r WHERE r.order_id = o.id)",
        );
        assert_eq!(result.relations, set(&["sales.orders", "customers", "refunds"]));
        assert_eq!(result.function_calls, set(&["COALESCE"]));
        assert!(result.procedure_calls.is_empty());
    }

    #[test]
    fn test_ctes_are_not_relations() {
        let result = analyze("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent");
        assert_eq!(result.relations, set(&["orders"]));
    }

    #[test]
    fn test_dml_targets_and_calls() {
        let result = analyze(
            "INSERT INTO audit_log (msg) VALUES (lower('x')); \
             UPDATE accounts SET balance = 0; \
             CALL hr.log_access(1)",
        );
        assert_eq!(result.relations, set(&["audit_log", "accounts"]));
        assert_eq!(result.function_calls, set(&["lower"]));
        assert_eq!(result.procedure_calls, set(&["hr.log_access"]));
    }

    #[test]
    fn test_table_function_is_a_call() {
        let result = analyze("SELECT * FROM generate_series(1, 3) g");
        assert!(result.relations.is_empty());
        assert_eq!(result.function_calls, set(&["generate_series"]));
    }

    #[test]
    fn test_add_relation_skips_variables() {
        let mut collector = ReferenceCollector::new();
        collector.add_relation("@orders");
        collector.add_relation(":new");
        collector.add_relation("emp@remote");
        assert_eq!(collector.finish().relations, set(&["emp"]));
    }
}
