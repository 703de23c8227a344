//! Turns bound statements into logical operator DAGs.

pub mod operator;
pub mod plan_copy;

use crate::binder::BoundStatement;
use crate::error::Result;

pub use operator::{CopyFromTarget, LogicalOperator, LogicalPlan, PlannedStatement};

pub fn plan_statement(statement: BoundStatement) -> Result<PlannedStatement> {
    match statement {
        BoundStatement::CreateTable(info) => Ok(PlannedStatement::Plan(LogicalPlan::new(
            LogicalOperator::CreateTable(info),
        ))),
        BoundStatement::DropTable(info) => Ok(PlannedStatement::Plan(LogicalPlan::new(
            LogicalOperator::DropTable(info),
        ))),
        BoundStatement::Alter(info) => Ok(PlannedStatement::Plan(LogicalPlan::new(
            LogicalOperator::Alter(info),
        ))),
        BoundStatement::CopyFrom(info) => plan_copy::plan_copy_from(info),
        BoundStatement::CopyTo(info) => plan_copy::plan_copy_to(info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast;
    use crate::binder::Binder;
    use crate::catalog::CatalogContent;
    use crate::types::LogicalType;
    use std::sync::Arc;

    fn catalog_with_person_and_knows() -> Arc<CatalogContent> {
        let mut content = CatalogContent::new();
        let person = content
            .add_node_table(
                "Person",
                0,
                vec![
                    ("id".to_string(), LogicalType::Int64),
                    ("name".to_string(), LogicalType::String),
                ],
            )
            .unwrap();
        content
            .add_rel_table(
                "Knows",
                crate::catalog::RelMultiplicity::ManyMany,
                person,
                person,
                vec![("since".to_string(), LogicalType::Int64)],
            )
            .unwrap();
        content.add_rdf_graph("G").unwrap();
        Arc::new(content)
    }

    fn plan_copy_stmt(table: &str, path: &str) -> PlannedStatement {
        let catalog = catalog_with_person_and_knows();
        let binder = Binder::new(catalog);
        let bound = binder
            .bind(&ast::Statement::CopyFrom(ast::CopyFromClause {
                table_name: table.to_string(),
                source: ast::CopySource::Files(vec![path.to_string()]),
                parsing_options: vec![],
                by_column: false,
            }))
            .unwrap();
        plan_statement(bound).unwrap()
    }

    #[test]
    fn node_copy_plans_scan_projection_writer() {
        let PlannedStatement::Plan(plan) = plan_copy_stmt("Person", "people.csv") else {
            panic!("expected a single plan");
        };
        let LogicalOperator::CopyFrom { child, info } = plan.root else {
            panic!("expected CopyFrom at the root");
        };
        assert!(matches!(info, CopyFromTarget::Node { .. }));
        let LogicalOperator::Projection { child, exprs } = *child else {
            panic!("expected Projection under the writer");
        };
        assert_eq!(exprs.len(), 2);
        assert!(matches!(*child, LogicalOperator::ScanSource { .. }));
    }

    #[test]
    fn rel_copy_plans_lookup_and_partitioner() {
        let PlannedStatement::Plan(plan) = plan_copy_stmt("Knows", "knows.csv") else {
            panic!("expected a single plan");
        };
        let LogicalOperator::CopyFrom { child, info } = plan.root else {
            panic!("expected CopyFrom at the root");
        };
        assert!(matches!(info, CopyFromTarget::Rel { .. }));
        let LogicalOperator::Partition { child, .. } = *child else {
            panic!("expected Partition under the writer");
        };
        let LogicalOperator::IndexLookup { child, .. } = *child else {
            panic!("expected IndexLookup under the partitioner");
        };
        assert!(matches!(*child, LogicalOperator::ScanSource { .. }));
    }

    #[test]
    fn rdf_graph_copy_plans_four_in_order() {
        let PlannedStatement::RdfGraphCopy(plans) = plan_copy_stmt("G", "g.ttl") else {
            panic!("expected the four-plan form");
        };
        assert_eq!(plans.len(), 4);
        // The resource plan deduplicates its scan.
        let LogicalOperator::CopyFrom { child, .. } = &plans[0].root else {
            panic!("expected CopyFrom at the root");
        };
        assert!(matches!(**child, LogicalOperator::Distinct { .. }));
        // The literal plan does not.
        let LogicalOperator::CopyFrom { child, .. } = &plans[1].root else {
            panic!("expected CopyFrom at the root");
        };
        assert!(matches!(**child, LogicalOperator::ScanSource { .. }));
        // Triple plans partition without a separate lookup operator.
        for plan in &plans[2..] {
            let LogicalOperator::CopyFrom { child, .. } = &plan.root else {
                panic!("expected CopyFrom at the root");
            };
            assert!(matches!(**child, LogicalOperator::Partition { .. }));
        }
    }
}
