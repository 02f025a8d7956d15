//! Query translation from the docgate AST to MongoDB query syntax.
//!
//! This module translates store query expressions, sort keys and projections into
//! MongoDB BSON documents for execution by the MongoDB query engine.

use bson::{Bson, Document, doc};

use docgate_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Translates docgate query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    fn visit_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, DocumentStoreError> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // MongoDB rejects an empty $and; an empty conjunction matches everything.
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        let clauses = self.visit_all(exprs)?;

        Ok(doc! { "$and": clauses })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // An empty disjunction matches nothing.
        if exprs.is_empty() {
            return Ok(doc! { "$nor": [{}] });
        }

        let clauses = self.visit_all(exprs)?;

        Ok(doc! { "$or": clauses })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        let negated = self.visit_expr(expr)?;

        Ok(doc! { "$nor": [negated] })
    }

    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        let as_array = |value: &Bson| match value {
            Bson::Array(values) => values.clone(),
            single => vec![single.clone()],
        };

        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => doc! { "$all": [value] },
                FieldOp::AnyOf => doc! { "$in": as_array(value) },
                FieldOp::NoneOf => doc! { "$nin": as_array(value) },
            }
        })
    }
}

/// Renders sort keys as an ordered `{ field: 1 | -1 }` document.
pub(crate) fn sort_document(sort: &[Sort]) -> Document {
    sort.iter()
        .map(|key| {
            let direction = match key.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            (key.field.clone(), Bson::Int32(direction))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use docgate_core::query::Filter;

    use super::*;

    #[test]
    fn negation_uses_nor() {
        let translated = MongoQueryTranslator
            .visit_expr(&Filter::eq("name", "Ann").not())
            .unwrap();

        assert_eq!(translated, doc! { "$nor": [{ "name": { "$eq": "Ann" } }] });
    }

    #[test]
    fn membership_accepts_scalars() {
        let translated = MongoQueryTranslator
            .visit_expr(&Filter::any_of("kind", "cat"))
            .unwrap();

        assert_eq!(translated, doc! { "kind": { "$in": ["cat"] } });
    }

    #[test]
    fn empty_conjunction_matches_everything() {
        assert_eq!(MongoQueryTranslator.visit_expr(&Expr::And(vec![])).unwrap(), doc! {});
    }

    #[test]
    fn sort_keeps_priority() {
        let sort = [
            Sort { field: "age".into(), direction: SortDirection::Desc },
            Sort { field: "name".into(), direction: SortDirection::Asc },
        ];

        assert_eq!(sort_document(&sort), doc! { "age": -1, "name": 1 });
    }
}
