//! Translation of the generic query shape into the store query AST.
//!
//! Filters use the Mongo-style operator syntax:
//!
//! - `{ field: value }` is equality, `field` may be a dotted path.
//! - `{ field: { $eq | $ne | $gt | $gte | $lt | $lte: value } }` compares.
//! - `{ field: { $in | $nin: [values] } }` tests membership.
//! - `{ field: { $all: [values] } }` requires an array field to hold every value.
//! - `{ field: { $exists: bool } }` tests presence.
//! - `{ field: { $not: { ... } } }` negates an operator document.
//! - `{ $and | $or | $nor: [filters] }` and `{ $not: filter }` combine filters.
//!
//! Any other `$` operator is rejected with [`InterfaceError::InvalidQuery`].

use bson::{Bson, Document};

use crate::{
    error::{InterfaceError, InterfaceResult},
    operation::Query,
    query::{Expr, Filter, Projection, Sort, SortDirection, StoreQuery},
};

/// Translates a generic [`Query`] into a [`StoreQuery`].
pub fn create_query(query: &Query) -> InterfaceResult<StoreQuery> {
    Ok(StoreQuery {
        filter: parse_filter(&query.query)?,
        sort: match &query.sort {
            Some(sort) => parse_sort(sort)?,
            None => Vec::new(),
        },
        offset: query.skip.map(to_usize),
        limit: query.limit.filter(|limit| *limit > 0).map(to_usize),
        projection: match &query.project {
            Some(project) => parse_projection(project)?,
            None => None,
        },
    })
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Parses a filter document. An empty filter matches everything and yields `None`.
pub fn parse_filter(filter: &Document) -> InterfaceResult<Option<Expr>> {
    let mut exprs = Vec::with_capacity(filter.len());

    for (key, value) in filter {
        match key.as_str() {
            "$and" => {
                let clauses = parse_clauses(key, value)?;
                // A clause that matches everything does not narrow the conjunction.
                let clauses: Vec<Expr> = clauses.into_iter().flatten().collect();
                if !clauses.is_empty() {
                    exprs.push(Expr::And(clauses));
                }
            }
            "$or" => {
                let clauses = parse_clauses(key, value)?;
                // A clause that matches everything makes the whole disjunction match everything.
                if let Some(clauses) = clauses.into_iter().collect::<Option<Vec<Expr>>>() {
                    exprs.push(Expr::Or(clauses));
                }
            }
            "$nor" => {
                let clauses = parse_clauses(key, value)?;
                let clauses = match clauses.into_iter().collect::<Option<Vec<Expr>>>() {
                    Some(clauses) => clauses,
                    None => vec![Expr::And(Vec::new())],
                };
                exprs.push(Expr::Or(clauses).not());
            }
            "$not" => match value {
                Bson::Document(inner) => {
                    if let Some(expr) = parse_filter(inner)? {
                        exprs.push(expr.not());
                    }
                }
                other => {
                    return Err(InterfaceError::InvalidQuery(format!(
                        "$not expects a document, got {other}"
                    )));
                }
            },
            operator if operator.starts_with('$') => {
                return Err(InterfaceError::InvalidQuery(format!(
                    "unsupported operator {operator}"
                )));
            }
            field => match value {
                Bson::Document(operators) if is_operator_document(operators) => {
                    exprs.extend(parse_operators(field, operators)?);
                }
                value => exprs.push(Filter::eq(field, value.clone())),
            },
        }
    }

    Ok(match exprs.len() {
        0 => None,
        1 => exprs.pop(),
        _ => Some(Expr::And(exprs)),
    })
}

fn parse_clauses(operator: &str, value: &Bson) -> InterfaceResult<Vec<Option<Expr>>> {
    let Bson::Array(clauses) = value else {
        return Err(InterfaceError::InvalidQuery(format!(
            "{operator} expects an array of filters"
        )));
    };

    if clauses.is_empty() {
        return Err(InterfaceError::InvalidQuery(format!(
            "{operator} expects a non-empty array"
        )));
    }

    clauses
        .iter()
        .map(|clause| match clause {
            Bson::Document(filter) => parse_filter(filter),
            other => Err(InterfaceError::InvalidQuery(format!(
                "{operator} clauses must be documents, got {other}"
            ))),
        })
        .collect()
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn parse_operators(field: &str, operators: &Document) -> InterfaceResult<Vec<Expr>> {
    let mut exprs = Vec::with_capacity(operators.len());

    for (operator, value) in operators {
        let expr = match operator.as_str() {
            "$eq" => Filter::eq(field, value.clone()),
            "$ne" => Filter::ne(field, value.clone()),
            "$gt" => Filter::gt(field, value.clone()),
            "$gte" => Filter::gte(field, value.clone()),
            "$lt" => Filter::lt(field, value.clone()),
            "$lte" => Filter::lte(field, value.clone()),
            "$in" => Filter::any_of(field, expect_array(operator, value)?),
            "$nin" => Filter::none_of(field, expect_array(operator, value)?),
            "$all" => match value {
                Bson::Array(values) => {
                    Filter::and(values.iter().map(|value| Filter::contains(field, value.clone())))
                }
                other => {
                    return Err(InterfaceError::InvalidQuery(format!(
                        "$all expects an array, got {other}"
                    )));
                }
            },
            "$exists" => Expr::Exists(field.to_string(), is_truthy(value)),
            "$not" => match value {
                Bson::Document(inner) if is_operator_document(inner) => {
                    let mut negated = parse_operators(field, inner)?;
                    let inner = if negated.len() == 1 {
                        negated.remove(0)
                    } else {
                        Expr::And(negated)
                    };
                    inner.not()
                }
                other => {
                    return Err(InterfaceError::InvalidQuery(format!(
                        "$not on {field} expects an operator document, got {other}"
                    )));
                }
            },
            other => {
                return Err(InterfaceError::InvalidQuery(format!(
                    "unsupported operator {other} on {field}"
                )));
            }
        };

        exprs.push(expr);
    }

    Ok(exprs)
}

fn expect_array(operator: &str, value: &Bson) -> InterfaceResult<Bson> {
    match value {
        Bson::Array(_) => Ok(value.clone()),
        other => Err(InterfaceError::InvalidQuery(format!(
            "{operator} expects an array, got {other}"
        ))),
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::String(s) => !matches!(s.as_str(), "" | "0" | "false"),
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Parses an ordered `{ field: direction }` document into sort keys.
///
/// Directions may be `1`/`-1` or `asc`/`desc`/`ascending`/`descending`.
pub fn parse_sort(sort: &Document) -> InterfaceResult<Vec<Sort>> {
    sort.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Bson::Int32(n) if *n != 0 => sign_direction(i64::from(*n)),
                Bson::Int64(n) if *n != 0 => sign_direction(*n),
                Bson::Double(n) if *n != 0.0 => {
                    if *n > 0.0 { SortDirection::Asc } else { SortDirection::Desc }
                }
                Bson::String(s) => match s.to_ascii_lowercase().as_str() {
                    "1" | "asc" | "ascending" => SortDirection::Asc,
                    "-1" | "desc" | "descending" => SortDirection::Desc,
                    _ => return Err(invalid_direction(field, direction)),
                },
                _ => return Err(invalid_direction(field, direction)),
            };

            Ok(Sort { field: field.clone(), direction })
        })
        .collect()
}

fn sign_direction(n: i64) -> SortDirection {
    if n > 0 { SortDirection::Asc } else { SortDirection::Desc }
}

fn invalid_direction(field: &str, direction: &Bson) -> InterfaceError {
    InterfaceError::InvalidQuery(format!("invalid sort direction {direction} for {field}"))
}

/// Parses a `{ field: 0|1 }` projection document.
///
/// Inclusion and exclusion cannot be mixed, except for `_id` which may be excluded from an
/// inclusion projection. An empty document yields `None`.
pub fn parse_projection(project: &Document) -> InterfaceResult<Option<Projection>> {
    if project.is_empty() {
        return Ok(None);
    }

    let mut included = Vec::new();
    let mut excluded = Vec::new();
    let mut id = None;

    for (field, flag) in project {
        let keep = match flag {
            Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => is_truthy(flag),
            Bson::String(s) if matches!(s.as_str(), "0" | "1" | "true" | "false") => {
                is_truthy(flag)
            }
            other => {
                return Err(InterfaceError::InvalidQuery(format!(
                    "invalid projection flag {other} for {field}"
                )));
            }
        };

        if field == "_id" {
            id = Some(keep);
        } else if keep {
            included.push(field.clone());
        } else {
            excluded.push(field.clone());
        }
    }

    if !included.is_empty() && !excluded.is_empty() {
        return Err(InterfaceError::InvalidQuery(
            "projection cannot mix inclusion and exclusion".into(),
        ));
    }

    Ok(Some(match (included.is_empty(), id) {
        (false, id) => Projection::Include { fields: included, id: id.unwrap_or(true) },
        (true, Some(true)) if excluded.is_empty() => {
            Projection::Include { fields: included, id: true }
        }
        (true, id) => {
            if id == Some(false) {
                excluded.insert(0, "_id".to_string());
            }
            Projection::Exclude(excluded)
        }
    }))
}

/// Collects the plain equality constraints of a filter as field values.
///
/// Used to seed the document created by an upsert. Operators other than `$eq` and `$and` are
/// ignored.
pub fn equality_constraints(filter: &Document) -> Document {
    let mut seed = Document::new();

    for (key, value) in filter {
        match (key.as_str(), value) {
            ("$and", Bson::Array(clauses)) => {
                for clause in clauses {
                    if let Bson::Document(clause) = clause {
                        for (field, value) in equality_constraints(clause) {
                            seed.insert(field, value);
                        }
                    }
                }
            }
            (operator, _) if operator.starts_with('$') => {}
            (field, Bson::Document(operators)) if is_operator_document(operators) => {
                if let Some(value) = operators.get("$eq") {
                    seed.insert(field, value.clone());
                }
            }
            (field, value) => {
                seed.insert(field, value.clone());
            }
        }
    }

    seed
}
