//! Compilation of normalized requests into parameterized SQL plans
//!
//! Every user-supplied value is bound as a parameter; identifiers are
//! quoted through [`quote_ident`]. Each plan carries a companion COUNT
//! query sharing the same predicates, so the response can report the
//! total matching rows alongside the page.

use tabula_core::{ColumnType, Result, TableSchema, TabulaError, Value};
use tabula_sqlite::quote_ident;

use crate::filter::{FilterOperator, FilterValue, ParsedFilter};
use crate::request::NormalizedRequest;

/// Engine capabilities the compiler plans against
#[derive(Debug, Clone, Copy)]
pub struct CompilerOptions {
    /// Whether the connection has a REGEXP function registered. Without
    /// it, regex filters degrade to substring matching.
    pub supports_regex: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            supports_regex: true,
        }
    }
}

/// A compiled, parameterized query ready for execution
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub sql: String,
    pub params: Vec<Value>,
    /// Companion COUNT over the same predicates, without pagination
    pub count_sql: String,
    pub count_params: Vec<Value>,
    /// Output column labels, in projection order
    pub headers: Vec<String>,
    /// Result columns holding a variance that the executor must take the
    /// square root of (STDDEV is compiled as a variance expression)
    pub sqrt_columns: Vec<usize>,
    pub is_aggregate: bool,
}

/// Compile a normalized request against its table schema.
#[tracing::instrument(skip_all, fields(table = %request.table, aggregate = !(request.aggregations.is_empty() && request.group_by.is_empty())))]
pub fn compile(
    request: &NormalizedRequest,
    schema: &TableSchema,
    options: CompilerOptions,
) -> Result<QueryPlan> {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut where_params: Vec<Value> = Vec::new();

    for (column, filter) in &request.filters {
        let column_type = schema
            .column(column)
            .map(|c| c.column_type)
            .unwrap_or(ColumnType::Text);
        let clause = compile_filter(column, column_type, filter, options, &mut where_params)?;
        where_clauses.push(clause);
    }

    if let Some(term) = &request.search {
        if let Some(clause) = compile_search(term, schema, &mut where_params) {
            where_clauses.push(clause);
        }
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_clauses.join(" AND "))
    };

    // A bare group_by still takes the aggregate path: one row per
    // group, with the grouped columns as the projection.
    if request.aggregations.is_empty() && request.group_by.is_empty() {
        compile_rows(request, schema, where_sql, where_params)
    } else {
        compile_aggregate(request, where_sql, where_params)
    }
}

fn compile_rows(
    request: &NormalizedRequest,
    schema: &TableSchema,
    where_sql: String,
    where_params: Vec<Value>,
) -> Result<QueryPlan> {
    let projection = request
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let table = quote_ident(&request.table);

    let order_sql = order_by(request, schema);

    let sql = format!(
        "SELECT {} FROM {}{}{} LIMIT ? OFFSET ?",
        projection, table, where_sql, order_sql
    );
    let mut params = where_params.clone();
    params.push(Value::Integer(i64::from(request.limit)));
    params.push(Value::Integer(offset_param(request.offset)));

    let count_sql = format!("SELECT COUNT(*) FROM {}{}", table, where_sql);

    Ok(QueryPlan {
        sql,
        params,
        count_sql,
        count_params: where_params,
        headers: request.columns.clone(),
        sqrt_columns: Vec::new(),
        is_aggregate: false,
    })
}

/// Deterministic ordering: the requested sort first, then the primary
/// key (or rowid) as a tiebreak so pagination never sees a row twice.
fn order_by(request: &NormalizedRequest, schema: &TableSchema) -> String {
    let mut terms: Vec<String> = Vec::new();

    if let Some((column, direction)) = &request.sort {
        terms.push(format!("{} {}", quote_ident(column), direction.as_sql()));
    }

    let pk = schema.primary_key();
    if pk.is_empty() {
        terms.push("rowid ASC".to_string());
    } else {
        for key in pk {
            if request.sort.as_ref().is_none_or(|(c, _)| c != key) {
                terms.push(format!("{} ASC", quote_ident(key)));
            }
        }
    }

    if terms.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", terms.join(", "))
    }
}

fn compile_aggregate(
    request: &NormalizedRequest,
    where_sql: String,
    where_params: Vec<Value>,
) -> Result<QueryPlan> {
    use crate::request::AggregateFunction;

    let mut select_terms: Vec<String> = Vec::new();
    let mut headers: Vec<String> = Vec::new();
    let mut sqrt_columns: Vec<usize> = Vec::new();

    for column in &request.group_by {
        select_terms.push(quote_ident(column));
        headers.push(column.clone());
    }

    for agg in &request.aggregations {
        let label = if agg.column == "*" {
            format!("{}_all", agg.function.label())
        } else {
            format!("{}_{}", agg.function.label(), agg.column)
        };
        let quoted = quote_ident(&agg.column);
        let expr = match agg.function {
            AggregateFunction::Count if agg.column == "*" => "COUNT(*)".to_string(),
            AggregateFunction::Count => format!("COUNT({})", quoted),
            AggregateFunction::Sum => format!("SUM({})", quoted),
            AggregateFunction::Avg => format!("AVG({})", quoted),
            AggregateFunction::Min => format!("MIN({})", quoted),
            AggregateFunction::Max => format!("MAX({})", quoted),
            AggregateFunction::DistinctCount => format!("COUNT(DISTINCT {})", quoted),
            // Population variance; STDDEV additionally gets a square
            // root applied by the executor.
            AggregateFunction::Variance | AggregateFunction::Stddev => {
                if agg.column == "*" {
                    return Err(TabulaError::Validation(
                        "aggregations: VARIANCE and STDDEV require a column".into(),
                    ));
                }
                format!("(AVG({q} * {q}) - AVG({q}) * AVG({q}))", q = quoted)
            }
        };
        if agg.function == AggregateFunction::Stddev {
            sqrt_columns.push(headers.len());
        }
        select_terms.push(format!("{} AS {}", expr, quote_ident(&label)));
        headers.push(label);
    }

    let table = quote_ident(&request.table);
    let group_sql = if request.group_by.is_empty() {
        String::new()
    } else {
        let cols = request
            .group_by
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" GROUP BY {}", cols)
    };
    let order_sql = if request.group_by.is_empty() {
        String::new()
    } else {
        let cols = request
            .group_by
            .iter()
            .map(|c| format!("{} ASC", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" ORDER BY {}", cols)
    };

    let body = format!(
        "SELECT {} FROM {}{}{}",
        select_terms.join(", "),
        table,
        where_sql,
        group_sql
    );

    let sql = format!("{}{} LIMIT ? OFFSET ?", body, order_sql);
    let mut params = where_params.clone();
    params.push(Value::Integer(i64::from(request.limit)));
    params.push(Value::Integer(offset_param(request.offset)));

    // Groups are the unit being paginated, so the total counts groups.
    let count_sql = format!("SELECT COUNT(*) FROM ({})", body);

    Ok(QueryPlan {
        sql,
        params,
        count_sql,
        count_params: where_params,
        headers,
        sqrt_columns,
        is_aggregate: true,
    })
}

/// Translate one parsed filter to a SQL predicate, pushing its operands
/// onto the parameter list.
fn compile_filter(
    column: &str,
    column_type: ColumnType,
    filter: &ParsedFilter,
    options: CompilerOptions,
    params: &mut Vec<Value>,
) -> Result<String> {
    let quoted = quote_ident(column);

    let clause = match (&filter.operator, &filter.value) {
        (FilterOperator::IsNull, _) => format!("{} IS NULL", quoted),
        (FilterOperator::IsNotNull, _) => format!("{} IS NOT NULL", quoted),

        (FilterOperator::Eq, FilterValue::One(v)) => {
            params.push(bind_value(v, column_type));
            format!("{} = ?", quoted)
        }
        (FilterOperator::Ne, FilterValue::One(v)) => {
            params.push(bind_value(v, column_type));
            format!("{} <> ?", quoted)
        }
        (FilterOperator::Gt, FilterValue::One(v)) => {
            params.push(bind_value(v, column_type));
            format!("{} > ?", quoted)
        }
        (FilterOperator::Gte, FilterValue::One(v)) => {
            params.push(bind_value(v, column_type));
            format!("{} >= ?", quoted)
        }
        (FilterOperator::Lt, FilterValue::One(v)) => {
            params.push(bind_value(v, column_type));
            format!("{} < ?", quoted)
        }
        (FilterOperator::Lte, FilterValue::One(v)) => {
            params.push(bind_value(v, column_type));
            format!("{} <= ?", quoted)
        }

        // Case-insensitive substring; LIKE is case-insensitive for
        // ASCII in SQLite.
        (FilterOperator::Ilike, FilterValue::One(v)) => {
            params.push(Value::Text(format!("%{}%", escape_like(v))));
            format!("{} LIKE ? ESCAPE '\\'", quoted)
        }
        // Case-sensitive substring via GLOB.
        (FilterOperator::Like, FilterValue::One(v)) => {
            params.push(Value::Text(format!("*{}*", v)));
            format!("{} GLOB ?", quoted)
        }

        (FilterOperator::Regex, FilterValue::One(v)) => {
            if options.supports_regex {
                params.push(Value::Text(v.clone()));
                format!("{} REGEXP ?", quoted)
            } else {
                params.push(Value::Text(format!("%{}%", escape_like(v))));
                format!("{} LIKE ? ESCAPE '\\'", quoted)
            }
        }

        (FilterOperator::In, FilterValue::Many(items))
        | (FilterOperator::NotIn, FilterValue::Many(items)) => {
            let placeholders = vec!["?"; items.len()].join(", ");
            for item in items {
                params.push(bind_value(item, column_type));
            }
            let keyword = if filter.operator == FilterOperator::In {
                "IN"
            } else {
                "NOT IN"
            };
            format!("{} {} ({})", quoted, keyword, placeholders)
        }

        // Bounds bind in the order given; a reversed range matches no
        // rows, same as raw SQL.
        (FilterOperator::Between, FilterValue::Range(low, high)) => {
            params.push(bind_value(low, column_type));
            params.push(bind_value(high, column_type));
            format!("{} BETWEEN ? AND ?", quoted)
        }

        (op, value) => {
            return Err(TabulaError::Validation(format!(
                "col_filter: operator {:?} cannot take operand {:?}",
                op, value
            )));
        }
    };

    Ok(clause)
}

/// Global search: OR of substring matches over the text columns. When a
/// full-text index shadows the table, its token matches are unioned in
/// so the planner can satisfy part of the disjunction from the index.
/// Token matches are substring matches over the same columns, so the
/// union keeps substring semantics; tables with and without an index
/// return the same rows.
fn compile_search(
    term: &str,
    schema: &TableSchema,
    params: &mut Vec<Value>,
) -> Option<String> {
    let text_columns = schema.text_columns();
    if text_columns.is_empty() {
        return None;
    }

    let pattern = format!("%{}%", escape_like(term));
    let mut likes = Vec::with_capacity(text_columns.len() + 1);
    for column in &text_columns {
        params.push(Value::Text(pattern.clone()));
        likes.push(format!("{} LIKE ? ESCAPE '\\'", quote_ident(&column.name)));
    }

    if let Some(fts) = &schema.fts_table {
        let fts_quoted = quote_ident(fts);
        // Quote the term as a single FTS5 phrase so operator characters
        // in user input are inert.
        params.push(Value::Text(format!("\"{}\"", term.replace('"', "\"\""))));
        likes.push(format!(
            "rowid IN (SELECT rowid FROM {} WHERE {} MATCH ?)",
            fts_quoted, fts_quoted
        ));
    }

    Some(format!("({})", likes.join(" OR ")))
}

/// Bind a filter operand with the column's affinity so comparisons are
/// numeric on numeric columns.
fn bind_value(raw: &str, column_type: ColumnType) -> Value {
    if column_type.is_numeric() {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Real(f);
        }
    }
    Value::Text(raw.to_string())
}

/// OFFSET binds as a signed integer; clamp instead of wrapping negative
/// for offsets past `i64::MAX`.
fn offset_param(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

/// Escape LIKE wildcards in user input
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter;
    use crate::request::{
        AggregateFunction, Aggregation, NormalizedRequest, QueryRequest, normalize,
    };
    use pretty_assertions::assert_eq;
    use tabula_core::ColumnInfo;

    fn schema() -> TableSchema {
        let col = |name: &str, declared: &str, pk: usize| ColumnInfo {
            name: name.into(),
            declared_type: declared.into(),
            column_type: ColumnType::from_declared(declared),
            notnull: false,
            pk,
            default_value: None,
        };
        TableSchema {
            table: "people".into(),
            columns: vec![
                col("id", "INTEGER", 1),
                col("name", "TEXT", 0),
                col("bio", "TEXT", 0),
                col("age", "INTEGER", 0),
            ],
            indexes: Vec::new(),
            fts_table: None,
        }
    }

    fn normalized(build: impl FnOnce(&mut QueryRequest)) -> NormalizedRequest {
        let mut request = QueryRequest::for_table("people");
        build(&mut request);
        normalize(&request, &schema()).unwrap()
    }

    #[test]
    fn plain_select_is_paginated_and_ordered_by_primary_key() {
        let plan = compile(&normalized(|_| {}), &schema(), CompilerOptions::default()).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT \"id\", \"name\", \"bio\", \"age\" FROM \"people\" ORDER BY \"id\" ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            plan.params,
            vec![Value::Integer(100), Value::Integer(0)]
        );
        assert_eq!(plan.count_sql, "SELECT COUNT(*) FROM \"people\"");
        assert!(plan.count_params.is_empty());
        assert!(!plan.is_aggregate);
    }

    #[test]
    fn huge_offset_clamps_instead_of_wrapping() {
        let plan = compile(
            &normalized(|r| {
                r.offset = u64::MAX;
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.params.last(), Some(&Value::Integer(i64::MAX)));
    }

    #[test]
    fn explicit_sort_keeps_the_primary_key_tiebreak() {
        let plan = compile(
            &normalized(|r| {
                r.sort_column = Some("age".into());
                r.sort_order = "desc".into();
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert!(plan.sql.contains("ORDER BY \"age\" DESC, \"id\" ASC"));
    }

    #[test]
    fn filter_values_are_parameters_not_text() {
        let plan = compile(
            &normalized(|r| {
                r.col_filter.insert("age".into(), "<500".into());
                r.col_filter.insert("name".into(), "smith".into());
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();

        assert!(plan.sql.contains("\"age\" < ?"));
        assert!(plan.sql.contains("\"name\" LIKE ? ESCAPE '\\'"));
        assert!(!plan.sql.contains("500"));
        assert!(!plan.sql.contains("smith"));
        assert_eq!(
            plan.count_params,
            vec![Value::Integer(500), Value::Text("%smith%".into())]
        );
    }

    #[test]
    fn numeric_filter_binds_with_numeric_affinity() {
        let plan = compile(
            &normalized(|r| {
                r.col_filter.insert("age".into(), ">= 2.5".into());
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.count_params, vec![Value::Real(2.5)]);
    }

    #[test]
    fn in_list_expands_to_placeholders() {
        let plan = compile(
            &normalized(|r| {
                r.col_filter.insert("name".into(), "jane,bob".into());
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert!(plan.sql.contains("\"name\" IN (?, ?)"));
        assert_eq!(
            plan.count_params,
            vec![Value::Text("jane".into()), Value::Text("bob".into())]
        );
    }

    #[test]
    fn between_binds_bounds_in_given_order() {
        let forward = compile(
            &normalized(|r| {
                r.col_filter.insert("age".into(), "between 5 and 10".into());
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert!(forward.sql.contains("\"age\" BETWEEN ? AND ?"));
        assert_eq!(
            forward.count_params,
            vec![Value::Integer(5), Value::Integer(10)]
        );

        // A reversed range still compiles; it just matches nothing.
        let reversed = compile(
            &normalized(|r| {
                r.col_filter.insert("age".into(), "10-5".into());
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert_eq!(
            reversed.count_params,
            vec![Value::Integer(10), Value::Integer(5)]
        );
    }

    #[test]
    fn like_wildcards_in_input_are_escaped() {
        let plan = compile(
            &normalized(|r| {
                r.col_filter.insert("name".into(), "50%".into());
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.count_params, vec![Value::Text("%50\\%%".into())]);
    }

    #[test]
    fn search_spans_text_columns() {
        let plan = compile(
            &normalized(|r| {
                r.search_value = Some("smith".into());
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert!(plan.sql.contains(
            "(\"name\" LIKE ? ESCAPE '\\' OR \"bio\" LIKE ? ESCAPE '\\')"
        ));
        assert_eq!(plan.count_params.len(), 2);
    }

    #[test]
    fn search_routes_through_fts_when_available() {
        let mut schema = schema();
        schema.fts_table = Some("people_fts".into());
        let plan = compile(
            &normalized(|r| {
                r.search_value = Some("smith".into());
            }),
            &schema,
            CompilerOptions::default(),
        )
        .unwrap();
        assert!(plan.sql.contains(
            "OR rowid IN (SELECT rowid FROM \"people_fts\" WHERE \"people_fts\" MATCH ?)"
        ));
        assert_eq!(
            plan.count_params.last(),
            Some(&Value::Text("\"smith\"".into()))
        );
    }

    #[test]
    fn regex_filter_degrades_without_engine_support() {
        let mut request = normalized(|_| {});
        request.filters.insert(
            "name".into(),
            filter::ParsedFilter {
                operator: FilterOperator::Regex,
                value: FilterValue::One("^ja".into()),
                original_input: "^ja".into(),
            },
        );

        let with = compile(&request, &schema(), CompilerOptions::default()).unwrap();
        assert!(with.sql.contains("\"name\" REGEXP ?"));

        let without = compile(
            &request,
            &schema(),
            CompilerOptions {
                supports_regex: false,
            },
        )
        .unwrap();
        assert!(without.sql.contains("\"name\" LIKE ? ESCAPE '\\'"));
    }

    #[test]
    fn aggregate_plan_groups_and_labels() {
        let plan = compile(
            &normalized(|r| {
                r.group_by = vec!["name".into()];
                r.aggregations = vec![
                    Aggregation {
                        column: "*".into(),
                        function: AggregateFunction::Count,
                    },
                    Aggregation {
                        column: "age".into(),
                        function: AggregateFunction::Avg,
                    },
                ];
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();

        assert!(plan.is_aggregate);
        assert_eq!(plan.headers, vec!["name", "count_all", "avg_age"]);
        assert!(plan.sql.contains("COUNT(*) AS \"count_all\""));
        assert!(plan.sql.contains("AVG(\"age\") AS \"avg_age\""));
        assert!(plan.sql.contains("GROUP BY \"name\""));
        assert!(plan.sql.contains("ORDER BY \"name\" ASC"));
        assert!(plan.count_sql.starts_with("SELECT COUNT(*) FROM (SELECT"));
        assert!(!plan.count_sql.contains("LIMIT"));
    }

    #[test]
    fn bare_group_by_still_groups() {
        let plan = compile(
            &normalized(|r| {
                r.group_by = vec!["name".into()];
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();

        assert!(plan.is_aggregate);
        assert_eq!(plan.headers, vec!["name"]);
        assert!(plan.sql.contains("GROUP BY \"name\""));
        assert!(plan.count_sql.starts_with("SELECT COUNT(*) FROM (SELECT"));
    }

    #[test]
    fn stddev_compiles_to_variance_with_sqrt_marker() {
        let plan = compile(
            &normalized(|r| {
                r.aggregations = vec![Aggregation {
                    column: "age".into(),
                    function: AggregateFunction::Stddev,
                }];
            }),
            &schema(),
            CompilerOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.headers, vec!["stddev_age"]);
        assert_eq!(plan.sqrt_columns, vec![0]);
        assert!(
            plan.sql
                .contains("(AVG(\"age\" * \"age\") - AVG(\"age\") * AVG(\"age\"))")
        );
    }

    #[test]
    fn quoted_identifiers_neutralize_hostile_names() {
        let mut schema = schema();
        schema.table = "people\"; DROP TABLE x; --".into();
        let mut request = normalized(|_| {});
        request.table = schema.table.clone();

        let plan = compile(&request, &schema, CompilerOptions::default()).unwrap();
        assert!(plan.sql.contains("\"people\"\"; DROP TABLE x; --\""));
    }
}
