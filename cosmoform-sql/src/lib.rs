//! cosmoform-sql - storage-independent query compilation for cosmoform.
//!
//! Turns structured filters and aggregate requests into parameterised
//! statements for a document database's SQL dialect, and maps aggregate result
//! rows back into request-shaped values. Nothing here performs I/O.
//!
//! # Main Components
//!
//! - **Filter**: field → literal / operator-object predicates, AND-joined
//! - **SelectQuery**: projection, WHERE, ORDER BY and TOP/OFFSET/LIMIT
//! - **Aggregates**: COUNT/SUM/AVG/MIN/MAX and GROUP BY statements
//! - **Parser**: convention-keyed reconstruction of aggregate results
//!
//! # Example
//!
//! ```rust
//! use cosmoform_sql::{aggregate_query, parse_aggregate, AggregateRequest, Filter};
//! use serde_json::json;
//!
//! let request = AggregateRequest::new().count().avg(["age"]);
//! let spec = aggregate_query(&Filter::new().eq("status", "active"), &request).unwrap();
//! assert!(spec.query.starts_with("SELECT COUNT(1) AS _count, AVG(c[\"age\"]) AS _avg_age"));
//!
//! let result = parse_aggregate(&json!({"_count": 5, "_avg_age": 33.4}), &request);
//! assert_eq!(result.to_value(), json!({"_count": 5, "_avg": {"age": 33.4}}));
//! ```

pub mod aggregate;
pub mod error;
pub mod filter;
pub mod pagination;
pub mod param;
pub mod select;

pub use aggregate::builder::{aggregate_query, count_query, group_by_query};
pub use aggregate::parse::{
    parse_aggregate, parse_count, parse_groups, AggregateResult, AggregateValue, CountValue,
    GroupRow,
};
pub use aggregate::{
    column_alias, AggregateKind, AggregateOp, AggregateRequest, CountSelect, GroupByRequest,
    GroupOrder, GroupOrderTarget,
};
pub use error::{SqlError, SqlResult};
pub use filter::{where_clause, Condition, FieldOps, Filter, Operator};
pub use pagination::Pagination;
pub use param::{field_ref, ParamSink, QuerySpec, SqlParameter};
pub use select::{SelectQuery, SortOrder};
