//! Native query execution for the document store
//!
//! Accepts `SELECT <* | t.a, t.b> FROM <t> [WHERE <predicate>] [ORDER BY <list>]`
//! with `@name` parameters, as produced by the document filter compiler.

use super::document::Document;
use super::error::{NoSqlError, Result};
use crate::engine::adapter::{NativeQuery, Record, DOCUMENT_ID};
use crate::engine::filter::eval::unqualify;
use crate::engine::filter::{sort_records, FilterParser, Params};

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// `None` selects every property
    pub projection: Option<Vec<String>>,
    pub alias: String,
    pub predicate: Option<String>,
    pub order_by: Option<String>,
}

impl SelectStatement {
    pub fn parse(sql: &str) -> Result<Self> {
        let sql = sql.trim();
        // ASCII uppercasing keeps byte offsets aligned with `sql`
        let upper = sql.to_ascii_uppercase();

        if !upper.starts_with("SELECT ") {
            return Err(NoSqlError::Query(format!("expected SELECT statement: {}", sql)));
        }
        let from = upper
            .find(" FROM ")
            .ok_or_else(|| NoSqlError::Query("missing FROM clause".to_string()))?;

        let columns = sql["SELECT ".len()..from].trim();
        let rest = &sql[from + " FROM ".len()..];
        let rest_upper = &upper[from + " FROM ".len()..];

        let order_at = rest_upper.rfind(" ORDER BY ");
        let where_at = rest_upper.find(" WHERE ");

        let source_end = where_at.or(order_at).unwrap_or(rest.len());
        let alias = rest[..source_end].trim().to_string();
        if alias.is_empty() {
            return Err(NoSqlError::Query("missing collection after FROM".to_string()));
        }

        let predicate = where_at.map(|at| {
            let end = order_at.filter(|o| *o > at).unwrap_or(rest.len());
            rest[at + " WHERE ".len()..end].trim().to_string()
        });
        let order_by = order_at.map(|at| rest[at + " ORDER BY ".len()..].trim().to_string());

        let projection = if columns == "*" {
            None
        } else {
            Some(
                columns
                    .split(',')
                    .map(|c| unqualify(c.trim(), Some(alias.as_str())).to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
            )
        };

        Ok(Self {
            projection,
            alias,
            predicate: predicate.filter(|p| !p.is_empty()),
            order_by: order_by.filter(|o| !o.is_empty()),
        })
    }
}

/// Run a native query over a collection's documents.
/// Empty query text lists every document.
pub fn execute(query: &NativeQuery, docs: Vec<Document>) -> Result<Vec<Record>> {
    let statement = if query.text.trim().is_empty() {
        None
    } else {
        Some(SelectStatement::parse(&query.text)?)
    };

    let params: Params = query
        .params
        .iter()
        .map(|p| (p.placeholder.clone(), p.value.clone()))
        .collect();

    let filter = match statement.as_ref().and_then(|s| s.predicate.as_deref()) {
        Some(predicate) => FilterParser::new(&params)
            .parse(predicate)
            .map_err(|e| NoSqlError::Query(e.to_string()))?,
        None => None,
    };
    let alias = statement.as_ref().map(|s| s.alias.as_str());

    let mut results = Vec::new();
    for doc in docs {
        let record = doc.to_record();
        let keep = match &filter {
            Some(node) => node.matches(&record, &params, alias).map_err(NoSqlError::Query)?,
            None => true,
        };
        if keep {
            results.push(record);
        }
    }

    if let Some(order_by) = statement.as_ref().and_then(|s| s.order_by.as_deref()) {
        sort_records(&mut results, order_by, alias);
    }

    if let Some(limit) = query.limit {
        results.truncate(limit);
    }

    if let Some(columns) = statement.as_ref().and_then(|s| s.projection.as_ref()) {
        results = results
            .into_iter()
            .map(|record| project(record, columns))
            .collect();
    }

    Ok(results)
}

fn project(record: Record, columns: &[String]) -> Record {
    let mut out = Record::new();
    for (key, value) in record {
        if key == DOCUMENT_ID || columns.iter().any(|c| *c == key) {
            out.insert(key, value);
        }
    }
    out
}

/// Number of documents a query would match before its limit
pub fn count(query: &NativeQuery, docs: Vec<Document>) -> Result<usize> {
    let unlimited = NativeQuery {
        limit: None,
        ..query.clone()
    };
    Ok(execute(&unlimited, docs)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::BoundParam;
    use serde_json::{json, Value};

    fn docs() -> Vec<Document> {
        [
            json!({"id": "a", "name": "Alice", "age": 30}),
            json!({"id": "b", "name": "Bob", "age": 25}),
            json!({"id": "c", "name": "Charlie", "age": 35}),
        ]
        .into_iter()
        .map(|v| Document::from_record(v.as_object().cloned().unwrap()))
        .collect()
    }

    #[test]
    fn test_parse_select() {
        let stmt = SelectStatement::parse(
            "SELECT t.name, t.id FROM t WHERE t.age > @age1 ORDER BY t.age DESC",
        )
        .unwrap();
        assert_eq!(stmt.projection, Some(vec!["name".to_string(), "id".to_string()]));
        assert_eq!(stmt.alias, "t");
        assert_eq!(stmt.predicate.as_deref(), Some("t.age > @age1"));
        assert_eq!(stmt.order_by.as_deref(), Some("t.age DESC"));

        let bare = SelectStatement::parse("select * from people").unwrap();
        assert_eq!(bare.projection, None);
        assert_eq!(bare.predicate, None);
        assert!(SelectStatement::parse("DELETE FROM t").is_err());
    }

    #[test]
    fn test_query_execution() {
        let query = NativeQuery::new("SELECT t.name FROM t WHERE t.age >= @age1 ORDER BY t.age DESC")
            .with_params(vec![BoundParam { placeholder: "@age1".into(), value: json!(30) }]);
        let results = execute(&query, docs()).unwrap();
        assert_eq!(
            results.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({"id": "c", "name": "Charlie"}), json!({"id": "a", "name": "Alice"})]
        );

        let limited = NativeQuery::new("").limit(Some(2));
        assert_eq!(execute(&limited, docs()).unwrap().len(), 2);
        assert_eq!(count(&limited, docs()).unwrap(), 3);
    }
}
