//! Table resource: the request-level surface over one backend
//!
//! Ties filter compilation, native queries and the batch executor together
//! for retrieve and mutate requests against any table of one service.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::engine::adapter::{Backend, BackendKind, NativeDialect, NativeQuery, Record, RecordKey, PARTITION_KEY};
use crate::engine::batch::{
    BatchExecutor, BatchOperation, BatchOptions, ExecutionResult, FieldSelection, ResultEnvelope, Verb,
};
use crate::engine::config::{BackendConfig, ConnectorConfig, LimitsConfig};
use crate::engine::error::{ConnectorError, Result};
use crate::engine::filter::{
    sort_records, CompiledQuery, DocumentFilterCompiler, FieldMap, FilterCompiler, FilterParser,
    Params, PartitionedFilterCompiler,
};

/// One server-enforced condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFilter {
    pub name: String,
    pub operator: String,
    pub value: Value,
}

/// Conditions conjoined with every caller filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFilterSet {
    #[serde(default = "default_combiner")]
    pub combiner: String,
    pub filters: Vec<ServerFilter>,
}

fn default_combiner() -> String {
    "and".to_string()
}

impl ServerFilterSet {
    /// Render as filter text; `None` when there are no conditions
    pub fn to_filter(&self, dialect: &NativeDialect) -> Result<Option<String>> {
        let joiner = match self.combiner.trim().to_lowercase().as_str() {
            "and" => " and ",
            "or" => " or ",
            other => {
                return Err(ConnectorError::BadRequest(format!(
                    "Invalid server filter combiner '{}'.",
                    other
                )))
            }
        };
        if self.filters.is_empty() {
            return Ok(None);
        }

        let mut parts = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            if filter.name.trim().is_empty() || filter.operator.trim().is_empty() {
                return Err(ConnectorError::BadRequest(
                    "Invalid server filter: name and operator are required.".to_string(),
                ));
            }
            parts.push(format!(
                "{} {} {}",
                filter.name.trim(),
                filter.operator.trim(),
                dialect.literal(&filter.value)
            ));
        }
        Ok(Some(parts.join(joiner)))
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// `*`, a comma list, or empty for identifiers only
    pub fields: Option<String>,
    pub filter: Option<String>,
    pub params: Params,
    pub limit: Option<usize>,
    pub order_by: Option<String>,
    pub rollback: bool,
    pub continue_on_error: bool,
    pub partition_key: Option<String>,
    pub include_count: bool,
}

impl RequestOptions {
    fn selection(&self, default: FieldSelection) -> FieldSelection {
        match self.fields.as_deref() {
            None => default,
            fields => FieldSelection::parse(fields),
        }
    }

    fn filter_text(&self) -> Option<&str> {
        self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }
}

pub struct Connector<B: Backend> {
    backend: B,
    schemas: HashMap<String, FieldMap>,
    limits: LimitsConfig,
    default_partition_key: Option<String>,
    upsert_allowed: bool,
    server_filters: Option<ServerFilterSet>,
}

impl<B: Backend> Connector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            schemas: HashMap::new(),
            limits: LimitsConfig::default(),
            default_partition_key: None,
            upsert_allowed: false,
            server_filters: None,
        }
    }

    /// Apply the limits and backend policies of a service config
    pub fn configured(backend: B, config: &ConnectorConfig) -> Self {
        let mut connector = Self::new(backend).with_limits(config.limits.clone());
        if let BackendConfig::Table {
            default_partition_key,
            upsert_allowed,
            ..
        } = &config.backend
        {
            connector = connector
                .with_default_partition_key(default_partition_key.clone())
                .with_upsert(*upsert_allowed);
        }
        connector
    }

    /// Declare a table's fields; undeclared tables accept any field
    pub fn with_schema(mut self, table: &str, fields: FieldMap) -> Self {
        self.schemas.insert(table.to_string(), fields);
        self
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_default_partition_key(mut self, partition_key: Option<String>) -> Self {
        self.default_partition_key = partition_key.filter(|pk| !pk.is_empty());
        self
    }

    pub fn with_upsert(mut self, upsert_allowed: bool) -> Self {
        self.upsert_allowed = upsert_allowed;
        self
    }

    pub fn with_server_filters(mut self, filters: ServerFilterSet) -> Self {
        self.server_filters = Some(filters);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    fn fields_for(&self, table: &str) -> FieldMap {
        match self.schemas.get(table) {
            Some(fields) => fields.clone().with_identifiers(self.kind()),
            None => FieldMap::open_for(self.kind()),
        }
    }

    /// Request partition key, else the configured default. Entity tables only.
    fn partition_key(&self, options: &RequestOptions) -> Option<String> {
        if self.kind() != BackendKind::Table {
            return None;
        }
        options
            .partition_key
            .clone()
            .filter(|pk| !pk.is_empty())
            .or_else(|| self.default_partition_key.clone())
    }

    /// Caller filter conjoined with the server filters and, on entity tables,
    /// an explicit request partition key
    fn effective_filter(&self, options: &RequestOptions) -> Result<Option<String>> {
        let dialect = NativeDialect::new(self.kind());
        let mut clauses = Vec::new();
        if let Some(server) = &self.server_filters {
            if let Some(text) = server.to_filter(&dialect)? {
                clauses.push(text);
            }
        }
        if self.kind() == BackendKind::Table {
            if let Some(pk) = options.partition_key.as_deref().filter(|pk| !pk.is_empty()) {
                clauses.push(format!(
                    "{} eq {}",
                    PARTITION_KEY,
                    dialect.literal(&Value::String(pk.to_string()))
                ));
            }
        }
        if let Some(caller) = options.filter_text() {
            clauses.push(caller.to_string());
        }

        Ok(match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(
                clauses
                    .iter()
                    .map(|c| format!("({})", c))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        })
    }

    /// Compile filter text for a table. The entity table may need several
    /// native filters to stay within its comparison ceiling.
    pub fn compile(&self, table: &str, filter: &str, params: &Params) -> Result<Vec<CompiledQuery>> {
        let fields = self.fields_for(table);
        match self.kind() {
            BackendKind::Document => Ok(DocumentFilterCompiler::new(table, &fields, params)
                .compile_text(filter)?
                .into_iter()
                .collect()),
            BackendKind::Table => {
                let node = match FilterParser::new(params).parse(filter)? {
                    Some(node) => node,
                    None => return Ok(Vec::new()),
                };
                let compiled = PartitionedFilterCompiler::new(&fields, params)
                    .with_max_ids(self.limits.max_ids_per_filter)
                    .compile_chunked(&node)?;
                let native: Vec<&str> = compiled.iter().map(|c| c.native_filter.as_str()).collect();
                tracing::debug!(table, filters = compiled.len(), native = %native.join(" | "), "compiled filter");
                Ok(compiled)
            }
        }
    }

    fn result_limit(&self, options: &RequestOptions) -> usize {
        options
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(self.limits.max_records)
    }

    /// Records matching the request filter (all records when there is none)
    pub fn retrieve_by_filter(&self, table: &str, options: &RequestOptions) -> Result<ResultEnvelope> {
        let selection = options.selection(FieldSelection::All);
        let limit = self.result_limit(options);
        let filter = self.effective_filter(options)?;

        match self.kind() {
            BackendKind::Document => {
                let fields = self.fields_for(table);
                let compiler = DocumentFilterCompiler::new(table, &fields, &options.params);
                let compiled = match filter.as_deref() {
                    Some(text) => compiler.compile_text(text)?,
                    None => None,
                };
                let projection = selection.projection(BackendKind::Document);
                let sql = compiler.select_statement(
                    compiled.as_ref(),
                    projection.as_deref(),
                    options.order_by.as_deref(),
                );
                let native = NativeQuery::new(sql)
                    .with_params(compiled.map(|c| c.params).unwrap_or_default())
                    .limit(Some(limit));

                let records = self.backend.query(table, &native)?;
                let count = if options.include_count {
                    Some(if records.len() < limit {
                        records.len()
                    } else {
                        self.backend.count(table, &native)?
                    })
                } else {
                    None
                };
                let records = records
                    .into_iter()
                    .map(|r| selection.clean(r, BackendKind::Document))
                    .collect();

                let envelope = ResultEnvelope::from_records(records);
                Ok(match count {
                    Some(count) => envelope.with_count(count),
                    None => envelope,
                })
            }
            BackendKind::Table => {
                let compiled = match filter.as_deref() {
                    Some(text) => self.compile(table, text, &options.params)?,
                    None => Vec::new(),
                };
                let texts: Vec<String> = if compiled.is_empty() {
                    vec![String::new()]
                } else {
                    compiled.into_iter().map(|c| c.native_filter).collect()
                };

                let mut records = Vec::new();
                for text in texts {
                    let native = NativeQuery::new(text).limit(Some(limit));
                    records.extend(self.backend.query(table, &native)?);
                }
                if let Some(order_by) = options.order_by.as_deref() {
                    sort_records(&mut records, order_by, None);
                }
                records.truncate(limit);

                let count = records.len();
                let records = records
                    .into_iter()
                    .map(|r| selection.clean(r, BackendKind::Table))
                    .collect();
                let envelope = ResultEnvelope::from_records(records);
                Ok(if options.include_count {
                    envelope.with_count(count)
                } else {
                    envelope
                })
            }
        }
    }

    /// Records addressed by id, in the order requested
    pub fn retrieve_by_ids(
        &self,
        table: &str,
        ids: &[String],
        options: &RequestOptions,
    ) -> Result<ExecutionResult> {
        let keys = self.keys_for(ids, options)?;
        self.executor(table, options, FieldSelection::All)
            .execute(BatchOperation::from_keys(Verb::Get, keys, None))
    }

    /// Apply `verb` to each record; identifiers are taken from the records
    pub fn mutate_records(
        &self,
        table: &str,
        verb: Verb,
        records: Vec<Record>,
        options: &RequestOptions,
    ) -> Result<ExecutionResult> {
        if records.is_empty() {
            return Err(ConnectorError::BadRequest("No records in request.".to_string()));
        }
        self.executor(table, options, FieldSelection::IdsOnly)
            .execute(BatchOperation::from_records(verb, records))
    }

    /// Apply `verb` to each id, with `record` as the payload for writes
    pub fn mutate_by_ids(
        &self,
        table: &str,
        verb: Verb,
        ids: &[String],
        record: Option<Record>,
        options: &RequestOptions,
    ) -> Result<ExecutionResult> {
        let keys = self.keys_for(ids, options)?;
        self.executor(table, options, FieldSelection::IdsOnly)
            .execute(BatchOperation::from_keys(verb, keys, record.as_ref()))
    }

    /// Apply `verb` to every record matching the request filter
    pub fn mutate_by_filter(
        &self,
        table: &str,
        verb: Verb,
        record: Option<Record>,
        options: &RequestOptions,
    ) -> Result<ExecutionResult> {
        if verb == Verb::Delete && options.filter_text().is_none() {
            return Err(ConnectorError::BadRequest(
                "Filter for delete request can not be empty.".to_string(),
            ));
        }

        let lookup = RequestOptions {
            fields: Some(String::new()),
            include_count: false,
            ..options.clone()
        };
        let matches = self.retrieve_by_filter(table, &lookup)?;
        let kind = self.kind();
        let keys = matches
            .resource
            .iter()
            .filter_map(Value::as_object)
            .map(|r| kind.key_of(r, None))
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(ConnectorError::MissingIdentifier)?;

        if keys.is_empty() {
            tracing::debug!(table, verb = ?verb, "filter matched no records");
            return Ok(ExecutionResult::default());
        }
        let options = RequestOptions {
            partition_key: None,
            ..options.clone()
        };
        self.executor(table, &options, FieldSelection::IdsOnly)
            .execute(BatchOperation::from_keys(verb, keys, record.as_ref()))
    }

    fn keys_for(&self, ids: &[String], options: &RequestOptions) -> Result<Vec<RecordKey>> {
        if ids.is_empty() {
            return Err(ConnectorError::BadRequest("No record ids in request.".to_string()));
        }
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ConnectorError::MissingIdentifier(
                "Empty identifier in request.".to_string(),
            ));
        }
        match self.kind() {
            BackendKind::Document => Ok(ids.iter().map(|id| RecordKey::document(id.trim())).collect()),
            BackendKind::Table => {
                let pk = self.partition_key(options).ok_or_else(|| {
                    ConnectorError::MissingIdentifier("No valid partition key found in request.".to_string())
                })?;
                Ok(ids.iter().map(|id| RecordKey::entity(&pk, id.trim())).collect())
            }
        }
    }

    fn executor(
        &self,
        table: &str,
        options: &RequestOptions,
        default_fields: FieldSelection,
    ) -> BatchExecutor<'_, B> {
        let batch_options = BatchOptions {
            rollback: options.rollback,
            continue_on_error: options.continue_on_error,
            fields: options.selection(default_fields),
            partition_key: self.partition_key(options),
        };
        BatchExecutor::new(&self.backend, table, batch_options)
            .with_upsert(self.upsert_allowed)
            .with_limits(self.limits.max_batch_operations, self.limits.max_ids_per_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::SqliteTableStore;
    use crate::engine::filter::{FieldDescriptor, FieldType};
    use crate::engine::nosql::LocalDocumentStore;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn documents() -> (tempfile::TempDir, Connector<LocalDocumentStore>) {
        let dir = tempdir().unwrap();
        let store = LocalDocumentStore::open_or_create(dir.path()).unwrap();
        let connector = Connector::new(store);
        let people = vec![
            record(json!({"id": "a", "name": "Ann", "age": 30, "status": "active"})),
            record(json!({"id": "b", "name": "Bob", "age": 19, "status": "active"})),
            record(json!({"id": "c", "name": "Cid", "age": 45, "status": "closed"})),
        ];
        connector
            .mutate_records("people", Verb::Create, people, &RequestOptions::default())
            .unwrap();
        (dir, connector)
    }

    fn entities() -> Connector<SqliteTableStore> {
        let connector = Connector::new(SqliteTableStore::in_memory().unwrap())
            .with_default_partition_key(Some("P".into()));
        let rows = (1..=20)
            .map(|n| record(json!({"RowKey": format!("{:02}", n), "n": n})))
            .collect();
        connector
            .mutate_records("nums", Verb::Create, rows, &RequestOptions::default())
            .unwrap();
        connector
    }

    #[test]
    fn test_document_filter_with_count() {
        let (_dir, connector) = documents();
        let options = RequestOptions {
            filter: Some("(age > 21) AND (status = 'active')".into()),
            fields: Some("name".into()),
            include_count: true,
            ..Default::default()
        };
        let envelope = connector.retrieve_by_filter("people", &options).unwrap();
        assert_eq!(envelope.resource, vec![json!({"id": "a", "name": "Ann"})]);
        assert_eq!(envelope.meta.map(|m| m.count), Some(1));
    }

    #[test]
    fn test_document_order_and_limit() {
        let (_dir, connector) = documents();
        let options = RequestOptions {
            order_by: Some("age DESC".into()),
            limit: Some(2),
            include_count: true,
            fields: Some(String::new()),
            ..Default::default()
        };
        let envelope = connector.retrieve_by_filter("people", &options).unwrap();
        assert_eq!(envelope.resource, vec![json!({"id": "c"}), json!({"id": "a"})]);
        assert_eq!(envelope.meta.map(|m| m.count), Some(3));
    }

    #[test]
    fn test_schema_rejects_unknown_field() {
        let (_dir, connector) = documents();
        let connector = connector.with_schema(
            "people",
            FieldMap::new(vec![FieldDescriptor::new("age", FieldType::Integer)]),
        );
        let options = RequestOptions {
            filter: Some("nickname = 'x'".into()),
            ..Default::default()
        };
        assert!(matches!(
            connector.retrieve_by_filter("people", &options),
            Err(ConnectorError::BadFilter(_))
        ));
    }

    #[test]
    fn test_server_filters_are_conjoined() {
        let (_dir, connector) = documents();
        let connector = connector.with_server_filters(ServerFilterSet {
            combiner: "and".into(),
            filters: vec![ServerFilter {
                name: "status".into(),
                operator: "=".into(),
                value: json!("active"),
            }],
        });
        let options = RequestOptions {
            filter: Some("age < 40".into()),
            order_by: Some("name".into()),
            ..Default::default()
        };
        let names: Vec<Value> = connector
            .retrieve_by_filter("people", &options)
            .unwrap()
            .resource
            .into_iter()
            .map(|r| r["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("Ann"), json!("Bob")]);

        let invalid = ServerFilterSet {
            combiner: "xor".into(),
            filters: vec![],
        };
        assert!(matches!(
            invalid.to_filter(&NativeDialect::new(BackendKind::Document)),
            Err(ConnectorError::BadRequest(_))
        ));
    }

    #[test]
    fn test_entity_order_by_is_applied_after_query() {
        let connector = entities();
        let options = RequestOptions {
            filter: Some("n ge 18".into()),
            order_by: Some("n desc".into()),
            ..Default::default()
        };
        let envelope = connector.retrieve_by_filter("nums", &options).unwrap();
        let ns: Vec<Value> = envelope.resource.iter().map(|r| r["n"].clone()).collect();
        assert_eq!(ns, vec![json!(20), json!(19), json!(18)]);
    }

    #[test]
    fn test_entity_ids_use_default_partition() {
        let connector = entities();
        let ids: Vec<String> = (1..=15).map(|n| format!("{:02}", n)).collect();
        let result = connector
            .retrieve_by_ids("nums", &ids, &RequestOptions::default())
            .unwrap();
        assert_eq!(result.records().len(), 15);
        assert_eq!(result.records()[14]["n"], json!(15));

        let deleted = connector
            .mutate_by_ids("nums", Verb::Delete, &ids, None, &RequestOptions::default())
            .unwrap();
        assert_eq!(deleted.records().len(), 15);
        assert_eq!(
            connector
                .retrieve_by_filter("nums", &RequestOptions::default())
                .unwrap()
                .resource
                .len(),
            5
        );
    }

    #[test]
    fn test_ids_require_partition_on_entity_table() {
        let connector = Connector::new(SqliteTableStore::in_memory().unwrap());
        let err = connector
            .retrieve_by_ids("nums", &["1".to_string()], &RequestOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing identifier: No valid partition key found in request.");
    }

    #[test]
    fn test_mutate_by_filter() {
        let (_dir, connector) = documents();
        let options = RequestOptions {
            filter: Some("status = 'active'".into()),
            ..Default::default()
        };
        let patched = connector
            .mutate_by_filter("people", Verb::Patch, Some(record(json!({"tier": "gold"}))), &options)
            .unwrap();
        assert_eq!(patched.records().len(), 2);

        let gold = RequestOptions {
            filter: Some("tier = 'gold'".into()),
            ..Default::default()
        };
        assert_eq!(connector.retrieve_by_filter("people", &gold).unwrap().resource.len(), 2);

        assert!(matches!(
            connector.mutate_by_filter("people", Verb::Delete, None, &RequestOptions::default()),
            Err(ConnectorError::BadRequest(_))
        ));
    }

    #[test]
    fn test_configured_upsert() {
        let mut config = ConnectorConfig::default_for_service("svc", BackendKind::Table);
        config.backend = BackendConfig::Table {
            path: "unused".into(),
            default_partition_key: Some("P".into()),
            upsert_allowed: true,
        };
        let connector = Connector::configured(SqliteTableStore::in_memory().unwrap(), &config);
        let result = connector
            .mutate_records(
                "t",
                Verb::Replace,
                vec![record(json!({"RowKey": "new", "v": 1}))],
                &RequestOptions::default(),
            )
            .unwrap();
        assert_eq!(
            Value::Object(result.records().remove(0)),
            json!({"PartitionKey": "P", "RowKey": "new"})
        );
    }
}
