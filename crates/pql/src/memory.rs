//! In-memory reference adaptor.
//!
//! [`MemoryStore`] keeps rows per entity plus edge links between row ids.
//! It backs the CLI and the tests, and documents the behavior every adaptor
//! is expected to have.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value as Json;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ExecError, ExecResult, RegistryError, RegistryResult};
use crate::executor::{project, Adaptor, CancelToken, DispatchTable, Query, Row};
use crate::plan::{EdgeSpec, Operator, PredicateSpec, PredicateValue};
use crate::schema::{EntitySchema, FieldKind, Registry};
use crate::value::{format_time, Value};

/// Rows scanned between cancellation checks.
const SCAN_BATCH: usize = 256;

/// Seed-document key holding a row's edge links.
const EDGES_KEY: &str = "_edges";

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    /// (entity, edge) -> source id -> target ids.
    links: HashMap<(String, String), HashMap<String, Vec<String>>>,
    sequences: HashMap<String, i64>,
}

/// Shared handle to the in-memory tables. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

/// Stable string key for an id cell.
fn id_key(value: &Json) -> String {
    match value {
        Json::String(s) => s.to_ascii_lowercase(),
        other => other.to_string(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw row.
    pub fn insert(&self, entity: &str, row: Row) {
        let mut tables = self.tables.write();
        if let Some(Json::Number(n)) = row.get("id") {
            if let Some(n) = n.as_i64() {
                let seq = tables.sequences.entry(entity.to_string()).or_insert(0);
                *seq = (*seq).max(n);
            }
        }
        tables.rows.entry(entity.to_string()).or_default().push(row);
    }

    /// Link `source_id` to `target_id` through `edge`.
    pub fn link(&self, entity: &str, edge: &str, source_id: &Json, target_id: &Json) {
        self.tables
            .write()
            .links
            .entry((entity.to_string(), edge.to_string()))
            .or_default()
            .entry(id_key(source_id))
            .or_default()
            .push(id_key(target_id));
    }

    pub fn len(&self, entity: &str) -> usize {
        self.tables.read().rows.get(entity).map_or(0, Vec::len)
    }

    /// Load rows from `{ "<entity>": [ {..., "_edges": {"<edge>": id | [ids]}} ] }`.
    pub fn seed(&self, registry: &Registry, doc: &Json) -> RegistryResult<usize> {
        let Some(entities) = doc.as_object() else {
            return Err(RegistryError::Invalid("seed data must be a JSON object".into()));
        };

        let mut loaded = 0;
        for (name, rows) in entities {
            let schema = registry
                .entity(name)
                .ok_or_else(|| RegistryError::Invalid(format!("seed data for unknown entity '{name}'")))?;
            let Some(rows) = rows.as_array() else {
                return Err(RegistryError::Invalid(format!("seed data for '{name}' must be an array")));
            };

            for row in rows {
                let Some(mut row) = row.as_object().cloned() else {
                    return Err(RegistryError::Invalid(format!("seed row for '{name}' must be an object")));
                };
                let id = row.get(&schema.id_field).cloned().ok_or_else(|| {
                    RegistryError::Invalid(format!("seed row for '{name}' has no '{}'", schema.id_field))
                })?;

                if let Some(Json::Object(edges)) = row.remove(EDGES_KEY) {
                    for (edge_name, targets) in edges {
                        let edge = schema.edge(&edge_name).ok_or_else(|| {
                            RegistryError::Invalid(format!("unknown edge '{edge_name}' on '{name}'"))
                        })?;
                        let targets = match targets {
                            Json::Array(ids) => ids,
                            single => vec![single],
                        };
                        for target in &targets {
                            self.link(&schema.name, &edge.name, &id, target);
                        }
                    }
                }

                for field in &schema.fields {
                    row.entry(field.name.clone()).or_insert(Json::Null);
                }
                self.insert(&schema.name, row);
                loaded += 1;
            }
        }

        debug!(rows = loaded, "seeded memory store");
        Ok(loaded)
    }

    pub fn seed_from_path(&self, registry: &Registry, path: &Path) -> RegistryResult<usize> {
        let json = std::fs::read_to_string(path)?;
        let doc: Json = serde_json::from_str(&json)?;
        self.seed(registry, &doc)
    }

    /// One adaptor per registry entity, all backed by this store.
    pub fn dispatch(&self, registry: &Registry) -> DispatchTable {
        let mut table = DispatchTable::new();
        for schema in registry.entities() {
            let targets = schema
                .edges
                .iter()
                .filter_map(|e| registry.entity(&e.target).map(|t| (e.name.clone(), t.clone())))
                .collect();
            table.register(Arc::new(MemoryAdaptor {
                schema: schema.clone(),
                targets,
                store: self.clone(),
            }));
        }
        table
    }
}

/// Adaptor for one entity over a [`MemoryStore`].
pub struct MemoryAdaptor {
    schema: EntitySchema,
    /// Edge name -> target schema.
    targets: HashMap<String, EntitySchema>,
    store: MemoryStore,
}

impl MemoryAdaptor {
    fn id_of<'a>(&self, row: &'a Row) -> Option<&'a Json> {
        row.get(&self.schema.id_field)
    }

    fn matches_id(&self, row: &Row, id: &Value) -> bool {
        self.id_of(row)
            .is_some_and(|cell| id.compare_json(cell) == Some(Ordering::Equal))
    }

    fn filtered(&self, tables: &Tables, query: &Query, cancel: &CancelToken) -> ExecResult<Vec<Row>> {
        let rows = tables.rows.get(&self.schema.name).map(Vec::as_slice).unwrap_or_default();
        let mut out = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if i % SCAN_BATCH == 0 {
                cancel.check()?;
            }
            if query.predicates.iter().all(|p| row_matches(row, p)) {
                out.push(row.clone());
            }
        }
        Ok(out)
    }

    fn load_edges(&self, tables: &Tables, row: &mut Row, edges: &[EdgeSpec]) {
        let Some(source) = self.id_of(row).map(id_key) else {
            return;
        };
        for edge in edges {
            let Some(target) = self.targets.get(&edge.name) else {
                continue;
            };
            let ids = tables
                .links
                .get(&(self.schema.name.clone(), edge.name.clone()))
                .and_then(|by_source| by_source.get(&source));
            let projection = target.default_projection();
            let related: Vec<Json> = tables
                .rows
                .get(&target.name)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .filter(|r| {
                    let key = r.get(&target.id_field).map(id_key);
                    ids.is_some_and(|ids| key.is_some_and(|k| ids.contains(&k)))
                })
                .map(|r| Json::Object(project(r.clone(), &projection, &[])))
                .collect();

            let value = if edge.unique {
                related.into_iter().next().unwrap_or(Json::Null)
            } else {
                Json::Array(related)
            };
            row.insert(edge.name.clone(), value);
        }
    }

    fn next_id(&self, tables: &mut Tables) -> Json {
        let kind = self.schema.id_meta().map(|f| f.kind);
        if kind == Some(FieldKind::Uuid) {
            return Json::String(Uuid::new_v4().to_string());
        }
        let seq = tables.sequences.entry(self.schema.name.clone()).or_insert(0);
        *seq += 1;
        match kind {
            Some(FieldKind::Int | FieldKind::Int64) => Json::from(*seq),
            _ => Json::String(seq.to_string()),
        }
    }

    fn has_field(&self, name: &str) -> bool {
        self.schema.field(name).is_some()
    }

    fn check_transitions(&self, row: &Row, values: &BTreeMap<String, Value>) -> ExecResult<()> {
        for (field, states) in &self.schema.transitions {
            let Some(Value::String(to)) = values.get(field) else {
                continue;
            };
            let from = row.get(field).and_then(Json::as_str).unwrap_or_default();
            if from == to {
                continue;
            }
            let allowed = states.get(from).is_some_and(|next| next.iter().any(|s| s == to));
            if !allowed {
                return Err(ExecError::InvalidTransition {
                    field: field.clone(),
                    from: from.to_string(),
                    to: to.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Adaptor for MemoryAdaptor {
    fn entity(&self) -> &str {
        &self.schema.name
    }

    fn get(&self, id: &Value, edges: &[EdgeSpec], cancel: &CancelToken) -> ExecResult<Option<Row>> {
        cancel.check()?;
        let tables = self.store.tables.read();
        let found = tables
            .rows
            .get(&self.schema.name)
            .and_then(|rows| rows.iter().find(|r| self.matches_id(r, id)))
            .cloned();
        Ok(found.map(|mut row| {
            self.load_edges(&tables, &mut row, edges);
            row
        }))
    }

    fn all(&self, query: &Query, cancel: &CancelToken) -> ExecResult<Vec<Row>> {
        let tables = self.store.tables.read();
        let mut rows = self.filtered(&tables, query, cancel)?;

        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                for spec in &query.order {
                    let ord = compare_cells(a.get(&spec.field), b.get(&spec.field), spec.desc);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        let mut page = Vec::new();
        for (i, row) in rows.into_iter().skip(query.offset).take(limit).enumerate() {
            if i % SCAN_BATCH == 0 {
                cancel.check()?;
            }
            let mut row = row;
            self.load_edges(&tables, &mut row, &query.edges);
            page.push(project(row, &query.fields, &query.edges));
        }
        Ok(page)
    }

    fn count(&self, query: &Query, cancel: &CancelToken) -> ExecResult<u64> {
        let tables = self.store.tables.read();
        Ok(self.filtered(&tables, query, cancel)?.len() as u64)
    }

    fn create(&self, values: &BTreeMap<String, Value>, cancel: &CancelToken) -> ExecResult<Row> {
        cancel.check()?;
        let mut tables = self.store.tables.write();

        let mut row = Row::new();
        for field in &self.schema.fields {
            row.insert(field.name.clone(), Json::Null);
        }
        for (name, value) in values {
            row.insert(name.clone(), value.to_json());
        }
        row.insert(self.schema.id_field.clone(), self.next_id(&mut tables));

        let now = Json::String(format_time(&chrono::Utc::now()));
        for audit in ["created_at", "updated_at"] {
            if self.has_field(audit) {
                row.insert(audit.to_string(), now.clone());
            }
        }

        tables
            .rows
            .entry(self.schema.name.clone())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    fn update(&self, id: &Value, values: &BTreeMap<String, Value>, cancel: &CancelToken) -> ExecResult<Option<Row>> {
        cancel.check()?;
        let mut tables = self.store.tables.write();
        let Some(row) = tables
            .rows
            .get_mut(&self.schema.name)
            .and_then(|rows| rows.iter_mut().find(|r| self.matches_id(r, id)))
        else {
            return Ok(None);
        };

        self.check_transitions(row, values)?;
        for (name, value) in values {
            row.insert(name.clone(), value.to_json());
        }
        if self.has_field("updated_at") {
            row.insert("updated_at".into(), Json::String(format_time(&chrono::Utc::now())));
        }
        Ok(Some(row.clone()))
    }

    fn delete(&self, id: &Value, cancel: &CancelToken) -> ExecResult<bool> {
        cancel.check()?;
        let mut tables = self.store.tables.write();
        let Some(rows) = tables.rows.get_mut(&self.schema.name) else {
            return Ok(false);
        };
        let Some(idx) = rows.iter().position(|r| self.matches_id(r, id)) else {
            return Ok(false);
        };
        let removed = rows.remove(idx);

        if let Some(key) = self.id_of(&removed).map(id_key) {
            for ((entity, _), by_source) in tables.links.iter_mut() {
                if *entity == self.schema.name {
                    by_source.remove(&key);
                }
                for targets in by_source.values_mut() {
                    targets.retain(|t| *t != key);
                }
            }
        }
        Ok(true)
    }
}

fn row_matches(row: &Row, predicate: &PredicateSpec) -> bool {
    let cell = row.get(&predicate.field).unwrap_or(&Json::Null);
    let eq = |value: &Value| match value {
        Value::Null => cell.is_null(),
        other => other.compare_json(cell) == Some(Ordering::Equal),
    };

    match (&predicate.op, &predicate.value) {
        (Operator::In, PredicateValue::List(values)) => values.iter().any(eq),
        (_, PredicateValue::List(_)) => false,
        (op, PredicateValue::Single(value)) => match op {
            Operator::Eq | Operator::In => eq(value),
            Operator::Neq => !eq(value),
            Operator::Like => match (value, cell.as_str()) {
                (Value::String(pattern), Some(text)) => like(text, pattern),
                _ => false,
            },
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
                if cell.is_null() {
                    return false;
                }
                // compare_json orders the cell relative to the value
                match value.compare_json(cell) {
                    Some(ord) => match op {
                        Operator::Gt => ord == Ordering::Greater,
                        Operator::Lt => ord == Ordering::Less,
                        Operator::Gte => ord != Ordering::Less,
                        _ => ord != Ordering::Greater,
                    },
                    None => false,
                }
            }
        },
    }
}

/// Case-insensitive `like`: `%` matches any run, `_` one character. A
/// pattern without wildcards matches as a substring.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    if !pattern.iter().any(|c| *c == '%' || *c == '_') {
        let needle: String = pattern.iter().collect();
        let hay: String = text.iter().collect();
        return hay.contains(&needle);
    }

    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        if *p == '%' {
            let mut any = false;
            for j in 0..=text.len() {
                any |= dp[j];
                next[j] = any;
            }
        } else {
            for j in 1..=text.len() {
                next[j] = dp[j - 1] && (*p == '_' || *p == text[j - 1]);
            }
        }
        dp = next;
    }
    dp[text.len()]
}

/// Cell ordering for `order by`. Nulls sort last in both directions.
fn compare_cells(a: Option<&Json>, b: Option<&Json>, desc: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ord = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Json::Number(x), Json::Number(y)) => match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            },
            (Json::String(x), Json::String(y)) => x.cmp(y),
            (Json::Bool(x), Json::Bool(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    };
    if desc {
        ord.reverse()
    } else {
        ord
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::parser::parse_str;
    use crate::plan::QueryPlan;
    use crate::planner::Planner;
    use crate::sample::{sample_data, sample_registry};
    use serde_json::json;

    struct Fixture {
        registry: Registry,
        store: MemoryStore,
        table: DispatchTable,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = sample_registry();
            let store = MemoryStore::new();
            store.seed(&registry, &sample_data()).unwrap();
            let table = store.dispatch(&registry);
            Self {
                registry,
                store,
                table,
            }
        }

        fn run(&self, input: &str) -> ExecResult<crate::executor::ExecOutput> {
            let out = parse_str(input);
            assert!(!out.has_errors(), "{:?}", out.parse_errors);
            let plan = Planner::new(&self.registry).plan(&out.statements[0]).unwrap();
            Executor::new(&self.table).execute(&plan, &CancelToken::new())
        }

        fn rows(&self, input: &str) -> Vec<Row> {
            self.run(input).unwrap().into_rows()
        }
    }

    #[test]
    fn test_like_semantics() {
        // no wildcards: case-insensitive substring
        assert!(like("Acme Tower", "acme"));
        assert!(like("Acme Tower", "Acme"));
        assert!(like("Acme Tower", "ME TOW"));
        assert!(!like("Acme Tower", "tower 2"));

        assert!(like("Acme Tower", "%TOWER"));
        assert!(like("Acme Tower", "acme%"));
        assert!(!like("Acme Tower", "tower%"));
        assert!(like("Acme Tower", "A_me%"));
        assert!(like("Acme Tower", "_cme Towe_"));
        assert!(!like("Acme Tower", "_Acme Tower"));
        assert!(!like("Acme Tower", "x%"));
        assert!(like("", "%"));
        assert!(!like("", "_"));
    }

    #[test]
    fn test_dispatch_covers_registry() {
        let fx = Fixture::new();
        assert!(fx.table.verify(&fx.registry).is_ok());
    }

    #[test]
    fn test_find_filters_and_projects() {
        let fx = Fixture::new();
        let rows = fx.rows("find lease where status = \"active\" select status, lease_type");
        assert!(!rows.is_empty());
        for row in &rows {
            assert_eq!(row.get("status"), Some(&json!("active")));
            assert_eq!(row.len(), 2);
        }
    }

    #[test]
    fn test_order_limit_offset() {
        let fx = Fixture::new();
        let all = fx.rows("find lease order by base_rent_amount_cents desc");
        let rents: Vec<i64> = all
            .iter()
            .filter_map(|r| r.get("base_rent_amount_cents").and_then(Json::as_i64))
            .collect();
        let mut sorted = rents.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(rents, sorted);

        let page = fx.rows("find lease order by base_rent_amount_cents desc limit 1 offset 1");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get("base_rent_amount_cents"), all[1].get("base_rent_amount_cents"));
    }

    #[test]
    fn test_nulls_sort_last_both_ways() {
        let fx = Fixture::new();
        for dir in ["asc", "desc"] {
            let rows = fx.rows(&format!("find lease order by end_date {dir}"));
            let last = rows.last().unwrap();
            assert_eq!(last.get("end_date"), Some(&Json::Null), "{dir}");
            assert!(rows[0].get("end_date").is_some_and(|v| !v.is_null()), "{dir}");
        }
    }

    #[test]
    fn test_comparisons_and_in() {
        let fx = Fixture::new();
        let rows = fx.rows("find lease where base_rent_amount_cents >= 200000");
        assert!(rows
            .iter()
            .all(|r| r.get("base_rent_amount_cents").and_then(Json::as_i64) >= Some(200000)));

        let rows = fx.rows("find lease where start_date < \"2024-01-01\"");
        assert!(!rows.is_empty());

        let active = fx.rows("find lease where status = \"active\"").len();
        let pending = fx.rows("find lease where status = \"pending\"").len();
        let both = fx.rows("find lease where status in [\"active\", \"pending\"]").len();
        assert_eq!(both, active + pending);
    }

    #[test]
    fn test_count_matches_find() {
        let fx = Fixture::new();
        let found = fx.rows("find lease where status = \"active\"").len() as u64;
        let counted = fx.run("count lease where status = \"active\"").unwrap().total();
        assert_eq!(found, counted);
    }

    #[test]
    fn test_include_unique_and_collection_edges() {
        let fx = Fixture::new();
        let rows = fx.rows("find lease include tenant limit 1");
        let tenant = rows[0].get("tenant").unwrap();
        assert!(tenant.is_object());
        assert!(tenant.get("tax_id").is_none());

        let rows = fx.rows("find tenant include leases");
        assert!(rows.iter().all(|r| r.get("leases").is_some_and(Json::is_array)));
        assert!(rows
            .iter()
            .any(|r| r.get("leases").and_then(Json::as_array).is_some_and(|a| !a.is_empty())));
    }

    #[test]
    fn test_get_and_not_found() {
        let fx = Fixture::new();
        let id = sample_data()["lease"][0]["id"].as_str().unwrap().to_string();
        let rows = fx.rows(&format!("get lease \"{id}\" include property"));
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("property").is_some());

        let err = fx
            .run("get lease \"00000000-0000-0000-0000-000000000000\"")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_create_generates_id_and_timestamps() {
        let fx = Fixture::new();
        let before = fx.store.len("tenant");
        let out = fx
            .run("create tenant set name = \"Cleo\", email = \"cleo@example.com\"")
            .unwrap();
        let row = out.into_rows().remove(0);
        let id = row.get("id").and_then(Json::as_str).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert!(row.get("created_at").is_some_and(Json::is_string));
        assert!(row.get("tax_id").is_none());
        assert_eq!(fx.store.len("tenant"), before + 1);
    }

    #[test]
    fn test_sequence_ids_continue_after_seed() {
        let registry = Registry::new().with_entity(
            EntitySchema::new("note")
                .with_field(crate::schema::FieldMeta::new("id", FieldKind::Int64))
                .with_field(crate::schema::FieldMeta::new("body", FieldKind::String)),
        );
        let store = MemoryStore::new();
        store
            .seed(&registry, &json!({"note": [{"id": 7, "body": "seeded"}]}))
            .unwrap();
        let table = store.dispatch(&registry);
        let out = parse_str("create note set body = \"new\"");
        let plan = Planner::new(&registry).plan(&out.statements[0]).unwrap();
        let row = Executor::new(&table)
            .execute(&plan, &CancelToken::new())
            .unwrap()
            .into_rows()
            .remove(0);
        assert_eq!(row.get("id"), Some(&json!(8)));
    }

    #[test]
    fn test_update_enforces_transitions() {
        let fx = Fixture::new();
        let ended = sample_data()["lease"]
            .as_array()
            .unwrap()
            .iter()
            .find(|l| l["status"] == "ended")
            .and_then(|l| l["id"].as_str())
            .unwrap()
            .to_string();

        let err = fx
            .run(&format!("update lease \"{ended}\" set status = \"active\""))
            .unwrap_err();
        assert!(matches!(err, ExecError::InvalidTransition { .. }));

        let pending = sample_data()["lease"]
            .as_array()
            .unwrap()
            .iter()
            .find(|l| l["status"] == "pending")
            .and_then(|l| l["id"].as_str())
            .unwrap()
            .to_string();
        let row = fx
            .run(&format!("update lease \"{pending}\" set status = \"active\""))
            .unwrap()
            .into_rows()
            .remove(0);
        assert_eq!(row.get("status"), Some(&json!("active")));
    }

    #[test]
    fn test_delete_removes_row_and_links() {
        let fx = Fixture::new();
        let tenant_id = sample_data()["tenant"][0]["id"].as_str().unwrap().to_string();
        let lease_count = fx.run("count lease").unwrap().total();

        fx.run(&format!("delete tenant \"{tenant_id}\"")).unwrap();
        let err = fx.run(&format!("delete tenant \"{tenant_id}\"")).unwrap_err();
        assert!(err.is_not_found());

        // leases survive, but no longer point at the deleted tenant
        assert_eq!(fx.run("count lease").unwrap().total(), lease_count);
        let rows = fx.rows("find lease include tenant");
        assert!(rows
            .iter()
            .all(|r| r.get("tenant").and_then(|t| t.get("id")) != Some(&json!(tenant_id))));
    }

    #[test]
    fn test_cancelled_scan_stops() {
        let fx = Fixture::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let adaptor = fx.table.get("lease").unwrap();
        let err = adaptor.all(&Query::new(), &cancel).unwrap_err();
        assert_eq!(err, ExecError::Cancelled);
    }

    #[test]
    fn test_seed_rejects_unknown_entities() {
        let registry = sample_registry();
        let err = MemoryStore::new()
            .seed(&registry, &json!({"unicorn": []}))
            .unwrap_err();
        assert!(err.to_string().contains("unknown entity 'unicorn'"));
    }

    #[test]
    fn test_plan_matches_find_execution() {
        let fx = Fixture::new();
        let plan = Planner::new(&fx.registry)
            .plan(&parse_str("find property").statements[0])
            .unwrap();
        assert!(matches!(plan, QueryPlan::Find(_)));
        assert_eq!(
            Executor::new(&fx.table)
                .execute(&plan, &CancelToken::new())
                .unwrap()
                .total(),
            fx.store.len("property") as u64
        );
    }
}
