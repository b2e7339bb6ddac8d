use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::database::entity::EntityMeta;
use crate::database::record::Record;
use crate::database::storage::{Storage, StorageError, StorageSession};
use crate::error::WriteFailure;
use crate::filter::FilterSet;

type Row = Map<String, Value>;
type Table = BTreeMap<i64, Row>;
type Tables = HashMap<&'static str, Table>;

/// In-process storage collaborator with transactional sessions.
///
/// Sessions work on a snapshot of the committed tables. Writes are staged by
/// `persist`/`delete` and applied with NOT NULL, UNIQUE and FOREIGN KEY checks
/// on `flush`; reads and `commit` flush first. `commit` repeats the checks
/// against the live tables and applies all of a session's writes or none.
/// Primary keys come from per-table sequences that, like database sequences,
/// ignore rollbacks.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

struct Inner {
    entities: Vec<&'static EntityMeta>,
    tables: RwLock<Tables>,
    sequences: HashMap<&'static str, AtomicI64>,
}

impl MemoryStorage {
    pub fn new(entities: impl IntoIterator<Item = &'static EntityMeta>) -> Self {
        let entities: Vec<_> = entities.into_iter().collect();
        let tables = entities.iter().map(|e| (e.name, Table::new())).collect();
        let sequences = entities.iter().map(|e| (e.name, AtomicI64::new(0))).collect();
        Self {
            inner: Arc::new(Inner {
                entities,
                tables: RwLock::new(tables),
                sequences,
            }),
        }
    }

    /// Committed rows of one entity, in primary key order.
    pub async fn rows(&self, entity: &'static EntityMeta) -> Vec<Row> {
        self.inner
            .tables
            .read()
            .await
            .get(entity.name)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        Ok(Box::new(MemorySession {
            inner: self.inner.clone(),
            working: None,
            pending: Vec::new(),
            journal: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

enum Pending {
    Insert { entity: &'static EntityMeta, id: i64, row: Row },
    Update { entity: &'static EntityMeta, id: i64, changes: Row },
    Delete { entity: &'static EntityMeta, id: i64 },
}

pub struct MemorySession {
    inner: Arc<Inner>,
    working: Option<Tables>,
    pending: Vec<Pending>,
    /// Row images written by flushed operations, replayed onto the shared tables on commit
    journal: Vec<(&'static EntityMeta, i64, Option<Row>)>,
}

impl MemorySession {
    async fn working(&mut self) -> &mut Tables {
        if self.working.is_none() {
            let snapshot = self.inner.tables.read().await.clone();
            self.working = Some(snapshot);
        }
        self.working.get_or_insert_with(Tables::new)
    }

    fn known(&self, entity: &'static EntityMeta) -> Result<(), StorageError> {
        if self.inner.entities.iter().any(|e| e.name == entity.name) {
            Ok(())
        } else {
            Err(StorageError::attribute(format!("relation \"{}\" does not exist", entity.name)))
        }
    }

    fn next_id(&self, entity: &'static EntityMeta) -> Result<i64, StorageError> {
        self.inner
            .sequences
            .get(entity.name)
            .map(|seq| seq.fetch_add(1, Ordering::SeqCst) + 1)
            .ok_or_else(|| StorageError::attribute(format!("relation \"{}\" does not exist", entity.name)))
    }

    async fn fetch(&mut self, entity: &'static EntityMeta, filters: &FilterSet) -> Result<Vec<Record>, StorageError> {
        self.known(entity)?;
        self.flush().await?;
        let tables = self.working().await;
        Ok(tables
            .get(entity.name)
            .map(|table| {
                table
                    .values()
                    .filter(|row| filters.matches(row))
                    .cloned()
                    .map(Record::from_row)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert(&mut self, entity: &'static EntityMeta, record: &mut Record) -> Result<(), StorageError> {
        let id = self.next_id(entity)?;
        let mut row = Row::new();
        for column in &entity.columns {
            let value = if column.name == entity.primary_key {
                Value::from(id)
            } else {
                match record.get(column.name) {
                    Some(value) => column.kind.coerce(value).map_err(StorageError::attribute)?,
                    None => column.default.map(|d| d.value()).unwrap_or(Value::Null),
                }
            };
            row.insert(column.name.to_string(), value);
        }
        record.mark_clean(row.clone());
        self.pending.push(Pending::Insert { entity, id, row });
        Ok(())
    }

    fn update(&mut self, entity: &'static EntityMeta, record: &mut Record) -> Result<(), StorageError> {
        let id = record
            .get_i64(entity.primary_key)
            .ok_or_else(|| StorageError::attribute("record has no primary key"))?;
        let mut changes = Row::new();
        for field in record.modified_fields() {
            if field == entity.primary_key {
                continue;
            }
            let column = column(entity, field)?;
            let value = record.get(field).unwrap_or(&Value::Null);
            changes.insert(field.to_string(), column.kind.coerce(value).map_err(StorageError::attribute)?);
        }
        if changes.is_empty() {
            return Ok(());
        }
        let mut row = record.fields().clone();
        row.extend(changes.clone());
        record.mark_clean(row);
        self.pending.push(Pending::Update { entity, id, changes });
        Ok(())
    }

    async fn apply(&mut self, op: Pending) -> Result<(), StorageError> {
        let entities = self.inner.entities.clone();
        let tables = self.working().await;
        let (entity, id, image) = match op {
            Pending::Insert { entity, id, row } => (entity, id, Some(row)),
            Pending::Update { entity, id, changes } => {
                let mut row = tables
                    .get(entity.name)
                    .and_then(|t| t.get(&id))
                    .cloned()
                    .ok_or(StorageError::NotFound)?;
                row.extend(changes);
                (entity, id, Some(row))
            }
            Pending::Delete { entity, id } => {
                if !tables.get(entity.name).is_some_and(|t| t.contains_key(&id)) {
                    return Err(StorageError::NotFound);
                }
                (entity, id, None)
            }
        };

        write_image(entity, id, image.as_ref(), &entities, tables)?;
        self.journal.push((entity, id, image));
        Ok(())
    }
}

/// Check one row image against `tables` and apply it. `None` deletes the row.
fn write_image(
    entity: &'static EntityMeta,
    id: i64,
    image: Option<&Row>,
    entities: &[&'static EntityMeta],
    tables: &mut Tables,
) -> Result<(), StorageError> {
    match image {
        Some(row) => {
            check_row(entity, id, row, tables)?;
            tables.entry(entity.name).or_default().insert(id, row.clone());
        }
        None => {
            if let Some(row) = tables.get(entity.name).and_then(|t| t.get(&id)) {
                check_restrict(entity, row, entities, tables)?;
            }
            if let Some(table) = tables.get_mut(entity.name) {
                table.remove(&id);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl StorageSession for MemorySession {
    async fn fetch_one(&mut self, entity: &'static EntityMeta, filters: &FilterSet) -> Result<Record, StorageError> {
        let mut rows = self.fetch(entity, filters).await?;
        match rows.len() {
            0 => Err(StorageError::NotFound),
            1 => rows.pop().ok_or(StorageError::NotFound),
            _ => Err(StorageError::MultipleResults),
        }
    }

    async fn fetch_many(
        &mut self,
        entity: &'static EntityMeta,
        filters: &FilterSet,
    ) -> Result<Vec<Record>, StorageError> {
        self.fetch(entity, filters).await
    }

    async fn persist(
        &mut self,
        entity: &'static EntityMeta,
        record: &mut Record,
        commit: bool,
    ) -> Result<(), StorageError> {
        self.known(entity)?;
        for field in record.fields().keys() {
            column(entity, field)?;
        }
        if record.is_null(entity.primary_key) {
            self.insert(entity, record)?;
        } else {
            self.update(entity, record)?;
        }
        if commit {
            self.commit().await?;
        }
        Ok(())
    }

    async fn delete(&mut self, entity: &'static EntityMeta, record: &Record) -> Result<(), StorageError> {
        self.known(entity)?;
        let id = record
            .get_i64(entity.primary_key)
            .ok_or_else(|| StorageError::attribute("record has no primary key"))?;
        self.pending.push(Pending::Delete { entity, id });
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        let pending = std::mem::take(&mut self.pending);
        for op in pending {
            self.apply(op).await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.flush().await?;
        if !self.journal.is_empty() {
            let journal = std::mem::take(&mut self.journal);
            let mut tables = self.inner.tables.write().await;
            // Other sessions may have committed since our snapshot; recheck
            // against the live tables and apply all or nothing.
            let mut staged = tables.clone();
            let replayed = journal.iter().try_for_each(|(entity, id, image)| {
                write_image(*entity, *id, image.as_ref(), &self.inner.entities, &mut staged)
            });
            if let Err(err) = replayed {
                drop(tables);
                self.pending.clear();
                self.working = None;
                return Err(err);
            }
            *tables = staged;
            debug!("Committed memory session");
        }
        self.working = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.pending.clear();
        self.journal.clear();
        self.working = None;
        Ok(())
    }
}

fn column<'a>(entity: &'a EntityMeta, field: &str) -> Result<&'a crate::database::entity::ColumnDef, StorageError> {
    entity
        .column_def(field)
        .ok_or_else(|| StorageError::attribute(format!("column \"{}\" of relation \"{}\" does not exist", field, entity.name)))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// NOT NULL, UNIQUE and FOREIGN KEY checks, reported the way PostgreSQL does.
fn check_row(entity: &'static EntityMeta, id: i64, row: &Row, tables: &Tables) -> Result<(), StorageError> {
    for column in &entity.columns {
        let value = row.get(column.name).unwrap_or(&Value::Null);
        if !column.nullable && value.is_null() {
            let values: Vec<String> = entity
                .columns
                .iter()
                .map(|c| display(row.get(c.name).unwrap_or(&Value::Null)))
                .collect();
            return Err(StorageError::Integrity(WriteFailure {
                column: Some(column.name.to_string()),
                constraint: None,
                detail: Some(format!("Failing row contains ({}).", values.join(", "))),
            }));
        }
        if column.unique && !value.is_null() {
            let taken = tables
                .get(entity.name)
                .map(|t| t.iter().any(|(other, r)| *other != id && r.get(column.name) == Some(value)))
                .unwrap_or(false);
            if taken {
                return Err(StorageError::Integrity(WriteFailure {
                    column: None,
                    constraint: Some(format!("{}_{}_key", entity.name, column.name)),
                    detail: Some(format!("Key ({})=({}) already exists.", column.name, display(value))),
                }));
            }
        }
    }

    for fk in &entity.foreign_keys {
        let value = row.get(fk.column).unwrap_or(&Value::Null);
        if value.is_null() {
            continue;
        }
        let target = fk.target();
        let present = tables
            .get(target.name)
            .map(|t| t.values().any(|r| r.get(fk.target_column) == Some(value)))
            .unwrap_or(false)
            || (target.name == entity.name && row.get(fk.target_column) == Some(value));
        if !present {
            return Err(StorageError::Integrity(WriteFailure {
                column: None,
                constraint: Some(format!("{}_{}_fkey", entity.name, fk.column)),
                detail: Some(format!(
                    "Key ({})=({}) is not present in table \"{}\".",
                    fk.column,
                    display(value),
                    target.name
                )),
            }));
        }
    }
    Ok(())
}

/// Reject deleting a row other rows still reference.
fn check_restrict(
    entity: &'static EntityMeta,
    row: &Row,
    entities: &[&'static EntityMeta],
    tables: &Tables,
) -> Result<(), StorageError> {
    let id = row.get(entity.primary_key);
    for other in entities {
        for fk in &other.foreign_keys {
            if fk.target().name != entity.name {
                continue;
            }
            let Some(value) = row.get(fk.target_column).filter(|v| !v.is_null()) else {
                continue;
            };
            let referenced = tables
                .get(other.name)
                .map(|t| {
                    t.values().any(|r| {
                        let self_reference = other.name == entity.name && r.get(other.primary_key) == id;
                        !self_reference && r.get(fk.column) == Some(value)
                    })
                })
                .unwrap_or(false);
            if referenced {
                return Err(StorageError::Integrity(WriteFailure {
                    column: None,
                    constraint: Some(format!("{}_{}_fkey", other.name, fk.column)),
                    detail: Some(format!(
                        "Key ({})=({}) is still referenced from table \"{}\".",
                        fk.target_column,
                        display(value),
                        other.name
                    )),
                }));
            }
        }
    }
    Ok(())
}
