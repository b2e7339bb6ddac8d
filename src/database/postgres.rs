use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgDatabaseError};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use crate::database::entity::{ColumnKind, EntityMeta};
use crate::database::record::Record;
use crate::database::storage::{AttributeError, Storage, StorageError, StorageSession};
use crate::error::WriteFailure;
use crate::filter::FilterSet;

/// PostgreSQL storage collaborator.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        Ok(Box::new(PgSession {
            pool: self.pool.clone(),
            tx: None,
        }))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(map_sqlx)?;
        Ok(())
    }
}

/// Session over one lazily opened transaction. Statements execute as soon as
/// they are issued, so `flush` has nothing left to send.
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StorageError> {
        if self.tx.is_none() {
            let tx = self.pool.begin().await.map_err(map_sqlx)?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| StorageError::Unavailable("transaction not open".to_string()))
    }

    async fn fetch(
        &mut self,
        entity: &'static EntityMeta,
        filters: &FilterSet,
        limit: Option<i64>,
    ) -> Result<Vec<Record>, StorageError> {
        let mut sql = format!("SELECT row_to_json(t) AS row FROM {} t", quote(entity.name));
        let mut params = Vec::new();
        let mut clauses = Vec::new();
        for (field, value) in filters.iter() {
            let kind = column_kind(entity, field)?;
            let value = kind.coerce(value).map_err(StorageError::attribute)?;
            if value.is_null() {
                clauses.push(format!("t.{} IS NULL", quote(field)));
            } else {
                params.push((kind, value));
                clauses.push(format!("t.{} = ${}::{}", quote(field), params.len(), kind.cast_type()));
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY t.{}", quote(entity.primary_key)));
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        debug!("{}", sql);
        let mut query = sqlx::query(&sql);
        for (kind, value) in &params {
            query = bind_param(query, *kind, value);
        }
        let tx = self.tx().await?;
        let rows = query.fetch_all(&mut **tx).await.map_err(map_sqlx)?;
        rows.iter().map(|row| read_row(row).map(Record::from_row)).collect()
    }

    async fn insert(&mut self, entity: &'static EntityMeta, record: &mut Record) -> Result<(), StorageError> {
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        let mut params = Vec::new();
        for (field, value) in record.fields() {
            if field == entity.primary_key && value.is_null() {
                continue;
            }
            let kind = column_kind(entity, field)?;
            params.push((kind, value.clone()));
            columns.push(quote(field));
            placeholders.push(format!("${}::{}", params.len(), kind.cast_type()));
        }

        let insert = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote(entity.name))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                quote(entity.name),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        let row = self.write_returning(&insert, &params).await?;
        record.mark_clean(row.ok_or(StorageError::NotFound)?);
        Ok(())
    }

    async fn update(&mut self, entity: &'static EntityMeta, record: &mut Record) -> Result<(), StorageError> {
        let pk = record
            .get(entity.primary_key)
            .cloned()
            .ok_or_else(|| StorageError::attribute("record has no primary key"))?;

        let mut sets = Vec::new();
        let mut params = Vec::new();
        for field in record.modified_fields() {
            if field == entity.primary_key {
                continue;
            }
            let kind = column_kind(entity, field)?;
            let value = record.get(field).cloned().unwrap_or(Value::Null);
            params.push((kind, value));
            sets.push(format!("{} = ${}::{}", quote(field), params.len(), kind.cast_type()));
        }
        if sets.is_empty() {
            return Ok(());
        }

        let pk_kind = column_kind(entity, entity.primary_key)?;
        params.push((pk_kind, pk));
        let update = format!(
            "UPDATE {} SET {} WHERE {} = ${}::{} RETURNING *",
            quote(entity.name),
            sets.join(", "),
            quote(entity.primary_key),
            params.len(),
            pk_kind.cast_type()
        );
        let row = self.write_returning(&update, &params).await?;
        record.mark_clean(row.ok_or(StorageError::NotFound)?);
        Ok(())
    }

    async fn write_returning(
        &mut self,
        statement: &str,
        params: &[(ColumnKind, Value)],
    ) -> Result<Option<Map<String, Value>>, StorageError> {
        let sql = format!("WITH written AS ({}) SELECT row_to_json(written) AS row FROM written", statement);
        debug!("{}", sql);
        let mut query = sqlx::query(&sql);
        for (kind, value) in params {
            query = bind_param(query, *kind, value);
        }
        let tx = self.tx().await?;
        let row = query.fetch_optional(&mut **tx).await.map_err(map_sqlx)?;
        row.as_ref().map(read_row).transpose()
    }
}

#[async_trait]
impl StorageSession for PgSession {
    async fn fetch_one(&mut self, entity: &'static EntityMeta, filters: &FilterSet) -> Result<Record, StorageError> {
        let mut rows = self.fetch(entity, filters, Some(2)).await?;
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
        self.fetch(entity, filters, None).await
    }

    async fn persist(
        &mut self,
        entity: &'static EntityMeta,
        record: &mut Record,
        commit: bool,
    ) -> Result<(), StorageError> {
        if record.is_null(entity.primary_key) {
            self.insert(entity, record).await?;
        } else {
            self.update(entity, record).await?;
        }
        if commit {
            self.commit().await?;
        }
        Ok(())
    }

    async fn delete(&mut self, entity: &'static EntityMeta, record: &Record) -> Result<(), StorageError> {
        let pk = record
            .get(entity.primary_key)
            .cloned()
            .ok_or_else(|| StorageError::attribute("record has no primary key"))?;
        let pk_kind = column_kind(entity, entity.primary_key)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1::{}",
            quote(entity.name),
            quote(entity.primary_key),
            pk_kind.cast_type()
        );
        debug!("{}", sql);
        let query = bind_param(sqlx::query(&sql), pk_kind, &pk);
        let tx = self.tx().await?;
        let result = query.execute(&mut **tx).await.map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(map_sqlx)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(map_sqlx)?;
        }
        Ok(())
    }
}

fn column_kind(entity: &'static EntityMeta, field: &str) -> Result<ColumnKind, StorageError> {
    entity
        .column_def(field)
        .map(|c| c.kind)
        .ok_or_else(|| StorageError::attribute(format!("column \"{}\" of relation \"{}\" does not exist", field, entity.name)))
}

fn read_row(row: &sqlx::postgres::PgRow) -> Result<Map<String, Value>, StorageError> {
    let value: Value = row.try_get("row").map_err(map_sqlx)?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::attribute(format!("unexpected row shape: {}", other))),
    }
}

/// Quote SQL identifier to prevent injection
pub(crate) fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, Postgres, PgArguments>,
    kind: ColumnKind,
    v: &'q Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    if kind == ColumnKind::Json {
        return q.bind(sqlx::types::Json(v));
    }
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => q.bind(sqlx::types::Json(v)),
    }
}

/// Classify a driver error: integrity violations (SQLSTATE class 23) carry the
/// store's diagnostics, data exceptions (class 22) and undefined columns
/// (42703) are attribute errors, everything else is infrastructure.
pub(crate) fn map_sqlx(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(pg) = db.try_downcast_ref::<PgDatabaseError>() {
            let code = pg.code();
            if code.starts_with("23") {
                return StorageError::Integrity(WriteFailure {
                    column: pg.column().map(str::to_string),
                    constraint: pg.constraint().map(str::to_string),
                    detail: pg.detail().map(str::to_string),
                });
            }
            if code.starts_with("22") || code == "42703" {
                return StorageError::Attribute(AttributeError::Message(pg.message().to_string()));
            }
        }
    }
    StorageError::Sqlx(err)
}
