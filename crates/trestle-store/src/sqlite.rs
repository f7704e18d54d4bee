use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use trestle_config::WhenTrigger;

use crate::types::{FieldRow, TriggerRow};
use crate::{
  Error, FieldRecord, NewField, NewTrigger, RowFilter, RowRecord, Store, TableRecord, Trigger,
};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) a database file and run migrations.
  pub async fn open(path: &Path) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Open a private in-memory database and run migrations.
  ///
  /// The pool holds exactly one connection that never expires, since every
  /// in-memory connection is a separate database.
  pub async fn in_memory() -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .min_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect_with(options)
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

/// Map a unique-constraint violation to [`Error::AlreadyExists`].
fn unique_violation(err: sqlx::Error, what: impl FnOnce() -> String) -> Error {
  match &err {
    sqlx::Error::Database(db) if db.is_unique_violation() => Error::AlreadyExists(what()),
    _ => Error::Database(err),
  }
}

/// SQLite JSON path for a top-level object key.
fn json_path(key: &str) -> String {
  format!("$.\"{}\"", key)
}

fn not_found(err: sqlx::Error, what: impl FnOnce() -> String) -> Error {
  match err {
    sqlx::Error::RowNotFound => Error::NotFound(what()),
    other => Error::Database(other),
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_table(&self, name: &str, fields: &[NewField]) -> Result<TableRecord, Error> {
    let created_at = Utc::now();
    let mut tx = self.pool.begin().await?;

    let id = sqlx::query(
      r#"
            INSERT INTO tables (name, created_at)
            VALUES (?, ?)
            "#,
    )
    .bind(name)
    .bind(created_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| unique_violation(e, || format!("table '{}'", name)))?
    .last_insert_rowid();

    for field in fields {
      sqlx::query(
        r#"
            INSERT INTO fields (table_id, name, label, field_type, required)
            VALUES (?, ?, ?, ?, ?)
            "#,
      )
      .bind(id)
      .bind(&field.name)
      .bind(&field.label)
      .bind(field.field_type.as_str())
      .bind(field.required)
      .execute(&mut *tx)
      .await
      .map_err(|e| unique_violation(e, || format!("field '{}' on table '{}'", field.name, name)))?;
    }

    tx.commit().await?;

    Ok(TableRecord {
      id,
      name: name.to_string(),
      created_at,
    })
  }

  async fn get_table(&self, table_id: i64) -> Result<TableRecord, Error> {
    sqlx::query_as(
      r#"
            SELECT id, name, created_at
            FROM tables
            WHERE id = ?
            "#,
    )
    .bind(table_id)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| not_found(e, || format!("table {}", table_id)))
  }

  async fn get_table_by_name(&self, name: &str) -> Result<TableRecord, Error> {
    sqlx::query_as(
      r#"
            SELECT id, name, created_at
            FROM tables
            WHERE name = ?
            "#,
    )
    .bind(name)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| not_found(e, || format!("table '{}'", name)))
  }

  async fn list_tables(&self) -> Result<Vec<TableRecord>, Error> {
    Ok(
      sqlx::query_as(
        r#"
            SELECT id, name, created_at
            FROM tables
            ORDER BY name ASC
            "#,
      )
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn delete_table(&self, table_id: i64) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM tables WHERE id = ?")
      .bind(table_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("table {}", table_id)));
    }

    Ok(())
  }

  async fn list_fields(&self, table_id: i64) -> Result<Vec<FieldRecord>, Error> {
    let rows: Vec<FieldRow> = sqlx::query_as(
      r#"
            SELECT id, table_id, name, label, field_type, required
            FROM fields
            WHERE table_id = ?
            ORDER BY id ASC
            "#,
    )
    .bind(table_id)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(FieldRecord::try_from).collect()
  }

  async fn insert_row(&self, table_id: i64, data: &serde_json::Value) -> Result<i64, Error> {
    let result = sqlx::query(
      r#"
            INSERT INTO table_rows (table_id, data)
            VALUES (?, ?)
            "#,
    )
    .bind(table_id)
    .bind(Json(data))
    .execute(&self.pool)
    .await?;

    Ok(result.last_insert_rowid())
  }

  async fn get_row(&self, table_id: i64, row_id: i64) -> Result<RowRecord, Error> {
    sqlx::query_as(
      r#"
            SELECT id, table_id, data
            FROM table_rows
            WHERE table_id = ? AND id = ?
            "#,
    )
    .bind(table_id)
    .bind(row_id)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| not_found(e, || format!("row {} in table {}", row_id, table_id)))
  }

  async fn update_row(
    &self,
    table_id: i64,
    row_id: i64,
    data: &serde_json::Value,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE table_rows
            SET data = ?
            WHERE table_id = ? AND id = ?
            "#,
    )
    .bind(Json(data))
    .bind(table_id)
    .bind(row_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!(
        "row {} in table {}",
        row_id, table_id
      )));
    }

    Ok(())
  }

  async fn find_rows(&self, table_id: i64, filter: &RowFilter) -> Result<Vec<RowRecord>, Error> {
    let mut query: QueryBuilder<Sqlite> =
      QueryBuilder::new("SELECT id, table_id, data FROM table_rows WHERE table_id = ");
    query.push_bind(table_id);

    if let Some(row_id) = filter.id {
      query.push(" AND id = ").push_bind(row_id);
    }

    for (key, value) in &filter.equals {
      let path = json_path(key);
      if value.is_null() {
        // a missing key counts as null
        query
          .push(" AND (json_type(data, ")
          .push_bind(path.clone())
          .push(") IS NULL OR json_type(data, ")
          .push_bind(path)
          .push(") = 'null')");
      } else {
        // json_type keeps 1, 1.0 and true apart
        let expected = value.to_string();
        query
          .push(" AND json_type(data, ")
          .push_bind(path.clone())
          .push(") = json_type(")
          .push_bind(expected.clone())
          .push(", '$') AND json_extract(data, ")
          .push_bind(path)
          .push(") = json_extract(")
          .push_bind(expected)
          .push(", '$')");
      }
    }

    query.push(" ORDER BY id ASC");
    if let Some(limit) = filter.limit {
      query.push(" LIMIT ").push_bind(i64::from(limit));
    }

    Ok(query.build_query_as::<RowRecord>().fetch_all(&self.pool).await?)
  }

  async fn delete_rows(&self, table_id: i64, row_ids: &[i64]) -> Result<Vec<i64>, Error> {
    let mut tx = self.pool.begin().await?;
    let mut deleted = Vec::with_capacity(row_ids.len());

    for row_id in row_ids {
      let affected = sqlx::query("DELETE FROM table_rows WHERE table_id = ? AND id = ?")
        .bind(table_id)
        .bind(*row_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

      if affected > 0 {
        deleted.push(*row_id);
      }
    }

    tx.commit().await?;
    Ok(deleted)
  }

  async fn create_trigger(&self, trigger: &NewTrigger) -> Result<Trigger, Error> {
    let created_at = Utc::now();

    let result = sqlx::query(
      r#"
            INSERT INTO triggers (action, table_id, when_trigger, configuration, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
    )
    .bind(&trigger.action)
    .bind(trigger.table_id)
    .bind(trigger.when_trigger.as_str())
    .bind(Json(&trigger.configuration))
    .bind(created_at)
    .execute(&self.pool)
    .await
    .map_err(|e| match &e {
      sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
        Error::NotFound(format!("table {}", trigger.table_id))
      }
      _ => Error::Database(e),
    })?;

    Ok(Trigger {
      id: result.last_insert_rowid(),
      action: trigger.action.clone(),
      table_id: trigger.table_id,
      when_trigger: trigger.when_trigger,
      configuration: trigger.configuration.clone(),
      created_at,
    })
  }

  async fn get_trigger(&self, trigger_id: i64) -> Result<Trigger, Error> {
    let row: TriggerRow = sqlx::query_as(
      r#"
            SELECT id, action, table_id, when_trigger, configuration, created_at
            FROM triggers
            WHERE id = ?
            "#,
    )
    .bind(trigger_id)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| not_found(e, || format!("trigger {}", trigger_id)))?;

    row.try_into()
  }

  async fn update_trigger_configuration(
    &self,
    trigger_id: i64,
    configuration: &serde_json::Value,
  ) -> Result<(), Error> {
    let result = sqlx::query("UPDATE triggers SET configuration = ? WHERE id = ?")
      .bind(Json(configuration))
      .bind(trigger_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("trigger {}", trigger_id)));
    }

    Ok(())
  }

  async fn delete_trigger(&self, trigger_id: i64) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM triggers WHERE id = ?")
      .bind(trigger_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("trigger {}", trigger_id)));
    }

    Ok(())
  }

  async fn list_triggers(&self, table_id: i64) -> Result<Vec<Trigger>, Error> {
    let rows: Vec<TriggerRow> = sqlx::query_as(
      r#"
            SELECT id, action, table_id, when_trigger, configuration, created_at
            FROM triggers
            WHERE table_id = ?
            ORDER BY id ASC
            "#,
    )
    .bind(table_id)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(Trigger::try_from).collect()
  }

  async fn list_triggers_for(
    &self,
    table_id: i64,
    when_trigger: WhenTrigger,
  ) -> Result<Vec<Trigger>, Error> {
    let rows: Vec<TriggerRow> = sqlx::query_as(
      r#"
            SELECT id, action, table_id, when_trigger, configuration, created_at
            FROM triggers
            WHERE table_id = ? AND when_trigger = ?
            ORDER BY id ASC
            "#,
    )
    .bind(table_id)
    .bind(when_trigger.as_str())
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(Trigger::try_from).collect()
  }
}
