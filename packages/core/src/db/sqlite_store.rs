//! SqliteStore - TreeStore Implementation for libsql
//!
//! Persists `TreeNode`s in a single table whose name and tree columns come
//! from [`TreeConfig`]. The store owns one connection, so `BEGIN`/`COMMIT`/
//! `ROLLBACK` issued through the trait always apply to the statements in between.
//! Transactions nest: a `begin` inside an open transaction opens a savepoint,
//! and its `commit`/`rollback` release or roll back to that savepoint.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "nodes" (
//!     "id" TEXT PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     "parent_id" TEXT REFERENCES "nodes"("id") ON DELETE CASCADE,
//!     "path" TEXT NOT NULL DEFAULT '',
//!     "depth" INTEGER NOT NULL DEFAULT 0,
//!     "ordering" INTEGER,
//!     properties JSON NOT NULL DEFAULT '{}',
//!     created_at TEXT NOT NULL,
//!     modified_at TEXT NOT NULL
//! )
//! ```
//!
//! plus indexes on path, parent and (parent, order).
//!
//! # Examples
//!
//! ```rust,no_run
//! use treepath_core::config::TreeConfig;
//! use treepath_core::db::{SqliteStore, TreeStore};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::open(PathBuf::from("./data/tree.db"), TreeConfig::default()).await?;
//!     let node = store.find("node-123").await?;
//!     println!("{:?}", node);
//!     Ok(())
//! }
//! ```

use crate::config::TreeConfig;
use crate::db::error::DatabaseError;
use crate::db::sql::SqlRenderer;
use crate::db::TreeStore;
use crate::models::{Filter, TreeNode, TreeQuery};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::params::Params;
use libsql::{Builder, Connection, Database, Row, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// libsql-backed store for `TreeNode`
pub struct SqliteStore {
    /// Kept alive for the lifetime of the connection
    _db: Database,
    conn: Connection,
    config: TreeConfig,
    db_path: PathBuf,
    /// Open transactions on `conn`; levels above one are savepoints
    depth: AtomicUsize,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and bootstrap the schema
    ///
    /// # Errors
    ///
    /// - Configuration fails validation
    /// - Parent directory cannot be created
    /// - Connection or schema creation fails
    pub async fn open(db_path: PathBuf, config: TreeConfig) -> Result<Self, DatabaseError> {
        config.validate().map_err(DatabaseError::invalid_config)?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        Self::from_database(db, db_path, config).await
    }

    /// Private in-memory database, mainly for tests
    pub async fn open_in_memory(config: TreeConfig) -> Result<Self, DatabaseError> {
        config.validate().map_err(DatabaseError::invalid_config)?;

        let db_path = PathBuf::from(":memory:");
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        Self::from_database(db, db_path, config).await
    }

    async fn from_database(
        db: Database,
        db_path: PathBuf,
        config: TreeConfig,
    ) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            _db: db,
            conn,
            config,
            db_path,
            depth: AtomicUsize::new(0),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Number of open, nested transactions
    pub fn transaction_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    fn savepoint(level: usize) -> String {
        format!("\"tree_savepoint_{}\"", level)
    }

    /// PRAGMA statements return rows, so they go through `query`
    async fn execute_pragma(&self, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = self.conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create the table and indexes (idempotent)
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.execute_pragma("PRAGMA busy_timeout = 5000").await?;
        self.execute_pragma("PRAGMA foreign_keys = ON").await?;

        let sql = SqlRenderer::new(&self.config);
        let table = sql.table();

        self.conn
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        {key} TEXT PRIMARY KEY,
                        name TEXT NOT NULL,
                        {parent} TEXT REFERENCES {table}({key}) ON DELETE CASCADE,
                        {path} TEXT NOT NULL DEFAULT '',
                        {depth} INTEGER NOT NULL DEFAULT 0,
                        {order} INTEGER,
                        properties JSON NOT NULL DEFAULT '{{}}',
                        created_at TEXT NOT NULL,
                        modified_at TEXT NOT NULL
                    )",
                    table = table,
                    key = sql.key(),
                    parent = sql.parent(),
                    path = sql.path(),
                    depth = sql.depth(),
                    order = sql.order(),
                ),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create table {}: {}",
                    table, e
                ))
            })?;

        let indexes = [
            ("path", sql.path()),
            ("parent", sql.parent()),
            ("parent_order", format!("{}, {}", sql.parent(), sql.order())),
        ];
        for (suffix, columns) in indexes {
            let name = format!("idx_{}_{}", self.config.table, suffix);
            self.conn
                .execute(
                    &format!(
                        "CREATE INDEX IF NOT EXISTS \"{}\" ON {}({})",
                        name, table, columns
                    ),
                    (),
                )
                .await
                .map_err(|e| {
                    DatabaseError::initialization_failed(format!(
                        "Failed to create index '{}': {}",
                        name, e
                    ))
                })?;
        }

        tracing::info!(
            "Tree schema ready: table {} at {}",
            self.config.table,
            self.db_path.display()
        );
        Ok(())
    }

    /// Run a statement and return the number of changed rows
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let changed = self
            .conn
            .execute(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("{}: {}", sql, e)))?;
        Ok(changed)
    }

    /// Run a query and decode each row while the cursor is on it
    ///
    /// A libsql `Row` is only readable until the cursor advances, so rows are
    /// never collected undecoded.
    async fn rows<T>(
        &self,
        sql: &str,
        params: Vec<Value>,
        decode: impl Fn(&Row) -> Result<T> + Send,
    ) -> Result<Vec<T>> {
        let mut rows = self
            .conn
            .query(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("{}: {}", sql, e)))?;

        let mut decoded = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            decoded.push(decode(&row)?);
        }
        Ok(decoded)
    }

    /// Parse timestamp from either SQLite's `CURRENT_TIMESTAMP` or RFC3339 format
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        Err(anyhow::anyhow!(
            "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
            s
        ))
    }

    /// Convert a row selected with `select_columns` into a node
    fn row_to_node(row: &Row) -> Result<TreeNode> {
        let key: String = row.get(0).context("Failed to get key")?;
        let name: String = row.get(1).context("Failed to get name")?;
        let parent_key: Option<String> = row.get(2).context("Failed to get parent key")?;
        let path: String = row.get(3).context("Failed to get path")?;
        let depth: i64 = row.get(4).context("Failed to get depth")?;
        let order: Option<i64> = row.get(5).context("Failed to get order")?;
        let properties_json: String = row.get(6).context("Failed to get properties")?;
        let created_at_str: String = row.get(7).context("Failed to get created_at")?;
        let modified_at_str: String = row.get(8).context("Failed to get modified_at")?;

        let depth = u32::try_from(depth)
            .map_err(|_| DatabaseError::row_decode(format!("negative depth for {}", key)))?;

        Ok(TreeNode {
            key,
            name,
            parent_key,
            path,
            depth,
            order,
            properties: serde_json::from_str(&properties_json)
                .context("Failed to parse properties JSON")?,
            created_at: Self::parse_timestamp(&created_at_str)
                .context("Failed to parse created_at")?,
            modified_at: Self::parse_timestamp(&modified_at_str)
                .context("Failed to parse modified_at")?,
        })
    }

    fn node_values(node: &TreeNode) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(node.name.clone()),
            node.parent_key.clone().map_or(Value::Null, Value::Text),
            Value::Text(node.path.clone()),
            Value::Integer(i64::from(node.depth)),
            node.order.map_or(Value::Null, Value::Integer),
            Value::Text(serde_json::to_string(&node.properties)?),
            Value::Text(node.created_at.to_rfc3339()),
            Value::Text(node.modified_at.to_rfc3339()),
        ])
    }

    /// First column of the first row (`None` for no rows or NULL)
    async fn scalar(&self, sql: &str, params: Vec<Value>) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("{}: {}", sql, e)))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(row
                .get::<Option<i64>>(0)
                .with_context(|| format!("Failed to read scalar from '{}'", sql))?),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TreeStore for SqliteStore {
    type Node = TreeNode;

    async fn find(&self, key: &str) -> Result<Option<TreeNode>> {
        let query = TreeQuery::new(Filter::KeyEq(key.to_string())).with_limit(1);
        Ok(self.query(&query).await?.into_iter().next())
    }

    async fn insert(&self, node: TreeNode) -> Result<TreeNode> {
        let sql = SqlRenderer::new(&self.config);
        let statement = format!(
            "INSERT INTO {} ({}, name, {}, {}, {}, {}, properties, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            sql.table(),
            sql.key(),
            sql.parent(),
            sql.path(),
            sql.depth(),
            sql.order()
        );

        let mut params = vec![Value::Text(node.key.clone())];
        params.extend(Self::node_values(&node)?);
        self.execute(&statement, params)
            .await
            .with_context(|| format!("Failed to insert node {}", node.key))?;
        Ok(node)
    }

    async fn save(&self, node: &TreeNode) -> Result<()> {
        let sql = SqlRenderer::new(&self.config);
        let statement = format!(
            "UPDATE {} SET name = ?, {} = ?, {} = ?, {} = ?, {} = ?,
                 properties = ?, created_at = ?, modified_at = ?
             WHERE {} = ?",
            sql.table(),
            sql.parent(),
            sql.path(),
            sql.depth(),
            sql.order(),
            sql.key()
        );

        let mut params = Self::node_values(node)?;
        params.push(Value::Text(node.key.clone()));
        let changed = self
            .execute(&statement, params)
            .await
            .with_context(|| format!("Failed to save node {}", node.key))?;

        if changed == 0 {
            bail!("Node {} does not exist", node.key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let sql = SqlRenderer::new(&self.config);

        // The cascade is not reflected in the change count, so size the subtree first
        let count_statement = format!(
            "WITH RECURSIVE subtree(k) AS (
                 SELECT {key} FROM {table} WHERE {key} = ?
                 UNION
                 SELECT t.{key} FROM {table} t JOIN subtree ON t.{parent} = subtree.k
             )
             SELECT COUNT(*) FROM subtree",
            key = sql.key(),
            table = sql.table(),
            parent = sql.parent()
        );
        let removed = self
            .scalar(&count_statement, vec![Value::Text(key.to_string())])
            .await?
            .unwrap_or(0);
        if removed == 0 {
            return Ok(0);
        }

        let statement = format!("DELETE FROM {} WHERE {} = ?", sql.table(), sql.key());
        self.execute(&statement, vec![Value::Text(key.to_string())])
            .await
            .with_context(|| format!("Failed to delete node {}", key))?;

        tracing::debug!("Deleted node {} and {} descendants", key, removed - 1);
        Ok(removed as u64)
    }

    async fn query(&self, query: &TreeQuery) -> Result<Vec<TreeNode>> {
        let sql = SqlRenderer::new(&self.config);
        let mut params = Vec::new();
        let mut statement = format!(
            "SELECT {} FROM {} WHERE {} {}",
            sql.select_columns(),
            sql.table(),
            sql.where_clause(&query.filter, &mut params),
            sql.order_clause(&query.order_by)
        );
        if let Some(limit) = query.limit {
            statement.push_str(&format!(" LIMIT {}", limit));
        }

        self.rows(&statement, params, Self::row_to_node).await
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let sql = SqlRenderer::new(&self.config);
        let mut params = Vec::new();
        let statement = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            sql.table(),
            sql.where_clause(filter, &mut params)
        );

        let count = self.scalar(&statement, params).await?.unwrap_or(0);
        Ok(count as u64)
    }

    async fn max_order(&self, filter: &Filter) -> Result<Option<i64>> {
        let sql = SqlRenderer::new(&self.config);
        let mut params = Vec::new();
        let statement = format!(
            "SELECT MAX({}) FROM {} WHERE {}",
            sql.order(),
            sql.table(),
            sql.where_clause(filter, &mut params)
        );

        self.scalar(&statement, params).await
    }

    async fn set_order(&self, key: &str, order: i64) -> Result<()> {
        let sql = SqlRenderer::new(&self.config);
        let statement = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            sql.table(),
            sql.order(),
            sql.key()
        );

        let changed = self
            .execute(
                &statement,
                vec![Value::Integer(order), Value::Text(key.to_string())],
            )
            .await?;
        if changed == 0 {
            bail!("Node {} does not exist", key);
        }
        Ok(())
    }

    async fn increment_order(&self, filter: &Filter) -> Result<u64> {
        let sql = SqlRenderer::new(&self.config);
        let mut params = Vec::new();
        let statement = format!(
            "UPDATE {table} SET {order} = {order} + 1 WHERE {order} IS NOT NULL AND {filter}",
            table = sql.table(),
            order = sql.order(),
            filter = sql.where_clause(filter, &mut params)
        );

        self.execute(&statement, params).await
    }

    async fn begin(&self) -> Result<()> {
        let depth = self.depth.load(Ordering::SeqCst);
        if depth == 0 {
            self.execute("BEGIN TRANSACTION", Vec::new()).await?;
        } else {
            let statement = format!("SAVEPOINT {}", Self::savepoint(depth));
            self.execute(&statement, Vec::new()).await?;
        }
        self.depth.store(depth + 1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        match self.depth.load(Ordering::SeqCst) {
            0 => bail!("cannot commit - no transaction is active"),
            1 => {
                self.execute("COMMIT", Vec::new()).await?;
                self.depth.store(0, Ordering::SeqCst);
            }
            depth => {
                let statement = format!("RELEASE SAVEPOINT {}", Self::savepoint(depth - 1));
                self.execute(&statement, Vec::new()).await?;
                self.depth.store(depth - 1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        match self.depth.load(Ordering::SeqCst) {
            0 => bail!("cannot rollback - no transaction is active"),
            1 => {
                self.execute("ROLLBACK", Vec::new()).await?;
                self.depth.store(0, Ordering::SeqCst);
            }
            depth => {
                let savepoint = Self::savepoint(depth - 1);
                self.execute(&format!("ROLLBACK TO SAVEPOINT {}", savepoint), Vec::new())
                    .await?;
                self.execute(&format!("RELEASE SAVEPOINT {}", savepoint), Vec::new())
                    .await?;
                self.depth.store(depth - 1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}
