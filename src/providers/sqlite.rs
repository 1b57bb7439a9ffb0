use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::time::Duration;
use tracing::debug;

use super::{
    ExecutionMetadata, InstanceInfo, OrchestrationItem, Provider, ProviderError, STATUS_PENDING, STATUS_RUNNING,
    WorkItem,
};
use crate::{Event, EventKind, now_ms};

/// Configuration for [`SqliteProvider`].
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(60),
        }
    }
}

/// SQLite-backed provider. Every ack runs in one transaction.
pub struct SqliteProvider {
    pool: SqlitePool,
}

fn err(operation: &str) -> impl Fn(sqlx::Error) -> ProviderError + '_ {
    move |e| ProviderError::from_sqlx(operation, e)
}

impl SqliteProvider {
    /// Open (or create) a database, e.g. `sqlite:data.db?mode=rwc` or `sqlite::memory:`.
    pub async fn new(database_url: &str, options: Option<SqliteOptions>) -> Result<Self, sqlx::Error> {
        let options = options.unwrap_or_default();
        let is_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let busy_ms = options.busy_timeout.as_millis() as i64;
        let mut pool_options = SqlitePoolOptions::new().max_connections(options.max_connections);
        if is_memory {
            // One long-lived connection: the database lives only as long as it
            // stays open, and shared-cache table locks do not honor busy_timeout.
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if is_memory {
                        sqlx::query("PRAGMA journal_mode = MEMORY").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA synchronous = OFF").execute(&mut *conn).await?;
                    } else {
                        sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;
                    }
                    sqlx::query(&format!("PRAGMA busy_timeout = {busy_ms}"))
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        Self::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database shared by the connections of this pool.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        Self::new("sqlite::memory:", None).await
    }

    async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instances (
                instance_id TEXT PRIMARY KEY,
                orchestration_name TEXT NOT NULL,
                orchestration_version TEXT,
                status TEXT NOT NULL,
                output TEXT,
                custom_status TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                instance_id TEXT NOT NULL,
                event_id INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                event_data TEXT NOT NULL,
                PRIMARY KEY (instance_id, event_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orchestrator_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id TEXT NOT NULL,
                work_item TEXT NOT NULL,
                visible_at INTEGER NOT NULL,
                lock_token TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS worker_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id TEXT NOT NULL,
                work_item TEXT NOT NULL,
                visible_at INTEGER NOT NULL,
                lock_token TEXT,
                locked_until INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instance_locks (
                instance_id TEXT PRIMARY KEY,
                lock_token TEXT NOT NULL,
                locked_until INTEGER NOT NULL,
                locked_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orch_visible ON orchestrator_queue(visible_at, instance_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orch_lock ON orchestrator_queue(lock_token)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_worker_available ON worker_queue(visible_at, lock_token)")
            .execute(pool)
            .await?;

        Ok(())
    }

    fn generate_lock_token() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn now_millis() -> i64 {
        now_ms() as i64
    }

    fn timestamp_after(duration: Duration) -> i64 {
        Self::now_millis().saturating_add(duration.as_millis().min(i64::MAX as u128) as i64)
    }

    fn encode(operation: &str, item: &WorkItem) -> Result<String, ProviderError> {
        serde_json::to_string(item)
            .map_err(|e| ProviderError::permanent(operation, format!("Serialization error: {e}")))
    }

    async fn read_history_in_tx(tx: &mut Transaction<'_, Sqlite>, instance: &str) -> Result<Vec<Event>, ProviderError> {
        let rows = sqlx::query("SELECT event_data FROM history WHERE instance_id = ? ORDER BY event_id")
            .bind(instance)
            .fetch_all(&mut **tx)
            .await
            .map_err(err("read"))?;
        rows.iter()
            .map(|row| {
                let data: String = row.try_get("event_data").map_err(err("read"))?;
                serde_json::from_str::<Event>(&data)
                    .map_err(|e| ProviderError::permanent("read", format!("Failed to deserialize event: {e}")))
            })
            .collect()
    }

    /// Append events after checking they continue the stored history.
    async fn append_history_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        operation: &str,
        instance: &str,
        events: &[Event],
    ) -> Result<(), ProviderError> {
        if events.is_empty() {
            return Ok(());
        }
        let last: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(event_id), 0) FROM history WHERE instance_id = ?")
            .bind(instance)
            .fetch_one(&mut **tx)
            .await
            .map_err(err(operation))?;

        let mut expected = last as u64 + 1;
        for event in events {
            if event.event_id != expected {
                return Err(ProviderError::from_history(
                    operation,
                    crate::history::HistoryError::NonMonotonic {
                        expected,
                        actual: event.event_id,
                    },
                ));
            }
            expected += 1;

            let data = serde_json::to_string(event)
                .map_err(|e| ProviderError::permanent(operation, format!("Serialization error: {e}")))?;
            sqlx::query("INSERT INTO history (instance_id, event_id, event_type, event_data) VALUES (?, ?, ?, ?)")
                .bind(instance)
                .bind(event.event_id as i64)
                .bind(event.kind_name())
                .bind(data)
                .execute(&mut **tx)
                .await
                .map_err(err(operation))?;
        }
        Ok(())
    }

    async fn insert_orchestrator_item(
        tx: &mut Transaction<'_, Sqlite>,
        operation: &str,
        item: &WorkItem,
        visible_at: i64,
    ) -> Result<(), ProviderError> {
        sqlx::query("INSERT INTO orchestrator_queue (instance_id, work_item, visible_at) VALUES (?, ?, ?)")
            .bind(item.instance())
            .bind(Self::encode(operation, item)?)
            .bind(visible_at)
            .execute(&mut **tx)
            .await
            .map_err(err(operation))?;
        Ok(())
    }

    fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> Result<InstanceInfo, ProviderError> {
        let op = "get_instance_info";
        Ok(InstanceInfo {
            instance_id: row.try_get("instance_id").map_err(err(op))?,
            orchestration_name: row.try_get("orchestration_name").map_err(err(op))?,
            orchestration_version: row.try_get("orchestration_version").map_err(err(op))?,
            status: row.try_get("status").map_err(err(op))?,
            output: row.try_get("output").map_err(err(op))?,
            custom_status: row.try_get("custom_status").map_err(err(op))?,
            created_at_ms: row.try_get::<i64, _>("created_at").map_err(err(op))? as u64,
            updated_at_ms: row.try_get::<i64, _>("updated_at").map_err(err(op))? as u64,
        })
    }
}

#[async_trait::async_trait]
impl Provider for SqliteProvider {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_instance(
        &self,
        instance: &str,
        orchestration_name: &str,
        version: Option<&str>,
    ) -> Result<bool, ProviderError> {
        let now = Self::now_millis();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO instances
            (instance_id, orchestration_name, orchestration_version, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(instance)
        .bind(orchestration_name)
        .bind(version)
        .bind(STATUS_PENDING)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(err("create_instance"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn fetch_orchestration_item(&self, lock_timeout: Duration) -> Result<Option<OrchestrationItem>, ProviderError> {
        const OP: &str = "fetch_orchestration_item";
        let mut tx = self.pool.begin().await.map_err(err(OP))?;
        let now = Self::now_millis();

        // Oldest visible message whose instance is unlocked or whose lock expired.
        let row = sqlx::query(
            r#"
            SELECT q.instance_id
            FROM orchestrator_queue q
            LEFT JOIN instance_locks il ON q.instance_id = il.instance_id
            WHERE q.visible_at <= ?1
              AND (il.instance_id IS NULL OR il.locked_until <= ?1)
            ORDER BY q.id
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(err(OP))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Ok(None);
        };
        let instance_id: String = row.try_get("instance_id").map_err(err(OP))?;

        let lock_token = Self::generate_lock_token();
        let locked_until = Self::timestamp_after(lock_timeout);
        let acquired = sqlx::query(
            r#"
            INSERT INTO instance_locks (instance_id, lock_token, locked_until, locked_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(instance_id) DO UPDATE
            SET lock_token = ?2, locked_until = ?3, locked_at = ?4
            WHERE locked_until <= ?4
            "#,
        )
        .bind(&instance_id)
        .bind(&lock_token)
        .bind(locked_until)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(err(OP))?;
        if acquired.rows_affected() == 0 {
            debug!(target: "durafan::providers::sqlite", instance = %instance_id, "Instance already locked");
            tx.rollback().await.ok();
            return Ok(None);
        }

        // Mark every visible message of the instance, including ones left behind by an expired lock.
        sqlx::query("UPDATE orchestrator_queue SET lock_token = ?1 WHERE instance_id = ?2 AND visible_at <= ?3")
            .bind(&lock_token)
            .bind(&instance_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(err(OP))?;

        let rows = sqlx::query("SELECT work_item FROM orchestrator_queue WHERE lock_token = ? ORDER BY id")
            .bind(&lock_token)
            .fetch_all(&mut *tx)
            .await
            .map_err(err(OP))?;
        let mut messages = Vec::with_capacity(rows.len());
        for r in &rows {
            let raw: String = r.try_get("work_item").map_err(err(OP))?;
            let item: WorkItem = serde_json::from_str(&raw)
                .map_err(|e| ProviderError::permanent(OP, format!("Deserialization error: {e}")))?;
            messages.push(item);
        }

        let info = sqlx::query("SELECT orchestration_name, orchestration_version FROM instances WHERE instance_id = ?")
            .bind(&instance_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(err(OP))?;
        let (orchestration_name, version) = match info {
            Some(r) => (
                r.try_get::<String, _>("orchestration_name").map_err(err(OP))?,
                r.try_get::<Option<String>, _>("orchestration_version").map_err(err(OP))?,
            ),
            None => messages
                .iter()
                .find_map(|m| match m {
                    WorkItem::StartOrchestration {
                        orchestration, version, ..
                    } => Some((orchestration.clone(), version.clone())),
                    _ => None,
                })
                .unwrap_or_default(),
        };
        let history = Self::read_history_in_tx(&mut tx, &instance_id).await?;

        tx.commit().await.map_err(err(OP))?;

        debug!(
            target: "durafan::providers::sqlite",
            instance = %instance_id,
            messages = messages.len(),
            history_len = history.len(),
            "Fetched orchestration item"
        );

        Ok(Some(OrchestrationItem {
            instance: instance_id,
            orchestration_name,
            version,
            history,
            messages,
            lock_token,
        }))
    }

    async fn ack_orchestration_item(
        &self,
        lock_token: &str,
        history_delta: Vec<Event>,
        worker_items: Vec<WorkItem>,
        orchestrator_items: Vec<WorkItem>,
        metadata: ExecutionMetadata,
    ) -> Result<(), ProviderError> {
        const OP: &str = "ack_orchestration_item";
        let mut tx = self.pool.begin().await.map_err(err(OP))?;
        let now = Self::now_millis();

        let row = sqlx::query("SELECT instance_id, locked_until FROM instance_locks WHERE lock_token = ?")
            .bind(lock_token)
            .fetch_optional(&mut *tx)
            .await
            .map_err(err(OP))?
            .ok_or_else(|| ProviderError::permanent(OP, "Invalid lock token"))?;
        let instance_id: String = row.try_get("instance_id").map_err(err(OP))?;
        let locked_until: i64 = row.try_get("locked_until").map_err(err(OP))?;
        if locked_until <= now {
            tracing::warn!(
                target: "durafan::providers::sqlite",
                instance = %instance_id,
                "Instance lock expired, aborting ack"
            );
            tx.rollback().await.ok();
            return Err(ProviderError::permanent(OP, "Instance lock expired"));
        }

        Self::append_history_in_tx(&mut tx, OP, &instance_id, &history_delta).await?;

        sqlx::query("DELETE FROM orchestrator_queue WHERE lock_token = ?")
            .bind(lock_token)
            .execute(&mut *tx)
            .await
            .map_err(err(OP))?;

        let name = metadata.orchestration_name.clone().unwrap_or_default();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO instances
            (instance_id, orchestration_name, orchestration_version, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance_id)
        .bind(&name)
        .bind(&metadata.orchestration_version)
        .bind(STATUS_RUNNING)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(err(OP))?;

        sqlx::query(
            r#"
            UPDATE instances
            SET orchestration_name = COALESCE(?1, orchestration_name),
                orchestration_version = COALESCE(?2, orchestration_version),
                status = CASE WHEN ?3 IS NOT NULL THEN ?3
                              WHEN status = ?4 THEN ?5
                              ELSE status END,
                output = CASE WHEN ?3 IS NOT NULL THEN ?6 ELSE output END,
                custom_status = CASE WHEN ?7 THEN ?8 ELSE custom_status END,
                updated_at = ?9
            WHERE instance_id = ?10
            "#,
        )
        .bind(&metadata.orchestration_name)
        .bind(&metadata.orchestration_version)
        .bind(&metadata.status)
        .bind(STATUS_PENDING)
        .bind(STATUS_RUNNING)
        .bind(&metadata.output)
        .bind(metadata.custom_status.is_some())
        .bind(metadata.custom_status.clone().flatten())
        .bind(now)
        .bind(&instance_id)
        .execute(&mut *tx)
        .await
        .map_err(err(OP))?;

        for item in &worker_items {
            sqlx::query("INSERT INTO worker_queue (instance_id, work_item, visible_at) VALUES (?, ?, ?)")
                .bind(item.instance())
                .bind(Self::encode(OP, item)?)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(err(OP))?;
        }
        for item in &orchestrator_items {
            let visible_at = item.visible_at(now as u64) as i64;
            Self::insert_orchestrator_item(&mut tx, OP, item, visible_at).await?;
        }

        sqlx::query("DELETE FROM instance_locks WHERE instance_id = ? AND lock_token = ?")
            .bind(&instance_id)
            .bind(lock_token)
            .execute(&mut *tx)
            .await
            .map_err(err(OP))?;

        tx.commit().await.map_err(err(OP))?;

        debug!(
            target: "durafan::providers::sqlite",
            instance = %instance_id,
            history_delta = history_delta.len(),
            worker_items = worker_items.len(),
            orchestrator_items = orchestrator_items.len(),
            "Acknowledged orchestration item and released lock"
        );
        Ok(())
    }

    async fn abandon_orchestration_item(&self, lock_token: &str, delay: Option<Duration>) -> Result<(), ProviderError> {
        const OP: &str = "abandon_orchestration_item";
        let mut tx = self.pool.begin().await.map_err(err(OP))?;

        let removed = sqlx::query("DELETE FROM instance_locks WHERE lock_token = ?")
            .bind(lock_token)
            .execute(&mut *tx)
            .await
            .map_err(err(OP))?;
        if removed.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(ProviderError::permanent(OP, "Invalid lock token"));
        }

        match delay {
            Some(d) => {
                sqlx::query("UPDATE orchestrator_queue SET lock_token = NULL, visible_at = ? WHERE lock_token = ?")
                    .bind(Self::timestamp_after(d))
                    .bind(lock_token)
                    .execute(&mut *tx)
                    .await
                    .map_err(err(OP))?;
            }
            None => {
                sqlx::query("UPDATE orchestrator_queue SET lock_token = NULL WHERE lock_token = ?")
                    .bind(lock_token)
                    .execute(&mut *tx)
                    .await
                    .map_err(err(OP))?;
            }
        }

        tx.commit().await.map_err(err(OP))?;
        Ok(())
    }

    async fn fetch_work_item(&self, lock_timeout: Duration) -> Result<Option<(WorkItem, String)>, ProviderError> {
        const OP: &str = "fetch_work_item";
        let mut tx = self.pool.begin().await.map_err(err(OP))?;
        let now = Self::now_millis();

        let next = sqlx::query(
            r#"
            SELECT id, work_item FROM worker_queue
            WHERE visible_at <= ?1
              AND (lock_token IS NULL OR locked_until <= ?1)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(err(OP))?;
        let Some(next) = next else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let id: i64 = next.try_get("id").map_err(err(OP))?;
        let raw: String = next.try_get("work_item").map_err(err(OP))?;
        let item: WorkItem = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::permanent(OP, format!("Deserialization error: {e}")))?;

        let token = Self::generate_lock_token();
        sqlx::query("UPDATE worker_queue SET lock_token = ?1, locked_until = ?2 WHERE id = ?3")
            .bind(&token)
            .bind(Self::timestamp_after(lock_timeout))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(err(OP))?;

        tx.commit().await.map_err(err(OP))?;
        Ok(Some((item, token)))
    }

    async fn ack_work_item(&self, token: &str, completion: Option<WorkItem>) -> Result<(), ProviderError> {
        const OP: &str = "ack_work_item";
        if let Some(c) = &completion
            && !matches!(c, WorkItem::ActivityCompleted { .. } | WorkItem::ActivityFailed { .. })
        {
            return Err(ProviderError::permanent(OP, "Invalid completion type for worker ack"));
        }

        let mut tx = self.pool.begin().await.map_err(err(OP))?;
        let deleted = sqlx::query("DELETE FROM worker_queue WHERE lock_token = ?")
            .bind(token)
            .execute(&mut *tx)
            .await
            .map_err(err(OP))?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(ProviderError::permanent(OP, "Invalid lock token"));
        }

        if let Some(completion) = &completion {
            Self::insert_orchestrator_item(&mut tx, OP, completion, Self::now_millis()).await?;
        }
        tx.commit().await.map_err(err(OP))?;

        debug!(
            target: "durafan::providers::sqlite",
            completion = completion.is_some(),
            "Acked work item"
        );
        Ok(())
    }

    async fn abandon_work_item(&self, token: &str, delay: Option<Duration>) -> Result<(), ProviderError> {
        let visible_at = Self::timestamp_after(delay.unwrap_or_default());
        let result = sqlx::query(
            "UPDATE worker_queue SET lock_token = NULL, locked_until = NULL, visible_at = ? WHERE lock_token = ?",
        )
        .bind(visible_at)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(err("abandon_work_item"))?;
        if result.rows_affected() == 0 {
            return Err(ProviderError::permanent("abandon_work_item", "Invalid lock token"));
        }
        Ok(())
    }

    async fn enqueue_for_orchestrator(&self, item: WorkItem, delay: Option<Duration>) -> Result<(), ProviderError> {
        const OP: &str = "enqueue_for_orchestrator";
        let now = Self::now_millis();
        let visible_at = (item.visible_at(now as u64) as i64).max(Self::timestamp_after(delay.unwrap_or_default()));
        sqlx::query("INSERT INTO orchestrator_queue (instance_id, work_item, visible_at) VALUES (?, ?, ?)")
            .bind(item.instance())
            .bind(Self::encode(OP, &item)?)
            .bind(visible_at)
            .execute(&self.pool)
            .await
            .map_err(err(OP))?;
        Ok(())
    }

    async fn read(&self, instance: &str) -> Result<Vec<Event>, ProviderError> {
        let mut tx = self.pool.begin().await.map_err(err("read"))?;
        let events = Self::read_history_in_tx(&mut tx, instance).await?;
        tx.commit().await.map_err(err("read"))?;
        Ok(events)
    }

    async fn append(&self, instance: &str, events: Vec<Event>) -> Result<(), ProviderError> {
        const OP: &str = "append";
        let mut tx = self.pool.begin().await.map_err(err(OP))?;
        Self::append_history_in_tx(&mut tx, OP, instance, &events).await?;

        if let Some((name, version)) = events.iter().find_map(|e| match &e.kind {
            EventKind::OrchestrationStarted { name, version, .. } => Some((name.clone(), version.clone())),
            _ => None,
        }) {
            let now = Self::now_millis();
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO instances
                (instance_id, orchestration_name, orchestration_version, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(instance)
            .bind(name)
            .bind(version)
            .bind(STATUS_RUNNING)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(err(OP))?;
        }

        tx.commit().await.map_err(err(OP))?;
        Ok(())
    }

    async fn get_instance_info(&self, instance: &str) -> Result<Option<InstanceInfo>, ProviderError> {
        let row = sqlx::query(
            r#"
            SELECT instance_id, orchestration_name, orchestration_version, status, output,
                   custom_status, created_at, updated_at
            FROM instances WHERE instance_id = ?
            "#,
        )
        .bind(instance)
        .fetch_optional(&self.pool)
        .await
        .map_err(err("get_instance_info"))?;
        row.as_ref().map(Self::row_to_info).transpose()
    }

    async fn list_instances(&self) -> Result<Vec<String>, ProviderError> {
        sqlx::query_scalar::<_, String>("SELECT instance_id FROM instances ORDER BY instance_id")
            .fetch_all(&self.pool)
            .await
            .map_err(err("list_instances"))
    }
}
