//! Migraciones de esquema
//!
//! Ledger versionado (`schema_migrations`): cada migración se aplica una sola
//! vez y queda registrada. Todo el recorrido se ejecuta bajo un advisory lock
//! de PostgreSQL para que dos instancias que arrancan a la vez no compitan
//! por el DDL. Ningún paso borra ni altera datos existentes.

use async_trait::async_trait;
use regex::Regex;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Row};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::utils::errors::{AppError, AppResult};

/// Clave fija del advisory lock de migraciones
pub const MIGRATION_LOCK_KEY: i64 = 0x5645_4849_434c_4531;

/// Paso individual de una migración
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    CreateTable {
        table: &'static str,
        columns: &'static [(&'static str, &'static str)],
        constraints: &'static [&'static str],
    },
    EnsureColumn {
        table: &'static str,
        column: &'static str,
        column_type: &'static str,
    },
    EnsureIndex {
        name: &'static str,
        table: &'static str,
        expr: &'static str,
        unique: bool,
        predicate: Option<&'static str>,
    },
}

impl MigrationStep {
    /// SQL equivalente del paso (siempre idempotente)
    pub fn to_sql(&self) -> String {
        match self {
            MigrationStep::CreateTable { table, columns, constraints } => {
                let mut defs: Vec<String> =
                    columns.iter().map(|(c, t)| format!("{} {}", c, t)).collect();
                defs.extend(constraints.iter().map(|c| c.to_string()));
                format!("CREATE TABLE IF NOT EXISTS {} ({})", table, defs.join(", "))
            }
            MigrationStep::EnsureColumn { table, column, column_type } => {
                format!("ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}", table, column, column_type)
            }
            MigrationStep::EnsureIndex { name, table, expr, unique, predicate } => {
                let mut sql = format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                    if *unique { "UNIQUE " } else { "" },
                    name,
                    table,
                    expr
                );
                if let Some(p) = predicate {
                    sql.push_str(" WHERE ");
                    sql.push_str(p);
                }
                sql
            }
        }
    }
}

/// Migración versionada
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub steps: &'static [MigrationStep],
}

/// Migraciones del sistema, en orden estrictamente creciente
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_batches",
        steps: &[
            MigrationStep::CreateTable {
                table: "batches",
                columns: &[
                    ("id", "BIGSERIAL PRIMARY KEY"),
                    ("label", "TEXT NOT NULL UNIQUE"),
                    ("description", "TEXT"),
                    ("created_at", "TIMESTAMPTZ NOT NULL"),
                    ("status", "TEXT NOT NULL DEFAULT 'draft'"),
                ],
                constraints: &["CHECK (status IN ('draft', 'active', 'archived'))"],
            },
            MigrationStep::EnsureIndex {
                name: "ux_batches_single_active",
                table: "batches",
                expr: "status",
                unique: true,
                predicate: Some("status = 'active'"),
            },
        ],
    },
    Migration {
        version: 2,
        name: "create_data_files",
        steps: &[MigrationStep::CreateTable {
            table: "data_files",
            columns: &[
                ("id", "BIGSERIAL PRIMARY KEY"),
                ("batch_id", "BIGINT NOT NULL REFERENCES batches(id) ON DELETE CASCADE"),
                ("original_filename", "TEXT NOT NULL"),
                ("sheet_kind", "TEXT NOT NULL"),
                ("file_size", "BIGINT NOT NULL DEFAULT 0"),
                ("checksum", "TEXT NOT NULL"),
                ("record_count", "BIGINT NOT NULL DEFAULT 0"),
                ("uploaded_at", "TIMESTAMPTZ NOT NULL"),
            ],
            constraints: &[],
        }],
    },
    Migration {
        version: 3,
        name: "create_vehicle_records",
        steps: &[
            MigrationStep::CreateTable {
                table: "vehicle_records",
                columns: &[
                    ("id", "BIGSERIAL PRIMARY KEY"),
                    ("batch_id", "BIGINT NOT NULL REFERENCES batches(id) ON DELETE CASCADE"),
                    ("data_file_id", "BIGINT NOT NULL REFERENCES data_files(id) ON DELETE CASCADE"),
                    ("category", "TEXT NOT NULL"),
                    ("plate", "TEXT NOT NULL"),
                    ("vehicle_type", "TEXT"),
                    ("owner_name", "TEXT NOT NULL"),
                    ("owner_name_norm", "TEXT NOT NULL"),
                    ("registered_address", "TEXT"),
                    ("neighborhood", "TEXT"),
                    ("permanent_address", "TEXT"),
                    ("current_address", "TEXT"),
                    ("owner_address_norm", "TEXT"),
                    ("chassis_number", "TEXT"),
                    ("engine_number", "TEXT"),
                    ("phone", "TEXT"),
                    ("document_type", "TEXT"),
                    ("document_number", "TEXT"),
                    ("document_number_norm", "TEXT"),
                    ("plate_color", "TEXT"),
                    ("vehicle_status", "TEXT"),
                    ("registration_status", "TEXT"),
                ],
                constraints: &["UNIQUE (batch_id, category, plate)"],
            },
            MigrationStep::EnsureIndex {
                name: "ix_vehicle_records_document",
                table: "vehicle_records",
                expr: "batch_id, document_number_norm",
                unique: false,
                predicate: None,
            },
        ],
    },
    Migration {
        version: 4,
        name: "create_owner_records",
        steps: &[
            MigrationStep::CreateTable {
                table: "owner_records",
                columns: &[
                    ("id", "BIGSERIAL PRIMARY KEY"),
                    ("batch_id", "BIGINT NOT NULL REFERENCES batches(id) ON DELETE CASCADE"),
                    ("data_file_id", "BIGINT NOT NULL REFERENCES data_files(id) ON DELETE CASCADE"),
                    ("full_name", "TEXT NOT NULL"),
                    ("name_norm", "TEXT NOT NULL"),
                    ("address", "TEXT"),
                    ("address_norm", "TEXT"),
                    ("national_id", "TEXT"),
                    ("national_id_norm", "TEXT"),
                    ("declared_plate", "TEXT"),
                    ("resident", "BOOLEAN NOT NULL DEFAULT TRUE"),
                ],
                constraints: &[],
            },
            MigrationStep::EnsureIndex {
                name: "ix_owner_records_identity",
                table: "owner_records",
                expr: "batch_id, name_norm, address_norm",
                unique: false,
                predicate: None,
            },
            MigrationStep::EnsureIndex {
                name: "ix_owner_records_national_id",
                table: "owner_records",
                expr: "batch_id, national_id_norm",
                unique: false,
                predicate: None,
            },
            MigrationStep::EnsureIndex {
                name: "ix_owner_records_plate",
                table: "owner_records",
                expr: "batch_id, declared_plate",
                unique: false,
                predicate: None,
            },
        ],
    },
    Migration {
        version: 5,
        name: "create_requests",
        steps: &[
            MigrationStep::CreateTable {
                table: "requests",
                columns: &[
                    ("tracking_code", "TEXT PRIMARY KEY"),
                    ("form_number", "SMALLINT NOT NULL"),
                    ("plate", "TEXT NOT NULL"),
                    ("category", "TEXT NOT NULL"),
                    ("batch_id", "BIGINT REFERENCES batches(id) ON DELETE SET NULL"),
                    ("fields", "JSONB NOT NULL DEFAULT '{}'"),
                    ("status", "TEXT NOT NULL DEFAULT 'received'"),
                    ("submitted_at", "TIMESTAMPTZ NOT NULL"),
                ],
                constraints: &["CHECK (form_number BETWEEN 1 AND 10)"],
            },
            MigrationStep::EnsureIndex {
                name: "ix_requests_form_submitted",
                table: "requests",
                expr: "form_number, submitted_at",
                unique: false,
                predicate: None,
            },
            MigrationStep::EnsureIndex {
                name: "ix_requests_status",
                table: "requests",
                expr: "status",
                unique: false,
                predicate: None,
            },
        ],
    },
    Migration {
        version: 6,
        name: "request_review_tracking",
        steps: &[
            MigrationStep::EnsureColumn {
                table: "requests",
                column: "reviewed_by",
                column_type: "TEXT",
            },
            MigrationStep::EnsureColumn {
                table: "requests",
                column: "reviewed_at",
                column_type: "TIMESTAMPTZ",
            },
            MigrationStep::EnsureColumn {
                table: "requests",
                column: "exported_at",
                column_type: "TIMESTAMPTZ",
            },
        ],
    },
    Migration {
        version: 7,
        name: "vehicle_search_indexes",
        steps: &[
            MigrationStep::EnsureIndex {
                name: "ix_vehicle_records_chassis",
                table: "vehicle_records",
                expr: "chassis_number",
                unique: false,
                predicate: None,
            },
            MigrationStep::EnsureIndex {
                name: "ix_vehicle_records_engine",
                table: "vehicle_records",
                expr: "engine_number",
                unique: false,
                predicate: None,
            },
            MigrationStep::EnsureIndex {
                name: "ix_vehicle_records_phone",
                table: "vehicle_records",
                expr: "phone",
                unique: false,
                predicate: None,
            },
        ],
    },
];

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("valid identifier regex"))
}

fn column_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_ (),']+$").expect("valid type regex"))
}

/// Valida un identificador SQL (tabla o columna)
pub fn validate_identifier(name: &str) -> AppResult<()> {
    if identifier_re().is_match(name) {
        Ok(())
    } else {
        Err(AppError::Migration(format!("invalid SQL identifier '{}'", name)))
    }
}

fn validate_column_type(ty: &str) -> AppResult<()> {
    if column_type_re().is_match(ty) && !ty.contains(';') {
        Ok(())
    } else {
        Err(AppError::Migration(format!("invalid column type '{}'", ty)))
    }
}

/// Operaciones del catálogo de esquema que necesita el migrador
#[async_trait]
pub trait SchemaBackend: Send {
    /// Exclusión mutua entre procesos durante toda la ejecución
    async fn lock(&mut self) -> AppResult<()>;
    async fn unlock(&mut self) -> AppResult<()>;
    async fn ensure_ledger(&mut self) -> AppResult<()>;
    async fn applied_versions(&mut self) -> AppResult<BTreeSet<i64>>;
    async fn column_exists(&mut self, table: &str, column: &str) -> AppResult<bool>;
    async fn begin(&mut self) -> AppResult<()>;
    async fn commit(&mut self) -> AppResult<()>;
    async fn rollback(&mut self) -> AppResult<()>;
    async fn apply(&mut self, step: &MigrationStep) -> AppResult<()>;
    async fn record(&mut self, migration: &Migration) -> AppResult<()>;
}

/// Resultado de una ejecución del migrador
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<i64>,
    pub skipped: Vec<i64>,
}

/// Ejecuta el ledger de migraciones sobre un backend
pub struct SchemaMigrator<B: SchemaBackend> {
    backend: B,
    migrations: &'static [Migration],
}

impl SchemaMigrator<PgSchemaBackend> {
    /// Migrador sobre una conexión dedicada del pool
    pub async fn for_pool(pool: &PgPool) -> AppResult<Self> {
        let conn = pool
            .acquire()
            .await
            .map_err(|e| AppError::Migration(format!("cannot acquire connection: {}", e)))?;
        Ok(Self::new(PgSchemaBackend { conn }))
    }
}

impl<B: SchemaBackend> SchemaMigrator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, migrations: MIGRATIONS }
    }

    pub fn with_migrations(backend: B, migrations: &'static [Migration]) -> Self {
        Self { backend, migrations }
    }

    /// Aplica las migraciones pendientes; seguro de invocar en cada arranque
    pub async fn run(&mut self) -> AppResult<MigrationReport> {
        check_migration_order(self.migrations)?;

        self.backend.lock().await?;
        let result = self.run_locked().await;
        if let Err(e) = self.backend.unlock().await {
            warn!("⚠️ No se pudo liberar el lock de migraciones: {}", e);
        }
        result
    }

    async fn run_locked(&mut self) -> AppResult<MigrationReport> {
        self.backend.ensure_ledger().await?;
        let applied = self.backend.applied_versions().await?;
        let mut report = MigrationReport::default();

        for migration in self.migrations {
            if applied.contains(&migration.version) {
                debug!("⏭️ Migración {} ({}) ya aplicada", migration.version, migration.name);
                report.skipped.push(migration.version);
                continue;
            }

            info!("🔧 Aplicando migración {} ({})", migration.version, migration.name);
            self.backend.begin().await?;
            match self.apply_migration(migration).await {
                Ok(()) => {
                    self.backend.commit().await?;
                    report.applied.push(migration.version);
                }
                Err(e) => {
                    if let Err(rb) = self.backend.rollback().await {
                        warn!("⚠️ Rollback de migración {} falló: {}", migration.version, rb);
                    }
                    return Err(AppError::Migration(format!(
                        "migration {} ({}) failed: {}",
                        migration.version, migration.name, e
                    )));
                }
            }
        }

        info!(
            "✅ Esquema al día (aplicadas: {:?}, omitidas: {})",
            report.applied,
            report.skipped.len()
        );
        Ok(report)
    }

    async fn apply_migration(&mut self, migration: &Migration) -> AppResult<()> {
        for step in migration.steps {
            match step {
                MigrationStep::EnsureColumn { table, column, column_type } => {
                    self.ensure_column_unlocked(*table, *column, *column_type).await?;
                }
                other => self.backend.apply(other).await?,
            }
        }
        self.backend.record(migration).await
    }

    /// Añade una columna si no existe. Devuelve `true` si la añadió.
    pub async fn ensure_column(
        &mut self,
        table: &'static str,
        column: &'static str,
        column_type: &'static str,
    ) -> AppResult<bool> {
        self.backend.lock().await?;
        let result = self.ensure_column_unlocked(table, column, column_type).await;
        if let Err(e) = self.backend.unlock().await {
            warn!("⚠️ No se pudo liberar el lock de migraciones: {}", e);
        }
        result
    }

    async fn ensure_column_unlocked(
        &mut self,
        table: &'static str,
        column: &'static str,
        column_type: &'static str,
    ) -> AppResult<bool> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        validate_column_type(column_type)?;

        if self.backend.column_exists(table, column).await? {
            debug!("Columna {}.{} ya existe", table, column);
            return Ok(false);
        }

        info!("➕ Añadiendo columna {}.{} {}", table, column, column_type);
        self.backend
            .apply(&MigrationStep::EnsureColumn { table, column, column_type })
            .await?;
        Ok(true)
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

/// Verifica que las versiones sean únicas y crecientes
pub fn check_migration_order(migrations: &[Migration]) -> AppResult<()> {
    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(AppError::Migration(format!(
                "migration versions out of order: {} after {}",
                pair[1].version, pair[0].version
            )));
        }
    }
    Ok(())
}

/// Backend PostgreSQL sobre una conexión fija (el advisory lock es de sesión)
pub struct PgSchemaBackend {
    conn: PoolConnection<Postgres>,
}

fn migration_err(e: sqlx::Error) -> AppError {
    AppError::Migration(e.to_string())
}

#[async_trait]
impl SchemaBackend for PgSchemaBackend {
    async fn lock(&mut self) -> AppResult<()> {
        info!("🔒 Esperando lock de migraciones...");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *self.conn)
            .await
            .map_err(migration_err)?;
        Ok(())
    }

    async fn unlock(&mut self) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *self.conn)
            .await
            .map_err(migration_err)?;
        Ok(())
    }

    async fn ensure_ledger(&mut self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&mut *self.conn)
        .await
        .map_err(migration_err)?;
        Ok(())
    }

    async fn applied_versions(&mut self) -> AppResult<BTreeSet<i64>> {
        let rows = sqlx::query("SELECT version FROM schema_migrations")
            .fetch_all(&mut *self.conn)
            .await
            .map_err(migration_err)?;
        rows.iter()
            .map(|r| r.try_get::<i64, _>("version").map_err(migration_err))
            .collect()
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> AppResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2
            )",
        )
        .bind(table)
        .bind(column)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(migration_err)?;
        Ok(exists)
    }

    async fn begin(&mut self) -> AppResult<()> {
        sqlx::query("BEGIN").execute(&mut *self.conn).await.map_err(migration_err)?;
        Ok(())
    }

    async fn commit(&mut self) -> AppResult<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await.map_err(migration_err)?;
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await.map_err(migration_err)?;
        Ok(())
    }

    async fn apply(&mut self, step: &MigrationStep) -> AppResult<()> {
        let sql = step.to_sql();
        debug!("SQL: {}", sql);
        sqlx::query(&sql).execute(&mut *self.conn).await.map_err(migration_err)?;
        Ok(())
    }

    async fn record(&mut self, migration: &Migration) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)
             ON CONFLICT (version) DO NOTHING",
        )
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *self.conn)
        .await
        .map_err(migration_err)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! Catálogo en memoria que simula PostgreSQL para los tests del migrador

    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use tokio::sync::{Mutex, OwnedMutexGuard};

    #[derive(Debug, Default, Clone)]
    pub struct CatalogState {
        pub tables: BTreeMap<String, BTreeSet<String>>,
        pub indexes: BTreeSet<String>,
        pub applied: BTreeSet<i64>,
        pub statements: usize,
    }

    /// Catálogo compartido entre "procesos"
    #[derive(Clone, Default)]
    pub struct MemoryCatalog {
        pub state: Arc<Mutex<CatalogState>>,
        lock: Arc<Mutex<()>>,
    }

    pub struct MemoryBackend {
        catalog: MemoryCatalog,
        guard: Option<OwnedMutexGuard<()>>,
        pending: Option<CatalogState>,
        fail_on: Option<&'static str>,
    }

    impl MemoryCatalog {
        pub fn backend(&self) -> MemoryBackend {
            MemoryBackend { catalog: self.clone(), guard: None, pending: None, fail_on: None }
        }

        pub fn failing_backend(&self, table: &'static str) -> MemoryBackend {
            MemoryBackend { fail_on: Some(table), ..self.backend() }
        }

        pub async fn snapshot(&self) -> CatalogState {
            self.state.lock().await.clone()
        }
    }

    impl MemoryBackend {
        async fn working(&mut self) -> CatalogState {
            match &self.pending {
                Some(p) => p.clone(),
                None => self.catalog.state.lock().await.clone(),
            }
        }

        async fn store(&mut self, state: CatalogState) {
            if self.pending.is_some() {
                self.pending = Some(state);
            } else {
                *self.catalog.state.lock().await = state;
            }
        }
    }

    #[async_trait]
    impl SchemaBackend for MemoryBackend {
        async fn lock(&mut self) -> AppResult<()> {
            self.guard = Some(self.catalog.lock.clone().lock_owned().await);
            Ok(())
        }

        async fn unlock(&mut self) -> AppResult<()> {
            self.guard = None;
            Ok(())
        }

        async fn ensure_ledger(&mut self) -> AppResult<()> {
            Ok(())
        }

        async fn applied_versions(&mut self) -> AppResult<BTreeSet<i64>> {
            Ok(self.working().await.applied)
        }

        async fn column_exists(&mut self, table: &str, column: &str) -> AppResult<bool> {
            Ok(self
                .working()
                .await
                .tables
                .get(table)
                .map_or(false, |cols| cols.contains(column)))
        }

        async fn begin(&mut self) -> AppResult<()> {
            self.pending = Some(self.catalog.state.lock().await.clone());
            Ok(())
        }

        async fn commit(&mut self) -> AppResult<()> {
            if let Some(p) = self.pending.take() {
                *self.catalog.state.lock().await = p;
            }
            Ok(())
        }

        async fn rollback(&mut self) -> AppResult<()> {
            self.pending = None;
            Ok(())
        }

        async fn apply(&mut self, step: &MigrationStep) -> AppResult<()> {
            let mut state = self.working().await;
            state.statements += 1;
            match step {
                MigrationStep::CreateTable { table, columns, .. } => {
                    if self.fail_on == Some(*table) {
                        return Err(AppError::Migration(format!("boom on {}", table)));
                    }
                    state
                        .tables
                        .entry(table.to_string())
                        .or_insert_with(|| columns.iter().map(|(c, _)| c.to_string()).collect());
                }
                MigrationStep::EnsureColumn { table, column, .. } => {
                    let cols = state.tables.get_mut(*table).ok_or_else(|| {
                        AppError::Migration(format!("relation {} does not exist", table))
                    })?;
                    // Sin comprobación previa, un ADD COLUMN duplicado falla como en PostgreSQL
                    if !cols.insert(column.to_string()) {
                        return Err(AppError::Migration(format!(
                            "column {} of relation {} already exists",
                            column, table
                        )));
                    }
                }
                MigrationStep::EnsureIndex { name, .. } => {
                    state.indexes.insert(name.to_string());
                }
            }
            self.store(state).await;
            Ok(())
        }

        async fn record(&mut self, migration: &Migration) -> AppResult<()> {
            let mut state = self.working().await;
            state.applied.insert(migration.version);
            self.store(state).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryCatalog;
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        assert!(check_migration_order(MIGRATIONS).is_ok());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("requests").is_ok());
        assert!(validate_identifier("reviewed_at").is_ok());
        assert!(validate_identifier("requests; DROP TABLE x").is_err());
        assert!(validate_identifier("Requests").is_err());
        assert!(validate_column_type("TIMESTAMPTZ").is_ok());
        assert!(validate_column_type("TEXT; DROP").is_err());
    }

    #[test]
    fn test_step_sql() {
        let step = MigrationStep::EnsureColumn {
            table: "requests",
            column: "reviewed_by",
            column_type: "TEXT",
        };
        assert_eq!(step.to_sql(), "ALTER TABLE requests ADD COLUMN IF NOT EXISTS reviewed_by TEXT");

        let idx = MigrationStep::EnsureIndex {
            name: "ux_batches_single_active",
            table: "batches",
            expr: "status",
            unique: true,
            predicate: Some("status = 'active'"),
        };
        assert_eq!(
            idx.to_sql(),
            "CREATE UNIQUE INDEX IF NOT EXISTS ux_batches_single_active ON batches (status) WHERE status = 'active'"
        );
    }

    #[tokio::test]
    async fn test_run_twice_is_idempotent() {
        let catalog = MemoryCatalog::default();

        let first = SchemaMigrator::new(catalog.backend()).run().await.unwrap();
        assert_eq!(first.applied.len(), MIGRATIONS.len());
        let after_first = catalog.snapshot().await;

        let second = SchemaMigrator::new(catalog.backend()).run().await.unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped.len(), MIGRATIONS.len());

        let after_second = catalog.snapshot().await;
        assert_eq!(after_first.tables, after_second.tables);
        assert_eq!(after_first.indexes, after_second.indexes);
        assert!(after_second.tables["requests"].contains("exported_at"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_converge() {
        let catalog = MemoryCatalog::default();
        let mut a = SchemaMigrator::new(catalog.backend());
        let mut b = SchemaMigrator::new(catalog.backend());

        let (ra, rb) = tokio::join!(a.run(), b.run());
        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        assert_eq!(ra.applied.len() + rb.applied.len(), MIGRATIONS.len());

        let reference = MemoryCatalog::default();
        SchemaMigrator::new(reference.backend()).run().await.unwrap();
        assert_eq!(catalog.snapshot().await.tables, reference.snapshot().await.tables);
    }

    #[tokio::test]
    async fn test_ensure_column_twice() {
        let catalog = MemoryCatalog::default();
        SchemaMigrator::new(catalog.backend()).run().await.unwrap();

        let mut migrator = SchemaMigrator::new(catalog.backend());
        assert!(migrator.ensure_column("requests", "mirror_note", "TEXT").await.unwrap());
        assert!(!migrator.ensure_column("requests", "mirror_note", "TEXT").await.unwrap());

        let state = catalog.snapshot().await;
        assert!(state.tables["requests"].contains("mirror_note"));
    }

    #[tokio::test]
    async fn test_failed_migration_is_not_recorded() {
        let catalog = MemoryCatalog::default();
        let err = SchemaMigrator::new(catalog.failing_backend("owner_records"))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Migration(_)));

        let state = catalog.snapshot().await;
        assert!(state.applied.contains(&3));
        assert!(!state.applied.contains(&4));
        assert!(!state.tables.contains_key("owner_records"));

        // Un arranque posterior completa el resto
        let report = SchemaMigrator::new(catalog.backend()).run().await.unwrap();
        assert_eq!(report.applied, vec![4, 5, 6, 7]);
    }
}
