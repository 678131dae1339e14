//! Catalog service
//!
//! Owns the live [`SqliteStore`] and the persistence lifecycle around it:
//! - loads the persisted snapshot, or the seed snapshot on a cold start
//! - runs every domain mutation as one transaction
//! - checkpoints the whole database into the snapshot slot after each mutation
//!
//! Link integrity is maintained here, since the store has no foreign keys:
//! links are only inserted for rows that exist, and every delete removes the
//! row's links in the same transaction.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use crossbeam::channel::RecvTimeoutError;
use rusqlite::params;
use crate::model::{Entity, EntityKind, Link, Model, ModelId, ModelLink, Part, PartId, PartLink};
use crate::persist::{SeedSource, SnapshotSlot};
use crate::storage::{Executor, SqliteStore, StoreStats};
use crate::{Error, Result};

/// Default key of the persisted snapshot
pub const DEFAULT_SNAPSHOT_KEY: &str = "carparts.db";

/// Default bound on the whole initial load
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Key the snapshot is persisted under
    pub snapshot_key: String,
    /// Deadline for all I/O performed by [`CatalogService::initialize`]
    pub load_timeout: Duration,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }
}

/// Where the loaded catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadOrigin {
    /// A snapshot persisted by an earlier session
    Persisted,
    /// The seed snapshot, now also persisted
    Seed,
}

/// Lifecycle state of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

enum Phase {
    Uninitialized,
    Loading,
    Ready(Loaded),
    Failed(String),
}

struct Loaded {
    store: SqliteStore,
    /// Last snapshot known to be in the slot; restored when a checkpoint fails
    durable: Vec<u8>,
    origin: LoadOrigin,
}

/// Fixed statements for one entity kind
struct KindSql {
    list: &'static str,
    matching: &'static str,
    exists: &'static str,
    unlink: &'static str,
    remove: &'static str,
}

const MODEL_SQL: KindSql = KindSql {
    list: "SELECT id, name FROM car_models ORDER BY id",
    matching: "SELECT id, name FROM car_models WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id",
    exists: "SELECT 1 FROM car_models WHERE id = ?1",
    unlink: "DELETE FROM car_part_models WHERE car_id = ?1",
    remove: "DELETE FROM car_models WHERE id = ?1",
};

const PART_SQL: KindSql = KindSql {
    list: "SELECT id, part_number, name FROM car_parts ORDER BY id",
    matching: "SELECT id, part_number, name FROM car_parts WHERE part_number LIKE ?1 ESCAPE '\\' ORDER BY id",
    exists: "SELECT 1 FROM car_parts WHERE id = ?1",
    unlink: "DELETE FROM car_part_models WHERE part_id = ?1",
    remove: "DELETE FROM car_parts WHERE id = ?1",
};

fn statements(kind: EntityKind) -> &'static KindSql {
    match kind {
        EntityKind::Model => &MODEL_SQL,
        EntityKind::Part => &PART_SQL,
    }
}

/// Domain operations over the catalog, with snapshot persistence
pub struct CatalogService {
    slot: Arc<dyn SnapshotSlot>,
    seed: Arc<dyn SeedSource>,
    options: CatalogOptions,
    phase: Phase,
}

impl CatalogService {
    pub fn new(slot: Arc<dyn SnapshotSlot>, seed: Arc<dyn SeedSource>, options: CatalogOptions) -> Self {
        Self {
            slot,
            seed,
            options,
            phase: Phase::Uninitialized,
        }
    }

    pub fn state(&self) -> ServiceState {
        match self.phase {
            Phase::Uninitialized => ServiceState::Uninitialized,
            Phase::Loading => ServiceState::Loading,
            Phase::Ready(_) => ServiceState::Ready,
            Phase::Failed(_) => ServiceState::Failed,
        }
    }

    /// Reason the load failed, when in the `Failed` state
    pub fn failure(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    // ========== Lifecycle ==========

    /// Load the catalog, from the persisted snapshot if there is a usable one,
    /// otherwise from the seed.
    ///
    /// A failure leaves the service `Failed` for the rest of the session.
    pub fn initialize(&mut self) -> Result<LoadOrigin> {
        match &self.phase {
            Phase::Ready(loaded) => return Ok(loaded.origin),
            Phase::Failed(_) | Phase::Loading => return Err(Error::NotReady),
            Phase::Uninitialized => {}
        }

        self.phase = Phase::Loading;
        match self.load() {
            Ok(loaded) => {
                let origin = loaded.origin;
                tracing::info!("Catalog ready (loaded from {:?} snapshot)", origin);
                self.phase = Phase::Ready(loaded);
                Ok(origin)
            }
            Err(e) => {
                tracing::error!("Catalog failed to load: {}", e);
                self.phase = Phase::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn load(&self) -> Result<Loaded> {
        let timeout = self.options.load_timeout;
        let deadline = Instant::now() + timeout;

        let slot = Arc::clone(&self.slot);
        let key = self.options.snapshot_key.clone();
        let persisted = run_bounded(deadline, timeout, move || slot.load(&key))?;

        if let Some(bytes) = persisted {
            match SqliteStore::reconstruct(&bytes) {
                Ok(store) => {
                    return Ok(Loaded {
                        store,
                        durable: bytes,
                        origin: LoadOrigin::Persisted,
                    });
                }
                Err(Error::CorruptSnapshot(reason)) => {
                    tracing::warn!("Persisted snapshot is unusable ({}), falling back to seed", reason);
                }
                Err(e) => return Err(e),
            }
        }

        let seed = Arc::clone(&self.seed);
        tracing::info!("Loading seed snapshot from {}", seed.describe());
        let seed_bytes = run_bounded(deadline, timeout, move || seed.fetch())?;
        let store = SqliteStore::reconstruct(&seed_bytes)?;
        let snapshot = store.serialize()?;

        let slot = Arc::clone(&self.slot);
        let key = self.options.snapshot_key.clone();
        let staged = snapshot.clone();
        run_bounded(deadline, timeout, move || slot.store(&key, &staged))?;
        log_checkpoint(&snapshot);

        Ok(Loaded {
            store,
            durable: snapshot,
            origin: LoadOrigin::Seed,
        })
    }

    fn ready(&self) -> Result<&SqliteStore> {
        match &self.phase {
            Phase::Ready(loaded) => Ok(&loaded.store),
            _ => Err(Error::NotReady),
        }
    }

    fn ready_mut(&mut self) -> Result<&mut SqliteStore> {
        match &mut self.phase {
            Phase::Ready(loaded) => Ok(&mut loaded.store),
            _ => Err(Error::NotReady),
        }
    }

    /// Persist the committed state, or roll the in-memory store back to the
    /// last durable snapshot if that fails.
    fn checkpoint(&mut self) -> Result<()> {
        let Phase::Ready(loaded) = &mut self.phase else {
            return Err(Error::NotReady);
        };

        let key = &self.options.snapshot_key;
        let written = loaded
            .store
            .serialize()
            .and_then(|snapshot| self.slot.store(key, &snapshot).map(|()| snapshot));

        let failure = match written {
            Ok(snapshot) => {
                log_checkpoint(&snapshot);
                loaded.durable = snapshot;
                return Ok(());
            }
            Err(e) => e.to_string(),
        };

        tracing::warn!("Snapshot write failed, rolling back in-memory catalog: {}", failure);
        match SqliteStore::reconstruct(&loaded.durable) {
            Ok(store) => {
                loaded.store = store;
                Err(Error::Persistence(failure))
            }
            Err(rollback) => {
                tracing::error!("Rollback to last durable snapshot failed: {}", rollback);
                self.phase = Phase::Failed(format!("{}; rollback failed: {}", failure, rollback));
                Err(Error::Persistence(failure))
            }
        }
    }

    // ========== Queries ==========

    /// Substring search over model names or part numbers.
    ///
    /// An empty term lists every row of the kind.
    pub fn search(&self, kind: EntityKind, term: &str) -> Result<Vec<Entity>> {
        let exec = self.ready()?.exec();
        let sql = statements(kind);

        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Entity> {
            Ok(match kind {
                EntityKind::Model => Entity::Model(Model {
                    id: row.get(0)?,
                    name: row.get(1)?,
                }),
                EntityKind::Part => Entity::Part(Part {
                    id: row.get(0)?,
                    part_number: row.get(1)?,
                    name: row.get(2)?,
                }),
            })
        };

        if term.is_empty() {
            exec.query_rows(sql.list, params![], map)
        } else {
            exec.query_rows(sql.matching, params![like_pattern(term)], map)
        }
    }

    pub fn model(&self, id: ModelId) -> Result<Option<Model>> {
        let rows = self.ready()?.exec().query_rows(
            "SELECT id, name FROM car_models WHERE id = ?1",
            params![id],
            |row| Ok(Model { id: row.get(0)?, name: row.get(1)? }),
        )?;
        Ok(rows.into_iter().next())
    }

    pub fn part(&self, id: PartId) -> Result<Option<Part>> {
        let rows = self.ready()?.exec().query_rows(
            "SELECT id, part_number, name FROM car_parts WHERE id = ?1",
            params![id],
            |row| {
                Ok(Part {
                    id: row.get(0)?,
                    part_number: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )?;
        Ok(rows.into_iter().next())
    }

    /// Parts compatible with a model
    pub fn links_for_model(&self, model_id: ModelId) -> Result<Vec<PartLink>> {
        self.ready()?.exec().query_rows(
            r#"
            SELECT p.id, p.name, p.part_number, l.is_primary
            FROM car_part_models l
            JOIN car_parts p ON p.id = l.part_id
            WHERE l.car_id = ?1
            ORDER BY p.id
            "#,
            params![model_id],
            |row| {
                Ok(PartLink {
                    part_id: row.get(0)?,
                    part_name: row.get(1)?,
                    part_number: row.get(2)?,
                    is_primary: row.get(3)?,
                })
            },
        )
    }

    /// Models compatible with a part
    pub fn links_for_part(&self, part_id: PartId) -> Result<Vec<ModelLink>> {
        self.ready()?.exec().query_rows(
            r#"
            SELECT m.id, m.name, l.is_primary
            FROM car_part_models l
            JOIN car_models m ON m.id = l.car_id
            WHERE l.part_id = ?1
            ORDER BY m.id
            "#,
            params![part_id],
            |row| {
                Ok(ModelLink {
                    model_id: row.get(0)?,
                    model_name: row.get(1)?,
                    is_primary: row.get(2)?,
                })
            },
        )
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.ready()?.stats()
    }

    // ========== Mutations ==========

    /// Add a model linked (as secondary) to the given parts.
    ///
    /// Part ids that no longer exist are skipped.
    pub fn create_model(&mut self, name: &str, part_ids: &BTreeSet<PartId>) -> Result<ModelId> {
        let name = required("model name", name)?;

        let model_id = self.ready_mut()?.transaction(|tx| {
            if tx.exists("SELECT 1 FROM car_models WHERE name = ?1", params![name])? {
                return Err(Error::DuplicateName(name.to_string()));
            }
            tx.write("INSERT INTO car_models (name) VALUES (?1)", params![name])
                .map_err(|e| on_unique_violation(e, || Error::DuplicateName(name.to_string())))?;
            let model_id = ModelId(tx.last_insert_rowid());

            for part_id in part_ids {
                if !tx.exists(PART_SQL.exists, params![part_id])? {
                    tracing::debug!("Skipping unknown part {} while adding model {}", part_id, model_id);
                    continue;
                }
                insert_secondary_link(tx, model_id, *part_id)?;
            }
            Ok(model_id)
        })?;

        self.checkpoint()?;
        tracing::info!("Added model {} ({})", name, model_id);
        Ok(model_id)
    }

    /// Add a part linked (as secondary) to the given models.
    ///
    /// Model ids that no longer exist are skipped.
    pub fn create_part(&mut self, part_number: &str, name: &str, model_ids: &BTreeSet<ModelId>) -> Result<PartId> {
        let part_number = required("part number", part_number)?;
        let name = required("part name", name)?;

        let part_id = self.ready_mut()?.transaction(|tx| {
            if tx.exists("SELECT 1 FROM car_parts WHERE part_number = ?1", params![part_number])? {
                return Err(Error::DuplicatePartNumber(part_number.to_string()));
            }
            tx.write(
                "INSERT INTO car_parts (part_number, name) VALUES (?1, ?2)",
                params![part_number, name],
            )
            .map_err(|e| on_unique_violation(e, || Error::DuplicatePartNumber(part_number.to_string())))?;
            let part_id = PartId(tx.last_insert_rowid());

            for model_id in model_ids {
                if !tx.exists(MODEL_SQL.exists, params![model_id])? {
                    tracing::debug!("Skipping unknown model {} while adding part {}", model_id, part_id);
                    continue;
                }
                insert_secondary_link(tx, *model_id, part_id)?;
            }
            Ok(part_id)
        })?;

        self.checkpoint()?;
        tracing::info!("Added part {} ({})", part_number, part_id);
        Ok(part_id)
    }

    /// Delete a model and every link that references it
    pub fn delete_model(&mut self, id: ModelId) -> Result<()> {
        self.delete(EntityKind::Model, id.0)
    }

    /// Delete a part and every link that references it
    pub fn delete_part(&mut self, id: PartId) -> Result<()> {
        self.delete(EntityKind::Part, id.0)
    }

    fn delete(&mut self, kind: EntityKind, id: i64) -> Result<()> {
        let sql = statements(kind);

        let unlinked = self.ready_mut()?.transaction(|tx| {
            if !tx.exists(sql.exists, params![id])? {
                return Err(Error::NotFound { kind, id });
            }
            let unlinked = tx.write(sql.unlink, params![id])?;
            tx.write(sql.remove, params![id])?;
            Ok(unlinked)
        })?;

        self.checkpoint()?;
        tracing::info!("Deleted {} {} and {} link(s)", kind, id, unlinked);
        Ok(())
    }
}

fn insert_secondary_link(tx: &Executor<'_>, model_id: ModelId, part_id: PartId) -> Result<()> {
    let link = Link {
        model_id,
        part_id,
        is_primary: false,
    };
    tx.write(
        "INSERT INTO car_part_models (car_id, part_id, is_primary) VALUES (?1, ?2, ?3)",
        params![link.model_id, link.part_id, link.is_primary],
    )?;
    Ok(())
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}

/// Map a UNIQUE violation to a domain error, leaving other failures as is
fn on_unique_violation(err: Error, domain: impl FnOnce() -> Error) -> Error {
    let unique = matches!(
        &err,
        Error::Query(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    );
    if unique { domain() } else { err }
}

/// `LIKE` pattern matching `term` anywhere, with wildcards in the term escaped
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn log_checkpoint(snapshot: &[u8]) {
    let digest = blake3::hash(snapshot).to_hex();
    tracing::debug!("Checkpointed {} byte snapshot ({})", snapshot.len(), &digest.as_str()[..16]);
}

/// Run blocking I/O on a worker thread, giving up at `deadline`.
///
/// On timeout the worker is left to finish on its own; its result is dropped.
fn run_bounded<T, F>(deadline: Instant, timeout: Duration, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = crossbeam::channel::bounded(1);
    std::thread::Builder::new()
        .name("carparts-load".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        })?;

    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(Error::LoadTimeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(Error::Persistence("load worker exited without a result".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{BytesSeed, DirSnapshotSlot, EmptySeed, FileSeed, MemorySnapshotSlot};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Slot whose reads or writes can be made to fail
    #[derive(Default)]
    struct FlakySlot {
        inner: MemorySnapshotSlot,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl SnapshotSlot for FlakySlot {
        fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(Error::Persistence("disk unreadable".to_string()));
            }
            self.inner.load(key)
        }

        fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Persistence("disk full".to_string()));
            }
            self.inner.store(key, bytes)
        }
    }

    struct BrokenSeed;

    impl SeedSource for BrokenSeed {
        fn fetch(&self) -> Result<Vec<u8>> {
            Err(Error::SeedUnavailable("404 from asset host".to_string()))
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    struct SlowSeed(Duration);

    impl SeedSource for SlowSeed {
        fn fetch(&self) -> Result<Vec<u8>> {
            std::thread::sleep(self.0);
            EmptySeed.fetch()
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    fn service_with(slot: Arc<FlakySlot>, seed: Arc<dyn SeedSource>) -> CatalogService {
        CatalogService::new(slot, seed, CatalogOptions::default())
    }

    fn ready_service() -> (CatalogService, Arc<FlakySlot>) {
        let slot = Arc::new(FlakySlot::default());
        let mut service = service_with(Arc::clone(&slot), Arc::new(EmptySeed));
        assert_eq!(service.initialize().unwrap(), LoadOrigin::Seed);
        (service, slot)
    }

    /// Seed with one model linked as secondary to one part, plus a primary pair
    fn corolla_seed() -> Vec<u8> {
        let store = SqliteStore::create_empty().unwrap();
        store.execute("INSERT INTO car_models (id, name) VALUES (1, 'Corolla'), (2, 'Peugeot 206')", &[]).unwrap();
        store
            .execute(
                "INSERT INTO car_parts (id, part_number, name) VALUES (1, 'BP-1001', 'Brake Pad'), (2, 'OF-206', 'Oil Filter')",
                &[],
            )
            .unwrap();
        store
            .execute(
                "INSERT INTO car_part_models (car_id, part_id, is_primary) VALUES (1, 1, 0), (2, 2, 1), (1, 2, 0)",
                &[],
            )
            .unwrap();
        store.serialize().unwrap()
    }

    fn store_of(service: &mut CatalogService) -> &mut SqliteStore {
        service.ready_mut().unwrap()
    }

    fn ids(parts: &[i64]) -> BTreeSet<PartId> {
        parts.iter().copied().map(PartId).collect()
    }

    fn dangling_links(service: &CatalogService) -> usize {
        let rows = service
            .ready()
            .unwrap()
            .execute(
                r#"
                SELECT COUNT(*) FROM car_part_models l
                WHERE NOT EXISTS (SELECT 1 FROM car_models m WHERE m.id = l.car_id)
                   OR NOT EXISTS (SELECT 1 FROM car_parts p WHERE p.id = l.part_id)
                "#,
                &[],
            )
            .unwrap();
        match rows[0][0] {
            rusqlite::types::Value::Integer(n) => n as usize,
            _ => panic!("count is not an integer"),
        }
    }

    // ========== Lifecycle ==========

    #[test]
    fn test_operations_require_ready() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(EmptySeed));
        assert_eq!(service.state(), ServiceState::Uninitialized);
        assert!(matches!(service.search(EntityKind::Model, ""), Err(Error::NotReady)));
        assert!(matches!(service.create_model("Corolla", &BTreeSet::new()), Err(Error::NotReady)));
        assert!(matches!(service.delete_part(PartId(1)), Err(Error::NotReady)));
    }

    #[test]
    fn test_cold_start_persists_seed() {
        let slot = Arc::new(FlakySlot::default());
        let mut service = service_with(Arc::clone(&slot), Arc::new(BytesSeed::new(corolla_seed())));

        assert_eq!(service.initialize().unwrap(), LoadOrigin::Seed);
        assert_eq!(service.state(), ServiceState::Ready);

        let persisted = slot.load(DEFAULT_SNAPSHOT_KEY).unwrap().unwrap();
        let restored = SqliteStore::reconstruct(&persisted).unwrap();
        assert_eq!(restored.stats().unwrap().models, 2);

        // Second call is a no-op
        assert_eq!(service.initialize().unwrap(), LoadOrigin::Seed);
    }

    #[test]
    fn test_warm_start_skips_seed() {
        let slot = Arc::new(FlakySlot::default());
        let mut first = service_with(Arc::clone(&slot), Arc::new(EmptySeed));
        first.initialize().unwrap();
        first.create_model("Honda Civic", &BTreeSet::new()).unwrap();

        let mut second = service_with(Arc::clone(&slot), Arc::new(BrokenSeed));
        assert_eq!(second.initialize().unwrap(), LoadOrigin::Persisted);

        let hits = second.search(EntityKind::Model, "Civic").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label(), "Honda Civic");
    }

    #[test]
    fn test_warm_start_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("seed.db");
        std::fs::write(&seed_path, corolla_seed()).unwrap();
        let data_dir = dir.path().join("state");

        let open = |seed: Arc<dyn SeedSource>| {
            CatalogService::new(Arc::new(DirSnapshotSlot::new(&data_dir)), seed, CatalogOptions::default())
        };

        let mut first = open(Arc::new(FileSeed::new(&seed_path)));
        assert_eq!(first.initialize().unwrap(), LoadOrigin::Seed);
        assert!(data_dir.join(DEFAULT_SNAPSHOT_KEY).is_file());
        let civic = first.create_model("Honda Civic", &ids(&[1])).unwrap();
        first.delete_part(PartId(2)).unwrap();
        drop(first);

        // The seed is gone; only the snapshot on disk can serve the second session
        std::fs::remove_file(&seed_path).unwrap();
        let mut second = open(Arc::new(FileSeed::new(&seed_path)));
        assert_eq!(second.initialize().unwrap(), LoadOrigin::Persisted);

        let stats = second.stats().unwrap();
        assert_eq!((stats.models, stats.parts), (3, 1));
        let links = second.links_for_model(civic).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].part_number, "BP-1001");
        assert!(!links[0].is_primary);
    }

    #[test]
    fn test_corrupt_persisted_snapshot_falls_back_to_seed() {
        let slot = Arc::new(FlakySlot::default());
        slot.store(DEFAULT_SNAPSHOT_KEY, b"garbage that is not sqlite").unwrap();

        let mut service = service_with(Arc::clone(&slot), Arc::new(BytesSeed::new(corolla_seed())));
        assert_eq!(service.initialize().unwrap(), LoadOrigin::Seed);
        assert_eq!(service.stats().unwrap().parts, 2);

        // The corrupt snapshot was overwritten by the seed
        let persisted = slot.load(DEFAULT_SNAPSHOT_KEY).unwrap().unwrap();
        assert!(SqliteStore::reconstruct(&persisted).is_ok());
    }

    #[test]
    fn test_seed_failure_is_permanent() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BrokenSeed));

        assert!(matches!(service.initialize(), Err(Error::SeedUnavailable(_))));
        assert_eq!(service.state(), ServiceState::Failed);
        assert!(service.failure().unwrap().contains("404"));

        assert!(matches!(service.initialize(), Err(Error::NotReady)));
        assert!(matches!(service.search(EntityKind::Part, ""), Err(Error::NotReady)));
    }

    #[test]
    fn test_slot_read_failure_fails_load() {
        let slot = Arc::new(FlakySlot::default());
        slot.fail_reads.store(true, Ordering::SeqCst);
        let mut service = service_with(slot, Arc::new(EmptySeed));

        assert!(matches!(service.initialize(), Err(Error::Persistence(_))));
        assert_eq!(service.state(), ServiceState::Failed);
    }

    #[test]
    fn test_first_write_failure_fails_load() {
        let slot = Arc::new(FlakySlot::default());
        slot.fail_writes.store(true, Ordering::SeqCst);
        let mut service = service_with(slot, Arc::new(EmptySeed));

        assert!(matches!(service.initialize(), Err(Error::Persistence(_))));
        assert_eq!(service.state(), ServiceState::Failed);
    }

    #[test]
    fn test_load_timeout() {
        let options = CatalogOptions {
            load_timeout: Duration::from_millis(50),
            ..CatalogOptions::default()
        };
        let mut service = CatalogService::new(
            Arc::new(FlakySlot::default()),
            Arc::new(SlowSeed(Duration::from_secs(2))),
            options,
        );

        assert!(matches!(service.initialize(), Err(Error::LoadTimeout(_))));
        assert_eq!(service.state(), ServiceState::Failed);
    }

    // ========== Queries ==========

    #[test]
    fn test_search_empty_term_lists_all() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BytesSeed::new(corolla_seed())));
        service.initialize().unwrap();

        let models = service.search(EntityKind::Model, "").unwrap();
        assert_eq!(models.iter().map(Entity::id).collect::<Vec<_>>(), vec![1, 2]);

        let parts = service.search(EntityKind::Part, "").unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.kind() == EntityKind::Part));
    }

    #[test]
    fn test_search_matches_part_number_not_name() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BytesSeed::new(corolla_seed())));
        service.initialize().unwrap();

        let hits = service.search(EntityKind::Part, "1001").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(service.search(EntityKind::Part, "Brake").unwrap().is_empty());
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let (mut service, _) = ready_service();
        service.create_part("AB-100", "Plain", &BTreeSet::new()).unwrap();
        service.create_part("AB_1%0", "Odd", &BTreeSet::new()).unwrap();

        let hits = service.search(EntityKind::Part, "_1%").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label(), "Odd (AB_1%0)");
    }

    #[test]
    fn test_links_report_primary_flag() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BytesSeed::new(corolla_seed())));
        service.initialize().unwrap();

        let models = service.links_for_part(PartId(2)).unwrap();
        assert_eq!(models.len(), 2);
        assert!(models.iter().any(|m| m.model_name == "Peugeot 206" && m.is_primary));
        assert!(models.iter().any(|m| m.model_name == "Corolla" && !m.is_primary));

        let parts = service.links_for_model(ModelId(2)).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].part_number, "OF-206");
        assert!(parts[0].is_primary);
    }

    // ========== Mutations ==========

    #[test]
    fn test_create_model_then_search() {
        let (mut service, _) = ready_service();
        service.create_model("Toyota Corolla", &BTreeSet::new()).unwrap();

        let hits = service.search(EntityKind::Model, "Toyota").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label(), "Toyota Corolla");
    }

    #[test]
    fn test_create_model_links_are_secondary_and_skip_unknown_parts() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BytesSeed::new(corolla_seed())));
        service.initialize().unwrap();

        let id = service.create_model("Yaris", &ids(&[1, 2, 99])).unwrap();

        let links = service.links_for_model(id).unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| !l.is_primary));

        // Part 2 keeps its single primary model
        let primaries = service
            .links_for_part(PartId(2))
            .unwrap()
            .into_iter()
            .filter(|m| m.is_primary)
            .count();
        assert_eq!(primaries, 1);
        assert_eq!(dangling_links(&service), 0);
    }

    #[test]
    fn test_duplicate_model_name_leaves_store_unchanged() {
        let (mut service, slot) = ready_service();
        service.create_model("Corolla", &BTreeSet::new()).unwrap();
        let before = service.stats().unwrap();
        let persisted = slot.load(DEFAULT_SNAPSHOT_KEY).unwrap();

        let result = service.create_model("Corolla", &BTreeSet::new());
        assert!(matches!(result, Err(Error::DuplicateName(name)) if name == "Corolla"));
        assert_eq!(service.stats().unwrap(), before);
        assert_eq!(slot.load(DEFAULT_SNAPSHOT_KEY).unwrap(), persisted);

        // Uniqueness is case-sensitive
        service.create_model("corolla", &BTreeSet::new()).unwrap();
    }

    #[test]
    fn test_duplicate_part_number() {
        let (mut service, _) = ready_service();
        service.create_part("BP-1001", "Brake Pad", &BTreeSet::new()).unwrap();

        let result = service.create_part("BP-1001", "Brake Pad 2", &BTreeSet::new());
        assert!(matches!(result, Err(Error::DuplicatePartNumber(_))));

        let hits = service.search(EntityKind::Part, "BP-1001").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label(), "Brake Pad (BP-1001)");
    }

    #[test]
    fn test_blank_names_rejected() {
        let (mut service, _) = ready_service();
        assert!(matches!(service.create_model("   ", &BTreeSet::new()), Err(Error::InvalidInput(_))));
        assert!(matches!(service.create_part("", "Pad", &BTreeSet::new()), Err(Error::InvalidInput(_))));
        assert_eq!(service.stats().unwrap().models, 0);
    }

    #[test]
    fn test_names_are_trimmed_before_duplicate_check() {
        let (mut service, _) = ready_service();
        let id = service.create_model("  Corolla ", &BTreeSet::new()).unwrap();
        assert_eq!(service.model(id).unwrap().unwrap().name, "Corolla");

        let result = service.create_model(" Corolla", &BTreeSet::new());
        assert!(matches!(result, Err(Error::DuplicateName(name)) if name == "Corolla"));

        // Uniqueness stays case-sensitive
        service.create_model("corolla", &BTreeSet::new()).unwrap();
        assert_eq!(service.stats().unwrap().models, 2);
    }

    #[test]
    fn test_create_part_links_models() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BytesSeed::new(corolla_seed())));
        service.initialize().unwrap();

        let models: BTreeSet<ModelId> = [ModelId(1), ModelId(2), ModelId(42)].into_iter().collect();
        let id = service.create_part("TB-999", "Timing Belt", &models).unwrap();

        let links = service.links_for_part(id).unwrap();
        assert_eq!(
            links.iter().map(|l| l.model_name.as_str()).collect::<Vec<_>>(),
            vec!["Corolla", "Peugeot 206"]
        );
        assert!(links.iter().all(|l| !l.is_primary));
    }

    #[test]
    fn test_delete_model_cascades() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BytesSeed::new(corolla_seed())));
        service.initialize().unwrap();

        service.delete_model(ModelId(1)).unwrap();

        assert!(service.links_for_part(PartId(1)).unwrap().is_empty());
        assert!(service.search(EntityKind::Model, "").unwrap().iter().all(|m| m.id() != 1));
        assert!(service.model(ModelId(1)).unwrap().is_none());
        assert_eq!(dangling_links(&service), 0);
    }

    #[test]
    fn test_delete_part_cascades() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BytesSeed::new(corolla_seed())));
        service.initialize().unwrap();

        service.delete_part(PartId(2)).unwrap();

        assert!(service.links_for_model(ModelId(2)).unwrap().is_empty());
        assert_eq!(service.links_for_model(ModelId(1)).unwrap().len(), 1);
        assert_eq!(service.stats().unwrap().primary_links, 0);
        assert_eq!(dangling_links(&service), 0);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (mut service, _) = ready_service();
        let result = service.delete_model(ModelId(7));
        assert!(matches!(result, Err(Error::NotFound { kind: EntityKind::Model, id: 7 })));
        assert!(matches!(service.delete_part(PartId(7)), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_failure_mid_link_loop_rolls_back() {
        let mut service = service_with(Arc::new(FlakySlot::default()), Arc::new(BytesSeed::new(corolla_seed())));
        service.initialize().unwrap();
        let before = service.stats().unwrap();

        // Abort the second link insert of the loop
        store_of(&mut service)
            .execute(
                r#"
                CREATE TEMP TRIGGER fail_second_link BEFORE INSERT ON car_part_models
                WHEN NEW.part_id = 2
                BEGIN SELECT RAISE(ABORT, 'injected failure'); END
                "#,
                &[],
            )
            .unwrap();

        let result = service.create_model("Yaris", &ids(&[1, 2]));
        assert!(matches!(result, Err(Error::Query(_))));

        assert_eq!(service.stats().unwrap(), before);
        assert!(service.search(EntityKind::Model, "Yaris").unwrap().is_empty());
    }

    #[test]
    fn test_persist_failure_rolls_back_mutation() {
        let (mut service, slot) = ready_service();
        service.create_model("Corolla", &BTreeSet::new()).unwrap();

        slot.fail_writes.store(true, Ordering::SeqCst);
        let result = service.create_model("Civic", &BTreeSet::new());
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert!(service.search(EntityKind::Model, "Civic").unwrap().is_empty());

        let deleted = service.delete_model(ModelId(1));
        assert!(matches!(deleted, Err(Error::Persistence(_))));
        assert_eq!(service.search(EntityKind::Model, "Corolla").unwrap().len(), 1);

        // Retrying once storage recovers succeeds
        slot.fail_writes.store(false, Ordering::SeqCst);
        service.create_model("Civic", &BTreeSet::new()).unwrap();
        assert_eq!(service.state(), ServiceState::Ready);
    }

    #[test]
    fn test_every_mutation_is_durable() {
        let slot = Arc::new(FlakySlot::default());
        let mut service = service_with(Arc::clone(&slot), Arc::new(EmptySeed));
        service.initialize().unwrap();

        let corolla = service.create_model("Corolla", &BTreeSet::new()).unwrap();
        let pad = service
            .create_part("BP-1001", "Brake Pad", &[corolla].into_iter().collect())
            .unwrap();
        let filter = service.create_part("OF-206", "Oil Filter", &BTreeSet::new()).unwrap();
        service.delete_part(filter).unwrap();

        // A fresh session sees exactly what the first one observed
        let mut reopened = service_with(Arc::clone(&slot), Arc::new(BrokenSeed));
        assert_eq!(reopened.initialize().unwrap(), LoadOrigin::Persisted);

        for kind in [EntityKind::Model, EntityKind::Part] {
            assert_eq!(reopened.search(kind, "").unwrap(), service.search(kind, "").unwrap());
        }
        assert_eq!(reopened.links_for_model(corolla).unwrap(), service.links_for_model(corolla).unwrap());
        assert_eq!(reopened.links_for_part(pad).unwrap(), service.links_for_part(pad).unwrap());
    }

    #[test]
    fn test_like_pattern_escaping() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("5%_\\"), "%5\\%\\_\\\\%");
    }
}
