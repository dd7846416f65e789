use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::debug;

use chargegate_types::charges::{Charge, ChargeResponse, ChargeStatus};

pub mod models;
pub mod schema;

use models::charge::{ChargeModel, NewCharge};
use models::idempotency_record::{IdempotencyRecordModel, NewIdempotencyRecord};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./src/api/db/migrations");

type DbConnection = diesel::sqlite::SqliteConnection;

pub type PooledConnection = diesel::r2d2::PooledConnection<ConnectionManager<DbConnection>>;

pub type DbPool = Pool<ConnectionManager<DbConnection>>;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),
    #[error("Database migration error")]
    MigrationError(#[from] Box<dyn std::error::Error + Send + Sync>),
    #[error("Failed to insert charge: {0}")]
    InsertChargeError(diesel::result::Error),
    #[error("Failed to find charge: {0}")]
    FindChargeError(diesel::result::Error),
    #[error("Failed to update charge status: {0}")]
    UpdateChargeError(diesel::result::Error),
    #[error("Failed to insert idempotency record: {0}")]
    InsertRecordError(diesel::result::Error),
    #[error("Failed to find idempotency record: {0}")]
    FindRecordError(diesel::result::Error),
    #[error("Failed to encode idempotency record: {0}")]
    EncodeRecordError(#[from] serde_json::Error),
    #[error("Corrupt charge row: {0}")]
    CorruptChargeError(String),
}

fn run_migrations(conn: &mut PooledConnection) -> Result<(), DbError> {
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

// SQLite allows a single writer at a time; checkouts get a busy timeout so
// concurrent request handlers queue instead of failing with SQLITE_BUSY.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<DbConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut DbConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Owns the connection pool for the charge database and exposes the narrow
/// store contract the charge service depends on.
#[derive(Debug)]
pub struct DbManager {
    pool: DbPool,
}

impl DbManager {
    pub fn local(database_url: &str) -> DbResult<Self> {
        debug!("Establishing connection to database at {}", database_url);
        let manager = ConnectionManager::<DbConnection>::new(database_url);
        let pool = Pool::builder()
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        let mut conn = pool
            .get()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        debug!("Running database migrations...");
        run_migrations(&mut conn)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> DbResult<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }

    pub fn insert_charge(&self, charge: &Charge) -> DbResult<()> {
        let mut conn = self.conn()?;
        NewCharge::from(charge)
            .insert(&mut conn)
            .map_err(DbError::InsertChargeError)?;
        Ok(())
    }

    pub fn find_charge(&self, payment_id: &str) -> DbResult<Option<Charge>> {
        let mut conn = self.conn()?;
        let model = models::charge::find_charge(&mut conn, payment_id)
            .map_err(DbError::FindChargeError)?;
        model.map(decode_charge).transpose()
    }

    /// Atomic per-charge status update. Returns the updated charge, or `None`
    /// when the charge no longer holds `from` (a concurrent transition won).
    pub fn transition_charge(
        &self,
        payment_id: &str,
        from: ChargeStatus,
        to: ChargeStatus,
    ) -> DbResult<Option<Charge>> {
        let mut conn = self.conn()?;
        let updated = models::charge::transition_status(&mut conn, payment_id, from, to)
            .map_err(DbError::UpdateChargeError)?;
        if updated == 0 {
            return Ok(None);
        }
        let model = models::charge::find_charge(&mut conn, payment_id)
            .map_err(DbError::FindChargeError)?;
        model.map(decode_charge).transpose()
    }

    pub fn count_charges(&self) -> DbResult<i64> {
        let mut conn = self.conn()?;
        models::charge::count_charges(&mut conn).map_err(DbError::FindChargeError)
    }

    /// Durable mirror of the in-process idempotency cache. Insert-or-ignore
    /// against the unique key index keeps first-writer-wins semantics.
    pub fn insert_idempotency_record(
        &self,
        idempotency_key: &str,
        response: &ChargeResponse,
    ) -> DbResult<bool> {
        let response_data = serde_json::to_string(response)?;
        let mut conn = self.conn()?;
        let inserted = NewIdempotencyRecord::new(
            idempotency_key.to_string(),
            response.id.clone(),
            response_data,
        )
        .insert_or_ignore(&mut conn)
        .map_err(DbError::InsertRecordError)?;
        Ok(inserted > 0)
    }

    pub fn find_idempotency_record(
        &self,
        idempotency_key: &str,
    ) -> DbResult<Option<IdempotencyRecordModel>> {
        let mut conn = self.conn()?;
        models::idempotency_record::find_by_key(&mut conn, idempotency_key)
            .map_err(DbError::FindRecordError)
    }
}

fn decode_charge(model: ChargeModel) -> DbResult<Charge> {
    Charge::try_from(model).map_err(DbError::CorruptChargeError)
}

#[cfg(test)]
mod tests {
    use chargegate_types::charges::ChargeRequest;

    use super::*;

    fn test_db() -> (tempfile::TempDir, DbManager) {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let path = dir.path().join("chargegate.sqlite");
        let db = DbManager::local(path.to_str().unwrap()).expect("Failed to open test database");
        (dir, db)
    }

    fn sample_charge(amount: i64) -> Charge {
        Charge::from_request(&ChargeRequest {
            amount,
            currency: "USD".to_string(),
            description: Some("test charge".to_string()),
            customer_id: Some("cus_1".to_string()),
            payment_method: None,
            capture: Some(false),
        })
    }

    #[test]
    fn insert_and_find_round_trip() {
        let (_dir, db) = test_db();
        let charge = sample_charge(1200);
        db.insert_charge(&charge).unwrap();

        let found = db.find_charge(&charge.id).unwrap().unwrap();
        assert_eq!(found.id, charge.id);
        assert_eq!(found.status, ChargeStatus::Pending);
        assert_eq!(found.amount, 1200);
        assert_eq!(found.description.as_deref(), Some("test charge"));
        assert_eq!(
            found.created_at.timestamp_millis(),
            charge.created_at.timestamp_millis()
        );
    }

    #[test]
    fn find_unknown_charge_is_none() {
        let (_dir, db) = test_db();
        assert!(db.find_charge("ch_missing").unwrap().is_none());
    }

    #[test]
    fn transition_is_conditional_on_observed_status() {
        let (_dir, db) = test_db();
        let charge = sample_charge(500);
        db.insert_charge(&charge).unwrap();

        let updated = db
            .transition_charge(&charge.id, ChargeStatus::Pending, ChargeStatus::Captured)
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, ChargeStatus::Captured);

        // The charge moved on; an update predicated on the stale status loses.
        let stale = db
            .transition_charge(&charge.id, ChargeStatus::Pending, ChargeStatus::Canceled)
            .unwrap();
        assert!(stale.is_none());
        let current = db.find_charge(&charge.id).unwrap().unwrap();
        assert_eq!(current.status, ChargeStatus::Captured);
    }

    #[test]
    fn idempotency_record_is_write_once() {
        let (_dir, db) = test_db();
        let charge = sample_charge(700);
        let response = ChargeResponse::from_charge(&charge, false);

        assert!(db.insert_idempotency_record("key-1", &response).unwrap());

        let other = sample_charge(900);
        let other_response = ChargeResponse::from_charge(&other, false);
        assert!(!db.insert_idempotency_record("key-1", &other_response).unwrap());

        let record = db.find_idempotency_record("key-1").unwrap().unwrap();
        assert_eq!(record.charge_id, charge.id);

        let decoded: ChargeResponse = serde_json::from_str(&record.response_data).unwrap();
        assert_eq!(decoded.amount, 700);
    }
}
