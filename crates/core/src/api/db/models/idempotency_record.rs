use diesel::prelude::*;

use crate::api::db::{PooledConnection, schema::idempotency_records};

#[derive(Debug, Queryable)]
pub struct IdempotencyRecordModel {
    pub id: i32,
    pub idempotency_key: String,
    pub charge_id: String,
    pub response_data: String,
    pub created_at: i64,
}

pub fn find_by_key(
    conn: &mut PooledConnection,
    key: &str,
) -> QueryResult<Option<IdempotencyRecordModel>> {
    idempotency_records::table
        .filter(idempotency_records::idempotency_key.eq(key))
        .first::<IdempotencyRecordModel>(conn)
        .optional()
}

#[derive(Insertable)]
#[diesel(table_name = idempotency_records)]
pub struct NewIdempotencyRecord {
    pub idempotency_key: String,
    pub charge_id: String,
    pub response_data: String,
    pub created_at: i64,
}

impl NewIdempotencyRecord {
    pub fn new(idempotency_key: String, charge_id: String, response_data: String) -> Self {
        NewIdempotencyRecord {
            idempotency_key,
            charge_id,
            response_data,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// First-writer-wins: the unique index on `idempotency_key` plus
    /// insert-or-ignore means a record is never overwritten. Returns the
    /// number of inserted rows (0 when the key already existed).
    pub fn insert_or_ignore(&self, conn: &mut PooledConnection) -> QueryResult<usize> {
        diesel::insert_or_ignore_into(idempotency_records::table)
            .values(self)
            .execute(conn)
    }
}
