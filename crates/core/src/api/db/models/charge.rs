use chargegate_types::charges::{Charge, ChargeStatus};
use chrono::DateTime;
use diesel::prelude::*;

use crate::api::db::{PooledConnection, schema::charges};

#[derive(Debug, Queryable)]
pub struct ChargeModel {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub customer_id: Option<String>,
    pub payment_method_type: Option<String>,
    pub card_last4: Option<String>,
    pub created_at: i64,
}

pub fn find_charge(
    conn: &mut PooledConnection,
    payment_id: &str,
) -> QueryResult<Option<ChargeModel>> {
    charges::table
        .filter(charges::id.eq(payment_id))
        .first::<ChargeModel>(conn)
        .optional()
}

/// Conditional status update: only fires while the charge still holds the
/// status the caller observed, which makes the read-modify-write atomic per
/// charge id. Returns the number of updated rows (0 or 1).
pub fn transition_status(
    conn: &mut PooledConnection,
    payment_id: &str,
    from: ChargeStatus,
    to: ChargeStatus,
) -> QueryResult<usize> {
    diesel::update(
        charges::table
            .filter(charges::id.eq(payment_id))
            .filter(charges::status.eq(from.as_str())),
    )
    .set(charges::status.eq(to.as_str()))
    .execute(conn)
}

pub fn count_charges(conn: &mut PooledConnection) -> QueryResult<i64> {
    charges::table.count().get_result(conn)
}

impl TryFrom<ChargeModel> for Charge {
    type Error = String;

    fn try_from(model: ChargeModel) -> Result<Self, Self::Error> {
        let status = model.status.parse::<ChargeStatus>().map_err(|e| e.to_string())?;
        let created_at = DateTime::from_timestamp_millis(model.created_at)
            .ok_or_else(|| format!("timestamp {} out of range", model.created_at))?;
        Ok(Charge {
            id: model.id,
            status,
            amount: model.amount,
            currency: model.currency,
            description: model.description,
            customer_id: model.customer_id,
            payment_method_type: model.payment_method_type,
            card_last4: model.card_last4,
            created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = charges)]
pub struct NewCharge {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub customer_id: Option<String>,
    pub payment_method_type: Option<String>,
    pub card_last4: Option<String>,
    pub created_at: i64,
}

impl From<&Charge> for NewCharge {
    fn from(charge: &Charge) -> Self {
        NewCharge {
            id: charge.id.clone(),
            status: charge.status.as_str().to_string(),
            amount: charge.amount,
            currency: charge.currency.clone(),
            description: charge.description.clone(),
            customer_id: charge.customer_id.clone(),
            payment_method_type: charge.payment_method_type.clone(),
            card_last4: charge.card_last4.clone(),
            created_at: charge.created_at.timestamp_millis(),
        }
    }
}

impl NewCharge {
    pub fn insert(&self, conn: &mut PooledConnection) -> QueryResult<usize> {
        diesel::insert_into(charges::table).values(self).execute(conn)
    }
}
