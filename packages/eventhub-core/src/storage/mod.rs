//! # Storage
//!
//! SQLite persistence. [`Database`] owns the connection; the per-area files
//! (`organizations`, `events`, `hosts`, `claims`, `generation`,
//! `subscriptions`, `users`) each add an `impl Database` block plus the
//! record types they return.
//!
//! Writes that must commit together run inside [`Database::transaction`] and
//! use the free `*_tx` helpers, which take a plain `&Connection`.

mod claims;
mod database;
mod events;
mod generation;
mod hosts;
mod organizations;
mod schema;
mod subscriptions;
mod users;

pub use claims::ClaimRecord;
pub use database::{Database, DatabaseConfig};
pub use events::{EventRecord, SponsorRecord, WinnerRecord};
pub use generation::{BadgeRecord, GiftCardRecord, OutboxRecord};
pub use hosts::{HostRecord, NewHost};
pub use organizations::{MemberRecord, OrganizationRecord};
pub use subscriptions::SubscriptionRecord;
pub use users::UserRecord;

pub(crate) use claims::resolve_claim_tx;
pub(crate) use events::{attach_orphan_event_tx, insert_event_tx};
pub(crate) use generation::{insert_badge_tx, insert_gift_card_tx, insert_outbox_tx, next_badge_number_tx};
pub(crate) use hosts::{link_host_tx, mark_host_primary_tx};
pub(crate) use organizations::{
    insert_member_tx, insert_organization_tx, set_member_role_tx, set_organization_owner_tx,
};

/// Implement `ToSql`/`FromSql` for a text-backed enum with `as_str` and `FromStr`.
macro_rules! impl_sql_text {
    ($ty:ty) => {
        impl rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value.as_str()?.parse::<$ty>().map_err(|e| {
                    rusqlite::types::FromSqlError::Other(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )))
                })
            }
        }
    };
}

impl_sql_text!(crate::community::MemberRole);
impl_sql_text!(crate::community::OrgType);
impl_sql_text!(crate::events::ApprovalState);
impl_sql_text!(crate::events::EventType);
impl_sql_text!(crate::events::EventFormat);
impl_sql_text!(crate::events::EventSource);
impl_sql_text!(crate::generation::GenerationStatus);
impl_sql_text!(crate::generation::GenerationKind);
impl_sql_text!(crate::claims::ClaimKind);
impl_sql_text!(crate::claims::ClaimStatus);
