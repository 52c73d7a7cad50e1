pub mod db;
pub mod settlements;

pub use db::{connect, create_db, DbPool};
pub use settlements::{insert_audit_rows, insert_settlement, SqliteSettlementStore};
