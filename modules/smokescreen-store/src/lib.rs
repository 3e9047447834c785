pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod store;

pub use ledger::{AuditLedger, SYSTEM_ACTOR};
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::ScoreStore;
