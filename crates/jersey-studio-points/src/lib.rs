/// Points-based credit accounting for metered exports.
///
/// `pricing` and `plans` hold the fixed price table and purchasable packages.
/// `PointsLedger` keeps one signed-in user's balance in sync with an
/// `AccountStore` (the hosted backend, or the embedded `LocalAccountStore`)
/// and writes every balance change to an append-only transaction log.
pub mod account;
pub mod error;
pub mod ledger;
pub mod local;
pub mod plans;
pub mod pricing;
pub mod session;
pub mod store;

pub use account::{PointsAccount, PointsTransaction, TransactionKind};
pub use error::{LedgerError, StoreError};
pub use ledger::{LedgerConfig, LedgerReceipt, LedgerState, PointsLedger, ReconcileReport};
pub use local::LocalAccountStore;
pub use pricing::{ExportKind, ExportRequest, PointCosts};
pub use session::AuthSession;
pub use store::{AccountStore, AuditStatus, MemoryAccountStore};
