pub mod mint;
pub mod transaction;

pub use mint::MintFilterCache;
pub use transaction::RecentTransactionCache;
