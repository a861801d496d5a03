//! Postgres implementations of the wallet persistence traits.

pub mod idempotency;
pub mod wallet;

pub use idempotency::PgIdempotencyStore;
pub use wallet::PgWalletStore;
