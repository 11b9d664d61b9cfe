mod lock;
mod schema;
mod store;

pub use lock::SYNC_LOCK_NAME;
pub use store::Store;

#[cfg(test)]
pub use store::testutil;
