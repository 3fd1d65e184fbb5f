/// Persistence of the light history across restarts.
///
/// Submodules:
/// - `store`: the `HistoryStore` trait with a JSON file backend and a
///   PostgreSQL backend.

pub mod store;

pub use store::{HistoryStore, JsonFileStore, PostgresStore};
