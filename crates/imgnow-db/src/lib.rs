//! Persistence for file records
//!
//! [`FileRepository`] is the only way the services touch record state. Every mutation
//! that can race (counter increments, the deletion transition) is a single atomic
//! statement in the backing store, so callers act on the row returned by the store and
//! never on a copy they read earlier.

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::MemoryFileRepository;
pub use postgres::PgFileRepository;
pub use repository::FileRepository;
