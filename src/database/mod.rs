pub mod ddl;
pub mod entity;
pub mod manager;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod storage;

pub use entity::{ColumnDef, ColumnKind, EntityMeta, ForeignKey};
pub use manager::{DatabaseError, DatabaseManager, DatabaseTarget};
pub use memory::MemoryStorage;
pub use postgres::PgStorage;
pub use record::Record;
pub use storage::{AttributeError, Storage, StorageError, StorageSession};
