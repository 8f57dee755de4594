pub mod sqlite_actor;

pub use sqlite_actor::{SqliteActor, SqliteHandle};
