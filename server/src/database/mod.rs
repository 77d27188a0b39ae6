pub mod create;
pub mod users;
pub mod utils;

pub use users::{DirectoryError, NewUser, SqliteUserDirectory, UserDirectory, UserRecord};
