pub mod stats;
pub mod users;

pub use stats::handle_stats;
pub use users::handle_list_users;
