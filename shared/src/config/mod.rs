pub mod config;

pub use self::config::{MIN_SECRET_LEN, load_config, parse_config};
