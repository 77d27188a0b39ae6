pub mod login;
pub mod logout;
pub mod me;
pub mod password_reset;
pub mod register;

pub use login::handle_login;
pub use logout::handle_logout;
pub use me::handle_me;
pub use password_reset::handle_password_reset;
pub use register::handle_register;
