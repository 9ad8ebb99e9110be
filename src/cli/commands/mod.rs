//! CLI command implementations

pub mod clear;
pub mod config;
pub mod forget;
pub mod read;
pub mod status;
pub mod warm;

pub use clear::execute as clear;
pub use config::execute as config;
pub use forget::execute as forget;
pub use read::execute as read;
pub use status::execute as status;
pub use warm::execute as warm;
