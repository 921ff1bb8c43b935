pub mod env;
pub mod error;

pub use env::{EnvExpander, dir_exists, is_rooted_path, parent_dir_exists};
pub use error::{ManagerError, Result};
