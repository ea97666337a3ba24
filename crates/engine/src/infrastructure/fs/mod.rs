pub mod atomic_store;
pub mod path_validator;

pub use atomic_store::{create_dir_all_restricted, read_if_exists, write_atomic, FsError};
pub use path_validator::{generate_slug, safe_resolve, validate_adventure_id, validate_slug, ValidationError};
