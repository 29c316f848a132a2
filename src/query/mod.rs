pub mod executor;
pub mod filter;

pub use executor::{run, validate_roots};
pub use filter::{filter, Direction, PathFilter};
