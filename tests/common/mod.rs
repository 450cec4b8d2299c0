pub mod asserts;
pub mod fixtures;
pub mod stages;

pub use asserts::*;
pub use fixtures::*;
pub use stages::*;
