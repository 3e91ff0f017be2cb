pub mod event;
pub mod outcome;
pub mod query;
pub mod table;

pub use event::*;
pub use outcome::*;
pub use query::*;
pub use table::*;
