pub mod composer;
pub mod error;
pub mod types;

pub use composer::QueryFilter;
pub use error::FilterError;
pub use types::FilterSet;
