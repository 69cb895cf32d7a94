pub mod authors;
pub mod candidate;
pub mod record;

pub use authors::*;
pub use candidate::*;
pub use record::*;
