pub mod candidate;
pub mod domain;
pub mod search;
pub mod session;

pub use candidate::*;
pub use domain::*;
pub use search::*;
pub use session::*;
