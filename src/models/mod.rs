pub mod commit;
pub mod batch;
pub mod changelog;

pub use commit::*;
pub use batch::*;
pub use changelog::*;
