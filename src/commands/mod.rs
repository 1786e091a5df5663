//! CLI commands implementation

pub mod export;
pub mod hash;
pub mod init;
pub mod serve;
pub mod status;

pub use export::*;
pub use hash::*;
pub use init::*;
pub use serve::*;
pub use status::*;
