//! Utility
//!
//! **This module is exempt from the API stability guarantee.** It's exposed
//! only because it's needed by the port crates and the tests.
mod init;
pub mod intrusive_list;
pub use self::init::*;
