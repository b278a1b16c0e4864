// Thin re-export module: the chain itself lives in `blockchain/core.rs`,
// split into stores, resolution and validation.

pub mod core;
pub mod shared;

pub use self::core::*;
pub use shared::SharedBlockchain;
