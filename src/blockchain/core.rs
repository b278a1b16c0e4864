// Data model, stores, balance resolution and the block/chain validators.
pub mod chain;
pub mod chain_validation;
pub mod resolver;
pub mod state;
pub mod store;
pub mod validation;

pub use chain::*;
pub use chain_validation::*;
pub use resolver::*;
pub use state::*;
pub use store::*;
pub use validation::*;
