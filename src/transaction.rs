//! Signed change requests: types, validation and the account state
//! transitions they produce

pub mod transitions;
pub mod types;
pub mod validation;

pub use types::*;
pub use validation::verify_request_signature;
