// Domain layer - session state machine, value objects, error taxonomy
// No dependencies on other layers

pub mod aggregates;
pub mod errors;
pub mod value_objects;

pub use aggregates::*;
pub use errors::BridgeError;
pub use value_objects::*;
