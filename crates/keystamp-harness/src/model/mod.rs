//! Model-based testing.
//!
//! [`ModelWorld`] is a reference implementation of the authority's
//! observable behavior. Tests generate random [`Operation`] sequences,
//! apply each one to the model and to a real [`Authority`], and compare
//! results and state after every step.
//!
//! [`Authority`]: keystamp_server::Authority

mod operation;
mod world;

pub use operation::{ClientId, Operation, OperationError, OperationResult};
pub use world::{ModelPrincipal, ModelWorld, ObservableState};
