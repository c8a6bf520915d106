//! Electroflow Backend
//!
//! Everything between a dispatched experiment and the potentiostat:
//! - [`ExperimentType`]: the closed set of measurement techniques
//! - [`ParameterValidator`]: unit normalisation and declared limits
//! - [`Backend`]: the measurement driver interface
//! - [`BackendRegistry`]: one lazily connected [`BackendHandle`] per technique
//!
//! Adding a technique means adding an [`ExperimentType`] variant, its limits,
//! and a registration. Nothing in the dispatcher changes.

mod backend;
mod error;
mod experiment_type;
mod limits;
mod registry;
mod simulated;
mod units;
mod validator;

pub use backend::Backend;
pub use error::{BackendError, RegistryError, ValidationError};
pub use experiment_type::ExperimentType;
pub use limits::{Limit, LimitOverride, ParameterLimits};
pub use registry::{BackendConstructor, BackendHandle, BackendRegistry, BackendSession};
pub use simulated::SimulatedBackend;
pub use units::Quantity;
pub use validator::ParameterValidator;
