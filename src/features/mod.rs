//! Feature definitions, the function library and static validation.

pub mod definition;
pub mod functions;
pub mod registry;
pub mod validation;

pub use definition::{FeatureDefinition, InputSpec};
pub use functions::{FeatureFn, FeatureInputs, FunctionError, FunctionLibrary};
pub use registry::FeatureRegistry;
pub use validation::{validate, ValidationError, ValidationErrorType};
