//! Provider registry for Switchyard.
//!
//! Descriptors come from the registry file; implementations come from a
//! [`FactoryTable`]. The registry owns the resulting instances and the
//! execution log.

pub mod builtin;
pub mod registry;
pub mod resolver;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use builtin::{HistorySearchProvider, PromptProvider, register_builtins};
pub use registry::{LoadReport, ProviderCheck, ProviderHandle, ProviderRegistry, ValidationReport};
pub use resolver::{FactoryTable, ImplementationResolver, ProviderFactory, ProviderInit, Resolved};
pub use stats::{ProviderInfo, ProviderStats, RegistryStatistics};
