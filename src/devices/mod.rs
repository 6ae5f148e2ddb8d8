// devices/mod.rs
mod registry;
mod selection;
mod store;

pub use registry::DeviceRegistry;
pub use selection::SelectionState;
pub use store::{JsonFileStore, RegistryStore, StoreError};
