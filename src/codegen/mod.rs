// Codegen Module: generated units and their persistence

pub mod codec;
pub mod host;
pub mod manager;
pub mod state;
pub mod unit;

// Re-exports
pub use codec::{decode_object, encode_object};
pub use host::{BaseStateProvider, Component, HostState, Module, VersionStamp};
pub use manager::GeneratedUnitManager;
pub use state::{ChildState, EncodedUnit, FieldValue, StateBlob, UnitEncoding};
pub use unit::{CompiledUnit, GeneratedUnit, SymbolicUnit};
