// Core Layer: shared error handling

pub mod error;

pub use error::{CodegenError, Result};
