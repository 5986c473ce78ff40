// Snapshot State
//
// The serializable picture of a host: plain fields, generically serializable
// children, and one encoded-unit record per managed unit. Nothing in here
// can hold native code.

use crate::codegen::unit::SymbolicUnit;
use crate::core::error::{CodegenError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const STATE_MAGIC: &[u8; 4] = b"GGST";
pub const STATE_VERSION: u16 = 1;

/// Form a unit was encoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitEncoding {
    /// Generic codec over the symbolic unit
    Symbolic,
    /// Compiler IR archive
    Compiled,
}

impl UnitEncoding {
    pub fn tag(self) -> &'static str {
        match self {
            UnitEncoding::Symbolic => "symbolic",
            UnitEncoding::Compiled => "compiled",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "symbolic" => Ok(UnitEncoding::Symbolic),
            "compiled" => Ok(UnitEncoding::Compiled),
            other => Err(CodegenError::UnsupportedEncoding(other.to_string())),
        }
    }
}

impl FromStr for UnitEncoding {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_tag(s)
    }
}

impl fmt::Display for UnitEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Encoded-unit record: `(kind, bytes)`
///
/// `kind` stays a string so a blob written with an unknown tag still
/// decodes, and the tag is rejected by name at restore time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedUnit {
    pub kind: String,
    pub bytes: Vec<u8>,
}

impl EncodedUnit {
    pub fn new(encoding: UnitEncoding, bytes: Vec<u8>) -> Self {
        Self {
            kind: encoding.tag().to_string(),
            bytes,
        }
    }

    pub fn encoding(&self) -> Result<UnitEncoding> {
        UnitEncoding::from_tag(&self.kind)
    }
}

/// Child in a generically serializable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChildState {
    Buffer(Vec<f64>),
    Symbolic(SymbolicUnit),
}

/// Opaque state field owned by a host collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Floats(Vec<f64>),
}

/// Serializable snapshot of a host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateBlob {
    pub fields: IndexMap<String, FieldValue>,
    /// Children other than managed units
    pub children: IndexMap<String, ChildState>,
    /// Managed units in registry order
    pub encoded_units: Option<IndexMap<String, EncodedUnit>>,
    /// Names of all children, managed or not, in host order
    pub child_order: Vec<String>,
}

impl StateBlob {
    /// Bytes with a format header, suitable for persisting
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self).map_err(|e| CodegenError::Encode(e.to_string()))?;
        let mut out = Vec::with_capacity(6 + payload.len());
        out.extend_from_slice(STATE_MAGIC);
        out.extend_from_slice(&STATE_VERSION.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 6 || &bytes[..4] != STATE_MAGIC {
            return Err(CodegenError::Decode("not a graphgen state blob".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != STATE_VERSION {
            return Err(CodegenError::Decode(format!(
                "unsupported state blob version {}",
                version
            )));
        }
        Ok(bincode::deserialize(&bytes[6..])?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()?)?;
        log::debug!("Wrote state blob to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        log::debug!("Read {} byte state blob from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes)
    }
}
