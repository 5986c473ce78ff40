// IR Archive: portable encoding of the graph behind a compiled kernel
//
// Native code cannot be persisted, so a compiled unit is stored as the IR
// it was built from and recompiled on load.
//
// Layout (little-endian):
//   magic    [u8; 4]   b"GGIR"
//   version  u16
//   digest   [u8; 32]  SHA-256 of payload
//   length   u64       payload length in bytes
//   payload  [u8]      bincode-encoded IRGraph

use crate::core::error::{CodegenError, Result};
use crate::ir::IRGraph;
use sha2::{Digest, Sha256};

pub const ARCHIVE_MAGIC: &[u8; 4] = b"GGIR";
pub const ARCHIVE_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 32 + 8;

/// Encode a graph into an IR archive
pub fn encode_graph(graph: &IRGraph) -> Result<Vec<u8>> {
    let payload = bincode::serialize(graph).map_err(|e| CodegenError::Encode(e.to_string()))?;
    let digest: [u8; 32] = Sha256::digest(&payload).into();

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(ARCHIVE_MAGIC);
    out.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
    out.extend_from_slice(&digest);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode and validate an IR archive
pub fn decode_graph(bytes: &[u8]) -> Result<IRGraph> {
    if bytes.len() < HEADER_LEN {
        return Err(CodegenError::Decode(format!(
            "IR archive truncated: {} bytes, header needs {}",
            bytes.len(),
            HEADER_LEN
        )));
    }
    let (magic, rest) = bytes.split_at(4);
    if magic != ARCHIVE_MAGIC {
        return Err(CodegenError::Decode("not an IR archive (bad magic)".to_string()));
    }

    let (version, rest) = rest.split_at(2);
    let version = u16::from_le_bytes([version[0], version[1]]);
    if version != ARCHIVE_VERSION {
        return Err(CodegenError::Decode(format!(
            "unsupported IR archive version {}",
            version
        )));
    }

    let (digest, rest) = rest.split_at(32);
    let (length, payload) = rest.split_at(8);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(length);
    let length = u64::from_le_bytes(len_bytes);
    if length != payload.len() as u64 {
        return Err(CodegenError::Decode(format!(
            "IR archive payload is {} bytes, header says {}",
            payload.len(),
            length
        )));
    }

    let actual: [u8; 32] = Sha256::digest(payload).into();
    if actual.as_slice() != digest {
        return Err(CodegenError::Decode("IR archive digest mismatch".to_string()));
    }

    let graph: IRGraph = bincode::deserialize(payload)?;
    graph.validate()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{templates, UnaryOpKind};

    #[test]
    fn test_archive_roundtrip() {
        let graph = templates::gate(UnaryOpKind::Sigmoid).unwrap();
        let bytes = encode_graph(&graph).unwrap();
        assert_eq!(&bytes[..4], ARCHIVE_MAGIC);
        assert_eq!(decode_graph(&bytes).unwrap(), graph);
    }

    #[test]
    fn test_archive_rejects_bad_magic() {
        let graph = templates::activation(UnaryOpKind::Tanh).unwrap();
        let mut bytes = encode_graph(&graph).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode_graph(&bytes), Err(CodegenError::Decode(_))));
    }

    #[test]
    fn test_archive_rejects_future_version() {
        let graph = templates::activation(UnaryOpKind::Tanh).unwrap();
        let mut bytes = encode_graph(&graph).unwrap();
        bytes[4..6].copy_from_slice(&(ARCHIVE_VERSION + 1).to_le_bytes());
        assert!(matches!(decode_graph(&bytes), Err(CodegenError::Decode(_))));
    }

    #[test]
    fn test_archive_rejects_flipped_payload() {
        let graph = templates::affine(3.0, -1.0).unwrap();
        let mut bytes = encode_graph(&graph).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode_graph(&bytes), Err(CodegenError::Decode(_))));
    }

    #[test]
    fn test_archive_rejects_truncation() {
        let graph = templates::affine(3.0, -1.0).unwrap();
        let bytes = encode_graph(&graph).unwrap();
        assert!(decode_graph(&bytes[..bytes.len() - 3]).is_err());
        assert!(decode_graph(&bytes[..10]).is_err());
        assert!(decode_graph(&[]).is_err());
    }
}
