//! On-disk layout of embedding blobs: little-endian `f64` values, 8 bytes
//! each, no header.

use devmem_core::{DevmemError, DevmemResult};

const COMPONENT_SIZE: usize = std::mem::size_of::<f64>();

/// Serialize a vector for BLOB storage.
pub fn encode_vector(vector: &[f64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(vector.len() * COMPONENT_SIZE);
    for v in vector {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

/// Deserialize a stored BLOB. The length must be a multiple of 8.
pub fn decode_vector(bytes: &[u8]) -> DevmemResult<Vec<f64>> {
    if bytes.len() % COMPONENT_SIZE != 0 {
        return Err(DevmemError::Search(format!(
            "embedding blob of {} bytes is not a multiple of {COMPONENT_SIZE}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(COMPONENT_SIZE)
        .map(|chunk| {
            let mut raw = [0u8; COMPONENT_SIZE];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_little_endian_f64() {
        let bytes = encode_vector(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
        assert_eq!(&bytes[8..], &(-2.5f64).to_le_bytes());
    }

    #[test]
    fn test_roundtrip_preserves_bits() {
        let v = vec![0.0, -0.0, 1e-300, f64::MAX, std::f64::consts::PI];
        let decoded = decode_vector(&encode_vector(&v)).unwrap();
        let bits = |xs: &[f64]| xs.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&decoded), bits(&v));
    }

    #[test]
    fn test_empty_blob() {
        assert!(encode_vector(&[]).is_empty());
        assert!(decode_vector(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let err = decode_vector(&[0u8; 12]).unwrap_err();
        assert!(matches!(err, DevmemError::Search(_)));
    }
}
