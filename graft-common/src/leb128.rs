//! ULEB128 variable-length integers used throughout the unit wire format.
//!
//! Overlong encodings are rejected so that every value has exactly one
//! byte representation and encode∘decode is the identity.

use crate::DecodeError;

/// Reads an unsigned LEB128 integer as `u64`, advancing `offset`.
pub fn read_u64(bytes: &[u8], offset: &mut usize) -> Result<u64, DecodeError> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    for i in 0..10 {
        let b = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
        *offset += 1;

        let payload = b & 0x7f;
        // The tenth byte can only carry the top bit of a u64.
        if i == 9 && payload > 1 {
            return Err(DecodeError::InvalidVarint);
        }
        value |= u64::from(payload) << shift;
        if (b & 0x80) == 0 {
            // Reject trailing zero payloads ("overlong" encodings).
            if i > 0 && payload == 0 {
                return Err(DecodeError::InvalidVarint);
            }
            return Ok(value);
        }
        shift += 7;
    }

    Err(DecodeError::InvalidVarint)
}

/// Reads a ULEB128 value that must fit in `u32`.
pub fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32, DecodeError> {
    let value = read_u64(bytes, offset)?;
    u32::try_from(value).map_err(|_| DecodeError::InvalidVarint)
}

/// Reads a ULEB128 length field as `usize`.
pub fn read_len(bytes: &[u8], offset: &mut usize) -> Result<usize, DecodeError> {
    let value = read_u64(bytes, offset)?;
    usize::try_from(value).map_err(|_| DecodeError::InvalidVarint)
}

/// Writes an unsigned LEB128 integer.
pub fn write_u64(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut b = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            b |= 0x80;
        }
        out.push(b);
        if value == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u64) -> u64 {
        let mut buf = Vec::new();
        write_u64(&mut buf, value);
        let mut offset = 0;
        let decoded = read_u64(&buf, &mut offset).expect("decode");
        assert_eq!(offset, buf.len());
        decoded
    }

    #[test]
    fn test_round_trip_boundaries() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            assert_eq!(round_trip(value), value);
        }
    }

    #[test]
    fn test_single_byte_values_encode_to_one_byte() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 127);
        assert_eq!(buf, [0x7f]);
    }

    #[test]
    fn test_truncated_input_is_eof() {
        let mut offset = 0;
        assert_eq!(read_u64(&[0x80], &mut offset), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn test_overlong_encoding_rejected() {
        // 0 encoded in two bytes
        let mut offset = 0;
        assert_eq!(read_u64(&[0x80, 0x00], &mut offset), Err(DecodeError::InvalidVarint));
    }

    #[test]
    fn test_eleven_byte_varint_rejected() {
        let bytes = [0xff; 11];
        let mut offset = 0;
        assert_eq!(read_u64(&bytes, &mut offset), Err(DecodeError::InvalidVarint));
    }

    #[test]
    fn test_u32_overflow_rejected() {
        let mut buf = Vec::new();
        write_u64(&mut buf, u64::from(u32::MAX) + 1);
        let mut offset = 0;
        assert_eq!(read_u32(&buf, &mut offset), Err(DecodeError::InvalidVarint));
    }
}
