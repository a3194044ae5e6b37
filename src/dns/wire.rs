use crate::dns::name::{MAX_LABEL_LEN, MAX_NAME_WIRE_LEN, Name};
use crate::error::ResolveError;

/// Upper bound on compression-pointer jumps while decoding one name. Real
/// messages need a handful; anything deeper is a loop.
const MAX_POINTER_JUMPS: usize = 32;

/// Cursor over a raw DNS message.
///
/// Reads are bounds-checked and name decoding follows RFC 1035 compression
/// pointers, which is why the cursor keeps the whole message around rather
/// than a narrowing slice.
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        WireReader { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn truncated(what: &str) -> ResolveError {
        ResolveError::DecodeError(format!("message truncated reading {what}"))
    }

    pub fn read_u8(&mut self) -> Result<u8, ResolveError> {
        let byte = *self.data.get(self.pos).ok_or_else(|| Self::truncated("u8"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16, ResolveError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ResolveError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ResolveError> {
        if self.remaining() < len {
            return Err(Self::truncated("bytes"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Decode a possibly-compressed domain name at the cursor.
    pub fn read_name(&mut self) -> Result<Name, ResolveError> {
        let mut labels: Vec<String> = Vec::new();
        let mut wire_len = 1usize; // terminating zero octet
        let mut jumps = 0usize;
        let mut cursor = self.pos;
        // The cursor past the name in the record we are actually decoding;
        // set when the first pointer is followed.
        let mut resume: Option<usize> = None;

        loop {
            let len = *self
                .data
                .get(cursor)
                .ok_or_else(|| Self::truncated("name"))? as usize;

            if len == 0 {
                cursor += 1;
                break;
            }

            if len & 0xC0 == 0xC0 {
                let low = *self
                    .data
                    .get(cursor + 1)
                    .ok_or_else(|| Self::truncated("compression pointer"))?
                    as usize;
                let target = ((len & 0x3F) << 8) | low;
                if resume.is_none() {
                    resume = Some(cursor + 2);
                }
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS || target >= cursor {
                    return Err(ResolveError::DecodeError(
                        "compression pointer loop".to_string(),
                    ));
                }
                cursor = target;
                continue;
            }

            if len & 0xC0 != 0 {
                return Err(ResolveError::DecodeError(format!(
                    "reserved label type {len:#04x}"
                )));
            }
            if len > MAX_LABEL_LEN {
                return Err(ResolveError::DecodeError("label too long".to_string()));
            }
            let end = cursor + 1 + len;
            if end > self.data.len() {
                return Err(Self::truncated("label"));
            }
            wire_len += 1 + len;
            if wire_len > MAX_NAME_WIRE_LEN {
                return Err(ResolveError::DecodeError("name too long".to_string()));
            }
            labels.push(String::from_utf8_lossy(&self.data[cursor + 1..end]).into_owned());
            cursor = end;
        }

        self.pos = resume.unwrap_or(cursor);
        Ok(Name::from_wire_labels(&labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_scalars_in_network_order() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
        let mut reader = WireReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x56789ABC);
        assert_eq!(reader.read_u8().unwrap(), 0xDE);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn decodes_a_compressed_name() {
        // "example.com." at offset 0, then "www" + pointer to offset 0.
        let mut data = Vec::new();
        data.extend_from_slice(&[7]);
        data.extend_from_slice(b"example");
        data.extend_from_slice(&[3]);
        data.extend_from_slice(b"com");
        data.push(0);
        let www_at = data.len();
        data.extend_from_slice(&[3]);
        data.extend_from_slice(b"www");
        data.extend_from_slice(&[0xC0, 0x00]);
        data.push(0xFF); // trailing byte the cursor must land before

        let mut reader = WireReader::new(&data);
        assert_eq!(reader.read_name().unwrap().to_string(), "example.com.");
        assert_eq!(reader.pos(), www_at);
        assert_eq!(reader.read_name().unwrap().to_string(), "www.example.com.");
        assert_eq!(reader.read_u8().unwrap(), 0xFF);
    }

    #[test]
    fn rejects_pointer_loops() {
        // Pointer at offset 0 pointing at itself.
        let data = [0xC0, 0x00];
        let mut reader = WireReader::new(&data);
        assert!(reader.read_name().is_err());
    }
}
