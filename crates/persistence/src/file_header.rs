// ---------------------------------------------------------------------------
// file_header – Save file header with magic bytes, version, sizes and checksum
// ---------------------------------------------------------------------------
//
// Header format (32 bytes, fixed-size, little-endian):
//   [0..4]   Magic bytes: "LSAV"
//   [4..8]   Header format version (u32)
//   [8..12]  Flags (u32: bit 0 = level sections are LZ4 compressed)
//   [12..20] Timestamp (Unix epoch milliseconds, u64)
//   [20..24] Info section size (u32)
//   [24..28] Payload size (u32)
//   [28..32] xxHash32 checksum of info ++ payload
//
// The info section (title, timestamp, screenshot, custom info) follows the
// header directly, so slot listings can read header + info without touching
// the level payload. The checksum is only verified on full loads.

use std::io::Read;

use xxhash_rust::xxh32::xxh32;

use crate::persist_error::PersistError;

/// Magic bytes identifying a save file written by this crate.
pub const MAGIC: [u8; 4] = *b"LSAV";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Current header layout version (distinct from the state payload version).
pub const HEADER_FORMAT_VERSION: u32 = 1;

/// Level sections inside the payload are LZ4 compressed.
pub const FLAG_COMPRESSED_LEVELS: u32 = 1;

const XXHASH_SEED: u32 = 0;

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub format_version: u32,
    pub flags: u32,
    pub timestamp: u64,
    pub info_size: u32,
    pub payload_size: u32,
    pub checksum: u32,
}

impl FileHeader {
    pub fn has_compressed_levels(&self) -> bool {
        self.flags & FLAG_COMPRESSED_LEVELS != 0
    }

    /// Parse the fixed-size header. Does not look at anything after it.
    pub fn parse(bytes: &[u8]) -> Result<Self, PersistError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PersistError::Serialization(format!(
                "Save file is too short for a header ({} bytes, need {})",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        if bytes[..4] != MAGIC {
            return Err(PersistError::Serialization(
                "Not a save file: magic bytes do not match".to_string(),
            ));
        }

        let format_version = read_u32(bytes, 4);
        if format_version > HEADER_FORMAT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected_max: HEADER_FORMAT_VERSION,
                found: format_version,
            });
        }

        Ok(Self {
            format_version,
            flags: read_u32(bytes, 8),
            timestamp: u64::from_le_bytes([
                bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17], bytes[18],
                bytes[19],
            ]),
            info_size: read_u32(bytes, 20),
            payload_size: read_u32(bytes, 24),
            checksum: read_u32(bytes, 28),
        })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Assemble a complete save file: header, info section, payload.
pub fn wrap_with_header(info: &[u8], payload: &[u8], flags: u32, timestamp: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + info.len() + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&HEADER_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&(info.len() as u32).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    // Checksum placeholder, patched below.
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(info);
    out.extend_from_slice(payload);

    let checksum = xxh32(&out[HEADER_SIZE..], XXHASH_SEED);
    out[28..32].copy_from_slice(&checksum.to_le_bytes());
    out
}

/// A fully validated save file split into its sections.
pub struct UnwrappedSave<'a> {
    pub header: FileHeader,
    pub info: &'a [u8],
    pub payload: &'a [u8],
}

/// Parse the header, check section sizes and verify the checksum.
pub fn unwrap_header(bytes: &[u8]) -> Result<UnwrappedSave<'_>, PersistError> {
    let header = FileHeader::parse(bytes)?;
    let info_end = HEADER_SIZE + header.info_size as usize;
    let payload_end = info_end + header.payload_size as usize;

    if bytes.len() < payload_end {
        return Err(PersistError::Serialization(format!(
            "Save file is truncated ({} bytes, header declares {})",
            bytes.len(),
            payload_end
        )));
    }

    let computed = xxh32(&bytes[HEADER_SIZE..payload_end], XXHASH_SEED);
    if computed != header.checksum {
        return Err(PersistError::Serialization(format!(
            "Save file is corrupted: checksum mismatch (expected {:#010X}, got {:#010X})",
            header.checksum, computed,
        )));
    }

    Ok(UnwrappedSave {
        info: &bytes[HEADER_SIZE..info_end],
        payload: &bytes[info_end..payload_end],
        header,
    })
}

/// Read only the header and the info section from a stream.
///
/// Used by slot listings: the level payload is never read.
pub fn read_header_and_info(reader: &mut dyn Read) -> Result<(FileHeader, Vec<u8>), PersistError> {
    let mut head = [0u8; HEADER_SIZE];
    reader.read_exact(&mut head).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            PersistError::Serialization("Save file is too short for a header".to_string())
        }
        _ => PersistError::Io(e),
    })?;
    let header = FileHeader::parse(&head)?;

    // info_size is not covered by the checksum; grow the buffer with what the
    // stream actually holds instead of trusting it for the allocation.
    let mut info = Vec::new();
    Read::take(reader, u64::from(header.info_size)).read_to_end(&mut info)?;
    if info.len() != header.info_size as usize {
        return Err(PersistError::Serialization(
            "Save file info section is truncated".to_string(),
        ));
    }
    Ok((header, info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_and_unwrap_roundtrip() {
        let wrapped = wrap_with_header(b"info", b"payload bytes", FLAG_COMPRESSED_LEVELS, 1234);
        assert_eq!(&wrapped[..4], &MAGIC);
        assert_eq!(wrapped.len(), HEADER_SIZE + 4 + 13);

        let save = unwrap_header(&wrapped).expect("unwrap should succeed");
        assert_eq!(save.header.format_version, HEADER_FORMAT_VERSION);
        assert_eq!(save.header.timestamp, 1234);
        assert!(save.header.has_compressed_levels());
        assert_eq!(save.info, b"info");
        assert_eq!(save.payload, b"payload bytes");
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let mut wrapped = wrap_with_header(b"info", b"payload", 0, 0);
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0xFF;

        let err = unwrap_header(&wrapped).err().expect("should fail");
        let msg = format!("{err}");
        assert!(msg.contains("checksum mismatch"), "got: {msg}");
    }

    #[test]
    fn test_truncated_file_detected() {
        let wrapped = wrap_with_header(b"info", b"payload", 0, 0);
        let err = unwrap_header(&wrapped[..wrapped.len() - 3])
            .err()
            .expect("should fail");
        assert!(format!("{err}").contains("truncated"));
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let mut wrapped = wrap_with_header(b"", b"", 0, 0);
        wrapped[0] = b'X';
        assert!(FileHeader::parse(&wrapped).is_err());
    }

    #[test]
    fn test_future_header_version_rejected() {
        let mut wrapped = wrap_with_header(b"i", b"p", 0, 0);
        wrapped[4..8].copy_from_slice(&999u32.to_le_bytes());
        let err = FileHeader::parse(&wrapped).err().expect("should fail");
        assert!(matches!(
            err,
            PersistError::VersionMismatch { found: 999, .. }
        ));
    }

    #[test]
    fn test_read_header_and_info_stops_before_payload() {
        let wrapped = wrap_with_header(b"the info", b"a large payload we never read", 0, 77);
        let mut cursor = std::io::Cursor::new(wrapped);

        let (header, info) = read_header_and_info(&mut cursor).unwrap();
        assert_eq!(header.timestamp, 77);
        assert_eq!(info, b"the info");
        assert_eq!(cursor.position() as usize, HEADER_SIZE + 8);
    }

    #[test]
    fn test_read_header_and_info_oversized_info_size() {
        let mut wrapped = wrap_with_header(b"the info", b"payload", 0, 1);
        wrapped[20..24].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = std::io::Cursor::new(wrapped);

        let err = read_header_and_info(&mut cursor).unwrap_err();
        assert!(matches!(err, PersistError::Serialization(_)));
    }

    #[test]
    fn test_read_header_and_info_short_stream() {
        let mut cursor = std::io::Cursor::new(b"LSAV".to_vec());
        assert!(read_header_and_info(&mut cursor).is_err());
    }
}
