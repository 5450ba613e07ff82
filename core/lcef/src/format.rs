//! LCEF container layout.
//!
//! ```text
//! +-------+---------+----------------+-----------------+------------------+
//! | magic | version | header length  | header          | body ciphertext  |
//! | LCEF  | u8 (0)  | u32 LE         | protobuf        | until EOF        |
//! +-------+---------+----------------+-----------------+------------------+
//! ```

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};
use prost::Message;

use lifechest_common::{Error, Result};
use lifechest_crypto::Iv;

/// Leading bytes of every container.
pub const MAGIC: [u8; 4] = *b"LCEF";
/// The only format version understood.
pub const VERSION: u8 = 0;
/// Mime type for file pickers.
pub const MIME_TYPE: &str = "application/vnd.fr.theskyblockman.life_chest.lcef";
/// File extension of exported containers.
pub const EXTENSION: &str = "lcef";
/// Upper bound on the header, thumbnail included.
pub const MAX_HEADER_SIZE: u32 = 16 * 1024 * 1024;

/// Plain metadata of the exported file.
#[derive(Clone, PartialEq, Message)]
pub struct FileMetadata {
    /// Left empty; the name travels encrypted.
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub mime_type: String,
    #[prost(uint64, tag = "3")]
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    #[prost(int64, tag = "4")]
    pub creation_date: i64,
    /// Import date in the source vault, milliseconds since the Unix epoch.
    #[prost(int64, tag = "5")]
    pub last_modified: i64,
}

impl FileMetadata {
    pub fn creation_date(&self) -> Result<DateTime<Utc>> {
        from_millis(self.creation_date)
    }

    pub fn last_modified(&self) -> Result<DateTime<Utc>> {
        from_millis(self.last_modified)
    }
}

/// Everything an importer needs besides the body ciphertext.
#[derive(Clone, PartialEq, Message)]
pub struct LcefHeader {
    /// Fingerprint of the source vault key.
    #[prost(bytes = "vec", tag = "1")]
    pub key_hash: Vec<u8>,
    /// IV of the body ciphertext.
    #[prost(bytes = "vec", tag = "2")]
    pub iv: Vec<u8>,
    /// Unlock mechanism id of the source vault.
    #[prost(string, tag = "3")]
    pub unlock_method: String,
    /// Auxiliary unlock data of the source vault.
    #[prost(btree_map = "string, bytes", tag = "4")]
    pub additional_unlock_data: BTreeMap<String, Vec<u8>>,
    #[prost(bytes = "vec", tag = "5")]
    pub encrypted_file_name_iv: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub encrypted_file_name: Vec<u8>,
    #[prost(message, optional, tag = "7")]
    pub file_metadata: Option<FileMetadata>,
    #[prost(string, tag = "8")]
    pub file_id: String,
    #[prost(string, tag = "9")]
    pub vault_id: String,
    /// Thumbnail ciphertext; empty when there is none.
    #[prost(bytes = "vec", tag = "10")]
    pub thumbnail: Vec<u8>,
    #[prost(bytes = "vec", tag = "11")]
    pub thumbnail_iv: Vec<u8>,
}

impl LcefHeader {
    pub fn body_iv(&self) -> Result<Iv> {
        parse_iv(&self.iv, "body")
    }

    pub fn file_name_iv(&self) -> Result<Iv> {
        parse_iv(&self.encrypted_file_name_iv, "file name")
    }

    /// IV of the thumbnail, `None` when the container has no thumbnail.
    pub fn thumbnail_iv(&self) -> Result<Option<Iv>> {
        if self.thumbnail.is_empty() {
            return Ok(None);
        }
        parse_iv(&self.thumbnail_iv, "thumbnail").map(Some)
    }

    pub fn metadata(&self) -> Result<&FileMetadata> {
        self.file_metadata
            .as_ref()
            .ok_or_else(|| Error::Corruption("Container has no file metadata".to_string()))
    }
}

fn parse_iv(bytes: &[u8], what: &str) -> Result<Iv> {
    Iv::from_slice(bytes).map_err(|_| Error::Corruption(format!("Invalid {} IV", what)))
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Corruption(format!("Timestamp out of range: {}", millis)))
}

/// Write magic, version, length and header.
///
/// # Returns
/// Number of bytes written.
pub fn write_header<W: Write>(writer: &mut W, header: &LcefHeader) -> Result<u64> {
    let encoded = header.encode_to_vec();
    let length = u32::try_from(encoded.len())
        .ok()
        .filter(|len| *len <= MAX_HEADER_SIZE)
        .ok_or_else(|| Error::InvalidInput("Container header too large".to_string()))?;

    writer.write_all(&MAGIC)?;
    writer.write_all(&[VERSION])?;
    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(&encoded)?;
    Ok((MAGIC.len() + 1 + 4 + encoded.len()) as u64)
}

/// Read the header, leaving `reader` at the first body byte.
///
/// # Errors
/// - `UnsupportedFormat` on a wrong magic or version
/// - `Corruption` on a truncated or undecodable header
pub fn read_header<R: Read>(reader: &mut R) -> Result<LcefHeader> {
    let mut magic = [0u8; 4];
    read_exact_or(reader, &mut magic, || {
        Error::UnsupportedFormat("Not an LCEF container".to_string())
    })?;
    if magic != MAGIC {
        return Err(Error::UnsupportedFormat("Not an LCEF container".to_string()));
    }

    let mut version = [0u8; 1];
    read_exact_or(reader, &mut version, truncated)?;
    if version[0] != VERSION {
        return Err(Error::UnsupportedFormat(format!(
            "Unsupported LCEF version: {}",
            version[0]
        )));
    }

    let mut length = [0u8; 4];
    read_exact_or(reader, &mut length, truncated)?;
    let length = u32::from_le_bytes(length);
    if length > MAX_HEADER_SIZE {
        return Err(Error::Corruption(format!(
            "Container header too large: {} bytes",
            length
        )));
    }

    let mut encoded = vec![0u8; length as usize];
    read_exact_or(reader, &mut encoded, truncated)?;
    LcefHeader::decode(encoded.as_slice())
        .map_err(|e| Error::Corruption(format!("Invalid container header: {}", e)))
}

/// Whether `reader` starts with the LCEF magic. Consumes up to four bytes.
pub fn is_lcef<R: Read>(reader: &mut R) -> Result<bool> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(()) => Ok(magic == MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn truncated() -> Error {
    Error::Corruption("Container header is truncated".to_string())
}

fn read_exact_or<R: Read>(reader: &mut R, buf: &mut [u8], eof: impl FnOnce() -> Error) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(eof()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header() -> LcefHeader {
        LcefHeader {
            key_hash: vec![1; 32],
            iv: vec![2; 16],
            unlock_method: "pin".to_string(),
            additional_unlock_data: BTreeMap::from([("k".to_string(), vec![3, 4])]),
            encrypted_file_name_iv: vec![5; 16],
            encrypted_file_name: b"xyz".to_vec(),
            file_metadata: Some(FileMetadata {
                name: String::new(),
                mime_type: "text/plain".to_string(),
                size: 10,
                creation_date: 1_700_000_000_000,
                last_modified: 1_700_000_000_500,
            }),
            file_id: "ab".to_string(),
            vault_id: "cd".to_string(),
            thumbnail: Vec::new(),
            thumbnail_iv: Vec::new(),
        }
    }

    #[test]
    fn test_layout() {
        let mut out = Vec::new();
        let written = write_header(&mut out, &header()).unwrap();

        assert_eq!(written as usize, out.len());
        assert_eq!(&out[..4], b"LCEF");
        assert_eq!(out[4], 0);
        let length = u32::from_le_bytes([out[5], out[6], out[7], out[8]]) as usize;
        assert_eq!(length, out.len() - 9);
    }

    #[test]
    fn test_reader_left_at_body() {
        let mut out = Vec::new();
        write_header(&mut out, &header()).unwrap();
        out.extend_from_slice(b"BODY");

        let mut cursor = Cursor::new(out);
        assert_eq!(read_header(&mut cursor).unwrap(), header());

        let mut body = Vec::new();
        cursor.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"BODY");
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let mut out = Vec::new();
        write_header(&mut out, &header()).unwrap();

        let mut wrong_magic = out.clone();
        wrong_magic[0] = b'X';
        assert!(matches!(
            read_header(&mut Cursor::new(wrong_magic)),
            Err(Error::UnsupportedFormat(_))
        ));

        let mut wrong_version = out.clone();
        wrong_version[4] = 1;
        assert!(matches!(
            read_header(&mut Cursor::new(wrong_version)),
            Err(Error::UnsupportedFormat(_))
        ));

        out.truncate(out.len() - 3);
        assert!(matches!(
            read_header(&mut Cursor::new(out)),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_sniff() {
        assert!(is_lcef(&mut Cursor::new(b"LCEF\x00rest".to_vec())).unwrap());
        assert!(!is_lcef(&mut Cursor::new(b"PK\x03\x04".to_vec())).unwrap());
        assert!(!is_lcef(&mut Cursor::new(b"LC".to_vec())).unwrap());
    }

    #[test]
    fn test_optional_thumbnail() {
        let mut with = header();
        assert_eq!(with.thumbnail_iv().unwrap(), None);

        with.thumbnail = vec![7; 8];
        assert!(with.thumbnail_iv().is_err());
        with.thumbnail_iv = vec![8; 16];
        assert!(with.thumbnail_iv().unwrap().is_some());
    }
}
