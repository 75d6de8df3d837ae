//! Binary record store file format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (64 bytes, fixed)             │
//! │  magic: [u8; 8] = b"MTRIAGE\0"      │
//! │  version: u32                        │
//! │  flags: u32                          │
//! │  record_count: u64                   │
//! │  sha256_payload: [u8; 32]           │
//! │  (padding to 64 bytes)               │
//! ├──────────────────────────────────────┤
//! │ PAYLOAD (variable)                   │
//! │  bincode-serialized Vec<Record>      │
//! └──────────────────────────────────────┘
//! ```

/// Magic bytes identifying a mailtriage store file.
pub const MAGIC: &[u8; 8] = b"MTRIAGE\0";

/// Current store format version.
pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Serializable store header.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct StoreHeader {
    /// Magic bytes (must equal [`MAGIC`]).
    pub magic: [u8; 8],
    /// Format version (must equal [`VERSION`]).
    pub version: u32,
    /// Reserved flags (currently unused).
    pub flags: u32,
    /// Number of records in the payload.
    pub record_count: u64,
    /// SHA-256 of the payload bytes.
    pub sha256_payload: [u8; 32],
}

impl StoreHeader {
    /// Validate that the header is well-formed and matches the current format.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }
}
