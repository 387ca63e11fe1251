//! On-disk header and chunk index: magic, version, dimensions, chunking,
//! and the `(offset, length)` table that locates each compressed chunk.

use wx_common::WxError;

pub const MAGIC: [u8; 3] = *b"OM\x01";
pub const VERSION: u8 = 1;

/// Fixed-size header fields, all big-endian on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub n_locations: u64,
    pub n_time: u64,
    pub chunk_loc: u32,
    pub chunk_time: u32,
    pub scalefactor: f32,
}

/// `HEADER_LEN` = magic(3) + version(1) + nLocations(8) + nTime(8) +
/// chunkLoc(4) + chunkTime(4) + scalefactor(4).
pub const HEADER_LEN: usize = 3 + 1 + 8 + 8 + 4 + 4 + 4;

/// One entry in the chunk index: byte offset (relative to the start of the
/// payload) and compressed length. `length == 0` means "entirely missing",
/// consuming no payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkIndexEntry {
    pub offset: u64,
    pub length: u32,
}

pub const CHUNK_INDEX_ENTRY_LEN: usize = 8 + 4;

impl Header {
    pub fn chunks_x(&self) -> u64 {
        self.n_locations.div_ceil(self.chunk_loc as u64)
    }

    pub fn chunks_y(&self) -> u64 {
        self.n_time.div_ceil(self.chunk_time as u64)
    }

    pub fn n_chunks(&self) -> u64 {
        self.chunks_x() * self.chunks_y()
    }

    pub fn chunk_index_len(&self) -> usize {
        self.n_chunks() as usize * CHUNK_INDEX_ENTRY_LEN
    }

    pub fn payload_start(&self) -> usize {
        HEADER_LEN + self.chunk_index_len()
    }

    /// Chunk id for a given location-chunk-row and time-chunk-column,
    /// row-major over `(locChunk, timeChunk)`.
    pub fn chunk_id(&self, loc_chunk: u64, time_chunk: u64) -> u64 {
        loc_chunk * self.chunks_y() + time_chunk
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&self.n_locations.to_be_bytes());
        buf.extend_from_slice(&self.n_time.to_be_bytes());
        buf.extend_from_slice(&self.chunk_loc.to_be_bytes());
        buf.extend_from_slice(&self.chunk_time.to_be_bytes());
        buf.extend_from_slice(&self.scalefactor.to_be_bytes());
        buf
    }

    pub fn parse(path: &str, bytes: &[u8]) -> Result<Self, WxError> {
        if bytes.len() < HEADER_LEN {
            return Err(WxError::format_invalid(path, "file shorter than header"));
        }
        if bytes[0..3] != MAGIC {
            return Err(WxError::format_invalid(path, "bad magic"));
        }
        if bytes[3] != VERSION {
            return Err(WxError::format_invalid(
                path,
                format!("unsupported version {}", bytes[3]),
            ));
        }
        let n_locations = u64::from_be_bytes(bytes[4..12].try_into().unwrap());
        let n_time = u64::from_be_bytes(bytes[12..20].try_into().unwrap());
        let chunk_loc = u32::from_be_bytes(bytes[20..24].try_into().unwrap());
        let chunk_time = u32::from_be_bytes(bytes[24..28].try_into().unwrap());
        let scalefactor = f32::from_be_bytes(bytes[28..32].try_into().unwrap());

        if chunk_loc == 0 || chunk_time == 0 {
            return Err(WxError::format_invalid(path, "zero chunk dimension"));
        }

        Ok(Header {
            n_locations,
            n_time,
            chunk_loc,
            chunk_time,
            scalefactor,
        })
    }
}

pub fn parse_chunk_index(
    path: &str,
    bytes: &[u8],
    header: &Header,
) -> Result<Vec<ChunkIndexEntry>, WxError> {
    let index_start = HEADER_LEN;
    let index_len = header.chunk_index_len();
    if bytes.len() < index_start + index_len {
        return Err(WxError::format_invalid(path, "file shorter than chunk index"));
    }
    let mut entries = Vec::with_capacity(header.n_chunks() as usize);
    let mut cursor = index_start;
    for _ in 0..header.n_chunks() {
        let offset = u64::from_be_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
        let length = u32::from_be_bytes(bytes[cursor + 8..cursor + 12].try_into().unwrap());
        entries.push(ChunkIndexEntry { offset, length });
        cursor += CHUNK_INDEX_ENTRY_LEN;
    }

    let payload_len = bytes.len() - header.payload_start();
    for e in &entries {
        if e.length > 0 && e.offset + e.length as u64 > payload_len as u64 {
            return Err(WxError::format_invalid(path, "chunk index entry out of file bounds"));
        }
    }

    Ok(entries)
}

pub fn serialize_chunk_index(entries: &[ChunkIndexEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * CHUNK_INDEX_ENTRY_LEN);
    for e in entries {
        buf.extend_from_slice(&e.offset.to_be_bytes());
        buf.extend_from_slice(&e.length.to_be_bytes());
    }
    buf
}
