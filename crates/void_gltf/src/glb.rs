//! GLB binary container framing
//!
//! Layout (all fields little-endian):
//! - 12-byte header: magic, version, total length
//! - chunks: 4-byte length, 4-byte type tag, payload
//!
//! The first chunk must carry the JSON document. An optional BIN chunk may
//! follow; any other chunk types are skipped.

use crate::error::{CodecError, CodecResult};

/// "glTF" in little-endian byte order
pub const MAGIC: u32 = 0x4654_6C67;
/// The only container version understood by this codec
pub const VERSION: u32 = 2;
/// "JSON" chunk type tag
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
/// "BIN\0" chunk type tag
pub const CHUNK_BIN: u32 = 0x004E_4942;

pub const HEADER_LEN: usize = 12;
pub const CHUNK_HEADER_LEN: usize = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ContainerHeader {
    magic: u32,
    version: u32,
    length: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ChunkHeader {
    length: u32,
    kind: u32,
}

/// Borrowed view of a validated container
#[derive(Debug, Clone, Copy)]
pub struct Container<'a> {
    /// JSON chunk payload (may include trailing space padding)
    pub json: &'a [u8],
    /// BIN chunk payload, if present
    pub bin: Option<&'a [u8]>,
}

/// Check whether the buffer starts with the container magic
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == MAGIC
}

/// Validate the container framing and split it into chunks
pub fn split(bytes: &[u8]) -> CodecResult<Container<'_>> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TruncatedHeader(bytes.len()));
    }

    let header: ContainerHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_LEN]);

    let magic = u32::from_le(header.magic);
    if magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }

    let version = u32::from_le(header.version);
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let declared = u32::from_le(header.length) as usize;
    if declared < HEADER_LEN || declared > bytes.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    if declared < bytes.len() {
        log::debug!(
            "Ignoring {} trailing bytes after container end",
            bytes.len() - declared
        );
    }

    let body = &bytes[HEADER_LEN..declared];

    let (kind, length, rest) = read_chunk_header(body)?;
    if kind != CHUNK_JSON {
        return Err(CodecError::NonJsonChunk(kind));
    }
    let (json, mut rest) = take_chunk(rest, length)?;

    let mut bin = None;
    while !rest.is_empty() {
        let (kind, length, tail) = read_chunk_header(rest)?;
        let (data, tail) = take_chunk(tail, length)?;

        if kind == CHUNK_BIN && bin.is_none() {
            bin = Some(data);
        } else {
            log::debug!("Skipping container chunk with type tag {:#010x}", kind);
        }
        rest = tail;
    }

    Ok(Container { json, bin })
}

fn read_chunk_header(buf: &[u8]) -> CodecResult<(u32, usize, &[u8])> {
    if buf.len() < CHUNK_HEADER_LEN {
        return Err(CodecError::TruncatedChunk {
            declared: CHUNK_HEADER_LEN,
            available: buf.len(),
        });
    }

    let header: ChunkHeader = bytemuck::pod_read_unaligned(&buf[..CHUNK_HEADER_LEN]);
    Ok((
        u32::from_le(header.kind),
        u32::from_le(header.length) as usize,
        &buf[CHUNK_HEADER_LEN..],
    ))
}

fn take_chunk(buf: &[u8], length: usize) -> CodecResult<(&[u8], &[u8])> {
    if length > buf.len() {
        return Err(CodecError::TruncatedChunk {
            declared: length,
            available: buf.len(),
        });
    }
    Ok(buf.split_at(length))
}

/// Wrap a JSON payload (and optional binary payload) in a container
///
/// The JSON chunk is padded with spaces and the BIN chunk with zeros so
/// every chunk starts on a 4-byte boundary. Fails when the container would
/// not fit the 32-bit length fields.
pub fn write(json: &[u8], bin: Option<&[u8]>) -> CodecResult<Vec<u8>> {
    let json_len = padded(json.len());
    let bin_len = bin.map(|b| padded(b.len()));

    let total = HEADER_LEN
        + CHUNK_HEADER_LEN
        + json_len
        + bin_len.map(|l| CHUNK_HEADER_LEN + l).unwrap_or(0);

    let mut out = Vec::with_capacity(total);
    let header = ContainerHeader {
        magic: MAGIC.to_le(),
        version: VERSION.to_le(),
        length: length_field(total)?.to_le(),
    };
    out.extend_from_slice(bytemuck::bytes_of(&header));

    push_chunk(&mut out, CHUNK_JSON, json, json_len, b' ')?;
    if let (Some(bin), Some(bin_len)) = (bin, bin_len) {
        push_chunk(&mut out, CHUNK_BIN, bin, bin_len, 0)?;
    }

    Ok(out)
}

fn push_chunk(
    out: &mut Vec<u8>,
    kind: u32,
    data: &[u8],
    padded_len: usize,
    pad: u8,
) -> CodecResult<()> {
    let header = ChunkHeader {
        length: length_field(padded_len)?.to_le(),
        kind: kind.to_le(),
    };
    out.extend_from_slice(bytemuck::bytes_of(&header));
    out.extend_from_slice(data);
    out.resize(out.len() + (padded_len - data.len()), pad);
    Ok(())
}

/// Checked conversion for header and chunk length fields
fn length_field(len: usize) -> CodecResult<u32> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge(len))
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}
