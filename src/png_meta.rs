//! Indexed PNG metadata parsing
//!
//! Walks the raw chunk stream of a PNG byte buffer to recover the header
//! fields, the palette, and the transparency table without decoding any
//! pixel data. Only paletted (color type 3) images pass; everything else
//! is rejected with a named error so callers can surface the exact reason
//! an image cannot be exported.

use thiserror::Error;

/// The 8-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// PNG color type for paletted images.
const COLOR_TYPE_INDEXED: u8 = 3;

/// Maximum number of palette entries a PLTE chunk may carry.
const MAX_PALETTE_ENTRIES: usize = 256;

/// One palette entry: red, green, blue.
pub type Rgb = [u8; 3];

/// Error type for metadata parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    /// Buffer does not start with the PNG signature
    #[error("not a PNG file (bad signature)")]
    Signature,
    /// A chunk declares more payload bytes than the buffer holds
    #[error("truncated {chunk} chunk: declared {declared} bytes, {available} available")]
    TruncatedChunk {
        chunk: String,
        declared: usize,
        available: usize,
    },
    /// No IHDR chunk found before the stream ended
    #[error("no IHDR chunk found")]
    MissingHeader,
    /// IHDR payload is not the fixed 13 bytes
    #[error("IHDR chunk is {0} bytes, expected 13")]
    MalformedHeader(usize),
    /// Width or height is zero
    #[error("image dimensions {width}x{height} must be non-zero")]
    ZeroDimension { width: u32, height: u32 },
    /// Bit depth outside the indexed set
    #[error("unsupported bit depth {0}, expected 1, 2, 4, or 8")]
    UnsupportedBitDepth(u8),
    /// Image is not paletted
    #[error("color type {0} is not indexed; only paletted PNGs are supported")]
    NotIndexed(u8),
    /// Adam7 interlacing is not supported
    #[error("interlaced PNGs are not supported")]
    Interlaced,
    /// Indexed image without a PLTE chunk
    #[error("indexed PNG has no PLTE chunk")]
    MissingPalette,
    /// PLTE payload is empty, not a multiple of 3, or over 256 entries
    #[error("PLTE chunk of {0} bytes is not 1-256 RGB triples")]
    MalformedPalette(usize),
    /// tRNS table longer than the palette
    #[error("tRNS table has {trns} entries but the palette has {palette}")]
    OversizedTrns { trns: usize, palette: usize },
}

/// Bit depth of an indexed PNG: bits per palette index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl BitDepth {
    /// Bits per pixel.
    pub fn bits(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(BitDepth::One),
            2 => Some(BitDepth::Two),
            4 => Some(BitDepth::Four),
            8 => Some(BitDepth::Eight),
            _ => None,
        }
    }
}

/// Header, palette, and transparency data of an indexed PNG.
///
/// The palette and transparency table are kept exactly as stored in the
/// file; re-encoding an atlas from this struct reproduces them byte for
/// byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngMetadata {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Bits per palette index (1, 2, 4, or 8)
    pub bit_depth: BitDepth,
    /// RGB palette entries from the PLTE chunk, in order
    pub palette: Vec<Rgb>,
    /// Per-entry alpha values from the tRNS chunk; may be shorter than
    /// the palette (missing entries are fully opaque)
    pub trns: Vec<u8>,
}

impl PngMetadata {
    /// Parse metadata from a complete PNG byte buffer.
    ///
    /// Chunk CRCs are not verified; the decoder revalidates the stream
    /// when pixel data is actually read. Iteration stops at IEND or at
    /// the end of the buffer, whichever comes first.
    pub fn parse(bytes: &[u8]) -> Result<Self, MetaError> {
        if bytes.len() < PNG_SIGNATURE.len() || bytes[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
            return Err(MetaError::Signature);
        }

        let mut header: Option<(u32, u32, BitDepth)> = None;
        let mut palette: Option<Vec<Rgb>> = None;
        let mut trns: Vec<u8> = Vec::new();

        let mut pos = PNG_SIGNATURE.len();
        // Each chunk: 4-byte big-endian length, 4-byte tag, payload, 4-byte CRC.
        while pos + 8 <= bytes.len() {
            let declared = u32::from_be_bytes([
                bytes[pos],
                bytes[pos + 1],
                bytes[pos + 2],
                bytes[pos + 3],
            ]) as usize;
            let tag: [u8; 4] = [bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]];
            let data_start = pos + 8;
            let data_end = data_start.checked_add(declared).unwrap_or(usize::MAX);
            if data_end > bytes.len() {
                return Err(MetaError::TruncatedChunk {
                    chunk: String::from_utf8_lossy(&tag).into_owned(),
                    declared,
                    available: bytes.len() - data_start,
                });
            }
            let data = &bytes[data_start..data_end];

            match &tag {
                b"IHDR" => header = Some(parse_ihdr(data)?),
                b"PLTE" => palette = Some(parse_plte(data)?),
                b"tRNS" => trns = data.to_vec(),
                b"IEND" => break,
                _ => {}
            }

            // Skip the CRC; a missing trailing CRC just ends iteration.
            pos = data_end + 4;
        }

        let (width, height, bit_depth) = header.ok_or(MetaError::MissingHeader)?;
        let palette = palette.ok_or(MetaError::MissingPalette)?;
        if trns.len() > palette.len() {
            return Err(MetaError::OversizedTrns {
                trns: trns.len(),
                palette: palette.len(),
            });
        }

        Ok(PngMetadata {
            width,
            height,
            bit_depth,
            palette,
            trns,
        })
    }

    /// Number of palette entries.
    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    /// Alpha value for a palette index. Entries beyond the transparency
    /// table are fully opaque.
    pub fn alpha_for(&self, index: usize) -> u8 {
        self.trns.get(index).copied().unwrap_or(255)
    }

    /// First palette index whose alpha is zero, if any.
    pub fn first_transparent_index(&self) -> Option<usize> {
        self.trns.iter().position(|&a| a == 0)
    }

    /// Whether both dimensions divide evenly into `tile_size` tiles.
    pub fn is_multiple_of(&self, tile_size: u32) -> bool {
        tile_size > 0 && self.width % tile_size == 0 && self.height % tile_size == 0
    }
}

/// Parse the fixed 13-byte IHDR payload.
fn parse_ihdr(data: &[u8]) -> Result<(u32, u32, BitDepth), MetaError> {
    if data.len() != 13 {
        return Err(MetaError::MalformedHeader(data.len()));
    }

    let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if width == 0 || height == 0 {
        return Err(MetaError::ZeroDimension { width, height });
    }

    let bit_depth = BitDepth::from_raw(data[8]).ok_or(MetaError::UnsupportedBitDepth(data[8]))?;
    if data[9] != COLOR_TYPE_INDEXED {
        return Err(MetaError::NotIndexed(data[9]));
    }
    // data[10] and data[11] are compression and filter method, both fixed
    // at zero in valid files; the interlace flag is the last byte.
    if data[12] != 0 {
        return Err(MetaError::Interlaced);
    }

    Ok((width, height, bit_depth))
}

/// Parse a PLTE payload into RGB triples.
fn parse_plte(data: &[u8]) -> Result<Vec<Rgb>, MetaError> {
    if data.is_empty() || data.len() % 3 != 0 || data.len() / 3 > MAX_PALETTE_ENTRIES {
        return Err(MetaError::MalformedPalette(data.len()));
    }
    Ok(data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}
