//! Palette index extraction from decoded pixel data
//!
//! Two strategies produce the same per-pixel index plane:
//!
//! - **Direct**: when the decoder hands back the paletted frame unchanged,
//!   the packed rows (1, 2, 4, or 8 bits per pixel) are unpacked straight
//!   into index bytes. Lossless by construction.
//! - **Reverse mapping**: when only an RGBA expansion is available, each
//!   pixel color is looked up against the palette. Exact matches only;
//!   a pixel with no matching entry is a hard error rather than a nearest
//!   color guess.

use std::collections::HashMap;
use std::io::Cursor;

use image::RgbaImage;
use thiserror::Error;

use crate::png_meta::{BitDepth, PngMetadata};

/// Error type for index extraction failures
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Decoder output dimensions disagree with the parsed header
    #[error("decoded image is {actual_w}x{actual_h} but the header declares {meta_w}x{meta_h}")]
    DimensionMismatch {
        actual_w: u32,
        actual_h: u32,
        meta_w: u32,
        meta_h: u32,
    },
    /// Pixel buffer shorter than the declared row layout
    #[error("pixel rows hold {actual} bytes but at least {expected} are required")]
    ShortPixelBuffer { expected: usize, actual: usize },
    /// An RGBA pixel matches no palette entry
    #[error("pixel at ({x}, {y}) has color ({r}, {g}, {b}, {a}) with no matching palette entry")]
    CannotMapPixel {
        x: u32,
        y: u32,
        r: u8,
        g: u8,
        b: u8,
        a: u8,
    },
    /// A decoded index points past the end of the palette
    #[error("pixel at ({x}, {y}) references palette index {index} but the palette has {palette} entries")]
    IndexOutOfRange {
        x: u32,
        y: u32,
        index: u8,
        palette: usize,
    },
    /// The PNG decoder rejected the stream
    #[error("failed to decode image data: {0}")]
    Decode(#[from] png::DecodingError),
    /// The RGBA expansion decode failed
    #[error("failed to expand image to RGBA: {0}")]
    ExpandRgba(#[from] image::ImageError),
}

/// How alpha was combined into an RGBA buffer's color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    /// Color channels are stored as-is
    #[default]
    Straight,
    /// Color channels were multiplied by alpha and must be divided back
    /// out before palette lookup; the rounding involved can make exact
    /// matches fail
    Premultiplied,
}

/// One palette index per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPlane {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl IndexPlane {
    /// Wrap an existing row-major index buffer.
    ///
    /// Returns `None` when the buffer length does not equal
    /// `width * height`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major index bytes, one per pixel.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Index at a pixel position. Panics when out of bounds.
    pub fn index_at(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

/// Decode a PNG buffer and recover one palette index per pixel.
///
/// The paletted frame is read without expansion when the decoder preserves
/// it (the normal case); if the decoder reports an expanded color model
/// instead, the reverse-mapping fallback runs on the RGBA pixels.
/// `preferred_transparent` is the palette index assigned to fully
/// transparent pixels on the fallback path, provided its palette alpha is
/// zero.
pub fn index_plane(
    bytes: &[u8],
    meta: &PngMetadata,
    preferred_transparent: u8,
) -> Result<IndexPlane, ExtractError> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let mut reader = decoder.read_info()?;
    match reader.output_color_type() {
        (png::ColorType::Indexed, _) => {
            let mut buf = vec![0u8; reader.output_buffer_size()];
            let info = reader.next_frame(&mut buf)?;
            if info.width != meta.width || info.height != meta.height {
                return Err(ExtractError::DimensionMismatch {
                    actual_w: info.width,
                    actual_h: info.height,
                    meta_w: meta.width,
                    meta_h: meta.height,
                });
            }
            from_packed(&buf, info.line_size, meta)
        }
        _ => index_plane_rgba(bytes, meta, preferred_transparent),
    }
}

/// Decode a PNG buffer through the RGBA expansion path and reverse-map
/// every pixel back to its palette index.
///
/// Expanded decodes carry straight (non-premultiplied) alpha.
pub fn index_plane_rgba(
    bytes: &[u8],
    meta: &PngMetadata,
    preferred_transparent: u8,
) -> Result<IndexPlane, ExtractError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    from_rgba(&rgba, meta, AlphaMode::Straight, preferred_transparent)
}

/// Unpack packed index rows into one byte per pixel.
///
/// `rows` must hold `meta.height` rows of `line_size` bytes each, with
/// indices packed most-significant-bits-first as the PNG format stores
/// them. Every recovered index is validated against the palette length.
pub fn from_packed(
    rows: &[u8],
    line_size: usize,
    meta: &PngMetadata,
) -> Result<IndexPlane, ExtractError> {
    let width = meta.width as usize;
    let height = meta.height as usize;

    let min_line = (width * meta.bit_depth.bits() as usize).div_ceil(8);
    let line_size = line_size.max(min_line);
    if rows.len() < height * line_size {
        return Err(ExtractError::ShortPixelBuffer {
            expected: height * line_size,
            actual: rows.len(),
        });
    }

    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        let row = &rows[y * line_size..(y + 1) * line_size];
        match meta.bit_depth {
            BitDepth::Eight => data.extend_from_slice(&row[..width]),
            BitDepth::Four => {
                for x in 0..width {
                    let byte = row[x / 2];
                    data.push(if x % 2 == 0 { byte >> 4 } else { byte & 0x0F });
                }
            }
            BitDepth::Two => {
                for x in 0..width {
                    let byte = row[x / 4];
                    let shift = 6 - 2 * (x % 4) as u32;
                    data.push((byte >> shift) & 0b11);
                }
            }
            BitDepth::One => {
                for x in 0..width {
                    let byte = row[x / 8];
                    let shift = 7 - (x % 8) as u32;
                    data.push((byte >> shift) & 1);
                }
            }
        }
    }

    let palette = meta.palette_len();
    if palette < 256 {
        for (i, &index) in data.iter().enumerate() {
            if index as usize >= palette {
                return Err(ExtractError::IndexOutOfRange {
                    x: (i % width) as u32,
                    y: (i / width) as u32,
                    index,
                    palette,
                });
            }
        }
    }

    Ok(IndexPlane {
        width: meta.width,
        height: meta.height,
        data,
    })
}

/// Palette lookup tables for the reverse-mapping path, built once per call.
/// On duplicate colors the lowest palette index wins.
struct PaletteLookup {
    by_rgb: HashMap<[u8; 3], u8>,
    by_rgba: HashMap<[u8; 4], u8>,
    transparent: u8,
}

impl PaletteLookup {
    fn new(meta: &PngMetadata, preferred_transparent: u8) -> Self {
        let mut by_rgb = HashMap::new();
        let mut by_rgba = HashMap::new();
        for (i, rgb) in meta.palette.iter().enumerate() {
            let index = i as u8;
            by_rgb.entry(*rgb).or_insert(index);
            by_rgba
                .entry([rgb[0], rgb[1], rgb[2], meta.alpha_for(i)])
                .or_insert(index);
        }

        // Fully transparent pixels: the caller's preferred index when its
        // palette alpha is zero, else the first zero-alpha entry, else 0.
        let transparent = if (preferred_transparent as usize) < meta.palette_len()
            && meta.alpha_for(preferred_transparent as usize) == 0
        {
            preferred_transparent
        } else if let Some(i) = meta.first_transparent_index() {
            i as u8
        } else {
            0
        };

        Self {
            by_rgb,
            by_rgba,
            transparent,
        }
    }
}

/// Reverse-map an RGBA buffer to palette indices.
///
/// Matching is exact: opaque pixels must equal a palette RGB entry,
/// partially transparent pixels must equal an entry's (RGB, alpha) pair,
/// and fully transparent pixels collapse onto one designated transparent
/// index regardless of color. `AlphaMode::Premultiplied` divides alpha
/// back out of the color channels first.
pub fn from_rgba(
    rgba: &RgbaImage,
    meta: &PngMetadata,
    mode: AlphaMode,
    preferred_transparent: u8,
) -> Result<IndexPlane, ExtractError> {
    let (width, height) = rgba.dimensions();
    if width != meta.width || height != meta.height {
        return Err(ExtractError::DimensionMismatch {
            actual_w: width,
            actual_h: height,
            meta_w: meta.width,
            meta_h: meta.height,
        });
    }

    let lookup = PaletteLookup::new(meta, preferred_transparent);
    let mut data = Vec::with_capacity((width as usize) * (height as usize));
    for y in 0..height {
        for x in 0..width {
            let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
            let index = match a {
                0 => lookup.transparent,
                255 => lookup
                    .by_rgb
                    .get(&[r, g, b])
                    .copied()
                    .ok_or(ExtractError::CannotMapPixel { x, y, r, g, b, a })?,
                _ => {
                    let [sr, sg, sb] = match mode {
                        AlphaMode::Straight => [r, g, b],
                        AlphaMode::Premultiplied => unpremultiply([r, g, b], a),
                    };
                    lookup
                        .by_rgba
                        .get(&[sr, sg, sb, a])
                        .copied()
                        .or_else(|| {
                            lookup
                                .by_rgb
                                .get(&[sr, sg, sb])
                                .copied()
                                .filter(|&i| meta.alpha_for(i as usize) == a)
                        })
                        .ok_or(ExtractError::CannotMapPixel { x, y, r, g, b, a })?
                }
            };
            data.push(index);
        }
    }

    Ok(IndexPlane {
        width,
        height,
        data,
    })
}

/// Divide alpha back out of a premultiplied color, rounding to nearest.
fn unpremultiply([r, g, b]: [u8; 3], alpha: u8) -> [u8; 3] {
    let divide = |c: u8| -> u8 {
        let v = (c as f64 * 255.0 / alpha as f64).round();
        v.clamp(0.0, 255.0) as u8
    };
    [divide(r), divide(g), divide(b)]
}
