//! Atlas building - packs unique tiles into an indexed raster
//!
//! The atlas is a fixed-size grid: tile with ID `i` lands in cell
//! `(i % columns, i / columns)`, left to right, top to bottom. Cells past
//! the last tile stay filled with palette index 0. The raster is encoded
//! as an 8-bit paletted PNG that carries the source image's palette and
//! transparency table byte for byte.

use crate::png_meta::PngMetadata;
use crate::tiles::Tile;

/// An indexed atlas raster of packed unique tiles.
#[derive(Debug, Clone)]
pub struct AtlasImage {
    /// Raster width in pixels
    pub width: u32,
    /// Raster height in pixels
    pub height: u32,
    /// Tile cells per row
    pub columns: u32,
    /// Tile cell rows
    pub rows: u32,
    /// Palette indices, row-major
    pub data: Vec<u8>,
}

/// Column count for an atlas of `unique` tiles.
///
/// A positive `override_columns` wins; otherwise the smallest square-ish
/// grid is chosen (ceiling of the square root), never below one column.
pub fn atlas_columns(unique: usize, override_columns: u32) -> u32 {
    if override_columns > 0 {
        return override_columns;
    }
    ((unique as f64).sqrt().ceil() as u32).max(1)
}

/// Grid shape (columns, rows) for an atlas of `unique` tiles.
pub fn atlas_grid(unique: usize, override_columns: u32) -> (u32, u32) {
    let columns = atlas_columns(unique, override_columns);
    let rows = (unique as u32).div_ceil(columns).max(1);
    (columns, rows)
}

/// Pack `tiles` into a grid atlas in tile-ID order. Panics when the
/// atlas pixel dimensions would overflow `u32`; `export_tilemap` rejects
/// such layouts up front.
pub fn build_atlas(tiles: &[Tile], tile_size: u32, override_columns: u32) -> AtlasImage {
    let (columns, rows) = atlas_grid(tiles.len(), override_columns);
    assert!(
        columns.checked_mul(tile_size).is_some() && rows.checked_mul(tile_size).is_some(),
        "atlas of {columns}x{rows} tiles at {tile_size}px per side overflows the pixel grid"
    );
    let width = columns * tile_size;
    let height = rows * tile_size;

    let size = tile_size as usize;
    let stride = width as usize;
    let mut data = vec![0u8; stride * height as usize];

    for (i, tile) in tiles.iter().enumerate() {
        let cell_x = (i as u32 % columns * tile_size) as usize;
        let cell_y = (i as u32 / columns * tile_size) as usize;
        for row in 0..size {
            let dst = (cell_y + row) * stride + cell_x;
            data[dst..dst + size].copy_from_slice(&tile[row * size..(row + 1) * size]);
        }
    }

    AtlasImage {
        width,
        height,
        columns,
        rows,
        data,
    }
}

/// Encode the atlas as an 8-bit indexed PNG reusing the source palette.
///
/// The PLTE chunk is written from `meta.palette` unchanged, and the tRNS
/// chunk from `meta.trns` when present, so atlas pixels keep the exact
/// colors and transparency of the source image.
pub fn encode_indexed_png(
    atlas: &AtlasImage,
    meta: &PngMetadata,
) -> Result<Vec<u8>, png::EncodingError> {
    let mut out = Vec::new();

    let mut encoder = png::Encoder::new(&mut out, atlas.width, atlas.height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);

    let mut palette = Vec::with_capacity(meta.palette.len() * 3);
    for rgb in &meta.palette {
        palette.extend_from_slice(rgb);
    }
    encoder.set_palette(palette);
    if !meta.trns.is_empty() {
        encoder.set_trns(meta.trns.clone());
    }

    let mut writer = encoder.write_header()?;
    writer.write_image_data(&atlas.data)?;
    writer.finish()?;

    Ok(out)
}
