//! End-to-end tile map export
//!
//! Reads an indexed PNG, recovers per-pixel palette indices, deduplicates
//! fixed-size tiles, packs the unique tiles into a new indexed atlas that
//! reuses the source palette, and writes a Tiled map/tileset pair next to
//! it. One call produces three sibling files in the output directory:
//!
//! - `<base>.tmx` - the map
//! - `<base>_tileset.tsx` - the tileset
//! - `<base>_tiles.png` - the atlas image
//!
//! Failures are terminal: the first error aborts the export and is
//! returned as-is, and any files already written stay on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::atlas;
use crate::extract::{self, ExtractError};
use crate::png_meta::{MetaError, PngMetadata};
use crate::tiled::{self, TilesetGeometry};
use crate::tiles;

/// Error type for export failures
#[derive(Debug, Error)]
pub enum ExportError {
    /// Source file could not be read
    #[error("failed to read {}: {source}", .path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Source is not an exportable indexed PNG
    #[error(transparent)]
    Meta(#[from] MetaError),
    /// Configured tile size is zero
    #[error("tile size must be positive")]
    ZeroTileSize,
    /// Image dimensions do not divide into whole tiles
    #[error("image is {width}x{height}, not a multiple of the {tile_size}px tile size")]
    TileSizeMismatch {
        width: u32,
        height: u32,
        tile_size: u32,
    },
    /// Configured transparent index points past the palette
    #[error("transparent index {index} is outside the {palette}-entry palette")]
    TransparentIndexOutOfRange { index: u8, palette: usize },
    /// Pixel indices could not be recovered
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// Requested atlas layout is wider or taller than an image can be
    #[error("atlas of {columns}x{rows} tiles at {tile_size}px per side exceeds the maximum image dimensions")]
    AtlasTooLarge {
        columns: u32,
        rows: u32,
        tile_size: u32,
    },
    /// Tile table produced a GID past the tile count; indicates an
    /// internal inconsistency, not bad input
    #[error("layer GID {max_gid} exceeds the {tile_count}-tile tileset")]
    GidRange { max_gid: u32, tile_count: u32 },
    /// Atlas PNG encoding failed
    #[error("failed to encode atlas {}: {source}", .path.display())]
    EncodeAtlas {
        path: PathBuf,
        #[source]
        source: png::EncodingError,
    },
    /// An output file could not be written
    #[error("failed to write {}: {source}", .path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which decode strategy feeds the index extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePath {
    /// Indexed decode when the codec preserves palette indices, reverse
    /// mapping otherwise
    #[default]
    Auto,
    /// Always decode to RGBA and reverse-map; exists to exercise the
    /// fallback against known-good sources
    Rgba,
}

/// Export tuning knobs.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Atlas column count; 0 picks a square-ish layout
    pub atlas_columns: u32,
    /// Palette index treated as transparent, both for reverse-mapped
    /// transparent pixels and for the tileset's `trans` color
    pub transparent_index: u8,
    /// Decode strategy selection
    pub decode: DecodePath,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            tile_size: 8,
            atlas_columns: 0,
            transparent_index: 0,
            decode: DecodePath::Auto,
        }
    }
}

/// Where the source PNG bytes come from.
#[derive(Debug, Clone)]
pub enum PngSource {
    /// Read the file at this path
    Path(PathBuf),
    /// Use bytes already in memory
    Bytes(Vec<u8>),
}

impl From<PathBuf> for PngSource {
    fn from(path: PathBuf) -> Self {
        PngSource::Path(path)
    }
}

impl From<&Path> for PngSource {
    fn from(path: &Path) -> Self {
        PngSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for PngSource {
    fn from(bytes: Vec<u8>) -> Self {
        PngSource::Bytes(bytes)
    }
}

/// Paths written by a successful export, plus summary numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    /// The .tmx map file
    pub map_path: PathBuf,
    /// The .tsx tileset file
    pub tileset_path: PathBuf,
    /// The atlas image file
    pub atlas_path: PathBuf,
    /// Number of unique tiles in the atlas
    pub unique_tiles: usize,
    /// Map dimensions in tiles
    pub map_cols: u32,
    /// Map dimensions in tiles
    pub map_rows: u32,
}

/// Export an indexed PNG as a Tiled map, tileset, and atlas image.
///
/// Writes `<base_name>.tmx`, `<base_name>_tileset.tsx`, and
/// `<base_name>_tiles.png` into `out_dir`, creating the directory if
/// needed. The files are written atlas first, then tileset, then map, so
/// an aborted run never leaves a map referencing files that were not
/// written.
pub fn export_tilemap(
    source: &PngSource,
    out_dir: &Path,
    base_name: &str,
    options: &ExportOptions,
) -> Result<ExportOutcome, ExportError> {
    if options.tile_size == 0 {
        return Err(ExportError::ZeroTileSize);
    }

    let bytes = read_source(source)?;
    let meta = PngMetadata::parse(&bytes)?;
    if !meta.is_multiple_of(options.tile_size) {
        return Err(ExportError::TileSizeMismatch {
            width: meta.width,
            height: meta.height,
            tile_size: options.tile_size,
        });
    }
    if options.transparent_index as usize >= meta.palette_len() {
        return Err(ExportError::TransparentIndexOutOfRange {
            index: options.transparent_index,
            palette: meta.palette_len(),
        });
    }

    let plane = match options.decode {
        DecodePath::Auto => extract::index_plane(&bytes, &meta, options.transparent_index)?,
        DecodePath::Rgba => extract::index_plane_rgba(&bytes, &meta, options.transparent_index)?,
    };

    let table = tiles::dedup_tiles(&plane, options.tile_size);

    let (atlas_cols, atlas_rows) = atlas::atlas_grid(table.unique_count(), options.atlas_columns);
    if atlas_cols.checked_mul(options.tile_size).is_none()
        || atlas_rows.checked_mul(options.tile_size).is_none()
    {
        return Err(ExportError::AtlasTooLarge {
            columns: atlas_cols,
            rows: atlas_rows,
            tile_size: options.tile_size,
        });
    }
    let atlas_image = atlas::build_atlas(&table.tiles, options.tile_size, options.atlas_columns);

    let tile_count = table.unique_count() as u32;
    let max_gid = tiled::max_gid(&table.grid);
    if max_gid > tile_count {
        return Err(ExportError::GidRange { max_gid, tile_count });
    }

    let atlas_file = format!("{base_name}_tiles.png");
    let tileset_file = format!("{base_name}_tileset.tsx");
    let map_file = format!("{base_name}.tmx");
    let atlas_path = out_dir.join(&atlas_file);
    let tileset_path = out_dir.join(&tileset_file);
    let map_path = out_dir.join(&map_file);

    fs::create_dir_all(out_dir).map_err(|e| ExportError::WriteFile {
        path: out_dir.to_path_buf(),
        source: e,
    })?;

    let atlas_bytes = atlas::encode_indexed_png(&atlas_image, &meta).map_err(|e| {
        ExportError::EncodeAtlas {
            path: atlas_path.clone(),
            source: e,
        }
    })?;
    write_file(&atlas_path, &atlas_bytes)?;

    let geometry = TilesetGeometry {
        tile_size: options.tile_size,
        tile_count,
        columns: atlas_image.columns,
        image_width: atlas_image.width,
        image_height: atlas_image.height,
    };
    let trans = meta.palette[options.transparent_index as usize];
    let tsx = tiled::tsx_document(base_name, &atlas_file, &geometry, trans);
    write_file(&tileset_path, tsx.as_bytes())?;

    let tmx = tiled::tmx_document(&tileset_file, &table.grid, options.tile_size);
    write_file(&map_path, tmx.as_bytes())?;

    Ok(ExportOutcome {
        map_path,
        tileset_path,
        atlas_path,
        unique_tiles: table.unique_count(),
        map_cols: table.grid.cols,
        map_rows: table.grid.rows,
    })
}

fn read_source(source: &PngSource) -> Result<Vec<u8>, ExportError> {
    match source {
        PngSource::Path(path) => fs::read(path).map_err(|e| ExportError::ReadSource {
            path: path.clone(),
            source: e,
        }),
        PngSource::Bytes(bytes) => Ok(bytes.clone()),
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ExportError> {
    fs::write(path, contents).map_err(|e| ExportError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}
