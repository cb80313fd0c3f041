//! Tile slicing and content deduplication
//!
//! Slices an index plane into fixed-size square tiles and assigns each
//! distinct tile content an ID in first-occurrence order. Two tiles are
//! the same only when their index bytes are identical; no rotation or
//! mirror normalization is applied, so the exported atlas stays a plain
//! crop of the source image.

use std::collections::{HashMap, HashSet};

use crate::extract::IndexPlane;

/// One square block of palette indices, row-major.
pub type Tile = Vec<u8>;

/// Tile IDs for every cell of the source image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileIdGrid {
    /// Cells per row
    pub cols: u32,
    /// Cell rows
    pub rows: u32,
    /// `ids[row * cols + col]` is the tile ID at that cell
    pub ids: Vec<u32>,
}

impl TileIdGrid {
    /// Tile ID at a cell position. Panics when out of bounds.
    pub fn id_at(&self, col: u32, row: u32) -> u32 {
        self.ids[(row * self.cols + col) as usize]
    }
}

/// Deduplicated tiles plus the grid that references them.
#[derive(Debug, Clone)]
pub struct TileTable {
    /// Unique tile contents, indexed by tile ID
    pub tiles: Vec<Tile>,
    /// Per-cell tile IDs
    pub grid: TileIdGrid,
}

impl TileTable {
    /// Number of unique tiles.
    pub fn unique_count(&self) -> usize {
        self.tiles.len()
    }
}

/// Slice `plane` into `tile_size` x `tile_size` tiles and deduplicate
/// them by exact content.
///
/// Cells are scanned left to right, top to bottom, and IDs count up from
/// zero in first-occurrence order, so repeated runs over the same input
/// produce identical tables. The plane dimensions must be multiples of
/// `tile_size`; trailing pixels of a non-conforming plane are ignored.
/// Panics when `tile_size` is zero.
pub fn dedup_tiles(plane: &IndexPlane, tile_size: u32) -> TileTable {
    assert!(tile_size > 0, "tile_size must be positive");
    let cols = plane.width() / tile_size;
    let rows = plane.height() / tile_size;

    let mut seen: HashMap<Tile, u32> = HashMap::new();
    let mut tiles: Vec<Tile> = Vec::new();
    let mut ids: Vec<u32> = Vec::with_capacity((cols * rows) as usize);

    for ty in 0..rows {
        for tx in 0..cols {
            let tile = cut_tile(plane, tx, ty, tile_size);
            let id = match seen.get(&tile) {
                Some(&id) => id,
                None => {
                    let id = tiles.len() as u32;
                    seen.insert(tile.clone(), id);
                    tiles.push(tile);
                    id
                }
            };
            ids.push(id);
        }
    }

    TileTable {
        tiles,
        grid: TileIdGrid { cols, rows, ids },
    }
}

/// Unique-tile count with the four 90-degree rotations of a tile counted
/// as one. A display statistic only; the exporter's exact-content dedup
/// can report a higher count for the same image. Panics when `tile_size`
/// is zero.
pub fn rotation_unique_count(plane: &IndexPlane, tile_size: u32) -> usize {
    assert!(tile_size > 0, "tile_size must be positive");
    let cols = plane.width() / tile_size;
    let rows = plane.height() / tile_size;

    let mut seen: HashSet<Tile> = HashSet::new();
    for ty in 0..rows {
        for tx in 0..cols {
            let tile = cut_tile(plane, tx, ty, tile_size);
            seen.insert(canonical_rotation(tile, tile_size));
        }
    }
    seen.len()
}

/// Copy one tile out of the plane, one bounded row slice at a time.
fn cut_tile(plane: &IndexPlane, tx: u32, ty: u32, tile_size: u32) -> Tile {
    let stride = plane.width() as usize;
    let size = tile_size as usize;
    let x0 = (tx * tile_size) as usize;
    let y0 = (ty * tile_size) as usize;
    let data = plane.data();

    let mut tile = Vec::with_capacity(size * size);
    for row in 0..size {
        let start = (y0 + row) * stride + x0;
        tile.extend_from_slice(&data[start..start + size]);
    }
    tile
}

/// Lexicographically smallest of the four rotations.
fn canonical_rotation(tile: Tile, tile_size: u32) -> Tile {
    let mut best = tile.clone();
    let mut current = tile;
    for _ in 0..3 {
        current = rotate_cw(&current, tile_size);
        if current < best {
            best.clone_from(&current);
        }
    }
    best
}

/// Rotate a square tile 90 degrees clockwise.
fn rotate_cw(tile: &[u8], tile_size: u32) -> Tile {
    let n = tile_size as usize;
    let mut out = vec![0u8; n * n];
    for y in 0..n {
        for x in 0..n {
            out[x * n + (n - 1 - y)] = tile[y * n + x];
        }
    }
    out
}
