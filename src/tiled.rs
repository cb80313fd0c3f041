//! Tiled map (.tmx) and tileset (.tsx) document generation
//!
//! Emits the Tiled 1.x XML dialect: the map references its tileset by
//! relative filename with `firstgid="1"`, and the single tile layer
//! carries its GIDs base64-encoded as little-endian u32 values in
//! row-major order. GID 0 is reserved for "no tile", so every cell GID
//! is the tile ID plus one.

use base64::Engine;

use crate::png_meta::Rgb;
use crate::tiles::TileIdGrid;

/// Geometry of an emitted tileset, shared between the two documents.
#[derive(Debug, Clone, Copy)]
pub struct TilesetGeometry {
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Number of tiles in the set
    pub tile_count: u32,
    /// Tiles per atlas row
    pub columns: u32,
    /// Atlas image width in pixels
    pub image_width: u32,
    /// Atlas image height in pixels
    pub image_height: u32,
}

/// Format a palette color as the 6-digit uppercase hex used by the
/// tileset `trans` attribute.
pub fn hex_rgb(rgb: Rgb) -> String {
    format!("{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

/// Highest GID the grid will emit, or 0 for an empty grid.
pub fn max_gid(grid: &TileIdGrid) -> u32 {
    grid.ids.iter().map(|&id| id + 1).max().unwrap_or(0)
}

/// Base64 tile layer payload: one little-endian u32 GID per cell,
/// row-major.
pub fn encode_layer(grid: &TileIdGrid) -> String {
    let mut bytes = Vec::with_capacity(grid.ids.len() * 4);
    for &id in &grid.ids {
        bytes.extend_from_slice(&(id + 1).to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(&bytes)
}

/// Escape a value for use inside a double-quoted XML attribute.
fn xml_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Generate the tileset (.tsx) document.
///
/// `atlas_file` is the relative filename of the atlas image next to the
/// tileset; it and `name` are escaped for attribute use. The `trans`
/// color marks which palette color renders as transparent in editors
/// that honor it.
pub fn tsx_document(
    name: &str,
    atlas_file: &str,
    geometry: &TilesetGeometry,
    trans: Rgb,
) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<tileset version=\"1.10\" name=\"{name}\" tilewidth=\"{ts}\" ",
            "tileheight=\"{ts}\" tilecount=\"{count}\" columns=\"{columns}\">\n",
            " <image source=\"{image}\" trans=\"{trans}\" width=\"{w}\" height=\"{h}\"/>\n",
            "</tileset>\n"
        ),
        name = xml_attr(name),
        ts = geometry.tile_size,
        count = geometry.tile_count,
        columns = geometry.columns,
        image = xml_attr(atlas_file),
        trans = hex_rgb(trans),
        w = geometry.image_width,
        h = geometry.image_height,
    )
}

/// Generate the map (.tmx) document with a single base64 tile layer.
///
/// `tileset_file` is the relative filename of the tileset document next
/// to the map.
pub fn tmx_document(tileset_file: &str, grid: &TileIdGrid, tile_size: u32) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<map version=\"1.10\" orientation=\"orthogonal\" renderorder=\"right-down\" ",
            "width=\"{cols}\" height=\"{rows}\" tilewidth=\"{ts}\" tileheight=\"{ts}\" ",
            "infinite=\"0\" nextlayerid=\"2\" nextobjectid=\"1\">\n",
            " <tileset firstgid=\"1\" source=\"{tileset}\"/>\n",
            " <layer id=\"1\" name=\"Tiles\" width=\"{cols}\" height=\"{rows}\">\n",
            "  <data encoding=\"base64\">\n",
            "   {payload}\n",
            "  </data>\n",
            " </layer>\n",
            "</map>\n"
        ),
        cols = grid.cols,
        rows = grid.rows,
        ts = tile_size,
        tileset = xml_attr(tileset_file),
        payload = encode_layer(grid),
    )
}
