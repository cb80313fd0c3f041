//! Export pipeline integration tests
//!
//! End-to-end coverage of the map/tileset/atlas export against synthetic
//! indexed PNGs:
//!
//! - File trio layout and relative cross-references
//! - GID assignment and the base64 layer payload
//! - Byte-exact palette and transparency preservation in the atlas
//! - Sub-byte bit depth unpacking
//! - Reverse-mapping (RGBA) decode parity
//! - Rejection of non-exportable sources without partial output

use std::fs;
use std::path::Path;

use base64::Engine;
use tempfile::TempDir;

use tiletag::export::{export_tilemap, DecodePath, ExportError, ExportOptions, PngSource};
use tiletag::extract;
use tiletag::png_meta::{MetaError, PngMetadata};

// ============================================================================
// Test Utilities
// ============================================================================

/// Four-entry palette; entry 0 is fully transparent via tRNS.
const PALETTE: [u8; 12] = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120];
const TRNS: [u8; 1] = [0];

/// Encode an indexed PNG with the platform codec (valid CRCs throughout).
/// `data` must already be packed for the given bit depth.
fn encode_indexed_png(
    width: u32,
    height: u32,
    depth: png::BitDepth,
    palette: &[u8],
    trns: Option<&[u8]>,
    data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(depth);
    encoder.set_palette(palette.to_vec());
    if let Some(t) = trns {
        encoder.set_trns(t.to_vec());
    }
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(data).unwrap();
    writer.finish().unwrap();
    out
}

/// 8-bit indexed image of 2x2 tiles, each quadrant filled with one
/// palette index.
fn quadrant_image(tile_size: u32, values: [u8; 4]) -> Vec<u8> {
    let side = tile_size * 2;
    let mut data = vec![0u8; (side * side) as usize];
    for y in 0..side {
        for x in 0..side {
            let quadrant = (y / tile_size) * 2 + x / tile_size;
            data[(y * side + x) as usize] = values[quadrant as usize];
        }
    }
    encode_indexed_png(
        side,
        side,
        png::BitDepth::Eight,
        &PALETTE,
        Some(&TRNS),
        &data,
    )
}

/// Raw chunk stream for rejection cases that fail before any decode.
fn raw_chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0u8; 4]);
    out
}

fn raw_png(width: u32, height: u32, bit_depth: u8, color_type: u8, interlace: u8) -> Vec<u8> {
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[bit_depth, color_type, 0, 0, interlace]);

    let mut out = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    out.extend(raw_chunk(b"IHDR", &ihdr));
    if color_type == 3 {
        out.extend(raw_chunk(b"PLTE", &PALETTE));
    }
    out.extend(raw_chunk(b"IEND", &[]));
    out
}

/// Decode the base64 layer payload of a TMX document into GIDs.
fn layer_gids(tmx: &str) -> Vec<u32> {
    let payload = tmx
        .split("<data encoding=\"base64\">")
        .nth(1)
        .expect("tmx has a base64 data element")
        .split("</data>")
        .next()
        .unwrap()
        .trim();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .expect("payload decodes");
    assert_eq!(bytes.len() % 4, 0);
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Decode an indexed PNG file into (palette, trns, index bytes, width).
fn decode_atlas(path: &Path) -> (Vec<u8>, Vec<u8>, Vec<u8>, u32) {
    let file = fs::File::open(path).unwrap();
    let decoder = png::Decoder::new(file);
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).unwrap();
    assert_eq!(info.color_type, png::ColorType::Indexed);
    assert_eq!(info.bit_depth, png::BitDepth::Eight);
    buf.truncate(info.buffer_size());

    let png_info = reader.info();
    let palette = png_info.palette.as_deref().unwrap_or_default().to_vec();
    let trns = png_info.trns.as_deref().unwrap_or_default().to_vec();
    (palette, trns, buf, info.width)
}

fn export_to(
    bytes: Vec<u8>,
    out_dir: &Path,
    base: &str,
    options: &ExportOptions,
) -> Result<tiletag::export::ExportOutcome, ExportError> {
    export_tilemap(&PngSource::Bytes(bytes), out_dir, base, options)
}

// ============================================================================
// File Trio Layout
// ============================================================================

#[test]
fn test_export_writes_three_sibling_files() {
    let temp = TempDir::new().unwrap();
    let outcome = export_to(
        quadrant_image(8, [0, 1, 2, 3]),
        temp.path(),
        "level",
        &ExportOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.map_path, temp.path().join("level.tmx"));
    assert_eq!(outcome.tileset_path, temp.path().join("level_tileset.tsx"));
    assert_eq!(outcome.atlas_path, temp.path().join("level_tiles.png"));
    assert!(outcome.map_path.is_file());
    assert!(outcome.tileset_path.is_file());
    assert!(outcome.atlas_path.is_file());
    assert_eq!(outcome.unique_tiles, 4);
    assert_eq!((outcome.map_cols, outcome.map_rows), (2, 2));
}

#[test]
fn test_export_creates_output_directory() {
    let temp = TempDir::new().unwrap();
    let out_dir = temp.path().join("nested").join("maps");
    let outcome = export_to(
        quadrant_image(8, [0, 1, 2, 3]),
        &out_dir,
        "level",
        &ExportOptions::default(),
    )
    .unwrap();
    assert!(outcome.map_path.is_file());
}

#[test]
fn test_documents_reference_siblings_by_relative_name() {
    let temp = TempDir::new().unwrap();
    export_to(
        quadrant_image(8, [0, 1, 2, 3]),
        temp.path(),
        "overworld",
        &ExportOptions::default(),
    )
    .unwrap();

    let tmx = fs::read_to_string(temp.path().join("overworld.tmx")).unwrap();
    assert!(tmx.contains("<tileset firstgid=\"1\" source=\"overworld_tileset.tsx\"/>"));

    let tsx = fs::read_to_string(temp.path().join("overworld_tileset.tsx")).unwrap();
    assert!(tsx.contains("source=\"overworld_tiles.png\""));
    assert!(tsx.contains("name=\"overworld\""));
    // Relative references only: no directory separators.
    assert!(!tmx.contains(&temp.path().display().to_string()));
    assert!(!tsx.contains(&temp.path().display().to_string()));
}

#[test]
fn test_export_from_file_path() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("level.png");
    fs::write(&input, quadrant_image(8, [0, 1, 2, 3])).unwrap();

    let outcome = export_tilemap(
        &PngSource::from(input.as_path()),
        temp.path(),
        "level",
        &ExportOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.unique_tiles, 4);
}

// ============================================================================
// GID Assignment
// ============================================================================

#[test]
fn test_distinct_quadrants_get_sequential_gids() {
    let temp = TempDir::new().unwrap();
    export_to(
        quadrant_image(8, [0, 1, 2, 3]),
        temp.path(),
        "level",
        &ExportOptions::default(),
    )
    .unwrap();

    let tmx = fs::read_to_string(temp.path().join("level.tmx")).unwrap();
    assert_eq!(layer_gids(&tmx), vec![1, 2, 3, 4]);
}

#[test]
fn test_duplicate_quadrant_reuses_gid() {
    let temp = TempDir::new().unwrap();
    let outcome = export_to(
        quadrant_image(8, [0, 1, 2, 0]),
        temp.path(),
        "level",
        &ExportOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.unique_tiles, 3);
    let tmx = fs::read_to_string(temp.path().join("level.tmx")).unwrap();
    assert_eq!(layer_gids(&tmx), vec![1, 2, 3, 1]);

    let tsx = fs::read_to_string(temp.path().join("level_tileset.tsx")).unwrap();
    assert!(tsx.contains("tilecount=\"3\""));
}

#[test]
fn test_uniform_image_single_gid() {
    let temp = TempDir::new().unwrap();
    let outcome = export_to(
        quadrant_image(8, [1, 1, 1, 1]),
        temp.path(),
        "flat",
        &ExportOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.unique_tiles, 1);
    let tmx = fs::read_to_string(temp.path().join("flat.tmx")).unwrap();
    assert_eq!(layer_gids(&tmx), vec![1, 1, 1, 1]);
}

// ============================================================================
// Atlas Content
// ============================================================================

#[test]
fn test_palette_and_trns_preserved_byte_for_byte() {
    let temp = TempDir::new().unwrap();
    export_to(
        quadrant_image(8, [0, 1, 2, 3]),
        temp.path(),
        "level",
        &ExportOptions::default(),
    )
    .unwrap();

    let (palette, trns, _, _) = decode_atlas(&temp.path().join("level_tiles.png"));
    assert_eq!(palette, PALETTE.to_vec());
    assert_eq!(trns, TRNS.to_vec());
}

#[test]
fn test_atlas_cells_hold_source_tiles() {
    let temp = TempDir::new().unwrap();
    export_to(
        quadrant_image(8, [0, 1, 2, 3]),
        temp.path(),
        "level",
        &ExportOptions::default(),
    )
    .unwrap();

    // 4 unique tiles pack into a 2x2 atlas of 8px cells.
    let (_, _, data, width) = decode_atlas(&temp.path().join("level_tiles.png"));
    assert_eq!(width, 16);
    assert_eq!(data.len(), 16 * 16);
    // Cell (0,0) holds tile 0, cell (1,0) tile 1, cell (0,1) tile 2.
    assert_eq!(data[0], 0);
    assert_eq!(data[8], 1);
    assert_eq!(data[8 * 16], 2);
    assert_eq!(data[8 * 16 + 8], 3);
}

#[test]
fn test_columns_override_shapes_atlas() {
    let temp = TempDir::new().unwrap();
    let options = ExportOptions {
        atlas_columns: 1,
        ..Default::default()
    };
    export_to(quadrant_image(8, [0, 1, 2, 3]), temp.path(), "tall", &options).unwrap();

    let (_, _, data, width) = decode_atlas(&temp.path().join("tall_tiles.png"));
    assert_eq!(width, 8);
    assert_eq!(data.len(), 8 * 32);

    let tsx = fs::read_to_string(temp.path().join("tall_tileset.tsx")).unwrap();
    assert!(tsx.contains("columns=\"1\""));
    assert!(tsx.contains("width=\"8\""));
    assert!(tsx.contains("height=\"32\""));
}

#[test]
fn test_trans_attribute_from_transparent_index() {
    let temp = TempDir::new().unwrap();
    // Four entries with entry 2 = (10, 20, 30); its alpha does not matter
    // for `trans`, only the RGB hex.
    let palette = [90, 90, 90, 80, 80, 80, 10, 20, 30, 70, 70, 70];
    let data = vec![0u8; 16 * 16];
    let bytes = encode_indexed_png(16, 16, png::BitDepth::Eight, &palette, None, &data);

    let options = ExportOptions {
        transparent_index: 2,
        ..Default::default()
    };
    export_to(bytes, temp.path(), "level", &options).unwrap();

    let tsx = fs::read_to_string(temp.path().join("level_tileset.tsx")).unwrap();
    assert!(tsx.contains("trans=\"0A141E\""));
}

// ============================================================================
// Bit Depth Unpacking
// ============================================================================

#[test]
fn test_one_bit_checkerboard() {
    // 16x16 1-bit checkerboard: rows alternate 0xAA and 0x55 byte pairs.
    let mut data = Vec::new();
    for y in 0..16 {
        let byte = if y % 2 == 0 { 0xAA } else { 0x55 };
        data.extend_from_slice(&[byte, byte]);
    }
    let bytes = encode_indexed_png(
        16,
        16,
        png::BitDepth::One,
        &[0, 0, 0, 255, 255, 255],
        None,
        &data,
    );

    let meta = PngMetadata::parse(&bytes).unwrap();
    let plane = extract::index_plane(&bytes, &meta, 0).unwrap();
    assert_eq!(plane.index_at(0, 0), 1);
    assert_eq!(plane.index_at(1, 0), 0);
    assert_eq!(plane.index_at(0, 1), 0);
    // Even side length: opposite corners share a color.
    assert_eq!(plane.index_at(15, 15), 1);

    // The checker period divides the tile size, so all four tiles match.
    let temp = TempDir::new().unwrap();
    let outcome = export_to(bytes, temp.path(), "checker", &ExportOptions::default()).unwrap();
    assert_eq!(outcome.unique_tiles, 1);
}

#[test]
fn test_four_bit_image_exports() {
    // 8x8 4-bit image: left half index 1, right half index 2.
    let mut data = Vec::new();
    for _ in 0..8 {
        data.extend_from_slice(&[0x11, 0x11, 0x22, 0x22]);
    }
    let bytes = encode_indexed_png(8, 8, png::BitDepth::Four, &PALETTE, None, &data);

    let meta = PngMetadata::parse(&bytes).unwrap();
    let plane = extract::index_plane(&bytes, &meta, 0).unwrap();
    assert_eq!(plane.index_at(0, 0), 1);
    assert_eq!(plane.index_at(3, 0), 1);
    assert_eq!(plane.index_at(4, 0), 2);
    assert_eq!(plane.index_at(7, 7), 2);

    let temp = TempDir::new().unwrap();
    let outcome = export_to(bytes, temp.path(), "half", &ExportOptions::default()).unwrap();
    assert_eq!(outcome.unique_tiles, 1);
    assert_eq!((outcome.map_cols, outcome.map_rows), (1, 1));
}

// ============================================================================
// Decode Path Parity
// ============================================================================

#[test]
fn test_rgba_fallback_matches_direct_path() {
    let temp = TempDir::new().unwrap();
    let bytes = quadrant_image(8, [0, 1, 2, 3]);

    let direct_dir = temp.path().join("direct");
    export_to(bytes.clone(), &direct_dir, "level", &ExportOptions::default()).unwrap();

    let rgba_dir = temp.path().join("rgba");
    let options = ExportOptions {
        decode: DecodePath::Rgba,
        ..Default::default()
    };
    export_to(bytes, &rgba_dir, "level", &options).unwrap();

    for file in ["level.tmx", "level_tileset.tsx", "level_tiles.png"] {
        let a = fs::read(direct_dir.join(file)).unwrap();
        let b = fs::read(rgba_dir.join(file)).unwrap();
        assert_eq!(a, b, "{file} differs between decode paths");
    }
}

#[test]
fn test_determinism_across_runs() {
    let temp = TempDir::new().unwrap();
    let bytes = quadrant_image(8, [3, 1, 1, 0]);

    let first = temp.path().join("a");
    let second = temp.path().join("b");
    export_to(bytes.clone(), &first, "level", &ExportOptions::default()).unwrap();
    export_to(bytes, &second, "level", &ExportOptions::default()).unwrap();

    for file in ["level.tmx", "level_tileset.tsx", "level_tiles.png"] {
        let a = fs::read(first.join(file)).unwrap();
        let b = fs::read(second.join(file)).unwrap();
        assert_eq!(a, b, "{file} differs between runs");
    }
}

// ============================================================================
// Rejection Without Partial Output
// ============================================================================

/// Run an export expected to fail and assert nothing was written.
fn assert_rejected(bytes: Vec<u8>, options: &ExportOptions) -> ExportError {
    let temp = TempDir::new().unwrap();
    let out_dir = temp.path().join("out");
    let err = export_to(bytes, &out_dir, "level", options).unwrap_err();
    assert!(!out_dir.exists(), "rejected export must not create output");
    err
}

#[test]
fn test_rejects_truecolor_png() {
    let err = assert_rejected(raw_png(16, 16, 8, 2, 0), &ExportOptions::default());
    assert!(matches!(err, ExportError::Meta(MetaError::NotIndexed(2))));
}

#[test]
fn test_rejects_interlaced_png() {
    let err = assert_rejected(raw_png(16, 16, 8, 3, 1), &ExportOptions::default());
    assert!(matches!(err, ExportError::Meta(MetaError::Interlaced)));
}

#[test]
fn test_rejects_non_png_bytes() {
    let err = assert_rejected(b"BM not a png".to_vec(), &ExportOptions::default());
    assert!(matches!(err, ExportError::Meta(MetaError::Signature)));
}

#[test]
fn test_rejects_non_multiple_dimensions() {
    let err = assert_rejected(raw_png(12, 16, 8, 3, 0), &ExportOptions::default());
    match err {
        ExportError::TileSizeMismatch {
            width,
            height,
            tile_size,
        } => {
            assert_eq!((width, height), (12, 16));
            assert_eq!(tile_size, 8);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_rejects_transparent_index_out_of_range() {
    let options = ExportOptions {
        transparent_index: 200,
        ..Default::default()
    };
    let err = assert_rejected(quadrant_image(8, [0, 1, 2, 3]), &options);
    assert!(matches!(
        err,
        ExportError::TransparentIndexOutOfRange {
            index: 200,
            palette: 4,
        }
    ));
}

#[test]
fn test_rejects_zero_tile_size() {
    let options = ExportOptions {
        tile_size: 0,
        ..Default::default()
    };
    let err = assert_rejected(quadrant_image(8, [0, 1, 2, 3]), &options);
    assert!(matches!(err, ExportError::ZeroTileSize));
}

#[test]
fn test_rejects_oversized_column_override() {
    // 1e9 columns of 8px tiles would need an 8-billion-pixel-wide atlas.
    let options = ExportOptions {
        atlas_columns: 1_000_000_000,
        ..Default::default()
    };
    let err = assert_rejected(quadrant_image(8, [0, 1, 2, 3]), &options);
    match err {
        ExportError::AtlasTooLarge {
            columns,
            rows,
            tile_size,
        } => {
            assert_eq!(columns, 1_000_000_000);
            assert_eq!(rows, 1);
            assert_eq!(tile_size, 8);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_custom_tile_size() {
    let temp = TempDir::new().unwrap();
    let options = ExportOptions {
        tile_size: 16,
        ..Default::default()
    };
    // 32x32 image of 16px quadrants.
    let outcome = export_to(quadrant_image(16, [0, 1, 2, 0]), temp.path(), "big", &options).unwrap();
    assert_eq!(outcome.unique_tiles, 3);
    assert_eq!((outcome.map_cols, outcome.map_rows), (2, 2));

    let tsx = fs::read_to_string(temp.path().join("big_tileset.tsx")).unwrap();
    assert!(tsx.contains("tilewidth=\"16\""));
}
