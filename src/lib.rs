//! tiletag - palette-preserving tile map exporter for indexed PNGs
//!
//! This library provides functionality to:
//! - Parse indexed PNG metadata (header, palette, transparency) without decoding pixels
//! - Recover exact per-pixel palette indices, directly or by reverse color mapping
//! - Deduplicate fixed-size tiles and pack the unique ones into an indexed atlas
//! - Emit a Tiled (.tmx/.tsx) map and tileset referencing the atlas

pub mod atlas;
pub mod cli;
pub mod config;
pub mod export;
pub mod extract;
pub mod png_meta;
pub mod tiled;
pub mod tiles;
