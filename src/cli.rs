//! Command-line interface implementation

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::{self, CliOverrides};
use crate::export::{export_tilemap, DecodePath, ExportError, ExportOptions, PngSource};
use crate::extract;
use crate::png_meta::PngMetadata;
use crate::tiles;

const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_INVALID_ARGS: u8 = 2;

/// tiletag - export indexed PNG images as Tiled tile maps
#[derive(Parser)]
#[command(name = "ttg")]
#[command(about = "tiletag - export indexed PNG images as Tiled tile maps (TMX/TSX + atlas)")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export a map, tileset, and tile atlas from an indexed PNG
    Export {
        /// Source indexed PNG
        input: PathBuf,

        /// Output directory (default: the input file's directory)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Base name for the emitted files (default: the input file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Tile edge length in pixels
        #[arg(long)]
        tile_size: Option<u32>,

        /// Atlas column count (0 = square-ish auto layout)
        #[arg(long)]
        columns: Option<u32>,

        /// Palette index used as the transparent color
        #[arg(long)]
        transparent_index: Option<u8>,

        /// Force the RGBA reverse-mapping decode path
        #[arg(long)]
        via_rgba: bool,
    },
    /// Print metadata and tile statistics for an indexed PNG
    Info {
        /// Source indexed PNG
        input: PathBuf,

        /// Tile edge length in pixels
        #[arg(long)]
        tile_size: Option<u32>,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Export {
            input,
            out,
            name,
            tile_size,
            columns,
            transparent_index,
            via_rgba,
        } => {
            let overrides = CliOverrides {
                tile_size,
                columns,
                transparent_index,
                out,
            };
            run_export(&input, name.as_deref(), &overrides, via_rgba)
        }
        Commands::Info {
            input,
            tile_size,
            json,
        } => run_info(&input, tile_size, json),
    };
    ExitCode::from(code)
}

/// Execute the export command
fn run_export(input: &Path, name: Option<&str>, overrides: &CliOverrides, via_rgba: bool) -> u8 {
    if !input.exists() {
        eprintln!("Error: Cannot open input file '{}'", input.display());
        return EXIT_INVALID_ARGS;
    }

    let config = match config::load_config(None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };

    let mut options = config::resolve_options(&config, overrides);
    if via_rgba {
        options.decode = DecodePath::Rgba;
    }

    let out_dir = config::resolve_out_dir(&config, overrides)
        .unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")).to_path_buf());
    let base_name = match name {
        Some(n) => n.to_string(),
        None => file_stem(input),
    };

    let source = PngSource::from(input);
    match export_tilemap(&source, &out_dir, &base_name, &options) {
        Ok(outcome) => {
            println!(
                "Exported {} unique tiles ({}x{} map)",
                outcome.unique_tiles, outcome.map_cols, outcome.map_rows
            );
            println!("Saved: {}", outcome.atlas_path.display());
            println!("Saved: {}", outcome.tileset_path.display());
            println!("Saved: {}", outcome.map_path.display());
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_ERROR
        }
    }
}

/// Tile statistics report for the info command
#[derive(Debug, Serialize)]
struct InfoReport {
    width: u32,
    height: u32,
    bit_depth: u32,
    palette_entries: usize,
    transparency_entries: usize,
    tile_size: u32,
    map_cols: u32,
    map_rows: u32,
    unique_tiles: usize,
    unique_tiles_rotation_aware: usize,
}

/// Execute the info command
fn run_info(input: &Path, tile_size: Option<u32>, json: bool) -> u8 {
    let bytes = match fs::read(input) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: Cannot open input file '{}': {}", input.display(), e);
            return EXIT_INVALID_ARGS;
        }
    };

    let config = match config::load_config(None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };
    let overrides = CliOverrides {
        tile_size,
        ..Default::default()
    };
    let options = config::resolve_options(&config, &overrides);

    let report = match build_info_report(&bytes, &options) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                return EXIT_ERROR;
            }
        }
    } else {
        println!(
            "{}: {}x{}, {}-bit indexed, {} palette entries ({} with transparency)",
            input.display(),
            report.width,
            report.height,
            report.bit_depth,
            report.palette_entries,
            report.transparency_entries
        );
        println!(
            "Map: {}x{} tiles of {}px",
            report.map_cols, report.map_rows, report.tile_size
        );
        println!(
            "Unique tiles: {} of {} cells ({} rotation-aware)",
            report.unique_tiles,
            report.map_cols as usize * report.map_rows as usize,
            report.unique_tiles_rotation_aware
        );
    }

    EXIT_SUCCESS
}

/// Collect the statistics the info command prints.
fn build_info_report(bytes: &[u8], options: &ExportOptions) -> Result<InfoReport, ExportError> {
    if options.tile_size == 0 {
        return Err(ExportError::ZeroTileSize);
    }
    let meta = PngMetadata::parse(bytes)?;
    if !meta.is_multiple_of(options.tile_size) {
        return Err(ExportError::TileSizeMismatch {
            width: meta.width,
            height: meta.height,
            tile_size: options.tile_size,
        });
    }
    let plane = extract::index_plane(bytes, &meta, options.transparent_index)?;
    let table = tiles::dedup_tiles(&plane, options.tile_size);

    Ok(InfoReport {
        width: meta.width,
        height: meta.height,
        bit_depth: meta.bit_depth.bits(),
        palette_entries: meta.palette_len(),
        transparency_entries: meta.trns.len(),
        tile_size: options.tile_size,
        map_cols: table.grid.cols,
        map_rows: table.grid.rows,
        unique_tiles: table.unique_count(),
        unique_tiles_rotation_aware: tiles::rotation_unique_count(&plane, options.tile_size),
    })
}

/// Output base name from the input file stem.
fn file_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tiles".to_string())
}
