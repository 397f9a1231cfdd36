//! grayscan CLI — command-line pipeline for Gray-code structured-light scans.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "grayscan")]
#[command(
    about = "Gray-code structured-light scanning: pattern generation, frame decoding, triangulation"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the projector pattern sequence to image files.
    Patterns(CliPatternsArgs),

    /// Decode captured frames into correspondence maps.
    Decode(CliDecodeArgs),

    /// Triangulate correspondence maps into a colored point cloud.
    Triangulate(CliTriangulateArgs),

    /// Print coverage statistics of a correspondence map file.
    MapInfo {
        /// Map file to inspect.
        #[arg(long)]
        map: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct CliPatternsArgs {
    /// Path to the scan configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Directory to write numbered pattern images and the manifest into.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct CliDecodeArgs {
    /// Path to the scan configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Directory of captured frames, sorted by file name into projection order.
    #[arg(long)]
    frames: PathBuf,

    /// Directory to write h.map, v.map, mask.png and reliable.png into.
    #[arg(long)]
    out_dir: PathBuf,

    /// Minimum per-bit contrast in gray levels; derived from the configured
    /// gray range when omitted.
    #[arg(long)]
    min_margin: Option<f32>,

    /// Path to write a decode summary (JSON).
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliTriangulateArgs {
    /// Path to the scan configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Path to the calibration record (JSON).
    #[arg(long)]
    calib: PathBuf,

    /// Projector column map file.
    #[arg(long)]
    horizontal: PathBuf,

    /// Projector row map file.
    #[arg(long)]
    vertical: PathBuf,

    /// Validity mask image.
    #[arg(long)]
    mask: PathBuf,

    /// Reference color image for vertex colors.
    #[arg(long)]
    color: PathBuf,

    /// Path to write the point cloud (ASCII PLY).
    #[arg(long)]
    out: PathBuf,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Patterns(args) => run_patterns(&args),
        Commands::Decode(args) => run_decode(&args),
        Commands::Triangulate(args) => run_triangulate(&args),
        Commands::MapInfo { map } => run_map_info(&map),
    }
}

// ── patterns ───────────────────────────────────────────────────────────

fn run_patterns(args: &CliPatternsArgs) -> CliResult<()> {
    let config = grayscan_core::options::ScanConfig::from_json_file(&args.config)?;
    let options = config.options()?;
    let mut encoder = grayscan_core::encode::PatternEncoder::with_levels(
        &options,
        config.gray_low,
        config.gray_high,
    )?;

    std::fs::create_dir_all(&args.out_dir).map_err(|e| -> CliError {
        format!(
            "Failed to create output directory {}: {}",
            args.out_dir.display(),
            e
        )
        .into()
    })?;
    tracing::info!(
        "Rendering {} patterns ({}x{}) to {}",
        encoder.pattern_count(),
        options.projector_width,
        options.projector_height,
        args.out_dir.display()
    );

    let mut manifest = Vec::with_capacity(encoder.pattern_count());
    let mut index = 0usize;
    while !encoder.is_finished() {
        let step = encoder.current_step()?;
        let image = encoder.current_image()?;
        let file = format!("pattern_{index:03}.png");
        let path = args.out_dir.join(&file);
        image.save(&path).map_err(|e| -> CliError {
            format!("Failed to write pattern {}: {}", path.display(), e).into()
        })?;
        manifest.push(grayscan_core::PatternRecord {
            index,
            file,
            axis: step.axis,
            bit: step.bit,
            inverted: step.inverted,
        });
        encoder.advance()?;
        index += 1;
    }

    let manifest_path = args.out_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(&manifest_path, &json)?;
    tracing::info!("Manifest written to {}", manifest_path.display());

    Ok(())
}

// ── decode ─────────────────────────────────────────────────────────────

fn run_decode(args: &CliDecodeArgs) -> CliResult<()> {
    let config = grayscan_core::options::ScanConfig::from_json_file(&args.config)?;
    let options = config.options()?;
    let params = match args.min_margin {
        Some(min_margin) => grayscan_core::decode::DecodeParams { min_margin },
        None => grayscan_core::decode::DecodeParams::from_levels(config.gray_low, config.gray_high),
    };
    let mut decoder = grayscan_core::decode::FrameDecoder::with_params(&options, params);

    let frame_paths = collect_frame_paths(&args.frames)?;
    if frame_paths.len() != decoder.expected_frames() {
        return Err(format!(
            "expected {} frames for this configuration, found {} in {}",
            decoder.expected_frames(),
            frame_paths.len(),
            args.frames.display()
        )
        .into());
    }
    tracing::info!(
        "Decoding {} frames from {}",
        frame_paths.len(),
        args.frames.display()
    );

    let expected_dims = config.camera_dimensions();
    for path in &frame_paths {
        let img = image::open(path).map_err(|e| -> CliError {
            format!("Failed to open frame {}: {}", path.display(), e).into()
        })?;
        let gray = img.to_luma8();
        if gray.dimensions() != expected_dims {
            return Err(format!(
                "frame {} is {}x{}, configuration expects {}x{}",
                path.display(),
                gray.width(),
                gray.height(),
                expected_dims.0,
                expected_dims.1
            )
            .into());
        }
        decoder.add_frame(&gray)?;
    }

    std::fs::create_dir_all(&args.out_dir).map_err(|e| -> CliError {
        format!(
            "Failed to create output directory {}: {}",
            args.out_dir.display(),
            e
        )
        .into()
    })?;

    let outputs = decoder.into_outputs()?;
    let (width, height) = outputs.horizontal.dimensions();
    let valid = outputs.horizontal.valid_count();
    let total = (width as usize) * (height as usize);
    tracing::info!(
        "Valid correspondences: {}/{} pixels ({:.1}%)",
        valid,
        total,
        100.0 * valid as f64 / total as f64
    );

    let h_path = args.out_dir.join("h.map");
    outputs.horizontal.write(&h_path)?;
    let v_path = args.out_dir.join("v.map");
    outputs.vertical.write(&v_path)?;
    let mask_path = args.out_dir.join("mask.png");
    outputs.mask.save(&mask_path).map_err(|e| -> CliError {
        format!("Failed to write mask {}: {}", mask_path.display(), e).into()
    })?;
    let reliable_path = args.out_dir.join("reliable.png");
    outputs
        .reliability
        .save(&reliable_path)
        .map_err(|e| -> CliError {
            format!(
                "Failed to write reliability image {}: {}",
                reliable_path.display(),
                e
            )
            .into()
        })?;
    tracing::info!("Maps written to {}", args.out_dir.display());

    if let Some(report_path) = &args.report {
        let report = grayscan_core::DecodeReport {
            image_size: [width, height],
            frames: frame_paths.len(),
            valid_pixels: valid,
            coverage: valid as f32 / total as f32,
        };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(report_path, &json)?;
        tracing::info!("Report written to {}", report_path.display());
    }

    Ok(())
}

/// Image files of a capture directory, sorted by name into sequence order.
fn collect_frame_paths(dir: &Path) -> CliResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| -> CliError {
        format!("Failed to read frame directory {}: {}", dir.display(), e).into()
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| -> CliError {
            format!("Failed to read frame directory {}: {}", dir.display(), e).into()
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff"
                )
            })
            .unwrap_or(false);
        if is_image {
            paths.push(path);
        }
    }
    paths.sort();
    if paths.is_empty() {
        return Err(format!("no frame images found in {}", dir.display()).into());
    }
    Ok(paths)
}

// ── triangulate ────────────────────────────────────────────────────────

fn run_triangulate(args: &CliTriangulateArgs) -> CliResult<()> {
    let config = grayscan_core::options::ScanConfig::from_json_file(&args.config)?;
    let options = config.options()?;
    let calibration = grayscan_core::calib::Calibration::from_json_file(&args.calib)?;

    let horizontal = grayscan_core::map::CorrespondenceMap::read(&args.horizontal)?;
    let vertical = grayscan_core::map::CorrespondenceMap::read(&args.vertical)?;
    let mask = image::open(&args.mask)
        .map_err(|e| -> CliError {
            format!("Failed to open mask {}: {}", args.mask.display(), e).into()
        })?
        .to_luma8();
    let color = image::open(&args.color)
        .map_err(|e| -> CliError {
            format!("Failed to open color image {}: {}", args.color.display(), e).into()
        })?
        .to_rgb8();

    let (width, height) = horizontal.dimensions();
    tracing::info!(
        "Triangulating {}x{} maps ({} valid pixels)",
        width,
        height,
        horizontal.valid_count()
    );

    let mesh = grayscan_core::triangulate::triangulate(
        &options,
        &horizontal,
        &vertical,
        &mask,
        &calibration,
        &color,
    )?;
    tracing::info!("Reconstructed {} vertices", mesh.len());

    mesh.save_ply(&args.out).map_err(|e| -> CliError {
        format!("Failed to write mesh {}: {}", args.out.display(), e).into()
    })?;
    tracing::info!("Mesh written to {}", args.out.display());

    Ok(())
}

// ── map-info ───────────────────────────────────────────────────────────

fn run_map_info(map_path: &Path) -> CliResult<()> {
    let map = grayscan_core::map::CorrespondenceMap::read(map_path)?;
    let stats = grayscan_core::MapStats::of(&map);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
