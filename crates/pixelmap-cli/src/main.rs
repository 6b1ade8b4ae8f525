//! Command-line front end: map flags onto the render configuration, set up
//! logging, run the renderer, exit 0 on success and 1 on any error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use pixelmap::{image_mode_from_name, BlendMode, ColorMode, PixelMap, RenderConfig};

#[derive(Parser, Debug)]
#[command(
    name = "pixelmapcli",
    version,
    about = "Top-down pixel-perfect Minecraft world mapper.",
    override_usage = "pixelmapcli [options] <input> <output>"
)]
struct Args {
    /// The world folder to render.
    input: PathBuf,

    /// Output image file, or directory for the chunk/region modes.
    output: PathBuf,

    /// The amount of threads to create. Default is the amount of cores.
    #[arg(short, long)]
    threads: Option<usize>,

    /// The dimension to render.
    #[arg(short, long, default_value_t = 0)]
    dimension: i32,

    /// The block color file.
    #[arg(short = 'p', long)]
    colors: Option<PathBuf>,

    /// The light source file for night rendering.
    #[arg(long)]
    lightsource: Option<PathBuf>,

    /// The mode to render in: default, gray, color.
    #[arg(short, long, default_value = "default")]
    mode: String,

    /// When not opaque, pick a blend mode.
    #[arg(long, default_value = "legacy")]
    blend: String,

    /// Slice from height.
    #[arg(long)]
    slice: Option<i32>,

    /// Put a height line on every n levels.
    #[arg(long)]
    heightline: Option<i32>,

    /// Render blocks as opaque.
    #[arg(long)]
    opaque: bool,

    /// Darken blocks with altitude.
    #[arg(short = 'g', long = "gradient")]
    heightgradient: bool,

    /// Render as if night.
    #[arg(short, long)]
    night: bool,

    /// Output granularity: chunk, region, image, image_direct, tiny_chunk,
    /// tiny_region.
    #[arg(short = 'r', long = "render", default_value = "image")]
    image_type: String,

    /// Render the next cave below the surface.
    #[arg(short, long)]
    cave: bool,

    /// Disable lonely-chunk filtering.
    #[arg(long = "no-lonely")]
    no_lonely: bool,

    /// Write the built-in block color file and exit.
    #[arg(long = "createcolor", value_name = "PATH")]
    create_color: Option<PathBuf>,

    /// Exact verbosity: trace, debug, info, warn, error, off.
    #[arg(long)]
    verbosity: Option<String>,

    /// Display more output.
    #[arg(long, conflicts_with = "quiet")]
    verbose: bool,

    /// Silence all output below errors.
    #[arg(short, long)]
    quiet: bool,

    /// Turn off console colors.
    #[arg(long = "no-color")]
    no_color: bool,
}

fn init_logging(args: &Args) {
    let level = args
        .verbosity
        .clone()
        .unwrap_or_else(|| {
            if args.quiet {
                "error".to_string()
            } else if args.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let ansi = !args.no_color && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt().with_env_filter(filter).with_ansi(ansi).init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    if let Some(path) = &args.create_color {
        return match std::fs::write(path, pixelmap_render::block_color::BUILTIN_CONF) {
            Ok(()) => {
                info!("wrote block colors to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!("unable to write {}: {err}", path.display());
                ExitCode::FAILURE
            }
        };
    }

    let Some(mode) = ColorMode::from_name(&args.mode) else {
        error!("invalid mode '{}'", args.mode);
        return ExitCode::FAILURE;
    };
    let Some(blend) = BlendMode::from_name(&args.blend) else {
        error!("invalid blend mode '{}'", args.blend);
        return ExitCode::FAILURE;
    };
    let Some(image) = image_mode_from_name(&args.image_type) else {
        error!("invalid render type '{}'", args.image_type);
        return ExitCode::FAILURE;
    };

    let config = RenderConfig {
        threads: args.threads,
        dimension: args.dimension,
        colors: args.colors,
        lightsource: args.lightsource,
        mode,
        blend,
        slice: args.slice,
        heightline: args.heightline,
        opaque: args.opaque,
        height_gradient: args.heightgradient,
        night: args.night,
        image,
        cave: args.cave,
        no_lonely: args.no_lonely,
        extras: Default::default(),
    };

    let map = PixelMap::new(config);
    let run = Arc::new(AtomicBool::new(false));
    match map.render(&args.input, &args.output, run) {
        Ok(summary) => {
            info!("rendered {} chunks", summary.chunks_rendered);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
