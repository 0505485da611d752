use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rand::SeedableRng as _;
use rand::rngs::StdRng;

use reelsmith::{
    Canvas, ComposeOpts, Compositor, Fps, NarrationAudio, ReelResult, sources, style,
};

#[derive(Parser, Debug)]
#[command(name = "reelsmith", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose a short video from narration audio, a script and a background
    /// clip (requires `ffmpeg`/`ffprobe` on PATH).
    Compose(ComposeArgs),
    /// Compose a single preview frame as a PNG.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Narration audio file.
    #[arg(long)]
    audio: PathBuf,

    /// Script text file (subtitle source).
    #[arg(long)]
    script: PathBuf,

    /// Background clip path, a clip name inside --input-folder, or "random".
    #[arg(long)]
    background: String,

    /// Folder scanned when --background is a name or "random".
    #[arg(long, default_value = "input_videos")]
    input_folder: PathBuf,

    /// Subtitle style preset.
    #[arg(long, default_value = "ultra_vibrant")]
    style: String,

    /// Output MP4 path. Defaults to output_videos/{script_stem}_{timestamp}.mp4.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Subtitle font file; defaults to a system font.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Output frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Seed for the random trim offset / background pick.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Narration duration in seconds (drives subtitle timing).
    #[arg(long)]
    duration: f64,

    /// Script text file (subtitle source).
    #[arg(long)]
    script: PathBuf,

    /// Background clip path.
    #[arg(long)]
    background: PathBuf,

    /// Timestamp of the frame to compose, in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Subtitle style preset.
    #[arg(long, default_value = "ultra_vibrant")]
    style: String,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Subtitle font file; defaults to a system font.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Seed for the random trim offset.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Compose(args) => cmd_compose(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn cmd_compose(args: ComposeArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        reelsmith::media::is_ffmpeg_on_path() && reelsmith::media::is_ffprobe_on_path(),
        "ffmpeg and ffprobe must be on PATH"
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let style = style::resolve(&args.style)?;
    let script_text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("read script '{}'", args.script.display()))?;

    let narration = NarrationAudio::probe(&args.audio)?;
    let background_path = resolve_background(&args.background, &args.input_folder, &mut rng)?;
    let background = reelsmith::probe_video(&background_path)?;
    let chunks = reelsmith::segment(&script_text, narration.duration_sec)?;

    let out_path = match args.out {
        Some(p) => p,
        None => {
            let stem = args
                .script
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("short");
            PathBuf::from("output_videos")
                .join(sources::output_file_name(stem, chrono::Local::now()))
        }
    };

    let mut compositor = Compositor::new(
        ComposeOpts {
            canvas: Canvas::SHORTS,
            fps: Fps::new(args.fps, 1)?,
            ..ComposeOpts::default()
        },
        load_font(args.font.as_deref())?,
    )?;
    compositor.compose(&narration, &background, chunks, &style, &out_path, &mut rng)?;

    eprintln!("wrote {}", out_path.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);

    let style = style::resolve(&args.style)?;
    let script_text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("read script '{}'", args.script.display()))?;

    let background = reelsmith::probe_video(&args.background)?;
    let chunks = reelsmith::segment(&script_text, args.duration)?;

    let mut compositor =
        Compositor::new(ComposeOpts::default(), load_font(args.font.as_deref())?)?;
    let frame = compositor.compose_frame(
        args.duration,
        &background,
        chunks,
        &style,
        args.time,
        &mut rng,
    )?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn resolve_background(
    background: &str,
    input_folder: &Path,
    rng: &mut StdRng,
) -> ReelResult<PathBuf> {
    let direct = Path::new(background);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }
    sources::BackgroundLibrary::scan(input_folder)?.select(background, rng)
}

fn load_font(font: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    let path = match font {
        Some(p) => p.to_path_buf(),
        None => reelsmith::subtitle::find_fallback_font()
            .context("no system font found; pass --font")?,
    };
    std::fs::read(&path).with_context(|| format!("read font '{}'", path.display()))
}
