use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};

use playout::{
    Channel, ColorProducer, Consumer, GpuContext, ImageProducer, InMemoryConsumer, OutputFrame,
    PlayoutResult, Producer, Server, SoftwareDevice, SystemClockConsumer, TraceMetricSink,
    VideoFormat,
};

/// Counts frames without retaining them.
struct CountingConsumer {
    count: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl Consumer for CountingConsumer {
    fn consume(&mut self, _frame: &OutputFrame) -> PlayoutResult<()> {
        self.count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn print(&self) -> String {
        "counter".to_owned()
    }
}

#[derive(Parser, Debug)]
#[command(name = "playout", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the built-in broadcast video formats.
    Formats,
    /// Run a channel for a bounded number of frames.
    Run(RunArgs),
    /// Mix a single frame and save it as a PNG.
    Snapshot(SnapshotArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Output video format name (see `formats`).
    #[arg(long, default_value = "1080p25")]
    format: String,

    /// Layer index to load the source into.
    #[arg(long, default_value_t = 10)]
    layer: i32,

    /// Solid color source (`#AARRGGBB` or a named color).
    #[arg(long)]
    color: Option<String>,

    /// Still image source.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Media file source (requires `ffmpeg`/`ffprobe` on PATH).
    #[arg(long)]
    media: Option<PathBuf>,

    /// Loop the media source.
    #[arg(long, default_value_t = false)]
    r#loop: bool,

    /// Number of output frames to run.
    #[arg(long, default_value_t = 250)]
    frames: usize,

    /// Encode the output to this file (requires `ffmpeg` on PATH).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    /// Output video format name.
    #[arg(long, default_value = "1080p25")]
    format: String,

    /// Solid color source.
    #[arg(long)]
    color: Option<String>,

    /// Still image source.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Formats => cmd_formats(),
        Command::Run(args) => cmd_run(args),
        Command::Snapshot(args) => cmd_snapshot(args),
    }
}

fn cmd_formats() -> anyhow::Result<()> {
    for name in VideoFormat::names() {
        let f = VideoFormat::find(name).expect("listed format exists");
        println!(
            "{:<10} {}x{} {:?} {}/{}",
            name, f.width, f.height, f.field_mode, f.framerate.num, f.framerate.den
        );
    }
    Ok(())
}

fn build_producer(
    color: &Option<String>,
    image: &Option<PathBuf>,
    media: &Option<PathBuf>,
    looping: bool,
) -> anyhow::Result<Box<dyn Producer>> {
    match (color, image, media) {
        (Some(color), None, None) => Ok(Box::new(
            ColorProducer::new(color).context("invalid --color")?,
        )),
        (None, Some(path), None) => Ok(Box::new(ImageProducer::new(path))),
        (None, None, Some(path)) => {
            let mut opts = playout::MediaProducerOpts::new(path);
            opts.loop_playback = looping;
            Ok(Box::new(playout::MediaProducer::new(
                opts,
                std::sync::Arc::new(TraceMetricSink),
            )))
        }
        _ => bail!("choose exactly one of --color, --image, --media"),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let server = Server::new(
        GpuContext::new(Box::new(SoftwareDevice::new())),
        std::sync::Arc::new(TraceMetricSink),
    );
    let channel = server.add_channel(1, &args.format)?;

    channel.add_consumer(0, Box::new(SystemClockConsumer::new()))?;
    if let Some(out) = &args.out {
        channel.add_consumer(
            1,
            Box::new(playout::FfmpegConsumer::new(playout::FfmpegConsumerOpts::new(out))),
        )?;
    }
    let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    channel.add_consumer(2, Box::new(CountingConsumer { count: count.clone() }))?;

    let producer = build_producer(&args.color, &args.image, &args.media, args.r#loop)?;
    channel.load(args.layer, producer, true, None)?.wait()?;

    eprintln!(
        "running {} frames of {} on layer {}",
        args.frames,
        channel.format().name,
        args.layer
    );
    while count.load(std::sync::atomic::Ordering::SeqCst) < args.frames {
        std::thread::sleep(Duration::from_millis(20));
    }

    channel.remove_consumer(1);
    if let Some(out) = &args.out {
        eprintln!("wrote {}", out.display());
    }
    server.remove_channel(1);
    Ok(())
}

fn cmd_snapshot(args: SnapshotArgs) -> anyhow::Result<()> {
    let channel = Channel::new(
        VideoFormat::find(&args.format)
            .with_context(|| format!("unknown format '{}'", args.format))?,
        GpuContext::new(Box::new(SoftwareDevice::new())),
        std::sync::Arc::new(TraceMetricSink),
    );

    let (consumer, log) = InMemoryConsumer::new(None);
    channel.add_consumer(1, Box::new(consumer))?;
    let producer = build_producer(&args.color, &args.image, &None, false)?;
    channel.load(10, producer, true, None)?.wait()?;

    // Skip any frames mixed before the load landed.
    while log.len() < 3 {
        std::thread::sleep(Duration::from_millis(5));
    }
    let frames = log.frames();
    let frame = frames.last().expect("a frame was captured");

    // BGRA -> RGBA for the PNG encoder.
    let mut rgba = frame.data.as_ref().clone();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &rgba,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
