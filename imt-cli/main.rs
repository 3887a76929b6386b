use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{ArgAction, Parser};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_circle_mut;
use imt_cli::config::ConfigFile;
use imt_cli::input;
use imt_cli::{CompiledBundle, Compiler, CompilerConfig, GrayImage, ProgressResult, RasterImage};
use log::info;

/// Compile reference images into an image-target bundle
#[derive(Parser, Debug)]
#[command(name = "imt", version, about, long_about = None)]
struct Args {
    /// Reference images, compiled in the order given
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Output bundle path
    #[arg(short, long)]
    output: PathBuf,

    /// Compiler configuration (.json or .toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads (defaults to the configuration's value)
    #[arg(long)]
    threads: Option<usize>,

    /// Draw the first target's keypoints onto its image and save as PNG
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ConfigFile::load(path)?.compiler,
        None => CompilerConfig::default(),
    };
    if let Some(threads) = args.threads {
        config.n_threads = threads;
    }
    let compiler = Compiler::new(config)?;
    info!("{}", imt_cli::config::summary(compiler.config()));

    let decoded = args
        .images
        .iter()
        .map(|path| input::load_rgba(path))
        .collect::<Result<Vec<_>, _>>()?;
    let images: Vec<GrayImage> = decoded.iter().map(input::grayscale).collect();
    let views: Vec<RasterImage<'_>> = images.iter().map(GrayImage::view).collect();

    let t0 = Instant::now();
    let mut report = |percent: f64| -> ProgressResult {
        print!("Compiling image targets... {percent:.1}%\r");
        let _ = std::io::stdout().flush();
        Ok(())
    };
    let bundle = compiler.compile(&views, Some(&mut report))?;
    println!();

    let bytes = bundle.to_bytes();
    std::fs::write(&args.output, &bytes)?;
    println!(
        "Compiled {} targets ({} keypoints, {} bytes) in {:.2?} -> {}",
        bundle.len(),
        bundle.targets.iter().map(|t| t.keypoint_count()).sum::<usize>(),
        bytes.len(),
        t0.elapsed(),
        args.output.display()
    );

    if let (Some(path), Some(first)) = (&args.overlay, decoded.first()) {
        draw_overlay(first, &bundle, path)?;
        println!("Saved keypoint overlay as {}", path.display());
    }
    Ok(())
}

/// Keypoints of every level of the first target, mapped back to input pixels
fn draw_overlay(img: &RgbaImage, bundle: &CompiledBundle, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut output = img.clone();
    let Some(target) = bundle.targets.first() else {
        return Ok(());
    };

    for level in &target.levels {
        let radius = (3.0 * level.scale).round() as i32;
        for kp in &level.keypoints {
            let color = match kp.polarity {
                imt_cli::Polarity::Bright => Rgba([255, 0, 0, 255]),
                imt_cli::Polarity::Dark => Rgba([0, 128, 255, 255]),
            };
            let centre = ((kp.x * level.scale) as i32, (kp.y * level.scale) as i32);
            draw_hollow_circle_mut(&mut output, centre, radius, color);
        }
    }

    output.save(path)?;
    Ok(())
}
