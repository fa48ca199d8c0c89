use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{LevelFilter, error, info};
use simplelog::{Config, WriteLogger};

use stampdesk::capture::load_stamp;
use stampdesk::engine::DocPoint;
use stampdesk::export::ExportReport;
use stampdesk::panic_handler;
use stampdesk::session::{Session, parse_script};
use stampdesk::settings;

#[derive(Parser, Debug)]
#[command(name = "stampdesk", version, about = "Place image stamps on PDF pages")]
struct Cli {
    /// Log verbosity written to the log file
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[arg(long, global = true, default_value = "stampdesk.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print page count and page geometry
    Info { pdf: PathBuf },

    /// Place stamps at given positions and write the stamped PDF
    Stamp {
        pdf: PathBuf,

        /// PNG, JPEG or SVG image to stamp
        #[arg(long)]
        stamp: PathBuf,

        /// PAGE:X,Y[:SCALE], page numbers start at 1, repeatable
        #[arg(long = "place", required = true, value_parser = parse_placement)]
        placements: Vec<Placement>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replay a JSON event script through the viewport engine.
    /// Scripts may draw stamps with `stroke` steps as well as use `--stamp` images.
    Replay {
        pdf: PathBuf,

        #[arg(long)]
        script: PathBuf,

        /// Stamp images, referenced by index in the script
        #[arg(long = "stamp")]
        stamps: Vec<PathBuf>,

        /// Write the rendered pages of the final window as PNGs here
        #[arg(long)]
        snapshot: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Placement {
    /// Zero-based page index
    page: usize,
    position: DocPoint,
    scale: f32,
}

fn parse_placement(text: &str) -> Result<Placement, String> {
    let mut parts = text.split(':');
    let (Some(page), Some(point)) = (parts.next(), parts.next()) else {
        return Err(format!("expected PAGE:X,Y[:SCALE], got {text:?}"));
    };
    let scale = match parts.next() {
        Some(scale) => scale
            .trim()
            .parse::<f32>()
            .map_err(|e| format!("bad scale {scale:?}: {e}"))?,
        None => 1.0,
    };
    if parts.next().is_some() {
        return Err(format!("too many fields in {text:?}"));
    }

    let page: usize = page
        .trim()
        .parse()
        .map_err(|e| format!("bad page {page:?}: {e}"))?;
    if page == 0 {
        return Err("page numbers start at 1".to_string());
    }
    let Some((x, y)) = point.split_once(',') else {
        return Err(format!("expected X,Y, got {point:?}"));
    };
    let x: f32 = x.trim().parse().map_err(|e| format!("bad x {x:?}: {e}"))?;
    let y: f32 = y.trim().parse().map_err(|e| format!("bad y {y:?}: {e}"))?;

    Ok(Placement {
        page: page - 1,
        position: DocPoint::new(x, y),
        scale,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    WriteLogger::init(
        cli.log_level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("creating log file {}", cli.log_file.display()))?,
    )?;
    panic_handler::initialize_panic_handler();

    info!("Starting stampdesk");
    settings::load_settings();

    let result = run(cli.command);
    if let Err(e) = &result {
        error!("Command failed: {e:?}");
    }
    info!("Shutting down stampdesk");
    result
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Info { pdf } => info_command(&pdf),
        Command::Stamp {
            pdf,
            stamp,
            placements,
            output,
        } => stamp_command(&pdf, &stamp, &placements, &output),
        Command::Replay {
            pdf,
            script,
            stamps,
            snapshot,
            output,
        } => replay_command(&pdf, &script, &stamps, snapshot.as_deref(), output.as_deref()),
    }
}

#[cfg(feature = "pdf")]
fn info_command(pdf: &Path) -> Result<()> {
    use stampdesk::source::DocumentSource;
    use stampdesk::source::pdf::MupdfSource;

    let source =
        MupdfSource::open(pdf).with_context(|| format!("opening {}", pdf.display()))?;
    println!("{}: {} pages", pdf.display(), source.page_count());
    for page in 0..source.page_count() {
        let geometry = source.page_geometry(page)?;
        println!(
            "  page {:>4}: {:.1} x {:.1}, rotation {}",
            page + 1,
            geometry.width,
            geometry.height,
            geometry.rotation
        );
    }
    Ok(())
}

#[cfg(not(feature = "pdf"))]
fn info_command(_pdf: &Path) -> Result<()> {
    anyhow::bail!("stampdesk was built without PDF support (feature \"pdf\")")
}

#[cfg(feature = "pdf")]
fn open_session(pdf: &Path) -> Result<Session> {
    Session::open_pdf(pdf, stampdesk::SessionOptions::from_settings())
}

#[cfg(not(feature = "pdf"))]
fn open_session(_pdf: &Path) -> Result<Session> {
    anyhow::bail!("stampdesk was built without PDF support (feature \"pdf\")")
}

fn stamp_command(pdf: &Path, stamp: &Path, placements: &[Placement], output: &Path) -> Result<()> {
    let image = load_stamp(stamp).with_context(|| format!("loading stamp {}", stamp.display()))?;
    let mut session = open_session(pdf)?;
    let stamp = session.add_stamp(image);
    for placement in placements {
        session.place(stamp, placement.page, placement.position, placement.scale)?;
    }
    let report = session.export_to(output)?;
    print_report(&report, output);
    Ok(())
}

fn replay_command(
    pdf: &Path,
    script: &Path,
    stamps: &[PathBuf],
    snapshot: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let text = std::fs::read_to_string(script)
        .with_context(|| format!("reading script {}", script.display()))?;
    let steps = parse_script(&text)?;

    let mut session = open_session(pdf)?;
    for path in stamps {
        let image = load_stamp(path).with_context(|| format!("loading stamp {}", path.display()))?;
        session.add_stamp(image);
    }
    session.replay(&steps)?;

    for (page, reason) in session.failures() {
        println!("page {} failed to render: {reason}", page + 1);
    }
    if let Some(dir) = snapshot {
        let written = session.snapshot(dir)?;
        println!("wrote {} page snapshots to {}", written.len(), dir.display());
    }
    match output {
        Some(output) => {
            let report = session.export_to(output)?;
            print_report(&report, output);
        }
        None if session.engine().overlay().is_empty() => {}
        None => println!(
            "{} stamps placed; pass --output to write them",
            session.engine().overlay().len()
        ),
    }
    Ok(())
}

fn print_report(report: &ExportReport, output: &Path) {
    println!(
        "wrote {} ({} stamps, {} as vectors, {} bytes)",
        output.display(),
        report.embedded,
        report.vector,
        report.bytes.len()
    );
    for skipped in &report.skipped {
        println!(
            "skipped stamp {} on page {}: rotation {} is not supported",
            skipped.stamp,
            skipped.page + 1,
            skipped.rotation
        );
    }
}
