use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{ArgAction, Parser};
use log::{info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};

use biopsy_viewer::catalog::{
    CatalogMode, CatalogSource, DocumentDescriptor, HttpCatalogSource, JsonFileCatalogSource,
    load_catalog_or_empty,
};
use biopsy_viewer::panic_handler::initialize_panic_handler;
use biopsy_viewer::presenter::PngPresenter;
use biopsy_viewer::settings::load_settings;
use biopsy_viewer::viewer::{
    DocumentDecoder, FileDocumentSource, HttpDocumentSource, LocatorSource, ViewerSession,
};

/// Browse a patient's biopsy reports and render them to PNG pages
#[derive(Parser, Debug)]
#[command(name = "biopsy-viewer", version, about)]
struct Args {
    /// Access token or patient RUT, depending on the catalog mode
    patient_key: String,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read the report listing from a JSON file instead of the backend
    #[arg(long)]
    catalog_file: Option<PathBuf>,

    /// Override the catalog mode from the settings
    #[arg(long, value_enum)]
    mode: Option<CatalogMode>,

    /// Override the backend base URL from the settings
    #[arg(long)]
    api_base: Option<String>,

    /// Base directory for relative document paths
    #[arg(long)]
    documents_root: Option<PathBuf>,

    /// Viewport width in pixels used to pick the render scale
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Report to render, 1-based; repeat to render several in turn
    #[arg(long = "select", value_name = "N")]
    select: Vec<usize>,

    /// Render every report in the catalog
    #[arg(long, conflicts_with = "select")]
    all: bool,

    /// Only print the catalog
    #[arg(long)]
    list: bool,

    /// Output directory for rendered pages
    #[arg(long, default_value = "pages")]
    out: PathBuf,

    /// Seconds to wait for each render
    #[arg(long, default_value_t = 120)]
    render_timeout: u64,

    #[arg(long, default_value = "biopsy-viewer.log")]
    log_file: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    WriteLogger::init(level, Config::default(), File::create(&args.log_file)?)?;
    initialize_panic_handler();

    info!("Starting biopsy-viewer");

    let mut settings = load_settings(args.config.as_deref());
    if let Some(mode) = args.mode {
        settings.catalog.mode = mode;
    }
    if let Some(api_base) = &args.api_base {
        settings.catalog.api_base = api_base.clone();
    }

    let catalog_source: Box<dyn CatalogSource> = match &args.catalog_file {
        Some(path) => Box::new(JsonFileCatalogSource::new(path)),
        None => Box::new(HttpCatalogSource::new(
            &settings.catalog.api_base,
            settings.catalog.mode,
            settings.catalog.timeout(),
        )?),
    };
    let descriptors = load_catalog_or_empty(catalog_source.as_ref(), &args.patient_key);

    if args.list {
        print_catalog(&descriptors);
        return Ok(());
    }
    if descriptors.is_empty() {
        println!("No reports found for this patient.");
        return Ok(());
    }

    let files = match &args.documents_root {
        Some(root) => FileDocumentSource::with_root(root),
        None => FileDocumentSource::new(),
    };
    let documents = LocatorSource::new(HttpDocumentSource::new(settings.catalog.timeout())?, files);

    let presenter = PngPresenter::new(&args.out);
    let mut session = ViewerSession::with_config(
        settings.session_config(),
        Arc::new(documents),
        build_decoder()?,
        Box::new(presenter.clone()),
    );

    let catalog_len = descriptors.len();
    let targets = requested_reports(&args.select, args.all, catalog_len);

    let render_timeout = Duration::from_secs(args.render_timeout);
    session.set_scale(settings.scale.scale_for_width(args.width));
    session.load_catalog(descriptors);

    if targets.is_empty() {
        settle(&mut session, render_timeout);
    }
    for target in targets {
        match target {
            Ok(index) => {
                session.select(index);
                settle(&mut session, render_timeout);
            }
            Err(number) => {
                warn!("Ignoring report {number} - catalog has {catalog_len}");
                eprintln!("Report {number} does not exist (catalog has {catalog_len})");
            }
        }
    }
    session.dispose();

    let mut failures = 0;
    for outcome in presenter.outcomes().iter().filter(|o| !o.superseded) {
        match (&outcome.failure, outcome.page_count) {
            (Some(reason), _) => {
                failures += 1;
                println!("{}: failed - {reason}", outcome.document_id);
            }
            (None, Some(pages)) => println!(
                "{}: {pages} page(s), {} written under {:?}",
                outcome.document_id,
                outcome.pages_written.len(),
                args.out
            ),
            (None, None) => println!("{}: not finished", outcome.document_id),
        }
    }

    info!("Shutting down biopsy-viewer");
    if failures > 0 {
        bail!("{failures} report(s) failed to render");
    }
    Ok(())
}

/// Catalog indices for the requested 1-based report numbers; numbers
/// outside the catalog come back as `Err(number)`
fn requested_reports(select: &[usize], all: bool, catalog_len: usize) -> Vec<Result<usize, usize>> {
    if all {
        return (0..catalog_len).map(Ok).collect();
    }
    select
        .iter()
        .map(|&number| match number.checked_sub(1) {
            Some(index) if index < catalog_len => Ok(index),
            _ => Err(number),
        })
        .collect()
}

fn settle(session: &mut ViewerSession, timeout: Duration) {
    if !session.run_until_settled(timeout) {
        let id = session.selected().map(|d| d.id.clone()).unwrap_or_default();
        warn!("Render of {id} did not finish within {timeout:?}");
        eprintln!("{id}: not finished within {timeout:?}");
    }
}

fn print_catalog(descriptors: &[DocumentDescriptor]) {
    if descriptors.is_empty() {
        println!("No reports found for this patient.");
        return;
    }
    println!("Reports ({})", descriptors.len());
    for (i, d) in descriptors.iter().enumerate() {
        println!("{:>3}. {d}", i + 1);
        if !d.patient_id.is_empty() {
            println!("     RUT: {}", d.patient_id);
        }
        if let Some(service) = &d.service {
            println!("     Service: {service}");
        }
    }
}

#[cfg(feature = "pdf")]
fn build_decoder() -> Result<Arc<dyn DocumentDecoder>> {
    Ok(Arc::new(biopsy_viewer::viewer::MupdfDecoder::default()))
}

#[cfg(not(feature = "pdf"))]
fn build_decoder() -> Result<Arc<dyn DocumentDecoder>> {
    bail!("biopsy-viewer was built without the `pdf` feature; no document decoder available")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_numbers_are_one_based() {
        assert_eq!(requested_reports(&[2, 1], false, 3), vec![Ok(1), Ok(0)]);
    }

    #[test]
    fn report_zero_and_past_end_do_not_exist() {
        assert_eq!(
            requested_reports(&[0, 3, 4], false, 3),
            vec![Err(0), Ok(2), Err(4)]
        );
    }

    #[test]
    fn all_covers_whole_catalog() {
        assert_eq!(requested_reports(&[], true, 2), vec![Ok(0), Ok(1)]);
        assert!(requested_reports(&[], false, 2).is_empty());
    }
}
