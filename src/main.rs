use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use label_lens::render::{canonical_json, render_text};
use label_lens::{
    AppError, Configuration, DetectionParameters, ImageAsset, Parameter, SessionBuilder,
    SessionState, SubmitOutcome,
};
use tracing::{Level, info, warn};

/// Detect labels in an image with a remote detection service.
#[derive(Debug, Parser)]
#[command(name = "label-lens", version)]
struct Cli {
    /// Image file to analyse.
    image: PathBuf,

    /// Detection endpoint URL.
    #[arg(long, env = "LABEL_LENS_ENDPOINT")]
    endpoint: Option<String>,

    /// Maximum number of labels (1-100). Out-of-range values are clamped.
    #[arg(long)]
    max_labels: Option<String>,

    /// Minimum confidence (0-100). Out-of-range values are clamped.
    #[arg(long)]
    confidence: Option<String>,

    /// Configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ask the service to remove detected people from a regenerated copy.
    #[arg(long)]
    remove_people: bool,

    /// Where to write the regenerated image, if the service returns one.
    #[arg(long)]
    save_regenerated: Option<PathBuf>,

    /// Give up waiting for the service after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the canonical JSON envelope instead of text.
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let configuration = Configuration::load(cli.config.as_deref())?;
    let mut builder = SessionBuilder::new(configuration);
    if let Some(endpoint) = &cli.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(timeout) = cli.timeout {
        builder = builder.request_timeout(Some(Duration::from_secs(timeout)));
    }
    let (_manager, session) = builder.build()?;

    session
        .select_asset(ImageAsset::from_path(&cli.image))
        .await?;
    let mut parameters = DetectionParameters::new(
        Parameter::from(cli.max_labels.clone()),
        Parameter::from(cli.confidence.clone()),
    );
    if cli.remove_people {
        parameters = parameters.remove_people(true);
    }

    match session.submit(parameters).await? {
        SubmitOutcome::Started(sequence) => info!("Submission {} started", sequence),
        outcome => warn!("Submission not started: {:?}", outcome),
    }

    let state = session.wait_until_settled().await?;
    match &state {
        SessionState::Success(detection) if cli.json => {
            println!("{:#}", canonical_json(detection));
        }
        _ => println!("{}", render_text(&state)),
    }

    if let (Some(path), SessionState::Success(detection)) = (&cli.save_regenerated, &state) {
        let image = match &detection.retouch {
            Some(retouch) => retouch.decode_regenerated_image()?,
            None => None,
        };
        match image {
            Some(bytes) => {
                tokio::fs::write(path, &bytes)
                    .await
                    .map_err(|e| AppError::Output(path.display().to_string(), e))?;
                info!("Wrote regenerated image to {}", path.display());
            }
            None => warn!("The service returned no regenerated image"),
        }
    }

    Ok(match state {
        SessionState::Success(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
