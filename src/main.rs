use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use vlr_scraper::config::Config;
use vlr_scraper::error::PipelineError;
use vlr_scraper::models::FetchTarget;
use vlr_scraper::output;
use vlr_scraper::pipeline::Pipeline;

#[tokio::main]
async fn main() {
    if let Err(e) = log4rs::init_file("log4rs.yml", Default::default()) {
        eprintln!("failed to initialize logging: {}", e);
    }

    let config = Config::load();

    let mut entry_paths: Vec<String> = Vec::new();
    for path in &config.entry_paths {
        match Pipeline::validate_entry_path(path) {
            Ok(()) => entry_paths.push(path.clone()),
            Err(reason) => warn!("skipping entry path {}: {}", path, reason),
        }
    }
    if entry_paths.is_empty() {
        error!("no valid entry paths configured");
        std::process::exit(2);
    }

    let pipeline = match Pipeline::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to initialize pipeline: {}", e);
            std::process::exit(2);
        }
    };

    let mut targets: Vec<FetchTarget> = Vec::new();
    for path in &entry_paths {
        targets.extend(pipeline.entry_targets(path));
    }
    info!(
        "starting run: {} entry path(s), {} initial target(s)",
        entry_paths.len(),
        targets.len()
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight fetches");
                cancel.cancel();
            }
        });
    }

    match pipeline.run(targets, cancel).await {
        Ok(outcome) => {
            print!(
                "{}",
                output::render(&outcome.records, config.run.output_format)
            );
            print!("{}", output::render_summary(&outcome.report));
            info!("run complete: {} record(s)", outcome.records.len());
        }
        Err(e @ PipelineError::NoDataExtracted { .. }) => {
            error!("{}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    }
}
