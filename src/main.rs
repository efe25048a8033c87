use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use batch_notifier::clients::{DemarchesClient, GristClient, MessageSender, RecordStore};
use batch_notifier::config::{ApiSettings, RunConfig, RunToggles, config_path_from_env};
use batch_notifier::dispatch::{DispatchController, DispatchSettings};
use batch_notifier::error::Result;
use batch_notifier::filter::RecordSelector;

const LOG_FILE: &str = "batch-notifier.log";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let toggles = RunToggles::from_env();
    let _guard = init_tracing(&toggles.results_dir);

    eprintln!("📬 Batch notifier v{}", env!("CARGO_PKG_VERSION"));

    // ── Configuration ────────────────────────────────────────────────────
    let config_path = config_path_from_env();
    let (config, api) = load_settings(&config_path)
        .inspect_err(|e| error!(error = %e, "Cannot start batch"))?;

    info!(
        config = %config_path.display(),
        procedure = %config.procedure_number,
        table = %config.grist_table,
        filters = config.filters.len(),
        logic = %config.filter_logic,
        dry_run = toggles.dry_run,
        force_send = toggles.force_send,
        "Configuration loaded"
    );
    if toggles.dry_run {
        warn!("Dry run: no message will be sent and nothing will be written back");
    }

    // ── Collaborators ────────────────────────────────────────────────────
    let (store, sender) = build_clients(&api)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let selector = RecordSelector::new(
        config.filters.clone(),
        config.filter_logic,
        config.fields.clone(),
    )
    .with_force(toggles.force_send);

    let controller =
        DispatchController::new(store, sender, DispatchSettings::from_config(&config, &toggles))
            .with_raw_fields(&config.raw_fields);

    let report = controller.run(&selector).await;
    report.log_summary();

    if let Err(e) = report.write_artifact(&toggles.results_dir).await {
        warn!(error = %e, "Failed to save results");
    }

    if toggles.fail_on_error && report.result.error_count > 0 {
        error!(errors = report.result.error_count, "Failing run: some records failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Run configuration and API credentials. Either missing is fatal.
fn load_settings(config_path: &Path) -> Result<(RunConfig, ApiSettings)> {
    let config = RunConfig::load(config_path)?;
    let api = ApiSettings::from_env()?;
    Ok((config, api))
}

/// HTTP clients for the data store and the messaging API.
fn build_clients(api: &ApiSettings) -> Result<(Arc<dyn RecordStore>, Arc<dyn MessageSender>)> {
    let store: Arc<dyn RecordStore> = Arc::new(GristClient::new(
        &api.grist_url,
        api.grist_token.clone(),
        api.timeout,
    )?);
    let sender: Arc<dyn MessageSender> = Arc::new(DemarchesClient::new(
        &api.ds_url,
        api.ds_token.clone(),
        api.timeout,
    )?);
    Ok((store, sender))
}

/// Console output plus a plain-text copy under the results directory.
/// Falls back to console only when the directory cannot be created.
fn init_tracing(results_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match std::fs::create_dir_all(results_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(results_dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            warn!(error = %e, dir = %results_dir.display(), "Cannot create log directory");
            None
        }
    }
}
