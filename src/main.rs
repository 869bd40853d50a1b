use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod api;
mod auth;
mod controller;
mod dashboard;
mod datatable;
mod dates;
mod domain;
mod excel;
mod format;
mod inputter;
mod loader;
mod model;
mod record;
mod reports;
mod services;
mod ui;

use api::ApiClient;
use controller::Controller;
use domain::{AppConfig, CrmError, DEFAULT_API_URL};
use model::{Model, Status};
use ui::CrmUI;

/// Terminal back office for insurance brokerage reports.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Report file (csv, parquet, arrow, xlsx) to open on start, `path#sheet` picks a sheet
    file: Option<String>,

    /// Base URL of the reports API
    #[arg(long, env = "CRMTV_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Where the login session is kept
    #[arg(long, env = "CRMTV_SESSION_FILE", default_value = "~/.crmtv-session.json")]
    session_file: String,

    /// Directory for Excel exports
    #[arg(long, env = "CRMTV_EXPORT_DIR", default_value = ".")]
    export_dir: String,

    #[arg(long, env = "CRMTV_LOG_FILE", default_value = "~/.crmtv.log")]
    log_file: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[arg(long, default_value_t = 40)]
    max_column_width: usize,
}

fn expand(path: &str) -> Result<PathBuf, CrmError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| CrmError::LoadingFailed(e.to_string()))
}

fn init_logging(path: &PathBuf) -> Result<(), CrmError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let result = run(args);
    ratatui::restore();
    match result {
        Err(e) => {
            error!("Terminated: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(args: Args) -> Result<(), CrmError> {
    init_logging(&expand(&args.log_file)?)?;

    let cfg = AppConfig::default()
        .with_api_base_url(args.api_url.clone())
        .with_request_timeout(std::time::Duration::from_secs(args.timeout))
        .with_max_column_width(args.max_column_width)
        .with_export_dir(expand(&args.export_dir)?)
        .with_session_file(expand(&args.session_file)?);
    info!("Starting crmtv against {}", cfg.api_base_url);

    let backend = ApiClient::new(&cfg.api_base_url, cfg.request_timeout)?;
    let today = chrono::Local::now().date_naive();

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(
        &cfg,
        Box::new(backend),
        today,
        size.width as usize,
        size.height as usize,
    )?;
    if let Some(file) = &args.file {
        model.load_data_file(file);
    }

    let ui = CrmUI::new(&cfg);
    let controller = Controller::new(&cfg);

    while model.status != Status::QUITTING {
        terminal.draw(|f| ui.draw(&model, f))?;

        if let Some(message) = controller.handle_event(&model)? {
            model.update(message)?;
        };
    }

    info!("Bye");
    Ok(())
}
