use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use eyre::{WrapErr, eyre};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{
    io::{Stdout, stdout},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::time;
use tracing::{info, warn};

use gasstation::{
    ClusterProvider, FileCluster, GasStation, GasStationConfig, PreferredClient, RpcEpochClient,
    StaticCluster,
    config::{self, SUGGEST_POLL_INTERVAL, SyncIntervals},
    monitor::StationMonitor,
    telemetry,
    ui::Dashboard,
};

type CrosstermTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Gas fee suggestions from a cluster of full nodes.
#[derive(Debug, Parser)]
#[command(name = "gasstation", version)]
struct Args {
    /// Full node RPC endpoints
    #[arg(long = "rpc-url", env = "RPC_URLS", value_delimiter = ',')]
    rpc_urls: Vec<String>,

    /// JSON file listing node URLs, re-read on every cluster refresh
    #[arg(long, env = "CLUSTER_FILE", conflicts_with = "rpc_urls")]
    cluster_file: Option<PathBuf>,

    #[arg(long, env = "GAS_STATION_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    enabled: bool,

    /// Window capacity and initial back-fill depth, in epochs
    #[arg(
        long,
        env = "HISTORICAL_PEEK_COUNT",
        default_value_t = config::DEFAULT_HISTORICAL_PEEK_COUNT
    )]
    historical_peek_count: usize,

    /// Low, medium and high percentiles
    #[arg(
        long,
        env = "PERCENTILES",
        value_delimiter = ',',
        default_values_t = config::DEFAULT_PERCENTILES
    )]
    percentiles: Vec<f64>,

    #[arg(long, env = "TREND_DEADBAND", default_value_t = config::DEFAULT_TREND_DEADBAND)]
    trend_deadband: f64,

    #[arg(long, env = "CATCH_UP_MS", default_value_t = SyncIntervals::default().catch_up_ms)]
    catch_up_ms: u64,

    #[arg(
        long = "sync-interval-ms",
        env = "SYNC_INTERVAL_MS",
        default_value_t = SyncIntervals::default().normal_ms
    )]
    normal_ms: u64,

    #[arg(
        long,
        env = "CLUSTER_REFRESH_SECS",
        default_value_t = SyncIntervals::default().cluster_refresh_secs
    )]
    cluster_refresh_secs: u64,

    /// Print suggestions as JSON lines instead of drawing the dashboard
    #[arg(long)]
    headless: bool,

    /// Log file used while the dashboard owns the terminal
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn station_config(&self) -> eyre::Result<GasStationConfig> {
        let percentiles: [f64; 3] = self
            .percentiles
            .clone()
            .try_into()
            .map_err(|p: Vec<f64>| eyre!("expected 3 percentiles, got {}", p.len()))?;

        let config = GasStationConfig {
            enabled: self.enabled,
            historical_peek_count: self.historical_peek_count,
            percentiles,
            trend_deadband: self.trend_deadband,
            intervals: SyncIntervals {
                catch_up_ms: self.catch_up_ms,
                normal_ms: self.normal_ms,
                cluster_refresh_secs: self.cluster_refresh_secs,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();

    if args.headless {
        telemetry::init_stderr(&args.log_level)?;
    } else if let Some(path) = &args.log_file {
        telemetry::init_file(&args.log_level, path)?;
    }

    let config = args.station_config()?;
    if !config.enabled {
        info!("Gas station disabled");
        return Ok(());
    }

    match &args.cluster_file {
        Some(path) => run(&args, config, FileCluster::new(path)).await,
        None if args.rpc_urls.is_empty() => {
            Err(eyre!("either --rpc-url or --cluster-file is required"))
        }
        None => run(&args, config, StaticCluster::from_urls(&args.rpc_urls)?).await,
    }
}

async fn run<P>(args: &Args, config: GasStationConfig, provider: P) -> eyre::Result<()>
where
    P: ClusterProvider<Client = RpcEpochClient>,
{
    let preferred = Arc::new(PreferredClient::empty());
    let Some(station) = GasStation::start(config, provider, Arc::clone(&preferred)).await? else {
        info!("Gas station disabled");
        return Ok(());
    };
    let mut monitor = StationMonitor::new(station, preferred);

    if args.headless {
        run_headless(&mut monitor).await
    } else {
        run_dashboard(&mut monitor).await
    }
}

async fn run_headless(monitor: &mut StationMonitor<RpcEpochClient>) -> eyre::Result<()> {
    let mut ticker = time::interval(SUGGEST_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = monitor.refresh().await;
                match (&snapshot.error, &snapshot.suggestion) {
                    (None, Some(fees)) => println!("{}", serde_json::to_string(fees)?),
                    (Some(err), _) => warn!(error = %err, "Gas fee suggestion unavailable"),
                    (None, None) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                return Ok(());
            }
        }
    }
}

async fn run_dashboard(monitor: &mut StationMonitor<RpcEpochClient>) -> eyre::Result<()> {
    let mut terminal = setup_terminal()?;
    let mut dashboard = Dashboard::new();
    let result = dashboard_loop(&mut terminal, &mut dashboard, monitor).await;
    cleanup_terminal(&mut terminal)?;
    result
}

async fn dashboard_loop(
    terminal: &mut CrosstermTerminal,
    dashboard: &mut Dashboard,
    monitor: &mut StationMonitor<RpcEpochClient>,
) -> eyre::Result<()> {
    let mut last_update: Option<std::time::Instant> = None;

    loop {
        if last_update.is_none_or(|t| t.elapsed() >= SUGGEST_POLL_INTERVAL) {
            monitor.refresh().await;
            last_update = Some(std::time::Instant::now());
        }

        terminal
            .draw(|frame| dashboard.render(frame, monitor.snapshot()))
            .wrap_err("failed to draw dashboard")?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    dashboard.quit();
                }
            }
        }

        if dashboard.should_quit {
            return Ok(());
        }

        time::sleep(Duration::from_millis(100)).await;
    }
}

fn setup_terminal() -> eyre::Result<CrosstermTerminal> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn cleanup_terminal(terminal: &mut CrosstermTerminal) -> eyre::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
