use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use portfolio_sync::config::{default_config_path, ResolvedConfig};
use portfolio_sync::format::{format_percent, format_quantity, format_signed_percent, MoneyFormat};
use portfolio_sync::fundamentals::{compact_info, FundamentalsStore, FundamentalsSync};
use portfolio_sync::market_data::providers::YahooFinanceProvider;
use portfolio_sync::market_data::{
    normalize_symbol, FetchOrchestrator, MarketDataProvider, QuoteCache, SeriesRange,
};
use portfolio_sync::models::Position;
use portfolio_sync::portfolio::PortfolioService;
use portfolio_sync::report_cache::{asset_hash_of, portfolio_hash};
use portfolio_sync::storage::{PositionSource, SqliteDatabase};
use portfolio_sync::valuation::PortfolioValuation;

#[derive(Parser)]
#[command(name = "portfolio-sync")]
#[command(about = "Portfolio market data sync and valuation")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    /// Replace stored positions with the contents of a JSON file
    Import {
        /// JSON array of positions
        file: PathBuf,
    },

    /// Value the portfolio with live quotes
    View {
        /// Print the valuation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh stale fundamentals for the given symbols (default: every position)
    RefreshFundamentals { symbols: Vec<String> },

    /// Show stored fundamentals for a symbol
    Fundamentals { symbol: String },

    /// Show price history for a symbol
    Series {
        symbol: String,

        /// 1d, 5d, 1mo, 1y, 2y, 5y, 10y, 20y or max
        #[arg(long, default_value = "1y")]
        range: String,

        /// Print closes divided by the first close
        #[arg(long)]
        normalized: bool,
    },

    /// Print the content hashes used as report cache keys
    Hash,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    }
}

struct App {
    config: ResolvedConfig,
    db: Arc<SqliteDatabase>,
    orchestrator: Arc<FetchOrchestrator>,
    portfolio: PortfolioService,
}

impl App {
    fn build(config: ResolvedConfig) -> Result<Self> {
        let db = Arc::new(SqliteDatabase::open(&config.database_path).with_context(|| {
            format!("Failed to open database: {}", config.database_path.display())
        })?);

        let mut yahoo = YahooFinanceProvider::with_timeout(config.provider.timeout)?;
        if let Some(base_url) = &config.provider.base_url {
            yahoo = yahoo.with_base_url(base_url.clone());
        }
        let provider: Arc<dyn MarketDataProvider> = Arc::new(yahoo);
        let policy = config.freshness_policy();

        let quotes = Arc::new(
            QuoteCache::new(provider.clone())
                .with_policy(policy)
                .with_fx_fallback(config.fx_fallback_rate),
        );
        let fundamentals = Arc::new(
            FundamentalsSync::new(provider.clone(), db.clone() as Arc<dyn FundamentalsStore>)
                .with_policy(policy),
        );
        let orchestrator = Arc::new(
            FetchOrchestrator::new(provider, quotes, fundamentals)
                .with_policy(policy)
                .with_retry(config.retry_policy())
                .with_max_workers(config.fetch.max_workers),
        );
        let portfolio = PortfolioService::new(orchestrator.clone())
            .with_local_market_suffix(config.local_market_suffix.clone())
            .with_fx_pair(config.fx_pair());

        Ok(Self {
            config,
            db,
            orchestrator,
            portfolio,
        })
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        self.db
            .list_positions()
            .await
            .context("Failed to load positions")
    }
}

fn print_valuation(valuation: &PortfolioValuation, money: &MoneyFormat) {
    println!(
        "{:<12} {:>12} {:>16} {:>16} {:>16} {:>10} {:>9} {:>8}",
        "CODE", "QTY", "PRICE", "VALUE", "P&L", "P&L %", "DAY", "SHARE"
    );
    for line in &valuation.lines {
        let price = if line.priced {
            MoneyFormat::plain().format(line.current_price)
        } else {
            "not priced".to_string()
        };
        println!(
            "{:<12} {:>12} {:>16} {:>16} {:>16} {:>10} {:>9} {:>8}",
            line.code,
            format_quantity(line.quantity),
            price,
            money.format(line.market_value),
            money.format(line.pnl),
            format_percent(line.pnl_percent),
            format_signed_percent(line.daily_change_percent),
            format_percent(Some(line.percent_of_portfolio)),
        );
    }
    println!();
    println!("Total value: {}", money.format(valuation.total_market_value));
    println!("Total cost:  {}", money.format(valuation.total_cost_basis));
    println!(
        "Total P&L:   {} ({})",
        money.format(valuation.total_pnl),
        format_percent(valuation.total_pnl_percent)
    );
    let fallback = if valuation.fx.is_fallback() {
        " (fallback)"
    } else {
        ""
    };
    println!("FX {}: {}{fallback}", valuation.fx.pair, valuation.fx.rate);
    if !valuation.unpriced.is_empty() {
        println!("Not priced: {}", valuation.unpriced.join(", "));
    }
}

fn read_positions_file(path: &Path) -> Result<Vec<Position>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read positions file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse positions file: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;

    if let Command::Config = cli.command {
        println!("Config file: {}", config_path.display());
        println!("Data directory: {}", config.data_dir.display());
        println!("Database: {}", config.database_path.display());
        println!("FX pair: {}", config.fx_pair());
        println!("Max workers: {}", config.fetch.max_workers);
        return Ok(());
    }

    let app = App::build(config)?;
    let money = app.config.display.money_format();

    match cli.command {
        Command::Config => {}
        Command::Import { file } => {
            let positions = read_positions_file(&file)?;
            app.db
                .save_positions(&positions)
                .await
                .context("Failed to save positions")?;
            println!("Imported {} positions", positions.len());
        }
        Command::View { json } => {
            let positions = app.positions().await?;
            let valuation = app.portfolio.view(&positions).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&valuation)?);
            } else {
                print_valuation(&valuation, &money);
            }
        }
        Command::RefreshFundamentals { symbols } => {
            let symbols = if symbols.is_empty() {
                app.portfolio.provider_symbols(&app.positions().await?)
            } else {
                symbols
            };
            let report = app.orchestrator.refresh_all(&symbols).await;
            println!(
                "Refreshed {} of {} symbols",
                report.succeeded.len(),
                report.attempted
            );
            if !report.failed.is_empty() {
                println!("Failed: {}", report.failed.join(", "));
            }
        }
        Command::Fundamentals { symbol } => {
            let symbol = normalize_symbol(&symbol);
            let bundle = app
                .orchestrator
                .fundamentals()
                .store()
                .bundle(&symbol)
                .await
                .with_context(|| format!("Failed to read fundamentals for {symbol}"))?;
            if bundle.is_empty() {
                println!("No stored fundamentals for {symbol}");
                return Ok(());
            }
            if let Some(info) = &bundle.info {
                println!("{}", serde_json::to_string_pretty(&compact_info(info))?);
            }
            for (label, latest) in [
                ("Income statement", &bundle.income),
                ("Balance sheet", &bundle.balance_sheet),
                ("Cash flow", &bundle.cash_flow),
            ] {
                match latest {
                    Some(period) => println!("{label}: period ending {}", period.period_end),
                    None => println!("{label}: none stored"),
                }
            }
        }
        Command::Series {
            symbol,
            range,
            normalized,
        } => {
            let range: SeriesRange = range.parse()?;
            let series = app
                .orchestrator
                .fetch_series(&symbol, range.period(), range.interval())
                .await;
            if series.is_empty() {
                println!("No data for {} ({})", series.symbol, range.period());
            } else if normalized {
                for (at, value) in series.normalized() {
                    println!("{}  {}", at.format("%Y-%m-%d %H:%M"), value.round_dp(4));
                }
            } else {
                for point in &series.points {
                    println!(
                        "{}  {}  {}",
                        point.timestamp.format("%Y-%m-%d %H:%M"),
                        point.close,
                        point.adjusted_close
                    );
                }
            }
        }
        Command::Hash => {
            let positions = app.positions().await?;
            println!("portfolio  {}", portfolio_hash(&positions));
            let valuation = app.portfolio.view(&positions).await?;
            for position in &positions {
                if let Some(snapshot) = app
                    .portfolio
                    .asset_snapshot(&positions, &valuation, &position.code)
                    .await?
                {
                    println!("{:<10} {}", snapshot.symbol, asset_hash_of(&snapshot)?);
                }
            }
        }
    }

    Ok(())
}
