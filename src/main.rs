mod catalog;
mod db;
mod error;
mod fetch;
mod parser;
mod pipeline;
mod resolve;
mod scraper;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use settings::Settings;
use db::{OverviewRow, Store};
use pipeline::Harvest;
use scraper::SeasonScope;

#[derive(Parser)]
#[command(name = "rt_harvest", about = "TV series ratings harvester")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that take precedence over the settings file and `RT_*` variables.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Settings file (default: ./rt_harvest.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Upstream proxy for every request
    #[arg(long, global = true)]
    proxy: Option<String>,
    /// Max requests in flight
    #[arg(long, global = true)]
    concurrency: Option<usize>,
    /// Max request launches per second (0 = unthrottled)
    #[arg(long, global = true)]
    rps: Option<f64>,
    /// JSON rule table replacing the built-in one
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(db) = &self.db {
            settings.db_path = db.clone();
        }
        if let Some(proxy) = &self.proxy {
            settings.proxy = Some(proxy.clone());
        }
        if let Some(n) = self.concurrency {
            settings.max_concurrency = n;
        }
        if let Some(rps) = self.rps {
            settings.requests_per_second = rps;
        }
        if let Some(rules) = &self.rules {
            settings.rules_path = Some(rules.clone());
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the index and resolve new names to series URLs
    Catalog,
    /// Fetch missing or recent series pages
    Series,
    /// Fetch missing or recent seasons of every stored series
    Seasons,
    /// Catalog, series and seasons in one pass
    Run,
    /// Show row counts
    Stats,
    /// Series overview with sparse scores suppressed
    Overview {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Max rows to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Delete a stored series and its seasons so the next run fetches it again
    Forget {
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.overrides.config.as_deref())?;
    cli.overrides.apply(&mut settings);

    let result = match cli.command {
        Commands::Catalog => {
            let h = Harvest::from_settings(&settings)?;
            let names = catalog::collect_new_names(&h).await?;
            println!("Found {} new names.", names.len());
            let stats = resolve::resolve_names(&h, names).await?;
            println!("Resolve: {}", stats.summary());
            Ok(())
        }
        Commands::Series => {
            let h = Harvest::from_settings(&settings)?;
            let pass = scraper::scrape_series(&h).await?;
            println!("Series: {}", pass.stats.summary());
            Ok(())
        }
        Commands::Seasons => {
            let h = Harvest::from_settings(&settings)?;
            let stats = scraper::scrape_seasons(&h, SeasonScope::All).await?;
            println!("Seasons: {}", stats.summary());
            Ok(())
        }
        Commands::Run => {
            let h = Harvest::from_settings(&settings)?;
            h.run().await?.print();
            Ok(())
        }
        Commands::Stats => {
            let store = Store::open(&settings.db_path)?;
            let s = store.stats()?;
            println!("Names:     {}", s.names);
            println!("URLs:      {}", s.urls);
            println!("Series:    {}", s.series);
            println!("Seasons:   {}", s.seasons);
            println!("Certified: {}", s.certified_seasons);
            Ok(())
        }
        Commands::Overview { json, limit } => {
            let store = Store::open(&settings.db_path)?;
            let rows = store.overview(settings.min_votes, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No series stored. Run 'run' first.");
            } else {
                print_overview(&rows, settings.min_votes);
            }
            Ok(())
        }
        Commands::Forget { url } => {
            let store = Store::open(&settings.db_path)?;
            if store.delete_series(&url)? {
                println!("Deleted {} and its seasons.", url);
            } else {
                println!("No series stored for {}.", url);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_overview(rows: &[OverviewRow], min_votes: u32) {
    println!(
        "{:>3} | {:<28} | {:>4} | {:<14} | {:<14} | {:>6} | {:>5} | {:>3} | {:<4}",
        "#", "Series", "Year", "Network", "Genre", "Tomato", "Aud.", "S", "Cert"
    );
    println!("{}", "-".repeat(100));

    for (i, r) in rows.iter().enumerate() {
        println!(
            "{:>3} | {:<28} | {:>4} | {:<14} | {:<14} | {:>6} | {:>5} | {:>3} | {:<4}",
            i + 1,
            truncate(&r.name, 28),
            r.year,
            truncate(&r.network, 14),
            truncate(&r.genre, 14),
            score(r.tomatometer_score),
            score(r.audience_score),
            r.no_seasons,
            if r.certified { "yes" } else { "" },
        );
    }

    println!("\n{} series | scores shown from {} ratings", rows.len(), min_votes);
}

fn score(s: Option<u32>) -> String {
    s.map(|s| format!("{}%", s)).unwrap_or_else(|| "-".into())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rt_harvest", "run", "--db", "/tmp/x.sqlite", "--concurrency", "4", "--rps", "2.5",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Run));

        let mut settings = Settings::default();
        cli.overrides.apply(&mut settings);
        assert_eq!(settings.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(settings.max_concurrency, 4);
        assert_eq!(settings.requests_per_second, 2.5);
        assert_eq!(settings.timeout_secs, 30);
    }

    #[test]
    fn overview_flags() {
        let cli = Cli::try_parse_from(["rt_harvest", "overview", "--json", "-n", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Overview { json: true, limit: Some(5) }));
    }

    #[test]
    fn forget_requires_url() {
        assert!(Cli::try_parse_from(["rt_harvest", "forget"]).is_err());
        let cli = Cli::try_parse_from(["rt_harvest", "forget", "https://x/tv/y"]).unwrap();
        assert!(matches!(cli.command, Commands::Forget { url } if url == "https://x/tv/y"));
    }

    #[test]
    fn no_overrides_keep_settings() {
        let mut settings = Settings::default();
        Overrides::default().apply(&mut settings);
        assert_eq!(settings.db_path, Settings::default().db_path);
        assert!(settings.proxy.is_none());
    }

    #[test]
    fn helpers() {
        assert_eq!(truncate("Buffy the Vampire Slayer", 10), "Buffy t...");
        assert_eq!(truncate("Lost", 10), "Lost");
        assert_eq!(score(None), "-");
        assert_eq!(score(Some(96)), "96%");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
