use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use anyhow::{format_err, Context};
use chrono::NaiveDate;
use clap::Parser;
use strum_macros::EnumString;
use tracing::debug;
use tracing_subscriber::{
    fmt::{format::FmtSpan, Subscriber},
    prelude::*,
    EnvFilter,
};

use tourenplan::appointments::Appointment;
use tourenplan::cache_stores::memory::MemoryCacheStore;
use tourenplan::distance::DistanceOracle;
use tourenplan::geocoders::Geocoder;
use tourenplan::planner::{PlanningConfig, WeekPlanner};
use tourenplan::provider::{google::GoogleProvider, shared_http_client, GeoProvider};
use tourenplan::Result;

/// Planning presets. (Helper enum for argument parsing.)
#[derive(Clone, Copy, Debug, EnumString)]
#[strum(serialize_all = "snake_case")]
enum Preset {
    Strict,
    Flex,
}

impl Preset {
    fn config(self) -> PlanningConfig {
        match self {
            Preset::Strict => PlanningConfig::strict_40h_10h(),
            Preset::Flex => PlanningConfig::flex_50h_14h(),
        }
    }
}

/// Which provider backend to use. (Helper enum for argument parsing.)
#[derive(Clone, Copy, Debug, EnumString)]
#[strum(serialize_all = "snake_case")]
enum ProviderName {
    None,
    Google,
}

/// Our command-line arguments.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "plan a Monday-Friday driving tour from an appointment pool"
)]
struct Opt {
    /// JSON file with the appointment pool, or `-` for standard input.
    #[arg(long = "input", default_value = "-")]
    input: PathBuf,

    /// Monday the week starts on, e.g. 2025-06-02.
    #[arg(long = "week-start")]
    week_start: NaiveDate,

    /// Planning preset: `strict` (40h/10h) or `flex` (50h/14h).
    #[arg(long = "preset", default_value = "strict")]
    preset: Preset,

    /// Geocoding/routing backend: `none` (offline tiers only) or `google`
    /// (needs GOOGLE_MAPS_API_KEY).
    #[arg(long = "provider", default_value = "none")]
    provider: ProviderName,
}

#[tokio::main]
async fn main() {
    // Configure tracing.
    let filter = EnvFilter::from_default_env();
    Subscriber::builder()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(filter)
        .finish()
        .init();

    if let Err(err) = run(Opt::parse()).await {
        // Show the whole cause chain, not just the outermost message.
        eprintln!("Error: {}", err);
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {}", cause);
        }
        exit(1);
    }
}

async fn run(opt: Opt) -> Result<()> {
    let appointments = read_appointments(&opt.input)?;
    debug!(count = appointments.len(), "appointment pool loaded");

    let provider: Option<Arc<dyn GeoProvider>> = match opt.provider {
        ProviderName::None => None,
        ProviderName::Google => Some(Arc::new(GoogleProvider::new(shared_http_client())?)),
    };

    let store = Arc::new(MemoryCacheStore::new());
    let geocoder = Arc::new(Geocoder::new(store.clone(), provider.clone()));
    let oracle = Arc::new(DistanceOracle::new(store, provider));

    let planner = WeekPlanner::new(opt.preset.config(), geocoder, oracle);
    let report = planner.plan(&appointments, opt.week_start).await?;

    serde_json::to_writer_pretty(io::stdout().lock(), &report)
        .context("could not write plan to standard output")?;
    println!();
    Ok(())
}

fn read_appointments(path: &PathBuf) -> Result<Vec<Appointment>> {
    let mut raw = String::new();
    if path.as_os_str() == "-" {
        io::stdin()
            .read_to_string(&mut raw)
            .context("could not read standard input")?;
    } else {
        File::open(path)
            .with_context(|| format_err!("cannot open {}", path.display()))?
            .read_to_string(&mut raw)
            .with_context(|| format_err!("cannot read {}", path.display()))?;
    }
    serde_json::from_str(&raw).context("could not parse appointment JSON")
}
