use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use wildfire_core::{AppError, Config};
use wildfire_risk::{
    reverse_geocode, Coordinate, FireRiskService, KeyValueStore, LocationError, LocationResolver,
    ManualLocationStore, NoDeviceLocation, PrimaryProvider, RegionalProvider, Resolution,
    SpatialCache, SqliteStore, TierBudgets, TierOutcome,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wildfire risk for where you are", long_about = None)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Current fire risk at a coordinate, or at the resolved location
    Risk {
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
        /// Ask for manual entry instead of using the default location
        #[arg(long)]
        no_default: bool,
    },
    /// Resolve the current location without fetching risk
    Locate {
        #[arg(long)]
        no_default: bool,
    },
    /// Save a manual location
    SetLocation {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        /// Place name; looked up by reverse geocoding when omitted
        #[arg(long)]
        name: Option<String>,
    },
    /// Show the saved manual location
    ShowLocation,
    /// Forget the saved manual location
    ClearLocation,
    /// Drop every cached risk assessment
    ClearCache,
    /// Validate the configuration file
    CheckConfig,
}

/// Everything a command needs, wired from configuration.
struct App {
    config: Config,
    cache: Arc<SpatialCache>,
    manual: Arc<ManualLocationStore>,
    resolver: LocationResolver<NoDeviceLocation>,
    risk: FireRiskService<PrimaryProvider, RegionalProvider>,
}

impl App {
    fn new(config: Config) -> Result<Self, AppError> {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&config.store_path())?);
        let cache = Arc::new(SpatialCache::from_config(Arc::clone(&store), &config.cache));
        let manual = Arc::new(ManualLocationStore::new(store));

        let resolver = LocationResolver::new(NoDeviceLocation, Arc::clone(&manual))
            .with_budgets((&config.timeouts).into())
            .with_default(&config.location);

        let providers = &config.providers;
        let risk = FireRiskService::new(
            PrimaryProvider::new(providers.primary_url.clone(), &providers.user_agent)?,
            RegionalProvider::new(providers.regional_url.clone(), &providers.user_agent)?,
            Arc::clone(&cache),
        )
        .with_budgets(TierBudgets::from(&config.timeouts));

        Ok(Self {
            config,
            cache,
            manual,
            resolver,
            risk,
        })
    }

    fn allow_default(&self, no_default: bool) -> bool {
        self.config.location.allow_default && !no_default
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    wildfire_core::init()?;

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), AppError> {
    if let Command::CheckConfig = args.command {
        return check_config(args.config);
    }

    let (config, _) = Config::load_validated(args.config.as_deref())?;
    let app = App::new(config)?;

    match args.command {
        Command::Risk {
            lat,
            lon,
            no_default,
        } => {
            let coord = match (lat, lon) {
                (Some(lat), Some(lon)) => Coordinate {
                    latitude: lat,
                    longitude: lon,
                },
                _ => app.resolver.resolve(app.allow_default(no_default)).await?,
            };
            let resolution = app.risk.get_current_detailed(coord).await?;
            print_resolution(&resolution);
        }
        Command::Locate { no_default } => {
            let resolved = app
                .resolver
                .resolve_detailed(app.allow_default(no_default))
                .await?;
            println!(
                "{:.4}, {:.4} ({:?})",
                resolved.coordinate.latitude, resolved.coordinate.longitude, resolved.source
            );
            if let Some(name) = resolved.place_name {
                println!("{}", name);
            }
        }
        Command::SetLocation { lat, lon, name } => {
            let coord = Coordinate::new(lat, lon).map_err(LocationError::from)?;
            let name = match name {
                Some(name) => Some(name),
                None => {
                    let providers = &app.config.providers;
                    reverse_geocode(&providers.geocode_url, &providers.user_agent, &coord).await
                }
            };
            let saved = app.manual.save(coord, name)?;
            println!(
                "Saved {:.4}, {:.4}{}",
                saved.coordinate.latitude,
                saved.coordinate.longitude,
                saved
                    .place_name
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default()
            );
        }
        Command::ShowLocation => match app.manual.load() {
            Some(saved) => {
                println!(
                    "{:.4}, {:.4}",
                    saved.coordinate.latitude, saved.coordinate.longitude
                );
                if let Some(name) = saved.place_name {
                    println!("{}", name);
                }
                println!("Saved {}", saved.saved_at.format("%Y-%m-%d %H:%M UTC"));
            }
            None => println!("No manual location saved"),
        },
        Command::ClearLocation => {
            app.manual.clear()?;
            println!("Manual location cleared");
        }
        Command::ClearCache => {
            let cells = app.cache.len();
            app.cache.clear()?;
            println!("Cleared {} cached cells", cells);
        }
        Command::CheckConfig => {}
    }

    Ok(())
}

fn check_config(path: Option<PathBuf>) -> Result<(), AppError> {
    let path = match path {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let config = Config::load_from(&path)?;
    let validation = config.validate();

    println!("Config: {}", path.display());
    for warning in &validation.warnings {
        println!("  warning: {}", warning);
    }
    for error in &validation.errors {
        println!("  error: {}", error);
    }

    if validation.is_valid() {
        println!("OK");
        Ok(())
    } else {
        Err(wildfire_core::ConfigError::Invalid(validation.error_summary()).into())
    }
}

fn print_resolution(resolution: &Resolution) {
    let assessment = &resolution.assessment;
    println!(
        "{} (index {:.1})",
        assessment.level().description(),
        assessment.numeric_index()
    );
    println!(
        "Source: {:?}, {:?}, observed {}",
        assessment.source(),
        assessment.freshness(),
        assessment.observed_at().format("%Y-%m-%d %H:%M UTC")
    );

    for attempt in &resolution.report.attempts {
        match &attempt.outcome {
            TierOutcome::Failed(e) => {
                println!("  {}: {} after {:?}", attempt.tier, e.kind(), attempt.elapsed)
            }
            TierOutcome::Skipped(reason) => println!("  {}: skipped ({})", attempt.tier, reason),
            TierOutcome::Miss => println!("  {}: miss", attempt.tier),
            TierOutcome::Hit => {}
        }
    }
}
