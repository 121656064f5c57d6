use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use log_query_engine::{
    config::Config,
    error::{AppError, Result},
    search::{
        create_backends, read_records, scoped_query, AggregationRequest, BackendKind, SearchMode,
        SearchQuery, SearchService, SortDirection, SortField, DEFAULT_PAGE, DEFAULT_SIZE,
    },
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lqe-cli")]
#[command(about = "Log Query Engine CLI", long_about = None)]
struct Cli {
    /// Newline-delimited JSON log records to search
    #[arg(short, long, env = "LQE_RECORDS")]
    records: PathBuf,

    /// Search backend: memory or tantivy
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Tantivy index directory (in RAM when omitted)
    #[arg(long)]
    index_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Literal substring search on the message
    Quick {
        text: String,

        #[arg(short, long, default_value_t = DEFAULT_PAGE)]
        page: u32,

        #[arg(short, long, default_value_t = DEFAULT_SIZE)]
        size: u32,
    },

    /// Full search, from a JSON query file or from flags
    Search {
        /// Query text (ignored with --query-file)
        text: Option<String>,

        /// JSON-encoded query
        #[arg(short = 'f', long)]
        query_file: Option<PathBuf>,

        #[arg(short, long)]
        mode: Option<SearchMode>,

        #[arg(short, long = "level")]
        levels: Vec<String>,

        #[arg(long = "source")]
        sources: Vec<String>,

        #[arg(long = "host")]
        hosts: Vec<String>,

        #[arg(short, long = "application")]
        applications: Vec<String>,

        #[arg(short, long = "environment")]
        environments: Vec<String>,

        /// Extra constraint as FIELD=VALUE
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Sort key as FIELD[:asc|desc]
        #[arg(long = "sort")]
        sort: Vec<String>,

        /// Terms aggregation over FIELD
        #[arg(long = "terms")]
        terms: Vec<String>,

        #[arg(long)]
        from: Option<DateTime<Utc>>,

        #[arg(long)]
        to: Option<DateTime<Utc>>,

        #[arg(short, long, default_value_t = DEFAULT_PAGE)]
        page: u32,

        #[arg(short, long, default_value_t = DEFAULT_SIZE)]
        size: u32,

        #[arg(long)]
        time_zone: Option<String>,

        #[arg(long)]
        stack_trace: bool,

        #[arg(long)]
        metadata: bool,

        #[arg(long)]
        case_sensitive: bool,

        #[arg(long)]
        no_highlight: bool,
    },

    /// Error-level records in a time window
    Errors {
        /// Window length ending now, used when --from/--to are absent
        #[arg(long, default_value = "24")]
        hours: i64,

        #[arg(long)]
        from: Option<DateTime<Utc>>,

        #[arg(long)]
        to: Option<DateTime<Utc>>,

        #[arg(short, long, default_value_t = DEFAULT_PAGE)]
        page: u32,

        #[arg(short, long, default_value_t = DEFAULT_SIZE)]
        size: u32,
    },

    /// Records of one application in one environment
    Scoped {
        application: String,

        environment: String,

        /// Narrow the scope with query text
        #[arg(short, long)]
        text: Option<String>,

        #[arg(long)]
        from: Option<DateTime<Utc>>,

        #[arg(long)]
        to: Option<DateTime<Utc>>,

        #[arg(short, long, default_value_t = DEFAULT_PAGE)]
        page: u32,

        #[arg(short, long, default_value_t = DEFAULT_SIZE)]
        size: u32,
    },

    /// Highlighted pattern search
    Pattern {
        pattern: String,

        #[arg(short, long, default_value = "wildcard")]
        mode: SearchMode,

        #[arg(long)]
        from: Option<DateTime<Utc>>,

        #[arg(long)]
        to: Option<DateTime<Utc>>,

        #[arg(short, long, default_value_t = DEFAULT_PAGE)]
        page: u32,

        #[arg(short, long, default_value_t = DEFAULT_SIZE)]
        size: u32,
    },

    /// List searchable fields
    Fields,

    /// Known values of a field
    Suggest {
        #[arg(value_name = "FIELD")]
        field: String,

        #[arg(short, long, default_value = "")]
        prefix: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "log_query_engine=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("error[{}]: {}", err.error_code(), err);
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
    }
    if cli.index_path.is_some() {
        config.backend.index_path = cli.index_path.clone();
    }

    let service = open_service(&cli.records, &config).await?;

    match cli.command {
        Commands::Quick { text, page, size } => {
            print_json(&service.quick_search(&text, page, size).await?)?;
        }

        Commands::Search {
            text,
            query_file,
            mode,
            levels,
            sources,
            hosts,
            applications,
            environments,
            filters,
            sort,
            terms,
            from,
            to,
            page,
            size,
            time_zone,
            stack_trace,
            metadata,
            case_sensitive,
            no_highlight,
        } => {
            let query = match query_file {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => {
                    let mut builder = SearchQuery::builder(text.unwrap_or_default())
                        .with_levels(levels)
                        .with_sources(sources)
                        .with_hosts(hosts)
                        .with_applications(applications)
                        .with_environments(environments)
                        .with_time_range(from, to)
                        .with_page(page)
                        .with_size(size)
                        .with_stack_trace(stack_trace)
                        .with_metadata(metadata)
                        .with_case_sensitive(case_sensitive)
                        .with_highlight(!no_highlight);
                    if let Some(mode) = mode {
                        builder = builder.with_mode(mode);
                    }
                    if let Some(time_zone) = time_zone {
                        builder = builder.with_time_zone(time_zone);
                    }
                    for filter in &filters {
                        let (field, value) = parse_filter(filter)?;
                        builder = builder.with_filter(field, value);
                    }
                    for key in &sort {
                        builder = builder.with_sort(parse_sort(key)?);
                    }
                    for field in terms {
                        builder = builder.with_aggregation(AggregationRequest::terms(field.clone(), field));
                    }
                    builder.build()
                }
            };
            print_json(&service.search(&query).await?)?;
        }

        Commands::Errors {
            hours,
            from,
            to,
            page,
            size,
        } => {
            let end = to.unwrap_or_else(Utc::now);
            let start = from.unwrap_or_else(|| end - Duration::hours(hours));
            print_json(&service.search_errors(start, end, page, size).await?)?;
        }

        Commands::Scoped {
            application,
            environment,
            text,
            from,
            to,
            page,
            size,
        } => {
            let response = match text {
                Some(text) => {
                    let query = scoped_query(application, environment, from, to, page, size)
                        .to_builder()
                        .with_text(text)
                        .build();
                    service.search(&query).await?
                }
                None => {
                    service
                        .search_scoped(&application, &environment, from, to, page, size)
                        .await?
                }
            };
            print_json(&response)?;
        }

        Commands::Pattern {
            pattern,
            mode,
            from,
            to,
            page,
            size,
        } => {
            print_json(&service.search_pattern(&pattern, mode, from, to, page, size).await?)?;
        }

        Commands::Fields => {
            print_json(&service.available_fields())?;
        }

        Commands::Suggest {
            field,
            prefix,
            limit,
        } => {
            print_json(&service.field_suggestions(&field, &prefix, limit).await?)?;
        }
    }

    Ok(())
}

async fn open_service(records: &Path, config: &Config) -> Result<SearchService> {
    let backends = create_backends(&config.backend, &config.search).await?;
    backends.load(read_records(records)?).await?;
    Ok(backends.into_service(config.search.clone())?)
}

fn parse_filter(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .filter(|(field, _)| !field.trim().is_empty())
        .map(|(field, value)| (field.trim(), value.trim()))
        .ok_or_else(|| AppError::Validation(format!("filter '{}' is not FIELD=VALUE", raw)))
}

fn parse_sort(raw: &str) -> Result<SortField> {
    match raw.split_once(':') {
        Some((field, direction)) => {
            let direction = SortDirection::from_str(direction)
                .map_err(|_| AppError::Validation(format!("unknown sort direction '{}'", direction)))?;
            Ok(SortField::new(field, direction))
        }
        None => Ok(SortField::descending(raw)),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
