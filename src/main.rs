use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use ibmvpc::cloud_tools::CloudTools;
use ibmvpc::config::Config;
use ibmvpc::vpc::{describe_error, ArrayKey, Collection, KeyDetector, QueryParams, VpcClient};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// List IBM Cloud VPC resources
#[derive(Parser, Debug)]
#[command(name = "ibmvpc", version = ibmvpc::VERSION, about, long_about = None)]
struct Args {
    /// VPC region (e.g. us-south, eu-de)
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// API version date (YYYY-MM-DD)
    #[arg(long, global = true)]
    api_version: Option<String>,

    /// API generation
    #[arg(long, global = true)]
    generation: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every virtual server instance in the region
    Instances {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Show one virtual server instance
    Instance {
        /// Instance ID
        id: String,
    },
    /// List any collection by API path (volumes, subnets, vpcs, ...)
    List {
        /// Collection path under /v1
        path: String,

        /// Response field holding the items (detected when omitted)
        #[arg(long)]
        array_key: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },
    /// Show or save the effective configuration
    Config {
        /// Persist region/version/generation flags to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(clap::Args, Debug)]
struct PageArgs {
    /// Page size requested from the API
    #[arg(long)]
    limit: Option<u32>,

    /// Resume from this cursor
    #[arg(long)]
    start: Option<String>,

    /// Fail instead of guessing when a page has several candidate item fields
    #[arg(long)]
    strict: bool,
}

impl PageArgs {
    fn params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        if let Some(limit) = self.limit {
            params.insert("limit".to_string(), limit.to_string());
        }
        if let Some(start) = &self.start {
            params.insert("start".to_string(), start.clone());
        }
        params
    }

    fn detector(&self) -> KeyDetector {
        if self.strict {
            KeyDetector::ExactlyOne
        } else {
            KeyDetector::FirstRemaining
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One JSON document per line
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("ibmvpc started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("ibmvpc").join("ibmvpc.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".ibmvpc").join("ibmvpc.log");
    }
    PathBuf::from("ibmvpc.log")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        tracing::error!("{:?}", err);
        eprintln!("Error: {}", describe_error(&err));
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load();
    let region = config.effective_region(args.region.as_deref());
    let version = config.effective_version(args.api_version.as_deref());
    let generation = config.effective_generation(args.generation.as_deref());

    if let Command::Config { save } = &args.command {
        if *save {
            config.region = Some(region.clone());
            config.api_version = version.clone();
            config.generation = generation.clone();
            config.save()?;
        }
        return print_all(&[serde_json::to_value(&config)?], args.output);
    }

    tracing::info!("Using region: {}", region);

    let cloudtools = CloudTools::from_env()?;
    let client = VpcClient::new(cloudtools, &region, version.as_deref(), generation.as_deref());

    match &args.command {
        Command::Instances { page } => {
            let instances = client
                .instances()
                .with_array_key(ArrayKey::Detect(page.detector()));
            print_collection(&instances, page.params(), args.output).await
        }
        Command::Instance { id } => {
            let instance = client.instances().get(id).await?;
            print_all(&[instance], args.output)
        }
        Command::List {
            path,
            array_key,
            page,
        } => {
            let key = match array_key {
                Some(key) => ArrayKey::Named(key.clone()),
                None => ArrayKey::Detect(page.detector()),
            };
            let collection = client.collection(path).with_array_key(key);
            print_collection(&collection, page.params(), args.output).await
        }
        Command::Config { .. } => Ok(()),
    }
}

async fn print_collection(
    collection: &Collection<'_>,
    params: QueryParams,
    output: OutputFormat,
) -> Result<()> {
    let mut items = Box::pin(collection.each(params));

    match output {
        OutputFormat::Json => {
            let stdout = std::io::stdout();
            let mut count = 0usize;
            while let Some(item) = items.try_next().await? {
                let mut out = stdout.lock();
                serde_json::to_writer(&mut out, &item)?;
                writeln!(out)?;
                count += 1;
            }
            tracing::info!("Listed {} {}", count, collection.path());
            Ok(())
        }
        OutputFormat::Yaml => {
            let all: Vec<Value> = items.try_collect().await?;
            tracing::info!("Listed {} {}", all.len(), collection.path());
            print_all(&all, output)
        }
    }
}

fn print_all(items: &[Value], output: OutputFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match output {
        OutputFormat::Json => {
            for item in items {
                serde_json::to_writer(&mut out, item)?;
                writeln!(out)?;
            }
        }
        OutputFormat::Yaml => {
            write!(out, "{}", serde_yaml::to_string(items)?)?;
        }
    }
    Ok(())
}
