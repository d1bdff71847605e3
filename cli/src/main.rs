use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use device_config_core::{DeviceId, format_id, parse_id_lenient};
use device_config_db::{
    DatabaseConfig, FulltextIndexEntry, ImportResolver, IndexBuilder, IndexEntry, IndexFlavor,
    IndexState, LocalFileSystem, TemplateCache, find_overlaps, load_device_config,
    relative_filename,
};
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "devcfg")]
#[command(about = "Build, lint and query device configuration databases")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the device index, rebuilding it if it is missing or stale.
    Index(IndexArgs),
    /// Check every document in a database and report all problems.
    Lint(LintArgs),
    /// Print the evaluated configuration of one device as JSON.
    Lookup(LookupArgs),
    /// Print a document with all imports inlined.
    Resolve(ResolveArgs),
    /// Search labels, descriptions and manufacturers.
    Search(SearchArgs),
    /// Show whether the index files are up to date.
    Status(StatusArgs),
}

/// Where the database lives: a config file or a devices directory.
#[derive(Debug, Args)]
struct DatabaseArgs {
    /// Path to a database config YAML file.
    #[arg(long, conflicts_with = "devices")]
    config: Option<PathBuf>,
    /// Devices directory of the embedded database.
    #[arg(long)]
    devices: Option<PathBuf>,
    /// Directory of user-supplied documents that win over embedded ones.
    #[arg(long)]
    priority: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct IndexArgs {
    #[command(flatten)]
    database: DatabaseArgs,
    /// Work on the full-text index instead of the compact one.
    #[arg(long)]
    fulltext: bool,
    /// Rebuild even if the index is fresh.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
struct LintArgs {
    #[command(flatten)]
    database: DatabaseArgs,
}

#[derive(Debug, Args)]
struct LookupArgs {
    #[command(flatten)]
    database: DatabaseArgs,
    /// Manufacturer id, e.g. 0x0086.
    #[arg(long)]
    manufacturer: String,
    /// Product type, e.g. 0x0002.
    #[arg(long)]
    product_type: String,
    /// Product id, e.g. 0x0064.
    #[arg(long)]
    product_id: String,
    /// Firmware version of the device, e.g. 1.10.
    #[arg(long, conflicts_with = "unversioned")]
    firmware: Option<String>,
    /// Only consider documents without a firmware range.
    #[arg(long)]
    unversioned: bool,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    /// Document to resolve.
    file: PathBuf,
    /// Database root for `~/` imports. May be repeated.
    #[arg(long)]
    root: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[command(flatten)]
    database: DatabaseArgs,
    /// Search terms; all of them must match.
    #[arg(required = true)]
    query: Vec<String>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    #[command(flatten)]
    database: DatabaseArgs,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Command::Index(args) => run_index(args),
        Command::Lint(args) => run_lint(args),
        Command::Lookup(args) => run_lookup(args),
        Command::Resolve(args) => run_resolve(args),
        Command::Search(args) => run_search(args),
        Command::Status(args) => run_status(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(log_level: &str) -> Result<(), String> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Unknown log level '{other}'")),
    };

    // Logs go to stderr so that JSON output on stdout stays parseable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| format!("Failed to install logger: {err}"))
}

fn database_config(args: &DatabaseArgs) -> Result<DatabaseConfig, String> {
    let mut config = match (&args.config, &args.devices) {
        (Some(path), _) => DatabaseConfig::load(path)
            .map_err(|err| format!("Failed to load '{}': {err}", path.display()))?,
        (None, Some(devices)) => DatabaseConfig::new(devices),
        (None, None) => return Err("Specify either --config or --devices".to_string()),
    };
    if let Some(priority) = &args.priority {
        config.priority_dir = Some(priority.clone());
    }
    if !config.devices_dir.is_dir() {
        return Err(format!(
            "Devices directory '{}' does not exist",
            config.devices_dir.display()
        ));
    }
    Ok(config)
}

fn run_index(args: IndexArgs) -> Result<(), String> {
    let config = database_config(&args.database)?;
    if args.fulltext {
        index_with::<FulltextIndexEntry>(&config, &config.fulltext_index_path(), args.force)
    } else {
        index_with::<IndexEntry>(&config, &config.index_path(), args.force)
    }
}

fn index_with<E: IndexFlavor>(config: &DatabaseConfig, index_path: &Path, force: bool) -> Result<(), String> {
    let builder = config.index_builder();

    if force {
        let entries = builder.rebuild::<E>(index_path).map_err(|e| e.to_string())?;
        println!("Wrote {} entries to '{}'.", entries.len(), index_path.display());
        return Ok(());
    }

    let loaded = builder.load::<E>(index_path).map_err(|e| e.to_string())?;
    match loaded.state {
        IndexState::Fresh => println!(
            "'{}' is up to date with {} entries.",
            index_path.display(),
            loaded.entries.len()
        ),
        state => println!(
            "Index was {state}; wrote {} entries to '{}'.",
            loaded.entries.len(),
            index_path.display()
        ),
    }
    Ok(())
}

/// Prefixes `message` with `filename` unless it already starts with it.
fn qualify(filename: &str, message: &str) -> String {
    if message.starts_with(&format!("{filename}: ")) {
        message.to_string()
    } else {
        format!("{filename}: {message}")
    }
}

fn run_lint(args: LintArgs) -> Result<(), String> {
    let config = database_config(&args.database)?;
    let devices_dir = &config.devices_dir;
    let builder = config.index_builder();
    let paths = builder.document_paths().map_err(|e| e.to_string())?;

    let cache = TemplateCache::new();
    let resolver = ImportResolver::new(&LocalFileSystem)
        .with_root_dir(devices_dir)
        .with_cache(&cache);

    let mut problems = Vec::new();
    let mut entries = Vec::new();
    for path in &paths {
        let filename = relative_filename(devices_dir, path);
        debug!(file = %filename, "linting");
        let evaluated = load_device_config(&resolver, devices_dir, path, true)
            .and_then(|document| document.evaluate(None).map_err(Into::into));
        match evaluated {
            Ok(device) => entries.extend(IndexEntry::extract_entries(&device, &filename, devices_dir)),
            Err(err) => problems.push(qualify(&filename, &err.to_string())),
        }
    }

    for overlap in find_overlaps(&entries) {
        problems.push(format!("{}: {overlap}", overlap.second.filename));
    }

    for problem in &problems {
        println!("{problem}");
    }
    println!(
        "Checked {} document(s), found {} problem(s).",
        paths.len(),
        problems.len()
    );

    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!("{} problem(s) found", problems.len()))
    }
}

fn parse_id_arg(flag: &str, raw: &str) -> Result<u16, String> {
    parse_id_lenient(raw).ok_or_else(|| format!("--{flag} '{raw}' is not a valid id"))
}

fn run_lookup(args: LookupArgs) -> Result<(), String> {
    let config = database_config(&args.database)?;
    let mut device = DeviceId::new(
        parse_id_arg("manufacturer", &args.manufacturer)?,
        parse_id_arg("product-type", &args.product_type)?,
        parse_id_arg("product-id", &args.product_id)?,
    );
    if let Some(firmware) = args.firmware {
        device = device.with_firmware(firmware);
    }

    let mut db = config.builder().build();
    db.load_index().map_err(|e| e.to_string())?;
    let found = if args.unversioned {
        db.lookup_unversioned(&device)
    } else {
        db.lookup_device(&device)
    };
    let found = found.map_err(|e| e.to_string())?;

    let Some(device_config) = found else {
        return Err(format!("No device configuration found for {device}"));
    };
    let raw = serde_json::to_string_pretty(&device_config)
        .map_err(|err| format!("Failed to serialize device configuration: {err}"))?;
    println!("{raw}");
    Ok(())
}

fn run_resolve(args: ResolveArgs) -> Result<(), String> {
    let resolver = ImportResolver::new(&LocalFileSystem).with_root_dirs(&args.root);
    let document = resolver.resolve(&args.file).map_err(|e| e.to_string())?;
    let raw = serde_json::to_string_pretty(&document)
        .map_err(|err| format!("Failed to serialize document: {err}"))?;
    println!("{raw}");
    Ok(())
}

fn run_search(args: SearchArgs) -> Result<(), String> {
    let config = database_config(&args.database)?;
    let mut db = config.builder().build();
    db.load_fulltext_index().map_err(|e| e.to_string())?;

    let query = args.query.join(" ");
    let hits = db.search(&query).map_err(|e| e.to_string())?;
    if hits.is_empty() {
        println!("No devices match '{query}'.");
        return Ok(());
    }
    for hit in hits {
        println!(
            "{}:{}:{}  {} {} ({})  [{}]  {}",
            format_id(hit.manufacturer_id),
            format_id(hit.product_type),
            format_id(hit.product_id),
            hit.manufacturer,
            hit.label,
            hit.description,
            hit.firmware_version,
            hit.filename
        );
    }
    Ok(())
}

fn describe_index<E: IndexFlavor>(builder: &IndexBuilder<'_>, index_path: &Path) -> Result<String, String> {
    let state = builder.state::<E>(index_path).map_err(|e| e.to_string())?;
    if state == IndexState::Missing {
        return Ok(format!("{}: {state}", index_path.display()));
    }
    let modified = std::fs::metadata(index_path)
        .and_then(|meta| meta.modified())
        .map_err(|err| format!("Failed to stat '{}': {err}", index_path.display()))?;
    let modified: DateTime<Utc> = modified.into();
    Ok(format!(
        "{}: {state} (modified {})",
        index_path.display(),
        modified.to_rfc3339()
    ))
}

fn run_status(args: StatusArgs) -> Result<(), String> {
    let config = database_config(&args.database)?;
    let builder = config.index_builder();
    let documents = builder.document_paths().map_err(|e| e.to_string())?;

    println!("Devices directory: {}", config.devices_dir.display());
    println!("Documents: {}", documents.len());
    println!("{}", describe_index::<IndexEntry>(&builder, &config.index_path())?);
    println!(
        "{}",
        describe_index::<FulltextIndexEntry>(&builder, &config.fulltext_index_path())?
    );
    if let Some(priority) = &config.priority_dir {
        println!("Priority directory: {}", priority.display());
    }
    Ok(())
}
