//! Task resource cache CLI
//!
//! Entry point for the `resource-cache` command-line tool.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use resource_descriptor::{ArtifactDescriptor, ResourceRecord, ResourceType};
use resource_worker::{CacheCoordinator, CacheError, CancelToken, LocalDirStore};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use task_resource_cache::config::EffectiveConfig;
use task_resource_cache::logging;
use task_resource_cache::signal::{SignalHandler, EXIT_CODE_CANCELLED};

#[derive(Parser)]
#[command(name = "resource-cache")]
#[command(about = "Worker-side task resource cache", version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, short = 'c', global = true, env = "RESOURCE_CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Override cache.data_base_dir
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override store.root
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure a resource version is cached and print its cache directory
    Ensure {
        #[command(flatten)]
        resource: ResourceArgs,
    },

    /// Ensure a resource version is cached, then expose it under a directory
    Materialize {
        #[command(flatten)]
        resource: ResourceArgs,

        /// Task working directory to materialize into
        #[arg(long)]
        into: PathBuf,

        /// Force a materialization mode (hard_link, copy)
        #[arg(long)]
        mode: Option<String>,
    },

    /// Print the derived cache paths for a resource without touching disk
    Paths {
        #[command(flatten)]
        resource: ResourceArgs,
    },

    /// Remove expired versions of a resource
    Gc {
        /// Resource id
        #[arg(long)]
        id: u32,

        /// Log what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration with provenance
    Config,
}

#[derive(Args)]
struct ResourceArgs {
    /// Resource record JSON file (alternative to the individual flags)
    #[arg(long, conflicts_with_all = ["id", "full_name", "tenant", "update_time", "resource_type"])]
    record: Option<PathBuf>,

    /// Resource id
    #[arg(long)]
    id: Option<u32>,

    /// Fully qualified resource name, e.g. /etl/load.sh
    #[arg(long)]
    full_name: Option<String>,

    /// Tenant code
    #[arg(long)]
    tenant: Option<String>,

    /// Resource update time (RFC 3339)
    #[arg(long, value_parser = parse_update_time)]
    update_time: Option<DateTime<Utc>>,

    /// Resource type (file, udf)
    #[arg(long = "type", default_value = "file")]
    resource_type: String,
}

impl ResourceArgs {
    fn descriptor(&self) -> Result<ArtifactDescriptor, String> {
        if let Some(path) = &self.record {
            let contents = fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
            let record: ResourceRecord = serde_json::from_str(&contents)
                .map_err(|e| format!("invalid resource record {}: {}", path.display(), e))?;
            return Ok(ArtifactDescriptor::from_record(&record));
        }

        let resource_type = ResourceType::from_str(&self.resource_type)
            .ok_or_else(|| format!("unknown resource type: {}", self.resource_type))?;
        let id = self.id.ok_or("--id is required")?;
        let full_name = self.full_name.as_deref().ok_or("--full-name is required")?;
        let tenant = self.tenant.as_deref().ok_or("--tenant is required")?;
        let update_time = self.update_time.ok_or("--update-time is required")?;

        Ok(ArtifactDescriptor::new(
            resource_type,
            id,
            full_name,
            tenant,
            update_time,
        ))
    }
}

fn parse_update_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing(cli.verbose) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let config = load_config(&cli, None);

    match &cli.command {
        Commands::Ensure { resource } => run_ensure(&config, resource),
        Commands::Materialize {
            resource,
            into,
            mode,
        } => {
            let config = match mode {
                Some(mode) => load_config(&cli, Some(json!({"cache": {"materialize_mode": mode}}))),
                None => config,
            };
            run_materialize(&config, resource, into)
        }
        Commands::Paths { resource } => run_paths(&config, resource),
        Commands::Gc { id, dry_run } => {
            let config = if *dry_run {
                load_config(&cli, Some(json!({"cache": {"eviction_dry_run": true}})))
            } else {
                config
            };
            run_gc(&config, *id)
        }
        Commands::Config => print_json(&config),
    }
}

fn load_config(cli: &Cli, extra: Option<Value>) -> EffectiveConfig {
    let mut overrides = json!({});
    if let Some(dir) = &cli.data_dir {
        overrides["cache"]["data_base_dir"] = json!(dir.to_string_lossy());
    }
    if let Some(root) = &cli.store_root {
        overrides["store"]["root"] = json!(root.to_string_lossy());
    }
    if let Some(extra) = extra {
        overrides = task_resource_cache::config::deep_merge(overrides, extra);
    }
    let overrides = match overrides.as_object() {
        Some(map) if map.is_empty() => None,
        _ => Some(overrides),
    };

    match EffectiveConfig::build(cli.config.as_deref(), overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn build_coordinator(config: &EffectiveConfig) -> CacheCoordinator {
    let settings = config.cache_settings();
    let store_root = config.store_root();
    match (settings, store_root) {
        (Ok(settings), Ok(root)) => {
            CacheCoordinator::file_cache(settings, Arc::new(LocalDirStore::new(root)))
        }
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn descriptor_or_exit(resource: &ResourceArgs) -> ArtifactDescriptor {
    match resource.descriptor() {
        Ok(descriptor) => descriptor,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    }
}

fn install_signal_handler() -> CancelToken {
    let cancel = CancelToken::new();
    if let Err(e) = SignalHandler::new(cancel.clone()).install() {
        eprintln!("Failed to install signal handler: {}", e);
    }
    cancel
}

fn ensure_or_exit(cache: &CacheCoordinator, descriptor: &ArtifactDescriptor, cancel: &CancelToken) {
    if let Err(e) = cache.ensure_cached_with(descriptor, cancel) {
        eprintln!("Error: {}", e);
        let code = match e {
            CacheError::PopulationFailed {
                interrupted: true, ..
            } => EXIT_CODE_CANCELLED,
            _ => 1,
        };
        process::exit(code);
    }
}

fn run_ensure(config: &EffectiveConfig, resource: &ResourceArgs) {
    let descriptor = descriptor_or_exit(resource);
    let cache = build_coordinator(config);
    let cancel = install_signal_handler();

    ensure_or_exit(&cache, &descriptor, &cancel);

    print_json(&json!({
        "resource": descriptor.to_string(),
        "version": cache.version_stamp(&descriptor),
        "cache_dir": cache.cache_dir(&descriptor),
        "status": cache.status(),
    }));
}

fn run_materialize(config: &EffectiveConfig, resource: &ResourceArgs, into: &Path) {
    let descriptor = descriptor_or_exit(resource);
    let cache = build_coordinator(config);
    let cancel = install_signal_handler();

    ensure_or_exit(&cache, &descriptor, &cancel);

    if let Err(e) = cache.materialize(&descriptor, into) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    print_json(&json!({
        "resource": descriptor.to_string(),
        "cache_dir": cache.cache_dir(&descriptor),
        "reference": into,
        "mode": cache.settings().effective_materialize_mode().as_str(),
    }));
}

fn run_paths(config: &EffectiveConfig, resource: &ResourceArgs) {
    let descriptor = descriptor_or_exit(resource);
    let cache = build_coordinator(config);

    print_json(&json!({
        "resource": descriptor.to_string(),
        "parent_relative_path": descriptor.parent_relative_path,
        "version": cache.version_stamp(&descriptor),
        "cache_base_dir": cache.cache_base_dir(&descriptor),
        "download_dir": cache.download_dir(&descriptor),
        "resource_download_path": cache.resource_download_path(&descriptor),
        "cache_dir": cache.cache_dir(&descriptor),
    }));
}

fn run_gc(config: &EffectiveConfig, id: u32) {
    let cache = build_coordinator(config);
    // Only the id is used to locate the resource's versions.
    let descriptor = ArtifactDescriptor::new(ResourceType::File, id, "", "", Utc::now());

    match cache.clean_expired(&descriptor) {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
