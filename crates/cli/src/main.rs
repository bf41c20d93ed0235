use anyhow::Context;
use clap::{Parser, Subcommand};
use photoport_core::{
    backup::{BackupExecutor, StopSignal},
    config::BackupConfig,
    device::{DeviceManager, MountedMedia},
    scanner::{FileCategory, FileScanner},
    store::FingerprintStore,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "photoport")]
#[command(about = "iPhone photo and video backup tool")]
#[command(version, author)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up photos and videos from the device
    Backup {
        /// Destination root (defaults to the configured directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// AFC mount point of the device media tree
        #[arg(long)]
        mount: Option<PathBuf>,
    },
    /// List connected devices
    Devices,
    /// Show device information
    Info {
        /// Device UDID (auto-detect if not specified)
        #[arg(short, long)]
        udid: Option<String>,
    },
    /// List the files a backup would consider, without copying
    Scan {
        /// AFC mount point of the device media tree
        #[arg(long)]
        mount: Option<PathBuf>,
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect the fingerprint store
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Show store statistics
    Stats {
        /// Backup root holding the store (defaults to the configured directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List recorded entries
    List {
        /// Backup root holding the store (defaults to the configured directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum number of entries to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = BackupConfig::load()?;

    match cli.command {
        Commands::Backup { output, mount } => run_backup(config, output, mount).await,
        Commands::Devices => list_devices(),
        Commands::Info { udid } => show_device_info(udid),
        Commands::Scan { mount, json } => run_scan(config, mount, json),
        Commands::Store { command } => handle_store_command(config, command),
    }
}

async fn run_backup(
    config: BackupConfig,
    output: Option<PathBuf>,
    mount: Option<PathBuf>,
) -> anyhow::Result<()> {
    let dest_root = output.unwrap_or_else(|| config.backup_root());
    let media = open_media(&config, mount)?;

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nStop requested, finishing the current file...");
        handler_stop.trigger();
    })
    .context("failed to install Ctrl-C handler")?;

    info!("Backing up {} -> {}", media.root().display(), dest_root.display());

    let executor = BackupExecutor::new(config)?;
    let stats = executor.run(&media, &dest_root, &stop).await?;

    println!("Backup summary");
    println!("==============");
    println!("Copied:             {}", stats.copied);
    println!("Duplicates skipped: {}", stats.skipped_duplicate);
    println!("Excluded:           {}", stats.skipped_excluded);
    println!("Errors:             {}", stats.errors);
    println!("Bytes copied:       {}", stats.bytes_copied);
    println!("Destination:        {}", dest_root.display());

    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let manager = DeviceManager::new();
    let devices = manager.list_devices()?;

    if devices.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    println!("Connected devices:");
    for device in devices {
        println!("  - {}", device.udid);
    }

    Ok(())
}

fn show_device_info(udid: Option<String>) -> anyhow::Result<()> {
    let manager = DeviceManager::new();
    let udid = match udid {
        Some(udid) => udid,
        None => manager.get_default_device()?,
    };

    let info = manager.get_device_info(&udid)?;

    println!("Device Information:");
    println!("===================");
    println!("Name:        {}", info.name);
    println!("Model:       {}", info.model);
    println!("iOS Version: {}", info.ios_version);
    println!("Serial:      {}", info.serial);
    println!("UDID:        {}", info.udid);

    Ok(())
}

fn run_scan(config: BackupConfig, mount: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let media = open_media(&config, mount)?;
    let scanner = FileScanner::new(&config)?;
    let result = scanner.scan(&media)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.files)?);
        return Ok(());
    }

    for file in &result.files {
        let category = match file.category {
            FileCategory::Photo => "photo",
            FileCategory::Video => "video",
        };
        println!("{:<6} {:>12}  {}", category, file.size, file.source_path);
    }

    let stats = scanner.category_stats(&result.files);
    println!();
    println!(
        "{} photos, {} videos, {} excluded",
        stats.get(&FileCategory::Photo).copied().unwrap_or(0),
        stats.get(&FileCategory::Video).copied().unwrap_or(0),
        result.skipped_excluded
    );

    Ok(())
}

fn handle_store_command(config: BackupConfig, command: StoreCommands) -> anyhow::Result<()> {
    match command {
        StoreCommands::Stats { output } => {
            let store = open_store(&config, output)?;

            println!("Fingerprint store");
            println!("=================");
            println!("Path:    {}", store.path().display());
            println!("Entries: {}", store.len());
            if let Some(latest) = store.iter().map(|e| e.backed_up_at).max() {
                println!("Latest:  {}", latest.to_rfc3339());
            }
        }
        StoreCommands::List { output, limit } => {
            let store = open_store(&config, output)?;

            if store.is_empty() {
                println!("No fingerprints recorded in {}", store.path().display());
                return Ok(());
            }

            for entry in store.iter().take(limit) {
                println!(
                    "{}  {}  {}",
                    entry.fingerprint,
                    entry.backed_up_at.to_rfc3339(),
                    entry.dest_path.display()
                );
            }

            if store.len() > limit {
                println!("... and {} more", store.len() - limit);
            }
        }
    }

    Ok(())
}

fn open_media(config: &BackupConfig, mount: Option<PathBuf>) -> anyhow::Result<MountedMedia> {
    let mount = mount
        .or_else(|| config.device.media_mount.as_ref().map(PathBuf::from))
        .context("no media mount given; pass --mount or set device.media_mount in the config")?;

    Ok(MountedMedia::new(mount)?)
}

fn open_store(config: &BackupConfig, output: Option<PathBuf>) -> anyhow::Result<FingerprintStore> {
    let root = output.unwrap_or_else(|| config.backup_root());
    Ok(FingerprintStore::open(root.join(&config.backup.index_file))?)
}
