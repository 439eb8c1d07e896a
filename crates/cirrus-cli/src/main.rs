//! cirrus: command-line client for Cirrus Drive.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cirrus_core::Config;
use cirrus_drive::folders::CreateFolderRequest;
use cirrus_transfer::Engine;

#[derive(Parser)]
#[command(name = "cirrus", version, about = "Encrypted Cirrus Drive client")]
struct Cli {
    /// Path to the config file (default: ~/.config/cirrus/cirrus.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a local file into a Drive folder
    Upload {
        path: PathBuf,
        /// Target folder UUID (default: account root)
        #[arg(long)]
        folder: Option<String>,
    },
    /// Download a file by its network file id
    Download {
        file_id: String,
        output: PathBuf,
    },
    /// List folders and files under a folder
    Ls {
        /// Folder UUID (default: account root)
        folder: Option<String>,
    },
    /// Create a folder
    Mkdir {
        name: String,
        /// Parent folder UUID (default: account root)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a file by UUID
    Rm { uuid: String },
    /// Rename a file by UUID
    Rename {
        uuid: String,
        new_name: String,
        /// New extension; keeps the old one when omitted
        #[arg(long)]
        r#type: Option<String>,
    },
    /// Show account usage against its limit
    Usage,
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => dirs_config_path()?,
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config: {}", path.display()))
}

fn dirs_config_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".config/cirrus/cirrus.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config)?;
    let root = cfg.root_folder_uuid.clone();
    let engine = Engine::new(cfg)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Upload { path, folder } => {
            let folder = folder.unwrap_or(root);
            let meta = engine.upload_file(&cancel, &path, &folder).await?;
            println!("{}  {}", meta.uuid, meta.plain_name);
            // fire-and-forget thumbnails must outlive the foreground call
            engine.wait_pending_thumbnails().await;
        }
        Command::Download { file_id, output } => {
            let bytes = engine.download_to_path(&cancel, &file_id, &output).await?;
            println!("{bytes} bytes -> {}", output.display());
        }
        Command::Ls { folder } => {
            let folder = folder.unwrap_or(root);
            let drive = engine.drive();
            for f in drive.list_all_folders(&cancel, &folder).await? {
                println!("d {}  {}", f.uuid, f.display_name());
            }
            for f in drive.list_all_files(&cancel, &folder).await? {
                let name = if f.file_type.is_empty() {
                    f.plain_name.clone()
                } else {
                    format!("{}.{}", f.plain_name, f.file_type)
                };
                println!("- {}  {}  {}", f.uuid, name, f.size_bytes());
            }
        }
        Command::Mkdir { name, parent } => {
            let folder = engine
                .drive()
                .create_folder(
                    &cancel,
                    CreateFolderRequest {
                        plain_name: name,
                        parent_folder_uuid: parent.unwrap_or(root),
                        creation_time: String::new(),
                        modification_time: String::new(),
                    },
                )
                .await?;
            println!("{}", folder.uuid);
        }
        Command::Rm { uuid } => {
            engine.drive().delete_file(&cancel, &uuid).await?;
            println!("deleted {uuid}");
        }
        Command::Rename {
            uuid,
            new_name,
            r#type,
        } => {
            engine
                .drive()
                .rename_file(&cancel, &uuid, &new_name, r#type.as_deref())
                .await?;
            println!("renamed {uuid}");
        }
        Command::Usage => {
            let drive = engine.drive();
            let usage = drive.get_usage(&cancel).await?;
            let limit = drive.get_limit(&cancel).await?;
            println!("{} / {} bytes", usage.drive, limit.max_space_bytes);
        }
    }

    Ok(())
}
