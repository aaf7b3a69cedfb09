use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filevault::config::{self, Config, ENV_KEY};
use filevault::{Cipher, Key, Vault};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use zeroize::Zeroizing;

/// FileVault - Streaming AES-CBC file encryption for local storage disks
#[derive(Parser)]
#[command(name = "filevault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (falls back to FILEVAULT_CONFIG, then config.json)
    #[arg(short, long)]
    config: Option<String>,

    /// Encryption key, raw or prefixed with "base64:"
    #[arg(short, long, global = true, env = ENV_KEY, hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a configuration file with a single local disk
    Init {
        /// Storage directory path
        #[arg(short, long, default_value = "./storage")]
        storage_dir: String,

        /// Cipher used for new keys and operations
        #[arg(long, default_value = "AES-256-CBC")]
        cipher: Cipher,
    },

    /// Generate a random key and print it
    Keygen {
        /// Cipher the key is generated for (defaults to the configured cipher)
        #[arg(long)]
        cipher: Option<Cipher>,
    },

    /// Encrypt a file stored on a disk
    Encrypt {
        /// File name on the disk
        name: String,

        /// Destination name (defaults to <name>.enc)
        #[arg(short, long)]
        dest: Option<String>,

        /// Keep the source file after encrypting
        #[arg(long)]
        keep: bool,

        /// Disk to operate on (defaults to the configured default disk)
        #[arg(long)]
        disk: Option<String>,
    },

    /// Decrypt a file stored on a disk
    Decrypt {
        /// Encrypted file name on the disk
        name: String,

        /// Destination name (defaults to <name> without .enc, or <name>.dec)
        #[arg(short, long)]
        dest: Option<String>,

        /// Keep the encrypted file after decrypting
        #[arg(long)]
        keep: bool,

        /// Disk to operate on (defaults to the configured default disk)
        #[arg(long)]
        disk: Option<String>,
    },

    /// Decrypt a file to stdout
    Cat {
        /// Encrypted file name on the disk
        name: String,

        /// Disk to operate on (defaults to the configured default disk)
        #[arg(long)]
        disk: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Use RUST_LOG environment variable to control log level (e.g., RUST_LOG=info,filevault=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "FileVault starting");

    let key = cli.key.map(Zeroizing::new);

    match cli.command {
        Commands::Init {
            storage_dir,
            cipher,
        } => {
            let config_path = config::config_path(cli.config.as_deref())
                .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
            cmd_init(&config_path, &storage_dir, cipher).await
        }

        Commands::Keygen { cipher } => cmd_keygen(cli.config.as_deref(), cipher),

        Commands::Encrypt {
            name,
            dest,
            keep,
            disk,
        } => {
            cmd_transform(
                cli.config.as_deref(),
                key,
                disk,
                Operation::Encrypt,
                &name,
                dest.as_deref(),
                !keep,
            )
            .await
        }

        Commands::Decrypt {
            name,
            dest,
            keep,
            disk,
        } => {
            cmd_transform(
                cli.config.as_deref(),
                key,
                disk,
                Operation::Decrypt,
                &name,
                dest.as_deref(),
                !keep,
            )
            .await
        }

        Commands::Cat { name, disk } => cmd_cat(cli.config.as_deref(), key, disk, &name).await,
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Encrypt,
    Decrypt,
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn load_key(text: Option<Zeroizing<String>>, cipher: Cipher) -> Result<Key> {
    let text = text.with_context(|| format!("no key supplied: pass --key or set {}", ENV_KEY))?;
    let key = Key::parse(&text, cipher).context("loading encryption key")?;
    Ok(key)
}

/// Write a configuration file
async fn cmd_init(config_path: &str, storage_dir: &str, cipher: Cipher) -> Result<()> {
    if fs::try_exists(config_path).await.unwrap_or(false) {
        anyhow::bail!(
            "Configuration file '{}' already exists. Remove it first or use a different path.",
            config_path
        );
    }

    let mut cfg = Config::new("local", storage_dir);
    cfg.cipher = cipher;

    fs::create_dir_all(storage_dir)
        .await
        .with_context(|| format!("creating storage directory '{}'", storage_dir))?;

    let config_json = serde_json::to_string_pretty(&cfg)?;
    fs::write(config_path, config_json)
        .await
        .with_context(|| format!("writing config to '{}'", config_path))?;

    println!("Initialization complete!");
    println!("Config:  {}", config_path);
    println!("Storage: {}", storage_dir);
    println!("Cipher:  {}", cipher);
    println!();
    println!("Generate a key with `filevault keygen` and keep it somewhere safe.");
    println!("Without it, your encrypted files cannot be recovered.");

    Ok(())
}

/// Generate and print a fresh key
fn cmd_keygen(config_path: Option<&str>, cipher: Option<Cipher>) -> Result<()> {
    let cipher = match cipher {
        Some(cipher) => cipher,
        None => Config::load_with_env(config_path)?.cipher,
    };

    let key = Key::make(cipher);
    println!("{}", key.export().as_str());
    eprintln!("Generated {} key. Store it securely; it is not saved anywhere.", cipher);
    Ok(())
}

/// Encrypt or decrypt a file on a disk
async fn cmd_transform(
    config_path: Option<&str>,
    key: Option<Zeroizing<String>>,
    disk: Option<String>,
    operation: Operation,
    name: &str,
    dest: Option<&str>,
    delete_source: bool,
) -> Result<()> {
    let cfg = Config::load_with_env(config_path)?;
    let disks = cfg.disks();
    let mut vault = Vault::new(load_key(key, cfg.cipher)?, &disks);
    if let Some(disk) = disk {
        vault.disk(disk);
    }

    let spinner = create_spinner(&format!("{:?}ing {}...", operation, name))?;
    let result = match operation {
        Operation::Encrypt => vault.encrypt(name, dest, delete_source).await,
        Operation::Decrypt => vault.decrypt(name, dest, delete_source).await,
    };

    match result {
        Ok(written) => {
            spinner.finish_with_message(format!("{:?}ed {} -> {}", operation, name, written));
            if !delete_source {
                println!("  kept source '{}'", name);
            }
            Ok(())
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e).with_context(|| format!("{:?} of '{}' failed", operation, name))
        }
    }
}

/// Decrypt a file to stdout
async fn cmd_cat(
    config_path: Option<&str>,
    key: Option<Zeroizing<String>>,
    disk: Option<String>,
    name: &str,
) -> Result<()> {
    let cfg = Config::load_with_env(config_path)?;
    let disks = cfg.disks();
    let mut vault = Vault::new(load_key(key, cfg.cipher)?, &disks);
    if let Some(disk) = disk {
        vault.disk(disk);
    }

    let mut stdout = tokio::io::stdout();
    let bytes = vault
        .stream_decrypt(name, &mut stdout)
        .await
        .with_context(|| format!("decrypting '{}'", name))?;
    stdout.flush().await?;

    eprintln!("Decrypted {} bytes to stdout", bytes);
    Ok(())
}
