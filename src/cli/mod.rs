//! Command-line interface.
//!
//! - no subcommand or `serve` - run the HTTP server
//! - `create-admin` - create a superadmin account in the configured store
//! - `config check` - validate the configuration file and print a summary

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clinic_admin::api::auth::create_account;
use clinic_admin::api::validation::{validate_email, validate_password_strength};
use clinic_admin::config::Config;
use clinic_admin::db::{self, Repositories, UserRole, WriteOutcome};

#[derive(Parser, Debug)]
#[command(name = "clinic-admin")]
#[command(author, version, about = "Scheduling administration for a psychology clinic", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "clinic.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Create a superadmin account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "Administrator")]
        name: String,
        /// Password (can also be set via CLINIC_ADMIN_PASSWORD)
        #[arg(long, env = "CLINIC_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

impl Cli {
    pub fn runs_server(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }
}

/// Run a non-server command
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::CreateAdmin {
            email,
            name,
            password,
        }) => cmd_create_admin(config, email, name, password).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli, config),
        None | Some(Commands::Serve) => Ok(()),
    }
}

async fn cmd_create_admin(config: &Config, email: &str, name: &str, password: &str) -> Result<()> {
    if let Err(e) = validate_email(email) {
        bail!("{}", e);
    }
    if let Err(e) = validate_password_strength(password) {
        bail!("{}", e);
    }

    let store = db::init(&config.store).await?;
    let repos = Repositories::new(store);

    match create_account(&repos, email, name, password, UserRole::Superadmin)
        .await
        .context("Failed to create superadmin")?
    {
        WriteOutcome::Committed(user) => {
            println!("[OK] Created superadmin {} ({})", user.email, user.id);
            Ok(())
        }
        _ => bail!("A user with email {} already exists", email),
    }
}

fn cmd_config_check(cli: &Cli, config: &Config) -> Result<()> {
    println!("Checking configuration file: {}", cli.config.display());
    println!();

    if !cli.config.exists() {
        println!("[!!] Configuration file not found: {}", cli.config.display());
        println!("A default configuration will be used when starting the server.");
        println!();
    } else {
        println!("[OK] Configuration file is valid!");
        println!();
    }

    println!("=== Configuration Summary ===");
    println!();
    println!("Server:");
    println!("  Address:      {}:{}", config.server.host, config.server.port);
    println!("  Static Dir:   {}", config.server.static_dir.display());
    println!();
    println!("Store:");
    println!("  Backend:      {:?}", config.store.backend);
    println!("  Data Dir:     {}", config.store.data_dir.display());
    println!();
    println!("Auth:");
    println!("  Cookie:       {}", config.auth.session_cookie);
    println!("  Session TTL:  {}h", config.auth.session_ttl_hours);
    println!("  Secure:       {}", config.auth.secure_cookie);
    match &config.auth.bootstrap_admin {
        Some(admin) => println!("  Bootstrap:    {}", admin.email),
        None => println!("  Bootstrap:    (none)"),
    }
    println!();
    println!("Access:");
    println!("  Login:        {}", config.access.login_path);
    println!("  Public:       {}", config.access.public_paths.join(", "));
    println!("  Superadmin:   {}", config.access.superadmin_paths.join(", "));
    println!();
    println!("Logging:");
    println!("  Level:        {}", config.logging.level);

    Ok(())
}
