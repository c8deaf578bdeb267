//! Configuration view and validation commands: `pulse config`.

use anyhow::{Context, Result};

use super::super::ConfigCommands;

pub fn cmd_config(
    project_dir: &std::path::Path,
    command: Option<ConfigCommands>,
    base_url_override: Option<&str>,
) -> Result<()> {
    use pulse::config::{CONFIG_DIR, CONFIG_FILE, PulseConfig, PulseToml};

    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Pulse Configuration");
            println!("===================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No pulse.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = PulseToml::load_or_default(&config_dir)
                .with_context(|| format!("Failed to load {}", config_path.display()))?;
            print_toml(&toml);

            // Show effective values (including env/CLI overrides)
            println!("Effective values (with env/CLI overrides):");
            let mut config = PulseConfig::load(project_dir)?;
            if let Some(url) = base_url_override {
                config.toml.server.base_url = url.to_string();
            }
            println!("  base_url = \"{}\"", config.server().base_url);
            println!("  enable_fallback = {}", config.progress().enable_fallback);
            println!(
                "  polling_interval_ms = {}",
                config.progress().polling_interval_ms
            );
            println!(
                "  heartbeat_check_interval_ms = {}",
                config
                    .progress()
                    .reconnect_policy()
                    .heartbeat_check_interval()
                    .as_millis()
            );
            println!();

            if !config_path.exists() {
                println!("Run 'pulse config init' to create a pulse.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No pulse.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = PulseToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("pulse.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            PulseToml::default().save(&config_path)?;

            println!("Created pulse.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] base_url and endpoint paths");
            println!("  - [progress] reconnect, heartbeat and polling settings");
            println!("  - [logging] format and log file");
            println!();
        }
    }

    Ok(())
}

fn print_toml(toml: &pulse::config::PulseToml) {
    let server = &toml.server;
    println!("[server]");
    println!("  base_url = \"{}\"", server.base_url);
    println!("  stream_path = \"{}\"", server.stream_path);
    println!("  status_path = \"{}\"", server.status_path);
    println!("  results_path = \"{}\"", server.results_path);
    println!("  request_timeout_ms = {}", server.request_timeout_ms);
    println!();

    let progress = &toml.progress;
    println!("[progress]");
    println!("  reconnect_interval_ms = {}", progress.reconnect_interval_ms);
    println!("  max_reconnect_attempts = {}", progress.max_reconnect_attempts);
    println!("  heartbeat_timeout_ms = {}", progress.heartbeat_timeout_ms);
    if let Some(check) = progress.heartbeat_check_interval_ms {
        println!("  heartbeat_check_interval_ms = {}", check);
    }
    println!("  polling_interval_ms = {}", progress.polling_interval_ms);
    println!("  auto_connect = {}", progress.auto_connect);
    println!("  enable_fallback = {}", progress.enable_fallback);
    println!();

    println!("[logging]");
    println!("  format = \"{}\"", toml.logging.format);
    if let Some(file) = &toml.logging.file {
        println!("  file = \"{}\"", file.display());
    }
    println!();
}
