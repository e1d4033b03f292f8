//! Config command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use cr_core::config::{self, ConfigFile};

fn resolve_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Print the configuration file path
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing built-in defaults; run 'courier config init' to create one");
        println!();
        println!("{}", toml::to_string_pretty(&ConfigFile::default())?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Initialize default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let config_file = resolve_path(config_path);

    if let Some(config_dir) = config_file.parent() {
        if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
            std::fs::create_dir_all(config_dir).with_context(|| {
                format!("Failed to create config directory: {:?}", config_dir)
            })?;
            print_success(&format!("Created config directory: {:?}", config_dir));
        }
    }

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    std::fs::write(&config_file, default_config_template())
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));
    Ok(())
}

/// Get a config value by dotted key (e.g. `client.url`)
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_error(&format!("Config file not found: {:?}", path));
        print_info("Run 'courier config init' to create one");
        return Ok(());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let table: toml::Table =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let mut current = &toml::Value::Table(table);
    for part in key.split('.') {
        match current.get(part) {
            Some(value) => current = value,
            None => {
                print_error(&format!("Key not found: {}", key));
                return Ok(());
            }
        }
    }

    match current {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(current)?),
        other => println!("{}", other),
    }
    Ok(())
}

/// Set a config value by dotted key.
///
/// The edited file must still load as a valid configuration; otherwise it
/// is left untouched.
pub fn config_set(config_path: Option<&PathBuf>, key: &str, value: &str) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_info("Creating default configuration...");
        config_init(config_path, false)?;
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let mut table: toml::Table =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let parts: Vec<&str> = key.split('.').collect();
    let (last_key, parents) = parts
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("Invalid key: key path cannot be empty"))?;

    let mut current = &mut table;
    for part in parents {
        current = current
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("Cannot navigate to key: {}", key))?;
    }
    current.insert(last_key.to_string(), parse_value(value));

    let new_content = toml::to_string_pretty(&table)?;
    toml::from_str::<ConfigFile>(&new_content)
        .with_context(|| format!("Refusing to write invalid value for {}", key))?;

    std::fs::write(&path, new_content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Set {} = {}", key, value));
    Ok(())
}

/// Interpret a command-line value as the most specific TOML type
fn parse_value(value: &str) -> toml::Value {
    if let Ok(b) = value.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = value.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        toml::Value::Float(f)
    } else if let Some(toml::Value::Array(items)) =
        toml::from_str::<toml::Table>(&format!("v = {}", value))
            .ok()
            .and_then(|mut t| t.remove("v"))
    {
        toml::Value::Array(items)
    } else {
        toml::Value::String(value.to_string())
    }
}

/// Commented default configuration written by `config init`
fn default_config_template() -> String {
    r#"# courier configuration

[client]
# Relay URL (ws:// or wss://)
url = "ws://localhost:7502/"

# Identifier sent as the clientID query parameter (random Client-<n> if unset)
# client_id = "relay-client"

# Bearer credential for the handshake and the login envelope
# credential = "your-auth-token-here"

# "from" field of outgoing envelopes (defaults to the client ID)
# sender = "relay-client"

# "to" field and subject prefix for session traffic
recipient = "server"
subject = "Test message"

# Timeouts in seconds (fractions allowed)
connect_timeout = 45
login_timeout = 5
request_timeout = 5
logout_timeout = 5
close_grace = 5

# Pause between traffic cycles, in seconds
cycle_delay = 1

# Number of traffic cycles (0 = until interrupted)
cycles = 5

# Envelope types cycled through during the session
traffic = ["msg", "log", "heartbeat"]

# Reply matching: "next-inbound" or "strict" (id/replyTo)
correlation = "next-inbound"

# Session attempts made with --reconnect (0 = unlimited)
max_attempts = 5

[client.backoff]
# Initial retry delay in seconds
initial = 1
# Maximum retry delay in seconds
max = 60
# Backoff multiplier
multiplier = 2.0
# Jitter factor
jitter = 0.25

[swarm]
# Number of concurrent clients
clients = 3
# Seconds between fan-out rounds
interval = 1
# Number of rounds (0 = until interrupted)
ticks = 10
# Extra recipient appended to every fan-out
# extra_recipient = "1234567890"
"#
    .to_string()
}
