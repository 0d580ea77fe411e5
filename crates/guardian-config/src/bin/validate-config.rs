//! Config validation CLI tool
//!
//! Validates a guardiand configuration file and reports any errors.

use guardian_config::{ConfigError, StoreBackend, CURRENT_CONFIG_VERSION};
use guardian_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a guardiand configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match guardian_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!(
                "  Store: {}",
                match config.service.store {
                    StoreBackend::Memory => "memory",
                    StoreBackend::Sqlite => "sqlite",
                }
            );
            println!("  Parents: {}", config.parents.len());
            println!("  Children: {}", config.children.len());
            println!("  Catalog apps: {}", config.apps.len());
            println!("  Saved policies: {}", config.policies.len());

            if !config.children.is_empty() {
                println!();
                println!("Children:");
                for child in &config.children {
                    println!(
                        "  - {} (age {}, parent {})",
                        child.name, child.age, child.parent_id
                    );
                }
            }

            if !config.apps.is_empty() {
                println!();
                println!("Catalog:");
                for app in &config.apps {
                    println!(
                        "  - {} [{}]: {} (ages {}+)",
                        app.id,
                        app.safety_badge.as_str(),
                        app.name,
                        app.age_rating
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
