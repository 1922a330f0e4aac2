//! Laravel OpenAPI Generator - Command-line tool for generating OpenAPI documentation.
//!
//! The route table comes from the application itself; everything else is inferred from the
//! PHP sources without running them.
//!
//! # Usage
//!
//! ```bash
//! openapi-from-laravel [OPTIONS] --routes <FILE> <PROJECT_PATH>
//! ```
//!
//! # Examples
//!
//! Generate YAML documentation:
//! ```bash
//! php artisan route:list --json > routes.json
//! openapi-from-laravel ./shop --routes routes.json -o openapi.yaml
//! ```
//!
//! Generate JSON documentation for versioned routes only, keeping a diagnostic report:
//! ```bash
//! openapi-from-laravel ./shop -r routes.json -f json -p 'api/v2/*' --diagnostics report.json
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_from_laravel::cli;

fn main() -> Result<()> {
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    info!("Laravel OpenAPI Generator starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    info!("OpenAPI document generation completed successfully");

    Ok(())
}
