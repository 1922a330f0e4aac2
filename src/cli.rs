use crate::config::AnalyzerConfig;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Laravel OpenAPI Generator - Infer OpenAPI documentation from a Laravel application's source
#[derive(Parser, Debug)]
#[command(name = "openapi-from-laravel")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Laravel project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Route table as produced by `php artisan route:list --json`
    #[arg(short = 'r', long = "routes", value_name = "FILE")]
    pub routes: PathBuf,

    /// Configuration file (defaults to openapi-from-laravel.toml in the project)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Disable the documentation cache
    #[arg(long = "no-cache")]
    pub no_cache: bool,

    /// Cache directory, overriding the configured one
    #[arg(long = "cache-dir", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Route URI pattern to document, `*` as wildcard (repeatable)
    #[arg(short = 'p', long = "pattern", value_name = "PATTERN")]
    pub patterns: Vec<String>,

    /// Write the diagnostic report as JSON to this file
    #[arg(long = "diagnostics", value_name = "FILE")]
    pub diagnostics: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.project_path.is_dir() {
        anyhow::bail!(
            "Project path is not a directory: {}",
            args.project_path.display()
        );
    }

    info!("Project path: {}", args.project_path.display());
    info!("Route table: {}", args.routes.display());
    info!("Output format: {:?}", args.output_format);
    if let Some(ref output) = args.output_path {
        info!("Output file: {}", output.display());
    } else {
        info!("Output: stdout");
    }

    Ok(args)
}

/// Configuration file overlaid with the command-line flags
pub fn effective_config(args: &CliArgs) -> Result<AnalyzerConfig> {
    let mut config = AnalyzerConfig::resolve(&args.project_path, args.config.as_deref())
        .context("Failed to load configuration")?;
    if args.no_cache {
        config.cache_enabled = false;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_directory = dir.clone();
    }
    if !args.patterns.is_empty() {
        config.route_patterns = args.patterns.clone();
    }
    Ok(config)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    use crate::cache::DocumentationCache;
    use crate::class_resolver::ClassResolver;
    use crate::detector::ProjectDetector;
    use crate::diagnostics::DiagnosticCollector;
    use crate::extractor::analyzer::RouteAnalyzer;
    use crate::extractor::auth::AuthDetector;
    use crate::extractor::route_table;
    use crate::openapi_builder::OpenApiBuilder;
    use crate::scanner::{ClassIndex, FileScanner};
    use crate::schema_generator::SchemaGenerator;
    use crate::serializer::{serialize_diagnostics, serialize_json, serialize_yaml, write_to_file};

    info!("Starting OpenAPI document generation...");
    let root = args.project_path.clone();
    let mut diagnostics = DiagnosticCollector::new();

    // Step 1: Resolve configuration
    let config = effective_config(&args)?;
    let matcher = config.route_matcher()?;

    // Step 2: Detect framework and packages
    let detection = ProjectDetector::detect(&root).context("Failed to read composer.json")?;
    if detection.framework.is_none() {
        warn!("composer.json names neither Laravel nor Lumen; continuing anyway");
    }

    // Step 3: Scan for PHP files and index their classes
    info!("Scanning project directory...");
    let scan_result = FileScanner::new(root.clone()).scan()?;
    for warning in &scan_result.warnings {
        diagnostics.warning("scan", warning.clone());
    }
    info!("Found {} PHP files", scan_result.php_files.len());
    let index = ClassIndex::build(&root, &scan_result.php_files);
    debug!("Indexed {} classes", index.len());
    let resolver = ClassResolver::new(index)?;

    // Step 4: Load the route table
    let records =
        route_table::load_all(&args.routes, &config.extra_route_files, &root, &mut diagnostics)?;
    info!("Loaded {} route records", records.len());

    // Step 5: Analyze routes
    let cache_dir = config.cache_dir(&root);
    let cache = DocumentationCache::new(cache_dir, config.cache_enabled);
    let auth = AuthDetector::new(detection, config.default_auth.clone());
    let mut analyzer = RouteAnalyzer::new(resolver, cache, matcher.clone(), auth);
    let analyses = analyzer.analyze_routes(&records, &mut diagnostics);
    if analyses.is_empty() {
        warn!("No routes matched {:?}", config.route_patterns);
    }

    // Step 6: Build OpenAPI document
    info!("Building OpenAPI document...");
    let mut schema_gen = SchemaGenerator::new(analyzer.resources());
    let mut builder = OpenApiBuilder::new()
        .with_info(config.title.clone(), config.version.clone(), config.description.clone())
        .with_servers(config.servers.clone())
        .with_callbacks(config.callbacks.clone())
        .with_matcher(matcher);
    for analysis in &analyses {
        builder.add_route(analysis, &mut schema_gen);
    }
    let document = builder.build(schema_gen, analyzer.security_schemes());
    info!("OpenAPI document built successfully");

    // Step 7: Serialize to requested format
    info!("Serializing to {:?} format...", args.output_format);
    let content = match args.output_format {
        OutputFormat::Yaml => serialize_yaml(&document)?,
        OutputFormat::Json => serialize_json(&document)?,
    };

    // Step 8: Output to file or stdout
    if let Some(output_path) = &args.output_path {
        write_to_file(&content, output_path)?;
        info!("Successfully wrote OpenAPI document to {}", output_path.display());
    } else {
        println!("{}", content);
    }

    // Step 9: Diagnostics and summary
    let stats = analyzer.cache_stats();
    let report = diagnostics.finish();
    if let Some(path) = &args.diagnostics {
        write_to_file(&serialize_diagnostics(&report)?, path)?;
        info!("Wrote diagnostics to {}", path.display());
    }

    info!("Generation complete!");
    info!("Summary:");
    info!("  - Files scanned: {}", scan_result.php_files.len());
    info!("  - Routes documented: {}", analyses.len());
    info!("  - Schemas: {}", document.components.as_ref().map_or(0, |c| c.schemas.len()));
    info!("  - Cache: {} hits, {} misses", stats.hits, stats.misses);
    info!(
        "  - Diagnostics: {} errors, {} warnings",
        report.errors.len(),
        report.warnings.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("openapi-from-laravel.toml"),
            "title = \"Shop\"\nroute_patterns = [\"api/v1/*\"]\n",
        )
        .unwrap();

        let args = CliArgs::parse_from([
            "openapi-from-laravel",
            dir.path().to_str().unwrap(),
            "--routes",
            "routes.json",
            "--no-cache",
            "--pattern",
            "api/v2/*",
            "--pattern",
            "admin/*",
        ]);
        let config = effective_config(&args).unwrap();

        assert_eq!(config.title, "Shop");
        assert!(!config.cache_enabled);
        assert_eq!(config.route_patterns, vec!["api/v2/*", "admin/*"]);
    }

    #[test]
    fn test_rejects_missing_project() {
        let args = CliArgs::parse_from([
            "openapi-from-laravel",
            "/definitely/not/here",
            "-r",
            "routes.json",
        ]);
        assert!(parse_args_from_parsed(args).is_err());
    }
}
