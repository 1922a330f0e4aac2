//! Laravel OpenAPI Generator - OpenAPI documentation inferred from Laravel source code.
//!
//! The library analyzes a Laravel (or Lumen) application statically. Nothing is executed:
//! validation rules, response shapes and input reads are recovered from the PHP syntax trees
//! of FormRequests, API Resources, Fractal transformers and controllers.
//!
//! # Architecture
//!
//! 1. [`scanner`] - Finds PHP files and indexes the classes they declare
//! 2. [`parser`] - Parses PHP into an owned syntax tree
//! 3. [`class_resolver`] - Locates classes, parents, traits and enums on demand
//! 4. [`detector`] - Reads `composer.json` for the framework and auth/transformer packages
//! 5. [`rules`] - Recovers validation rules, including conditional ones
//! 6. [`type_inference`] - Turns rule lists into parameter types
//! 7. [`request_analyzer`], [`resource_analyzer`] - Request inputs and response shapes
//! 8. [`extractor`] - Route records, controller analysis and the per-route pipeline
//! 9. [`cache`] - Fingerprinted on-disk cache of analysis results
//! 10. [`schema_generator`], [`openapi_builder`] - Schema components and the final document
//! 11. [`serializer`] - YAML or JSON output
//!
//! # Example Usage
//!
//! ```no_run
//! use openapi_from_laravel::{
//!     cache::DocumentationCache,
//!     class_resolver::ClassResolver,
//!     config::RouteMatcher,
//!     detector::ProjectDetector,
//!     diagnostics::DiagnosticCollector,
//!     extractor::{analyzer::RouteAnalyzer, auth::AuthDetector, route_table},
//!     openapi_builder::OpenApiBuilder,
//!     scanner::{ClassIndex, FileScanner},
//!     schema_generator::SchemaGenerator,
//!     serializer::serialize_yaml,
//! };
//! use std::path::{Path, PathBuf};
//!
//! let root = PathBuf::from("./shop");
//! let files = FileScanner::new(root.clone()).scan().unwrap().php_files;
//! let resolver = ClassResolver::new(ClassIndex::build(&root, &files)).unwrap();
//! let detection = ProjectDetector::detect(&root).unwrap();
//!
//! let mut diagnostics = DiagnosticCollector::new();
//! let records = route_table::load_route_table(Path::new("routes.json")).unwrap();
//! let mut analyzer = RouteAnalyzer::new(
//!     resolver,
//!     DocumentationCache::disabled(),
//!     RouteMatcher::new(&["api/*".to_string()]).unwrap(),
//!     AuthDetector::new(detection, "sanctum"),
//! );
//! let analyses = analyzer.analyze_routes(&records, &mut diagnostics);
//!
//! let mut schema_gen = SchemaGenerator::new(analyzer.resources());
//! let mut builder = OpenApiBuilder::new();
//! for analysis in &analyses {
//!     builder.add_route(analysis, &mut schema_gen);
//! }
//! let document = builder.build(schema_gen, analyzer.security_schemes());
//! println!("{}", serialize_yaml(&document).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module.

pub mod cache;
pub mod class_resolver;
pub mod cli;
pub mod config;
pub mod detector;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod openapi_builder;
pub mod parser;
pub mod request_analyzer;
pub mod resource_analyzer;
pub mod rules;
pub mod scanner;
pub mod schema_generator;
pub mod serializer;
pub mod type_inference;
