//! Loading the externally supplied route table.
//!
//! The main table failing to load is fatal ([`Error::RouteTableUnavailable`]). Additional
//! route files are best effort: a broken one is recorded as a `RouteFileLoad` diagnostic and
//! the routes already loaded are kept.

use super::RouteRecord;
use crate::diagnostics::DiagnosticCollector;
use crate::error::{Error, Result};
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A bare array of routes or an object wrapping one under `routes`
#[derive(Deserialize)]
#[serde(untagged)]
enum RouteFile {
    List(Vec<RouteRecord>),
    Wrapped { routes: Vec<RouteRecord> },
}

fn read_routes(path: &Path) -> std::result::Result<Vec<RouteRecord>, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let parsed: RouteFile = serde_json::from_str(&content).map_err(|e| e.to_string())?;
    Ok(match parsed {
        RouteFile::List(routes) | RouteFile::Wrapped { routes } => routes,
    })
}

/// Load the main route table.
///
/// # Errors
///
/// Returns [`Error::RouteTableUnavailable`] if the file cannot be read or parsed; nothing can
/// be documented without it.
pub fn load_route_table(path: &Path) -> Result<Vec<RouteRecord>> {
    let routes = read_routes(path).map_err(|message| {
        Error::RouteTableUnavailable(format!("{}: {}", path.display(), message))
    })?;
    info!("Loaded {} routes from {}", routes.len(), path.display());
    Ok(routes)
}

/// Load one additional route file
pub fn load_route_file(path: &Path) -> Result<Vec<RouteRecord>> {
    read_routes(path).map_err(|message| Error::RouteFileLoad {
        file: path.to_path_buf(),
        message,
    })
}

/// Load the main table followed by every extra file.
///
/// Relative extra paths are resolved against `base`. Records whose URI and methods were
/// already seen are skipped, the first occurrence winning.
pub fn load_all(
    main: &Path,
    extras: &[PathBuf],
    base: &Path,
    diagnostics: &mut DiagnosticCollector,
) -> Result<Vec<RouteRecord>> {
    let mut routes = load_route_table(main)?;

    for extra in extras {
        let path = if extra.is_absolute() {
            extra.clone()
        } else {
            base.join(extra)
        };
        match load_route_file(&path) {
            Ok(more) => {
                debug!("Loaded {} additional routes from {}", more.len(), path.display());
                for record in more {
                    let duplicate = routes.iter().any(|r| {
                        r.uri.trim_start_matches('/') == record.uri.trim_start_matches('/')
                            && r.http_methods == record.http_methods
                    });
                    if !duplicate {
                        routes.push(record);
                    }
                }
            }
            Err(e) => diagnostics.record("routes", &e),
        }
    }

    Ok(routes)
}
