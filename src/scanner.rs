use anyhow::Result;
use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Directories (relative to the project root) that never contain application classes
const SKIPPED_DIRS: &[&str] = &["vendor", "node_modules", "storage", "bootstrap/cache"];

static NAMESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*namespace\s+([A-Za-z0-9_\\]+)\s*[;{]").expect("valid namespace regex")
});

static DECLARATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:(?:abstract|final|readonly)\s+)*(?:class|interface|trait|enum)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("valid declaration regex")
});

/// File scanner for traversing a Laravel project.
///
/// The `FileScanner` recursively walks the project directory to find all PHP source files.
/// It skips dependency and runtime directories (`vendor`, `node_modules`, `storage`,
/// `bootstrap/cache`) and hidden directories.
///
/// # Example
///
/// ```no_run
/// use openapi_from_laravel::scanner::FileScanner;
/// use std::path::PathBuf;
///
/// let scanner = FileScanner::new(PathBuf::from("./my-laravel-app"));
/// let result = scanner.scan().unwrap();
/// println!("Found {} PHP files", result.php_files.len());
/// ```
pub struct FileScanner {
    root_path: PathBuf,
}

/// Result of directory scanning operation.
pub struct ScanResult {
    /// List of paths to all discovered `.php` files
    pub php_files: Vec<PathBuf>,
    /// Warning messages for any issues encountered (e.g., inaccessible directories)
    pub warnings: Vec<String>,
}

impl FileScanner {
    /// Creates a new `FileScanner` for the specified project root.
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Scans the directory tree and collects all `.php` files.
    ///
    /// If any directories or files cannot be accessed, warnings are logged and added to
    /// the result, but scanning continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be accessed.
    pub fn scan(&self) -> Result<ScanResult> {
        let mut php_files = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                // Don't filter the root directory itself
                if e.path() == self.root_path {
                    return true;
                }

                let file_name = e.file_name().to_string_lossy();
                if file_name.starts_with('.') {
                    return false;
                }

                let relative = e
                    .path()
                    .strip_prefix(&self.root_path)
                    .unwrap_or(e.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                !(e.file_type().is_dir() && SKIPPED_DIRS.contains(&relative.as_str()))
            })
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("php") {
                        php_files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        debug!("Found {} PHP files under {}", php_files.len(), self.root_path.display());
        Ok(ScanResult {
            php_files,
            warnings,
        })
    }
}

/// Maps fully-qualified class names to the files declaring them.
///
/// Built from a cheap regex pre-scan of every file (namespace plus class/interface/trait/enum
/// declarations) so that no file has to be fully parsed just to be located. Lookups are
/// case-insensitive like PHP class names. Classes missing from the index fall back to the
/// PSR-4 convention `App\Foo\Bar` → `app/Foo/Bar.php`.
#[derive(Debug, Default, Clone)]
pub struct ClassIndex {
    root: PathBuf,
    entries: HashMap<String, PathBuf>,
}

impl ClassIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: HashMap::new(),
        }
    }

    /// Builds the index from a scan of the project root
    pub fn build(root: &Path, files: &[PathBuf]) -> Self {
        let mut index = Self::new(root);
        for file in files {
            match fs::read_to_string(file) {
                Ok(source) => index.index_source(file, &source),
                Err(e) => warn!("Failed to read {} while indexing: {}", file.display(), e),
            }
        }
        debug!("Indexed {} class declarations", index.entries.len());
        index
    }

    /// Registers every declaration found in `source`
    pub fn index_source(&mut self, path: &Path, source: &str) {
        let namespace = NAMESPACE_PATTERN
            .captures(source)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_matches('\\').to_string());

        for capture in DECLARATION_PATTERN.captures_iter(source) {
            let Some(name) = capture.get(1) else {
                continue;
            };
            let fqcn = match &namespace {
                Some(ns) => format!("{}\\{}", ns, name.as_str()),
                None => name.as_str().to_string(),
            };
            self.insert(&fqcn, path.to_path_buf());
        }
    }

    pub fn insert(&mut self, fqcn: &str, path: PathBuf) {
        self.entries
            .insert(fqcn.trim_start_matches('\\').to_ascii_lowercase(), path);
    }

    /// Locates the file declaring `fqcn`
    pub fn locate(&self, fqcn: &str) -> Option<PathBuf> {
        let fqcn = fqcn.trim_start_matches('\\');
        if let Some(path) = self.entries.get(&fqcn.to_ascii_lowercase()) {
            return Some(path.clone());
        }

        let relative = fqcn.strip_prefix("App\\")?;
        let candidate = self
            .root
            .join("app")
            .join(format!("{}.php", relative.replace('\\', "/")));
        candidate.is_file().then_some(candidate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_normal_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("index.php"), "<?php echo 1;").unwrap();
        fs::write(root.join("helpers.php"), "<?php function x() {}").unwrap();
        fs::write(root.join("readme.md"), "# README").unwrap();

        let scanner = FileScanner::new(root.to_path_buf());
        let result = scanner.scan().unwrap();

        assert_eq!(result.php_files.len(), 2);
        assert!(result.warnings.is_empty());

        let file_names: Vec<String> = result
            .php_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(file_names.contains(&"index.php".to_string()));
        assert!(file_names.contains(&"helpers.php".to_string()));
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = FileScanner::new(temp_dir.path().to_path_buf());
        let result = scanner.scan().unwrap();

        assert_eq!(result.php_files.len(), 0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_scan_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("app/Http/Requests")).unwrap();
        fs::create_dir_all(root.join("app/Models")).unwrap();
        fs::write(root.join("app/Http/Requests/StoreUser.php"), "<?php").unwrap();
        fs::write(root.join("app/Models/User.php"), "<?php").unwrap();

        let scanner = FileScanner::new(root.to_path_buf());
        let result = scanner.scan().unwrap();

        assert_eq!(result.php_files.len(), 2);
    }

    #[test]
    fn test_scan_skips_vendor_storage_and_hidden_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("vendor/laravel")).unwrap();
        fs::create_dir_all(root.join("storage/framework")).unwrap();
        fs::create_dir_all(root.join("bootstrap/cache")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("vendor/laravel/Foo.php"), "<?php").unwrap();
        fs::write(root.join("storage/framework/view.php"), "<?php").unwrap();
        fs::write(root.join("bootstrap/cache/services.php"), "<?php").unwrap();
        fs::write(root.join("bootstrap/app.php"), "<?php").unwrap();
        fs::write(root.join(".git/hook.php"), "<?php").unwrap();
        fs::write(root.join("artisan.php"), "<?php").unwrap();

        let scanner = FileScanner::new(root.to_path_buf());
        let result = scanner.scan().unwrap();

        let mut names: Vec<String> = result
            .php_files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        names.sort();
        assert_eq!(names, vec!["artisan.php", "bootstrap/app.php"]);
    }

    #[test]
    fn test_class_index_prescan() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let file = root.join("Requests.php");
        fs::write(
            &file,
            "<?php\nnamespace App\\Http\\Requests;\n\nabstract class BaseRequest {}\nfinal class StoreUserRequest extends BaseRequest {}\nenum Mode: string { case A = 'a'; }\n",
        )
        .unwrap();

        let index = ClassIndex::build(root, &[file.clone()]);

        assert_eq!(index.len(), 3);
        assert_eq!(index.locate("App\\Http\\Requests\\StoreUserRequest"), Some(file.clone()));
        assert_eq!(index.locate("\\app\\http\\requests\\mode"), Some(file));
        assert!(index.locate("App\\Http\\Requests\\Missing").is_none());
    }

    #[test]
    fn test_class_index_psr4_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("app/Http/Resources")).unwrap();
        let file = root.join("app/Http/Resources/UserResource.php");
        fs::write(&file, "<?php").unwrap();

        let index = ClassIndex::new(root);
        assert_eq!(index.locate("App\\Http\\Resources\\UserResource"), Some(file));
        assert!(index.locate("Vendor\\Package\\Thing").is_none());
    }
}
