use crate::error::{Error, Result};
use crate::parser::ast::{ClassDecl, EnumDecl, MethodDecl};
use crate::parser::{ParsedFile, PhpParser};
use crate::scanner::ClassIndex;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Class resolver - locates, parses and memoises the PHP classes referenced during analysis.
///
/// Files are parsed lazily the first time one of their classes is requested. A class that is
/// not in the index resolves to `Ok(None)` (a missing class), a file that does not parse
/// resolves to `Err(ParseFailure)`; both outcomes are remembered so a file is read at most once
/// per run.
pub struct ClassResolver {
    index: ClassIndex,
    parser: PhpParser,
    /// Parsed files indexed by their path
    files: HashMap<PathBuf, Rc<ParsedFile>>,
    /// Parse failures indexed by path, kept to avoid re-parsing broken files
    failures: HashMap<PathBuf, String>,
    /// Files loaded while at least one [`track`](ClassResolver::track) call is running
    touched: Vec<PathBuf>,
    tracking: usize,
}

/// A class declaration together with the file it lives in
#[derive(Debug, Clone)]
pub struct ResolvedClass {
    /// Fully qualified class name
    pub fqcn: String,
    pub file: Rc<ParsedFile>,
    position: usize,
}

impl ResolvedClass {
    /// Wrap a class declared in an already parsed file
    pub fn from_parsed(file: Rc<ParsedFile>, short: &str) -> Option<Self> {
        let position = file
            .ast
            .classes
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(short))?;
        Some(Self {
            fqcn: file.ast.qualified_name(&file.ast.classes[position].name),
            file,
            position,
        })
    }

    pub fn decl(&self) -> &ClassDecl {
        &self.file.ast.classes[self.position]
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn short_name(&self) -> &str {
        &self.decl().name
    }

    /// Resolve a class reference written inside this class (`self`/`static` are the class
    /// itself, `parent` is the extended class)
    pub fn resolve_name(&self, name: &str) -> String {
        match name.to_ascii_lowercase().as_str() {
            "self" | "static" => self.fqcn.clone(),
            "parent" => match &self.decl().extends {
                Some(parent) => self.file.resolve_class_name(parent),
                None => name.to_string(),
            },
            _ => self.file.resolve_class_name(name),
        }
    }

    /// Fully qualified name of the extended class, if any
    pub fn parent_name(&self) -> Option<String> {
        self.decl()
            .extends
            .as_ref()
            .map(|p| self.file.resolve_class_name(p))
    }
}

/// An enum declaration together with the file it lives in
#[derive(Debug, Clone)]
pub struct ResolvedEnum {
    pub fqcn: String,
    pub file: Rc<ParsedFile>,
    position: usize,
}

impl ResolvedEnum {
    pub fn decl(&self) -> &EnumDecl {
        &self.file.ast.enums[self.position]
    }

    /// Backed values of every case, or case names for pure enums
    pub fn values(&self) -> Vec<serde_json::Value> {
        self.decl()
            .cases
            .iter()
            .map(|case| match &case.value {
                Some(value) => value.to_json(),
                None => serde_json::Value::from(case.name.as_str()),
            })
            .collect()
    }

    /// `integer` for int-backed enums, `string` otherwise
    pub fn value_type(&self) -> &'static str {
        match self.decl().backing_type.as_deref() {
            Some("int") => "integer",
            _ => "string",
        }
    }
}

impl ClassResolver {
    /// Create a new ClassResolver over a class index
    pub fn new(index: ClassIndex) -> Result<Self> {
        debug!("Initializing ClassResolver with {} indexed classes", index.len());
        Ok(Self {
            index,
            parser: PhpParser::new()?,
            files: HashMap::new(),
            failures: HashMap::new(),
            touched: Vec::new(),
            tracking: 0,
        })
    }

    pub fn index(&self) -> &ClassIndex {
        &self.index
    }

    /// Number of files parsed so far
    pub fn parsed_count(&self) -> usize {
        self.files.len()
    }

    /// Run `f` and return, next to its result, every file it loaded through this resolver
    /// (memoised loads included). Calls may nest.
    pub fn track<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> (T, Vec<PathBuf>) {
        let mark = self.touched.len();
        self.tracking += 1;
        let value = f(self);
        self.tracking -= 1;

        let mut files = Vec::new();
        for path in &self.touched[mark..] {
            push_unique_path(&mut files, path);
        }
        if self.tracking == 0 {
            self.touched.clear();
        }
        (value, files)
    }

    /// Parse (or fetch the memoised parse of) a file
    pub fn load_file(&mut self, path: &Path) -> Result<Rc<ParsedFile>> {
        if self.tracking > 0 {
            self.touched.push(path.to_path_buf());
        }
        if let Some(parsed) = self.files.get(path) {
            return Ok(Rc::clone(parsed));
        }
        if let Some(message) = self.failures.get(path) {
            return Err(Error::ParseFailure {
                file: path.to_path_buf(),
                message: message.clone(),
            });
        }

        match self.parser.parse_file(path) {
            Ok(parsed) => {
                let parsed = Rc::new(parsed);
                self.files.insert(path.to_path_buf(), Rc::clone(&parsed));
                Ok(parsed)
            }
            Err(Error::ParseFailure { file, message }) => {
                self.failures.insert(path.to_path_buf(), message.clone());
                Err(Error::ParseFailure { file, message })
            }
            Err(e) => Err(e),
        }
    }

    /// Find a class, trait or interface by fully qualified name
    pub fn find_class(&mut self, fqcn: &str) -> Result<Option<ResolvedClass>> {
        let fqcn = fqcn.trim_start_matches('\\');
        let Some(path) = self.index.locate(fqcn) else {
            debug!("Class {} not found in index", fqcn);
            return Ok(None);
        };

        let file = self.load_file(&path)?;
        Ok(ResolvedClass::from_parsed(
            file,
            crate::parser::ast::short_name(fqcn),
        ))
    }

    /// Like [`find_class`](Self::find_class) but maps a missing class to `MissingClass`
    pub fn require_class(&mut self, fqcn: &str) -> Result<ResolvedClass> {
        self.find_class(fqcn)?
            .ok_or_else(|| Error::MissingClass(fqcn.trim_start_matches('\\').to_string()))
    }

    /// Find an enum by fully qualified name
    pub fn find_enum(&mut self, fqcn: &str) -> Result<Option<ResolvedEnum>> {
        let fqcn = fqcn.trim_start_matches('\\');
        let Some(path) = self.index.locate(fqcn) else {
            return Ok(None);
        };

        let file = self.load_file(&path)?;
        let short = crate::parser::ast::short_name(fqcn);
        let position = file
            .ast
            .enums
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(short));

        Ok(position.map(|position| ResolvedEnum {
            fqcn: file.ast.qualified_name(&file.ast.enums[position].name),
            file,
            position,
        }))
    }

    /// Backed values of an enum, `None` when it cannot be resolved
    pub fn enum_values(&mut self, fqcn: &str) -> Option<Vec<serde_json::Value>> {
        match self.find_enum(fqcn) {
            Ok(Some(resolved)) => Some(resolved.values()),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not resolve enum {}: {}", fqcn, e);
                None
            }
        }
    }

    /// Resolve the class a given class extends
    pub fn parent_of(&mut self, class: &ResolvedClass) -> Result<Option<ResolvedClass>> {
        match class.parent_name() {
            Some(parent) => self.find_class(&parent),
            None => Ok(None),
        }
    }

    /// Whether `fqcn` extends `ancestor`, directly or transitively.
    ///
    /// `ancestor` may be fully qualified or a short name; the chain stops at the first class
    /// outside the project (framework classes are matched by name only) or on a cycle.
    pub fn is_subclass_of(&mut self, fqcn: &str, ancestor: &str) -> bool {
        let target = ancestor.trim_start_matches('\\');
        let mut current = fqcn.trim_start_matches('\\').to_string();
        let mut seen = HashSet::new();

        loop {
            if !seen.insert(current.to_ascii_lowercase()) {
                warn!("Circular inheritance detected at {}", current);
                return false;
            }
            let class = match self.find_class(&current) {
                Ok(Some(class)) => class,
                Ok(None) => return false,
                Err(e) => {
                    warn!("Could not inspect {}: {}", current, e);
                    return false;
                }
            };
            let Some(parent) = class.parent_name() else {
                return false;
            };
            if class_names_match(&parent, target) {
                return true;
            }
            current = parent;
        }
    }

    /// Files a class's behaviour depends on: its own file, then those of its traits and of
    /// every ancestor found in the project
    pub fn dependency_files(&mut self, class: &ResolvedClass) -> Vec<PathBuf> {
        let mut files = vec![class.path().to_path_buf()];
        let mut current = class.clone();
        let mut seen = HashSet::new();
        while seen.insert(current.fqcn.to_ascii_lowercase()) {
            for name in current.decl().traits.iter().map(|t| current.resolve_name(t)) {
                if let Ok(Some(used)) = self.find_class(&name) {
                    push_unique_path(&mut files, used.path());
                }
            }
            match self.parent_of(&current) {
                Ok(Some(parent)) => {
                    push_unique_path(&mut files, parent.path());
                    current = parent;
                }
                _ => break,
            }
        }
        files
    }

    /// Find a method on a class, its traits, or its ancestors.
    ///
    /// Returns the class that actually declares the method, so that names inside the body
    /// can be resolved against the right file.
    pub fn find_method(
        &mut self,
        class: &ResolvedClass,
        method: &str,
    ) -> Result<Option<(ResolvedClass, MethodDecl)>> {
        let mut seen = HashSet::new();
        self.find_method_inner(class.clone(), method, &mut seen)
    }

    fn find_method_inner(
        &mut self,
        class: ResolvedClass,
        method: &str,
        seen: &mut HashSet<String>,
    ) -> Result<Option<(ResolvedClass, MethodDecl)>> {
        if !seen.insert(class.fqcn.to_ascii_lowercase()) {
            warn!("Circular class hierarchy detected at {}", class.fqcn);
            return Ok(None);
        }
        if let Some(found) = class.decl().method(method) {
            let found = found.clone();
            return Ok(Some((class, found)));
        }

        let traits: Vec<String> = class
            .decl()
            .traits
            .iter()
            .map(|t| class.resolve_name(t))
            .collect();
        for name in traits {
            if let Some(used) = self.find_class(&name)? {
                if let Some(found) = self.find_method_inner(used, method, seen)? {
                    return Ok(Some(found));
                }
            }
        }

        match self.parent_of(&class)? {
            Some(parent) => self.find_method_inner(parent, method, seen),
            None => Ok(None),
        }
    }
}

fn push_unique_path(files: &mut Vec<PathBuf>, path: &Path) {
    if !files.iter().any(|f| f == path) {
        files.push(path.to_path_buf());
    }
}

/// Compare a fully qualified name with a fully qualified or short target name
fn class_names_match(fqcn: &str, target: &str) -> bool {
    if target.contains('\\') {
        fqcn.eq_ignore_ascii_case(target)
    } else {
        crate::parser::ast::short_name(fqcn).eq_ignore_ascii_case(target)
    }
}

/// Write `files` under `dir` and build a resolver over them
#[cfg(test)]
pub(crate) fn resolver_for(dir: &tempfile::TempDir, files: &[(&str, &str)]) -> ClassResolver {
    let mut paths = Vec::new();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        paths.push(path);
    }
    ClassResolver::new(ClassIndex::build(dir.path(), &paths)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_class_and_resolve_names() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[(
                "StoreUserRequest.php",
                r#"<?php
namespace App\Http\Requests;

use Illuminate\Foundation\Http\FormRequest;

class StoreUserRequest extends FormRequest
{
    public function rules() { return []; }
}"#,
            )],
        );

        let class = resolver
            .find_class("App\\Http\\Requests\\StoreUserRequest")
            .unwrap()
            .unwrap();
        assert_eq!(class.fqcn, "App\\Http\\Requests\\StoreUserRequest");
        assert_eq!(
            class.parent_name().as_deref(),
            Some("Illuminate\\Foundation\\Http\\FormRequest")
        );
        assert_eq!(class.resolve_name("static"), class.fqcn);
        assert!(resolver.find_class("App\\Missing").unwrap().is_none());
        assert_eq!(
            resolver.require_class("App\\Missing").unwrap_err().kind(),
            "missing_class"
        );
    }

    #[test]
    fn test_is_subclass_of_walks_chain() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[
                (
                    "BaseRequest.php",
                    "<?php\nnamespace App\\Http\\Requests;\nuse Illuminate\\Foundation\\Http\\FormRequest;\nabstract class BaseRequest extends FormRequest {}",
                ),
                (
                    "UpdateUserRequest.php",
                    "<?php\nnamespace App\\Http\\Requests;\nclass UpdateUserRequest extends BaseRequest {}",
                ),
            ],
        );

        assert!(resolver.is_subclass_of("App\\Http\\Requests\\UpdateUserRequest", "FormRequest"));
        assert!(resolver.is_subclass_of(
            "App\\Http\\Requests\\UpdateUserRequest",
            "Illuminate\\Foundation\\Http\\FormRequest"
        ));
        assert!(!resolver.is_subclass_of("App\\Http\\Requests\\UpdateUserRequest", "JsonResource"));
        // Both classes share one parse per file
        assert_eq!(resolver.parsed_count(), 2);
    }

    #[test]
    fn test_is_subclass_of_detects_cycles() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[
                ("A.php", "<?php\nnamespace App;\nclass A extends B {}"),
                ("B.php", "<?php\nnamespace App;\nclass B extends A {}"),
            ],
        );
        assert!(!resolver.is_subclass_of("App\\A", "FormRequest"));
    }

    #[test]
    fn test_parse_failure_is_typed_and_remembered() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[("Broken.php", "<?php\nnamespace App;\nclass Broken { function ( }")],
        );
        let first = resolver.find_class("App\\Broken").unwrap_err();
        let second = resolver.find_class("App\\Broken").unwrap_err();
        assert_eq!(first.kind(), "parse_failure");
        assert_eq!(second.kind(), "parse_failure");
    }

    #[test]
    fn test_enum_values_and_inherited_methods() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[
                (
                    "Priority.php",
                    "<?php\nnamespace App\\Enums;\nenum Priority: int { case Low = 1; case High = 2; }",
                ),
                (
                    "Base.php",
                    "<?php\nnamespace App;\nclass Base { protected function baseRules() { return ['a' => 'string']; } }",
                ),
                ("Child.php", "<?php\nnamespace App;\nclass Child extends Base {}"),
            ],
        );

        assert_eq!(
            resolver.enum_values("App\\Enums\\Priority"),
            Some(vec![serde_json::json!(1), serde_json::json!(2)])
        );
        let priority = resolver.find_enum("App\\Enums\\Priority").unwrap().unwrap();
        assert_eq!(priority.value_type(), "integer");

        let child = resolver.find_class("App\\Child").unwrap().unwrap();
        let (owner, method) = resolver.find_method(&child, "baseRules").unwrap().unwrap();
        assert_eq!(owner.fqcn, "App\\Base");
        assert_eq!(method.name, "baseRules");
    }

    #[test]
    fn test_track_reports_loaded_files() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[
                (
                    "app/Enums/Tier.php",
                    "<?php\nnamespace App\\Enums;\nenum Tier: int { case Free = 0; case Pro = 1; }",
                ),
                ("app/Models/Plan.php", "<?php\nnamespace App\\Models;\nclass Plan {}"),
            ],
        );
        resolver.find_class("App\\Models\\Plan").unwrap();

        let (values, files) = resolver.track(|resolver| {
            let (_, inner) = resolver.track(|resolver| resolver.find_class("App\\Models\\Plan"));
            assert_eq!(inner, vec![dir.path().join("app/Models/Plan.php")]);
            resolver.enum_values("App\\Enums\\Tier")
        });

        assert_eq!(values.unwrap().len(), 2);
        assert_eq!(
            files,
            vec![
                dir.path().join("app/Models/Plan.php"),
                dir.path().join("app/Enums/Tier.php"),
            ]
        );
        let (_, untouched) = resolver.track(|_| ());
        assert!(untouched.is_empty());
    }

    #[test]
    fn test_dependency_files_follow_parents_and_traits() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[
                ("Child.php", "<?php\nnamespace App;\nclass Child extends Base { use Helpers; }"),
                ("Base.php", "<?php\nnamespace App;\nclass Base extends \\Illuminate\\Foundation\\Http\\FormRequest {}"),
                ("Helpers.php", "<?php\nnamespace App;\ntrait Helpers {}"),
            ],
        );
        let child = resolver.find_class("App\\Child").unwrap().unwrap();
        let files: Vec<String> = resolver
            .dependency_files(&child)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["Child.php", "Helpers.php", "Base.php"]);
    }
}
