//! PHP source parser.
//!
//! Wraps `tree-sitter-php` and lowers its concrete syntax tree into the owned, typed
//! [`ast`] consumed by every analyzer. Files containing syntax errors surface as a typed
//! [`Error::ParseFailure`] instead of a partial tree.

pub mod ast;
mod lower;
pub mod render;

pub use ast::SourceFile;
pub use render::render;

use crate::error::{Error, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::Node;

/// Parser for PHP source files.
///
/// One instance owns a configured `tree_sitter::Parser` and can be reused for many files.
///
/// # Example
///
/// ```no_run
/// use openapi_from_laravel::parser::PhpParser;
/// use std::path::Path;
///
/// let mut parser = PhpParser::new().unwrap();
/// let parsed = parser.parse_file(Path::new("app/Http/Requests/StoreUserRequest.php")).unwrap();
/// println!("Parsed {} classes", parsed.ast.classes.len());
/// ```
pub struct PhpParser {
    parser: tree_sitter::Parser,
}

/// A successfully parsed PHP file with its lowered syntax tree.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// Path to the source file
    pub path: PathBuf,
    /// Original source text
    pub source: String,
    /// Lowered syntax tree
    pub ast: SourceFile,
}

impl ParsedFile {
    /// Resolve a class name as written in this file to its fully qualified name
    pub fn resolve_class_name(&self, name: &str) -> String {
        self.ast.resolve_class_name(name)
    }
}

impl PhpParser {
    /// Creates a parser loaded with the PHP grammar.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled grammar is incompatible with the tree-sitter runtime.
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_php::LANGUAGE_PHP.into())
            .map_err(|e| Error::InvalidArgument(format!("Incompatible PHP grammar: {}", e)))?;
        Ok(Self { parser })
    }

    /// Parses a single PHP source file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file contains syntax the grammar does not accept
    pub fn parse_file(&mut self, path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)?;
        let parsed = self.parse_source(path, &content)?;

        debug!("Successfully parsed file: {}", path.display());
        Ok(parsed)
    }

    /// Parses PHP source text that is attributed to `path` in errors.
    pub fn parse_source(&mut self, path: &Path, source: &str) -> Result<ParsedFile> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| Error::ParseFailure {
                file: path.to_path_buf(),
                message: "parser produced no syntax tree".to_string(),
            })?;

        let root = tree.root_node();
        if root.has_error() {
            let message = match first_error(root) {
                Some(node) => {
                    let pos = node.start_position();
                    format!(
                        "syntax error at line {}, column {}",
                        pos.row + 1,
                        pos.column + 1
                    )
                }
                None => "syntax error".to_string(),
            };
            return Err(Error::ParseFailure {
                file: path.to_path_buf(),
                message,
            });
        }

        let ast = lower::Lowerer::new(source).lower_program(root);
        Ok(ParsedFile {
            path: path.to_path_buf(),
            source: source.to_string(),
            ast,
        })
    }

    /// Parses multiple files, continuing even if some fail.
    ///
    /// Files that fail to parse are logged as warnings; the caller decides whether to
    /// record them as diagnostics.
    pub fn parse_files(&mut self, paths: &[PathBuf]) -> Vec<Result<ParsedFile>> {
        debug!("Parsing {} files", paths.len());

        let results: Vec<Result<ParsedFile>> = paths
            .iter()
            .map(|path| {
                self.parse_file(path).inspect_err(|e| {
                    warn!("Failed to parse {}: {}", path.display(), e);
                })
            })
            .collect();

        let success_count = results.iter().filter(|r| r.is_ok()).count();
        debug!(
            "Parsing complete: {} succeeded, {} failed",
            success_count,
            results.len() - success_count
        );

        results
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error)
}

/// Parse an inline PHP snippet, panicking on failure. Test helper.
#[cfg(test)]
pub(crate) fn parse_php(source: &str) -> SourceFile {
    PhpParser::new()
        .unwrap()
        .parse_source(Path::new("inline.php"), source)
        .unwrap()
        .ast
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Helper function to create a temporary file with content
    fn create_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let file_path = dir.path().join(name);
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file_path
    }

    fn first_method(source: &str) -> MethodDecl {
        parse_php(source).classes[0].methods[0].clone()
    }

    #[test]
    fn test_parse_valid_php_file() {
        let temp_dir = TempDir::new().unwrap();
        let code = r#"<?php
namespace App\Http\Requests;

use Illuminate\Foundation\Http\FormRequest;
use App\Rules\StrongPassword as Strong;

class StoreUserRequest extends FormRequest
{
    protected $stopOnFirstFailure = true;

    public function authorize(): bool
    {
        return true;
    }

    public function rules(): array
    {
        return ['email' => 'required|email'];
    }
}
"#;
        let file_path = create_temp_file(&temp_dir, "StoreUserRequest.php", code);
        let mut parser = PhpParser::new().unwrap();
        let parsed = parser.parse_file(&file_path).unwrap();

        assert_eq!(parsed.path, file_path);
        assert_eq!(parsed.ast.namespace.as_deref(), Some("App\\Http\\Requests"));
        assert_eq!(parsed.ast.imports.len(), 2);
        assert_eq!(parsed.ast.imports[1].local_name(), "Strong");

        let class = &parsed.ast.classes[0];
        assert_eq!(class.name, "StoreUserRequest");
        assert_eq!(class.extends.as_deref(), Some("FormRequest"));
        assert_eq!(class.methods.len(), 2);
        assert!(class.property("stopOnFirstFailure").is_some());
        assert_eq!(
            parsed.resolve_class_name(class.extends.as_deref().unwrap()),
            "Illuminate\\Foundation\\Http\\FormRequest"
        );
    }

    #[test]
    fn test_parse_invalid_php_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = create_temp_file(
            &temp_dir,
            "Broken.php",
            "<?php\nclass Broken {\n    public function rules( {\n        return [;\n    }\n",
        );
        let mut parser = PhpParser::new().unwrap();
        let err = parser.parse_file(&file_path).unwrap_err();

        assert_eq!(err.kind(), "parse_failure");
        assert!(err.to_string().contains("syntax error at line"));
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let mut parser = PhpParser::new().unwrap();
        let err = parser
            .parse_file(Path::new("/nonexistent/File.php"))
            .unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_parse_empty_file() {
        let mut parser = PhpParser::new().unwrap();
        let parsed = parser.parse_source(Path::new("empty.php"), "").unwrap();
        assert!(parsed.ast.classes.is_empty());
        assert!(parsed.ast.namespace.is_none());
    }

    #[test]
    fn test_parse_files_batch() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = create_temp_file(&temp_dir, "A.php", "<?php class A {}");
        let file2 = create_temp_file(&temp_dir, "B.php", "<?php class B extends A {}");
        let file3 = create_temp_file(&temp_dir, "C.php", "<?php class C { function ( }");

        let mut parser = PhpParser::new().unwrap();
        let results = parser.parse_files(&[file1.clone(), file2, file3]);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
        assert_eq!(results[0].as_ref().unwrap().path, file1);
    }

    #[test]
    fn test_lower_if_elseif_else_chain() {
        let method = first_method(
            r#"<?php
class R {
    public function rules() {
        if ($this->isMethod('POST')) {
            return ['a' => 'required'];
        } elseif ($this->isMethod('PUT')) {
            return ['a' => 'sometimes'];
        } else if ($this->user()) {
            return [];
        } else {
            return ['b' => 'string'];
        }
    }
}"#,
        );
        match &method.body[0] {
            Stmt::If {
                else_ifs,
                else_branch,
                ..
            } => {
                assert_eq!(else_ifs.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("expected if statement, got {:?}", other),
        }
    }

    #[test]
    fn test_lower_rule_builder_chain_and_new() {
        let method = first_method(
            r#"<?php
class R {
    public function rules() {
        return [
            'email' => ['required', Rule::unique('users')->ignore($this->user), new StrongPassword(minLength: 16)],
            ...$this->extra(),
        ];
    }
}"#,
        );
        let Stmt::Return(Some(Expr::Array(items))) = &method.body[0] else {
            panic!("expected array return");
        };
        assert_eq!(items.len(), 2);
        assert!(items[1].spread);
        assert_eq!(items[0].key.as_ref().and_then(|k| k.as_str_literal()), Some("email"));

        let Expr::Array(tokens) = &items[0].value else {
            panic!("expected token array");
        };
        assert_eq!(tokens.len(), 3);
        match &tokens[1].value {
            Expr::MethodCall { object, method, .. } => {
                assert_eq!(method, "ignore");
                assert!(
                    matches!(**object, Expr::StaticCall { ref method, .. } if method == "unique")
                );
            }
            other => panic!("expected chained call, got {:?}", other),
        }
        match &tokens[2].value {
            Expr::New { class, args } => {
                assert_eq!(class, "StrongPassword");
                assert_eq!(args[0].name.as_deref(), Some("minLength"));
                assert_eq!(args[0].value, Expr::Literal(Literal::Int(16)));
            }
            other => panic!("expected new expression, got {:?}", other),
        }
    }

    #[test]
    fn test_lower_match_and_switch() {
        let class = &parse_php(
            r#"<?php
class R {
    public function a() {
        return match ($this->method()) {
            'POST', 'PUT' => ['x' => 'required'],
            default => [],
        };
    }
    public function b() {
        switch ($this->method()) {
            case 'POST':
                return ['y' => 'required'];
            default:
                return [];
        }
    }
}"#,
        )
        .classes[0];

        let Stmt::Return(Some(Expr::Match { arms, .. })) = &class.methods[0].body[0] else {
            panic!("expected match");
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0].conditions.as_ref().map(|c| c.len()), Some(2));
        assert!(arms[1].conditions.is_none());

        let Stmt::Switch { cases, .. } = &class.methods[1].body[0] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].test.as_ref().and_then(|t| t.as_str_literal()), Some("POST"));
        assert!(cases[1].test.is_none());
    }

    #[test]
    fn test_lower_backed_enum() {
        let file = parse_php(
            r#"<?php
namespace App\Enums;

enum Status: string
{
    case Active = 'active';
    case Archived = 'archived';
}"#,
        );
        let status = &file.enums[0];
        assert_eq!(status.name, "Status");
        assert_eq!(status.backing_type.as_deref(), Some("string"));
        assert_eq!(status.cases.len(), 2);
        assert_eq!(
            status.cases[1].value,
            Some(Literal::String("archived".to_string()))
        );
    }

    #[test]
    fn test_render_round_trips_fallback_expression() {
        let method = first_method(
            "<?php class R { function rules() { return ['id' => 'exists:' . $this->getTable()]; } }",
        );
        let Stmt::Return(Some(Expr::Array(items))) = &method.body[0] else {
            panic!("expected array return");
        };
        assert_eq!(render(&items[0].value), "'exists:' . $this->getTable()");
    }
}
