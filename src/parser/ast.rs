//! Owned, typed syntax tree for the subset of PHP the analyzers understand.
//!
//! The tree-sitter concrete syntax tree is lowered into these types by [`super::lower`].
//! Constructs outside the modelled subset are kept as [`Expr::Other`] / [`Stmt::Other`]
//! with their original source text, so they can still be rendered verbatim.

/// A parsed PHP file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFile {
    /// Declared namespace (`App\Http\Requests`), if any
    pub namespace: Option<String>,
    /// `use` imports at file level
    pub imports: Vec<UseImport>,
    /// Classes, traits and interfaces declared in the file
    pub classes: Vec<ClassDecl>,
    /// Enums declared in the file
    pub enums: Vec<EnumDecl>,
}

impl SourceFile {
    /// Resolve a class name as written in this file to its fully qualified form.
    ///
    /// Leading backslashes mark already-qualified names; otherwise the first segment is
    /// matched against the `use` imports (case-insensitively, as PHP does) and finally the
    /// file namespace is prepended. `self`/`static`/`parent` are left to the caller.
    pub fn resolve_class_name(&self, name: &str) -> String {
        let name = name.trim();
        if let Some(qualified) = name.strip_prefix('\\') {
            return qualified.to_string();
        }

        let (first, rest) = match name.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        if let Some(import) = self
            .imports
            .iter()
            .find(|i| i.local_name().eq_ignore_ascii_case(first))
        {
            return match rest {
                Some(rest) => format!("{}\\{}", import.name, rest),
                None => import.name.clone(),
            };
        }

        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}\\{}", ns, name),
            _ => name.to_string(),
        }
    }

    /// Fully qualified name of a class declared in this file
    pub fn qualified_name(&self, short: &str) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}\\{}", ns, short),
            _ => short.to_string(),
        }
    }

    pub fn class(&self, short: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name.eq_ignore_ascii_case(short))
    }

    pub fn enum_decl(&self, short: &str) -> Option<&EnumDecl> {
        self.enums.iter().find(|e| e.name.eq_ignore_ascii_case(short))
    }
}

/// A single `use Foo\Bar as Baz;` import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseImport {
    /// Fully qualified name without leading backslash
    pub name: String,
    pub alias: Option<String>,
}

impl UseImport {
    /// The name this import is visible under in the file
    pub fn local_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => short_name(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Trait,
    Interface,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub kind: ClassKind,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    /// Traits pulled in with `use SomeTrait;` inside the class body
    pub traits: Vec<String>,
    pub properties: Vec<PropertyDecl>,
    pub methods: Vec<MethodDecl>,
    pub is_abstract: bool,
}

impl ClassDecl {
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    /// Name without the `$`
    pub name: String,
    pub default: Option<Expr>,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeHint>,
    pub body: Vec<Stmt>,
    pub is_static: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name without the `$`
    pub name: String,
    pub type_hint: Option<TypeHint>,
    pub default: Option<Expr>,
    pub variadic: bool,
}

/// A declared type (`?Foo`, `Foo|Bar`, `int`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHint {
    /// Every named or primitive member of the type, as written
    pub names: Vec<String>,
    pub nullable: bool,
}

impl TypeHint {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
            nullable: false,
        }
    }

    /// Named members that look like classes rather than builtin types
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(|s| s.as_str())
            .filter(|n| !is_builtin_type(n))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    /// `string` or `int` for backed enums
    pub backing_type: Option<String>,
    pub cases: Vec<EnumCase>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumCase {
    pub name: String,
    pub value: Option<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_ifs: Vec<ElseIf>,
        else_branch: Option<Vec<Stmt>>,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
    },
    /// `foreach`/`for`/`while`/`do`; only the body is modelled
    Loop(Vec<Stmt>),
    Try {
        body: Vec<Stmt>,
        catches: Vec<Vec<Stmt>>,
        finally: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Literal {
    /// Value as PHP would stringify it (`implode`, concatenation)
    pub fn to_php_string(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Bool(true) => "1".to_string(),
            Literal::Bool(false) | Literal::Null => String::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::String(s) => serde_json::Value::from(s.as_str()),
            Literal::Int(i) => serde_json::Value::from(*i),
            Literal::Float(f) => serde_json::Value::from(*f),
            Literal::Bool(b) => serde_json::Value::from(*b),
            Literal::Null => serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Double-quoted string with interpolation, kept as source text
    Interpolated(String),
    /// Variable name without the `$`
    Variable(String),
    Array(Vec<ArrayItem>),
    Assign {
        target: Box<Expr>,
        /// `None` for plain `=`, otherwise the compound operator (`.=`, `+=`, `??=`)
        op: Option<String>,
        value: Box<Expr>,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
    },
    /// `cond ? a : b`, or `cond ?: b` when `then` is `None`
    Ternary {
        condition: Box<Expr>,
        then: Option<Box<Expr>>,
        otherwise: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Arg>,
    },
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Arg>,
        nullsafe: bool,
    },
    StaticCall {
        class: String,
        method: String,
        args: Vec<Arg>,
    },
    PropertyFetch {
        object: Box<Expr>,
        property: String,
        nullsafe: bool,
    },
    StaticProperty {
        class: String,
        property: String,
    },
    ClassConst {
        class: String,
        constant: String,
    },
    /// Bare constant name (`PHP_EOL`, `SORT_STRING`)
    Constant(String),
    New {
        class: String,
        args: Vec<Arg>,
    },
    Closure {
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    ArrowFn {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    Match {
        subject: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    Cast {
        to: String,
        expr: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Option<Box<Expr>>,
    },
    Other(String),
}

impl Expr {
    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn as_str_literal(&self) -> Option<&str> {
        match self {
            Expr::Literal(Literal::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_this(&self) -> bool {
        matches!(self, Expr::Variable(name) if name == "this")
    }

    /// Visit this expression and every sub-expression in pre-order.
    ///
    /// Closure and arrow-function bodies are included; nested statements are visited through
    /// [`Stmt::walk_exprs`].
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Array(items) => {
                for item in items {
                    if let Some(key) = &item.key {
                        key.walk(visit);
                    }
                    item.value.walk(visit);
                }
            }
            Expr::Assign { target, value, .. } => {
                target.walk(visit);
                value.walk(visit);
            }
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                condition.walk(visit);
                if let Some(then) = then {
                    then.walk(visit);
                }
                otherwise.walk(visit);
            }
            Expr::Call { args, .. } | Expr::StaticCall { args, .. } | Expr::New { args, .. } => {
                for arg in args {
                    arg.value.walk(visit);
                }
            }
            Expr::MethodCall { object, args, .. } => {
                object.walk(visit);
                for arg in args {
                    arg.value.walk(visit);
                }
            }
            Expr::PropertyFetch { object, .. } => object.walk(visit),
            Expr::Closure { body, .. } => {
                for stmt in body {
                    stmt.walk_exprs(visit);
                }
            }
            Expr::ArrowFn { body, .. } => body.walk(visit),
            Expr::Match { subject, arms } => {
                subject.walk(visit);
                for arm in arms {
                    for condition in arm.conditions.iter().flatten() {
                        condition.walk(visit);
                    }
                    arm.body.walk(visit);
                }
            }
            Expr::Cast { expr, .. } => expr.walk(visit),
            Expr::Index { target, index } => {
                target.walk(visit);
                if let Some(index) = index {
                    index.walk(visit);
                }
            }
            Expr::Literal(_)
            | Expr::Interpolated(_)
            | Expr::Variable(_)
            | Expr::StaticProperty { .. }
            | Expr::ClassConst { .. }
            | Expr::Constant(_)
            | Expr::Other(_) => {}
        }
    }
}

impl Stmt {
    /// Visit every expression in this statement and its nested statements
    pub fn walk_exprs<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        match self {
            Stmt::Expr(expr) => expr.walk(visit),
            Stmt::Return(expr) => {
                if let Some(expr) = expr {
                    expr.walk(visit);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_ifs,
                else_branch,
            } => {
                condition.walk(visit);
                then_branch.iter().for_each(|s| s.walk_exprs(visit));
                for else_if in else_ifs {
                    else_if.condition.walk(visit);
                    else_if.body.iter().for_each(|s| s.walk_exprs(visit));
                }
                else_branch.iter().flatten().for_each(|s| s.walk_exprs(visit));
            }
            Stmt::Switch { subject, cases } => {
                subject.walk(visit);
                for case in cases {
                    if let Some(test) = &case.test {
                        test.walk(visit);
                    }
                    case.body.iter().for_each(|s| s.walk_exprs(visit));
                }
            }
            Stmt::Loop(body) | Stmt::Block(body) => body.iter().for_each(|s| s.walk_exprs(visit)),
            Stmt::Try {
                body,
                catches,
                finally,
            } => {
                body.iter().for_each(|s| s.walk_exprs(visit));
                catches.iter().flatten().for_each(|s| s.walk_exprs(visit));
                finally.iter().flatten().for_each(|s| s.walk_exprs(visit));
            }
            Stmt::Other(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub key: Option<Expr>,
    pub value: Expr,
    /// `...$other`
    pub spread: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    /// Named argument (`minLength: 16`)
    pub name: Option<String>,
    pub value: Expr,
    pub spread: bool,
}

impl Arg {
    pub fn positional(value: Expr) -> Self {
        Self {
            name: None,
            value,
            spread: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    /// `None` for the `default` arm
    pub conditions: Option<Vec<Expr>>,
    pub body: Expr,
}

/// Last segment of a possibly-qualified class name (`\App\Rules\Foo` → `Foo`)
pub fn short_name(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

/// Whether a type name is a PHP builtin rather than a class
pub fn is_builtin_type(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "int"
            | "float"
            | "string"
            | "bool"
            | "array"
            | "callable"
            | "iterable"
            | "object"
            | "mixed"
            | "void"
            | "null"
            | "never"
            | "false"
            | "true"
            | "self"
            | "static"
            | "parent"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("\\App\\Rules\\StrongPassword"), "StrongPassword");
        assert_eq!(short_name("Enum"), "Enum");
    }

    #[test]
    fn test_import_local_name_prefers_alias() {
        let plain = UseImport {
            name: "App\\Models\\User".to_string(),
            alias: None,
        };
        let aliased = UseImport {
            name: "App\\Models\\User".to_string(),
            alias: Some("Account".to_string()),
        };
        assert_eq!(plain.local_name(), "User");
        assert_eq!(aliased.local_name(), "Account");
    }

    #[test]
    fn test_resolve_class_name() {
        let file = SourceFile {
            namespace: Some("App\\Http\\Requests".to_string()),
            imports: vec![
                UseImport {
                    name: "App\\Rules\\StrongPassword".to_string(),
                    alias: None,
                },
                UseImport {
                    name: "App\\Enums".to_string(),
                    alias: Some("E".to_string()),
                },
            ],
            ..Default::default()
        };
        assert_eq!(file.resolve_class_name("StrongPassword"), "App\\Rules\\StrongPassword");
        assert_eq!(file.resolve_class_name("E\\Status"), "App\\Enums\\Status");
        assert_eq!(
            file.resolve_class_name("\\Illuminate\\Validation\\Rule"),
            "Illuminate\\Validation\\Rule"
        );
        assert_eq!(file.resolve_class_name("BaseRequest"), "App\\Http\\Requests\\BaseRequest");
    }

    #[test]
    fn test_literal_php_string() {
        assert_eq!(Literal::Int(5).to_php_string(), "5");
        assert_eq!(Literal::Bool(true).to_php_string(), "1");
        assert_eq!(Literal::Null.to_php_string(), "");
    }

    #[test]
    fn test_type_hint_class_names_skip_builtins() {
        let hint = TypeHint {
            names: vec!["int".to_string(), "UserResource".to_string(), "null".to_string()],
            nullable: true,
        };
        let names: Vec<&str> = hint.class_names().collect();
        assert_eq!(names, vec!["UserResource"]);
    }
}
