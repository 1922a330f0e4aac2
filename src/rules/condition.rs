//! Classification of branch conditions.
//!
//! Only the left-most operand of a compound boolean (`&&`, `||`, `and`, `or`) and the operand
//! of a negation drive the classification; the full condition is kept in the rendered
//! `expression` text.

use crate::parser::ast::{short_name, Expr, Literal};
use crate::parser::render;
use serde::{Deserialize, Serialize};

/// Classified branch condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionResult {
    /// `isMethod('POST')`, `$this->method() === 'PUT'`
    HttpMethod {
        expression: String,
        /// Upper-cased verb, `None` when not a literal
        method: Option<String>,
        #[serde(default)]
        negated: bool,
    },
    /// `$this->user()`, `auth()->check()`, `$this->user()->isAdmin()`
    UserCheck {
        expression: String,
        method: Option<String>,
    },
    /// `$this->has('field')`, `filled`, `missing`, `exists`
    RequestField {
        expression: String,
        check: String,
        field: Option<String>,
    },
    /// `Rule::when(...)` used as a condition
    RuleWhen { expression: String },
    ElseBranch,
    Custom { expression: String },
}

impl ConditionResult {
    pub fn expression(&self) -> &str {
        match self {
            ConditionResult::HttpMethod { expression, .. }
            | ConditionResult::UserCheck { expression, .. }
            | ConditionResult::RequestField { expression, .. }
            | ConditionResult::RuleWhen { expression }
            | ConditionResult::Custom { expression } => expression,
            ConditionResult::ElseBranch => "else",
        }
    }

    /// Short tag of the condition kind
    pub fn kind(&self) -> &'static str {
        match self {
            ConditionResult::HttpMethod { .. } => "http_method",
            ConditionResult::UserCheck { .. } => "user_check",
            ConditionResult::RequestField { .. } => "request_field",
            ConditionResult::RuleWhen { .. } => "rule_when",
            ConditionResult::ElseBranch => "else_branch",
            ConditionResult::Custom { .. } => "custom",
        }
    }

    /// For HTTP method conditions: whether the branch applies to `verb`.
    /// `None` for every other kind, or when the method is not a literal.
    pub fn applies_to_method(&self, verb: &str) -> Option<bool> {
        match self {
            ConditionResult::HttpMethod {
                method: Some(method),
                negated,
                ..
            } => Some(method.eq_ignore_ascii_case(verb) != *negated),
            _ => None,
        }
    }
}

const REQUEST_FIELD_CHECKS: &[&str] = &["has", "filled", "missing", "exists"];
const METHOD_GETTERS: &[&str] = &["method", "getmethod", "getrealmethod"];

/// Classifies boolean expressions into [`ConditionResult`]s
pub struct ConditionClassifier;

impl ConditionClassifier {
    /// Classify an `if`/`elseif`/ternary test
    pub fn classify(expr: &Expr) -> ConditionResult {
        Self::classify_inner(expr, render(expr), false)
    }

    /// Classify one `case`/match-arm value compared against `subject`
    pub fn classify_comparison(subject: &Expr, value: &Expr) -> ConditionResult {
        let expression = format!("{} === {}", render(subject), render(value));
        // `match (true)` arms carry the real condition
        if matches!(subject, Expr::Literal(Literal::Bool(true))) {
            return Self::classify_inner(value, render(value), false);
        }
        if is_method_getter(subject) {
            return ConditionResult::HttpMethod {
                expression,
                method: value.as_str_literal().map(|m| m.to_ascii_uppercase()),
                negated: false,
            };
        }
        ConditionResult::Custom { expression }
    }

    fn classify_inner(expr: &Expr, expression: String, negated: bool) -> ConditionResult {
        match expr {
            Expr::Unary { op, operand } if op == "!" => {
                return Self::classify_inner(operand, expression, !negated);
            }
            Expr::Binary { op, left, .. } if matches!(op.as_str(), "&&" | "||" | "and" | "or") => {
                return Self::classify_inner(left, expression, negated);
            }
            _ => {}
        }

        if let Some((method, comparison_negated)) = http_method_check(expr) {
            return ConditionResult::HttpMethod {
                expression,
                method,
                negated: negated != comparison_negated,
            };
        }
        if let Some(method) = user_check(expr) {
            return ConditionResult::UserCheck { expression, method };
        }
        if let Some((check, field)) = request_field_check(expr) {
            return ConditionResult::RequestField {
                expression,
                check,
                field,
            };
        }
        if is_rule_when(expr) {
            return ConditionResult::RuleWhen { expression };
        }
        ConditionResult::Custom { expression }
    }
}

/// `$this->method()`, `$request->getMethod()`, `request()->method()`, `strtoupper(...)` of those
pub(crate) fn is_method_getter(expr: &Expr) -> bool {
    match expr {
        Expr::MethodCall { method, args, .. } => {
            args.is_empty() && METHOD_GETTERS.contains(&method.to_ascii_lowercase().as_str())
        }
        Expr::Call { function, args } => {
            matches!(function.to_ascii_lowercase().as_str(), "strtoupper" | "strtolower")
                && args.first().is_some_and(|a| is_method_getter(&a.value))
        }
        _ => false,
    }
}

/// Returns the literal verb (if any) and whether the comparison itself is negated
fn http_method_check(expr: &Expr) -> Option<(Option<String>, bool)> {
    match expr {
        Expr::MethodCall { method, args, .. } if method.eq_ignore_ascii_case("isMethod") => Some((
            args.first()
                .and_then(|a| a.value.as_str_literal())
                .map(|m| m.to_ascii_uppercase()),
            false,
        )),
        Expr::Binary { op, left, right }
            if matches!(op.as_str(), "==" | "===" | "!=" | "!==" | "<>") =>
        {
            let negated = op.starts_with('!') || op == "<>";
            let literal = if is_method_getter(left) {
                right
            } else if is_method_getter(right) {
                left
            } else {
                return None;
            };
            Some((
                literal.as_str_literal().map(|m| m.to_ascii_uppercase()),
                negated,
            ))
        }
        _ => None,
    }
}

/// Whether an expression yields the authenticated user (or a user-like value)
fn is_user_accessor(expr: &Expr) -> bool {
    match expr {
        Expr::MethodCall { object, method, .. } => {
            method.eq_ignore_ascii_case("user")
                && (object.is_this() || is_request_like(object) || is_auth_facade(object))
        }
        Expr::StaticCall { class, method, .. } => {
            short_name(class).eq_ignore_ascii_case("Auth") && method.eq_ignore_ascii_case("user")
        }
        Expr::Call { function, .. } => {
            function.eq_ignore_ascii_case("auth") || function.eq_ignore_ascii_case("user")
        }
        Expr::Variable(name) => matches!(name.as_str(), "user" | "authUser" | "currentUser"),
        Expr::PropertyFetch { object, property, .. } => object.is_this() && property == "user",
        _ => false,
    }
}

fn is_auth_facade(expr: &Expr) -> bool {
    matches!(expr, Expr::Call { function, .. } if function.eq_ignore_ascii_case("auth"))
}

fn is_request_like(expr: &Expr) -> bool {
    match expr {
        Expr::Variable(name) => name == "request" || name == "this",
        Expr::Call { function, args } => {
            function.eq_ignore_ascii_case("request") && args.is_empty()
        }
        _ => false,
    }
}

fn user_check(expr: &Expr) -> Option<Option<String>> {
    match expr {
        // $this->user(), $request->user(), auth()->user()
        Expr::MethodCall { method, .. } if is_user_accessor(expr) => Some(Some(method.clone())),
        // auth()->check(), auth()->guest(), auth('api')->check()
        Expr::MethodCall { object, method, .. } if is_auth_facade(object) => {
            Some(Some(method.clone()))
        }
        // Auth::check(), Auth::user(), Auth::guest()
        Expr::StaticCall { class, method, .. }
            if short_name(class).eq_ignore_ascii_case("Auth") =>
        {
            Some(Some(method.clone()))
        }
        // $this->user()->hasRole('admin'), $user->isAdmin()
        Expr::MethodCall { object, method, .. } if is_user_accessor(object) => {
            Some(Some(method.clone()))
        }
        Expr::PropertyFetch { object, property, .. } if is_user_accessor(object) => {
            Some(Some(property.clone()))
        }
        _ => None,
    }
}

fn request_field_check(expr: &Expr) -> Option<(String, Option<String>)> {
    match expr {
        Expr::MethodCall {
            object,
            method,
            args,
            ..
        } if is_request_like(object)
            && REQUEST_FIELD_CHECKS.contains(&method.to_ascii_lowercase().as_str()) =>
        {
            Some((
                method.to_ascii_lowercase(),
                args.first()
                    .and_then(|a| a.value.as_str_literal())
                    .map(|f| f.to_string()),
            ))
        }
        _ => None,
    }
}

fn is_rule_when(expr: &Expr) -> bool {
    match expr {
        Expr::StaticCall { class, method, .. } => {
            short_name(class).eq_ignore_ascii_case("Rule") && method.eq_ignore_ascii_case("when")
        }
        Expr::MethodCall { object, method, .. } => {
            method.eq_ignore_ascii_case("when")
                && matches!(
                    &**object,
                    Expr::StaticCall { class, .. } if short_name(class).eq_ignore_ascii_case("Rule")
                )
        }
        _ => false,
    }
}
