use super::builder::{self, BuiltArg};
use super::extractor::{Frame, RuleSetExtractor};
use super::{merge_keep_first, merge_overwrite, merge_union, push_unique, RuleMap, RuleToken};
use crate::class_resolver::ResolvedClass;
use crate::parser::ast::{short_name, Arg, ArrayItem, Expr, Literal, MethodDecl};
use crate::parser::render;
use log::debug;
use std::collections::HashMap;

/// Outcome of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Resolved(T),
    /// Not evaluable; carries the rendered source text
    Fallback(String),
    /// Evaluates to nothing useful (unknown method, recursion)
    Empty,
}

impl<T> Resolution<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            Resolution::Resolved(value) => Some(value),
            _ => None,
        }
    }
}

/// Statically known value
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    /// Keyed array: field → tokens
    Map(RuleMap),
    /// List array or rule builder result
    Tokens(Vec<RuleToken>),
    Literal(Literal),
}

/// Local variables bound to statically known values
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// Join point of several control-flow paths: a variable bound on more than one path
    /// holds the union of its values
    pub fn union(scopes: Vec<Scope>) -> Option<Scope> {
        let mut scopes = scopes.into_iter();
        let mut joined = scopes.next()?;
        for scope in scopes {
            for (name, value) in scope.vars {
                let merged = match joined.vars.remove(&name) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                joined.vars.insert(name, merged);
            }
        }
        Some(joined)
    }
}

/// Union of two values reached on alternative paths
pub(crate) fn merge_values(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Map(mut a), Value::Map(b)) => {
            merge_union(&mut a, &b);
            Value::Map(a)
        }
        (Value::Map(a), _) => Value::Map(a),
        (_, Value::Map(b)) => Value::Map(b),
        (Value::Literal(a), Value::Literal(b)) if a == b => Value::Literal(a),
        (a, b) => {
            let mut tokens = field_tokens(Resolution::Resolved(a));
            for token in field_tokens(Resolution::Resolved(b)) {
                push_unique(&mut tokens, token);
            }
            Value::Tokens(tokens)
        }
    }
}

/// Tokens of a field value; a string literal is a `|`-separated rule list
pub(crate) fn field_tokens(value: Resolution<Value>) -> Vec<RuleToken> {
    match value {
        Resolution::Resolved(Value::Literal(Literal::String(s))) => s
            .split('|')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(RuleToken::plain)
            .collect(),
        other => element_tokens(other),
    }
}

/// Tokens of a list element; strings are kept whole
pub(crate) fn element_tokens(value: Resolution<Value>) -> Vec<RuleToken> {
    match value {
        Resolution::Resolved(Value::Literal(Literal::Null)) => Vec::new(),
        Resolution::Resolved(Value::Literal(literal)) => {
            vec![RuleToken::plain(literal.to_php_string())]
        }
        Resolution::Resolved(Value::Tokens(tokens)) => tokens,
        Resolution::Resolved(Value::Map(map)) => {
            let mut tokens = Vec::new();
            for token in map.into_values().flatten() {
                push_unique(&mut tokens, token);
            }
            tokens
        }
        Resolution::Fallback(text) => vec![RuleToken::Plain(text)],
        Resolution::Empty => Vec::new(),
    }
}

/// Rule mapping of a branch value; anything but a keyed array contributes nothing
pub(crate) fn value_to_map(value: Resolution<Value>) -> RuleMap {
    match value {
        Resolution::Resolved(Value::Map(map)) => map,
        _ => RuleMap::new(),
    }
}

/// Classes whose `new` builds a framework rule rather than a custom rule
const FRAMEWORK_RULE_CLASSES: &[&str] = &[
    "In",
    "NotIn",
    "Exists",
    "Unique",
    "Enum",
    "Password",
    "Dimensions",
    "File",
    "ImageFile",
    "RequiredIf",
];

impl<'r> RuleSetExtractor<'r> {
    /// Best-effort static evaluation of an expression inside `frame`
    pub(crate) fn eval(&mut self, frame: &Frame, expr: &Expr, scope: &Scope) -> Resolution<Value> {
        match expr {
            Expr::Literal(literal) => Resolution::Resolved(Value::Literal(literal.clone())),
            Expr::Interpolated(text) => Resolution::Fallback(text.clone()),
            Expr::Variable(name) => match scope.get(name) {
                Some(value) => Resolution::Resolved(value.clone()),
                None => {
                    debug!("Variable ${} is not statically known", name);
                    Resolution::Fallback(render(expr))
                }
            },
            Expr::Array(items) => self.eval_array(frame, items, scope),
            Expr::Binary { op, left, right } => match op.as_str() {
                "." => self.eval_concat(frame, expr, scope),
                "+" => {
                    let left = self.eval(frame, left, scope);
                    let right = self.eval(frame, right, scope);
                    combine_maps(left, right, merge_keep_first)
                }
                "??" | "?:" => self.eval_alternatives(frame, left, right, scope),
                _ => Resolution::Fallback(render(expr)),
            },
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => match then {
                Some(then) => self.eval_alternatives(frame, then, otherwise, scope),
                None => self.eval_alternatives(frame, condition, otherwise, scope),
            },
            Expr::Match { arms, .. } => {
                let values: Vec<_> = arms
                    .iter()
                    .map(|arm| self.eval(frame, &arm.body, scope))
                    .collect();
                fold_alternatives(values)
            }
            Expr::Call { function, args } => self.eval_function(frame, expr, function, args, scope),
            Expr::MethodCall { object, method, .. } => {
                if let Some(base) = chain_base(expr) {
                    return self.eval(frame, base, scope);
                }
                if object.is_this() {
                    return self.delegate(frame, method);
                }
                Resolution::Fallback(render(expr))
            }
            Expr::StaticCall {
                class,
                method,
                args,
            } => self.eval_static_call(frame, expr, class, method, args, scope),
            Expr::New { class, args } => self.eval_new(frame, class, args, scope),
            Expr::Closure { .. } | Expr::ArrowFn { .. } => Resolution::Resolved(Value::Tokens(vec![
                builder::custom_rule("Closure", &[]),
            ])),
            Expr::PropertyFetch {
                object, property, ..
            } if object.is_this() => self.eval_property(frame, expr, property),
            Expr::StaticProperty { class, property }
                if matches!(class.to_ascii_lowercase().as_str(), "self" | "static") =>
            {
                self.eval_property(frame, expr, property)
            }
            Expr::Cast { expr, .. } => self.eval(frame, expr, scope),
            Expr::Assign { value, .. } => self.eval(frame, value, scope),
            _ => Resolution::Fallback(render(expr)),
        }
    }

    fn eval_array(
        &mut self,
        frame: &Frame,
        items: &[ArrayItem],
        scope: &Scope,
    ) -> Resolution<Value> {
        if items.is_empty() {
            return Resolution::Resolved(Value::Map(RuleMap::new()));
        }

        let keyed = items.iter().any(|item| item.key.is_some());
        let spreads: Vec<Resolution<Value>> = if keyed {
            Vec::new()
        } else if items.iter().all(|item| item.spread) {
            items
                .iter()
                .map(|item| self.eval(frame, &item.value, scope))
                .collect()
        } else {
            Vec::new()
        };
        let spread_maps = !spreads.is_empty()
            && spreads
                .iter()
                .all(|s| matches!(s, Resolution::Resolved(Value::Map(_))));

        if keyed || spread_maps {
            let mut map = RuleMap::new();
            for item in items {
                if item.spread {
                    if let Resolution::Resolved(Value::Map(other)) =
                        self.eval(frame, &item.value, scope)
                    {
                        merge_overwrite(&mut map, other);
                    }
                    continue;
                }
                let Some(key) = &item.key else {
                    continue;
                };
                let field = match self.eval(frame, key, scope) {
                    Resolution::Resolved(Value::Literal(literal)) => literal.to_php_string(),
                    _ => render(key),
                };
                let tokens = field_tokens(self.eval(frame, &item.value, scope));
                map.insert(field, tokens);
            }
            return Resolution::Resolved(Value::Map(map));
        }

        let mut tokens = Vec::new();
        for item in items {
            for token in element_tokens(self.eval(frame, &item.value, scope)) {
                push_unique(&mut tokens, token);
            }
        }
        Resolution::Resolved(Value::Tokens(tokens))
    }

    /// `a . b . c`: a literal when every operand is one
    fn eval_concat(&mut self, frame: &Frame, expr: &Expr, scope: &Scope) -> Resolution<Value> {
        let mut operands = Vec::new();
        flatten_concat(expr, &mut operands);

        let mut text = String::new();
        for operand in operands {
            match self.eval(frame, operand, scope) {
                Resolution::Resolved(Value::Literal(literal)) => {
                    text.push_str(&literal.to_php_string())
                }
                _ => return Resolution::Fallback(render(expr)),
            }
        }
        Resolution::Resolved(Value::Literal(Literal::String(text)))
    }

    /// Two alternatives of which either may run: their union, or whichever side is known
    fn eval_alternatives(
        &mut self,
        frame: &Frame,
        first: &Expr,
        second: &Expr,
        scope: &Scope,
    ) -> Resolution<Value> {
        let first = self.eval(frame, first, scope);
        let second = self.eval(frame, second, scope);
        match (first, second) {
            (Resolution::Resolved(a), Resolution::Resolved(b)) => {
                Resolution::Resolved(merge_values(a, b))
            }
            (Resolution::Resolved(a), _) => Resolution::Resolved(a),
            (_, second) => second,
        }
    }

    fn eval_function(
        &mut self,
        frame: &Frame,
        expr: &Expr,
        function: &str,
        args: &[Arg],
        scope: &Scope,
    ) -> Resolution<Value> {
        let function = function.trim_start_matches('\\').to_ascii_lowercase();
        match function.as_str() {
            "array_merge" | "array_replace" => {
                let mut map = RuleMap::new();
                for arg in args {
                    if let Resolution::Resolved(Value::Map(other)) =
                        self.eval(frame, &arg.value, scope)
                    {
                        merge_overwrite(&mut map, other);
                    }
                }
                Resolution::Resolved(Value::Map(map))
            }
            "array_merge_recursive" => {
                let mut map = RuleMap::new();
                for arg in args {
                    if let Resolution::Resolved(Value::Map(other)) =
                        self.eval(frame, &arg.value, scope)
                    {
                        merge_union(&mut map, &other);
                    }
                }
                Resolution::Resolved(Value::Map(map))
            }
            "implode" | "join" if args.len() == 2 => {
                let separator = self.eval(frame, &args[0].value, scope);
                let pieces = self.eval(frame, &args[1].value, scope);
                match (separator, pieces) {
                    (
                        Resolution::Resolved(Value::Literal(separator)),
                        Resolution::Resolved(Value::Tokens(tokens)),
                    ) if tokens.iter().all(|t| t.as_str().is_some()) => {
                        let parts: Vec<&str> = tokens.iter().filter_map(|t| t.as_str()).collect();
                        Resolution::Resolved(Value::Literal(Literal::String(
                            parts.join(&separator.to_php_string()),
                        )))
                    }
                    _ => Resolution::Fallback(render(expr)),
                }
            }
            _ => Resolution::Fallback(render(expr)),
        }
    }

    fn eval_static_call(
        &mut self,
        frame: &Frame,
        expr: &Expr,
        class: &str,
        method: &str,
        args: &[Arg],
        scope: &Scope,
    ) -> Resolution<Value> {
        match class.to_ascii_lowercase().as_str() {
            "parent" => return self.delegate_parent(frame, method),
            "self" | "static" => return self.delegate(frame, method),
            _ => {}
        }
        if let Some(family) = builder::family(short_name(class)) {
            let built = self.build_args(frame, args, scope);
            return Resolution::Resolved(Value::Tokens(builder::build_static(
                family, method, &built,
            )));
        }
        if frame.class.resolve_name(class).eq_ignore_ascii_case(&frame.class.fqcn) {
            return self.delegate(frame, method);
        }
        Resolution::Fallback(render(expr))
    }

    fn eval_new(
        &mut self,
        frame: &Frame,
        class: &str,
        args: &[Arg],
        scope: &Scope,
    ) -> Resolution<Value> {
        let short = short_name(class);
        let qualified = frame.class.resolve_name(class);
        let built = self.build_args(frame, args, scope);

        let framework = FRAMEWORK_RULE_CLASSES
            .iter()
            .any(|c| c.eq_ignore_ascii_case(short))
            && !self.is_project_class(&qualified);
        if framework {
            return Resolution::Resolved(Value::Tokens(builder::build_new(short, &built)));
        }
        Resolution::Resolved(Value::Tokens(vec![builder::custom_rule(short, &built)]))
    }

    fn eval_property(&mut self, frame: &Frame, expr: &Expr, property: &str) -> Resolution<Value> {
        let default = frame
            .class
            .decl()
            .property(property)
            .and_then(|p| p.default.clone());
        match default {
            Some(default) => self.eval(frame, &default, &Scope::default()),
            None => Resolution::Fallback(render(expr)),
        }
    }

    /// Evaluate call arguments for a rule builder
    fn build_args(&mut self, frame: &Frame, args: &[Arg], scope: &Scope) -> Vec<BuiltArg> {
        args.iter()
            .map(|arg| {
                let class_ref = match &arg.value {
                    Expr::ClassConst { class, constant }
                        if constant.eq_ignore_ascii_case("class") =>
                    {
                        Some(frame.class.resolve_name(class))
                    }
                    _ => None,
                };
                let enum_values = class_ref.as_deref().and_then(|fqcn| self.enum_values(fqcn));
                BuiltArg {
                    name: arg.name.clone(),
                    value: self.eval(frame, &arg.value, scope),
                    rendered: render(&arg.value),
                    class_ref,
                    enum_values,
                }
            })
            .collect()
    }

    fn enum_values(&mut self, fqcn: &str) -> Option<Vec<serde_json::Value>> {
        self.resolver.as_deref_mut()?.enum_values(fqcn)
    }

    fn is_project_class(&mut self, fqcn: &str) -> bool {
        self.resolver
            .as_deref()
            .is_some_and(|r| r.index().locate(fqcn).is_some())
    }

    /// `$this->method()` / `self::method()`: the union of the values the method returns
    pub(crate) fn delegate(&mut self, frame: &Frame, method: &str) -> Resolution<Value> {
        if let Some(decl) = frame.method(method) {
            let decl = decl.clone();
            return self.eval_method(frame.class.clone(), &decl);
        }
        let Some(resolver) = self.resolver.as_deref_mut() else {
            debug!("Method {}::{} not found", frame.class.fqcn, method);
            return Resolution::Empty;
        };
        match resolver.find_method(&frame.class, method) {
            Ok(Some((owner, decl))) => self.eval_method(owner, &decl),
            Ok(None) => {
                debug!("Method {}::{} not found", frame.class.fqcn, method);
                Resolution::Empty
            }
            Err(e) => {
                debug!("Could not resolve {}::{}: {}", frame.class.fqcn, method, e);
                Resolution::Empty
            }
        }
    }

    /// `parent::method()`
    fn delegate_parent(&mut self, frame: &Frame, method: &str) -> Resolution<Value> {
        let Some(resolver) = self.resolver.as_deref_mut() else {
            return Resolution::Empty;
        };
        let found = match resolver.parent_of(&frame.class) {
            Ok(Some(parent)) => resolver.find_method(&parent, method),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        match found {
            Ok(Some((owner, decl))) => self.eval_method(owner, &decl),
            Ok(None) => {
                debug!("parent::{} not found for {}", method, frame.class.fqcn);
                Resolution::Empty
            }
            Err(e) => {
                debug!("Could not resolve parent of {}: {}", frame.class.fqcn, e);
                Resolution::Empty
            }
        }
    }

    fn eval_method(&mut self, owner: ResolvedClass, decl: &MethodDecl) -> Resolution<Value> {
        let key = format!("{}::{}", owner.fqcn, decl.name).to_ascii_lowercase();
        if self.call_stack.contains(&key) {
            debug!("Recursive call to {} ignored", key);
            return Resolution::Empty;
        }

        self.call_stack.push(key);
        let frame = Frame::new(owner);
        let branches = self.collect_branches(&frame, &decl.body);
        self.call_stack.pop();

        fold_alternatives(branches.into_iter().map(|b| b.value).collect())
    }
}

/// Union of every resolved alternative; the first fallback when none resolved
fn fold_alternatives(values: Vec<Resolution<Value>>) -> Resolution<Value> {
    let mut result: Option<Value> = None;
    let mut fallback = None;
    for value in values {
        match value {
            Resolution::Resolved(value) => {
                result = Some(match result {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                });
            }
            Resolution::Fallback(text) => fallback = fallback.or(Some(text)),
            Resolution::Empty => {}
        }
    }
    match (result, fallback) {
        (Some(value), _) => Resolution::Resolved(value),
        (None, Some(text)) => Resolution::Fallback(text),
        (None, None) => Resolution::Empty,
    }
}

fn combine_maps(
    left: Resolution<Value>,
    right: Resolution<Value>,
    merge: fn(&mut RuleMap, RuleMap),
) -> Resolution<Value> {
    let mut map = RuleMap::new();
    for side in [left, right] {
        if let Resolution::Resolved(Value::Map(other)) = side {
            merge(&mut map, other);
        }
    }
    Resolution::Resolved(Value::Map(map))
}

fn flatten_concat<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary { op, left, right } if op == "." => {
            flatten_concat(left, out);
            flatten_concat(right, out);
        }
        _ => out.push(expr),
    }
}

/// Innermost receiver of a fluent chain when it is a rule builder or a `new` expression
/// (`Rule::unique('users')->ignore($id)` → `Rule::unique('users')`)
fn chain_base(expr: &Expr) -> Option<&Expr> {
    let mut current = expr;
    while let Expr::MethodCall { object, .. } = current {
        current = object;
    }
    match current {
        Expr::StaticCall { class, .. } if builder::family(short_name(class)).is_some() => {
            Some(current)
        }
        Expr::New { .. } => Some(current),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::extractor::class_from;
    use crate::rules::{RuleArgs, RuleMarker};
    use pretty_assertions::assert_eq;

    fn plain(tokens: &[&str]) -> Vec<RuleToken> {
        tokens.iter().map(|t| RuleToken::plain(*t)).collect()
    }

    #[test]
    fn test_field_tokens_split_pipes_only_for_strings() {
        let piped =
            Resolution::Resolved(Value::Literal(Literal::String("required|max:255".to_string())));
        assert_eq!(field_tokens(piped.clone()), plain(&["required", "max:255"]));
        assert_eq!(element_tokens(piped), plain(&["required|max:255"]));
        assert_eq!(
            field_tokens(Resolution::Fallback("$this->dynamicRules()".to_string())),
            plain(&["$this->dynamicRules()"])
        );
        assert!(field_tokens(Resolution::Empty).is_empty());
    }

    #[test]
    fn test_scope_union_merges_bindings() {
        let mut a = Scope::default();
        a.set("rule", Value::Literal(Literal::String("required".to_string())));
        let mut b = Scope::default();
        b.set("rule", Value::Literal(Literal::String("nullable".to_string())));
        b.set("only_b", Value::Tokens(plain(&["string"])));

        let joined = Scope::union(vec![a, b]).unwrap();
        assert_eq!(
            joined.get("rule"),
            Some(&Value::Tokens(plain(&["required", "nullable"])))
        );
        assert!(joined.contains("only_b"));
        assert!(Scope::union(Vec::new()).is_none());
    }

    #[test]
    fn test_merge_values_prefers_maps() {
        let mut map = RuleMap::new();
        map.insert("name".to_string(), plain(&["string"]));
        let merged = merge_values(Value::Map(map.clone()), Value::Tokens(plain(&["x"])));
        assert_eq!(merged, Value::Map(map));
    }

    #[test]
    fn test_value_to_map_ignores_non_maps() {
        assert!(value_to_map(Resolution::Resolved(Value::Tokens(plain(&["required"])))).is_empty());
        assert!(value_to_map(Resolution::Fallback("$rules".to_string())).is_empty());
    }

    #[test]
    fn test_closure_is_custom_rule() {
        let mut extractor = RuleSetExtractor::new();
        let frame = Frame::new(class_from("<?php class Inline {}"));
        let closure = Expr::Array(vec![ArrayItem {
            key: None,
            value: Expr::Closure {
                params: Vec::new(),
                body: Vec::new(),
            },
            spread: false,
        }]);
        let value = extractor.eval(&frame, &closure, &Scope::default());
        assert_eq!(
            value,
            Resolution::Resolved(Value::Tokens(vec![RuleToken::Marker(RuleMarker::CustomRule {
                class: "Closure".to_string(),
                args: RuleArgs::Positional(Vec::new()),
            })]))
        );
    }
}
