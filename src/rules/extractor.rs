use super::condition::{ConditionClassifier, ConditionResult};
use super::evaluator::{value_to_map, Resolution, Scope, Value};
use super::{merge_keep_first, merge_union, ConditionalRule, ConditionalRuleSet, RuleMap};
use crate::class_resolver::{ClassResolver, ResolvedClass};
use crate::parser::ast::{short_name, Expr, Literal, MethodDecl, Stmt};
use log::{debug, info};
use std::collections::HashMap;

/// Rule-set extractor.
///
/// Walks the body of a rules method, following every `if`/`elseif`/`else`, `switch` and
/// `match` path while tracking local variables, and yields one [`ConditionalRule`] per
/// reachable `return`. Methods delegated to through `$this->`, `self::` and `parent::` are
/// resolved through the optional [`ClassResolver`]; without one only the class's own methods
/// are followed.
///
/// # Example
///
/// ```no_run
/// use openapi_from_laravel::rules::RuleSetExtractor;
/// # fn demo(class: &openapi_from_laravel::class_resolver::ResolvedClass) {
/// let mut extractor = RuleSetExtractor::new();
/// let rule_set = extractor.extract(class, "rules");
/// println!("{} branches", rule_set.rules.len());
/// # }
/// ```
pub struct RuleSetExtractor<'r> {
    pub(crate) resolver: Option<&'r mut ClassResolver>,
    /// `fqcn::method` keys of the methods currently being evaluated
    pub(crate) call_stack: Vec<String>,
}

/// A class being evaluated, with its method table
pub(crate) struct Frame {
    pub class: ResolvedClass,
    methods: HashMap<String, usize>,
}

impl Frame {
    pub fn new(class: ResolvedClass) -> Self {
        let methods = class
            .decl()
            .methods
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.to_ascii_lowercase(), i))
            .collect();
        Self { class, methods }
    }

    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        let index = *self.methods.get(&name.to_ascii_lowercase())?;
        self.class.decl().methods.get(index)
    }
}

/// A reachable `return` and the conditions leading to it
#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub conditions: Vec<ConditionResult>,
    pub value: Resolution<Value>,
}

/// A live path through a method body: the conditions leading to it and its local variables
#[derive(Debug, Clone, Default)]
struct PathState {
    conditions: Vec<ConditionResult>,
    scope: Scope,
}

/// Past this many live paths they are joined into one
const MAX_LIVE_PATHS: usize = 16;

impl Default for RuleSetExtractor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> RuleSetExtractor<'r> {
    pub fn new() -> Self {
        Self {
            resolver: None,
            call_stack: Vec::new(),
        }
    }

    /// Extractor that follows delegated methods across files
    pub fn with_resolver(resolver: &'r mut ClassResolver) -> Self {
        Self {
            resolver: Some(resolver),
            call_stack: Vec::new(),
        }
    }

    /// Extract the conditional rule set of `method` on `class` (inherited methods included).
    ///
    /// A class without such a method yields an empty set.
    pub fn extract(&mut self, class: &ResolvedClass, method: &str) -> ConditionalRuleSet {
        let frame = Frame::new(class.clone());
        let found = match frame.method(method) {
            Some(decl) => Some((class.clone(), decl.clone())),
            None => match self.resolver.as_deref_mut() {
                Some(resolver) => resolver.find_method(class, method).unwrap_or_else(|e| {
                    debug!("Could not resolve {}::{}: {}", class.fqcn, method, e);
                    None
                }),
                None => None,
            },
        };

        match found {
            Some((owner, decl)) => self.extract_method(&owner, &decl),
            None => {
                debug!("{} has no {}() method", class.fqcn, method);
                ConditionalRuleSet::default()
            }
        }
    }

    /// Extract the conditional rule set of a specific method declaration of `class`
    pub fn extract_method(
        &mut self,
        class: &ResolvedClass,
        method: &MethodDecl,
    ) -> ConditionalRuleSet {
        let key = format!("{}::{}", class.fqcn, method.name).to_ascii_lowercase();
        self.call_stack.push(key);
        let frame = Frame::new(class.clone());
        let branches = self.collect_branches(&frame, &method.body);
        self.call_stack.pop();

        let rules: Vec<ConditionalRule> = branches
            .into_iter()
            .map(|branch| ConditionalRule::new(branch.conditions, value_to_map(branch.value)))
            .collect();
        let rule_set = ConditionalRuleSet::from_rules(rules);
        info!(
            "Extracted {} rule branch(es) with {} field(s) from {}::{}",
            rule_set.rules.len(),
            rule_set.merged.len(),
            class.fqcn,
            method.name
        );
        rule_set
    }

    /// Rules passed to inline validation calls inside a method body: `$request->validate()`,
    /// `$this->validate($request, ...)`, `Validator::make()` and `validator()`.
    ///
    /// Local variables assigned before the call are taken into account. Several calls in one
    /// method are unioned.
    pub fn extract_inline(&mut self, class: &ResolvedClass, method: &MethodDecl) -> RuleMap {
        let frame = Frame::new(class.clone());
        let mut scope = Scope::default();
        let mut rules = RuleMap::new();
        self.scan_inline(&frame, &method.body, &mut scope, &mut rules);
        rules
    }

    fn scan_inline(
        &mut self,
        frame: &Frame,
        body: &[Stmt],
        scope: &mut Scope,
        rules: &mut RuleMap,
    ) {
        for stmt in body {
            let mut calls = Vec::new();
            match stmt {
                Stmt::Expr(expr) | Stmt::Return(Some(expr)) => {
                    expr.walk(&mut |e| {
                        if let Some(arg) = inline_rules_argument(e) {
                            calls.push(arg.clone());
                        }
                    });
                }
                Stmt::If {
                    condition,
                    then_branch,
                    else_ifs,
                    else_branch,
                } => {
                    condition.walk(&mut |e| {
                        if let Some(arg) = inline_rules_argument(e) {
                            calls.push(arg.clone());
                        }
                    });
                    self.scan_inline(frame, then_branch, scope, rules);
                    for else_if in else_ifs {
                        self.scan_inline(frame, &else_if.body, scope, rules);
                    }
                    if let Some(else_branch) = else_branch {
                        self.scan_inline(frame, else_branch, scope, rules);
                    }
                }
                Stmt::Switch { cases, .. } => {
                    for case in cases {
                        self.scan_inline(frame, &case.body, scope, rules);
                    }
                }
                Stmt::Loop(body) | Stmt::Block(body) => self.scan_inline(frame, body, scope, rules),
                Stmt::Try {
                    body,
                    catches,
                    finally,
                } => {
                    self.scan_inline(frame, body, scope, rules);
                    for catch in catches {
                        self.scan_inline(frame, catch, scope, rules);
                    }
                    if let Some(finally) = finally {
                        self.scan_inline(frame, finally, scope, rules);
                    }
                }
                Stmt::Return(None) | Stmt::Other(_) => {}
            }

            for arg in calls {
                let found = value_to_map(self.eval(frame, &arg, scope));
                merge_union(rules, &found);
            }
            if let Stmt::Expr(expr) = stmt {
                self.apply_assignment(frame, expr, scope);
            }
        }
    }

    /// Walk a method body and collect every reachable return
    pub(crate) fn collect_branches(&mut self, frame: &Frame, body: &[Stmt]) -> Vec<Branch> {
        let mut out = Vec::new();
        self.walk(frame, body, vec![PathState::default()], &mut out);
        out
    }

    /// Walk a statement list from every live path. Returns the paths still running at its end.
    fn walk(
        &mut self,
        frame: &Frame,
        body: &[Stmt],
        mut states: Vec<PathState>,
        out: &mut Vec<Branch>,
    ) -> Vec<PathState> {
        for stmt in body {
            if states.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for state in states {
                next.extend(self.walk_stmt(frame, stmt, state, out));
            }
            states = coalesce(next);
        }
        states
    }

    fn walk_stmt(
        &mut self,
        frame: &Frame,
        stmt: &Stmt,
        mut state: PathState,
        out: &mut Vec<Branch>,
    ) -> Vec<PathState> {
        match stmt {
            Stmt::Expr(expr) => {
                self.apply_assignment(frame, expr, &mut state.scope);
                vec![state]
            }
            Stmt::Return(None) => Vec::new(),
            Stmt::Return(Some(Expr::Match { subject, arms })) => {
                for arm in arms {
                    let conditions: Vec<ConditionResult> = match &arm.conditions {
                        Some(values) => values
                            .iter()
                            .map(|value| ConditionClassifier::classify_comparison(subject, value))
                            .collect(),
                        None => vec![ConditionResult::ElseBranch],
                    };
                    let value = self.eval(frame, &arm.body, &state.scope);
                    for condition in conditions {
                        out.push(Branch {
                            conditions: extend(&state.conditions, condition),
                            value: value.clone(),
                        });
                    }
                }
                Vec::new()
            }
            Stmt::Return(Some(expr)) => {
                let value = self.eval(frame, expr, &state.scope);
                out.push(Branch {
                    conditions: state.conditions,
                    value,
                });
                Vec::new()
            }
            Stmt::If {
                condition,
                then_branch,
                else_ifs,
                else_branch,
            } => {
                let mut arms: Vec<(ConditionResult, &[Stmt])> =
                    vec![(ConditionClassifier::classify(condition), then_branch.as_slice())];
                for else_if in else_ifs {
                    arms.push((
                        ConditionClassifier::classify(&else_if.condition),
                        else_if.body.as_slice(),
                    ));
                }
                if let Some(else_branch) = else_branch {
                    arms.push((ConditionResult::ElseBranch, else_branch.as_slice()));
                }
                let exhaustive = else_branch.is_some();
                self.walk_arms(frame, arms, exhaustive, state, out)
            }
            Stmt::Switch { subject, cases } => {
                let mut arms: Vec<(ConditionResult, &[Stmt])> = Vec::new();
                let mut pending = Vec::new();
                let mut has_default = false;
                for case in cases {
                    let condition = match &case.test {
                        Some(test) => ConditionClassifier::classify_comparison(subject, test),
                        None => {
                            has_default = true;
                            ConditionResult::ElseBranch
                        }
                    };
                    pending.push(condition);
                    // empty bodies fall through to the next case
                    if case.body.is_empty() {
                        continue;
                    }
                    for condition in pending.drain(..) {
                        arms.push((condition, case.body.as_slice()));
                    }
                }
                self.walk_arms(frame, arms, has_default, state, out)
            }
            Stmt::Loop(body) => {
                let inner: Vec<Scope> = self
                    .walk(frame, body, vec![state.clone()], out)
                    .into_iter()
                    .map(|s| s.scope)
                    .collect();
                let mut scopes = vec![state.scope.clone()];
                scopes.extend(inner);
                if let Some(joined) = Scope::union(scopes) {
                    state.scope = joined;
                }
                vec![state]
            }
            Stmt::Block(body) => self.walk(frame, body, vec![state], out),
            Stmt::Try {
                body,
                catches,
                finally,
            } => {
                let after = self.walk(frame, body, vec![state.clone()], out);
                for catch in catches {
                    self.walk(frame, catch, vec![state.clone()], out);
                }
                match finally {
                    Some(finally) if after.is_empty() => {
                        self.walk(frame, finally, vec![state], out);
                        Vec::new()
                    }
                    Some(finally) => self.walk(frame, finally, after, out),
                    None => after,
                }
            }
            Stmt::Other(_) => vec![state],
        }
    }

    /// Walk alternative arms, each forked from `state` with its condition appended. Arms that
    /// do not return keep running as separate paths; a non-exhaustive chain also continues
    /// with `state` unchanged.
    fn walk_arms(
        &mut self,
        frame: &Frame,
        arms: Vec<(ConditionResult, &[Stmt])>,
        exhaustive: bool,
        state: PathState,
        out: &mut Vec<Branch>,
    ) -> Vec<PathState> {
        let falls_through = !exhaustive || arms.is_empty();
        let mut continuing = Vec::new();
        for (condition, body) in arms {
            let arm = PathState {
                conditions: extend(&state.conditions, condition),
                scope: state.scope.clone(),
            };
            continuing.extend(self.walk(frame, body, vec![arm], out));
        }
        if falls_through {
            continuing.push(state);
        }
        coalesce(continuing)
    }

    /// Track `$var = ...`, `.=`, `+=` and `??=` on local variables
    fn apply_assignment(&mut self, frame: &Frame, expr: &Expr, scope: &mut Scope) {
        let Expr::Assign { target, op, value } = expr else {
            return;
        };
        let name = match &**target {
            Expr::Variable(name) => name,
            Expr::Index { .. } => {
                debug!("Element assignment {} is not tracked", crate::parser::render(target));
                return;
            }
            _ => return,
        };

        let resolved = match op.as_deref() {
            None => self.eval(frame, value, scope),
            Some(".=") => match (scope.get(name).cloned(), self.eval(frame, value, scope)) {
                (
                    Some(Value::Literal(existing)),
                    Resolution::Resolved(Value::Literal(suffix)),
                ) => Resolution::Resolved(Value::Literal(Literal::String(format!(
                    "{}{}",
                    existing.to_php_string(),
                    suffix.to_php_string()
                )))),
                _ => Resolution::Empty,
            },
            Some("+=") => match (scope.get(name).cloned(), self.eval(frame, value, scope)) {
                (Some(Value::Map(mut existing)), Resolution::Resolved(Value::Map(other))) => {
                    merge_keep_first(&mut existing, other);
                    Resolution::Resolved(Value::Map(existing))
                }
                (Some(existing), _) => Resolution::Resolved(existing),
                (None, other) => other,
            },
            Some("??=") => {
                if scope.contains(name) {
                    return;
                }
                self.eval(frame, value, scope)
            }
            Some(_) => Resolution::Empty,
        };

        match resolved {
            Resolution::Resolved(value) => scope.set(name, value),
            _ => {
                debug!("${} is no longer statically known", name);
                scope.remove(name);
            }
        }
    }
}

/// Join paths whose variables are identical, keeping the conditions they share. Too many
/// paths collapse into a single one holding the union of their variables.
fn coalesce(states: Vec<PathState>) -> Vec<PathState> {
    let mut joined: Vec<PathState> = Vec::new();
    for state in states {
        match joined.iter_mut().find(|s| s.scope == state.scope) {
            Some(existing) => {
                existing.conditions = common_prefix(&existing.conditions, &state.conditions);
            }
            None => joined.push(state),
        }
    }
    if joined.len() <= MAX_LIVE_PATHS {
        return joined;
    }

    debug!("{} live paths, joining their variables", joined.len());
    let conditions = joined
        .iter()
        .skip(1)
        .fold(joined[0].conditions.clone(), |acc, s| common_prefix(&acc, &s.conditions));
    let scope = Scope::union(joined.into_iter().map(|s| s.scope).collect()).unwrap_or_default();
    vec![PathState { conditions, scope }]
}

fn common_prefix(a: &[ConditionResult], b: &[ConditionResult]) -> Vec<ConditionResult> {
    a.iter().zip(b).take_while(|(x, y)| x == y).map(|(x, _)| x.clone()).collect()
}

fn extend(path: &[ConditionResult], condition: ConditionResult) -> Vec<ConditionResult> {
    let mut conditions = path.to_vec();
    conditions.push(condition);
    conditions
}

/// The rules argument of an inline validation call
fn inline_rules_argument(expr: &Expr) -> Option<&Expr> {
    match expr {
        Expr::MethodCall {
            object, method, args, ..
        } => {
            let position = match method.to_ascii_lowercase().as_str() {
                // ValidatesRequests::validate($request, $rules)
                "validate" if object.is_this() => 1,
                "validate" => 0,
                "validatewithbag" if object.is_this() => 2,
                "validatewithbag" => 1,
                _ => return None,
            };
            args.get(position).map(|a| &a.value)
        }
        Expr::StaticCall {
            class,
            method,
            args,
        } if short_name(class).eq_ignore_ascii_case("Validator")
            && method.eq_ignore_ascii_case("make") =>
        {
            args.get(1).map(|a| &a.value)
        }
        Expr::Call { function, args }
            if function.trim_start_matches('\\').eq_ignore_ascii_case("validator") =>
        {
            args.get(1).map(|a| &a.value)
        }
        _ => None,
    }
}

/// First class of an inline PHP snippet
#[cfg(test)]
pub(crate) fn class_from(source: &str) -> ResolvedClass {
    use crate::parser::PhpParser;
    use std::path::Path;
    use std::rc::Rc;

    let parsed = PhpParser::new()
        .unwrap()
        .parse_source(Path::new("inline.php"), source)
        .unwrap();
    let name = parsed.ast.classes[0].name.clone();
    ResolvedClass::from_parsed(Rc::new(parsed), &name).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_resolver::resolver_for;
    use crate::rules::{RuleArgs, RuleMarker, RuleToken};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn plain(tokens: &[&str]) -> Vec<RuleToken> {
        tokens.iter().map(|t| RuleToken::plain(*t)).collect()
    }

    fn extract(source: &str) -> ConditionalRuleSet {
        let class = class_from(source);
        RuleSetExtractor::new().extract(&class, "rules")
    }

    #[test]
    fn test_plain_rules_method() {
        let set = extract(
            r#"<?php
class StoreUserRequest {
    public function rules(): array {
        return [
            'name' => 'required|string|max:255',
            'email' => ['required', 'email', 'unique:users'],
            'age' => ['nullable', 'integer', 'min:' . 18],
        ];
    }
}"#,
        );

        assert!(!set.has_conditions);
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.merged["name"], plain(&["required", "string", "max:255"]));
        assert_eq!(set.merged["email"], plain(&["required", "email", "unique:users"]));
        assert_eq!(set.merged["age"], plain(&["nullable", "integer", "min:18"]));
    }

    #[test]
    fn test_is_method_branches() {
        let set = extract(
            r#"<?php
class UserRequest {
    public function rules() {
        if ($this->isMethod('POST')) {
            return ['email' => 'required|email'];
        }
        return ['email' => 'sometimes|email'];
    }
}"#,
        );

        assert_eq!(set.rules.len(), 2);
        assert!(set.has_conditions);
        assert!(matches!(
            &set.rules[0].conditions[..],
            [ConditionResult::HttpMethod { method: Some(m), .. }] if m == "POST"
        ));
        assert!(set.rules[1].conditions.is_empty());
        assert_eq!(set.merged["email"], plain(&["required", "email", "sometimes"]));
        assert_eq!(set.rules_for_method("POST")["email"], plain(&["required", "email"]));
    }

    #[test]
    fn test_if_chain_yields_one_rule_per_arm() {
        let set = extract(
            r#"<?php
class ChainRequest {
    public function rules() {
        if ($this->isMethod('POST')) {
            return ['a' => 'required'];
        } elseif ($this->isMethod('PUT')) {
            return ['b' => 'required'];
        } elseif ($this->user()->isAdmin()) {
            return ['c' => 'required'];
        } else {
            return ['d' => 'required'];
        }
    }
}"#,
        );

        assert_eq!(set.rules.len(), 4);
        assert_eq!(set.rules[3].conditions, vec![ConditionResult::ElseBranch]);
        assert_eq!(set.rules[2].conditions[0].kind(), "user_check");
        assert_eq!(set.rules.iter().map(|r| r.probability).collect::<Vec<_>>(), vec![0.5; 4]);
        assert_eq!(set.merged.len(), 4);
    }

    #[test]
    fn test_variable_accumulation_across_branches() {
        let set = extract(
            r#"<?php
class ProfileRequest {
    public function rules() {
        $rules = ['name' => 'required'];
        if ($this->filled('password')) {
            $rules['password'] = 'confirmed';
            $rules += ['password_confirmation' => 'required'];
        }
        $suffix = '|max:10';
        $rules = array_merge($rules, ['nickname' => 'string' . $suffix]);
        return $rules;
    }
}"#,
        );

        // the path through the `if` and the one skipping it
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].conditions[0].kind(), "request_field");
        assert!(set.rules[1].conditions.is_empty());
        assert!(!set.rules[1].rules.contains_key("password_confirmation"));
        assert_eq!(set.rules[1].rules["nickname"], plain(&["string", "max:10"]));
        let merged = &set.merged;
        assert_eq!(merged["name"], plain(&["required"]));
        assert_eq!(merged["password_confirmation"], plain(&["required"]));
        assert_eq!(merged["nickname"], plain(&["string", "max:10"]));
        assert!(!merged.contains_key("password"));
    }

    #[test]
    fn test_assigned_arms_keep_their_conditions() {
        let set = extract(
            r#"<?php
class AccountRequest {
    public function rules() {
        if ($this->isMethod('POST')) {
            $rules = ['email' => 'required|email'];
        } else {
            $rules = ['email' => 'sometimes|email'];
        }
        return $rules;
    }
}"#,
        );

        assert_eq!(set.rules.len(), 2);
        assert!(matches!(
            &set.rules[0].conditions[..],
            [ConditionResult::HttpMethod { method: Some(m), .. }] if m == "POST"
        ));
        assert_eq!(set.rules[1].conditions, vec![ConditionResult::ElseBranch]);
        assert_eq!(set.rules_for_method("POST")["email"], plain(&["required", "email"]));
        assert_eq!(set.merged["email"], plain(&["required", "email", "sometimes"]));
    }

    #[test]
    fn test_arms_without_changes_do_not_fork() {
        let set = extract(
            r#"<?php
class QuietRequest {
    public function rules() {
        $rules = ['name' => 'required'];
        if ($this->has('debug')) {
            logger('debug');
        }
        foreach ($this->extras() as $extra) {
            $flag = true;
        }
        return $rules;
    }
}"#,
        );

        assert_eq!(set.rules.len(), 1);
        assert!(set.rules[0].conditions.is_empty());
    }

    #[test]
    fn test_array_merge_and_plus_resolve_conflicts_differently() {
        let merge = extract(
            r#"<?php
class A {
    public function rules() {
        return array_merge(['name' => 'required'], ['name' => 'sometimes']);
    }
}"#,
        );
        let plus = extract(
            r#"<?php
class B {
    public function rules() {
        return ['name' => 'required'] + ['name' => 'sometimes', 'age' => 'integer'];
    }
}"#,
        );

        assert_eq!(merge.merged["name"], plain(&["sometimes"]));
        assert_eq!(plus.merged["name"], plain(&["required"]));
        assert_eq!(plus.merged["age"], plain(&["integer"]));
    }

    #[test]
    fn test_switch_and_match_on_method() {
        let switch = extract(
            r#"<?php
class SwitchRequest {
    public function rules() {
        switch ($this->method()) {
            case 'POST':
            case 'PUT':
                return ['title' => 'required'];
            case 'PATCH':
                return ['title' => 'sometimes'];
            default:
                return [];
        }
    }
}"#,
        );
        assert_eq!(switch.rules.len(), 4);
        let verbs: Vec<Option<bool>> = switch
            .rules
            .iter()
            .map(|r| r.conditions[0].applies_to_method("PUT"))
            .collect();
        assert_eq!(verbs, vec![Some(false), Some(true), Some(false), None]);
        assert_eq!(switch.rules_for_method("PUT")["title"], plain(&["required"]));
        assert_eq!(switch.rules_for_method("PATCH")["title"], plain(&["sometimes"]));

        let matched = extract(
            r#"<?php
class MatchRequest {
    public function rules() {
        return match ($this->method()) {
            'POST' => ['title' => 'required'],
            default => ['title' => 'nullable'],
        };
    }
}"#,
        );
        assert_eq!(matched.rules.len(), 2);
        assert_eq!(matched.rules[1].conditions, vec![ConditionResult::ElseBranch]);
        assert_eq!(matched.merged["title"], plain(&["required", "nullable"]));
    }

    #[test]
    fn test_rule_builders_and_custom_rules() {
        let set = extract(
            r#"<?php
namespace App\Http\Requests;

use App\Rules\StrongPassword;
use Illuminate\Validation\Rule;
use Illuminate\Validation\Rules\Password;

class RegisterRequest {
    public function rules() {
        return [
            'role' => [Rule::in()],
            'status' => [Rule::in($this->statuses())],
            'email' => ['required', Rule::unique('users')->ignore($this->user()->id)],
            'password' => ['required', Password::min(8)->mixedCase(), new StrongPassword(minLength: 16)],
            'slug' => [function ($attribute, $value, $fail) {}],
        ];
    }
}"#,
        );

        assert_eq!(set.merged["role"], plain(&["in:"]));
        assert_eq!(set.merged["status"], plain(&["in:..."]));
        assert_eq!(set.merged["email"], plain(&["required", "unique:users"]));
        assert_eq!(
            set.merged["password"],
            vec![
                RuleToken::plain("required"),
                RuleToken::plain("password"),
                RuleToken::plain("min:8"),
                RuleToken::Marker(RuleMarker::CustomRule {
                    class: "StrongPassword".to_string(),
                    args: RuleArgs::Named(indexmap::IndexMap::from([(
                        "minLength".to_string(),
                        serde_json::json!(16)
                    )])),
                }),
            ]
        );
        assert!(set.merged["slug"][0].is_custom());
    }

    #[test]
    fn test_custom_rule_deduplicated_across_branches() {
        let set = extract(
            r#"<?php
class PasswordRequest {
    public function rules() {
        if ($this->isMethod('POST')) {
            return ['password' => ['required', new StrongPassword(minLength: 16)]];
        }
        return ['password' => ['sometimes', new StrongPassword(minLength: 16)]];
    }
}"#,
        );
        let customs = set.merged["password"].iter().filter(|t| t.is_custom()).count();
        assert_eq!(customs, 1);
    }

    #[test]
    fn test_delegation_parent_and_enums_across_files() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[
                (
                    "app/Http/Requests/BaseRequest.php",
                    r#"<?php
namespace App\Http\Requests;
abstract class BaseRequest {
    public function rules() {
        return ['locale' => 'sometimes|string'];
    }
}"#,
                ),
                (
                    "app/Enums/Status.php",
                    r#"<?php
namespace App\Enums;
enum Status: string {
    case Active = 'active';
    case Banned = 'banned';
}"#,
                ),
                (
                    "app/Http/Requests/UpdateUserRequest.php",
                    r#"<?php
namespace App\Http\Requests;
use App\Enums\Status;
use Illuminate\Validation\Rules\Enum;
class UpdateUserRequest extends BaseRequest {
    public function rules() {
        return array_merge(parent::rules(), $this->profileRules(), [
            'status' => ['required', new Enum(Status::class)],
        ]);
    }
    protected function profileRules() {
        return ['bio' => 'nullable|string', 'loop' => $this->profileRules()];
    }
}"#,
                ),
            ],
        );

        let class = resolver
            .require_class("App\\Http\\Requests\\UpdateUserRequest")
            .unwrap();
        let set = RuleSetExtractor::with_resolver(&mut resolver).extract(&class, "rules");

        assert_eq!(set.merged["locale"], plain(&["sometimes", "string"]));
        assert_eq!(set.merged["bio"], plain(&["nullable", "string"]));
        assert!(set.merged["loop"].is_empty());
        assert_eq!(
            set.merged["status"][1],
            RuleToken::Marker(RuleMarker::Enum {
                class: "Status".to_string(),
                values: vec![serde_json::json!("active"), serde_json::json!("banned")],
            })
        );
    }

    #[test]
    fn test_missing_rules_method_is_empty() {
        let set = extract("<?php class NoRules { public function authorize() { return true; } }");
        assert!(set.is_empty());
        assert!(set.rules.is_empty());
    }

    #[test]
    fn test_unknown_method_contributes_nothing() {
        let set = extract(
            r#"<?php
class Unknown {
    public function rules() {
        $rules = $this->notDefinedAnywhere();
        return $rules;
    }
}"#,
        );
        assert_eq!(set.rules.len(), 1);
        assert!(set.merged.is_empty());
    }

    #[test]
    fn test_inline_validation() {
        let class = class_from(
            r#"<?php
class PostController {
    public function store(Request $request) {
        $rules = ['title' => 'required|max:120'];
        $data = $request->validate($rules + ['body' => 'required']);
        Validator::make($request->all(), ['tags' => 'array']);
        return Post::create($data);
    }
}"#,
        );
        let method = class.decl().method("store").unwrap().clone();
        let rules = RuleSetExtractor::new().extract_inline(&class, &method);

        assert_eq!(rules["title"], plain(&["required", "max:120"]));
        assert_eq!(rules["body"], plain(&["required"]));
        assert_eq!(rules["tags"], plain(&["array"]));
    }
}
