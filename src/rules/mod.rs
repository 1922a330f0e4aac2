//! Validation rule extraction.
//!
//! The rule-set extractor walks a method body (typically a FormRequest's `rules()`), tracks
//! local variables, and produces one [`ConditionalRule`] per reachable `return`. Values are
//! resolved by a best-effort evaluator that never fails: anything it cannot understand
//! degrades to an empty contribution or a rendered-source fallback token.

mod builder;
pub mod condition;
mod evaluator;
pub mod extractor;

pub use condition::{ConditionClassifier, ConditionResult};
pub use evaluator::Resolution;
pub use extractor::RuleSetExtractor;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single validation directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleToken {
    /// `required`, `max:255`
    Plain(String),
    Marker(RuleMarker),
}

/// Structured rule that cannot be expressed as a plain string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleMarker {
    /// `new SomeRule(...)` for a class that is not one of the framework's own rules
    CustomRule { class: String, args: RuleArgs },
    /// `new Enum(Status::class)` / `Rule::enum(Status::class)`
    Enum {
        class: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        values: Vec<serde_json::Value>,
    },
}

/// Constructor arguments of a custom rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleArgs {
    Positional(Vec<serde_json::Value>),
    /// Used as soon as one argument is named; positional ones are keyed by index
    Named(IndexMap<String, serde_json::Value>),
}

impl RuleToken {
    pub fn plain(value: impl Into<String>) -> Self {
        RuleToken::Plain(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RuleToken::Plain(s) => Some(s),
            RuleToken::Marker(_) => None,
        }
    }

    /// Rule name without parameters (`max:255` → `max`)
    pub fn name(&self) -> Option<&str> {
        self.as_str().map(|s| s.split(':').next().unwrap_or(s))
    }

    /// Parameter part of a plain token (`max:255` → `255`)
    pub fn parameter(&self) -> Option<&str> {
        self.as_str().and_then(|s| s.split_once(':')).map(|(_, p)| p)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, RuleToken::Marker(RuleMarker::CustomRule { .. }))
    }
}

/// Field name → rule tokens, in declaration order
pub type RuleMap = IndexMap<String, Vec<RuleToken>>;

/// Append a token unless an equal one is already present
pub fn push_unique(tokens: &mut Vec<RuleToken>, token: RuleToken) {
    if !tokens.contains(&token) {
        tokens.push(token);
    }
}

/// `array_merge` semantics: later mappings overwrite earlier ones per field
pub fn merge_overwrite(base: &mut RuleMap, other: RuleMap) {
    for (field, tokens) in other {
        base.insert(field, tokens);
    }
}

/// Array `+` semantics: earlier mappings win on field conflicts
pub fn merge_keep_first(base: &mut RuleMap, other: RuleMap) {
    for (field, tokens) in other {
        base.entry(field).or_insert(tokens);
    }
}

/// Union across branches: every field of both, tokens deduplicated in first-seen order
pub fn merge_union(base: &mut RuleMap, other: &RuleMap) {
    for (field, tokens) in other {
        let entry = base.entry(field.clone()).or_default();
        for token in tokens {
            push_unique(entry, token.clone());
        }
    }
}

/// One reachable branch of a rules method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRule {
    /// Conjunction of the conditions leading to this branch
    pub conditions: Vec<ConditionResult>,
    pub rules: RuleMap,
    /// Execution likelihood: 1.0 halved for every condition on the path
    pub probability: f64,
}

impl ConditionalRule {
    pub fn new(conditions: Vec<ConditionResult>, rules: RuleMap) -> Self {
        let probability = 0.5f64.powi(conditions.len() as i32);
        Self {
            conditions,
            rules,
            probability,
        }
    }

    pub fn unconditional(rules: RuleMap) -> Self {
        Self::new(Vec::new(), rules)
    }

    /// Whether an HTTP-method condition on the path rules this branch out for `verb`
    fn excluded_for(&self, verb: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.applies_to_method(verb) == Some(false))
    }

    /// Whether every condition is an HTTP-method check matching `verb`
    fn selected_by(&self, verb: &str) -> bool {
        !self.conditions.is_empty()
            && self
                .conditions
                .iter()
                .all(|c| c.applies_to_method(verb) == Some(true))
    }
}

/// All branches of a rules method plus their union
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRuleSet {
    pub rules: Vec<ConditionalRule>,
    /// Union of every branch, custom-rule descriptors deduplicated per field
    pub merged: RuleMap,
    pub has_conditions: bool,
}

impl ConditionalRuleSet {
    pub fn from_rules(rules: Vec<ConditionalRule>) -> Self {
        let mut merged = RuleMap::new();
        for rule in &rules {
            merge_union(&mut merged, &rule.rules);
        }
        let has_conditions = rules.iter().any(|r| !r.conditions.is_empty());
        Self {
            rules,
            merged,
            has_conditions,
        }
    }

    /// A single unconditional branch
    pub fn unconditional(rules: RuleMap) -> Self {
        Self::from_rules(vec![ConditionalRule::unconditional(rules)])
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Rule mapping that applies to one HTTP verb.
    ///
    /// The first branch whose conditions are all HTTP-method checks matching `verb` wins;
    /// otherwise the union of every branch not excluded by a method mismatch is used.
    pub fn rules_for_method(&self, verb: &str) -> RuleMap {
        if !self.has_conditions {
            return self.merged.clone();
        }
        if let Some(rule) = self.rules.iter().find(|r| r.selected_by(verb)) {
            return rule.rules.clone();
        }
        let mut merged = RuleMap::new();
        for rule in self.rules.iter().filter(|r| !r.excluded_for(verb)) {
            merge_union(&mut merged, &rule.rules);
        }
        merged
    }

    /// Likelihood that `field` is validated at all: the best branch containing it, halved
    /// again when the field is only validated `sometimes`
    pub fn field_probability(&self, field: &str) -> f64 {
        self.rules
            .iter()
            .filter_map(|rule| {
                let tokens = rule.rules.get(field)?;
                let sometimes = tokens.iter().any(|t| t.as_str() == Some("sometimes"));
                Some(if sometimes {
                    rule.probability * 0.5
                } else {
                    rule.probability
                })
            })
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(entries: &[(&str, &[&str])]) -> RuleMap {
        entries
            .iter()
            .map(|(field, tokens)| {
                (
                    field.to_string(),
                    tokens.iter().map(|t| RuleToken::plain(*t)).collect(),
                )
            })
            .collect()
    }

    fn method_condition(verb: &str) -> ConditionResult {
        ConditionResult::HttpMethod {
            expression: format!("$this->isMethod('{}')", verb),
            method: Some(verb.to_string()),
            negated: false,
        }
    }

    #[test]
    fn test_merge_semantics_differ() {
        let a = map(&[("name", &["required"])]);
        let b = map(&[("name", &["sometimes"]), ("age", &["integer"])]);

        let mut merged = a.clone();
        merge_overwrite(&mut merged, b.clone());
        assert_eq!(merged["name"], vec![RuleToken::plain("sometimes")]);

        let mut union = a.clone();
        merge_keep_first(&mut union, b);
        assert_eq!(union["name"], vec![RuleToken::plain("required")]);
        assert_eq!(union.len(), 2);
    }

    #[test]
    fn test_merged_mapping_deduplicates_custom_rules() {
        let strong = RuleToken::Marker(RuleMarker::CustomRule {
            class: "StrongPassword".to_string(),
            args: RuleArgs::Named(IndexMap::from([(
                "minLength".to_string(),
                serde_json::json!(16),
            )])),
        });
        let mut first = RuleMap::new();
        first.insert("password".to_string(), vec![RuleToken::plain("required"), strong.clone()]);
        let mut second = RuleMap::new();
        second.insert("password".to_string(), vec![RuleToken::plain("sometimes"), strong]);

        let set = ConditionalRuleSet::from_rules(vec![
            ConditionalRule::new(vec![method_condition("POST")], first),
            ConditionalRule::new(vec![ConditionResult::ElseBranch], second),
        ]);

        let customs = set.merged["password"].iter().filter(|t| t.is_custom()).count();
        assert_eq!(customs, 1);
        assert_eq!(set.merged["password"].len(), 3);
        assert!(set.has_conditions);
    }

    #[test]
    fn test_rules_for_method() {
        let set = ConditionalRuleSet::from_rules(vec![
            ConditionalRule::new(
                vec![method_condition("POST")],
                map(&[("email", &["required", "email"])]),
            ),
            ConditionalRule::new(
                vec![method_condition("PUT")],
                map(&[("email", &["sometimes", "email"])]),
            ),
            ConditionalRule::unconditional(map(&[("name", &["string"])])),
        ]);

        assert_eq!(
            set.rules_for_method("POST"),
            map(&[("email", &["required", "email"])])
        );
        assert_eq!(set.rules_for_method("GET"), map(&[("name", &["string"])]));
    }

    #[test]
    fn test_probability_and_field_weight() {
        let rule = ConditionalRule::new(
            vec![method_condition("POST"), ConditionResult::ElseBranch],
            map(&[("a", &["sometimes"])]),
        );
        assert_eq!(rule.probability, 0.25);

        let set = ConditionalRuleSet::from_rules(vec![
            rule,
            ConditionalRule::unconditional(map(&[("b", &["required"])])),
        ]);
        assert_eq!(set.field_probability("a"), 0.125);
        assert_eq!(set.field_probability("b"), 1.0);
        assert_eq!(set.field_probability("missing"), 0.0);
    }

    #[test]
    fn test_rule_set_roundtrip() {
        let mut rules = map(&[("status", &["required"])]);
        rules.get_mut("status").unwrap().push(RuleToken::Marker(RuleMarker::Enum {
            class: "Status".to_string(),
            values: vec![serde_json::json!("active")],
        }));
        rules.insert(
            "code".to_string(),
            vec![RuleToken::Marker(RuleMarker::CustomRule {
                class: "Uppercase".to_string(),
                args: RuleArgs::Positional(vec![serde_json::json!(3), serde_json::json!("x")]),
            })],
        );
        let set = ConditionalRuleSet::from_rules(vec![ConditionalRule::new(
            vec![method_condition("POST")],
            rules,
        )]);

        let json = serde_json::to_string(&set).unwrap();
        let back: ConditionalRuleSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_token_name_and_parameter() {
        let token = RuleToken::plain("max:255");
        assert_eq!(token.name(), Some("max"));
        assert_eq!(token.parameter(), Some("255"));
        assert_eq!(RuleToken::plain("required").parameter(), None);
    }
}
