//! Authentication schemes inferred from route middleware.

use crate::detector::{DetectionResult, Package};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Kind of credential a scheme expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchemeType {
    /// `Authorization: Bearer <token>`
    Bearer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Basic,
    /// A key sent in a header, query parameter or cookie
    ApiKey { name: String, location: String },
    /// Passport; scopes gathered from `scope:`/`scopes:` middleware
    #[serde(rename = "oauth2")]
    OAuth2 {
        token_url: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        scopes: Vec<String>,
    },
}

/// A security scheme registered in the document's components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationScheme {
    /// Key under `components.securitySchemes`
    pub name: String,
    pub scheme: SchemeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The scheme a route requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAuthentication {
    pub scheme: String,
    pub required: bool,
    /// Middleware the requirement was read from
    pub middleware: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// Maps middleware names to authentication schemes
#[derive(Debug, Clone)]
pub struct AuthDetector {
    detection: DetectionResult,
    /// Scheme for a bare `auth` middleware
    default_auth: String,
    used: IndexMap<String, AuthenticationScheme>,
}

impl AuthDetector {
    pub fn new(detection: DetectionResult, default_auth: impl Into<String>) -> Self {
        Self {
            detection,
            default_auth: default_auth.into(),
            used: IndexMap::new(),
        }
    }

    /// Authentication required by a middleware stack, `None` for public routes
    pub fn detect(&mut self, middleware: &[String]) -> Option<RouteAuthentication> {
        let scopes: Vec<String> = middleware
            .iter()
            .filter_map(|m| m.split_once(':'))
            .filter(|(name, _)| matches!(*name, "scope" | "scopes" | "abilities" | "ability"))
            .flat_map(|(_, list)| list.split(',').map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect();
        let optional = middleware
            .iter()
            .any(|m| matches!(m.as_str(), "auth.optional" | "optional.auth"));

        for entry in middleware {
            let (name, params) = match entry.split_once(':') {
                Some((name, params)) => (name, Some(params)),
                None => (entry.as_str(), None),
            };
            let scheme = match (name, params) {
                ("auth", Some(guards)) => guards
                    .split(',')
                    .find_map(|guard| self.scheme_for_guard(guard.trim())),
                ("auth", None) => Some(self.scheme_for_name(&self.default_auth)),
                ("auth.basic" | "auth.basic.once", _) => Some(basic()),
                ("client", _) => Some(self.oauth2()),
                _ => None,
            };
            if let Some(scheme) = scheme {
                let name = scheme.name.clone();
                let entry_scopes = match &scheme.scheme {
                    SchemeType::OAuth2 { .. } => scopes.clone(),
                    _ => Vec::new(),
                };
                self.register(scheme, &entry_scopes);
                return Some(RouteAuthentication {
                    scheme: name,
                    required: !optional,
                    middleware: entry.clone(),
                    scopes: entry_scopes,
                });
            }
        }
        None
    }

    /// Every scheme referenced by a detected route, in first-use order
    pub fn schemes(&self) -> &IndexMap<String, AuthenticationScheme> {
        &self.used
    }

    fn register(&mut self, scheme: AuthenticationScheme, scopes: &[String]) {
        let entry = self.used.entry(scheme.name.clone()).or_insert(scheme);
        if let SchemeType::OAuth2 { scopes: known, .. } = &mut entry.scheme {
            for scope in scopes {
                if !known.contains(scope) {
                    known.push(scope.clone());
                }
            }
        }
    }

    fn scheme_for_guard(&self, guard: &str) -> Option<AuthenticationScheme> {
        match guard {
            "sanctum" => Some(sanctum()),
            "api" if self.detection.has(Package::Passport) => Some(self.oauth2()),
            "api" => Some(bearer()),
            "web" => Some(AuthenticationScheme {
                name: "session".to_string(),
                scheme: SchemeType::ApiKey {
                    name: "laravel_session".to_string(),
                    location: "cookie".to_string(),
                },
                description: Some("Session cookie".to_string()),
            }),
            "jwt" => Some(AuthenticationScheme {
                name: "bearerAuth".to_string(),
                scheme: SchemeType::Bearer {
                    format: Some("JWT".to_string()),
                },
                description: None,
            }),
            "" => None,
            other => Some(self.scheme_for_name(other)),
        }
    }

    /// Scheme from a configured name (`bearer`, `basic`, `apiKey`, `oauth2`)
    fn scheme_for_name(&self, name: &str) -> AuthenticationScheme {
        match name.to_ascii_lowercase().as_str() {
            "basic" => basic(),
            "apikey" | "api_key" => AuthenticationScheme {
                name: "apiKey".to_string(),
                scheme: SchemeType::ApiKey {
                    name: "X-API-KEY".to_string(),
                    location: "header".to_string(),
                },
                description: None,
            },
            "oauth2" | "passport" => self.oauth2(),
            "sanctum" => sanctum(),
            _ if self.detection.has(Package::Sanctum) => sanctum(),
            _ => bearer(),
        }
    }

    fn oauth2(&self) -> AuthenticationScheme {
        AuthenticationScheme {
            name: "passport".to_string(),
            scheme: SchemeType::OAuth2 {
                token_url: "/oauth/token".to_string(),
                scopes: Vec::new(),
            },
            description: Some("Laravel Passport OAuth2".to_string()),
        }
    }
}

fn sanctum() -> AuthenticationScheme {
    AuthenticationScheme {
        name: "sanctum".to_string(),
        scheme: SchemeType::Bearer { format: None },
        description: Some("Laravel Sanctum personal access token".to_string()),
    }
}

fn bearer() -> AuthenticationScheme {
    AuthenticationScheme {
        name: "bearerAuth".to_string(),
        scheme: SchemeType::Bearer { format: None },
        description: None,
    }
}

fn basic() -> AuthenticationScheme {
    AuthenticationScheme {
        name: "basicAuth".to_string(),
        scheme: SchemeType::Basic,
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stack(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanctum_guard() {
        let mut detector = AuthDetector::new(DetectionResult::default(), "bearer");
        let auth = detector.detect(&stack(&["api", "auth:sanctum"])).unwrap();
        assert_eq!(auth.scheme, "sanctum");
        assert!(auth.required);
        assert_eq!(auth.middleware, "auth:sanctum");
        assert!(detector.detect(&stack(&["api", "throttle:60,1"])).is_none());
        assert_eq!(detector.schemes().len(), 1);
    }

    #[test]
    fn test_api_guard_depends_on_passport() {
        let mut plain = AuthDetector::new(DetectionResult::default(), "bearer");
        assert_eq!(plain.detect(&stack(&["auth:api"])).unwrap().scheme, "bearerAuth");

        let mut detection = DetectionResult::default();
        detection.packages.insert(Package::Passport);
        let mut passport = AuthDetector::new(detection, "bearer");
        let auth = passport
            .detect(&stack(&["auth:api", "scopes:orders:read,orders:write"]))
            .unwrap();
        assert_eq!(auth.scheme, "passport");
        assert_eq!(auth.scopes, vec!["orders:read", "orders:write"]);
        match &passport.schemes()["passport"].scheme {
            SchemeType::OAuth2 { scopes, .. } => assert_eq!(scopes.len(), 2),
            other => panic!("unexpected scheme {:?}", other),
        }
    }

    #[test]
    fn test_bare_auth_uses_default_and_optional() {
        let mut detector = AuthDetector::new(DetectionResult::default(), "basic");
        let auth = detector.detect(&stack(&["auth", "auth.optional"])).unwrap();
        assert_eq!(auth.scheme, "basicAuth");
        assert!(!auth.required);

        let mut key = AuthDetector::new(DetectionResult::default(), "apiKey");
        assert_eq!(key.detect(&stack(&["auth"])).unwrap().scheme, "apiKey");
    }

    #[test]
    fn test_scheme_roundtrip() {
        let mut detector = AuthDetector::new(DetectionResult::default(), "bearer");
        detector.detect(&stack(&["auth:web"]));
        detector.detect(&stack(&["auth.basic"]));
        for scheme in detector.schemes().values() {
            let json = serde_json::to_string(scheme).unwrap();
            let back: AuthenticationScheme = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, scheme);
        }
    }
}
