//! Translation context - per-operation parameter and variable allocation.
//!
//! One context is created per GraphQL operation and threaded through every
//! compiler call. It owns the monotonic counters and the accumulating
//! parameter map, so translations never share mutable state and parameter
//! names cannot collide across arbitrarily nested sub-translations.

use super::ast::Expr;
use std::collections::HashMap;

/// Request-scoped allocation state for one translation.
#[derive(Debug, Default)]
pub struct TranslationContext {
    params: HashMap<String, serde_json::Value>,
    param_count: u32,
    var_count: u32,
    claims: Option<serde_json::Value>,
}

/// Parameter name carrying the decoded auth claims object.
pub const JWT_PARAM: &str = "jwt";
/// Parameter name carrying the authentication flag.
pub const AUTHENTICATED_PARAM: &str = "isAuthenticated";

impl TranslationContext {
    /// Fresh context without auth claims.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh context carrying decoded claims (or `None` when the request is
    /// unauthenticated).
    pub fn with_claims(claims: Option<serde_json::Value>) -> Self {
        Self {
            claims,
            ..Self::default()
        }
    }

    /// Whether the request carried verified claims.
    pub fn authenticated(&self) -> bool {
        self.claims.is_some()
    }

    /// Register a value under a fresh `param{N}` name and return the
    /// referencing expression.
    pub fn param(&mut self, value: serde_json::Value) -> Expr {
        Expr::Param(self.param_name(value))
    }

    /// Register a value and return the allocated parameter name.
    pub fn param_name(&mut self, value: serde_json::Value) -> String {
        let name = format!("param{}", self.param_count);
        self.param_count += 1;
        self.params.insert(name.clone(), value);
        name
    }

    /// Allocate a fresh variable name with the given prefix
    /// (`this0`, `this1`, ...). One counter serves all prefixes so no two
    /// variables in a translation share a name.
    pub fn var(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}", self.var_count);
        self.var_count += 1;
        name
    }

    /// Reference the claims parameter, registering `$jwt` and
    /// `$isAuthenticated` on first use. `$jwt` is NULL for unauthenticated
    /// requests, so claim comparisons evaluate to NULL (falsy) instead of
    /// erroring.
    pub fn jwt(&mut self) -> Expr {
        if !self.params.contains_key(JWT_PARAM) {
            let claims = self.claims.clone().unwrap_or(serde_json::Value::Null);
            self.params.insert(JWT_PARAM.to_string(), claims);
            self.params.insert(
                AUTHENTICATED_PARAM.to_string(),
                serde_json::Value::Bool(self.authenticated()),
            );
        }
        Expr::Param(JWT_PARAM.to_string())
    }

    /// Reference the `$isAuthenticated` parameter (registers both auth
    /// params like [`Self::jwt`]).
    pub fn is_authenticated(&mut self) -> Expr {
        self.jwt();
        Expr::Param(AUTHENTICATED_PARAM.to_string())
    }

    /// Consume the context, yielding the flat parameter map.
    pub fn into_params(self) -> HashMap<String, serde_json::Value> {
        self.params
    }
}
