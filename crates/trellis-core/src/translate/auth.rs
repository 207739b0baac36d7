//! Authorization compiler - directive rules to Cypher guards.
//!
//! Filter-style rules become predicates conjoined into the enclosing WHERE:
//! unauthorized rows are simply absent. Validate-style rules become an
//! `apoc.util.validatePredicate` guard that aborts the whole statement with
//! a bare "Forbidden" inside the transaction, so AFTER-phase rules can see
//! written values and no partial write ever becomes visible.
//!
//! Claims are one opaque `$jwt` parameter; rule values of the form
//! `"$jwt.claim"` compile to parameter paths. `$jwt` is NULL when the
//! request is unauthenticated, so claim comparisons are NULL-safe by
//! construction and `coalesce(..., false)` keeps the guard clean.

use super::filter::split_operator;
use crate::cypher::{BinaryOperator, Expr, TranslationContext};
use crate::schema::{AuthAction, AuthKind, AuthPhase, AuthorizationRule, NodeType};
use crate::{Error, Result};

/// Compiled authorization for one entity and operation.
#[derive(Debug, Default)]
pub struct CompiledAuth {
    /// Predicate from filter-style rules; conjoin into WHERE.
    pub filter: Option<Expr>,
    /// Error-raising guard from validate-style rules; also conjoined into
    /// WHERE (it evaluates to true when access is allowed).
    pub validate: Option<Expr>,
}

impl CompiledAuth {
    /// Both guards as one predicate, validation first.
    pub fn combined(self) -> Option<Expr> {
        let mut parts = Vec::new();
        if let Some(validate) = self.validate {
            parts.push(validate);
        }
        if let Some(filter) = self.filter {
            parts.push(filter);
        }
        Expr::conjoin(parts)
    }
}

/// Compile the authorization rules of `node` for `action` in `phase`.
///
/// Rules combine with OR: access is granted when any rule passes. Filter
/// rules only apply in the BEFORE phase (they gate what is visible);
/// validate rules apply in the phase they declare.
pub fn compile_auth(
    ctx: &mut TranslationContext,
    node: &NodeType,
    variable: &str,
    action: AuthAction,
    phase: AuthPhase,
) -> Result<CompiledAuth> {
    let mut filter_rules = Vec::new();
    let mut validate_rules = Vec::new();
    for rule in node.auth_rules(action) {
        match rule.kind {
            AuthKind::Filter if phase == AuthPhase::Before => filter_rules.push(rule),
            AuthKind::Filter => {}
            AuthKind::Validate if rule.phase == phase => validate_rules.push(rule),
            AuthKind::Validate => {}
        }
    }

    let filter = disjoin_rules(ctx, node, variable, &filter_rules)?;
    let validate = disjoin_rules(ctx, node, variable, &validate_rules)?.map(|predicate| {
        Expr::func(
            "apoc.util.validatePredicate",
            vec![
                Expr::Not(Box::new(Expr::func(
                    "coalesce",
                    vec![predicate, Expr::bool(false)],
                ))),
                Expr::string("Forbidden"),
                Expr::List(vec![Expr::int(0)]),
            ],
        )
    });
    Ok(CompiledAuth { filter, validate })
}

fn disjoin_rules(
    ctx: &mut TranslationContext,
    node: &NodeType,
    variable: &str,
    rules: &[&AuthorizationRule],
) -> Result<Option<Expr>> {
    let mut alternatives = Vec::new();
    for rule in rules {
        alternatives.push(rule_predicate(ctx, node, variable, rule)?);
    }
    match alternatives.len() {
        0 => Ok(None),
        1 => Ok(alternatives.into_iter().next()),
        _ => Ok(Some(Expr::Or(alternatives))),
    }
}

fn rule_predicate(
    ctx: &mut TranslationContext,
    node: &NodeType,
    variable: &str,
    rule: &AuthorizationRule,
) -> Result<Expr> {
    let mut parts = Vec::new();
    if rule.require_authentication {
        parts.push(Expr::binary(
            ctx.is_authenticated(),
            BinaryOperator::Eq,
            Expr::bool(true),
        ));
    }
    // `requireAuthentication: false` rules still apply their where clause.
    if let Some(predicate) = where_predicate(ctx, node, variable, &rule.where_)? {
        parts.push(predicate);
    }
    Ok(Expr::conjoin(parts).unwrap_or_else(|| Expr::bool(true)))
}

fn where_predicate(
    ctx: &mut TranslationContext,
    node: &NodeType,
    variable: &str,
    where_: &serde_json::Value,
) -> Result<Option<Expr>> {
    let object = match where_ {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Object(map) if map.is_empty() => return Ok(None),
        serde_json::Value::Object(map) => map,
        other => {
            return Err(Error::schema(format!(
                "authorization where must be an object, got {other}"
            )))
        }
    };
    let mut parts = Vec::new();
    for (key, value) in object {
        let part = match key.as_str() {
            "AND" => boolean_list(ctx, node, variable, value, false)?,
            "OR" => boolean_list(ctx, node, variable, value, true)?,
            "NOT" => where_predicate(ctx, node, variable, value)?
                .map(|inner| Expr::Not(Box::new(inner))),
            "node" => node_predicate(ctx, node, variable, value)?,
            "jwt" => jwt_predicate(ctx, value)?,
            other => {
                return Err(Error::schema(format!(
                    "unknown authorization where key `{other}`"
                )))
            }
        };
        if let Some(part) = part {
            parts.push(part);
        }
    }
    Ok(Expr::conjoin(parts))
}

fn boolean_list(
    ctx: &mut TranslationContext,
    node: &NodeType,
    variable: &str,
    value: &serde_json::Value,
    disjunction: bool,
) -> Result<Option<Expr>> {
    let children = match value {
        serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
        _ => vec![value],
    };
    let mut parts = Vec::new();
    for child in children {
        if let Some(part) = where_predicate(ctx, node, variable, child)? {
            parts.push(part);
        }
    }
    Ok(match (parts.len(), disjunction) {
        (0, _) => None,
        (1, _) => parts.into_iter().next(),
        (_, true) => Some(Expr::Or(parts)),
        (_, false) => Expr::conjoin(parts),
    })
}

/// Comparisons over the entity's own properties. Values may reference
/// claims via `"$jwt.claim"` strings.
fn node_predicate(
    ctx: &mut TranslationContext,
    node: &NodeType,
    variable: &str,
    value: &serde_json::Value,
) -> Result<Option<Expr>> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::schema("authorization node filter must be an object"))?;
    let mut parts = Vec::new();
    for (key, value) in object {
        let (name, op) = match node.property(key) {
            Some(_) => (key.as_str(), BinaryOperator::Eq),
            None => {
                let (base, op) = split_operator(key)
                    .ok_or_else(|| Error::unknown_field(key, node.name.clone()))?;
                let binary = comparison_operator(op, key)?;
                if node.property(base).is_none() {
                    return Err(Error::unknown_field(base, node.name.clone()));
                }
                (base, binary)
            }
        };
        let lhs = Expr::prop(variable, name);
        let rhs = claim_or_param(ctx, value);
        parts.push(Expr::binary(lhs, op, rhs));
    }
    Ok(Expr::conjoin(parts))
}

/// Comparisons over claims themselves, e.g. `{"roles_INCLUDES": "admin"}`.
fn jwt_predicate(ctx: &mut TranslationContext, value: &serde_json::Value) -> Result<Option<Expr>> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::schema("authorization jwt filter must be an object"))?;
    let mut parts = Vec::new();
    for (key, value) in object {
        let (claim, op, flip) = match split_operator(key) {
            Some((base, super::filter::ScalarOperator::Includes)) => {
                (base, BinaryOperator::In, true)
            }
            Some((base, op)) => (base, comparison_operator(op, key)?, false),
            None => (key.as_str(), BinaryOperator::Eq, false),
        };
        let claim_ref = claim_path(ctx, claim);
        let rhs = claim_or_param(ctx, value);
        parts.push(if flip {
            // `roles_INCLUDES: x` means x IN $jwt.roles
            Expr::binary(rhs, op, claim_ref)
        } else {
            Expr::binary(claim_ref, op, rhs)
        });
    }
    Ok(Expr::conjoin(parts))
}

fn comparison_operator(op: super::filter::ScalarOperator, key: &str) -> Result<BinaryOperator> {
    use super::filter::ScalarOperator::*;
    Ok(match op {
        Eq => BinaryOperator::Eq,
        In => BinaryOperator::In,
        Gt => BinaryOperator::Gt,
        Gte => BinaryOperator::Gte,
        Lt => BinaryOperator::Lt,
        Lte => BinaryOperator::Lte,
        Contains => BinaryOperator::Contains,
        StartsWith => BinaryOperator::StartsWith,
        EndsWith => BinaryOperator::EndsWith,
        _ => return Err(Error::invalid_operator(key, "authorization rule")),
    })
}

/// `"$jwt.sub"` becomes a claims parameter path; anything else becomes a
/// regular parameter.
fn claim_or_param(ctx: &mut TranslationContext, value: &serde_json::Value) -> Expr {
    if let Some(text) = value.as_str() {
        if let Some(path) = text.strip_prefix("$jwt.") {
            return claim_path(ctx, path);
        }
    }
    ctx.param(value.clone())
}

fn claim_path(ctx: &mut TranslationContext, path: &str) -> Expr {
    let mut expr = ctx.jwt();
    for segment in path.split('.') {
        expr = Expr::Property {
            base: Box::new(expr),
            key: segment.to_string(),
        };
    }
    expr
}
