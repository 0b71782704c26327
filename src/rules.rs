//! Rules Engine
//!
//! Named conditions gate panels, packs, pack files and dynamic variables.
//! Anything that takes a condition id also accepts a compact expression over
//! ids: `a+b` (and), `a|b` (or), `a\b` (xor) and a leading `!` (not). The
//! expression is split at its first operator and the right-hand side parsed
//! recursively, so `a+b|c` means `a and (b or c)`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, trace};

use crate::error::CompilerError;
use crate::platform::Platform;

/// Prefix of the built-in per-pack selection conditions.
pub const SELECTED_PREFIX: &str = "izpack.selected.";

/// Built-in OS conditions.
const OS_CONDITIONS: &[&str] = &[
    "izpack.windowsinstall",
    "izpack.linuxinstall",
    "izpack.macinstall",
    "izpack.solarisinstall",
    "izpack.unixinstall",
];

/// State a condition is evaluated against.
pub trait ConditionContext {
    fn variable(&self, name: &str) -> Option<String>;
    fn is_pack_selected(&self, pack: &str) -> bool;
    fn platform(&self) -> &Platform;
}

/// Comparison operator for `comparenumerics` and `compareversions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    pub fn parse(s: &str) -> Result<Self, CompilerError> {
        match s.trim() {
            "eq" => Ok(Self::Eq),
            "neq" | "ne" => Ok(Self::Neq),
            "lt" => Ok(Self::Lt),
            "lte" | "le" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" | "ge" => Ok(Self::Gte),
            other => Err(CompilerError::InvalidValue {
                what: "comparison operator".to_string(),
                value: other.to_string(),
            }),
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Neq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
        }
    }
}

/// One condition, possibly nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "lowercase")]
pub enum Condition {
    /// Variable equals a literal
    Variable { name: String, value: String },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// True when an odd number of operands are true
    Xor(Vec<Condition>),
    Not(Box<Condition>),
    /// Another condition (or expression) by id
    Ref(String),
    /// Variable is set, or a path (after substitution) exists
    Exists { variable: Option<String>, file: Option<String> },
    /// Variable unset/blank, file zero-length or missing, directory without entries
    Empty {
        variable: Option<String>,
        file: Option<String>,
        dir: Option<String>,
    },
    CompareNumerics {
        variable: String,
        value: String,
        operator: Operator,
    },
    CompareVersions {
        arg1: String,
        arg2: String,
        operator: Operator,
    },
    PackSelection(String),
}

impl Condition {
    /// Ids this condition refers to, directly or through expressions.
    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::And(cs) | Condition::Or(cs) | Condition::Xor(cs) => {
                cs.iter().for_each(|c| c.collect_refs(out))
            }
            Condition::Not(c) => c.collect_refs(out),
            Condition::Ref(id) => out.push(id),
            _ => {}
        }
    }
}

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Id(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Parse an expression. A `!` past position 0 has no operator meaning and
    /// stays part of the id.
    pub fn parse(expr: &str) -> Expr {
        let expr = expr.trim();
        if let Some(rest) = expr.strip_prefix('!') {
            return Expr::Not(Box::new(Expr::parse(rest)));
        }
        match expr.find(['+', '|', '\\']) {
            Some(index) => {
                let left = Box::new(Expr::Id(expr[..index].trim().to_string()));
                let right = Box::new(Expr::parse(&expr[index + 1..]));
                match &expr[index..index + 1] {
                    "+" => Expr::And(left, right),
                    "|" => Expr::Or(left, right),
                    _ => Expr::Xor(left, right),
                }
            }
            None => Expr::Id(expr.to_string()),
        }
    }

    fn ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Id(id) => out.push(id),
            Expr::And(a, b) | Expr::Or(a, b) | Expr::Xor(a, b) => {
                a.ids(out);
                b.ids(out);
            }
            Expr::Not(e) => e.ids(out),
        }
    }
}

/// Registry of named conditions plus the built-ins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesEngine {
    conditions: BTreeMap<String, Condition>,
}

impl RulesEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: impl Into<String>, condition: Condition) -> Result<(), CompilerError> {
        let id = id.into();
        if self.conditions.contains_key(&id) {
            return Err(CompilerError::DuplicateCondition(id));
        }
        self.conditions.insert(id, condition);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Condition> {
        self.conditions.get(id)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `id` names a defined or built-in condition. `packs` is the set
    /// of pack names for `izpack.selected.*`.
    pub fn is_known(&self, id: &str, packs: &[String]) -> bool {
        self.conditions.contains_key(id)
            || OS_CONDITIONS.contains(&id)
            || id
                .strip_prefix(SELECTED_PREFIX)
                .map(|p| packs.iter().any(|n| n == p))
                .unwrap_or(false)
    }

    /// Check that an expression and everything defined conditions reach
    /// refer only to known ids.
    pub fn check_expression(&self, expr: &str, packs: &[String]) -> Result<(), CompilerError> {
        let parsed = Expr::parse(expr);
        let mut ids = Vec::new();
        parsed.ids(&mut ids);
        for id in ids {
            if !self.is_known(id, packs) {
                return Err(CompilerError::UndefinedCondition(id.to_string()));
            }
        }
        Ok(())
    }

    /// Check every `ref` inside the defined conditions.
    pub fn check_references(&self, packs: &[String]) -> Result<(), CompilerError> {
        for condition in self.conditions.values() {
            let mut refs = Vec::new();
            condition.collect_refs(&mut refs);
            for r in refs {
                self.check_expression(r, packs)?;
            }
        }
        Ok(())
    }

    /// Evaluate a condition id or expression. Unknown ids are false.
    pub fn is_true(&self, expr: &str, ctx: &dyn ConditionContext) -> bool {
        self.eval_expr(&Expr::parse(expr), ctx, 0)
    }

    fn eval_expr(&self, expr: &Expr, ctx: &dyn ConditionContext, depth: usize) -> bool {
        match expr {
            Expr::Id(id) => self.eval_id(id, ctx, depth),
            Expr::And(a, b) => self.eval_expr(a, ctx, depth) && self.eval_expr(b, ctx, depth),
            Expr::Or(a, b) => self.eval_expr(a, ctx, depth) || self.eval_expr(b, ctx, depth),
            Expr::Xor(a, b) => self.eval_expr(a, ctx, depth) ^ self.eval_expr(b, ctx, depth),
            Expr::Not(e) => !self.eval_expr(e, ctx, depth),
        }
    }

    fn eval_id(&self, id: &str, ctx: &dyn ConditionContext, depth: usize) -> bool {
        if let Some(condition) = self.conditions.get(id) {
            return self.eval(condition, ctx, depth + 1);
        }
        if let Some(pack) = id.strip_prefix(SELECTED_PREFIX) {
            return ctx.is_pack_selected(pack);
        }
        let platform = ctx.platform();
        match id {
            "izpack.windowsinstall" => platform.is_windows(),
            "izpack.linuxinstall" => platform.is_linux(),
            "izpack.macinstall" => platform.is_mac(),
            "izpack.solarisinstall" => platform.name == "solaris",
            "izpack.unixinstall" => platform.is_unix(),
            _ => {
                debug!("Condition {} not found", id);
                false
            }
        }
    }

    /// Evaluate a condition. Reference chains deeper than the number of
    /// defined conditions are cyclic and evaluate to false.
    pub fn eval(&self, condition: &Condition, ctx: &dyn ConditionContext, depth: usize) -> bool {
        if depth > self.conditions.len() + 1 {
            debug!("Condition reference cycle detected");
            return false;
        }
        let result = match condition {
            Condition::Variable { name, value } => ctx.variable(name).as_deref() == Some(value.as_str()),
            Condition::And(cs) => cs.iter().all(|c| self.eval(c, ctx, depth)),
            Condition::Or(cs) => cs.iter().any(|c| self.eval(c, ctx, depth)),
            Condition::Xor(cs) => cs.iter().filter(|c| self.eval(c, ctx, depth)).count() % 2 == 1,
            Condition::Not(c) => !self.eval(c, ctx, depth),
            Condition::Ref(id) => self.eval_expr(&Expr::parse(id), ctx, depth),
            Condition::Exists { variable, file } => {
                if let Some(name) = variable {
                    ctx.variable(name).is_some()
                } else if let Some(file) = file {
                    Path::new(&substitute(file, ctx)).exists()
                } else {
                    false
                }
            }
            Condition::Empty { variable, file, dir } => {
                if let Some(name) = variable {
                    ctx.variable(name).map(|v| v.trim().is_empty()).unwrap_or(true)
                } else if let Some(file) = file {
                    std::fs::metadata(substitute(file, ctx))
                        .map(|m| m.len() == 0)
                        .unwrap_or(true)
                } else if let Some(dir) = dir {
                    std::fs::read_dir(substitute(dir, ctx))
                        .map(|mut entries| entries.next().is_none())
                        .unwrap_or(true)
                } else {
                    true
                }
            }
            Condition::CompareNumerics { variable, value, operator } => {
                match (
                    ctx.variable(variable).and_then(|v| v.trim().parse::<f64>().ok()),
                    value.trim().parse::<f64>().ok(),
                ) {
                    (Some(a), Some(b)) => a.partial_cmp(&b).map(|o| operator.holds(o)).unwrap_or(false),
                    _ => false,
                }
            }
            Condition::CompareVersions { arg1, arg2, operator } => {
                let a = substitute(arg1, ctx);
                let b = substitute(arg2, ctx);
                operator.holds(compare_versions(&a, &b))
            }
            Condition::PackSelection(pack) => ctx.is_pack_selected(pack),
        };
        trace!("Condition {:?} -> {}", condition, result);
        result
    }
}

/// `$VAR` substitution against a condition context.
fn substitute(text: &str, ctx: &dyn ConditionContext) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .char_indices()
                .find(|(i, c)| !(c.is_ascii_alphabetic() || (*i > 0 && (c.is_ascii_digit() || *c == '_'))))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match ctx.variable(name).filter(|_| !name.is_empty()) {
            Some(value) => {
                out.push_str(&value);
                rest = &after[consumed..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Compare dotted version strings segment by segment. Numeric segments
/// compare numerically, others lexically; with equal common segments the
/// shorter version is lower.
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    let split = |v: &str| -> Vec<String> {
        v.trim()
            .split(['.', '-', '_'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };

    let a = split(v1);
    let b = split(v2);

    for (x, y) in a.iter().zip(b.iter()) {
        let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Ctx {
        vars: HashMap<String, String>,
        selected: Vec<String>,
        platform: Platform,
    }

    impl ConditionContext for Ctx {
        fn variable(&self, name: &str) -> Option<String> {
            self.vars.get(name).cloned()
        }
        fn is_pack_selected(&self, pack: &str) -> bool {
            self.selected.iter().any(|p| p == pack)
        }
        fn platform(&self) -> &Platform {
            &self.platform
        }
    }

    fn ctx() -> Ctx {
        let mut vars = HashMap::new();
        vars.insert("MODE".to_string(), "full".to_string());
        vars.insert("PORT".to_string(), "8080".to_string());
        vars.insert("JAVA_VERSION".to_string(), "11.0.2".to_string());
        Ctx {
            vars,
            selected: vec!["Core".to_string()],
            platform: Platform {
                name: "linux".to_string(),
                arch: "x86_64".to_string(),
                version: String::new(),
            },
        }
    }

    fn engine() -> RulesEngine {
        let mut rules = RulesEngine::new();
        rules
            .add("full", Condition::Variable { name: "MODE".to_string(), value: "full".to_string() })
            .unwrap();
        rules
            .add("minimal", Condition::Variable { name: "MODE".to_string(), value: "minimal".to_string() })
            .unwrap();
        rules
            .add(
                "highport",
                Condition::CompareNumerics {
                    variable: "PORT".to_string(),
                    value: "1024".to_string(),
                    operator: Operator::Gt,
                },
            )
            .unwrap();
        rules
            .add(
                "modernjava",
                Condition::CompareVersions {
                    arg1: "$JAVA_VERSION".to_string(),
                    arg2: "9".to_string(),
                    operator: Operator::Gte,
                },
            )
            .unwrap();
        rules
            .add("notfull", Condition::Not(Box::new(Condition::Ref("full".to_string()))))
            .unwrap();
        rules
    }

    #[test]
    fn test_simple_and_nested_conditions() {
        let rules = engine();
        let c = ctx();
        assert!(rules.is_true("full", &c));
        assert!(!rules.is_true("minimal", &c));
        assert!(!rules.is_true("notfull", &c));
        assert!(rules.is_true("highport", &c));
        assert!(rules.is_true("modernjava", &c));
    }

    #[test]
    fn test_expressions() {
        let rules = engine();
        let c = ctx();
        assert!(rules.is_true("full+highport", &c));
        assert!(!rules.is_true("full+minimal", &c));
        assert!(rules.is_true("minimal|full", &c));
        assert!(rules.is_true("full\\minimal", &c));
        assert!(!rules.is_true("full\\highport", &c));
        assert!(rules.is_true("!minimal", &c));
        // and binds to the whole right-hand side
        assert!(!rules.is_true("minimal+full|highport", &c));
        assert!(rules.is_true("!minimal+full", &c) == !rules.is_true("minimal+full", &c));
    }

    #[test]
    fn test_builtins_and_unknown() {
        let rules = engine();
        let c = ctx();
        assert!(rules.is_true("izpack.linuxinstall", &c));
        assert!(!rules.is_true("izpack.windowsinstall", &c));
        assert!(rules.is_true("izpack.selected.Core", &c));
        assert!(!rules.is_true("izpack.selected.Docs", &c));
        assert!(!rules.is_true("no.such.condition", &c));
    }

    #[test]
    fn test_reference_cycle_is_false() {
        let mut rules = RulesEngine::new();
        rules.add("a", Condition::Ref("b".to_string())).unwrap();
        rules.add("b", Condition::Ref("a".to_string())).unwrap();
        assert!(!rules.is_true("a", &ctx()));
    }

    #[test]
    fn test_check_expression() {
        let rules = engine();
        let packs = vec!["Core".to_string()];
        assert!(rules.check_expression("full+!minimal", &packs).is_ok());
        assert!(rules.check_expression("izpack.selected.Core", &packs).is_ok());
        assert!(matches!(
            rules.check_expression("full|missing", &packs),
            Err(CompilerError::UndefinedCondition(id)) if id == "missing"
        ));
        assert!(rules.check_expression("izpack.selected.Docs", &packs).is_err());
    }

    #[test]
    fn test_duplicate_condition() {
        let mut rules = engine();
        assert!(rules.add("full", Condition::PackSelection("Core".to_string())).is_err());
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0", "2.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "1.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0-beta", "1.0-alpha"), Ordering::Greater);
    }
}
