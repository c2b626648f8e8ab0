//! Helper functions usable inside predicates.
//!
//! Each template knows its arity, the kind of each argument, how it renders
//! in SQLite, and (where it can be computed without the database) how to
//! evaluate it so that calls with no column reference fold into a literal.

use chrono::NaiveDateTime;
use sqlentity_core::Value;
use std::cmp::Ordering;

/// How an argument is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Column, nested call, or bound parameter
    Expr,
    /// Integer literal inlined into the SQL
    Int,
    /// Identifier (table or column name), quoted and inlined
    Ident,
}

/// Rendering and evaluation rules for one helper function.
pub struct FunctionTemplate {
    pub name: &'static str,
    pub args: &'static [ArgKind],
    /// Usable as a condition on its own
    pub boolean: bool,
    /// Renders through SQLite date functions, which read ISO-8601 text only
    pub reads_timestamps: bool,
    render: fn(&[String]) -> String,
    evaluate: Option<fn(&[Value]) -> Option<Value>>,
}

impl std::fmt::Debug for FunctionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTemplate")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("boolean", &self.boolean)
            .finish_non_exhaustive()
    }
}

impl FunctionTemplate {
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// SQL for already-rendered arguments.
    pub fn render(&self, args: &[String]) -> String {
        (self.render)(args)
    }

    pub fn can_evaluate(&self) -> bool {
        self.evaluate.is_some()
    }

    /// Compute the call from literal arguments. `None` when the template
    /// has no evaluator or the arguments do not fit it.
    pub fn evaluate(&self, args: &[Value]) -> Option<Value> {
        if args.len() != self.arity() {
            return None;
        }
        self.evaluate.and_then(|f| f(args))
    }
}

const EXPR: ArgKind = ArgKind::Expr;

static TEMPLATES: &[FunctionTemplate] = &[
    FunctionTemplate {
        name: "like",
        args: &[EXPR, EXPR],
        boolean: true,
        reads_timestamps: false,
        render: |a| format!("{} LIKE {}", a[0], a[1]),
        evaluate: Some(eval_like),
    },
    FunctionTemplate {
        name: "starts_with",
        args: &[EXPR, EXPR],
        boolean: true,
        reads_timestamps: false,
        render: |a| format!("{} LIKE {} || '%' ESCAPE '\\'", a[0], literal_pattern(&a[1])),
        evaluate: Some(eval_starts_with),
    },
    FunctionTemplate {
        name: "ends_with",
        args: &[EXPR, EXPR],
        boolean: true,
        reads_timestamps: false,
        render: |a| format!("{} LIKE '%' || {} ESCAPE '\\'", a[0], literal_pattern(&a[1])),
        evaluate: Some(eval_ends_with),
    },
    FunctionTemplate {
        name: "contains",
        args: &[EXPR, EXPR],
        boolean: true,
        reads_timestamps: false,
        render: |a| {
            format!("{} LIKE '%' || {} || '%' ESCAPE '\\'", a[0], literal_pattern(&a[1]))
        },
        evaluate: Some(eval_contains),
    },
    FunctionTemplate {
        name: "round",
        args: &[EXPR, ArgKind::Int],
        boolean: false,
        reads_timestamps: false,
        render: |a| format!("ROUND({}, {})", a[0], a[1]),
        evaluate: Some(eval_round),
    },
    FunctionTemplate {
        name: "abs",
        args: &[EXPR],
        boolean: false,
        reads_timestamps: false,
        render: |a| format!("ABS({})", a[0]),
        evaluate: Some(eval_abs),
    },
    FunctionTemplate {
        name: "min",
        args: &[EXPR, EXPR],
        boolean: false,
        reads_timestamps: false,
        render: |a| format!("MIN({}, {})", a[0], a[1]),
        evaluate: Some(eval_min),
    },
    FunctionTemplate {
        name: "max",
        args: &[EXPR, EXPR],
        boolean: false,
        reads_timestamps: false,
        render: |a| format!("MAX({}, {})", a[0], a[1]),
        evaluate: Some(eval_max),
    },
    FunctionTemplate {
        name: "avg",
        args: &[EXPR, EXPR],
        boolean: false,
        reads_timestamps: false,
        render: |a| format!("(({} + {}) / 2.0)", a[0], a[1]),
        evaluate: Some(eval_avg),
    },
    FunctionTemplate {
        name: "same_day",
        args: &[EXPR, EXPR],
        boolean: true,
        reads_timestamps: true,
        render: |a| format!("date({}) = date({})", a[0], a[1]),
        evaluate: Some(eval_same_day),
    },
    FunctionTemplate {
        name: "date_before",
        args: &[EXPR, EXPR],
        boolean: true,
        reads_timestamps: true,
        render: |a| format!("julianday({}) < julianday({})", a[0], a[1]),
        evaluate: Some(eval_before),
    },
    FunctionTemplate {
        name: "date_after",
        args: &[EXPR, EXPR],
        boolean: true,
        reads_timestamps: true,
        render: |a| format!("julianday({}) > julianday({})", a[0], a[1]),
        evaluate: Some(eval_after),
    },
    FunctionTemplate {
        name: "equals_in",
        args: &[EXPR, ArgKind::Ident, ArgKind::Ident],
        boolean: true,
        reads_timestamps: false,
        render: |a| format!("{} IN (SELECT {} FROM {})", a[0], a[2], a[1]),
        evaluate: None,
    },
];

/// `sql` with `LIKE` wildcards and the escape character itself escaped,
/// so the text matches literally under `ESCAPE '\'`.
fn literal_pattern(sql: &str) -> String {
    format!("replace(replace(replace({sql}, '\\', '\\\\'), '%', '\\%'), '_', '\\_')")
}

/// Find a template by name, ignoring ASCII case.
pub fn lookup(name: &str) -> Option<&'static FunctionTemplate> {
    TEMPLATES.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Names of every known helper.
pub fn names() -> impl Iterator<Item = &'static str> {
    TEMPLATES.iter().map(|t| t.name)
}

fn eval_like(v: &[Value]) -> Option<Value> {
    text_pair(v, like_match)
}

fn eval_starts_with(v: &[Value]) -> Option<Value> {
    text_pair(v, |s, p| s.starts_with(p))
}

fn eval_ends_with(v: &[Value]) -> Option<Value> {
    text_pair(v, |s, p| s.ends_with(p))
}

fn eval_contains(v: &[Value]) -> Option<Value> {
    text_pair(v, |s, p| s.contains(p))
}

fn eval_min(v: &[Value]) -> Option<Value> {
    pick(v, Ordering::Less)
}

fn eval_max(v: &[Value]) -> Option<Value> {
    pick(v, Ordering::Greater)
}

fn eval_avg(v: &[Value]) -> Option<Value> {
    Some(Value::Double((v[0].as_f64()? + v[1].as_f64()?) / 2.0))
}

fn eval_same_day(v: &[Value]) -> Option<Value> {
    timestamps(v, |a, b| a.date() == b.date())
}

fn eval_before(v: &[Value]) -> Option<Value> {
    timestamps(v, |a, b| a < b)
}

fn eval_after(v: &[Value]) -> Option<Value> {
    timestamps(v, |a, b| a > b)
}

fn text_pair(values: &[Value], f: impl Fn(&str, &str) -> bool) -> Option<Value> {
    let subject = values[0].as_str()?.to_ascii_lowercase();
    let pattern = values[1].as_str()?.to_ascii_lowercase();
    Some(Value::Bool(f(&subject, &pattern)))
}

fn timestamps(
    values: &[Value],
    f: impl Fn(NaiveDateTime, NaiveDateTime) -> bool,
) -> Option<Value> {
    Some(Value::Bool(f(
        values[0].as_timestamp()?,
        values[1].as_timestamp()?,
    )))
}

fn eval_round(values: &[Value]) -> Option<Value> {
    let x = values[0].as_f64()?;
    let digits = i32::try_from(values[1].as_i64()?).ok()?;
    let scale = 10f64.powi(digits);
    Some(Value::Double((x * scale).round() / scale))
}

fn eval_abs(values: &[Value]) -> Option<Value> {
    match &values[0] {
        Value::Int(v) => v.checked_abs().map(Value::Int),
        Value::Double(v) => Some(Value::Double(v.abs())),
        _ => None,
    }
}

fn pick(values: &[Value], wanted: Ordering) -> Option<Value> {
    let ordering = compare_values(&values[0], &values[1])?;
    Some(if ordering == wanted || ordering == Ordering::Equal {
        values[0].clone()
    } else {
        values[1].clone()
    })
}

/// Order two literal values the way SQLite would for same-class operands.
/// `None` when the values are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Uuid(x), Value::Uuid(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ => {
            let x = numeric(a)?;
            let y = numeric(b)?;
            x.partial_cmp(&y)
        }
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Int(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

/// SQL `LIKE` matching: `%` is any run, `_` any single character.
/// Callers lowercase both sides for ASCII case-insensitivity.
fn like_match(subject: &str, pattern: &str) -> bool {
    let s: Vec<char> = subject.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut si, mut pi) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while si < s.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == s[si]) {
            si += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, si));
            pi += 1;
        } else if let Some((bp, bs)) = backtrack {
            pi = bp + 1;
            si = bs + 1;
            backtrack = Some((bp, bs + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!(lookup("LIKE").unwrap().name, "like");
        assert!(lookup("soundex").is_none());
        assert_eq!(names().count(), TEMPLATES.len());
    }

    #[test]
    fn test_render_templates() {
        let like = lookup("starts_with").unwrap();
        assert_eq!(
            like.render(&["e.Name".into(), "@Name0".into()]),
            r"e.Name LIKE replace(replace(replace(@Name0, '\', '\\'), '%', '\%'), '_', '\_') || '%' ESCAPE '\'"
        );
        assert!(lookup("same_day").unwrap().reads_timestamps);
        assert!(!lookup("contains").unwrap().reads_timestamps);
        let lookup_in = lookup("equals_in").unwrap();
        assert_eq!(
            lookup_in.render(&["e.BlogId".into(), "\"Blog\"".into(), "\"Id\"".into()]),
            "e.BlogId IN (SELECT \"Id\" FROM \"Blog\")"
        );
    }

    #[test]
    fn test_like_matching() {
        assert!(like_match("alice", "a%"));
        assert!(like_match("alice", "%lic%"));
        assert!(like_match("alice", "_lice"));
        assert!(like_match("alice", "%"));
        assert!(!like_match("alice", "b%"));
        assert!(!like_match("alice", "alic"));
        assert!(like_match("", "%%"));
    }

    #[test]
    fn test_evaluators() {
        let abs = lookup("abs").unwrap();
        assert_eq!(abs.evaluate(&[Value::Int(-3)]), Some(Value::Int(3)));
        let round = lookup("round").unwrap();
        assert_eq!(
            round.evaluate(&[Value::Double(2.345), Value::Int(1)]),
            Some(Value::Double(2.3))
        );
        let max = lookup("max").unwrap();
        assert_eq!(
            max.evaluate(&[Value::Int(2), Value::Double(7.5)]),
            Some(Value::Double(7.5))
        );
        let like = lookup("like").unwrap();
        assert_eq!(
            like.evaluate(&[Value::Text("Alice".into()), Value::Text("a%".into())]),
            Some(Value::Bool(true))
        );
        assert_eq!(like.evaluate(&[Value::Int(1)]), None);
        assert!(!lookup("equals_in").unwrap().can_evaluate());
    }

    #[test]
    fn test_date_evaluators() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let morning = Value::Timestamp(day.and_hms_opt(8, 0, 0).unwrap());
        let evening = Value::Timestamp(day.and_hms_opt(20, 0, 0).unwrap());
        let same_day = lookup("same_day").unwrap();
        assert_eq!(
            same_day.evaluate(&[morning.clone(), evening.clone()]),
            Some(Value::Bool(true))
        );
        let before = lookup("date_before").unwrap();
        assert_eq!(
            before.evaluate(&[morning, evening]),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn test_compare_values_mixed_numeric() {
        assert_eq!(
            compare_values(&Value::Int(2), &Value::Double(2.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(compare_values(&Value::Null, &Value::Int(1)), None);
        assert_eq!(
            compare_values(&Value::Text("a".into()), &Value::Int(1)),
            None
        );
    }
}
