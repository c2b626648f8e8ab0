//! Predicate compilation.
//!
//! Turns a [`Filter<T>`] into SQLite boolean text plus named parameters:
//!
//! ```ignore
//! let mut counter = 0;
//! let fragment = PredicateCompiler::new(person, &options)
//!     .alias("a")
//!     .compile(&Col::<Person>::new("Age").gt(18), &mut counter)?;
//! assert_eq!(fragment.sql, "a.Age > @Age0");
//! ```
//!
//! Parameter names are `<Column><Index>` with the index drawn from a
//! counter shared by every fragment of one statement, so names never
//! collide.
//!
//! A shape the compiler cannot render degrades the whole predicate to
//! [`ALWAYS_FALSE`] and is reported to tracing and the failure sink, or
//! fails with `Error::Translation` under [`TranslationPolicy::Strict`].

use crate::functions::{self, ArgKind, compare_values};
use crate::predicate::{CompareOp, Filter, FunctionCall, Node, Operand};
use sqlentity_core::{
    Entity, EntityDescriptor, EntityRegistry, Error, FailureEvent, FailureSink, Result, SqlParam,
    TranslationPolicy, Value, is_iso_datetime_format, is_valid_identifier, quote_ident,
};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Guard emitted for predicates that cannot be translated.
pub const ALWAYS_FALSE: &str = "1 != 1";
pub const ALWAYS_TRUE: &str = "1 = 1";

/// Compiled SQL text and its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn is_always_false(&self) -> bool {
        self.sql == ALWAYS_FALSE
    }

    /// `(self AND other)`, merging parameters.
    pub fn and(mut self, other: SqlFragment) -> Self {
        self.sql = format!("({} AND {})", self.sql, other.sql);
        self.params.extend(other.params);
        self
    }
}

/// Translation policy plus where to report degenerate predicates.
#[derive(Clone, Default)]
pub struct CompileOptions {
    pub policy: TranslationPolicy,
    pub sink: Option<Arc<dyn FailureSink>>,
    /// Timestamps are stored in a format SQLite's date functions cannot
    /// read, so date helpers over columns are untranslatable.
    pub opaque_timestamps: bool,
}

impl CompileOptions {
    pub fn new(policy: TranslationPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Record the storage format of timestamp columns.
    pub fn datetime_format(mut self, format: &str) -> Self {
        self.opaque_timestamps = !is_iso_datetime_format(format);
        self
    }

    /// Apply the policy to an untranslatable shape: `Ok(ALWAYS_FALSE)`
    /// when failing closed, `Err` when strict.
    pub fn degrade(&self, entity: &str, reason: &str) -> Result<SqlFragment> {
        match self.policy {
            TranslationPolicy::Strict => Err(Error::translation(entity, reason)),
            TranslationPolicy::FailClosed => {
                tracing::warn!(entity, reason, "Predicate compiled to always-false guard");
                if let Some(sink) = &self.sink {
                    sink.record(FailureEvent::new("translate", reason).context(entity));
                }
                Ok(SqlFragment::new(ALWAYS_FALSE))
            }
        }
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("policy", &self.policy)
            .field("sink", &self.sink.is_some())
            .field("opaque_timestamps", &self.opaque_timestamps)
            .finish()
    }
}

/// Compiles predicates over one entity, optionally qualified by an alias.
#[derive(Debug, Clone, Copy)]
pub struct PredicateCompiler<'a> {
    descriptor: &'a EntityDescriptor,
    alias: Option<&'a str>,
    options: &'a CompileOptions,
}

impl<'a> PredicateCompiler<'a> {
    pub fn new(descriptor: &'a EntityDescriptor, options: &'a CompileOptions) -> Self {
        Self {
            descriptor,
            alias: None,
            options,
        }
    }

    /// Qualify column references with `alias`.
    pub fn alias(mut self, alias: &'a str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn compile<T>(&self, filter: &Filter<T>, counter: &mut usize) -> Result<SqlFragment> {
        self.compile_node(filter.node(), counter)
    }

    /// Compile an untyped node. On success `counter` is advanced past
    /// every parameter issued; on degradation it is left untouched.
    pub fn compile_node(&self, node: &Node, counter: &mut usize) -> Result<SqlFragment> {
        let mut emitter = Emitter {
            compiler: self,
            counter: *counter,
            params: Vec::new(),
        };
        match emitter.node(node) {
            Ok(sql) => {
                *counter = emitter.counter;
                tracing::trace!(table = %self.descriptor.table, sql = %sql, "Predicate compiled");
                Ok(SqlFragment {
                    sql,
                    params: emitter.params,
                })
            }
            Err(Unsupported(reason)) => self.options.degrade(&self.descriptor.table, &reason),
        }
    }
}

/// Compile `filter` against `T`'s registered descriptor.
pub fn compile<T: Entity>(
    registry: &EntityRegistry,
    filter: &Filter<T>,
    alias: Option<&str>,
    counter: &mut usize,
    options: &CompileOptions,
) -> Result<SqlFragment> {
    let descriptor = registry.descriptor::<T>()?;
    let mut compiler = PredicateCompiler::new(descriptor, options);
    compiler.alias = alias;
    compiler.compile(filter, counter)
}

struct Unsupported(String);

fn unsupported<T>(reason: impl Into<String>) -> std::result::Result<T, Unsupported> {
    Err(Unsupported(reason.into()))
}

type Emit<T> = std::result::Result<T, Unsupported>;

/// One side of a comparison after classification.
enum Side {
    /// Rendered SQL referencing at least one column; `base` names its
    /// parameters.
    Expr { sql: String, base: String },
    Value(Value),
}

struct Emitter<'c, 'a> {
    compiler: &'c PredicateCompiler<'a>,
    counter: usize,
    params: Vec<SqlParam>,
}

impl Emitter<'_, '_> {
    fn node(&mut self, node: &Node) -> Emit<String> {
        match node {
            Node::Constant(value) => Ok(constant(*value)),
            Node::Combine { logic, left, right } => {
                let left = self.node(left)?;
                let right = self.node(right)?;
                Ok(format!("({left} {} {right})", logic.as_str()))
            }
            Node::Not(inner) => match inner.as_ref() {
                Node::Member(column) => self.member(column, false),
                Node::Constant(value) => Ok(constant(!value)),
                other => Ok(format!("NOT ({})", self.node(other)?)),
            },
            Node::Member(column) => self.member(column, true),
            Node::Call(call) => self.condition_call(call),
            Node::Compare { left, op, right } => self.compare(left, *op, right),
        }
    }

    fn resolve(&self, name: &str) -> Emit<(String, sqlentity_core::ColumnType)> {
        match self.compiler.descriptor.resolve_column(name) {
            Some((declared, ty)) => Ok((declared.to_string(), ty)),
            None => unsupported(format!(
                "unknown column '{name}' on {}",
                self.compiler.descriptor.table
            )),
        }
    }

    fn column_sql(&self, declared: &str) -> String {
        match self.compiler.alias {
            Some(alias) => format!("{alias}.{declared}"),
            None => declared.to_string(),
        }
    }

    fn param(&mut self, base: &str, value: Value) -> String {
        let name = format!("{base}{}", self.counter);
        self.counter += 1;
        let placeholder = format!("@{name}");
        self.params.push(SqlParam { name, value });
        placeholder
    }

    fn member(&self, column: &str, expected: bool) -> Emit<String> {
        let (declared, ty) = self.resolve(column)?;
        if ty != sqlentity_core::ColumnType::Boolean {
            return unsupported(format!(
                "member '{declared}' is {}, not a boolean",
                ty.label()
            ));
        }
        Ok(format!(
            "{} = {}",
            self.column_sql(&declared),
            u8::from(expected)
        ))
    }

    fn compare(&mut self, left: &Operand, op: CompareOp, right: &Operand) -> Emit<String> {
        match (self.side(left)?, self.side(right)?) {
            (Side::Expr { sql: l, .. }, Side::Expr { sql: r, .. }) => {
                Ok(format!("{l} {} {r}", op.as_str()))
            }
            (Side::Expr { sql, base }, Side::Value(value)) => {
                Ok(self.against(&sql, &base, op, value))
            }
            (Side::Value(value), Side::Expr { sql, base }) => {
                Ok(self.against(&sql, &base, op.flipped(), value))
            }
            (Side::Value(l), Side::Value(r)) => fold_comparison(&l, op, &r).map(constant),
        }
    }

    fn against(&mut self, sql: &str, base: &str, op: CompareOp, value: Value) -> String {
        let keyword = match op.null_safe() {
            Some(keyword) if value.is_null() => keyword,
            _ => op.as_str(),
        };
        let placeholder = self.param(base, value);
        format!("{sql} {keyword} {placeholder}")
    }

    fn side(&mut self, operand: &Operand) -> Emit<Side> {
        match operand {
            Operand::Column(name) => {
                let (declared, _) = self.resolve(name)?;
                Ok(Side::Expr {
                    sql: self.column_sql(&declared),
                    base: declared,
                })
            }
            Operand::Value(value) => Ok(Side::Value(value.clone())),
            Operand::Computed(computed) => Ok(Side::Value(computed.evaluate())),
            Operand::Call(call) => {
                if !call.references_column() {
                    if let Some(value) = self.try_fold(call)? {
                        return Ok(Side::Value(value));
                    }
                }
                let base = self.param_base(call)?;
                let sql = self.call_sql(call, &base)?;
                Ok(Side::Expr { sql, base })
            }
        }
    }

    fn param_base(&self, call: &FunctionCall) -> Emit<String> {
        match call.first_column() {
            Some(column) => Ok(self.resolve(column)?.0),
            None => Ok("Value".to_string()),
        }
    }

    /// Evaluate a column-free call. `Ok(None)` when the template has no
    /// evaluator and must be rendered instead.
    fn try_fold(&self, call: &FunctionCall) -> Emit<Option<Value>> {
        let template = lookup(call)?;
        if !template.can_evaluate() {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            values.push(self.literal(arg)?);
        }
        match template.evaluate(&values) {
            Some(value) => Ok(Some(value)),
            None => unsupported(format!("cannot evaluate {}(..) on literal arguments", call.name)),
        }
    }

    /// The value of a column-free operand.
    fn literal(&self, operand: &Operand) -> Emit<Value> {
        match operand {
            Operand::Value(value) => Ok(value.clone()),
            Operand::Computed(computed) => Ok(computed.evaluate()),
            Operand::Call(call) => match self.try_fold(call)? {
                Some(value) => Ok(value),
                None => unsupported(format!("{}(..) cannot be used as a value", call.name)),
            },
            Operand::Column(name) => unsupported(format!("column '{name}' used as a literal")),
        }
    }

    fn call_sql(&mut self, call: &FunctionCall, base: &str) -> Emit<String> {
        let template = lookup(call)?;
        if call.args.len() != template.arity() {
            return unsupported(format!(
                "{} expects {} argument(s), got {}",
                template.name,
                template.arity(),
                call.args.len()
            ));
        }
        if template.reads_timestamps && self.compiler.options.opaque_timestamps {
            return unsupported(format!(
                "{}(..) needs ISO-8601 timestamps; the configured datetime format is not",
                template.name
            ));
        }
        let mut rendered = Vec::with_capacity(call.args.len());
        for (arg, kind) in call.args.iter().zip(template.args) {
            let sql = match kind {
                ArgKind::Expr => self.expr_arg(arg, base)?,
                ArgKind::Int => match self.literal(arg)? {
                    Value::Int(i) => i.to_string(),
                    other => {
                        return unsupported(format!(
                            "{} expects an integer literal, got {}",
                            template.name,
                            other.type_name()
                        ));
                    }
                },
                ArgKind::Ident => match self.literal(arg)? {
                    Value::Text(name) if is_valid_identifier(&name) => quote_ident(&name),
                    other => {
                        return unsupported(format!(
                            "{} expects an identifier, got {other:?}",
                            template.name
                        ));
                    }
                },
            };
            rendered.push(sql);
        }
        Ok(template.render(&rendered))
    }

    fn expr_arg(&mut self, arg: &Operand, base: &str) -> Emit<String> {
        match arg {
            Operand::Column(name) => {
                let (declared, _) = self.resolve(name)?;
                Ok(self.column_sql(&declared))
            }
            Operand::Call(inner) if inner.references_column() => self.call_sql(inner, base),
            Operand::Call(inner) => match self.try_fold(inner)? {
                Some(value) => Ok(self.param(base, value)),
                None => self.call_sql(inner, base),
            },
            Operand::Value(_) | Operand::Computed(_) => {
                let value = self.literal(arg)?;
                Ok(self.param(base, value))
            }
        }
    }

    fn condition_call(&mut self, call: &FunctionCall) -> Emit<String> {
        let template = lookup(call)?;
        if !template.boolean {
            return unsupported(format!("{}(..) is not a condition", template.name));
        }
        if !call.references_column() {
            if let Some(value) = self.try_fold(call)? {
                return match value.as_bool() {
                    Some(b) => Ok(constant(b)),
                    None => unsupported(format!("{}(..) did not evaluate to a boolean", call.name)),
                };
            }
        }
        let base = self.param_base(call)?;
        self.call_sql(call, &base)
    }
}

fn lookup(call: &FunctionCall) -> Emit<&'static functions::FunctionTemplate> {
    match functions::lookup(&call.name) {
        Some(template) => Ok(template),
        None => unsupported(format!("unknown function '{}'", call.name)),
    }
}

fn constant(value: bool) -> String {
    if value { ALWAYS_TRUE } else { ALWAYS_FALSE }.to_string()
}

fn fold_comparison(left: &Value, op: CompareOp, right: &Value) -> Emit<bool> {
    let ordering = compare_values(left, right);
    let result = match (op, ordering) {
        (CompareOp::Eq, ordering) => ordering == Some(Ordering::Equal),
        (CompareOp::Ne, ordering) => ordering != Some(Ordering::Equal),
        (_, None) => {
            return unsupported(format!(
                "cannot order {} against {}",
                left.type_name(),
                right.type_name()
            ));
        }
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompareOp::Ge, Some(o)) => o != Ordering::Less,
    };
    Ok(result)
}
