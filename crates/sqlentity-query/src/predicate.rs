//! Typed predicate trees.
//!
//! A [`Filter<T>`] is a boolean expression over the columns of entity `T`,
//! built directly by call sites:
//!
//! ```ignore
//! let adults = Col::<Person>::new("Age").gt(18).and(Col::new("Name").eq("x"));
//! ```
//!
//! Nothing is validated here; the compiler checks column names against the
//! entity descriptor and degrades shapes it cannot render.

use sqlentity_core::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// The operator to use after swapping the operands.
    pub const fn flipped(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    /// Null-aware spelling for `=` / `!=`.
    pub const fn null_safe(self) -> Option<&'static str> {
        match self {
            CompareOp::Eq => Some("IS"),
            CompareOp::Ne => Some("IS NOT"),
            _ => None,
        }
    }
}

/// Boolean combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    pub const fn as_str(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// A deferred value, evaluated once at compile time.
#[derive(Clone)]
pub struct Computed(Arc<dyn Fn() -> Value + Send + Sync>);

impl Computed {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn evaluate(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Computed(..)")
    }
}

/// A helper-function call inside a predicate, e.g. `like(Name, 'A%')`.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Operand>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<Operand>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Whether any argument, at any depth, references a column.
    pub fn references_column(&self) -> bool {
        self.args.iter().any(Operand::references_column)
    }

    /// First column referenced by the arguments, depth first.
    pub fn first_column(&self) -> Option<&str> {
        self.args.iter().find_map(Operand::first_column)
    }
}

/// One side of a comparison, or a function argument.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A column of the filtered entity
    Column(String),
    Value(Value),
    Call(FunctionCall),
    Computed(Computed),
}

impl Operand {
    pub fn column(name: impl Into<String>) -> Self {
        Operand::Column(name.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Operand::Value(value.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Operand>) -> Self {
        Operand::Call(FunctionCall::new(name, args))
    }

    pub fn computed(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Operand::Computed(Computed::new(f))
    }

    pub fn references_column(&self) -> bool {
        match self {
            Operand::Column(_) => true,
            Operand::Call(call) => call.references_column(),
            Operand::Value(_) | Operand::Computed(_) => false,
        }
    }

    pub fn first_column(&self) -> Option<&str> {
        match self {
            Operand::Column(name) => Some(name),
            Operand::Call(call) => call.first_column(),
            Operand::Value(_) | Operand::Computed(_) => None,
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<FunctionCall> for Operand {
    fn from(call: FunctionCall) -> Self {
        Operand::Call(call)
    }
}

/// Untyped predicate node.
#[derive(Debug, Clone)]
pub enum Node {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Combine {
        logic: Logic,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// A boolean helper function
    Call(FunctionCall),
    Not(Box<Node>),
    /// A bare boolean column
    Member(String),
    Constant(bool),
}

/// A boolean expression over the columns of `T`.
pub struct Filter<T> {
    node: Node,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self::from_node(self.node.clone())
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.node).finish()
    }
}

impl<T> Filter<T> {
    pub fn from_node(node: Node) -> Self {
        Self {
            node,
            _entity: PhantomData,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    /// Matches every row.
    pub fn always() -> Self {
        Self::from_node(Node::Constant(true))
    }

    /// Matches no row.
    pub fn never() -> Self {
        Self::from_node(Node::Constant(false))
    }

    /// General comparison between two operands.
    pub fn compare(left: Operand, op: CompareOp, right: Operand) -> Self {
        Self::from_node(Node::Compare { left, op, right })
    }

    /// A boolean helper function, e.g. `Filter::call("like", ...)`.
    pub fn call(name: impl Into<String>, args: Vec<Operand>) -> Self {
        Self::from_node(Node::Call(FunctionCall::new(name, args)))
    }

    /// A bare boolean column.
    pub fn member(column: impl Into<String>) -> Self {
        Self::from_node(Node::Member(column.into()))
    }

    pub fn and(self, other: Filter<T>) -> Self {
        self.combine(Logic::And, other)
    }

    pub fn or(self, other: Filter<T>) -> Self {
        self.combine(Logic::Or, other)
    }

    fn combine(self, logic: Logic, other: Filter<T>) -> Self {
        Self::from_node(Node::Combine {
            logic,
            left: Box::new(self.node),
            right: Box::new(other.node),
        })
    }
}

impl<T> std::ops::Not for Filter<T> {
    type Output = Filter<T>;

    fn not(self) -> Self::Output {
        Filter::from_node(Node::Not(Box::new(self.node)))
    }
}

/// A typed column handle, the usual entry point for building filters.
pub struct Col<T> {
    name: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Col<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl<T> fmt::Debug for Col<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Col").field(&self.name).finish()
    }
}

impl<T> Col<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _entity: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operand(&self) -> Operand {
        Operand::Column(self.name.clone())
    }

    fn against(&self, op: CompareOp, value: Value) -> Filter<T> {
        Filter::compare(self.operand(), op, Operand::Value(value))
    }

    pub fn eq(&self, value: impl Into<Value>) -> Filter<T> {
        self.against(CompareOp::Eq, value.into())
    }

    pub fn ne(&self, value: impl Into<Value>) -> Filter<T> {
        self.against(CompareOp::Ne, value.into())
    }

    pub fn lt(&self, value: impl Into<Value>) -> Filter<T> {
        self.against(CompareOp::Lt, value.into())
    }

    pub fn le(&self, value: impl Into<Value>) -> Filter<T> {
        self.against(CompareOp::Le, value.into())
    }

    pub fn gt(&self, value: impl Into<Value>) -> Filter<T> {
        self.against(CompareOp::Gt, value.into())
    }

    pub fn ge(&self, value: impl Into<Value>) -> Filter<T> {
        self.against(CompareOp::Ge, value.into())
    }

    pub fn is_null(&self) -> Filter<T> {
        self.against(CompareOp::Eq, Value::Null)
    }

    pub fn is_not_null(&self) -> Filter<T> {
        self.against(CompareOp::Ne, Value::Null)
    }

    /// Column-to-column comparison within `T`.
    pub fn compare_col(&self, op: CompareOp, other: &Col<T>) -> Filter<T> {
        Filter::compare(self.operand(), op, other.operand())
    }

    pub fn eq_col(&self, other: &Col<T>) -> Filter<T> {
        self.compare_col(CompareOp::Eq, other)
    }

    /// Comparison against a value computed once, when the filter compiles.
    pub fn compare_computed(
        &self,
        op: CompareOp,
        f: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Filter<T> {
        Filter::compare(self.operand(), op, Operand::computed(f))
    }

    /// The column itself as a boolean condition (`= 1`).
    pub fn is_true(&self) -> Filter<T> {
        Filter::member(self.name.clone())
    }

    /// The negated boolean column (`= 0`).
    pub fn is_false(&self) -> Filter<T> {
        !Filter::member(self.name.clone())
    }

    fn helper(&self, name: &str, rest: Vec<Operand>) -> Filter<T> {
        let mut args = vec![self.operand()];
        args.extend(rest);
        Filter::call(name, args)
    }

    pub fn like(&self, pattern: impl Into<String>) -> Filter<T> {
        self.helper("like", vec![Operand::value(pattern.into())])
    }

    pub fn starts_with(&self, prefix: impl Into<String>) -> Filter<T> {
        self.helper("starts_with", vec![Operand::value(prefix.into())])
    }

    pub fn ends_with(&self, suffix: impl Into<String>) -> Filter<T> {
        self.helper("ends_with", vec![Operand::value(suffix.into())])
    }

    pub fn contains(&self, needle: impl Into<String>) -> Filter<T> {
        self.helper("contains", vec![Operand::value(needle.into())])
    }

    /// Same calendar day as `other`.
    pub fn same_day(&self, other: impl Into<Value>) -> Filter<T> {
        self.helper("same_day", vec![Operand::value(other)])
    }

    pub fn before(&self, other: impl Into<Value>) -> Filter<T> {
        self.helper("date_before", vec![Operand::value(other)])
    }

    pub fn after(&self, other: impl Into<Value>) -> Filter<T> {
        self.helper("date_after", vec![Operand::value(other)])
    }

    /// The column value appears in `table.column`.
    pub fn equals_in(&self, table: &str, column: &str) -> Filter<T> {
        self.helper(
            "equals_in",
            vec![Operand::value(table), Operand::value(column)],
        )
    }

    /// `ROUND(column, digits)` as an operand.
    pub fn round(&self, digits: i64) -> Operand {
        Operand::call("round", vec![self.operand(), Operand::value(digits)])
    }

    /// `ABS(column)` as an operand.
    pub fn abs(&self) -> Operand {
        Operand::call("abs", vec![self.operand()])
    }
}
