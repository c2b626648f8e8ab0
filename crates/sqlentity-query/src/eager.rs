//! Eager-load plans.
//!
//! An [`IncludePlan<R>`] describes which related entities to load with a
//! root query and how each one attaches to its parent. It renders a single
//! `SELECT` with one `LEFT JOIN` per step; every column is aliased
//! `t<N>__<Column>` so the materializer can split a flat row back into
//! entities.
//!
//! ```ignore
//! let plan = IncludePlan::<Blog>::new(&registry)?
//!     .include_many::<Post, _>("Posts", |blog, post| blog.posts.push(post))?
//!     .include_one::<Author, _>("Author", |blog, author| blog.author = Some(author))?
//!     .include_many_from::<Post, Comment, _>(1, "Comments", |post, c| post.comments.push(c))?;
//! ```

use crate::compile::SqlFragment;
use sqlentity_core::{
    ACTIVE_FLAG, ColumnInfo, Entity, EntityDescriptor, EntityRef, EntityRegistry, Error,
    PRIMARY_KEY, Record, Result, Row, RowMapper, quote_ident,
};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

/// Alias of the root table.
pub const ROOT_ALIAS: &str = "t0";

/// A materialized entity behind a type-erased handle; downcasts to
/// `RwLock<T>`.
pub type SharedEntity = Arc<dyn Any + Send + Sync>;

/// Whether a navigation holds one related entity or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Builds per-result-set decoders for one entity type.
pub trait NodeCodec: Send + Sync {
    fn entity_type(&self) -> TypeId;

    fn prepare(
        &self,
        columns: &ColumnInfo,
        prefix: &str,
        datetime_format: &str,
    ) -> Box<dyn NodeDecoder>;
}

/// Splits one entity out of a prefixed row.
pub trait NodeDecoder {
    /// Primary key, or `None` when the outer join produced no match.
    fn id(&self, row: &Row) -> Option<i64>;

    fn decode(&self, row: &Row) -> Result<SharedEntity>;
}

struct Codec<T>(PhantomData<fn() -> T>);

impl<T: Entity> NodeCodec for Codec<T> {
    fn entity_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn prepare(
        &self,
        columns: &ColumnInfo,
        prefix: &str,
        datetime_format: &str,
    ) -> Box<dyn NodeDecoder> {
        Box::new(RowMapper::<T>::new(columns, prefix, datetime_format))
    }
}

impl<T: Record> NodeDecoder for RowMapper<T> {
    fn id(&self, row: &Row) -> Option<i64> {
        RowMapper::id(self, row)
    }

    fn decode(&self, row: &Row) -> Result<SharedEntity> {
        let entity: SharedEntity = Arc::new(RwLock::new(self.map(row)?));
        Ok(entity)
    }
}

/// Recover the typed handle from a shared entity.
pub fn downcast<T: Record>(shared: &SharedEntity) -> Option<EntityRef<T>> {
    Arc::clone(shared).downcast::<RwLock<T>>().ok()
}

type AttachFn = Arc<dyn Fn(&SharedEntity, &SharedEntity) -> Result<()> + Send + Sync>;

/// One eager-loaded navigation.
#[derive(Clone)]
pub struct IncludeStep {
    pub descriptor: Arc<EntityDescriptor>,
    pub alias: String,
    /// Column prefix, `<alias>__`
    pub prefix: String,
    /// The foreign key lives on this step's table, pointing at the parent
    pub reversed: bool,
    pub cardinality: Cardinality,
    /// Parent step number; 0 is the root
    pub parent: usize,
    pub navigation: &'static str,
    join_condition: String,
    codec: Arc<dyn NodeCodec>,
    attach: AttachFn,
}

impl IncludeStep {
    pub fn entity_type(&self) -> TypeId {
        self.codec.entity_type()
    }

    pub fn codec(&self) -> &dyn NodeCodec {
        self.codec.as_ref()
    }

    /// Wire `child` onto `parent`'s navigation.
    pub fn attach(&self, parent: &SharedEntity, child: &SharedEntity) -> Result<()> {
        (self.attach)(parent, child)
    }
}

impl fmt::Debug for IncludeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncludeStep")
            .field("table", &self.descriptor.table)
            .field("alias", &self.alias)
            .field("reversed", &self.reversed)
            .field("cardinality", &self.cardinality)
            .field("parent", &self.parent)
            .field("navigation", &self.navigation)
            .finish_non_exhaustive()
    }
}

/// Ordered include steps rooted at `R`, forming a tree via parent numbers.
pub struct IncludePlan<R> {
    registry: Arc<EntityRegistry>,
    root: Arc<EntityDescriptor>,
    root_codec: Arc<dyn NodeCodec>,
    steps: Vec<IncludeStep>,
    _root: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for IncludePlan<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncludePlan")
            .field("root", &self.root.table)
            .field("steps", &self.steps)
            .finish()
    }
}

impl<R: Entity> IncludePlan<R> {
    pub fn new(registry: &Arc<EntityRegistry>) -> Result<Self> {
        Ok(Self {
            registry: Arc::clone(registry),
            root: registry.shared::<R>()?,
            root_codec: Arc::new(Codec::<R>(PhantomData)),
            steps: Vec::new(),
            _root: PhantomData,
        })
    }

    pub fn root(&self) -> &EntityDescriptor {
        &self.root
    }

    pub fn root_codec(&self) -> &dyn NodeCodec {
        self.root_codec.as_ref()
    }

    pub fn steps(&self) -> &[IncludeStep] {
        &self.steps
    }

    /// Load a collection of `C` whose foreign key points at the root.
    pub fn include_many<C, F>(self, navigation: &'static str, attach: F) -> Result<Self>
    where
        C: Entity,
        F: Fn(&mut R, EntityRef<C>) + Send + Sync + 'static,
    {
        self.include::<R, C, F>(0, navigation, Cardinality::Many, attach)
    }

    /// Load a single `C` related to the root.
    pub fn include_one<C, F>(self, navigation: &'static str, attach: F) -> Result<Self>
    where
        C: Entity,
        F: Fn(&mut R, EntityRef<C>) + Send + Sync + 'static,
    {
        self.include::<R, C, F>(0, navigation, Cardinality::One, attach)
    }

    /// Load a collection of `C` under the earlier step number `parent`,
    /// whose entity is `P`.
    pub fn include_many_from<P, C, F>(
        self,
        parent: usize,
        navigation: &'static str,
        attach: F,
    ) -> Result<Self>
    where
        P: Entity,
        C: Entity,
        F: Fn(&mut P, EntityRef<C>) + Send + Sync + 'static,
    {
        self.include::<P, C, F>(parent, navigation, Cardinality::Many, attach)
    }

    /// Load a single `C` under the earlier step number `parent`.
    pub fn include_one_from<P, C, F>(
        self,
        parent: usize,
        navigation: &'static str,
        attach: F,
    ) -> Result<Self>
    where
        P: Entity,
        C: Entity,
        F: Fn(&mut P, EntityRef<C>) + Send + Sync + 'static,
    {
        self.include::<P, C, F>(parent, navigation, Cardinality::One, attach)
    }

    fn include<P, C, F>(
        mut self,
        parent: usize,
        navigation: &'static str,
        cardinality: Cardinality,
        attach: F,
    ) -> Result<Self>
    where
        P: Entity,
        C: Entity,
        F: Fn(&mut P, EntityRef<C>) + Send + Sync + 'static,
    {
        let (parent_descriptor, parent_type, parent_alias) = match parent {
            0 => (Arc::clone(&self.root), TypeId::of::<R>(), ROOT_ALIAS.to_string()),
            n => match self.steps.get(n - 1) {
                Some(step) => (
                    Arc::clone(&step.descriptor),
                    step.entity_type(),
                    step.alias.clone(),
                ),
                None => {
                    return Err(Error::config(format!(
                        "include '{navigation}': no step {n} to attach to"
                    )));
                }
            },
        };
        if parent_type != TypeId::of::<P>() {
            return Err(Error::config(format!(
                "include '{navigation}': step {parent} is {}, not {}",
                parent_descriptor.table,
                P::TABLE
            )));
        }

        let child = self.registry.shared::<C>()?;
        let alias = format!("t{}", self.steps.len() + 1);
        let forward = parent_descriptor.foreign_key_to(&child.table);
        let backward = child.foreign_key_to(&parent_descriptor.table);
        let (reversed, condition) = match (cardinality, forward, backward) {
            (Cardinality::One, Some(fk), _) => (
                false,
                format!("{alias}.{PRIMARY_KEY} = {parent_alias}.{}", fk.name),
            ),
            (_, _, Some(fk)) => (
                true,
                format!("{alias}.{} = {parent_alias}.{PRIMARY_KEY}", fk.name),
            ),
            _ => {
                return Err(Error::config(format!(
                    "include '{navigation}': no foreign key from {} to {}",
                    child.table, parent_descriptor.table
                )));
            }
        };

        let attach: AttachFn = Arc::new(move |parent: &SharedEntity, child: &SharedEntity| {
            let (Some(parent), Some(child)) = (downcast::<P>(parent), downcast::<C>(child)) else {
                return Err(Error::Custom(format!(
                    "include '{navigation}': entity handle of unexpected type"
                )));
            };
            let mut guard = parent.write().unwrap_or_else(PoisonError::into_inner);
            attach(&mut *guard, child);
            Ok(())
        });

        self.steps.push(IncludeStep {
            descriptor: child,
            prefix: format!("{alias}__"),
            alias,
            reversed,
            cardinality,
            parent,
            navigation,
            join_condition: condition,
            codec: Arc::new(Codec::<C>(PhantomData)),
            attach,
        });
        Ok(self)
    }

    /// The eager-load statement. `filter` must be compiled against the
    /// root with alias [`ROOT_ALIAS`].
    pub fn select_sql(&self, filter: Option<&SqlFragment>) -> SqlFragment {
        let mut columns = projection(&self.root, ROOT_ALIAS);
        for step in &self.steps {
            columns.extend(projection(&step.descriptor, &step.alias));
        }
        let mut sql = format!(
            "SELECT {} FROM {} {ROOT_ALIAS}",
            columns.join(", "),
            quote_ident(&self.root.table)
        );
        for step in &self.steps {
            sql.push_str(&format!(
                " LEFT JOIN {} {} ON {}",
                quote_ident(&step.descriptor.table),
                step.alias,
                step.join_condition
            ));
            if step.descriptor.soft_delete {
                sql.push_str(&format!(" AND {}.{ACTIVE_FLAG} = 1", step.alias));
            }
        }
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        if let Some(filter) = filter {
            conditions.push(filter.sql.clone());
            params.extend(filter.params.iter().cloned());
        }
        if self.root.soft_delete {
            conditions.push(format!("{ROOT_ALIAS}.{ACTIVE_FLAG} = 1"));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {ROOT_ALIAS}.{PRIMARY_KEY}"));
        SqlFragment { sql, params }
    }
}

fn projection(descriptor: &EntityDescriptor, alias: &str) -> Vec<String> {
    descriptor
        .all_columns()
        .into_iter()
        .map(|(column, _)| {
            format!(
                "{alias}.{column} AS {}",
                quote_ident(&format!("{alias}__{column}"))
            )
        })
        .collect()
}
