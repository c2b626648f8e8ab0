//! The entity registry: every entity type's descriptor, built once.
//!
//! ```ignore
//! let registry = EntityRegistry::builder()
//!     .register::<Blog>()
//!     .register::<Post>()
//!     .relations(|r| {
//!         r.entity("Post").unique_group(&["BlogId", "Slug"]).index(&["Title"]);
//!     })
//!     .build()?;
//! ```

use crate::Result;
use crate::descriptor::{DescriptorBuilder, EntityDescriptor, ForeignKeySpec, IndexSpec};
use crate::error::Error;
use crate::field::{FieldSpec, PRIMARY_KEY, ReferentialAction};
use crate::identifiers::is_valid_identifier;
use crate::model::Entity;
use crate::types::ColumnType;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only map from entity type (and table name) to descriptor.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    ordered: Vec<Arc<EntityDescriptor>>,
    by_type: HashMap<TypeId, usize>,
    by_table: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Descriptor of a registered entity type.
    pub fn descriptor<E: Entity>(&self) -> Result<&EntityDescriptor> {
        self.descriptor_of(TypeId::of::<E>()).ok_or_else(|| {
            Error::config(format!(
                "entity {} is not registered",
                std::any::type_name::<E>()
            ))
        })
    }

    pub fn descriptor_of(&self, type_id: TypeId) -> Option<&EntityDescriptor> {
        self.by_type
            .get(&type_id)
            .map(|&i| self.ordered[i].as_ref())
    }

    /// Shared handle to a descriptor, for plans that outlive a borrow.
    pub fn shared<E: Entity>(&self) -> Result<Arc<EntityDescriptor>> {
        self.descriptor::<E>()?;
        let i = self.by_type[&TypeId::of::<E>()];
        Ok(Arc::clone(&self.ordered[i]))
    }

    /// Descriptor by table name, ignoring ASCII case.
    pub fn table(&self, name: &str) -> Option<&EntityDescriptor> {
        self.by_table
            .get(&name.to_ascii_lowercase())
            .map(|&i| self.ordered[i].as_ref())
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.ordered.iter().map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

struct Registration {
    type_id: TypeId,
    table: &'static str,
    fields: &'static [FieldSpec],
    builder: DescriptorBuilder,
}

type RelationCallback = Box<dyn FnOnce(&mut RelationConfig)>;

/// Collects entity registrations and relation callbacks.
#[derive(Default)]
pub struct RegistryBuilder {
    registrations: Vec<Registration>,
    callbacks: Vec<RelationCallback>,
}

impl RegistryBuilder {
    /// Register an entity type. Its `describe` hook runs now.
    pub fn register<E: Entity>(mut self) -> Self {
        let builder = E::describe(DescriptorBuilder::from_record::<E>(E::TABLE));
        self.registrations.push(Registration {
            type_id: TypeId::of::<E>(),
            table: E::TABLE,
            fields: E::fields(),
            builder,
        });
        self
    }

    /// Add a declarative relation/index configuration callback.
    pub fn relations(mut self, callback: impl FnOnce(&mut RelationConfig) + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Validate everything and freeze the registry.
    pub fn build(self) -> Result<EntityRegistry> {
        let mut problems = Vec::new();
        let mut descriptors = Vec::with_capacity(self.registrations.len());
        let mut type_ids = Vec::with_capacity(self.registrations.len());

        for registration in self.registrations {
            let primary = registration
                .fields
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(PRIMARY_KEY));
            match primary {
                Some(f) if f.column_type == ColumnType::Integer => {}
                Some(_) => problems.push(format!(
                    "{}: field '{}' must be an integer",
                    registration.table,
                    PRIMARY_KEY
                )),
                None => problems.push(format!(
                    "{}: missing '{}' field",
                    registration.table,
                    PRIMARY_KEY
                )),
            }
            let (descriptor, mut found) = registration.builder.finish();
            problems.append(&mut found);
            if type_ids.contains(&registration.type_id) {
                problems.push(format!("{}: registered twice", descriptor.table));
                continue;
            }
            type_ids.push(registration.type_id);
            descriptors.push(descriptor);
        }

        let mut config = RelationConfig::default();
        for callback in self.callbacks {
            callback(&mut config);
        }
        config.apply(&mut descriptors, &mut problems);

        validate(&descriptors, &mut problems);
        if !problems.is_empty() {
            return Err(Error::config(format!(
                "invalid entity model: {}",
                problems.join("; ")
            )));
        }

        let mut registry = EntityRegistry::default();
        for (descriptor, type_id) in descriptors.into_iter().zip(type_ids) {
            let index = registry.ordered.len();
            registry.by_type.insert(type_id, index);
            registry
                .by_table
                .insert(descriptor.table.to_ascii_lowercase(), index);
            registry.ordered.push(Arc::new(descriptor));
        }
        tracing::debug!(entities = registry.len(), "Entity registry built");
        Ok(registry)
    }
}

fn validate(descriptors: &[EntityDescriptor], problems: &mut Vec<String>) {
    let mut tables: HashMap<String, &str> = HashMap::new();
    for d in descriptors {
        if !is_valid_identifier(&d.table) {
            problems.push(format!("'{}' is not a valid table name", d.table));
        }
        if let Some(previous) = tables.insert(d.table.to_ascii_lowercase(), d.type_name) {
            problems.push(format!(
                "table '{}' declared by both {} and {}",
                d.table, previous, d.type_name
            ));
        }
        for column in &d.columns {
            if !is_valid_identifier(&column.name) {
                problems.push(format!(
                    "{}: '{}' is not a valid column name",
                    d.table, column.name
                ));
            }
        }
    }

    for d in descriptors {
        for (column, fk) in d.foreign_keys() {
            let target = descriptors
                .iter()
                .find(|t| t.table.eq_ignore_ascii_case(&fk.table));
            match target {
                None => problems.push(format!(
                    "{}.{} references unregistered table '{}'",
                    d.table, column.name, fk.table
                )),
                Some(t) if t.resolve_column(&fk.column).is_none() => problems.push(format!(
                    "{}.{} references unknown column {}.{}",
                    d.table, column.name, t.table, fk.column
                )),
                Some(_) => {}
            }
        }
    }
}

/// Declarative relation and index configuration, applied after every
/// entity's own `describe` hook.
#[derive(Debug, Default)]
pub struct RelationConfig {
    rules: Vec<RelationRule>,
}

#[derive(Debug, Clone)]
enum RelationRule {
    UniqueGroup { table: String, columns: Vec<String> },
    Index { table: String, columns: Vec<String> },
    References {
        table: String,
        column: String,
        target: ForeignKeySpec,
    },
}

impl RelationConfig {
    /// Start configuring one table.
    pub fn entity(&mut self, table: &str) -> EntityRelations<'_> {
        EntityRelations {
            config: self,
            table: table.to_string(),
        }
    }

    fn apply(self, descriptors: &mut [EntityDescriptor], problems: &mut Vec<String>) {
        for rule in self.rules {
            let table = match &rule {
                RelationRule::UniqueGroup { table, .. }
                | RelationRule::Index { table, .. }
                | RelationRule::References { table, .. } => table.clone(),
            };
            let Some(d) = descriptors
                .iter_mut()
                .find(|d| d.table.eq_ignore_ascii_case(&table))
            else {
                problems.push(format!("relation configured for unknown table '{table}'"));
                continue;
            };
            match rule {
                RelationRule::UniqueGroup { columns, .. } => {
                    let group = d.next_unique_group();
                    for name in &columns {
                        match d.column_mut(name) {
                            Some(c) if c.unique_group.is_none() => c.unique_group = Some(group),
                            Some(_) => problems.push(format!(
                                "{}: column '{}' already belongs to a unique group",
                                d.table, name
                            )),
                            None => problems.push(format!(
                                "{}: unique group references unknown column '{}'",
                                d.table, name
                            )),
                        }
                    }
                }
                RelationRule::Index { columns, .. } => {
                    if let Some(name) = columns.iter().find(|c| d.resolve_column(c).is_none()) {
                        problems.push(format!(
                            "{}: index references unknown column '{}'",
                            d.table, name
                        ));
                    }
                    d.indexes.push(IndexSpec { columns });
                }
                RelationRule::References { column, target, .. } => match d.column_mut(&column) {
                    Some(c) => c.foreign_key = Some(target),
                    None => problems.push(format!(
                        "{}: foreign key on unknown column '{}'",
                        d.table, column
                    )),
                },
            }
        }
    }
}

/// Fluent configuration for one table; see [`RelationConfig::entity`].
pub struct EntityRelations<'a> {
    config: &'a mut RelationConfig,
    table: String,
}

impl EntityRelations<'_> {
    /// One UNIQUE constraint spanning `columns`.
    pub fn unique_group(self, columns: &[&str]) -> Self {
        let rule = RelationRule::UniqueGroup {
            table: self.table.clone(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        };
        self.config.rules.push(rule);
        self
    }

    /// A plain index over `columns`.
    pub fn index(self, columns: &[&str]) -> Self {
        let rule = RelationRule::Index {
            table: self.table.clone(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        };
        self.config.rules.push(rule);
        self
    }

    /// `column` references the primary key of `target`.
    pub fn references(self, column: &str, target: &str, on_delete: ReferentialAction) -> Self {
        let rule = RelationRule::References {
            table: self.table.clone(),
            column: column.to_string(),
            target: ForeignKeySpec::to(target).on_delete(on_delete),
        };
        self.config.rules.push(rule);
        self
    }
}
