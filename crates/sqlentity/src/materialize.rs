//! Row materialization.
//!
//! Flat reads map each row onto a fresh `Record`. Graph reads split every
//! row of an [`IncludePlan`] statement into its root and related entities,
//! deduplicate them through an [`IdentityMap`], and wire each child onto its
//! parent's navigation once per distinct (parent, navigation, child).
//!
//! Decoders are prepared from the first row's column set, so a statement
//! that returns nothing costs no mapping work.

use sqlentity_core::{
    Connection, Entity, EntityRef, Error, Record, Result, Row, RowMapper, SqlParam,
};
use sqlentity_query::{IncludePlan, NodeDecoder, ROOT_ALIAS, SharedEntity, SqlFragment, downcast};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};

/// One shared instance per (entity type, primary key) within a result set.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<(TypeId, i64), SharedEntity>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_id: TypeId, id: i64) -> Option<&SharedEntity> {
        self.entries.get(&(type_id, id))
    }

    /// The tracked instance for `(type_id, id)`, decoding it on first
    /// sight. The flag is true when the instance was created by this call.
    pub fn resolve(
        &mut self,
        type_id: TypeId,
        id: i64,
        decode: impl FnOnce() -> Result<SharedEntity>,
    ) -> Result<(SharedEntity, bool)> {
        if let Some(existing) = self.entries.get(&(type_id, id)) {
            return Ok((SharedEntity::clone(existing), false));
        }
        let created = decode()?;
        self.entries
            .insert((type_id, id), SharedEntity::clone(&created));
        Ok((created, true))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run `sql` and map every row onto a new `D`. Columns match fields by
/// name, ignoring case; unmatched columns are skipped and NULL keeps the
/// field's default.
pub fn fetch_records<D: Record, C: Connection + ?Sized>(
    conn: &C,
    sql: &str,
    params: &[SqlParam],
    datetime_format: &str,
) -> Result<Vec<D>> {
    let mut mapper: Option<RowMapper<D>> = None;
    let mut records = Vec::new();
    conn.query_each(sql, params, &mut |row: &Row| {
        let mapper = mapper
            .get_or_insert_with(|| RowMapper::new(&row.column_info(), "", datetime_format));
        records.push(mapper.map(row)?);
        Ok(())
    })?;
    tracing::trace!(rows = records.len(), "Rows materialized");
    Ok(records)
}

/// Decoders for the root and each include step, in step order.
struct GraphDecoders {
    root: Box<dyn NodeDecoder>,
    steps: Vec<Box<dyn NodeDecoder>>,
}

impl GraphDecoders {
    fn prepare<R: Entity>(plan: &IncludePlan<R>, row: &Row, datetime_format: &str) -> Self {
        let columns = row.column_info();
        let root_prefix = format!("{ROOT_ALIAS}__");
        Self {
            root: plan
                .root_codec()
                .prepare(&columns, &root_prefix, datetime_format),
            steps: plan
                .steps()
                .iter()
                .map(|step| step.codec().prepare(&columns, &step.prefix, datetime_format))
                .collect(),
        }
    }
}

/// Execute an eager-load statement and assemble the object graph. Roots are
/// returned in first-seen order.
#[tracing::instrument(level = "debug", skip_all, fields(root = %plan.root().table))]
pub fn fetch_graph<R: Entity, C: Connection + ?Sized>(
    conn: &C,
    plan: &IncludePlan<R>,
    statement: &SqlFragment,
    datetime_format: &str,
) -> Result<Vec<EntityRef<R>>> {
    let steps = plan.steps();
    let root_type = TypeId::of::<R>();
    let mut decoders: Option<GraphDecoders> = None;
    let mut identities = IdentityMap::new();
    let mut attached: HashSet<(usize, i64, i64)> = HashSet::new();
    let mut roots: Vec<SharedEntity> = Vec::new();
    // Per row: slot 0 is the root, slot n is step n
    let mut resolved: Vec<Option<(i64, SharedEntity)>> = Vec::with_capacity(steps.len() + 1);

    conn.query_each(&statement.sql, &statement.params, &mut |row: &Row| {
        let decoders =
            decoders.get_or_insert_with(|| GraphDecoders::prepare(plan, row, datetime_format));
        resolved.clear();

        let Some(root_id) = decoders.root.id(row) else {
            return Err(Error::Custom(format!(
                "eager load of {}: row without a root key",
                plan.root().table
            )));
        };
        let (root, created) = identities.resolve(root_type, root_id, || decoders.root.decode(row))?;
        if created {
            roots.push(SharedEntity::clone(&root));
        }
        resolved.push(Some((root_id, root)));

        for (index, (step, decoder)) in steps.iter().zip(&decoders.steps).enumerate() {
            // Outer join without a match
            let Some(child_id) = decoder.id(row) else {
                resolved.push(None);
                continue;
            };
            let (child, _) =
                identities.resolve(step.entity_type(), child_id, || decoder.decode(row))?;
            if let Some(Some((parent_id, parent))) = resolved.get(step.parent) {
                if attached.insert((index, *parent_id, child_id)) {
                    step.attach(parent, &child)?;
                }
            }
            resolved.push(Some((child_id, child)));
        }
        Ok(())
    })?;

    tracing::debug!(
        roots = roots.len(),
        instances = identities.len(),
        "Object graph materialized"
    );
    roots
        .iter()
        .map(|shared| {
            downcast::<R>(shared).ok_or_else(|| {
                Error::Custom(format!(
                    "eager load of {}: root handle of unexpected type",
                    plan.root().table
                ))
            })
        })
        .collect()
}
