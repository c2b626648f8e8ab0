//! Reconciliation planner.
//!
//! Compares the target snapshot against the live one and decides, per
//! table, whether to create it, rebuild it, or only touch its indexes.
//! Every blocking problem across all tables is collected before any DDL is
//! produced, so a blocked pass never executes anything.

use crate::ddl;
use crate::snapshot::{
    ColumnSnapshot, IndexSnapshot, SchemaSnapshot, TableSnapshot, normalize_sql_type,
};
use sqlentity_core::{DEFAULT_DATETIME_FORMAT, Error, Result, SchemaErrorKind, quote_ident};
use std::fmt::Write as _;

/// Literal stored in non-nullable GUID columns added to existing rows.
pub const EMPTY_GUID: &str = "'00000000-0000-0000-0000-000000000000'";

/// Prefix of the indexes the reconciler owns.
pub const INDEX_PREFIX: &str = "IX_";

// ============================================================================
// Plan Types
// ============================================================================

/// Planner settings.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Permit dropping or retyping live columns
    pub allow_destructive: bool,
    /// chrono format of the epoch backfill for DATETIME columns
    pub datetime_format: String,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            allow_destructive: false,
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }
}

/// One column of a rebuild copy: target column and the expression that
/// reads it from the old table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnCopy {
    pub column: String,
    pub expr: String,
}

/// The change planned for one table.
#[derive(Debug, Clone)]
pub enum TableChange {
    /// Table absent: create it with its indexes.
    Create(TableSnapshot),
    /// Columns or constraints differ: rebuild through a temporary table.
    Rebuild {
        target: TableSnapshot,
        copy: Vec<ColumnCopy>,
        /// Human-readable differences, for the log
        reasons: Vec<String>,
    },
    /// Only reconciler-owned indexes differ.
    Indexes {
        table: String,
        create: Vec<IndexSnapshot>,
        drop: Vec<String>,
    },
}

impl TableChange {
    pub fn table(&self) -> &str {
        match self {
            TableChange::Create(t) | TableChange::Rebuild { target: t, .. } => &t.name,
            TableChange::Indexes { table, .. } => table,
        }
    }

    /// DDL statements for this change.
    pub fn statements(&self) -> Vec<String> {
        match self {
            TableChange::Create(table) => ddl::create_table_with_indexes(table),
            TableChange::Rebuild { target, copy, .. } => ddl::rebuild_table(target, copy),
            TableChange::Indexes {
                table,
                create,
                drop,
            } => {
                let mut out: Vec<String> = drop.iter().map(|n| ddl::drop_index(n)).collect();
                out.extend(create.iter().map(|i| ddl::create_index(table, i)));
                out
            }
        }
    }
}

/// Ordered changes for one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    pub changes: Vec<TableChange>,
    /// Destructive changes that were permitted by configuration
    pub warnings: Vec<String>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Every statement of the pass, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.changes.iter().flat_map(TableChange::statements).collect()
    }
}

// ============================================================================
// Diff Algorithm
// ============================================================================

#[derive(Default)]
struct Findings {
    blocked: Vec<(SchemaErrorKind, String)>,
    warnings: Vec<String>,
}

impl Findings {
    fn destructive(&mut self, allow: bool, message: String) {
        if allow {
            tracing::warn!(change = %message, "Destructive schema change permitted");
            self.warnings.push(message);
        } else {
            self.blocked
                .push((SchemaErrorKind::DestructiveMigrationBlocked, message));
        }
    }

    fn reject(&mut self, message: String) {
        self.blocked.push((SchemaErrorKind::TighteningRejected, message));
    }

    fn into_error(self) -> Option<Error> {
        let (kind, _) = self.blocked.first()?;
        let kind = *kind;
        let problems: Vec<String> = self.blocked.into_iter().map(|(_, m)| m).collect();
        let mut message = format!(
            "reconciliation aborted, no changes were applied: {}",
            problems.join("; ")
        );
        if kind == SchemaErrorKind::DestructiveMigrationBlocked {
            message.push_str(
                " (set allow_destructive_migrations to drop or retype live columns)",
            );
        }
        Some(Error::schema(kind, message))
    }
}

/// Plan the changes turning `live` into `target`.
///
/// Live tables absent from the target are left alone.
pub fn plan_migration(
    target: &SchemaSnapshot,
    live: &SchemaSnapshot,
    options: &PlanOptions,
) -> Result<MigrationPlan> {
    let mut findings = Findings::default();
    let mut changes = Vec::new();

    for table in target.tables.values() {
        match live.table(&table.name) {
            None => changes.push(TableChange::Create(table.clone())),
            Some(current) => {
                if let Some(change) = diff_table(table, current, options, &mut findings) {
                    changes.push(change);
                }
            }
        }
    }

    let warnings = findings.warnings.clone();
    if let Some(err) = findings.into_error() {
        tracing::error!(error = %err, "Schema reconciliation blocked");
        return Err(err);
    }
    for change in &changes {
        match change {
            TableChange::Rebuild { target, reasons, .. } => {
                tracing::debug!(table = %target.name, reasons = ?reasons, "Table needs rebuild");
            }
            other => tracing::debug!(table = %other.table(), "Table change planned"),
        }
    }
    Ok(MigrationPlan { changes, warnings })
}

fn diff_table(
    target: &TableSnapshot,
    live: &TableSnapshot,
    options: &PlanOptions,
    findings: &mut Findings,
) -> Option<TableChange> {
    let table = target.name.as_str();
    let mut reasons = Vec::new();
    let mut copy = Vec::new();

    for column in &target.columns {
        let fill = || backfill(&column.sql_type, &options.datetime_format);
        let Some(current) = live.column(&column.name) else {
            if !column.nullable {
                if target.foreign_key(&column.name).is_some() {
                    findings.reject(format!(
                        "{table}.{}: a non-nullable foreign key column cannot be added to existing rows",
                        column.name
                    ));
                    continue;
                }
                copy.push(ColumnCopy {
                    column: column.name.clone(),
                    expr: fill(),
                });
            }
            reasons.push(format!("add column {}", column.name));
            continue;
        };

        let source = quote_ident(&current.name);
        if column.is_text_resize(current) && !column.same_type(current) {
            reasons.push(format!("resize column {}", column.name));
        } else if !column.same_type(current) {
            findings.destructive(
                options.allow_destructive,
                format!(
                    "{table}.{}: type would change from {} to {}",
                    column.name, current.sql_type, column.sql_type
                ),
            );
            reasons.push(format!("retype column {}", column.name));
        }
        if tightened(current, column) {
            let was_fk = live.foreign_key(&current.name).is_some();
            let is_fk = target.foreign_key(&column.name).is_some();
            if is_fk && !was_fk {
                findings.reject(format!(
                    "{table}.{}: cannot become a non-nullable foreign key; no backfill satisfies the reference",
                    column.name
                ));
                continue;
            }
            copy.push(ColumnCopy {
                column: column.name.clone(),
                expr: format!("COALESCE({source}, {})", fill()),
            });
            reasons.push(format!("make {} non-nullable", column.name));
            continue;
        }
        if column.nullable && !current.nullable {
            reasons.push(format!("make {} nullable", column.name));
        }
        if column.primary_key != current.primary_key {
            reasons.push(format!("primary key on {}", column.name));
        }
        copy.push(ColumnCopy {
            column: column.name.clone(),
            expr: source,
        });
    }

    for current in &live.columns {
        if target.column(&current.name).is_none() {
            findings.destructive(
                options.allow_destructive,
                format!("{table}.{}: live column would be dropped", current.name),
            );
            reasons.push(format!("drop column {}", current.name));
        }
    }

    diff_foreign_keys(target, live, &mut reasons);
    diff_uniques(target, live, &mut reasons);

    if !reasons.is_empty() {
        return Some(TableChange::Rebuild {
            target: target.clone(),
            copy,
            reasons,
        });
    }

    let create: Vec<IndexSnapshot> = target
        .indexes
        .iter()
        .filter(|index| !live.indexes.contains(index))
        .cloned()
        .collect();
    let drop: Vec<String> = live
        .indexes
        .iter()
        .filter(|index| index.name.starts_with(INDEX_PREFIX) && !target.indexes.contains(index))
        .map(|index| index.name.clone())
        .collect();
    if create.is_empty() && drop.is_empty() {
        return None;
    }
    Some(TableChange::Indexes {
        table: target.name.clone(),
        create,
        drop,
    })
}

fn tightened(live: &ColumnSnapshot, target: &ColumnSnapshot) -> bool {
    live.nullable && !target.nullable
}

fn diff_foreign_keys(target: &TableSnapshot, live: &TableSnapshot, reasons: &mut Vec<String>) {
    for fk in &target.foreign_keys {
        let matched = live
            .foreign_keys
            .iter()
            .any(|current| current.same_reference(fk) && current.name == fk.name);
        if !matched {
            reasons.push(format!("foreign key on {}", fk.column));
        }
    }
    for current in &live.foreign_keys {
        if target.foreign_key(&current.column).is_none() {
            reasons.push(format!("drop foreign key on {}", current.column));
        }
    }
}

fn diff_uniques(target: &TableSnapshot, live: &TableSnapshot, reasons: &mut Vec<String>) {
    let key = |name: &Option<String>, columns: &[String]| {
        (
            name.clone(),
            columns
                .iter()
                .map(|c| c.to_ascii_lowercase())
                .collect::<Vec<_>>(),
        )
    };
    let mut wanted: Vec<_> = target
        .unique_constraints
        .iter()
        .map(|u| key(&u.name, &u.columns))
        .collect();
    let mut present: Vec<_> = live
        .unique_constraints
        .iter()
        .map(|u| key(&u.name, &u.columns))
        .collect();
    wanted.sort();
    present.sort();
    if wanted != present {
        reasons.push("unique constraints".to_string());
    }
}

/// Value written into existing rows for a non-nullable column of
/// `sql_type`.
pub fn backfill(sql_type: &str, datetime_format: &str) -> String {
    let normalized = normalize_sql_type(sql_type);
    let base = normalized.split('(').next().unwrap_or_default();
    match base {
        "INTEGER" | "INT" | "BIGINT" | "REAL" | "DOUBLE" | "FLOAT" | "NUMERIC" | "BOOLEAN" => {
            "0".to_string()
        }
        "GUID" => EMPTY_GUID.to_string(),
        "DATETIME" => format!("'{}'", epoch(datetime_format)),
        "BLOB" => "X''".to_string(),
        _ => "'-'".to_string(),
    }
}

fn epoch(format: &str) -> String {
    let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH.naive_utc();
    let mut out = String::new();
    if write!(out, "{}", epoch.format(format)).is_err() {
        out.clear();
        out.push_str(&epoch.format(DEFAULT_DATETIME_FORMAT).to_string());
    }
    out.replace('\'', "''")
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expected::target_snapshot;
    use crate::fixtures::{
        ItemIndexed, ItemNarrow, ItemNullable, ItemRetyped, ItemUnique, ItemV1, ItemV2, Post,
        PostLoose, PostV1, PostWide, Widget,
    };
    use sqlentity_core::{Entity, EntityRegistry};

    fn snapshot_of<E: Entity>() -> SchemaSnapshot {
        let registry = EntityRegistry::builder().register::<E>().build().unwrap();
        target_snapshot(&registry).unwrap()
    }

    fn posts_of<E: Entity>() -> SchemaSnapshot {
        let registry = EntityRegistry::builder()
            .register::<Widget>()
            .register::<E>()
            .build()
            .unwrap();
        target_snapshot(&registry).unwrap()
    }

    fn plan(target: &SchemaSnapshot, live: &SchemaSnapshot) -> Result<MigrationPlan> {
        plan_migration(target, live, &PlanOptions::default())
    }

    // ==== Creation and idempotence ====

    #[test]
    fn test_missing_table_is_created() {
        let plan = plan(&snapshot_of::<ItemV1>(), &SchemaSnapshot::new()).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan.changes[0], TableChange::Create(_)));
        assert!(plan.statements()[0].starts_with("CREATE TABLE \"Item\""));
    }

    #[test]
    fn test_matching_schema_plans_nothing() {
        let schema = posts_of::<Post>();
        assert!(plan(&schema, &schema).unwrap().is_empty());
    }

    #[test]
    fn test_extra_live_tables_are_ignored() {
        let live = posts_of::<Post>();
        let plan = plan(&snapshot_of::<Widget>(), &live).unwrap();
        assert!(plan.is_empty());
    }

    // ==== Additions ====

    #[test]
    fn test_additions_get_type_backfills() {
        let plan = plan(&snapshot_of::<ItemV2>(), &snapshot_of::<ItemV1>()).unwrap();
        let TableChange::Rebuild { copy, .. } = &plan.changes[0] else {
            panic!("expected rebuild");
        };
        let expr = |name: &str| {
            copy.iter()
                .find(|c| c.column == name)
                .map(|c| c.expr.clone())
        };
        assert_eq!(expr("Name").as_deref(), Some("\"Name\""));
        assert_eq!(expr("Quantity").as_deref(), Some("0"));
        assert_eq!(expr("Price").as_deref(), Some("0"));
        assert_eq!(expr("Code").as_deref(), Some(EMPTY_GUID));
        assert_eq!(expr("Seen").as_deref(), Some("'1970-01-01 00:00:00'"));
        assert_eq!(expr("Flag").as_deref(), Some("0"));
        assert_eq!(expr("Data").as_deref(), Some("X''"));
        // nullable additions start out NULL
        assert_eq!(expr("Note"), None);
    }

    #[test]
    fn test_datetime_backfill_uses_configured_format() {
        assert_eq!(backfill("DATETIME", "%d/%m/%Y"), "'01/01/1970'");
        assert_eq!(backfill("varchar(10)", "%Y"), "'-'");
    }

    // ==== Destructive changes ====

    #[test]
    fn test_dropped_column_is_blocked() {
        let err = plan(&snapshot_of::<ItemNarrow>(), &snapshot_of::<ItemV1>()).unwrap_err();
        assert_eq!(
            err.schema_kind(),
            Some(SchemaErrorKind::DestructiveMigrationBlocked)
        );
        assert!(err.to_string().contains("Item.Name: live column would be dropped"));
        assert!(err.to_string().contains("no changes were applied"));
    }

    #[test]
    fn test_retype_is_blocked() {
        let err = plan(&snapshot_of::<ItemRetyped>(), &snapshot_of::<ItemV1>()).unwrap_err();
        assert!(err.to_string().contains("from TEXT to INTEGER"));
    }

    #[test]
    fn test_text_length_change_is_not_destructive() {
        let widened = plan(&snapshot_of::<PostWide>(), &snapshot_of::<PostV1>()).unwrap();
        assert!(widened.warnings.is_empty());
        let TableChange::Rebuild { target, copy, reasons } = &widened.changes[0] else {
            panic!("expected rebuild");
        };
        assert_eq!(target.column("Title").unwrap().sql_type, "VARCHAR(200)");
        assert_eq!(reasons, &["resize column Title"]);
        assert!(copy.iter().any(|c| c.column == "Title" && c.expr == "\"Title\""));

        // Narrowing keeps the stored text too
        assert!(plan(&snapshot_of::<PostV1>(), &snapshot_of::<PostWide>()).is_ok());
    }

    #[test]
    fn test_force_flag_permits_destruction() {
        let options = PlanOptions {
            allow_destructive: true,
            ..PlanOptions::default()
        };
        let plan =
            plan_migration(&snapshot_of::<ItemNarrow>(), &snapshot_of::<ItemV1>(), &options)
                .unwrap();
        assert_eq!(plan.warnings.len(), 1);
        let TableChange::Rebuild { copy, .. } = &plan.changes[0] else {
            panic!("expected rebuild");
        };
        assert!(copy.iter().all(|c| c.column != "Name"));
        // Label is a non-nullable addition
        assert!(copy.iter().any(|c| c.column == "Label" && c.expr == "'-'"));
    }

    // ==== Tightening ====

    #[test]
    fn test_tightening_copies_through_coalesce() {
        let plan = plan(&snapshot_of::<ItemV1>(), &snapshot_of::<ItemNullable>()).unwrap();
        let TableChange::Rebuild { copy, .. } = &plan.changes[0] else {
            panic!("expected rebuild");
        };
        assert!(copy.iter().any(|c| c.expr == "COALESCE(\"Name\", '-')"));
    }

    #[test]
    fn test_tightening_into_foreign_key_is_rejected() {
        let err = plan(&posts_of::<Post>(), &posts_of::<PostLoose>()).unwrap_err();
        assert_eq!(err.schema_kind(), Some(SchemaErrorKind::TighteningRejected));
        assert!(err.to_string().contains("Post.WidgetId"));
    }

    #[test]
    fn test_adding_required_foreign_key_is_rejected() {
        let err = plan(&posts_of::<Post>(), &posts_of::<PostV1>()).unwrap_err();
        assert_eq!(err.schema_kind(), Some(SchemaErrorKind::TighteningRejected));
    }

    // ==== Constraints and indexes ====

    #[test]
    fn test_unique_group_change_rebuilds() {
        let plan = plan(&snapshot_of::<ItemUnique>(), &snapshot_of::<ItemV1>()).unwrap();
        let TableChange::Rebuild { reasons, .. } = &plan.changes[0] else {
            panic!("expected rebuild");
        };
        assert_eq!(reasons, &["unique constraints".to_string()]);
    }

    #[test]
    fn test_index_only_difference_uses_create_index() {
        let plan = plan(&snapshot_of::<ItemIndexed>(), &snapshot_of::<ItemV1>()).unwrap();
        assert_eq!(
            plan.statements(),
            ["CREATE INDEX \"IX_Item_Name\" ON \"Item\" (\"Name\")"]
        );
        let plan = self::plan(&snapshot_of::<ItemV1>(), &snapshot_of::<ItemIndexed>()).unwrap();
        assert_eq!(plan.statements(), ["DROP INDEX \"IX_Item_Name\""]);
    }

    #[test]
    fn test_foreign_indexes_are_left_alone() {
        let target = snapshot_of::<ItemV1>();
        let mut live = target.clone();
        if let Some(item) = live.tables.get_mut("Item") {
            item.indexes.push(IndexSnapshot {
                name: "by_name".into(),
                columns: vec!["Name".into()],
            });
        }
        assert!(plan(&target, &live).unwrap().is_empty());
    }
}
