//! Row to record mapping.
//!
//! A [`RowMapper`] is built once per result set: it pairs every field of
//! the target record with the same-named column (ignoring ASCII case,
//! optionally behind a `prefix`). Unmatched columns are ignored; NULL
//! columns leave the field at its default.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::field::PRIMARY_KEY;
use crate::model::Record;
use crate::row::{ColumnInfo, Row};
use crate::types::ColumnType;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::marker::PhantomData;
use uuid::Uuid;

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];

/// Parse stored timestamp text, trying `format` first.
pub fn parse_datetime(text: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
        return Some(parsed);
    }
    FALLBACK_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Convert a raw storage value into the representation a field of type
/// `target` expects.
pub fn coerce(value: &Value, target: ColumnType, datetime_format: &str) -> Result<Value> {
    let converted = match (target, value) {
        (_, Value::Null) => Some(Value::Null),
        (ColumnType::Guid, Value::Text(s)) => Uuid::parse_str(s).ok().map(Value::Uuid),
        (ColumnType::Guid, Value::Bytes(b)) => Uuid::from_slice(b).ok().map(Value::Uuid),
        (ColumnType::DateTime, Value::Text(s)) => {
            parse_datetime(s, datetime_format).map(Value::Timestamp)
        }
        (ColumnType::DateTime, Value::Int(secs)) => {
            DateTime::from_timestamp(*secs, 0).map(|d| Value::Timestamp(d.naive_utc()))
        }
        (ColumnType::Boolean, Value::Int(v)) => Some(Value::Bool(*v != 0)),
        (ColumnType::Real, Value::Int(v)) => Some(Value::Double(*v as f64)),
        (ColumnType::Text, Value::Int(v)) => Some(Value::Text(v.to_string())),
        (ColumnType::Text, Value::Double(v)) => Some(Value::Text(v.to_string())),
        (_, other) => Some(other.clone()),
    };
    converted.ok_or_else(|| {
        Error::Type(TypeError {
            expected: target.label(),
            actual: format!("{:?}", value),
            column: None,
        })
    })
}

/// Field-to-column pairing for one result set.
#[derive(Debug, Clone)]
pub struct RowMapper<R: Record> {
    /// (column index, field index)
    slots: Vec<(usize, usize)>,
    id_column: Option<usize>,
    datetime_format: String,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> RowMapper<R> {
    /// Match `R`'s fields against `columns`. With a non-empty `prefix`, a
    /// field `Name` matches the column `{prefix}Name`.
    pub fn new(columns: &ColumnInfo, prefix: &str, datetime_format: &str) -> Self {
        let slots = R::fields()
            .iter()
            .enumerate()
            .filter_map(|(fi, field)| {
                columns
                    .index_of(&format!("{prefix}{}", field.name))
                    .map(|ci| (ci, fi))
            })
            .collect();
        Self {
            slots,
            id_column: columns.index_of(&format!("{prefix}{PRIMARY_KEY}")),
            datetime_format: datetime_format.to_string(),
            _record: PhantomData,
        }
    }

    /// Number of fields that found a column.
    pub fn mapped(&self) -> usize {
        self.slots.len()
    }

    /// Primary key in this row, if the key column is present and non-null.
    pub fn id(&self, row: &Row) -> Option<i64> {
        self.id_column
            .and_then(|i| row.get(i))
            .and_then(Value::as_i64)
    }

    /// Build a fresh record from one row.
    pub fn map(&self, row: &Row) -> Result<R> {
        let fields = R::fields();
        let mut record = R::default();
        for &(ci, fi) in &self.slots {
            let Some(raw) = row.get(ci) else { continue };
            if raw.is_null() {
                continue;
            }
            let field = &fields[fi];
            let value = coerce(raw, field.column_type, &self.datetime_format).map_err(|e| {
                with_column(e, field.name)
            })?;
            record
                .set_field(fi, &value)
                .map_err(|e| with_column(e, field.name))?;
        }
        Ok(record)
    }
}

fn with_column(err: Error, column: &str) -> Error {
    match err {
        Error::Type(mut te) => {
            te.column = Some(column.to_string());
            Error::Type(te)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSpec;
    use crate::row::FromValue;

    #[derive(Debug, Default)]
    struct Visit {
        id: i64,
        visitor: Uuid,
        at: Option<NaiveDateTime>,
        note: String,
        vip: bool,
    }

    impl Record for Visit {
        fn fields() -> &'static [FieldSpec] {
            const FIELDS: &[FieldSpec] = &[
                FieldSpec::new("Id", ColumnType::Integer),
                FieldSpec::new("Visitor", ColumnType::Guid),
                FieldSpec::new("At", ColumnType::DateTime).nullable(),
                FieldSpec::new("Note", ColumnType::Text),
                FieldSpec::new("Vip", ColumnType::Boolean),
            ];
            FIELDS
        }

        fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
            match index {
                0 => self.id = FromValue::from_value(value)?,
                1 => self.visitor = FromValue::from_value(value)?,
                2 => self.at = FromValue::from_value(value)?,
                3 => self.note = FromValue::from_value(value)?,
                4 => self.vip = FromValue::from_value(value)?,
                _ => {}
            }
            Ok(())
        }
    }

    fn columns(names: &[&str]) -> ColumnInfo {
        ColumnInfo::new(names.iter().map(|n| (*n).to_string()).collect())
    }

    #[test]
    fn maps_case_insensitively_and_ignores_extras() {
        let info = columns(&["id", "VISITOR", "note", "Unrelated"]);
        let mapper = RowMapper::<Visit>::new(&info, "", "%Y-%m-%d %H:%M:%S");
        assert_eq!(mapper.mapped(), 3);
        let visitor = Uuid::new_v4();
        let row = Row::new(
            info.names().to_vec(),
            vec![
                Value::Int(4),
                Value::Text(visitor.to_string()),
                Value::Text("hello".into()),
                Value::Int(99),
            ],
        );
        let visit = mapper.map(&row).unwrap();
        assert_eq!(visit.id, 4);
        assert_eq!(visit.visitor, visitor);
        assert_eq!(visit.note, "hello");
        assert_eq!(mapper.id(&row), Some(4));
    }

    #[test]
    fn null_leaves_default() {
        let info = columns(&["Id", "Note", "At"]);
        let mapper = RowMapper::<Visit>::new(&info, "", "%Y-%m-%d %H:%M:%S");
        let row = Row::new(
            info.names().to_vec(),
            vec![Value::Int(1), Value::Null, Value::Null],
        );
        let visit = mapper.map(&row).unwrap();
        assert_eq!(visit.note, "");
        assert_eq!(visit.at, None);
    }

    #[test]
    fn prefixed_columns_and_timestamps() {
        let info = columns(&["t1__Id", "t1__At", "t1__Vip", "t0__Id"]);
        let mapper = RowMapper::<Visit>::new(&info, "t1__", "%d/%m/%Y %H:%M");
        let row = Row::new(
            info.names().to_vec(),
            vec![
                Value::Int(7),
                Value::Text("02/03/2024 10:30".into()),
                Value::Int(1),
                Value::Int(1),
            ],
        );
        let visit = mapper.map(&row).unwrap();
        assert_eq!(visit.id, 7);
        assert!(visit.vip);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(visit.at, Some(expected));
    }

    #[test]
    fn iso_timestamps_parse_as_fallback() {
        let parsed = parse_datetime("2024-01-05T08:00:00", "%d/%m/%Y").unwrap();
        assert_eq!(parsed.to_string(), "2024-01-05 08:00:00");
        assert_eq!(
            parse_datetime("2024-01-05", "%d/%m/%Y").unwrap().to_string(),
            "2024-01-05 00:00:00"
        );
    }

    #[test]
    fn bad_guid_reports_column() {
        let info = columns(&["Visitor"]);
        let mapper = RowMapper::<Visit>::new(&info, "", "%Y");
        let row = Row::new(info.names().to_vec(), vec![Value::Text("nope".into())]);
        match mapper.map(&row).unwrap_err() {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("Visitor")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
