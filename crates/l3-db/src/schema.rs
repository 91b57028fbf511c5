//! Versioned persisted schema.
//!
//! The router entity declares every column natively; this module only
//! upgrades persisted snapshots written by older versions so that all rows
//! carry all columns. Migrations run once when a store is opened.
//!
//! | Version | Change |
//! |---------|--------|
//! | 1 | Base `routers` and `ports` tables |
//! | 2 | `routers.enable_snat` (NOT NULL, default true), `routers.enable_ipv6_nat` (NOT NULL, default false) |

use serde_json::{Map, Value};
use tracing::info;

use crate::error::{L3Error, L3Result};
use crate::models::{DEFAULT_ENABLE_IPV6_NAT, DEFAULT_ENABLE_SNAT};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Key holding the schema version in a snapshot document.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Server-side default applied when back-filling a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    Bool(bool),
}

impl ColumnDefault {
    fn to_value(self) -> Value {
        match self {
            ColumnDefault::Bool(v) => Value::Bool(v),
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ColumnDefault::Bool(_) => value.is_boolean(),
        }
    }
}

/// A non-nullable column added by a migration.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub table: &'static str,
    pub name: &'static str,
    pub server_default: ColumnDefault,
}

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub add_columns: &'static [ColumnDef],
}

/// All migrations in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "base routers and ports tables",
        add_columns: &[],
    },
    Migration {
        version: 2,
        description: "router gateway mode columns",
        add_columns: &[
            ColumnDef {
                table: "routers",
                name: "enable_snat",
                server_default: ColumnDefault::Bool(DEFAULT_ENABLE_SNAT),
            },
            ColumnDef {
                table: "routers",
                name: "enable_ipv6_nat",
                server_default: ColumnDefault::Bool(DEFAULT_ENABLE_IPV6_NAT),
            },
        ],
    },
];

/// Upgrades a snapshot document in place to [`CURRENT_SCHEMA_VERSION`].
///
/// A document without a version is treated as version 1. Returns the version
/// the document had before migrating.
///
/// # Errors
///
/// Returns [`L3Error::Schema`] if the document is newer than this build, is
/// not an object, or holds `null`/mistyped values in a non-nullable column.
pub fn migrate(snapshot: &mut Value) -> L3Result<u32> {
    let doc = snapshot
        .as_object_mut()
        .ok_or_else(|| L3Error::schema("snapshot is not a JSON object"))?;

    let from = match doc.get(SCHEMA_VERSION_KEY) {
        None => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| L3Error::schema(format!("invalid {}: {}", SCHEMA_VERSION_KEY, v)))?,
    };

    if from > CURRENT_SCHEMA_VERSION {
        return Err(L3Error::schema(format!(
            "snapshot schema version {} is newer than supported version {}",
            from, CURRENT_SCHEMA_VERSION
        )));
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        for column in migration.add_columns {
            add_column(doc, column)?;
        }
        info!(
            "Applied schema migration {} ({})",
            migration.version, migration.description
        );
    }

    // Columns added by already-applied migrations must still be present and
    // non-null.
    for migration in MIGRATIONS.iter().filter(|m| m.version <= from) {
        for column in migration.add_columns {
            check_column(doc, column)?;
        }
    }

    doc.insert(
        SCHEMA_VERSION_KEY.to_string(),
        Value::from(CURRENT_SCHEMA_VERSION),
    );
    Ok(from)
}

fn rows_mut<'a>(
    doc: &'a mut Map<String, Value>,
    table: &str,
) -> L3Result<Vec<&'a mut Map<String, Value>>> {
    match doc.get_mut(table) {
        None => Ok(Vec::new()),
        Some(Value::Array(rows)) => rows
            .iter_mut()
            .map(|row| {
                row.as_object_mut().ok_or_else(|| {
                    L3Error::schema(format!("row in table {} is not an object", table))
                })
            })
            .collect(),
        Some(_) => Err(L3Error::schema(format!("table {} is not an array", table))),
    }
}

fn add_column(doc: &mut Map<String, Value>, column: &ColumnDef) -> L3Result<()> {
    for row in rows_mut(doc, column.table)? {
        match row.get(column.name) {
            None => {
                row.insert(column.name.to_string(), column.server_default.to_value());
            }
            Some(value) => validate_value(column, value)?,
        }
    }
    Ok(())
}

fn check_column(doc: &mut Map<String, Value>, column: &ColumnDef) -> L3Result<()> {
    for row in rows_mut(doc, column.table)? {
        match row.get(column.name) {
            None => {
                return Err(L3Error::schema(format!(
                    "column {}.{} missing from row",
                    column.table, column.name
                )))
            }
            Some(value) => validate_value(column, value)?,
        }
    }
    Ok(())
}

fn validate_value(column: &ColumnDef, value: &Value) -> L3Result<()> {
    if value.is_null() {
        return Err(L3Error::schema(format!(
            "column {}.{} is NOT NULL",
            column.table, column.name
        )));
    }
    if !column.server_default.accepts(value) {
        return Err(L3Error::schema(format!(
            "column {}.{} has invalid value {}",
            column.table, column.name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_migrations_are_ordered() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(
            MIGRATIONS.last().map(|m| m.version),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_v1_snapshot_gets_defaults() {
        let mut doc = json!({
            "routers": [
                {"id": "r1", "gw_port_id": null},
                {"id": "r2", "enable_snat": false}
            ],
            "ports": []
        });

        let from = migrate(&mut doc).unwrap();

        assert_eq!(from, 1);
        assert_eq!(doc["schema_version"], json!(2));
        assert_eq!(doc["routers"][0]["enable_snat"], json!(true));
        assert_eq!(doc["routers"][0]["enable_ipv6_nat"], json!(false));
        // Existing values are kept.
        assert_eq!(doc["routers"][1]["enable_snat"], json!(false));
        assert_eq!(doc["routers"][1]["enable_ipv6_nat"], json!(false));
    }

    #[test]
    fn test_current_snapshot_unchanged() {
        let mut doc = json!({
            "schema_version": 2,
            "routers": [{"id": "r1", "enable_snat": true, "enable_ipv6_nat": true}]
        });
        let before = doc.clone();

        assert_eq!(migrate(&mut doc).unwrap(), 2);
        assert_eq!(doc, before);
    }

    #[test]
    fn test_null_column_rejected() {
        let mut doc = json!({
            "schema_version": 1,
            "routers": [{"id": "r1", "enable_snat": null}]
        });
        let err = migrate(&mut doc).unwrap_err();
        assert!(err.to_string().contains("NOT NULL"));
    }

    #[test]
    fn test_missing_column_at_current_version_rejected() {
        let mut doc = json!({
            "schema_version": 2,
            "routers": [{"id": "r1", "enable_snat": true}]
        });
        assert!(matches!(migrate(&mut doc), Err(L3Error::Schema { .. })));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut doc = json!({"schema_version": 99, "routers": []});
        assert!(matches!(migrate(&mut doc), Err(L3Error::Schema { .. })));
    }

    #[test]
    fn test_non_object_rejected() {
        let mut doc = json!([1, 2, 3]);
        assert!(migrate(&mut doc).is_err());
    }
}
