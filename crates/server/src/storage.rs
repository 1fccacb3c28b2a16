use anyhow::{Context, Result};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ApiErr;

use dentalcare_api::db::Built;
use dentalcare_api::db::migrations::MIGRATIONS;
use dentalcare_api::{
    AppointmentResponse, AppointmentStatus, Dentition, Gender, MedicineResponse, PatientResponse,
    PatientToothResponse, PaymentProvider, PaymentResponse, Subscription, SubscriptionStatus,
    ToothCondition, ToothTreatmentResponse, TreatmentResponse, parse_datetime,
};

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    data_dir: PathBuf,
}

impl Db {
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Directory holding contact-form attachments.
    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir.join("attachments")
    }

    /// Write an attachment to disk under a collision-free name, return its path.
    pub fn write_attachment(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.attachments_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}-{file_name}", uuid::Uuid::new_v4().simple()));
        std::fs::write(&path, bytes).context("writing attachment")?;
        Ok(path)
    }
}

/// Initialize the database: open connection, enable WAL, run migrations
pub fn init_db(data_dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("dentalcare.db");
    let conn = Connection::open(&db_path).context("opening SQLite database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
        data_dir: data_dir.to_path_buf(),
    })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .with_context(|| format!("checking migration {name}"))?;

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("applied migration: {name}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// sea-query → rusqlite
// ---------------------------------------------------------------------------

fn bind(values: &sea_query::Values) -> Vec<SqlValue> {
    values
        .0
        .iter()
        .map(|v| match v {
            sea_query::Value::String(Some(s)) => SqlValue::Text(s.to_string()),
            sea_query::Value::Int(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::BigInt(Some(i)) => SqlValue::Integer(*i),
            sea_query::Value::Unsigned(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::TinyUnsigned(Some(i)) => SqlValue::Integer(i64::from(*i)),
            sea_query::Value::Bool(Some(b)) => SqlValue::Integer(i64::from(*b)),
            sea_query::Value::Double(Some(f)) => SqlValue::Real(*f),
            sea_query::Value::Bytes(Some(b)) => SqlValue::Blob(b.to_vec()),
            _ => SqlValue::Null,
        })
        .collect()
}

pub fn sq_execute(conn: &Connection, built: Built) -> rusqlite::Result<usize> {
    let (sql, values) = built;
    conn.execute(&sql, rusqlite::params_from_iter(bind(&values)))
}

pub fn sq_query_row<T, F>(conn: &Connection, built: Built, f: F) -> rusqlite::Result<T>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let (sql, values) = built;
    conn.query_row(&sql, rusqlite::params_from_iter(bind(&values)), f)
}

pub fn sq_query_opt<T, F>(conn: &Connection, built: Built, f: F) -> rusqlite::Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    sq_query_row(conn, built, f).optional()
}

pub fn sq_query_map<T, F>(conn: &Connection, built: Built, f: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let (sql, values) = built;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(bind(&values)), f)?;
    rows.collect()
}

/// `SELECT COUNT(..)` style builders.
pub fn sq_count(conn: &Connection, built: Built) -> rusqlite::Result<i64> {
    sq_query_row(conn, built, |row| row.get(0))
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Map a unique-constraint failure to `409 conflict`, anything else to a logged 500.
pub fn conflict_or_db<'a>(
    conflict: &'a str,
    context: &'a str,
) -> impl FnOnce(rusqlite::Error) -> ApiErr + 'a {
    move |e| {
        if is_unique_violation(&e) {
            ApiErr::conflict(conflict)
        } else {
            ApiErr::from_db(context)(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn enum_col<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("unexpected value {raw:?}")))
}

fn opt_enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| parse(&raw).ok_or_else(|| conversion_error(idx, format!("unexpected value {raw:?}"))))
        .transpose()
}

/// Reads `subscription_status, subscription_expires_at` at `idx, idx + 1`.
pub fn subscription_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<Subscription> {
    let status = enum_col(row, idx, SubscriptionStatus::parse)?;
    let raw: String = row.get(idx + 1)?;
    let expires_at = parse_datetime(&raw)
        .ok_or_else(|| conversion_error(idx + 1, format!("bad timestamp {raw:?}")))?;
    Ok(Subscription { status, expires_at })
}

/// Dentist row as loaded by `db::dentists::get_profile`.
#[derive(Debug, Clone)]
pub struct DentistRow {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub subscription: Subscription,
    pub created_at: String,
}

pub fn dentist_from_row(row: &Row<'_>) -> rusqlite::Result<DentistRow> {
    Ok(DentistRow {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        email_verified: row.get(5)?,
        subscription: subscription_from_row(row, 6)?,
        created_at: row.get(8)?,
    })
}

pub fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<PatientResponse> {
    Ok(PatientResponse {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        birth_date: row.get(3)?,
        gender: opt_enum_col(row, 4, Gender::parse)?,
        phone: row.get(5)?,
        email: row.get(6)?,
        address: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn tooth_from_row(row: &Row<'_>) -> rusqlite::Result<PatientToothResponse> {
    Ok(PatientToothResponse {
        tooth_number: row.get(0)?,
        name: row.get(1)?,
        dentition: enum_col(row, 2, Dentition::parse)?,
        condition: enum_col(row, 3, ToothCondition::parse)?,
        notes: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<AppointmentResponse> {
    Ok(AppointmentResponse {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        starts_at: row.get(3)?,
        ends_at: row.get(4)?,
        status: enum_col(row, 5, AppointmentStatus::parse)?,
        reason: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn treatment_from_row(row: &Row<'_>) -> rusqlite::Result<TreatmentResponse> {
    Ok(TreatmentResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price_cents: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn medicine_from_row(row: &Row<'_>) -> rusqlite::Result<MedicineResponse> {
    Ok(MedicineResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        dosage: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn tooth_treatment_from_row(row: &Row<'_>) -> rusqlite::Result<ToothTreatmentResponse> {
    Ok(ToothTreatmentResponse {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        appointment_starts_at: row.get(2)?,
        tooth_number: row.get(3)?,
        treatment_id: row.get(4)?,
        treatment_name: row.get(5)?,
        medicine_id: row.get(6)?,
        medicine_name: row.get(7)?,
        notes: row.get(8)?,
        price_cents: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentResponse> {
    Ok(PaymentResponse {
        id: row.get(0)?,
        provider: enum_col(row, 1, PaymentProvider::parse)?,
        reference: row.get(2)?,
        amount_cents: row.get(3)?,
        currency: row.get(4)?,
        captured_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dentalcare_api::db;
    use dentalcare_api::db::patients::PatientValues;
    use dentalcare_api::teeth::{TEETH_PER_CHART, all_teeth, tooth_name};

    fn test_db() -> (Db, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        (db, dir)
    }

    fn insert_dentist(conn: &Connection, id: &str) {
        sq_execute(
            conn,
            db::dentists::insert(id, &format!("{id}@clinic.example"), "h", "s", "A", "B", None, "2030-01-01 00:00:00"),
        )
        .unwrap();
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        drop(init_db(dir.path()).unwrap());
        let db = init_db(dir.path()).unwrap();
        let applied = sq_count(&db.conn(), ("SELECT COUNT(*) FROM _migrations".into(), sea_query::Values(vec![]))).unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn teeth_catalogue_matches_fdi_numbering() {
        let (db, _dir) = test_db();
        let conn = db.conn();
        let rows: Vec<(u8, String)> = sq_query_map(
            &conn,
            ("SELECT number, name FROM teeth ORDER BY number".into(), sea_query::Values(vec![])),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
        assert_eq!(rows.len(), TEETH_PER_CHART);
        let numbers: Vec<u8> = rows.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, all_teeth());
        for (number, name) in rows {
            assert_eq!(Some(name), tooth_name(number));
        }
    }

    #[test]
    fn inserting_a_patient_seeds_52_chart_slots() {
        let (db, _dir) = test_db();
        let conn = db.conn();
        insert_dentist(&conn, "d1");
        let values = PatientValues {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            ..Default::default()
        };
        sq_execute(&conn, db::patients::insert("p1", "d1", &values)).unwrap();

        let chart = sq_query_map(&conn, db::teeth::chart("d1", "p1"), tooth_from_row).unwrap();
        assert_eq!(chart.len(), TEETH_PER_CHART);
        assert!(chart.iter().all(|t| t.condition == ToothCondition::Healthy));
        assert_eq!(chart[0].tooth_number, 11);

        // Another dentist sees nothing.
        let foreign = sq_query_map(&conn, db::teeth::chart("d2", "p1"), tooth_from_row).unwrap();
        assert!(foreign.is_empty());
    }

    #[test]
    fn unique_violation_is_detected() {
        let (db, _dir) = test_db();
        let conn = db.conn();
        insert_dentist(&conn, "d1");
        let err = sq_execute(
            &conn,
            db::dentists::insert("d2", "d1@clinic.example", "h", "s", "A", "B", None, "2030-01-01 00:00:00"),
        )
        .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn dentist_row_parses_subscription() {
        let (db, _dir) = test_db();
        let conn = db.conn();
        insert_dentist(&conn, "d1");
        let row = sq_query_row(&conn, db::dentists::get_profile("d1"), dentist_from_row).unwrap();
        assert_eq!(row.subscription.status, SubscriptionStatus::Trial);
        assert_eq!(
            dentalcare_api::format_datetime(row.subscription.expires_at),
            "2030-01-01 00:00:00"
        );
        assert!(!row.email_verified);
    }

    #[test]
    fn attachments_land_in_data_dir() {
        let (db, dir) = test_db();
        let path = db.write_attachment("xray.png", b"png").unwrap();
        assert!(path.starts_with(dir.path().join("attachments")));
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("-xray.png"));
        assert_eq!(std::fs::read(path).unwrap(), b"png");
    }
}
