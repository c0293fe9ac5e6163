//! # Database
//!
//! SQLite persistence for schedule data (users, treatments, medicines), the
//! reminder ledger and the medication intake log.
//!
//! - **Version**: 1.2.1
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.1: Due-dose query matches medicine times stored with seconds
//! - 1.2.0: Dashboard query with taken-today flag
//! - 1.1.0: Ledger insert reports duplicate keys instead of failing
//! - 1.0.0: Initial schema and schedule queries

use crate::features::reminders::slot::{
    DeliveryId, MedicineId, ReminderKey, ReminderRecord, TimeOfDay, UserId, DATE_FORMAT,
    TIMESTAMP_FORMAT,
};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use serde::Serialize;
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        phone TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS treatments (
        treatment_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        name TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS medicines (
        medicine_id INTEGER PRIMARY KEY AUTOINCREMENT,
        treatment_id INTEGER NOT NULL REFERENCES treatments(treatment_id),
        name TEXT NOT NULL,
        dosage_qty REAL,
        dosage_unit TEXT,
        meal_relation TEXT,
        specific_time TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_medicines_time ON medicines(specific_time);

    CREATE TABLE IF NOT EXISTS reminder_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        medicine_id INTEGER NOT NULL,
        reminder_date TEXT NOT NULL,
        reminder_time TEXT NOT NULL,
        delivery_id TEXT,
        attempted_at TEXT NOT NULL,
        UNIQUE (user_id, medicine_id, reminder_date, reminder_time)
    );

    CREATE TABLE IF NOT EXISTS medication_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        medicine_id INTEGER NOT NULL REFERENCES medicines(medicine_id),
        taken_at TEXT NOT NULL,
        side_effects_note TEXT
    );
";

/// Raw joined schedule row, validated into a `DoseSlot` by the resolver
#[derive(Debug, Clone)]
pub struct DoseRow {
    pub user_id: UserId,
    pub user_name: String,
    pub phone: Option<String>,
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub specific_time: String,
    pub start_date: String,
    pub end_date: String,
}

/// Medicine entry supplied when a treatment is created
#[derive(Debug, Clone)]
pub struct NewMedicine {
    pub name: String,
    pub dosage_qty: Option<f64>,
    pub dosage_unit: Option<String>,
    pub meal_relation: Option<String>,
    pub time: TimeOfDay,
}

impl NewMedicine {
    pub fn at(name: &str, time: TimeOfDay) -> Self {
        NewMedicine {
            name: name.to_string(),
            dosage_qty: None,
            dosage_unit: None,
            meal_relation: None,
            time,
        }
    }
}

/// One row of a user's daily dose overview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardDose {
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub dosage_qty: Option<f64>,
    pub dosage_unit: Option<String>,
    pub meal_relation: Option<String>,
    pub specific_time: String,
    pub treatment_name: String,
    pub is_taken_today: bool,
}

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path`; `:memory:` is accepted
    pub async fn new(path: &str) -> Result<Self> {
        let connection =
            sqlite::open(path).with_context(|| format!("Failed to open database at {path}"))?;
        connection.execute("PRAGMA foreign_keys = ON;")?;
        connection
            .execute(SCHEMA)
            .context("Failed to initialise database schema")?;

        info!("Database ready at {path}");

        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub async fn add_user(&self, name: &str, email: &str, phone: Option<&str>) -> Result<UserId> {
        let conn = self.connection.lock().await;
        let mut statement =
            conn.prepare("INSERT INTO users (name, email, phone) VALUES (?, ?, ?)")?;
        statement.bind((1, name))?;
        statement.bind((2, email))?;
        statement.bind((3, phone))?;
        statement.next()?;

        last_insert_id(&conn)
    }

    /// Insert a treatment and its medicines in one transaction
    pub async fn add_treatment(
        &self,
        user_id: UserId,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        medicines: &[NewMedicine],
    ) -> Result<i64> {
        if end_date < start_date {
            return Err(anyhow!(
                "Treatment '{name}' ends ({end_date}) before it starts ({start_date})"
            ));
        }

        let conn = self.connection.lock().await;
        conn.execute("BEGIN TRANSACTION;")?;

        match insert_treatment(&conn, user_id, name, start_date, end_date, medicines) {
            Ok(treatment_id) => {
                conn.execute("COMMIT;")?;
                debug!(
                    "Added treatment {treatment_id} for user {user_id} with {} medicine(s)",
                    medicines.len()
                );
                Ok(treatment_id)
            }
            Err(e) => {
                conn.execute("ROLLBACK;")?;
                Err(e)
            }
        }
    }

    pub async fn log_dose_taken(
        &self,
        user_id: UserId,
        medicine_id: MedicineId,
        taken_at: NaiveDateTime,
        note: Option<&str>,
    ) -> Result<()> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO medication_log (user_id, medicine_id, taken_at, side_effects_note)
             VALUES (?, ?, ?, ?)",
        )?;
        statement.bind((1, user_id))?;
        statement.bind((2, medicine_id))?;
        statement.bind((3, taken_at.format(TIMESTAMP_FORMAT).to_string().as_str()))?;
        statement.bind((4, note))?;
        statement.next()?;
        Ok(())
    }

    /// Rows whose medicine time lies in `[from, to]` and whose treatment covers `date`.
    /// Stored times may be `HH:MM` or `HH:MM:SS`; both are compared as `HH:MM:SS`.
    pub async fn due_dose_rows(
        &self,
        date: NaiveDate,
        from: TimeOfDay,
        to: TimeOfDay,
    ) -> Result<Vec<DoseRow>> {
        let day = date.format(DATE_FORMAT).to_string();
        let from = format!("{from}:00");
        let to = format!("{to}:59");

        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT u.user_id, u.name, u.phone, m.medicine_id, m.name, m.specific_time,
                    t.start_date, t.end_date
             FROM medicines m
             JOIN treatments t ON m.treatment_id = t.treatment_id
             JOIN users u ON t.user_id = u.user_id
             WHERE time(m.specific_time) BETWEEN ? AND ?
               AND t.start_date <= ? AND t.end_date >= ?",
        )?;
        statement.bind((1, from.as_str()))?;
        statement.bind((2, to.as_str()))?;
        statement.bind((3, day.as_str()))?;
        statement.bind((4, day.as_str()))?;

        let mut rows = Vec::new();
        while let State::Row = statement.next()? {
            rows.push(DoseRow {
                user_id: statement.read::<i64, _>(0)?,
                user_name: statement.read::<String, _>(1)?,
                phone: statement.read::<Option<String>, _>(2)?,
                medicine_id: statement.read::<i64, _>(3)?,
                medicine_name: statement.read::<String, _>(4)?,
                specific_time: statement.read::<String, _>(5)?,
                start_date: statement.read::<String, _>(6)?,
                end_date: statement.read::<String, _>(7)?,
            });
        }

        Ok(rows)
    }

    pub async fn reminder_exists(&self, key: &ReminderKey) -> Result<bool> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT 1 FROM reminder_log
             WHERE user_id = ? AND medicine_id = ? AND reminder_date = ? AND reminder_time = ?",
        )?;
        bind_key(&mut statement, key)?;
        Ok(matches!(statement.next()?, State::Row))
    }

    /// Insert a ledger row. Returns `false` if the key was already recorded.
    pub async fn insert_reminder(
        &self,
        key: &ReminderKey,
        delivery_id: Option<&DeliveryId>,
        attempted_at: NaiveDateTime,
    ) -> Result<bool> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO reminder_log
                (user_id, medicine_id, reminder_date, reminder_time, delivery_id, attempted_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        bind_key(&mut statement, key)?;
        statement.bind((5, delivery_id.map(|id| id.0.as_str())))?;
        statement.bind((6, attempted_at.format(TIMESTAMP_FORMAT).to_string().as_str()))?;

        match statement.next() {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_reminder(&self, key: &ReminderKey) -> Result<Option<ReminderRecord>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT user_id, medicine_id, reminder_date, reminder_time, delivery_id, attempted_at
             FROM reminder_log
             WHERE user_id = ? AND medicine_id = ? AND reminder_date = ? AND reminder_time = ?",
        )?;
        bind_key(&mut statement, key)?;

        match statement.next()? {
            State::Row => Ok(Some(read_reminder(&statement)?)),
            State::Done => Ok(None),
        }
    }

    pub async fn reminders_for_user(&self, user_id: UserId) -> Result<Vec<ReminderRecord>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT user_id, medicine_id, reminder_date, reminder_time, delivery_id, attempted_at
             FROM reminder_log WHERE user_id = ?
             ORDER BY reminder_date DESC, reminder_time DESC",
        )?;
        statement.bind((1, user_id))?;

        let mut records = Vec::new();
        while let State::Row = statement.next()? {
            records.push(read_reminder(&statement)?);
        }
        Ok(records)
    }

    /// A user's active doses on `date`, ordered by time of day
    pub async fn dashboard_doses(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<DashboardDose>> {
        let day = date.format(DATE_FORMAT).to_string();

        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT m.medicine_id, m.name, m.dosage_qty, m.dosage_unit, m.meal_relation,
                    m.specific_time, t.name,
                    EXISTS (
                        SELECT 1 FROM medication_log l
                        WHERE l.medicine_id = m.medicine_id AND l.user_id = ?
                          AND date(l.taken_at) = ?
                    )
             FROM medicines m
             JOIN treatments t ON m.treatment_id = t.treatment_id
             WHERE t.user_id = ? AND t.start_date <= ? AND t.end_date >= ?
             ORDER BY time(m.specific_time)",
        )?;
        statement.bind((1, user_id))?;
        statement.bind((2, day.as_str()))?;
        statement.bind((3, user_id))?;
        statement.bind((4, day.as_str()))?;
        statement.bind((5, day.as_str()))?;

        let mut doses = Vec::new();
        while let State::Row = statement.next()? {
            doses.push(DashboardDose {
                medicine_id: statement.read::<i64, _>(0)?,
                medicine_name: statement.read::<String, _>(1)?,
                dosage_qty: statement.read::<Option<f64>, _>(2)?,
                dosage_unit: statement.read::<Option<String>, _>(3)?,
                meal_relation: statement.read::<Option<String>, _>(4)?,
                specific_time: statement.read::<String, _>(5)?,
                treatment_name: statement.read::<String, _>(6)?,
                is_taken_today: statement.read::<i64, _>(7)? != 0,
            });
        }
        Ok(doses)
    }
}

fn insert_treatment(
    conn: &Connection,
    user_id: UserId,
    name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    medicines: &[NewMedicine],
) -> Result<i64> {
    let mut statement = conn.prepare(
        "INSERT INTO treatments (user_id, name, start_date, end_date) VALUES (?, ?, ?, ?)",
    )?;
    statement.bind((1, user_id))?;
    statement.bind((2, name))?;
    statement.bind((3, start_date.format(DATE_FORMAT).to_string().as_str()))?;
    statement.bind((4, end_date.format(DATE_FORMAT).to_string().as_str()))?;
    statement.next()?;
    let treatment_id = last_insert_id(conn)?;

    for medicine in medicines {
        let mut statement = conn.prepare(
            "INSERT INTO medicines
                (treatment_id, name, dosage_qty, dosage_unit, meal_relation, specific_time)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        statement.bind((1, treatment_id))?;
        statement.bind((2, medicine.name.as_str()))?;
        statement.bind((3, medicine.dosage_qty))?;
        statement.bind((4, medicine.dosage_unit.as_deref()))?;
        statement.bind((5, medicine.meal_relation.as_deref()))?;
        statement.bind((6, medicine.time.to_string().as_str()))?;
        statement.next()?;
    }

    Ok(treatment_id)
}

fn last_insert_id(conn: &Connection) -> Result<i64> {
    let mut statement = conn.prepare("SELECT last_insert_rowid()")?;
    statement.next()?;
    Ok(statement.read::<i64, _>(0)?)
}

fn bind_key(statement: &mut Statement<'_>, key: &ReminderKey) -> Result<()> {
    statement.bind((1, key.user_id))?;
    statement.bind((2, key.medicine_id))?;
    statement.bind((3, key.date.format(DATE_FORMAT).to_string().as_str()))?;
    statement.bind((4, key.time_of_day.to_string().as_str()))?;
    Ok(())
}

fn read_reminder(statement: &Statement<'_>) -> Result<ReminderRecord> {
    let date = statement.read::<String, _>(2)?;
    let time = statement.read::<String, _>(3)?;
    let attempted_at = statement.read::<String, _>(5)?;

    Ok(ReminderRecord {
        key: ReminderKey {
            user_id: statement.read::<i64, _>(0)?,
            medicine_id: statement.read::<i64, _>(1)?,
            date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
                .with_context(|| format!("Corrupt reminder_date '{date}'"))?,
            time_of_day: time
                .parse::<TimeOfDay>()
                .with_context(|| format!("Corrupt reminder_time '{time}'"))?,
        },
        delivery_id: statement.read::<Option<String>, _>(4)?.map(DeliveryId),
        attempted_at: NaiveDateTime::parse_from_str(&attempted_at, TIMESTAMP_FORMAT)
            .with_context(|| format!("Corrupt attempted_at '{attempted_at}'"))?,
    })
}

/// SQLITE_CONSTRAINT (19) or SQLITE_CONSTRAINT_UNIQUE (2067)
fn is_unique_violation(error: &sqlite::Error) -> bool {
    matches!(error.code, Some(19) | Some(2067))
        && error
            .message
            .as_deref()
            .map(|m| m.contains("UNIQUE"))
            .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reminders::resolver::DueDoseResolver;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn time(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    async fn seeded() -> (Database, UserId) {
        let db = Database::new(":memory:").await.unwrap();
        let user = db
            .add_user("Asha", "asha@example.com", Some("+15550001111"))
            .await
            .unwrap();
        db.add_treatment(
            user,
            "Diabetes",
            date("2024-01-01"),
            date("2024-01-31"),
            &[
                NewMedicine::at("Metformin", time("08:30")),
                NewMedicine::at("Glipizide", time("20:00")),
            ],
        )
        .await
        .unwrap();
        (db, user)
    }

    fn key(user: UserId, medicine: MedicineId) -> ReminderKey {
        ReminderKey {
            user_id: user,
            medicine_id: medicine,
            date: date("2024-01-15"),
            time_of_day: time("08:30"),
        }
    }

    #[tokio::test]
    async fn test_due_dose_rows_filters_by_time_and_date() {
        let (db, user) = seeded().await;

        let rows = db
            .due_dose_rows(date("2024-01-15"), time("08:30"), time("08:30"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, user);
        assert_eq!(rows[0].medicine_name, "Metformin");
        assert_eq!(rows[0].specific_time, "08:30");

        let none = db
            .due_dose_rows(date("2024-02-01"), time("08:30"), time("08:30"))
            .await
            .unwrap();
        assert!(none.is_empty());

        let window = db
            .due_dose_rows(date("2024-01-31"), time("00:00"), time("23:59"))
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn test_due_dose_rows_matches_times_stored_with_seconds() {
        let (db, user) = seeded().await;
        db.connection
            .lock()
            .await
            .execute("UPDATE medicines SET specific_time = '08:30:00' WHERE name = 'Metformin'")
            .unwrap();

        let rows = db
            .due_dose_rows(date("2024-01-15"), time("08:30"), time("08:30"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].specific_time, "08:30:00");

        assert!(db
            .due_dose_rows(date("2024-01-15"), time("08:29"), time("08:29"))
            .await
            .unwrap()
            .is_empty());

        let resolver = DueDoseResolver::new(Arc::new(db.clone()));
        let slots = resolver
            .resolve_due(date("2024-01-15").and_hms_opt(8, 30, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].user_id, user);
        assert_eq!(slots[0].time_of_day, time("08:30"));
    }

    #[tokio::test]
    async fn test_insert_reminder_rejects_duplicate_key() {
        let (db, user) = seeded().await;
        let key = key(user, 1);
        let at = date("2024-01-15").and_hms_opt(8, 30, 0).unwrap();

        assert!(!db.reminder_exists(&key).await.unwrap());
        assert!(db
            .insert_reminder(&key, Some(&DeliveryId("SM1".to_string())), at)
            .await
            .unwrap());
        assert!(db.reminder_exists(&key).await.unwrap());
        assert!(!db.insert_reminder(&key, None, at).await.unwrap());

        let record = db.get_reminder(&key).await.unwrap().unwrap();
        assert_eq!(record.delivery_id, Some(DeliveryId("SM1".to_string())));
        assert_eq!(record.attempted_at, at);
        assert_eq!(db.reminders_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_stored_as_null() {
        let (db, user) = seeded().await;
        let key = key(user, 2);
        let at = date("2024-01-15").and_hms_opt(8, 30, 5).unwrap();

        assert!(db.insert_reminder(&key, None, at).await.unwrap());
        let record = db.get_reminder(&key).await.unwrap().unwrap();
        assert!(record.delivery_id.is_none());
    }

    #[tokio::test]
    async fn test_add_treatment_rejects_reversed_dates() {
        let (db, user) = seeded().await;
        let result = db
            .add_treatment(user, "Backwards", date("2024-02-01"), date("2024-01-01"), &[])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_add_treatment_rolls_back_on_unknown_user() {
        let db = Database::new(":memory:").await.unwrap();
        let result = db
            .add_treatment(
                999,
                "Orphan",
                date("2024-01-01"),
                date("2024-01-31"),
                &[NewMedicine::at("Aspirin", time("09:00"))],
            )
            .await;
        assert!(result.is_err());

        let rows = db
            .due_dose_rows(date("2024-01-10"), time("00:00"), time("23:59"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_dashboard_marks_taken_doses() {
        let (db, user) = seeded().await;
        let today = date("2024-01-15");

        db.log_dose_taken(user, 1, today.and_hms_opt(8, 45, 0).unwrap(), Some("mild nausea"))
            .await
            .unwrap();

        let doses = db.dashboard_doses(user, today).await.unwrap();
        assert_eq!(doses.len(), 2);
        assert_eq!(doses[0].medicine_name, "Metformin");
        assert!(doses[0].is_taken_today);
        assert_eq!(doses[1].specific_time, "20:00");
        assert!(!doses[1].is_taken_today);

        let tomorrow = db.dashboard_doses(user, date("2024-01-16")).await.unwrap();
        assert!(tomorrow.iter().all(|d| !d.is_taken_today));
    }

    #[tokio::test]
    async fn test_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medalert.db");
        let path = path.to_str().unwrap();
        let at = date("2024-01-15").and_hms_opt(8, 30, 0).unwrap();

        {
            let db = Database::new(path).await.unwrap();
            assert!(db.insert_reminder(&key(7, 42), None, at).await.unwrap());
        }

        let reopened = Database::new(path).await.unwrap();
        assert!(reopened.reminder_exists(&key(7, 42)).await.unwrap());
        assert!(!reopened.insert_reminder(&key(7, 42), None, at).await.unwrap());
    }
}
