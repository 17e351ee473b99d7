use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use super::{DirectoryError, DoctorDirectory};
use crate::models::{Doctor, GeoPoint};

/// Directory backed by a local SQLite database.
///
/// The connection is shared behind a mutex; lookups are short point/filter
/// queries so they run inline on the calling task.
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    /// Open (or create) the directory database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, DirectoryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory directory (for testing)
    pub fn open_in_memory() -> Result<Self, DirectoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DirectoryError> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a doctor. Administrative path, not used by the pipeline.
    pub fn upsert(&self, doctor: &Doctor) -> Result<(), DirectoryError> {
        let conn = self.conn.lock().map_err(|_| DirectoryError::LockPoisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO doctors (id, name, specialty, hospital, address, phone, lat, lng)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doctor.id,
                doctor.name,
                doctor.specialty,
                doctor.hospital,
                doctor.address,
                doctor.phone,
                doctor.location.map(|l| l.lat),
                doctor.location.map(|l| l.lng),
            ],
        )?;
        Ok(())
    }

    /// Insert the given roster only when the table is empty. Returns rows inserted.
    pub fn seed_if_empty(&self, doctors: &[Doctor]) -> Result<usize, DirectoryError> {
        if self.count()? > 0 {
            return Ok(0);
        }
        for doctor in doctors {
            self.upsert(doctor)?;
        }
        tracing::info!(count = doctors.len(), "Seeded doctor directory");
        Ok(doctors.len())
    }

    pub fn count(&self) -> Result<i64, DirectoryError> {
        let conn = self.conn.lock().map_err(|_| DirectoryError::LockPoisoned)?;
        let count = conn.query_row("SELECT COUNT(*) FROM doctors", [], |row| row.get(0))?;
        Ok(count)
    }

    fn query_specialty(&self, specialty: &str) -> Result<Vec<Doctor>, DirectoryError> {
        let conn = self.conn.lock().map_err(|_| DirectoryError::LockPoisoned)?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, specialty, hospital, address, phone, lat, lng
             FROM doctors WHERE specialty = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([specialty], |row| {
            let lat: Option<f64> = row.get(6)?;
            let lng: Option<f64> = row.get(7)?;
            Ok(Doctor {
                id: row.get(0)?,
                name: row.get(1)?,
                specialty: row.get(2)?,
                hospital: row.get(3)?,
                address: row.get(4)?,
                phone: row.get(5)?,
                location: lat.zip(lng).map(|(lat, lng)| GeoPoint { lat, lng }),
            })
        })?;
        let doctors = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(doctors)
    }
}

impl DoctorDirectory for SqliteDirectory {
    async fn find_by_specialty(&self, specialty: &str) -> Result<Vec<Doctor>, DirectoryError> {
        self.query_specialty(specialty)
    }
}

/// Run all pending migrations
fn run_migrations(conn: &Connection) -> Result<(), DirectoryError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_doctors.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running directory migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| DirectoryError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::seed_doctors;

    fn seeded() -> SqliteDirectory {
        let dir = SqliteDirectory::open_in_memory().unwrap();
        dir.seed_if_empty(&seed_doctors()).unwrap();
        dir
    }

    #[tokio::test]
    async fn finds_by_specialty() {
        let dir = seeded();
        let found = dir.find_by_specialty("Dermatologist").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hospital, "Vaidya Apollo Hospital");
        assert!(found[0].location.is_some());
    }

    #[tokio::test]
    async fn no_match_is_empty() {
        let dir = seeded();
        assert!(dir.find_by_specialty("Oncologist").await.unwrap().is_empty());
    }

    #[test]
    fn seeding_is_idempotent() {
        let dir = seeded();
        assert_eq!(dir.seed_if_empty(&seed_doctors()).unwrap(), 0);
        assert_eq!(dir.count().unwrap(), 2);
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = SqliteDirectory::open_in_memory().unwrap();
        let conn = dir.conn.lock().unwrap();
        assert!(run_migrations(&conn).is_ok());
        assert_eq!(get_current_version(&conn), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let dir = seeded();
        let mut doctor = seed_doctors().remove(0);
        doctor.hospital = "Vaidya Heart Institute".into();
        doctor.location = None;
        dir.upsert(&doctor).unwrap();

        let found = dir.find_by_specialty("Cardiologist").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hospital, "Vaidya Heart Institute");
        assert!(found[0].location.is_none());
    }

    #[tokio::test]
    async fn persists_to_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("doctors.db");
        {
            let dir = SqliteDirectory::open(&path).unwrap();
            dir.seed_if_empty(&seed_doctors()).unwrap();
        }
        let reopened = SqliteDirectory::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        let found = reopened.find_by_specialty("Cardiologist").await.unwrap();
        assert_eq!(found[0].name, "Dr. Anjali Sharma");
    }
}
