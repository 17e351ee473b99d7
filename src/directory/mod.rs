//! Doctor directory: the read-only document-store boundary used by the
//! doctor-lookup tool.
//!
//! Three interchangeable backends share one trait. Lookups are exact-match
//! filters on `specialty` and never mutate the store.

pub mod firestore;
pub mod memory;
pub mod sqlite;

pub use firestore::FirestoreDirectory;
pub use memory::InMemoryDirectory;
pub use sqlite::SqliteDirectory;

use std::future::Future;

use thiserror::Error;

use crate::models::Doctor;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Document store is not reachable: {0}")]
    Unreachable(String),

    #[error("Document store returned an error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Directory lock poisoned")]
    LockPoisoned,
}

/// Read access to the clinic's doctors.
pub trait DoctorDirectory: Send + Sync {
    /// All doctors whose `specialty` equals `specialty` exactly. May be empty.
    fn find_by_specialty(
        &self,
        specialty: &str,
    ) -> impl Future<Output = Result<Vec<Doctor>, DirectoryError>> + Send;
}

/// Runtime-selected directory backend.
pub enum AnyDirectory {
    Memory(InMemoryDirectory),
    Sqlite(SqliteDirectory),
    Firestore(FirestoreDirectory),
}

impl DoctorDirectory for AnyDirectory {
    async fn find_by_specialty(&self, specialty: &str) -> Result<Vec<Doctor>, DirectoryError> {
        match self {
            Self::Memory(d) => d.find_by_specialty(specialty).await,
            Self::Sqlite(d) => d.find_by_specialty(specialty).await,
            Self::Firestore(d) => d.find_by_specialty(specialty).await,
        }
    }
}

impl<T: DoctorDirectory> DoctorDirectory for std::sync::Arc<T> {
    fn find_by_specialty(
        &self,
        specialty: &str,
    ) -> impl Future<Output = Result<Vec<Doctor>, DirectoryError>> + Send {
        (**self).find_by_specialty(specialty)
    }
}
