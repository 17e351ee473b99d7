use super::{DirectoryError, DoctorDirectory};
use crate::models::{seed_doctors, Doctor};

/// Directory backed by a fixed in-process roster.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    doctors: Vec<Doctor>,
}

impl InMemoryDirectory {
    pub fn new(doctors: Vec<Doctor>) -> Self {
        Self { doctors }
    }

    /// The clinic's built-in roster.
    pub fn seeded() -> Self {
        Self::new(seed_doctors())
    }

    pub fn len(&self) -> usize {
        self.doctors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doctors.is_empty()
    }
}

impl DoctorDirectory for InMemoryDirectory {
    async fn find_by_specialty(&self, specialty: &str) -> Result<Vec<Doctor>, DirectoryError> {
        Ok(self
            .doctors
            .iter()
            .filter(|d| d.specialty == specialty)
            .cloned()
            .collect())
    }
}
