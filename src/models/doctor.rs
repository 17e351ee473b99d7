use serde::{Deserialize, Serialize};

/// Geographic position of a clinic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A clinic doctor as stored in the document store.
///
/// Created and edited by clinic administrators; the analysis pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: String,
    pub name: String,
    pub specialty: String,
    pub hospital: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// The projection of a doctor that the model sees and the caller receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoctorRecord {
    pub name: String,
    pub specialty: String,
    pub hospital: String,
}

impl From<&Doctor> for DoctorRecord {
    fn from(d: &Doctor) -> Self {
        Self {
            name: d.name.clone(),
            specialty: d.specialty.clone(),
            hospital: d.hospital.clone(),
        }
    }
}

impl From<Doctor> for DoctorRecord {
    fn from(d: Doctor) -> Self {
        Self {
            name: d.name,
            specialty: d.specialty,
            hospital: d.hospital,
        }
    }
}

/// The clinic's initial roster.
pub fn seed_doctors() -> Vec<Doctor> {
    vec![
        Doctor {
            id: "1".into(),
            name: "Dr. Anjali Sharma".into(),
            specialty: "Cardiologist".into(),
            hospital: "Vaidya Health Care".into(),
            address: "123 Health St, Wellness City, 12345".into(),
            phone: "+91 98765 43210".into(),
            location: Some(GeoPoint { lat: 12.9716, lng: 77.5946 }),
        },
        Doctor {
            id: "2".into(),
            name: "Dr. Rajesh Kumar".into(),
            specialty: "Dermatologist".into(),
            hospital: "Vaidya Apollo Hospital".into(),
            address: "456 Skin Well Rd, Glow Town, 54321".into(),
            phone: "+91 91234 56789".into(),
            location: Some(GeoPoint { lat: 13.0827, lng: 80.2707 }),
        },
    ]
}
