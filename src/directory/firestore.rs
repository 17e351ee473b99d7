//! Firestore-backed directory using the REST `runQuery` endpoint.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{DirectoryError, DoctorDirectory};
use crate::models::{Doctor, GeoPoint};

/// Collection holding clinic doctors.
pub const DOCTORS_COLLECTION: &str = "doctors";

pub struct FirestoreDirectory {
    base_url: String,
    project: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl FirestoreDirectory {
    pub fn new(
        base_url: &str,
        project: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            api_key,
            client,
        })
    }

    fn run_query_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents:runQuery",
            self.base_url, self.project
        )
    }
}

/// Structured query: `doctors` where `specialty == <value>`.
fn specialty_query(specialty: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": DOCTORS_COLLECTION }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": "specialty" },
                    "op": "EQUAL",
                    "value": { "stringValue": specialty }
                }
            }
        }
    })
}

/// One element of the `runQuery` response stream. Elements without a
/// `document` only carry read metadata.
#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<FirestoreDocument>,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreDocument {
    fn into_doctor(self) -> Result<Doctor, DirectoryError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let required = |key: &str| {
            string_field(&self.fields, key).ok_or_else(|| {
                DirectoryError::MalformedDocument(format!("{} is missing '{key}'", self.name))
            })
        };

        Ok(Doctor {
            name: required("name")?,
            specialty: required("specialty")?,
            hospital: required("hospital")?,
            address: string_field(&self.fields, "address").unwrap_or_default(),
            phone: string_field(&self.fields, "phone").unwrap_or_default(),
            location: geo_field(&self.fields, "location"),
            id,
        })
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn number_value(value: &Value) -> Option<f64> {
    value
        .get("doubleValue")
        .and_then(Value::as_f64)
        .or_else(|| {
            // integerValue is serialized as a string
            value
                .get("integerValue")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
        })
}

fn geo_field(fields: &Map<String, Value>, key: &str) -> Option<GeoPoint> {
    let value = fields.get(key)?;
    if let Some(geo) = value.get("geoPointValue") {
        return Some(GeoPoint {
            lat: geo.get("latitude")?.as_f64()?,
            lng: geo.get("longitude")?.as_f64()?,
        });
    }
    let inner = value.get("mapValue")?.get("fields")?;
    Some(GeoPoint {
        lat: number_value(inner.get("lat")?)?,
        lng: number_value(inner.get("lng")?)?,
    })
}

impl DoctorDirectory for FirestoreDirectory {
    async fn find_by_specialty(&self, specialty: &str) -> Result<Vec<Doctor>, DirectoryError> {
        let mut request = self
            .client
            .post(self.run_query_url())
            .json(&specialty_query(specialty));
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|e| DirectoryError::MalformedDocument(e.to_string()))?;

        let mut doctors = Vec::new();
        for document in items.into_iter().filter_map(|item| item.document) {
            match document.into_doctor() {
                Ok(doctor) => doctors.push(doctor),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed doctor document"),
            }
        }
        Ok(doctors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Bytes, http::Uri, Json, Router};
    use std::sync::{Arc, Mutex};

    fn doctor_document() -> Value {
        json!({
            "document": {
                "name": "projects/clinic/databases/(default)/documents/doctors/1",
                "fields": {
                    "name": { "stringValue": "Dr. Anjali Sharma" },
                    "specialty": { "stringValue": "Cardiologist" },
                    "hospital": { "stringValue": "Vaidya Health Care" },
                    "phone": { "stringValue": "+91 98765 43210" },
                    "location": { "mapValue": { "fields": {
                        "lat": { "doubleValue": 12.9716 },
                        "lng": { "doubleValue": 77.5946 }
                    }}}
                }
            },
            "readTime": "2026-01-01T00:00:00Z"
        })
    }

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    async fn serve(response: Value, status: u16) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let seen_handler = seen.clone();
        let app = Router::new().fallback(move |uri: Uri, body: Bytes| {
            let seen = seen_handler.clone();
            let response = response.clone();
            async move {
                let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                seen.lock().unwrap().push((uri.to_string(), parsed));
                (
                    axum::http::StatusCode::from_u16(status).unwrap(),
                    Json(response),
                )
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[test]
    fn query_filters_on_specialty() {
        let q = specialty_query("Cardiologist");
        let filter = &q["structuredQuery"]["where"]["fieldFilter"];
        assert_eq!(filter["field"]["fieldPath"], "specialty");
        assert_eq!(filter["op"], "EQUAL");
        assert_eq!(filter["value"]["stringValue"], "Cardiologist");
        assert_eq!(q["structuredQuery"]["from"][0]["collectionId"], "doctors");
    }

    #[test]
    fn document_decodes_into_doctor() {
        let item: RunQueryItem = serde_json::from_value(doctor_document()).unwrap();
        let doctor = item.document.unwrap().into_doctor().unwrap();
        assert_eq!(doctor.id, "1");
        assert_eq!(doctor.specialty, "Cardiologist");
        assert!(doctor.address.is_empty());
        assert_eq!(doctor.location.unwrap().lat, 12.9716);
    }

    #[test]
    fn document_without_hospital_is_malformed() {
        let doc = FirestoreDocument {
            name: "doctors/3".into(),
            fields: serde_json::from_value(json!({
                "name": { "stringValue": "Dr. Y" },
                "specialty": { "stringValue": "ENT" }
            }))
            .unwrap(),
        };
        assert!(matches!(
            doc.into_doctor(),
            Err(DirectoryError::MalformedDocument(_))
        ));
    }

    #[tokio::test]
    async fn run_query_round_trip() {
        let (url, seen) = serve(json!([doctor_document()]), 200).await;
        let dir = FirestoreDirectory::new(&url, "clinic", Some("abc".into()), 5).unwrap();

        let found = dir.find_by_specialty("Cardiologist").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Dr. Anjali Sharma");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("/projects/clinic/databases/(default)/documents:runQuery"));
        assert!(seen[0].0.contains("key=abc"));
    }

    #[tokio::test]
    async fn metadata_only_response_is_empty() {
        let (url, _) = serve(json!([{ "readTime": "2026-01-01T00:00:00Z" }]), 200).await;
        let dir = FirestoreDirectory::new(&url, "clinic", None, 5).unwrap();
        assert!(dir.find_by_specialty("Oncologist").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let (url, _) = serve(json!({ "error": "denied" }), 403).await;
        let dir = FirestoreDirectory::new(&url, "clinic", None, 5).unwrap();
        let err = dir.find_by_specialty("Cardiologist").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn unreachable_store_is_reported() {
        let dir = FirestoreDirectory::new("http://127.0.0.1:9", "clinic", None, 2).unwrap();
        let err = dir.find_by_specialty("Cardiologist").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Unreachable(_)));
    }
}
