use crate::config::ApiConfig;
use crate::error::{InspectError, Result};
use crate::model::{Inspection, ValuableItem};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Literal media type tag the backend expects for inspection photos
const MEDIA_TYPE_PHOTO: &str = "PHOTO";

/// The backend operations this client depends on. The exact endpoint shapes
/// are an external contract; everything behind this trait is opaque.
#[async_trait]
pub trait InspectionApi: Send + Sync {
    /// Create an inspection for a unit (lazily, right before the first upload)
    async fn create_inspection(
        &self,
        unit_id: &str,
        assignment_id: Option<&str>,
    ) -> Result<Inspection>;

    /// Upload one room photo as multipart form data
    async fn upload_media(
        &self,
        inspection_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        room_id: &str,
    ) -> Result<()>;

    /// Fetch the unit's registered valuable items, flattened across rooms
    async fn fetch_valuable_items(&self, unit_id: &str) -> Result<Vec<ValuableItem>>;

    /// Upload the verification photo (and optional notes) for one item
    async fn verify_valuable_item(
        &self,
        item_id: &str,
        inspection_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        notes: Option<&str>,
    ) -> Result<()>;

    /// Mark the inspection submitted and ready for downstream analysis
    async fn submit_inspection(
        &self,
        inspection_id: &str,
        damage_report: Option<&str>,
    ) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct CreateInspectionRequest<'a> {
    unit_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignment_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SubmitInspectionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    damage_report: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ValuableItemsResponse {
    rooms: Vec<ValuableRoomRow>,
}

#[derive(Debug, Deserialize)]
struct ValuableRoomRow {
    id: String,
    name: String,
    #[serde(default)]
    items: Vec<ValuableItemRow>,
}

#[derive(Debug, Deserialize)]
struct ValuableItemRow {
    id: String,
    name: String,
}

/// HTTP client for the HostIQ backend
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map non-2xx responses to an API error carrying the response body
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "no response body".to_string());
        Err(InspectError::api(status.as_u16(), message))
    }

    fn photo_part(file_name: &str, bytes: Vec<u8>) -> Result<Part> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")?;
        Ok(part)
    }
}

#[async_trait]
impl InspectionApi for HttpApiClient {
    async fn create_inspection(
        &self,
        unit_id: &str,
        assignment_id: Option<&str>,
    ) -> Result<Inspection> {
        debug!("Creating inspection for unit {}", unit_id);
        let response = self
            .with_auth(self.http.post(self.url("/inspections")))
            .json(&CreateInspectionRequest {
                unit_id,
                assignment_id,
            })
            .send()
            .await?;

        let inspection: Inspection = Self::check(response).await?.json().await?;
        info!("Inspection {} created", inspection.id);
        Ok(inspection)
    }

    async fn upload_media(
        &self,
        inspection_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        room_id: &str,
    ) -> Result<()> {
        debug!(
            "Uploading media {} ({} bytes) for inspection {} room {}",
            file_name,
            bytes.len(),
            inspection_id,
            room_id
        );

        let form = Form::new()
            .part("file", Self::photo_part(file_name, bytes)?)
            .text("type", MEDIA_TYPE_PHOTO)
            .text("room_id", room_id.to_string());

        let response = self
            .with_auth(
                self.http
                    .post(self.url(&format!("/inspections/{}/media", inspection_id))),
            )
            .multipart(form)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_valuable_items(&self, unit_id: &str) -> Result<Vec<ValuableItem>> {
        debug!("Fetching valuable items for unit {}", unit_id);
        let response = self
            .with_auth(
                self.http
                    .get(self.url(&format!("/units/{}/valuable-items", unit_id))),
            )
            .send()
            .await?;

        let body: ValuableItemsResponse = Self::check(response).await?.json().await?;

        let items: Vec<ValuableItem> = body
            .rooms
            .into_iter()
            .flat_map(|room| {
                let room_id = room.id;
                let room_name = room.name;
                room.items.into_iter().map(move |item| ValuableItem {
                    id: item.id,
                    name: item.name,
                    room_id: room_id.clone(),
                    room_name: room_name.clone(),
                })
            })
            .collect();

        info!("Fetched {} valuable item(s) for unit {}", items.len(), unit_id);
        Ok(items)
    }

    async fn verify_valuable_item(
        &self,
        item_id: &str,
        inspection_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        notes: Option<&str>,
    ) -> Result<()> {
        debug!(
            "Uploading verification photo for item {} (inspection {})",
            item_id, inspection_id
        );

        let mut form = Form::new()
            .part("file", Self::photo_part(file_name, bytes)?)
            .text("inspection_id", inspection_id.to_string());
        if let Some(notes) = notes {
            form = form.text("notes", notes.to_string());
        }

        let response = self
            .with_auth(
                self.http
                    .post(self.url(&format!("/valuable-items/{}/verify", item_id))),
            )
            .multipart(form)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn submit_inspection(
        &self,
        inspection_id: &str,
        damage_report: Option<&str>,
    ) -> Result<()> {
        debug!("Submitting inspection {}", inspection_id);
        let response = self
            .with_auth(
                self.http
                    .post(self.url(&format!("/inspections/{}/submit", inspection_id))),
            )
            .json(&SubmitInspectionRequest { damage_report })
            .send()
            .await?;

        Self::check(response).await?;
        info!("Inspection {} submitted", inspection_id);
        Ok(())
    }
}

/// One recorded backend call, in invocation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    CreateInspection {
        unit_id: String,
    },
    UploadMedia {
        inspection_id: String,
        file_name: String,
        room_id: String,
    },
    FetchValuableItems {
        unit_id: String,
    },
    VerifyItem {
        item_id: String,
        notes: Option<String>,
    },
    SubmitInspection {
        inspection_id: String,
        damage_report: Option<String>,
    },
}

/// In-memory API double that records every call and can be scripted to fail
/// at specific points; used by tests and offline demos
#[derive(Default)]
pub struct MockApi {
    calls: std::sync::Mutex<Vec<ApiCall>>,
    items: Vec<ValuableItem>,
    fail_create: bool,
    fail_submit: bool,
    /// 1-based index of the upload_media call that should reject
    fail_upload_at: Option<usize>,
    failing_items: Vec<String>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these items from fetch_valuable_items
    pub fn with_items(mut self, items: Vec<ValuableItem>) -> Self {
        self.items = items;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_submit(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    /// Make the n-th upload_media call reject (1-based)
    pub fn failing_upload_at(mut self, n: usize) -> Self {
        self.fail_upload_at = Some(n);
        self
    }

    /// Make verification uploads for this item reject
    pub fn failing_item(mut self, item_id: &str) -> Self {
        self.failing_items.push(item_id.to_string());
        self
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: ApiCall) -> usize {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.push(call);
        calls.len()
    }

    fn media_upload_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| matches!(c, ApiCall::UploadMedia { .. }))
            .count()
    }
}

#[async_trait]
impl InspectionApi for MockApi {
    async fn create_inspection(
        &self,
        unit_id: &str,
        _assignment_id: Option<&str>,
    ) -> Result<Inspection> {
        self.record(ApiCall::CreateInspection {
            unit_id: unit_id.to_string(),
        });
        if self.fail_create {
            return Err(InspectError::api(500, "create failed"));
        }
        Ok(Inspection {
            id: "inspection-1".to_string(),
        })
    }

    async fn upload_media(
        &self,
        inspection_id: &str,
        file_name: &str,
        _bytes: Vec<u8>,
        room_id: &str,
    ) -> Result<()> {
        self.record(ApiCall::UploadMedia {
            inspection_id: inspection_id.to_string(),
            file_name: file_name.to_string(),
            room_id: room_id.to_string(),
        });
        if self.fail_upload_at == Some(self.media_upload_count()) {
            return Err(InspectError::api(502, "media upload failed"));
        }
        Ok(())
    }

    async fn fetch_valuable_items(&self, unit_id: &str) -> Result<Vec<ValuableItem>> {
        self.record(ApiCall::FetchValuableItems {
            unit_id: unit_id.to_string(),
        });
        Ok(self.items.clone())
    }

    async fn verify_valuable_item(
        &self,
        item_id: &str,
        _inspection_id: &str,
        _file_name: &str,
        _bytes: Vec<u8>,
        notes: Option<&str>,
    ) -> Result<()> {
        self.record(ApiCall::VerifyItem {
            item_id: item_id.to_string(),
            notes: notes.map(str::to_string),
        });
        if self.failing_items.iter().any(|id| id == item_id) {
            return Err(InspectError::api(502, "verification upload failed"));
        }
        Ok(())
    }

    async fn submit_inspection(
        &self,
        inspection_id: &str,
        damage_report: Option<&str>,
    ) -> Result<()> {
        self.record(ApiCall::SubmitInspection {
            inspection_id: inspection_id.to_string(),
            damage_report: damage_report.map(str::to_string),
        });
        if self.fail_submit {
            return Err(InspectError::api(500, "submit failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valuable_items_response_flattens_rooms() {
        let body = r#"{
            "rooms": [
                {"id": "r1", "name": "Kitchen", "items": [
                    {"id": "v1", "name": "Espresso machine"}
                ]},
                {"id": "r2", "name": "Study", "items": [
                    {"id": "v2", "name": "Telescope"},
                    {"id": "v3", "name": "Globe"}
                ]},
                {"id": "r3", "name": "Hall"}
            ]
        }"#;

        let parsed: ValuableItemsResponse = serde_json::from_str(body).unwrap();
        let items: Vec<ValuableItem> = parsed
            .rooms
            .into_iter()
            .flat_map(|room| {
                let room_id = room.id;
                let room_name = room.name;
                room.items.into_iter().map(move |item| ValuableItem {
                    id: item.id,
                    name: item.name,
                    room_id: room_id.clone(),
                    room_name: room_name.clone(),
                })
            })
            .collect();

        assert_eq!(items.len(), 3);
        assert_eq!(items[1].room_name, "Study");
    }

    #[tokio::test]
    async fn mock_api_fails_at_scripted_upload() {
        let api = MockApi::new().failing_upload_at(2);

        assert!(api
            .upload_media("i1", "a.jpg", vec![1], "r1")
            .await
            .is_ok());
        assert!(api
            .upload_media("i1", "b.jpg", vec![2], "r1")
            .await
            .is_err());

        let uploads = api
            .calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::UploadMedia { .. }))
            .count();
        assert_eq!(uploads, 2);
    }
}
