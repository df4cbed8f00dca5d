use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use url::Url;
use uuid::Uuid;

use crate::serde_utils;

/// Every backend response wraps its payload in a `data` array, including
/// single-object responses.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: Vec<T>,
}

/// Millisecond epoch timestamp as the backend sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub SystemTime);

impl<'de> serde::Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let system_time = serde_utils::deserialize_timestamp_millis(deserializer)?;
        Ok(Timestamp(system_time))
    }
}

impl serde::Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_utils::serialize_timestamp_millis(&self.0, serializer)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOtpRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordLoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealKind {
    Sale,
    Rent,
}

impl std::fmt::Display for DealKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DealKind::Sale => write!(f, "sale"),
            DealKind::Rent => write!(f, "rent"),
        }
    }
}

impl std::str::FromStr for DealKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(DealKind::Sale),
            "rent" => Ok(DealKind::Rent),
            other => anyhow::bail!("Unknown deal kind '{}', expected sale or rent", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estate {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub city: String,
    pub district: Option<String>,
    pub deal_kind: DealKind,
    /// Sale price in Toman; absent for rent listings.
    pub price: Option<f64>,
    /// Rahn (deposit) in Toman; absent for sale listings.
    pub deposit: Option<f64>,
    /// Ejareh (monthly rent) in Toman; absent for sale listings.
    pub monthly_rent: Option<f64>,
    pub area: Option<u32>,
    pub rooms: Option<u8>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstateFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_kind: Option<DealKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub parent: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: Uuid,
    pub title: String,
    pub due_at: Timestamp,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReminderRequest {
    pub title: String,
    pub due_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstateRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for EstateRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstateRequestStatus::Pending => write!(f, "Pending"),
            EstateRequestStatus::Approved => write!(f, "Approved"),
            EstateRequestStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstateRequest {
    pub id: Uuid,
    pub phone: String,
    pub description: Option<String>,
    pub status: EstateRequestStatus,
    pub created_at: Timestamp,
}

/// Identifiers handed back by the storage backend on the initiation call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadData {
    pub upload_id: String,
    pub key: String,
}

/// One completed part, echoed back to the backend on the final chunk so it
/// can complete the multipart upload server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPart {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: u64,
}

/// Chunk responses carry a heterogeneous `data` array: index 0 is the part
/// metadata, index 1 (final chunk only) the finished object's URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChunkDatum {
    Part(UploadedPart),
    Url { url: Url },
}
