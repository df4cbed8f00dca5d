pub mod client;
pub mod commission;
pub mod rest_types;
pub mod serde_utils;
pub mod token;
pub mod upload;

pub use client::AmlakClient;
pub use token::{SessionTokens, TokenStore};
pub use upload::{AssetKind, UploadEvent, UploadProgress, UploadedAsset, CHUNK_SIZE_BYTES};
