use std::ops::Range;
use std::path::Path;

use anyhow::{Result, bail};
use url::Url;

use crate::rest_types::{InitUploadData, UploadedPart};

const MEGABYTE: u64 = 1024 * 1024;

/// Fixed part size accepted by the storage backend.
pub const CHUNK_SIZE_BYTES: u64 = 5 * MEGABYTE;

pub fn chunk_count(file_size: u64) -> Result<u64> {
    if file_size == 0 {
        bail!("File is empty, nothing to upload");
    }
    Ok(file_size.div_ceil(CHUNK_SIZE_BYTES))
}

pub fn chunk_range(index: u64, file_size: u64) -> Range<u64> {
    let start = index * CHUNK_SIZE_BYTES;
    let end = (start + CHUNK_SIZE_BYTES).min(file_size);
    start..end
}

/// Multipart field name the backend expects for the chunk bytes.
pub(crate) fn chunk_field_name(index: u64, total_chunks: u64) -> String {
    format!("files[{}][{}]", index, total_chunks)
}

/// Best-effort MIME type from the file extension. The backend only uses it
/// for the `Content-Type` of the assembled object.
pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Classification tag sent with the initiation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Gallery,
    Document,
    Plan,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Gallery => "gallery",
            AssetKind::Document => "document",
            AssetKind::Plan => "plan",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AssetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gallery" => Ok(AssetKind::Gallery),
            "document" => Ok(AssetKind::Document),
            "plan" => Ok(AssetKind::Plan),
            other => bail!("Unknown asset kind '{}'", other),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadProgress {
    pub uploaded_chunks: u64,
    pub total_chunks: u64,
    pub percent: u8,
}

/// The finished, server-assembled object.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub url: Url,
    pub storage_key: String,
    pub mime_type: String,
    pub file_name: String,
}

#[derive(Debug)]
pub enum UploadEvent {
    Progress(UploadProgress),
    Complete(UploadedAsset),
    /// Terminal event after a user-initiated cancellation. Not an error.
    Cancelled,
}

/// In-memory bookkeeping for one upload attempt. A session is created per
/// attempt and discarded on completion, cancellation, or error; it is never
/// reused.
#[derive(Debug, Default)]
pub struct UploadSession {
    upload_id: String,
    storage_key: String,
    total_chunks: u64,
    uploaded_chunks: u64,
    parts: Vec<UploadedPart>,
}

impl UploadSession {
    pub fn new(total_chunks: u64) -> Self {
        Self {
            total_chunks,
            ..Self::default()
        }
    }

    /// Before initiation the identifiers are empty sentinels; the backend's
    /// initiation response supplies the real values.
    pub fn adopt_identifiers(&mut self, init: InitUploadData) {
        self.upload_id = init.upload_id;
        self.storage_key = init.key;
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    pub fn is_final_chunk(&self, index: u64) -> bool {
        index + 1 == self.total_chunks
    }

    /// Records a finished chunk. The final chunk's own part metadata is not
    /// appended; the finalize request carries the accumulated list instead,
    /// so `parts` never exceeds `total_chunks - 1` entries.
    pub fn record_chunk(&mut self, index: u64, part: UploadedPart) {
        debug_assert!(index < self.total_chunks);
        if !self.is_final_chunk(index) {
            self.parts.push(part);
        }
        self.uploaded_chunks += 1;
    }

    pub fn parts(&self) -> &[UploadedPart] {
        &self.parts
    }

    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks == self.total_chunks
    }

    pub fn progress(&self) -> UploadProgress {
        let percent = if self.total_chunks == 0 {
            0
        } else {
            (self.uploaded_chunks * 100 / self.total_chunks) as u8
        };
        UploadProgress {
            uploaded_chunks: self.uploaded_chunks,
            total_chunks: self.total_chunks,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(number: u64) -> UploadedPart {
        UploadedPart {
            etag: format!("\"etag-{}\"", number),
            part_number: number,
        }
    }

    #[test]
    fn test_chunk_count_rounds_up() {
        assert_eq!(chunk_count(1).unwrap(), 1);
        assert_eq!(chunk_count(CHUNK_SIZE_BYTES).unwrap(), 1);
        assert_eq!(chunk_count(CHUNK_SIZE_BYTES + 1).unwrap(), 2);
        assert_eq!(chunk_count(3 * CHUNK_SIZE_BYTES).unwrap(), 3);
        assert_eq!(chunk_count(3 * CHUNK_SIZE_BYTES - 1).unwrap(), 3);
    }

    #[test]
    fn test_chunk_count_rejects_empty_file() {
        assert!(chunk_count(0).is_err());
    }

    #[test]
    fn test_chunk_range_clamps_final_chunk() {
        let size = 2 * CHUNK_SIZE_BYTES + 10;
        assert_eq!(chunk_range(0, size), 0..CHUNK_SIZE_BYTES);
        assert_eq!(chunk_range(1, size), CHUNK_SIZE_BYTES..2 * CHUNK_SIZE_BYTES);
        assert_eq!(chunk_range(2, size), 2 * CHUNK_SIZE_BYTES..size);
    }

    #[test]
    fn test_chunk_ranges_cover_file_exactly() {
        let size = 4 * CHUNK_SIZE_BYTES + 1234;
        let total = chunk_count(size).unwrap();
        let mut covered = 0;
        for index in 0..total {
            let range = chunk_range(index, size);
            assert_eq!(range.start, covered);
            covered = range.end;
        }
        assert_eq!(covered, size);
    }

    #[test]
    fn test_chunk_field_name() {
        assert_eq!(chunk_field_name(0, 4), "files[0][4]");
        assert_eq!(chunk_field_name(3, 4), "files[3][4]");
    }

    #[test]
    fn test_session_holds_back_final_part() {
        let mut session = UploadSession::new(3);
        session.record_chunk(0, part(1));
        session.record_chunk(1, part(2));
        assert_eq!(session.parts().len(), 2);
        assert!(!session.is_complete());

        session.record_chunk(2, part(3));
        assert_eq!(session.parts().len(), 2);
        assert!(session.is_complete());
    }

    #[test]
    fn test_single_chunk_session_has_no_accumulated_parts() {
        let mut session = UploadSession::new(1);
        assert!(session.is_final_chunk(0));
        session.record_chunk(0, part(1));
        assert!(session.parts().is_empty());
        assert!(session.is_complete());
    }

    #[test]
    fn test_progress_is_monotonic_and_reaches_100() {
        let mut session = UploadSession::new(3);
        let mut last = session.progress().percent;
        assert_eq!(last, 0);

        for index in 0..3 {
            session.record_chunk(index, part(index + 1));
            let percent = session.progress().percent;
            assert!(percent >= last);
            last = percent;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_recorded_part_numbers_are_strictly_increasing() {
        let mut session = UploadSession::new(5);
        for index in 0..5 {
            session.record_chunk(index, part(index + 1));
        }
        let numbers: Vec<u64> = session.parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_adopt_identifiers_replaces_sentinels() {
        let mut session = UploadSession::new(2);
        assert_eq!(session.upload_id(), "");
        assert_eq!(session.storage_key(), "");

        session.adopt_identifiers(InitUploadData {
            upload_id: "u-9".to_string(),
            key: "gallery/x.png".to_string(),
        });
        assert_eq!(session.upload_id(), "u-9");
        assert_eq!(session.storage_key(), "gallery/x.png");
    }

    #[test]
    fn test_mime_type_for_common_extensions() {
        assert_eq!(mime_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("plan.pdf")), "application/pdf");
        assert_eq!(mime_type_for(Path::new("noext")), "application/octet-stream");
    }
}
