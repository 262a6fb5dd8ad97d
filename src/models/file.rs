use serde::Serialize;
use sqlx::FromRow;

/// Allowed MIME types and the category each one files under
pub const ALLOWED_MIME_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "Image"),
    ("image/png", "Image"),
    ("image/gif", "Image"),
    ("application/pdf", "Document"),
    ("text/plain", "Document"),
    ("application/msword", "Document"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "Document",
    ),
    ("application/vnd.ms-excel", "Spreadsheet"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "Spreadsheet",
    ),
    ("application/zip", "Archive"),
    ("video/mp4", "Video"),
    ("audio/mpeg", "Audio"),
];

/// Types that may be rendered inline
pub const PREVIEWABLE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "text/plain",
];

/// Category for an allowed MIME type, `None` when the type is not allowed
pub fn category_for(mime_type: &str) -> Option<&'static str> {
    ALLOWED_MIME_TYPES
        .iter()
        .find(|(mime, _)| *mime == mime_type)
        .map(|(_, category)| *category)
}

pub fn is_previewable(mime_type: &str) -> bool {
    PREVIEWABLE_TYPES.contains(&mime_type)
}

/// Filename keywords, checked in order, and the label each one earns
const NAME_LABELS: &[(&[&str], &str)] = &[
    (&["report"], "📊 Financial Report"),
    (&["presentation"], "🎯 Presentation"),
    (&["contract"], "📋 Contract/Agreement"),
    (&["invoice"], "💰 Invoice"),
    (&["resume", "cv"], "👔 Resume/CV"),
    (&["backup"], "💾 Backup Data"),
    (&["screenshot"], "📸 Screenshot"),
];

/// Label for a new upload: a filename keyword wins, otherwise the category decides
pub fn label_for(file_name: &str, category: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if let Some((_, label)) = NAME_LABELS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
    {
        return label;
    }

    match category {
        "Image" => "Photo",
        "Document" => "Text Document",
        "Spreadsheet" => "Data Table",
        "Archive" => "Compressed Files",
        "Video" => "Video Media",
        "Audio" => "Audio Recording",
        _ => "File",
    }
}

/// File record
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
    pub category: String,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub content_hash: String,
    pub ai_label: String,
    pub is_private: bool,
    pub created_at: String,
}

/// Upload parameters collected from the transport
#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner_id: String,
    pub name: String,
    pub original_name: String,
    pub mime_type: String,
}

/// Storage usage response
#[derive(Debug, Serialize)]
pub struct StorageUsage {
    pub file_count: i64,
    pub bytes_used: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_lookup() {
        assert_eq!(category_for("text/plain"), Some("Document"));
        assert_eq!(category_for("audio/mpeg"), Some("Audio"));
        assert_eq!(category_for("application/x-msdownload"), None);
        assert_eq!(category_for("TEXT/PLAIN"), None);
    }

    #[test]
    fn previewable_types_are_allowed_types() {
        for mime in PREVIEWABLE_TYPES {
            assert!(category_for(mime).is_some());
        }
        assert!(!is_previewable("application/zip"));
    }

    #[test]
    fn labels_prefer_filename_keywords() {
        assert_eq!(label_for("Q3-Report.pdf", "Document"), "📊 Financial Report");
        assert_eq!(label_for("my_CV.docx", "Document"), "👔 Resume/CV");
        // First matching keyword wins
        assert_eq!(label_for("backup_invoice.zip", "Archive"), "💰 Invoice");
    }

    #[test]
    fn labels_fall_back_to_category() {
        assert_eq!(label_for("hello.txt", "Document"), "Text Document");
        assert_eq!(label_for("cat.png", "Image"), "Photo");
        assert_eq!(label_for("song.mp3", "Audio"), "Audio Recording");
        assert_eq!(label_for("data.xlsx", "Spreadsheet"), "Data Table");
        assert_eq!(label_for("blob", "Unknown"), "File");
        // Same input, same label
        assert_eq!(label_for("clip.mp4", "Video"), label_for("clip.mp4", "Video"));
    }
}
