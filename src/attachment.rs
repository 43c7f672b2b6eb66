//! Attachment rules and presentation classification

use crate::error::{Error, Result};
use crate::models::ChatMessage;

/// Upload size ceiling enforced before any network call.
pub const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// MIME types the upload endpoint accepts.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/avi",
    "video/mov",
    "video/wmv",
    "audio/mp3",
    "audio/wav",
    "audio/ogg",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Local validation gate for outgoing uploads. Violations are rejected
/// before the request is built.
pub fn validate_upload(size: u64, mime_type: &str) -> Result<()> {
    if size > MAX_UPLOAD_BYTES {
        return Err(Error::FileTooLarge(size));
    }
    if !ALLOWED_MIME_TYPES.contains(&mime_type) {
        return Err(Error::UnsupportedFileType(mime_type.to_string()));
    }
    Ok(())
}

/// Coarse classification of an attachment, selecting the render variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    File,
}

impl AttachmentKind {
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            Self::Image
        } else if mime_type.starts_with("video/") {
            Self::Video
        } else if mime_type.starts_with("audio/") {
            Self::Audio
        } else {
            Self::File
        }
    }

    /// Classify a message: the declared MIME type wins, with the coarse
    /// `messageType` tag as fallback for payloads that omit it.
    pub fn of_message(message: &ChatMessage) -> Self {
        if let Some(mime) = message.file_type.as_deref() {
            return Self::from_mime(mime);
        }
        match message.message_type.as_deref() {
            Some("image") => Self::Image,
            Some("video") => Self::Video,
            Some("audio") => Self::Audio,
            _ => Self::File,
        }
    }
}

/// Render-time view of a message body. Rendering dispatches over this once
/// per message; the stored message is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Image { url: &'a str, name: &'a str },
    Video { url: &'a str, name: &'a str },
    Audio { url: &'a str, name: &'a str },
    File { url: &'a str, name: &'a str },
}
