//! Inline media payloads carried as `data:<mime>;base64,<data>` URIs.

use std::fmt;
use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;

/// Largest decoded payload accepted (the upload form's 4 MB limit).
pub const MAX_MEDIA_BYTES: usize = 4 * 1024 * 1024;

/// Coarse media family, used to check a payload against what a feature accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    Image,
    Audio,
    Pdf,
    Other,
}

impl MediaFamily {
    pub fn of(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else if mime == "application/pdf" {
            Self::Pdf
        } else {
            Self::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "an image",
            Self::Audio => "an audio recording",
            Self::Pdf => "a PDF document",
            Self::Other => "an unsupported file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("must be a data URI starting with 'data:'")]
    MissingScheme,

    #[error("must be base64-encoded ('data:<mime>;base64,<data>')")]
    MissingBase64Marker,

    #[error("has an invalid MIME type '{0}'")]
    InvalidMime(String),

    #[error("is empty")]
    EmptyPayload,

    #[error("contains invalid base64 data")]
    InvalidBase64,

    #[error("is too large ({bytes} bytes), the maximum is {max} bytes")]
    TooLarge { bytes: usize, max: usize },
}

/// A parsed, size-checked data URI. The payload is kept base64-encoded since
/// every model API wants it that way.
#[derive(Clone, PartialEq, Eq)]
pub struct DataUri {
    mime: String,
    data: String,
    byte_len: usize,
}

fn mime_regex() -> &'static Regex {
    static MIME: OnceLock<Regex> = OnceLock::new();
    MIME.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9!#$&^_.+-]*/[a-z0-9][a-z0-9!#$&^_.+-]*$").expect("static regex")
    })
}

impl DataUri {
    /// Parse and validate a data URI, enforcing [`MAX_MEDIA_BYTES`].
    pub fn parse(raw: &str) -> Result<Self, MediaError> {
        Self::parse_with_limit(raw, MAX_MEDIA_BYTES)
    }

    pub fn parse_with_limit(raw: &str, max_bytes: usize) -> Result<Self, MediaError> {
        let rest = raw
            .trim()
            .strip_prefix("data:")
            .ok_or(MediaError::MissingScheme)?;
        let (header, payload) = rest.split_once(',').ok_or(MediaError::MissingBase64Marker)?;

        let mut params = header.split(';');
        let mime = params.next().unwrap_or_default().trim().to_ascii_lowercase();
        let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));
        if !is_base64 {
            return Err(MediaError::MissingBase64Marker);
        }
        if !mime_regex().is_match(&mime) {
            return Err(MediaError::InvalidMime(mime));
        }

        let payload = payload.trim();
        if payload.is_empty() {
            return Err(MediaError::EmptyPayload);
        }

        // Reject before decoding anything that cannot possibly fit.
        let max_encoded = max_bytes.div_ceil(3) * 4;
        if payload.len() > max_encoded {
            return Err(MediaError::TooLarge {
                bytes: payload.len() / 4 * 3,
                max: max_bytes,
            });
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| MediaError::InvalidBase64)?;
        if decoded.is_empty() {
            return Err(MediaError::EmptyPayload);
        }
        if decoded.len() > max_bytes {
            return Err(MediaError::TooLarge {
                bytes: decoded.len(),
                max: max_bytes,
            });
        }

        Ok(Self {
            mime,
            data: payload.to_string(),
            byte_len: decoded.len(),
        })
    }

    /// Build a data URI from raw bytes.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self {
            mime: mime.to_ascii_lowercase(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            byte_len: bytes.len(),
        }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn family(&self) -> MediaFamily {
        MediaFamily::of(&self.mime)
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, self.data)
    }
}

// Payloads can be megabytes of patient media; never dump them into logs.
impl fmt::Debug for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataUri")
            .field("mime", &self.mime)
            .field("byte_len", &self.byte_len)
            .finish()
    }
}
