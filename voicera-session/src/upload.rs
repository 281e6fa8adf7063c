//! Document upload: builds the multipart request that creates or extends
//! contexts on the embedding backend.
//!
//! Wire format (`POST {base}/api/uploadPdf`, `multipart/form-data`):
//! - `contextList`: JSON `[{ "contextId": "...", "urls": [{ "type": "webpage", "value": "https://..." }] }]`
//! - `file_{contextIndex}_{urlIndex}`: one binary part per non-webpage entry holding a file

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::str::FromStr;

use crate::client::{endpoints, join_url, with_trace};
use crate::error::UploadError;

/// What kind of document a source entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Webpage,
    Pdf,
    Doc,
    Txt,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [Self::Webpage, Self::Pdf, Self::Doc, Self::Txt];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Webpage => "webpage",
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Txt => "txt",
        }
    }

    /// Whether entries of this kind carry a file rather than a URL.
    pub const fn is_file(&self) -> bool {
        !matches!(self, Self::Webpage)
    }

    fn mime(&self) -> &'static str {
        match self {
            Self::Webpage => "text/html",
            Self::Pdf => "application/pdf",
            Self::Doc => "application/msword",
            Self::Txt => "text/plain",
        }
    }

    /// Guess the kind from a file extension (`.pdf`, `.doc`/`.docx`, anything else is text).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("pdf") => Self::Pdf,
            Some("doc") | Some("docx") => Self::Doc,
            _ => Self::Txt,
        }
    }
}

impl FromStr for SourceKind {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UploadError::Invalid(format!("unknown source type '{s}'")))
    }
}

/// The value slot of a source entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceValue {
    Empty,
    Url(String),
    File { file_name: String, bytes: Vec<u8> },
}

impl SourceValue {
    /// Text written into the `contextList` manifest.
    fn manifest_value(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Url(url) => url,
            Self::File { file_name, .. } => file_name,
        }
    }
}

/// One URL or file attached to a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSource {
    kind: SourceKind,
    value: SourceValue,
}

impl UploadSource {
    /// The blank entry a new context starts with.
    pub fn blank() -> Self {
        Self {
            kind: SourceKind::Webpage,
            value: SourceValue::Empty,
        }
    }

    pub fn webpage(url: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Webpage,
            value: SourceValue::Url(url.into()),
        }
    }

    pub fn file(kind: SourceKind, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            value: SourceValue::File {
                file_name: file_name.into(),
                bytes,
            },
        }
    }

    /// Read a file from disk; the kind is guessed from the extension when not given.
    pub async fn from_path(path: &Path, kind: Option<SourceKind>) -> Result<Self, UploadError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self::file(
            kind.unwrap_or_else(|| SourceKind::from_path(path)),
            file_name,
            bytes,
        ))
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn value(&self) -> &SourceValue {
        &self.value
    }
}

/// A context id plus the sources to embed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadContext {
    pub context_id: String,
    sources: Vec<UploadSource>,
}

impl UploadContext {
    /// A context with one blank webpage entry, like a freshly added form row.
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            sources: vec![UploadSource::blank()],
        }
    }

    /// A context with exactly the given sources.
    pub fn with_sources(context_id: impl Into<String>, sources: Vec<UploadSource>) -> Self {
        Self {
            context_id: context_id.into(),
            sources,
        }
    }

    pub fn add_source(&mut self, source: UploadSource) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn remove_source(&mut self, index: usize) -> Option<UploadSource> {
        (index < self.sources.len()).then(|| self.sources.remove(index))
    }

    /// Change an entry's kind. The value is cleared, since a URL is not a file
    /// and vice versa.
    pub fn set_kind(&mut self, index: usize, kind: SourceKind) -> bool {
        match self.sources.get_mut(index) {
            Some(source) => {
                source.kind = kind;
                source.value = SourceValue::Empty;
                true
            }
            None => false,
        }
    }

    pub fn set_value(&mut self, index: usize, value: SourceValue) -> bool {
        match self.sources.get_mut(index) {
            Some(source) => {
                source.value = value;
                true
            }
            None => false,
        }
    }

    pub fn sources(&self) -> &[UploadSource] {
        &self.sources
    }
}

/// A file part as it will appear in the multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart<'a> {
    pub field_name: String,
    pub kind: SourceKind,
    pub file_name: &'a str,
    pub bytes: &'a [u8],
}

/// Multipart field name of the file at `(context_index, source_index)`.
pub fn file_field_name(context_index: usize, source_index: usize) -> String {
    format!("file_{context_index}_{source_index}")
}

/// Everything submitted in one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    contexts: Vec<UploadContext>,
}

impl UploadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_context(&mut self, context: UploadContext) -> &mut Self {
        self.contexts.push(context);
        self
    }

    pub fn remove_context(&mut self, index: usize) -> Option<UploadContext> {
        (index < self.contexts.len()).then(|| self.contexts.remove(index))
    }

    pub fn context_mut(&mut self, index: usize) -> Option<&mut UploadContext> {
        self.contexts.get_mut(index)
    }

    pub fn contexts(&self) -> &[UploadContext] {
        &self.contexts
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        if self.contexts.is_empty() {
            return Err(UploadError::Invalid("no contexts to upload".into()));
        }
        if let Some(pos) = self
            .contexts
            .iter()
            .position(|c| c.context_id.trim().is_empty())
        {
            return Err(UploadError::Invalid(format!(
                "context #{} has an empty id",
                pos + 1
            )));
        }
        Ok(())
    }

    /// The `contextList` manifest.
    pub fn manifest(&self) -> Value {
        Value::Array(
            self.contexts
                .iter()
                .map(|c| {
                    json!({
                        "contextId": c.context_id,
                        "urls": c.sources.iter().map(|s| json!({
                            "type": s.kind.as_str(),
                            "value": s.value.manifest_value(),
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect(),
        )
    }

    /// File parts in submission order. Webpage entries and empty slots are skipped.
    pub fn file_parts(&self) -> Vec<FilePart<'_>> {
        let mut parts = Vec::new();
        for (ci, context) in self.contexts.iter().enumerate() {
            for (si, source) in context.sources.iter().enumerate() {
                if !source.kind.is_file() {
                    continue;
                }
                if let SourceValue::File { file_name, bytes } = &source.value {
                    parts.push(FilePart {
                        field_name: file_field_name(ci, si),
                        kind: source.kind,
                        file_name,
                        bytes,
                    });
                }
            }
        }
        parts
    }

    /// Encode as a multipart form.
    pub fn to_form(&self) -> Result<Form, UploadError> {
        let manifest = serde_json::to_string(&self.manifest())?;
        let mut form = Form::new().text("contextList", manifest);

        for part in self.file_parts() {
            let body = Part::bytes(part.bytes.to_vec())
                .file_name(part.file_name.to_string())
                .mime_str(part.kind.mime())?;
            form = form.part(part.field_name, body);
        }
        Ok(form)
    }
}

/// Client for the upload endpoint.
#[derive(Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    url: String,
}

impl UploadClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            url: join_url(base_url, endpoints::UPLOAD),
        }
    }

    /// Submit the request. Returns the backend's JSON body on success.
    pub async fn upload(&self, request: UploadRequest) -> Result<Value, UploadError> {
        request.validate()?;
        let form = request.to_form()?;
        let (builder, trace_id) = with_trace(self.http.post(&self.url).multipart(form));

        tracing::info!(
            trace_id = %trace_id,
            contexts = request.contexts().len(),
            files = request.file_parts().len(),
            "Uploading documents"
        );

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        let parsed: Option<Value> = serde_json::from_slice(&body).ok();

        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(|v| v.get("error"))
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Upload failed")
                        .to_string()
                });
            tracing::error!(trace_id = %trace_id, status = status.as_u16(), %message, "Upload rejected");
            return Err(UploadError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(parsed.unwrap_or(Value::Null))
    }
}
