//! VoicEra Session - the conversation core of the playground.
//!
//! - [`session::ChatSession`]: transcript, context selection and the
//!   single-flight send lifecycle
//! - [`directory`]: where selectable contexts come from
//! - [`gateway`]: the inference backend, consumed as an opaque HTTP endpoint
//! - [`upload`]: multipart document upload that creates contexts
//!
//! ## Flow
//!
//! ```text
//! select_context → send_message → user turn + pending
//!                       ↓
//!              InferenceGateway::complete
//!                       ↓
//!     assistant turn (reply or fallback) + pending cleared
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod client;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod message;
pub mod session;
pub mod upload;

pub use directory::{parse_contexts, ContextDirectory, HttpContextDirectory, StaticContextDirectory};
pub use error::{DirectoryError, GatewayError, UploadError};
pub use gateway::{CompletionRequest, HttpInferenceGateway, InferenceGateway};
pub use message::{Message, Role, Transcript};
pub use session::{ChatSession, RejectReason, SendOutcome, SessionSnapshot, FALLBACK_REPLY};
pub use upload::{SourceKind, SourceValue, UploadClient, UploadContext, UploadRequest, UploadSource};

use std::sync::Arc;
use voicera_common::config::ClientConfig;

/// HTTP-backed collaborators pointed at one gateway.
#[derive(Clone)]
pub struct Backend {
    pub gateway: Arc<HttpInferenceGateway>,
    pub directory: Arc<HttpContextDirectory>,
    pub uploads: UploadClient,
}

impl Backend {
    /// Wire all three clients to the gateway at `config.gateway_url`.
    pub fn connect(config: &ClientConfig) -> reqwest::Result<Self> {
        let http = client::build_http_client(config)?;
        let base = config.gateway_url.as_str();
        Ok(Self {
            gateway: Arc::new(HttpInferenceGateway::new(http.clone(), base)),
            directory: Arc::new(HttpContextDirectory::new(http.clone(), base)),
            uploads: UploadClient::new(http, base),
        })
    }

    /// A fresh session talking to this backend.
    pub fn session(&self) -> ChatSession {
        ChatSession::new(self.gateway.clone(), self.directory.clone())
    }
}
