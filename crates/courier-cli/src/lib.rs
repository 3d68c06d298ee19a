use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use courier_core::models::{
    AttachmentId, AttachmentPointer, CdnLocator, PointerKind, PointerState,
};

/// Decode a base64 command-line argument, naming the argument on failure.
pub fn decode_base64(name: &str, value: &str) -> anyhow::Result<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .with_context(|| format!("--{} is not valid base64", name))
}

/// Where the blob to fetch lives and how to decrypt it.
#[derive(Debug, Clone)]
pub struct PointerArgs {
    pub id: String,
    pub cdn_number: u32,
    pub key: Option<String>,
    pub legacy_id: Option<u64>,
    pub encryption_key: String,
    pub digest: String,
    pub size: u64,
    pub content_type: String,
}

impl PointerArgs {
    /// Build the incoming pointer these arguments describe.
    pub fn to_pointer(&self) -> anyhow::Result<AttachmentPointer> {
        let locator = match (&self.key, self.legacy_id) {
            (Some(key), None) => CdnLocator::Key(key.clone()),
            (None, Some(id)) => CdnLocator::LegacyId(id),
            _ => anyhow::bail!("exactly one of --key and --legacy-id is required"),
        };

        let encryption_key = decode_base64("encryption-key", &self.encryption_key)?;
        if encryption_key.len() != 32 {
            anyhow::bail!(
                "--encryption-key must decode to 32 bytes, got {}",
                encryption_key.len()
            );
        }

        Ok(AttachmentPointer {
            id: AttachmentId::new(self.id.clone()),
            kind: PointerKind::Incoming,
            state: PointerState::Enqueued,
            cdn_number: self.cdn_number,
            locator,
            encryption_key,
            digest: decode_base64("digest", &self.digest)?,
            byte_count: self.size,
            content_type: self.content_type.clone(),
            source_filename: None,
            message_id: None,
        })
    }
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
