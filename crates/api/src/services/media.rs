//! Signed direct uploads to the image CDN.
//!
//! The API never proxies image bytes. It signs the upload parameters and the
//! client posts the file straight to the CDN together with the signature.

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::MediaConfig;

/// Parameters a client needs to upload one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUpload {
    pub cloud_name: String,
    pub api_key: String,
    pub timestamp: i64,
    pub folder: String,
    pub signature: String,
    pub upload_url: String,
}

/// Signs upload requests with the CDN API secret.
#[derive(Clone)]
pub struct MediaSigner {
    config: MediaConfig,
}

impl MediaSigner {
    #[must_use]
    pub const fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Signature over `params`: `k=v` pairs sorted by key, empty values
    /// skipped, joined with `&`, followed by the secret, SHA-256 hex encoded.
    #[must_use]
    pub fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut pairs: Vec<&(&str, &str)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
        pairs.sort_unstable_by_key(|(k, _)| *k);

        let to_sign = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.config.api_secret.expose_secret().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Upload parameters for the configured folder, valid from `now`.
    #[must_use]
    pub fn signed_upload(&self, now: DateTime<Utc>) -> SignedUpload {
        let timestamp = now.timestamp();
        let ts = timestamp.to_string();
        let signature = self.sign(&[
            ("folder", self.config.upload_folder.as_str()),
            ("timestamp", ts.as_str()),
        ]);

        SignedUpload {
            cloud_name: self.config.cloud_name.clone(),
            api_key: self.config.api_key.clone(),
            timestamp,
            folder: self.config.upload_folder.clone(),
            signature,
            upload_url: format!(
                "{}/{}/image/upload",
                self.config.upload_base.trim_end_matches('/'),
                self.config.cloud_name
            ),
        }
    }
}
