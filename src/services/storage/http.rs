use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::{ObjectStorage, SIGNED_URL_TTL_SECS};

/// Supabase-style HTTP object store: uploads and fetches go to
/// `{base}/object/{bucket}/{path}`, downloads for third parties go through
/// signed URLs minted locally with an HMAC token.
pub struct HttpBucketStorage {
    base_url: String,
    api_key: String,
    bucket: String,
    signing_secret: String,
    client: reqwest::Client,
}

impl HttpBucketStorage {
    pub fn new(base_url: String, api_key: String, bucket: String, signing_secret: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            bucket,
            signing_secret,
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn sign(&self, path: &str, expires: i64) -> anyhow::Result<String> {
        let mut mac = Hmac::<Sha1>::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|_| anyhow::anyhow!("invalid signing secret"))?;
        mac.update(format!("{}/{}:{}", self.bucket, path, expires).as_bytes());
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(mac.finalize().into_bytes());
        Ok(token)
    }
}

#[async_trait]
impl ObjectStorage for HttpBucketStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<String> {
        self.client
            .post(self.object_url(path))
            .bearer_auth(&self.api_key)
            .header("content-type", content_type.to_string())
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .context("failed to upload object")?
            .error_for_status()
            .context("object store rejected upload")?;

        Ok(path.to_string())
    }

    async fn signed_url(&self, path: &str) -> anyhow::Result<String> {
        let expires = Utc::now().timestamp() + SIGNED_URL_TTL_SECS;
        let token = self.sign(path, expires)?;
        Ok(format!(
            "{}/object/sign/{}/{}?token={}&expires={}",
            self.base_url, self.bucket, path, token, expires
        ))
    }

    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(self.object_url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("failed to fetch object")?
            .error_for_status()
            .context("object store returned error")?;

        Ok(response.bytes().await.context("failed to read object body")?.to_vec())
    }
}
