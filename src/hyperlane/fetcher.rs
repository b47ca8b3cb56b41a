//! Checkpoint fetchers.
//!
//! Validators publish signed checkpoints either to a local directory (`file://` locations, used in
//! development) or to an S3 bucket (`s3://bucket/region[/folder]`).

use super::{CheckpointError, checkpoint::SignedCheckpointWithMessageId};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::{fmt::Debug, path::PathBuf, sync::Arc};
use tracing::trace;

/// Reads the checkpoints a single validator published.
#[async_trait]
pub trait CheckpointFetcher: Debug + Send + Sync {
    /// The validator whose checkpoints this fetcher reads.
    fn validator(&self) -> Address;

    /// Returns the latest index the validator signed, or `None` if it has not signed any.
    async fn latest_index(&self) -> Result<Option<u32>, CheckpointError>;

    /// Returns the checkpoint at `index`, or `None` if the validator has not signed it.
    async fn checkpoint(
        &self,
        index: u32,
    ) -> Result<Option<SignedCheckpointWithMessageId>, CheckpointError>;
}

/// A parsed validator storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// A local directory.
    Local(PathBuf),
    /// An S3 bucket prefix.
    S3 {
        /// Bucket name.
        bucket: String,
        /// AWS region.
        region: String,
        /// Optional folder inside the bucket.
        folder: Option<String>,
    },
}

impl std::str::FromStr for StorageLocation {
    type Err = CheckpointError;

    fn from_str(location: &str) -> Result<Self, Self::Err> {
        if let Some(path) = location.strip_prefix("file://") {
            if path.is_empty() {
                return Err(CheckpointError::InvalidLocation(location.to_string()));
            }
            return Ok(Self::Local(PathBuf::from(path)));
        }

        if let Some(rest) = location.strip_prefix("s3://") {
            let mut parts = rest.splitn(3, '/');
            let bucket = parts.next().filter(|s| !s.is_empty());
            let region = parts.next().filter(|s| !s.is_empty());
            let folder = parts.next().map(|s| s.trim_matches('/')).filter(|s| !s.is_empty());
            return match (bucket, region) {
                (Some(bucket), Some(region)) => Ok(Self::S3 {
                    bucket: bucket.to_string(),
                    region: region.to_string(),
                    folder: folder.map(str::to_string),
                }),
                _ => Err(CheckpointError::InvalidLocation(location.to_string())),
            };
        }

        Err(CheckpointError::UnsupportedLocation(location.to_string()))
    }
}

/// Reads checkpoints from a local directory.
#[derive(Debug, Clone)]
pub struct LocalStorageFetcher {
    validator: Address,
    path: PathBuf,
}

impl LocalStorageFetcher {
    /// Creates a fetcher reading `validator`'s checkpoints from `path`.
    pub fn new(validator: Address, path: impl Into<PathBuf>) -> Self {
        Self { validator, path: path.into() }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        file: &str,
    ) -> Result<Option<T>, CheckpointError> {
        let path = self.path.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %path.display(), "Checkpoint file does not exist");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl CheckpointFetcher for LocalStorageFetcher {
    fn validator(&self) -> Address {
        self.validator
    }

    async fn latest_index(&self) -> Result<Option<u32>, CheckpointError> {
        self.read_json("index.json").await
    }

    async fn checkpoint(
        &self,
        index: u32,
    ) -> Result<Option<SignedCheckpointWithMessageId>, CheckpointError> {
        self.read_json(&format!("{index}_with_id.json")).await
    }
}

/// Reads checkpoints from an S3 bucket over HTTPS.
///
/// Signature components are re-read from the serialized signature of every fetched checkpoint.
#[derive(Debug, Clone)]
pub struct S3Fetcher {
    validator: Address,
    client: reqwest::Client,
    base_url: String,
}

impl S3Fetcher {
    /// Creates a fetcher reading `validator`'s checkpoints from `bucket` in `region`.
    pub fn new(
        validator: Address,
        client: reqwest::Client,
        bucket: &str,
        region: &str,
        folder: Option<&str>,
    ) -> Self {
        let mut base_url = format!("https://{bucket}.s3.{region}.amazonaws.com/");
        if let Some(folder) = folder {
            base_url.push_str(folder);
            base_url.push('/');
        }
        Self::with_base_url(validator, client, base_url)
    }

    /// Creates a fetcher reading `validator`'s checkpoints from objects under `base_url`.
    pub fn with_base_url(
        validator: Address,
        client: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { validator, client, base_url }
    }

    /// URL of `key`.
    pub fn url(&self, key: &str) -> String {
        format!("{}{key}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CheckpointError> {
        let url = self.url(key);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => {
                trace!(%url, "Checkpoint object does not exist");
                Ok(None)
            }
            status => Err(CheckpointError::HttpStatus { status: status.as_u16(), url }),
        }
    }
}

#[async_trait]
impl CheckpointFetcher for S3Fetcher {
    fn validator(&self) -> Address {
        self.validator
    }

    async fn latest_index(&self) -> Result<Option<u32>, CheckpointError> {
        self.get_json("checkpoint_latest_index.json").await
    }

    async fn checkpoint(
        &self,
        index: u32,
    ) -> Result<Option<SignedCheckpointWithMessageId>, CheckpointError> {
        let mut checkpoint: Option<SignedCheckpointWithMessageId> =
            self.get_json(&format!("checkpoint_{index}_with_id.json")).await?;
        if let Some(checkpoint) = &mut checkpoint {
            checkpoint.repair_signature();
        }
        Ok(checkpoint)
    }
}

/// Builds [`CheckpointFetcher`]s for validator storage locations.
pub trait FetcherFactory: Debug + Send + Sync {
    /// Returns a fetcher for `validator`'s checkpoints at `location`.
    fn fetcher(
        &self,
        validator: Address,
        location: &str,
    ) -> Result<Arc<dyn CheckpointFetcher>, CheckpointError>;
}

/// [`FetcherFactory`] for `file://` and `s3://` locations.
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcherFactory {
    client: reqwest::Client,
}

impl DefaultFetcherFactory {
    /// Creates a factory sharing `client` across S3 fetchers.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl FetcherFactory for DefaultFetcherFactory {
    fn fetcher(
        &self,
        validator: Address,
        location: &str,
    ) -> Result<Arc<dyn CheckpointFetcher>, CheckpointError> {
        let fetcher: Arc<dyn CheckpointFetcher> = match location.parse::<StorageLocation>()? {
            StorageLocation::Local(path) => Arc::new(LocalStorageFetcher::new(validator, path)),
            StorageLocation::S3 { bucket, region, folder } => Arc::new(S3Fetcher::new(
                validator,
                self.client.clone(),
                &bucket,
                &region,
                folder.as_deref(),
            )),
        };
        Ok(fetcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hyperlane::checkpoint::{Checkpoint, CheckpointWithMessageId},
        test_utils::sign_checkpoint,
    };
    use alloy::{
        primitives::{B256, U256},
        signers::local::PrivateKeySigner,
    };
    use axum::{
        Router,
        extract::{Path, State},
        http::StatusCode as HttpStatus,
        routing::get,
    };
    use std::collections::HashMap;

    type Objects = Arc<HashMap<String, (HttpStatus, String)>>;

    /// Serves `objects` under `/validator/` on a local port, returning the base url. Unknown
    /// keys are answered with 404.
    async fn serve_bucket(objects: Vec<(&str, HttpStatus, String)>) -> String {
        let objects: Objects = Arc::new(
            objects
                .into_iter()
                .map(|(key, status, body)| (key.to_string(), (status, body)))
                .collect(),
        );
        let app = Router::new()
            .route(
                "/validator/{key}",
                get(|Path(key): Path<String>, State(objects): State<Objects>| async move {
                    objects.get(&key).cloned().unwrap_or((HttpStatus::NOT_FOUND, String::new()))
                }),
            )
            .with_state(objects);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        format!("http://{addr}/validator")
    }

    fn signed_checkpoint(signer: &PrivateKeySigner) -> SignedCheckpointWithMessageId {
        sign_checkpoint(
            signer,
            CheckpointWithMessageId {
                checkpoint: Checkpoint {
                    merkle_tree_hook_address: B256::repeat_byte(1),
                    mailbox_domain: 1,
                    root: B256::repeat_byte(2),
                    index: 3,
                },
                message_id: B256::repeat_byte(4),
            },
        )
    }

    #[test]
    fn parse_storage_locations() {
        assert_eq!(
            "file:///tmp/validator".parse::<StorageLocation>().unwrap(),
            StorageLocation::Local(PathBuf::from("/tmp/validator"))
        );
        assert_eq!(
            "s3://bucket/us-east-1".parse::<StorageLocation>().unwrap(),
            StorageLocation::S3 {
                bucket: "bucket".to_string(),
                region: "us-east-1".to_string(),
                folder: None
            }
        );
        assert_eq!(
            "s3://bucket/eu-west-1/a/b/".parse::<StorageLocation>().unwrap(),
            StorageLocation::S3 {
                bucket: "bucket".to_string(),
                region: "eu-west-1".to_string(),
                folder: Some("a/b".to_string())
            }
        );
        assert!(matches!(
            "s3://bucket".parse::<StorageLocation>(),
            Err(CheckpointError::InvalidLocation(_))
        ));
        assert!(matches!(
            "gs://bucket".parse::<StorageLocation>(),
            Err(CheckpointError::UnsupportedLocation(_))
        ));
    }

    #[test]
    fn s3_urls() {
        let fetcher = S3Fetcher::new(
            Address::ZERO,
            reqwest::Client::new(),
            "hyperlane-validator",
            "us-east-1",
            Some("arbitrum"),
        );
        assert_eq!(
            fetcher.url("checkpoint_7_with_id.json"),
            "https://hyperlane-validator.s3.us-east-1.amazonaws.com/arbitrum/checkpoint_7_with_id.json"
        );
    }

    #[tokio::test]
    async fn s3_fetcher_reads_checkpoints() {
        let signer = PrivateKeySigner::random();
        let signed = signed_checkpoint(&signer);
        let base_url = serve_bucket(vec![
            ("checkpoint_latest_index.json", HttpStatus::OK, "3".to_string()),
            (
                "checkpoint_3_with_id.json",
                HttpStatus::OK,
                serde_json::to_string(&signed).unwrap(),
            ),
        ])
        .await;
        let fetcher = S3Fetcher::with_base_url(signer.address(), reqwest::Client::new(), base_url);

        assert_eq!(fetcher.latest_index().await.unwrap(), Some(3));
        assert_eq!(fetcher.checkpoint(3).await.unwrap(), Some(signed));
        assert_eq!(fetcher.checkpoint(4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn s3_fetcher_reports_http_errors() {
        let base_url = serve_bucket(vec![(
            "checkpoint_latest_index.json",
            HttpStatus::FORBIDDEN,
            "AccessDenied".to_string(),
        )])
        .await;
        let fetcher = S3Fetcher::with_base_url(Address::ZERO, reqwest::Client::new(), base_url);

        let err = fetcher.latest_index().await.unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::HttpStatus { status: 403, ref url }
                if url.ends_with("/validator/checkpoint_latest_index.json")
        ));
    }

    #[tokio::test]
    async fn s3_fetcher_repairs_signatures() {
        let signer = PrivateKeySigner::random();
        let signed = signed_checkpoint(&signer);
        // the published r is missing its leading byte, the serialized signature is intact
        let mut published = signed.clone();
        published.signature.r = signed.signature.r & (U256::MAX >> 8);
        published.signature.s = U256::ZERO;
        let base_url = serve_bucket(vec![(
            "checkpoint_3_with_id.json",
            HttpStatus::OK,
            serde_json::to_string(&published).unwrap(),
        )])
        .await;
        let fetcher = S3Fetcher::with_base_url(signer.address(), reqwest::Client::new(), base_url);

        let fetched = fetcher.checkpoint(3).await.unwrap().unwrap();
        assert_eq!(fetched.signature, signed.signature);
        fetched.verify(signer.address()).unwrap();
    }

    #[tokio::test]
    async fn local_fetcher_reads_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let signer = PrivateKeySigner::random();
        let signed = signed_checkpoint(&signer);
        std::fs::write(dir.path().join("index.json"), "3").unwrap();
        std::fs::write(dir.path().join("3_with_id.json"), serde_json::to_vec(&signed).unwrap())
            .unwrap();

        let location = format!("file://{}", dir.path().display());
        let fetcher =
            DefaultFetcherFactory::default().fetcher(signer.address(), &location).unwrap();

        assert_eq!(fetcher.validator(), signer.address());
        assert_eq!(fetcher.latest_index().await.unwrap(), Some(3));
        assert_eq!(fetcher.checkpoint(3).await.unwrap(), Some(signed));
        assert_eq!(fetcher.checkpoint(4).await.unwrap(), None);

        std::fs::write(dir.path().join("5_with_id.json"), "not json").unwrap();
        assert!(matches!(fetcher.checkpoint(5).await, Err(CheckpointError::Json(_))));
    }

    #[tokio::test]
    async fn local_fetcher_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = LocalStorageFetcher::new(Address::ZERO, dir.path());
        assert_eq!(fetcher.latest_index().await.unwrap(), None);
    }
}
