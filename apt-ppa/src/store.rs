// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Object storage abstraction.

The repository lives entirely in a byte-addressable key/value bucket:
pool objects, per-source metadata, and the published indices. [ObjectStore]
is the narrow interface the rest of the crate consumes; [S3Store] is the
production implementation and [MemoryStore] backs tests and local
experimentation.
*/

use {
    crate::error::{PpaError, Result},
    async_trait::async_trait,
    bytes::Bytes,
    futures::Stream,
    rusoto_core::{HttpClient, Region, RusotoError},
    rusoto_credential::StaticProvider,
    rusoto_s3::{
        DeleteObjectRequest, GetObjectError, GetObjectRequest, ListObjectsV2Request,
        PutObjectRequest, S3Client, S3,
    },
    std::{
        collections::BTreeMap,
        io::ErrorKind,
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    },
    tokio::io::AsyncReadExt,
};

/// An object fetched for relaying, with its transport metadata.
pub struct FetchedObject {
    /// Object content as a byte stream.
    pub body: Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>,
    /// Content type as reported by the store, if any.
    pub content_type: Option<String>,
    /// Content length as reported by the store, if any.
    pub content_length: Option<i64>,
}

/// Byte-addressable key/value storage over a bucket.
///
/// Writes are last-writer-wins per key; `list_prefix` is expected to
/// paginate internally and return the full key set.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object under a key, replacing any existing object.
    ///
    /// An empty `content_type` leaves the content type unset, in which case
    /// the read path relays whatever the store reports.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()>;

    /// Fetch an object's content in full.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Fetch an object as a stream plus transport metadata, for relaying.
    async fn fetch(&self, key: &str) -> Result<FetchedObject>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all keys beginning with a prefix.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Configuration for [S3Store].
#[derive(Clone, Debug)]
pub struct S3Config {
    /// Endpoint URL or hostname. A bare hostname is given an `https://` scheme.
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// [ObjectStore] over an S3-compatible bucket.
pub struct S3Store {
    client: S3Client,
    bucket: String,
}

fn store_err<E: std::fmt::Debug>(key: &str, err: E) -> PpaError {
    PpaError::Store(
        key.to_string(),
        std::io::Error::new(ErrorKind::Other, format!("S3 error: {:?}", err)),
    )
}

impl S3Store {
    /// Create a store bound to a bucket on an S3-compatible endpoint.
    pub fn new(config: S3Config) -> Result<Self> {
        let endpoint = if config.endpoint.starts_with("http://")
            || config.endpoint.starts_with("https://")
        {
            config.endpoint.clone()
        } else {
            format!("https://{}", config.endpoint)
        };

        let region = Region::Custom {
            name: config.region.clone(),
            endpoint,
        };

        let dispatcher = HttpClient::new()
            .map_err(|e| PpaError::StoreInit(format!("creating HTTP client: {}", e)))?;
        let credentials =
            StaticProvider::new_minimal(config.access_key.clone(), config.secret_key.clone());

        Ok(Self {
            client: S3Client::new_with(dispatcher, credentials, region),
            bucket: config.bucket,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            body: Some(data.into()),
            content_type: content_type.map(|ct| ct.to_string()),
            ..Default::default()
        };

        self.client
            .put_object(request)
            .await
            .map_err(|e| store_err(key, e))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            ..Default::default()
        };

        let output = self
            .client
            .get_object(request)
            .await
            .map_err(|e| store_err(key, e))?;

        let body = output
            .body
            .ok_or_else(|| store_err(key, "response has no body"))?;

        let mut data = Vec::new();
        body.into_async_read()
            .read_to_end(&mut data)
            .await
            .map_err(|e| PpaError::Store(key.to_string(), e))?;

        Ok(data)
    }

    async fn fetch(&self, key: &str) -> Result<FetchedObject> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            ..Default::default()
        };

        let output = match self.client.get_object(request).await {
            Ok(output) => output,
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => {
                return Err(PpaError::Store(
                    key.to_string(),
                    std::io::Error::new(ErrorKind::NotFound, "no such key"),
                ));
            }
            Err(e) => return Err(store_err(key, e)),
        };

        let body: Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>> = match output.body {
            Some(stream) => Box::pin(stream),
            None => Box::pin(futures::stream::empty()),
        };

        Ok(FetchedObject {
            body,
            content_type: output.content_type,
            content_length: output.content_length,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let request = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            ..Default::default()
        };

        self.client
            .delete_object(request)
            .await
            .map_err(|e| store_err(key, e))?;

        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let request = ListObjectsV2Request {
                bucket: self.bucket.clone(),
                prefix: Some(prefix.to_string()),
                continuation_token: continuation_token.take(),
                ..Default::default()
            };

            let output = self
                .client
                .list_objects_v2(request)
                .await
                .map_err(|e| store_err(prefix, e))?;

            keys.extend(
                output
                    .contents
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|object| object.key),
            );

            match output.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// In-memory [ObjectStore], used by tests and local experimentation.
///
/// Write and read operations are counted so tests can assert on store
/// traffic (e.g. that an unchanged upstream state performs zero uploads).
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryStore {
    /// Number of `put` operations performed.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `delete` operations performed.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of `get`/`fetch` operations performed.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// All keys currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("object map lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().expect("object map lock poisoned")
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.locked().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(|ct| ct.to_string()),
            },
        );

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.locked()
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| {
                PpaError::Store(
                    key.to_string(),
                    std::io::Error::new(ErrorKind::NotFound, "no such key"),
                )
            })
    }

    async fn fetch(&self, key: &str) -> Result<FetchedObject> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let object = self
            .locked()
            .get(key)
            .cloned()
            .ok_or_else(|| {
                PpaError::Store(
                    key.to_string(),
                    std::io::Error::new(ErrorKind::NotFound, "no such key"),
                )
            })?;

        let content_length = Some(object.data.len() as i64);
        let body = futures::stream::once(async move { Ok(Bytes::from(object.data)) });

        Ok(FetchedObject {
            body: Box::pin(body),
            content_type: object.content_type,
            content_length,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.locked().remove(key);

        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .locked()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() -> Result<()> {
        let store = MemoryStore::default();

        store
            .put("pool/d/discord/discord-1.deb", b"deb".to_vec(), None)
            .await?;
        assert_eq!(store.get("pool/d/discord/discord-1.deb").await?, b"deb");
        assert_eq!(store.writes(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn memory_store_missing_key() {
        let store = MemoryStore::default();

        assert!(matches!(
            store.get("nope").await.unwrap_err(),
            PpaError::Store(key, _) if key == "nope"
        ));
    }

    #[tokio::test]
    async fn memory_store_list_prefix() -> Result<()> {
        let store = MemoryStore::default();
        store.put("meta/a/state", vec![1], None).await?;
        store.put("meta/a/packages-entry", vec![2], None).await?;
        store.put("pool/a/x/x-1.deb", vec![3], None).await?;

        let keys = store.list_prefix("meta/").await?;
        assert_eq!(keys, vec!["meta/a/packages-entry", "meta/a/state"]);

        Ok(())
    }

    #[tokio::test]
    async fn memory_store_delete_missing_is_ok() -> Result<()> {
        let store = MemoryStore::default();
        store.delete("absent").await?;
        assert_eq!(store.deletes(), 1);

        Ok(())
    }
}
