use core::{error::Error, time::Duration};
use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::Path,
};

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    Client,
    config::Credentials,
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart, Object},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::Progress;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::{ObjectStore, RemoteObject, TransferError, newest_first};

/// S3 rejects multipart uploads whose non-final parts are smaller than this.
pub const MIN_PART_BYTES: u64 = 1024 * 1024 * 5; // 5 MiB

/// Connection settings for an S3 compatible bucket.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Config {
    /// Custom endpoint, for S3 compatible stores other than AWS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// The bucket's region.
    pub region: String,

    /// The bucket to store archives in.
    pub bucket: String,

    /// The access key id.
    pub access_key_id: String,

    /// The access key secret.
    pub access_key_secret: String,

    /// Address the bucket in the URL path instead of the host name.
    pub force_path_style: bool,

    /// How long signed download URLs stay valid.
    pub url_expiry_seconds: u64,

    /// Archives larger than this are uploaded in parts of this size.
    pub multipart_chunk_bytes: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            force_path_style: false,
            url_expiry_seconds: 60 * 60 * 24,
            multipart_chunk_bytes: 1024 * 1024 * 8, // 8 MiB
        }
    }
}

/// An [`ObjectStore`] backed by an S3 compatible bucket.
///
/// The SDK is async, each operation is driven to completion on a private current thread runtime
/// so callers stay synchronous.
pub struct S3Store {
    client: Client,
    bucket: String,
    url_expiry: Duration,
    chunk_bytes: u64,
    runtime: Runtime,
}

impl S3Store {
    /// Build a client from `config`.
    pub fn connect(config: &S3Config) -> Result<Self, TransferError> {
        let runtime = create_runtime()?;

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.access_key_secret.clone(),
            None,
            None,
            "vault-backup",
        );

        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .credentials_provider(credentials)
                .load(),
        );

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let chunk_bytes = if config.multipart_chunk_bytes < MIN_PART_BYTES {
            warn!(
                "multipart_chunk_bytes {} is below the 5 MiB part minimum, using {MIN_PART_BYTES}",
                config.multipart_chunk_bytes
            );
            MIN_PART_BYTES
        } else {
            config.multipart_chunk_bytes
        };

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            url_expiry: Duration::from_secs(config.url_expiry_seconds),
            chunk_bytes,
            runtime,
        })
    }

    /// Wrap an existing client.
    ///
    /// `chunk_bytes` is used as given, stores other than S3 may accept smaller parts.
    pub fn from_client(
        client: Client,
        bucket: String,
        url_expiry: Duration,
        chunk_bytes: u64,
    ) -> Result<Self, TransferError> {
        Ok(Self {
            client,
            bucket,
            url_expiry,
            chunk_bytes: chunk_bytes.max(1),
            runtime: create_runtime()?,
        })
    }

    /// A signed URL to `GET` the object `key`, valid for the configured expiry.
    pub fn signed_url(&self, key: &str) -> Result<String, TransferError> {
        let presigning = PresigningConfig::expires_in(self.url_expiry).map_err(|e| {
            TransferError::Presign {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;

        let request = self
            .runtime
            .block_on(
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(presigning),
            )
            .map_err(|e| TransferError::Presign {
                key: key.to_string(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        Ok(request.uri().to_string())
    }

    fn put_object(&self, key: &str, body: &mut dyn Read, len: u64) -> Result<(), TransferError> {
        let data = read_chunk(body, len)?;

        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(data))
                    .send(),
            )
            .map_err(request_failure("upload", key))?;

        Ok(())
    }

    fn multipart_upload(
        &self,
        key: &str,
        body: &mut dyn Read,
        len: u64,
        progress: &mut Option<&mut dyn Progress>,
    ) -> Result<(), TransferError> {
        let created = self
            .runtime
            .block_on(
                self.client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .send(),
            )
            .map_err(request_failure("start multipart upload of", key))?;

        let upload_id = match created.upload_id() {
            Some(upload_id) => upload_id.to_string(),
            None => {
                return Err(TransferError::MissingField {
                    action: "start multipart upload of",
                    key: key.to_string(),
                    field: "upload id",
                });
            }
        };

        let parts = match self.upload_parts(key, &upload_id, body, len, progress) {
            Ok(parts) => parts,
            Err(error) => {
                let aborted = self.runtime.block_on(
                    self.client
                        .abort_multipart_upload()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(&upload_id)
                        .send(),
                );
                if let Err(abort_error) = aborted {
                    warn!(
                        "Could not abort multipart upload of '{key}': {}",
                        DisplayErrorContext(abort_error)
                    );
                }

                return Err(error);
            }
        };

        self.runtime
            .block_on(
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send(),
            )
            .map_err(request_failure("complete multipart upload of", key))?;

        Ok(())
    }

    fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        body: &mut dyn Read,
        len: u64,
        progress: &mut Option<&mut dyn Progress>,
    ) -> Result<Vec<CompletedPart>, TransferError> {
        let mut parts = Vec::new();
        let mut sent: u64 = 0;
        let mut part_number: i32 = 1;

        while sent < len {
            let chunk = read_chunk(body, self.chunk_bytes.min(len - sent))?;
            let chunk_len = u64::try_from(chunk.len()).unwrap_or(u64::MAX);

            let uploaded = self
                .runtime
                .block_on(
                    self.client
                        .upload_part()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(chunk))
                        .send(),
                )
                .map_err(request_failure("upload part of", key))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(ToOwned::to_owned))
                    .part_number(part_number)
                    .build(),
            );
            debug!("Uploaded part {part_number} of '{key}'");

            sent += chunk_len;
            part_number += 1;
            if let Some(progress) = progress.as_deref_mut() {
                progress.update(sent, len);
            }
        }

        Ok(parts)
    }
}

impl ObjectStore for S3Store {
    fn upload(
        &self,
        key: &str,
        body: &mut dyn Read,
        len: u64,
        mut progress: Option<&mut dyn Progress>,
    ) -> Result<String, TransferError> {
        if len <= self.chunk_bytes {
            self.put_object(key, body, len)?;
            if let Some(progress) = progress.as_deref_mut() {
                progress.update(len, len);
            }
        } else {
            self.multipart_upload(key, body, len, &mut progress)?;
        }
        info!("Uploaded {len} bytes to '{key}'");

        self.signed_url(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransferError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self
                .runtime
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(prefix)
                        .set_continuation_token(continuation_token.take())
                        .send(),
                )
                .map_err(request_failure("list objects under", prefix))?;

            objects.extend(page.contents().iter().filter_map(remote_object));

            match (page.is_truncated(), page.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!("Found {} objects under '{prefix}'", objects.len());
        Ok(newest_first(objects))
    }

    fn download(&self, key: &str, local_path: &Path) -> Result<(), TransferError> {
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|source| TransferError::Io {
                source,
                action: "create directory",
                path: parent.to_path_buf(),
            })?;
        }

        let write_failure = |source: io::Error| TransferError::Io {
            source,
            action: "write download to",
            path: local_path.to_path_buf(),
        };

        self.runtime.block_on(async {
            let mut output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(request_failure("download", key))?;

            let mut file = File::create(local_path).map_err(write_failure)?;
            while let Some(chunk) = output
                .body
                .try_next()
                .await
                .map_err(request_failure("read the body of", key))?
            {
                file.write_all(&chunk).map_err(write_failure)?;
            }
            file.flush().map_err(write_failure)?;

            Ok::<(), TransferError>(())
        })
    }
}

fn create_runtime() -> Result<Runtime, TransferError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(TransferError::Runtime)
}

/// Read exactly `len` bytes from `body`.
fn read_chunk(body: &mut dyn Read, len: u64) -> Result<Vec<u8>, TransferError> {
    let mut chunk = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    Read::take(&mut *body, len)
        .read_to_end(&mut chunk)
        .map_err(TransferError::ReadBody)?;

    if u64::try_from(chunk.len()).unwrap_or(u64::MAX) < len {
        return Err(TransferError::ReadBody(io::Error::from(
            io::ErrorKind::UnexpectedEof,
        )));
    }

    Ok(chunk)
}

fn request_failure<E: Error>(
    action: &'static str,
    key: &str,
) -> impl FnOnce(E) -> TransferError {
    let key = key.to_string();
    move |error| TransferError::Request {
        action,
        key,
        message: DisplayErrorContext(error).to_string(),
    }
}

fn remote_object(object: &Object) -> Option<RemoteObject> {
    let key = object.key()?.to_string();
    let last_modified = object
        .last_modified()
        .and_then(|modified| DateTime::<Utc>::from_timestamp(modified.secs(), modified.subsec_nanos()))
        .unwrap_or_default();
    let size = object
        .size()
        .and_then(|size| u64::try_from(size).ok())
        .unwrap_or(0);

    Some(RemoteObject {
        key,
        last_modified,
        size,
    })
}
