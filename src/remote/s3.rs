//! `s3://` remote backend.
//!
//! Conditional downloads via an `.etag` sidecar file and `If-None-Match`,
//! uploads via a plain put, listing via a paginated `ListObjectsV2`
//! filtered to `.db` keys.

use aws_sdk_s3::primitives::ByteStream;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::{EngineError, Result};
use crate::remote::RemoteKey;

pub struct S3Backend {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3Backend {
    /// `rest` is the part of the URL after `s3://`: `bucket/optional/prefix`.
    pub async fn connect(rest: &str) -> Result<Self> {
        let mut parts = rest.splitn(2, '/');
        let bucket = parts
            .next()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| EngineError::InvalidArgument(format!("empty S3 bucket in s3://{rest}")))?
            .to_string();
        let prefix = match parts.next() {
            Some(p) if !p.is_empty() => format!("{}/", p.trim_end_matches('/')),
            _ => String::new(),
        };

        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_s3::Client::new(&config);
        Ok(Self { client, bucket, prefix })
    }

    fn key(&self, remote_key: &str) -> String {
        format!("{}{}", self.prefix, remote_key.trim_start_matches('/'))
    }

    pub async fn upload(&self, local_path: &std::path::Path, remote_key: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(remote_key))
            .body(body)
            .send()
            .await
            .map_err(|e| EngineError::AuthError { message: e.to_string() })?;
        Ok(())
    }

    pub async fn download(&self, remote_key: &str, local_path: &std::path::Path) -> Result<bool> {
        let s3_key = self.key(remote_key);
        let etag_path = etag_sidecar(local_path);

        let cached_etag = if etag_path.exists() && local_path.exists() {
            tokio::fs::read_to_string(&etag_path).await.ok().map(|s| s.trim().to_string())
        } else {
            None
        };

        let mut request = self.client.get_object().bucket(&self.bucket).key(&s3_key);
        if let Some(etag) = &cached_etag {
            request = request.if_none_match(etag);
        }

        let output = match request.send().await {
            Ok(output) => output,
            Err(err) => {
                if is_not_modified(&err) {
                    return Ok(false);
                }
                return Err(classify_get_error(err, &s3_key));
            }
        };

        let new_etag = output.e_tag().map(|s| s.to_string());
        let mut body = output.body.into_async_read();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local_path).await?;
        tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        if let Some(etag) = new_etag {
            tokio::fs::write(&etag_path, etag).await?;
        }

        Ok(true)
    }

    pub async fn list_baselines(&self, prefix: &str) -> Result<Vec<RemoteKey>> {
        let full_prefix = format!("{}{}", self.prefix, prefix);
        let mut keys = Vec::new();

        let mut stream = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&full_prefix)
            .into_paginator()
            .send();

        while let Some(page) = stream.next().await {
            let page = page.map_err(|e| EngineError::AuthError { message: e.to_string() })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    if key.ends_with(".db") {
                        keys.push(RemoteKey(key.to_string()));
                    }
                }
            }
        }

        Ok(keys)
    }
}

fn etag_sidecar(local_path: &std::path::Path) -> std::path::PathBuf {
    let mut name = local_path.file_name().unwrap_or_default().to_os_string();
    name.push(".etag");
    local_path.with_file_name(name)
}

/// A conditional GET that matched the cached ETag comes back as a `304`
/// service error, not a successful response — this is the cache-hit path,
/// not a failure.
fn is_not_modified<E, R>(err: &aws_sdk_s3::error::SdkError<E, R>) -> bool {
    use aws_sdk_s3::error::SdkError;
    matches!(err, SdkError::ServiceError(ctx) if ctx.raw().status().as_u16() == 304)
}

fn classify_get_error<E, R>(err: aws_sdk_s3::error::SdkError<E, R>, s3_key: &str) -> EngineError
where
    E: std::fmt::Debug + std::fmt::Display,
{
    use aws_sdk_s3::error::SdkError;
    match &err {
        SdkError::ServiceError(ctx) => {
            let raw_status = ctx.raw().status().as_u16();
            if raw_status == 404 {
                return EngineError::NotFound { key: s3_key.to_string() };
            }
            if raw_status == 403 {
                return EngineError::AuthError { message: ctx.err().to_string() };
            }
            EngineError::AuthError { message: ctx.err().to_string() }
        }
        _ => EngineError::AuthError { message: err.to_string() },
    }
}
