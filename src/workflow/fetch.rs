use super::payload::{RemoteInput, ValidationError};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Download every input into `input_dir`, returning the stored file names in
/// order. On the first failure, files already written for this call are
/// removed and the failing request field is reported.
pub async fn fetch_inputs(
    client: &Client,
    inputs: &[RemoteInput],
    input_dir: &Path,
) -> Result<Vec<String>, ValidationError> {
    let mut fetched = vec![];

    for input in inputs {
        let target_path = input_dir.join(&input.file_name);

        match fetch_one(client, input, &target_path).await {
            Ok(size) => {
                tracing::debug!("fetched {} ({} bytes)", target_path.display(), size);
                fetched.push(input.file_name.clone());
            }
            Err(e) => {
                tracing::warn!("failed to fetch {}: {}", input.url, e);
                remove_quietly(&target_path).await;
                for name in &fetched {
                    remove_quietly(&input_dir.join(name)).await;
                }
                return Err(ValidationError::new(
                    input.field,
                    format!("failed to download {}: {}", input.url, e),
                ));
            }
        }
    }

    Ok(fetched)
}

async fn fetch_one(
    client: &Client,
    input: &RemoteInput,
    target_path: &Path,
) -> Result<u64, FetchError> {
    let res = client.get(input.url.clone()).send().await?;
    if !res.status().is_success() {
        return Err(FetchError::Status(res.status()));
    }

    let write_error = |source| FetchError::Write {
        path: target_path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(target_path)
        .await
        .map_err(write_error)?;
    let mut downloaded: u64 = 0;
    let mut stream = res.bytes_stream();

    while let Some(item) = stream.next().await {
        let chunk = item?;
        file.write_all(&chunk).await.map_err(write_error)?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(write_error)?;

    Ok(downloaded)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!("cleanup of {} skipped: {}", path.display(), e);
    }
}
