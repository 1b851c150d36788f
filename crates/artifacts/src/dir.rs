use crate::ArtifactError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Create the output directory (and parents) if it does not exist yet.
pub async fn ensure_output_dir(dir: &Path) -> Result<(), ArtifactError> {
    if dir.as_os_str().is_empty() {
        return Err(ArtifactError::InvalidOutputDir(
            "output directory is empty".to_string(),
        ));
    }

    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ArtifactError::InvalidOutputDir(format!(
            "{} exists and is not a directory",
            dir.display()
        ))),
        Err(_) => {
            tokio::fs::create_dir_all(dir).await?;
            Ok(())
        }
    }
}

/// Turn a task name into something safe to use as a file name stem.
pub(crate) fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.replace("..", "_");
    if cleaned.is_empty() {
        "task".to_string()
    } else {
        cleaned
    }
}

/// Write `data` to `dir/file_name` via a temp file and rename.
///
/// The temp file is removed again if any step fails.
pub(crate) async fn write_atomic(
    dir: &Path,
    file_name: &str,
    data: &[u8],
) -> Result<PathBuf, ArtifactError> {
    let target = dir.join(file_name);
    let temp = dir.join(format!(".{}.tmp", file_name));

    if let Err(e) = write_then_rename(&temp, &target, data).await {
        if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
            debug!(path = %temp.display(), error = %cleanup, "Temp file not removed");
        }
        return Err(e.into());
    }
    Ok(target)
}

async fn write_then_rename(temp: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(temp).await?;
    file.write_all(data).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(temp, target).await
}
