use crate::workflow::store::WorkflowFormat;
use std::path::Path;

/// Guess the exchange format from a file extension. Anything that is not
/// `.yaml`/`.yml` is treated as JSON.
pub fn format_for_path(path: &Path) -> WorkflowFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("yaml") | Some("yml") => WorkflowFormat::Yaml,
        _ => WorkflowFormat::Json,
    }
}

/// Read an exported workflow file, returning its text and detected format.
pub async fn read_import_file(path: &Path) -> anyhow::Result<(String, WorkflowFormat)> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok((content, format_for_path(path)))
}

/// Write an exported workflow to disk, creating parent directories.
pub async fn write_export_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
