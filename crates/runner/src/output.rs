use database::ResultRow;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// `<output_dir>/result_query_<index>.txt`
pub fn result_file_path(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("result_query_{index}.txt"))
}

/// Creates (or truncates) `path` and writes one rendered row per line.
pub async fn write_result_file(path: &Path, rows: &[ResultRow]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path).await?);
    for row in rows {
        writer.write_all(format!("{row}\n").as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}
