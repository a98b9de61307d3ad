use crate::error::CollectorError;
use log::info;
use std::io;
use std::path::Path;

pub async fn ensure_data_dir_exists(path: &Path) -> Result<(), CollectorError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(CollectorError::DataDirNotADirectory(path.to_path_buf()));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating data directory: {}", path.display());
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| CollectorError::DataDirCreation(path.to_path_buf(), e))
        }
        Err(e) => Err(CollectorError::DataDirCreation(path.to_path_buf(), e)),
    }
}
