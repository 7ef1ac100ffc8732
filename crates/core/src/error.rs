use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BidsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("dataset directory not found: {}", .0.display())]
    DatasetNotFound(PathBuf),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed to read directory {path}: {source}", path = path.display())]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk dataset tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(
        "failed to rename {from} to {to}: {source}",
        from = from.display(),
        to = to.display()
    )]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "cannot rename {from} to {to}: destination already exists",
        from = from.display(),
        to = to.display()
    )]
    DestinationExists { from: PathBuf, to: PathBuf },
    #[error("unsupported dataset layout: {0}")]
    UnsupportedLayout(String),
    #[error("failed to write {path}: {source}", path = path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sidecar error: {0}")]
    Sidecar(#[from] bids_sidecar::SidecarError),
    #[error("failed to read header of {path}: {source}", path = path.display())]
    HeaderRead {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("invalid acquisition date '{0}' (expected YYYYMMDD)")]
    InvalidAcquisitionDate(String),
    #[error("invalid label: {0}")]
    Label(#[from] bids_types::LabelError),
    #[error("invalid filename pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("unrecognised operation '{0}'")]
    UnknownOperation(String),
}

pub type BidsResult<T> = std::result::Result<T, BidsError>;
