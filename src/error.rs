use thiserror::Error;

#[derive(Error, Debug)]
pub enum FatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FAT32 volume: {0}")]
    Format(String),

    #[error(
        "cluster chain ended early: wanted {requested} bytes at offset {offset}, got {available}"
    )]
    Bounds {
        offset: u64,
        requested: usize,
        available: usize,
    },
}

impl FatError {
    /// Map a failed `read_exact` on a header structure: a short read means the
    /// structure is truncated, anything else is a real I/O failure.
    pub(crate) fn from_header_read(what: &str, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FatError::Format(format!("cannot read {what}: {e}"))
        } else {
            FatError::Io(e)
        }
    }
}
