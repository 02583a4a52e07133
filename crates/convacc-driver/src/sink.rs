//! Result files
//!
//! Results are dumped as a flat sequence of native-endian `f32`, one 32-bit
//! float per element with no header, so they can be diffed or loaded with
//! `numpy.fromfile(path, dtype=np.float32)` on the same machine.

use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for a finished result vector.
pub trait ResultSink {
    /// Persist `values`.
    ///
    /// # Errors
    ///
    /// Returns an error if the values cannot be written.
    fn persist(&mut self, values: &[f32]) -> Result<()>;
}

/// Writes each persisted vector to a file, replacing earlier contents.
#[derive(Debug, Clone)]
pub struct BinaryFileSink {
    path: PathBuf,
}

impl BinaryFileSink {
    /// Sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for BinaryFileSink {
    fn persist(&mut self, values: &[f32]) -> Result<()> {
        let mut out = BufWriter::new(File::create(&self.path)?);
        out.write_all(bytemuck::cast_slice(values))?;
        out.flush()?;
        debug!("Wrote {} values to {}", values.len(), self.path.display());
        Ok(())
    }
}

/// Load a file written by [`BinaryFileSink`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or its length is not a whole
/// number of `f32`.
pub fn read_f32_file(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path.as_ref())?;
    let width = std::mem::size_of::<f32>();
    if bytes.len() % width != 0 {
        let reason = format!(
            "{} is {} bytes, not a multiple of {width}",
            path.as_ref().display(),
            bytes.len()
        );
        return Err(std::io::Error::new(ErrorKind::InvalidData, reason).into());
    }
    let mut values = vec![0.0f32; bytes.len() / width];
    bytemuck::cast_slice_mut::<f32, u8>(&mut values).copy_from_slice(&bytes);
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvError;
    use tempfile::TempDir;

    #[test]
    fn file_holds_raw_floats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.bin");
        let values = [1.5f32, -0.0, f32::MAX, 3.25e-7];

        let mut sink = BinaryFileSink::new(&path);
        sink.persist(&values).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &1.5f32.to_ne_bytes());

        let back = read_f32_file(&path).unwrap();
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&back), bits(&values));
    }

    #[test]
    fn persist_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let mut sink = BinaryFileSink::new(dir.path().join("out.bin"));
        sink.persist(&[1.0; 8]).unwrap();
        sink.persist(&[2.0; 2]).unwrap();
        assert_eq!(read_f32_file(sink.path()).unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn empty_vector_gives_empty_file() {
        let dir = TempDir::new().unwrap();
        let mut sink = BinaryFileSink::new(dir.path().join("empty.bin"));
        sink.persist(&[]).unwrap();
        assert!(read_f32_file(sink.path()).unwrap().is_empty());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [0u8; 6]).unwrap();
        let err = read_f32_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ConvError::Io { ref source } if source.kind() == ErrorKind::InvalidData
        ));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let mut sink = BinaryFileSink::new(dir.path().join("no/such/dir/x.bin"));
        assert!(matches!(sink.persist(&[1.0]), Err(ConvError::Io { .. })));
    }
}
