use std::fs::DirBuilder;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Permission bits applied to a control socket directory created on demand.
pub const SOCKET_DIRECTORY_MODE: u32 = 0o750;

/// Ensures the control socket's parent directory exists.
///
/// Missing directories are created with [`SOCKET_DIRECTORY_MODE`]; existing
/// directories are left untouched.
pub fn prepare_socket_directory(socket: &Utf8Path) -> Result<(), SocketPreparationError> {
    let Some(parent) = socket.parent().filter(|parent| !parent.as_str().is_empty()) else {
        return Err(SocketPreparationError::MissingParent {
            path: socket.to_path_buf(),
        });
    };

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(SOCKET_DIRECTORY_MODE);
    }

    if let Err(source) = builder.create(parent.as_std_path())
        && source.kind() != io::ErrorKind::AlreadyExists
    {
        return Err(SocketPreparationError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Errors raised while preparing the control socket directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent component.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// The directory could not be created.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path).expect("temporary path should be UTF-8")
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = utf8(dir.path().join("nested").join("ctl.sock"));
        prepare_socket_directory(&socket).expect("directory should be created");
        let parent = socket.parent().expect("socket has parent");
        assert!(parent.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(parent)
                .expect("metadata")
                .permissions()
                .mode();
            assert_eq!(
                mode & 0o777 & !SOCKET_DIRECTORY_MODE,
                0,
                "directory mode {mode:o} exceeds {SOCKET_DIRECTORY_MODE:o}"
            );
        }
    }

    #[test]
    fn rejects_bare_file_name() {
        let error = prepare_socket_directory(Utf8Path::new("ctl.sock"))
            .expect_err("bare names have no parent");
        assert!(matches!(error, SocketPreparationError::MissingParent { .. }));
    }
}
