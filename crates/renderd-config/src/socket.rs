use std::fs::DirBuilder;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Ensures the socket's parent directory exists, creating missing
/// directories with owner-only permissions.
///
/// # Errors
///
/// Returns [`SocketPreparationError`] when the path has no parent directory
/// or the directory cannot be created.
pub fn prepare_socket_directory(path: &Utf8Path) -> Result<(), SocketPreparationError> {
    let Some(parent) = path.parent() else {
        return Err(SocketPreparationError::MissingParent {
            path: path.to_path_buf(),
        });
    };
    if parent.as_str().is_empty() || parent.is_dir() {
        return Ok(());
    }

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    if let Err(source) = builder.create(parent.as_std_path())
        && source.kind() != std::io::ErrorKind::AlreadyExists
    {
        return Err(SocketPreparationError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        });
    }

    Ok(())
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent component.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Socket path that lacked a parent.
        path: Utf8PathBuf,
    },
    /// Failed to create the socket directory.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let socket = root.join("nested/deeper/server.socket");

        prepare_socket_directory(&socket).expect("prepare socket directory");
        assert!(root.join("nested/deeper").is_dir());
    }

    #[cfg(unix)]
    #[rstest]
    fn new_directories_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let socket = root.join("private/server.socket");

        prepare_socket_directory(&socket).expect("prepare socket directory");
        let mode = std::fs::metadata(root.join("private"))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[rstest]
    fn rejects_root_path() {
        let error = prepare_socket_directory(Utf8Path::new("/"))
            .expect_err("root has no parent");
        assert!(matches!(error, SocketPreparationError::MissingParent { .. }));
    }
}
