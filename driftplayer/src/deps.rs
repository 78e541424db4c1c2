//! Startup check for the external binaries

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const FFPLAY_HINT: &str = "Please install FFmpeg: sudo apt install ffmpeg";
const YTDLP_HINT: &str = "Please install yt-dlp: sudo curl -L https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp -o /usr/local/bin/yt-dlp && sudo chmod a+rx /usr/local/bin/yt-dlp";

/// Locates `binary` the way a shell would
///
/// Names containing a path separator are checked as given, bare names are
/// searched in every `PATH` entry.
pub fn find_binary(binary: &str) -> Option<PathBuf> {
    if binary.is_empty() {
        return None;
    }

    let as_path = Path::new(binary);
    if as_path.components().count() > 1 {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Fails with an installation hint when the player or the resolver is missing
pub fn check_dependencies(player: &str, resolver: &str) -> Result<()> {
    if find_binary(player).is_none() {
        return Err(Error::missing_dependency(player, FFPLAY_HINT));
    }
    if find_binary(resolver).is_none() {
        return Err(Error::missing_dependency(resolver, YTDLP_HINT));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_find_binary_on_path() {
        assert!(find_binary("sh").is_some());
        assert!(find_binary("definitely-not-installed-drift").is_none());
        assert!(find_binary("").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_explicit_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("player");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(find_binary(script.to_str().unwrap()).is_none());

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_binary(script.to_str().unwrap()), Some(script));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_dependencies() {
        assert!(check_dependencies("sh", "sh").is_ok());

        match check_dependencies("no-such-player", "sh") {
            Err(Error::MissingDependency { binary, hint }) => {
                assert_eq!(binary, "no-such-player");
                assert!(hint.contains("ffmpeg"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        match check_dependencies("sh", "no-such-resolver") {
            Err(Error::MissingDependency { binary, hint }) => {
                assert_eq!(binary, "no-such-resolver");
                assert!(hint.contains("yt-dlp"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
