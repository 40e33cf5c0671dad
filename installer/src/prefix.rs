//! Installation prefix selection and the previous-prefix marker.
//!
//! The marker is a one-line file in the core build tree recording the prefix
//! the tree was last configured for. It is read at session start and
//! overwritten at the start of every run, before anything is built.

use crate::error::{EXIT_USER_ABORT, InstallerError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// File name of the previous-prefix marker.
pub const MARKER_FILE: &str = ".prefix.txt";

/// Exit code used when an interrupt arrives outside a prompt.
pub const EXIT_INTERRUPTED: i32 = 130;

static ACTIVE_PROMPTS: AtomicUsize = AtomicUsize::new(0);

/// The one-line previous-prefix marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMarker {
    path: Utf8PathBuf,
}

impl PrefixMarker {
    /// The marker inside `build_dir`.
    #[must_use]
    pub fn new(build_dir: &Utf8Path) -> Self {
        Self {
            path: build_dir.join(MARKER_FILE),
        }
    }

    /// Location of the marker file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The recorded prefix, if the marker exists and is not blank.
    #[must_use]
    pub fn read(&self) -> Option<Utf8PathBuf> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let prefix = contents.trim();
                (!prefix.is_empty()).then(|| Utf8PathBuf::from(prefix))
            }
            Err(err) => {
                debug!("no previous prefix at {}: {err}", self.path);
                None
            }
        }
    }

    /// Record `prefix`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::MarkerWrite`] if the file cannot be written.
    pub fn write(&self, prefix: &Utf8Path) -> Result<()> {
        std::fs::write(&self.path, prefix.as_str()).map_err(|source| InstallerError::MarkerWrite {
            path: self.path.clone(),
            source,
        })
    }
}

/// Check that `input` is usable as an installation prefix.
///
/// # Errors
///
/// Returns [`InstallerError::InvalidPrefix`] if the path is relative or
/// contains whitespace.
///
/// # Examples
///
/// ```
/// use ree_installer::prefix::validate_prefix;
///
/// assert!(validate_prefix("/opt/ruby").is_ok());
/// assert!(validate_prefix("opt/ruby").is_err());
/// assert!(validate_prefix("/opt/my ruby").is_err());
/// ```
pub fn validate_prefix(input: &str) -> Result<Utf8PathBuf> {
    let reason = if !input.starts_with('/') {
        Some("please specify an absolute directory")
    } else if input.chars().any(char::is_whitespace) {
        Some("the directory name may not contain spaces")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(InstallerError::InvalidPrefix {
            input: input.to_owned(),
            reason,
        }),
        None => Ok(Utf8PathBuf::from(input)),
    }
}

/// Ask for the installation prefix until a valid one is entered.
///
/// An empty answer accepts `default`.
///
/// # Errors
///
/// Returns [`InstallerError::UserAbort`] when input ends, or an I/O error if
/// the terminal cannot be read or written.
pub fn query_prefix(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    default: &Utf8Path,
) -> Result<Utf8PathBuf> {
    let _guard = PromptGuard::activate();
    loop {
        write!(output, "[{default}] : ")?;
        output.flush()?;
        let answer = read_answer(input)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(default.to_owned());
        }
        match validate_prefix(answer) {
            Ok(prefix) => return Ok(prefix),
            Err(InstallerError::InvalidPrefix { reason, .. }) => {
                writeln!(output, "{}", capitalize(reason))?;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Block until the user presses Enter.
///
/// # Errors
///
/// Returns [`InstallerError::UserAbort`] when input ends.
pub fn wait_for_enter(input: &mut dyn BufRead) -> Result<()> {
    let _guard = PromptGuard::activate();
    read_answer(input).map(|_| ())
}

fn read_answer(input: &mut dyn BufRead) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(InstallerError::UserAbort);
    }
    Ok(line)
}

fn capitalize(sentence: &str) -> String {
    let mut chars = sentence.chars();
    chars.next().map_or_else(String::new, |first| {
        format!("{}{}.", first.to_uppercase(), chars.as_str())
    })
}

/// Marks an interactive prompt as active for its lifetime.
#[derive(Debug)]
pub struct PromptGuard {
    _private: (),
}

impl PromptGuard {
    /// Mark a prompt active until the guard is dropped.
    #[must_use]
    pub fn activate() -> Self {
        ACTIVE_PROMPTS.fetch_add(1, Ordering::SeqCst);
        Self { _private: () }
    }
}

impl Drop for PromptGuard {
    fn drop(&mut self) {
        ACTIVE_PROMPTS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Whether a prompt is waiting for input.
#[must_use]
pub fn prompt_active() -> bool {
    ACTIVE_PROMPTS.load(Ordering::SeqCst) > 0
}

/// Exit code for an interrupt received now.
#[must_use]
pub fn interrupt_exit_code() -> i32 {
    if prompt_active() {
        EXIT_USER_ABORT
    } else {
        EXIT_INTERRUPTED
    }
}

/// Exit the process on Ctrl-C.
///
/// Interrupting a prompt exits with [`EXIT_USER_ABORT`]. A running build
/// command receives the same interrupt and handles it itself.
///
/// # Errors
///
/// Returns an I/O error if a handler is already installed.
pub fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| std::process::exit(interrupt_exit_code()))
        .map_err(|err| InstallerError::Io(std::io::Error::other(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn marker() -> (TempDir, PrefixMarker) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let build = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp dir not UTF-8");
        (dir, PrefixMarker::new(&build))
    }

    #[test]
    fn marker_round_trips_prefix() {
        let (_guard, marker) = marker();
        assert_eq!(marker.read(), None);
        marker.write(Utf8Path::new("/opt/x")).expect("write marker");
        assert_eq!(marker.read(), Some(Utf8PathBuf::from("/opt/x")));
        marker.write(Utf8Path::new("/opt/y")).expect("overwrite marker");
        assert_eq!(
            std::fs::read_to_string(marker.path()).expect("read marker"),
            "/opt/y"
        );
    }

    #[test]
    fn blank_marker_is_ignored() {
        let (_guard, marker) = marker();
        std::fs::write(marker.path(), "  \n").expect("write marker");
        assert_eq!(marker.read(), None);
    }

    #[test]
    fn marker_write_failure_names_the_file() {
        let marker = PrefixMarker::new(Utf8Path::new("/nonexistent/source"));
        let err = marker
            .write(Utf8Path::new("/opt/x"))
            .expect_err("write should fail");
        assert!(err.to_string().contains("/nonexistent/source/.prefix.txt"));
    }

    #[rstest]
    #[case::relative("opt/x", "absolute")]
    #[case::spaces("/opt/my ruby", "spaces")]
    #[case::tab("/opt/my\truby", "spaces")]
    fn invalid_prefixes_are_rejected(#[case] input: &str, #[case] reason: &str) {
        let err = validate_prefix(input).expect_err("prefix should be rejected");
        assert!(err.to_string().contains(reason));
    }

    #[test]
    fn empty_answer_accepts_default() {
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();
        let prefix = query_prefix(&mut input, &mut output, Utf8Path::new("/opt/default"))
            .expect("query should succeed");
        assert_eq!(prefix, "/opt/default");
        assert_eq!(String::from_utf8_lossy(&output), "[/opt/default] : ");
    }

    #[test]
    fn invalid_answers_are_asked_again() {
        let mut input = Cursor::new("relative\n/opt/with space\n  /opt/ok  \n");
        let mut output = Vec::new();
        let prefix = query_prefix(&mut input, &mut output, Utf8Path::new("/opt/default"))
            .expect("query should succeed");

        assert_eq!(prefix, "/opt/ok");
        let transcript = String::from_utf8_lossy(&output);
        assert!(transcript.contains("Please specify an absolute directory."));
        assert!(transcript.contains("The directory name may not contain spaces."));
        assert_eq!(transcript.matches("[/opt/default] : ").count(), 3);
    }

    #[test]
    fn end_of_input_aborts() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        let err = query_prefix(&mut input, &mut output, Utf8Path::new("/opt/default"))
            .expect_err("EOF should abort");
        assert!(matches!(err, InstallerError::UserAbort));
        assert!(matches!(
            wait_for_enter(&mut Cursor::new("")),
            Err(InstallerError::UserAbort)
        ));
    }

    #[test]
    fn interrupting_a_prompt_is_a_user_abort() {
        let outer = PromptGuard::activate();
        {
            let _inner = PromptGuard::activate();
            assert_eq!(interrupt_exit_code(), EXIT_USER_ABORT);
        }
        assert!(prompt_active());
        drop(outer);
    }
}
