//! Post-install filesystem fixups.
//!
//! Scripts installed under `bin` may name the runtime through whatever
//! interpreter path the build happened to see. [`rewrite_shebangs`] points
//! them at the installed runtime. [`normalize_permissions`] makes the
//! installed tree readable by everyone and writable only by its owner.
//!
//! Per-file failures are logged and collected in the [`FixupReport`]; they
//! never abort the installation.

use crate::context::InstallationContext;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::fs::PermissionsExt;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// A file a fixup could not be applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixupFailure {
    /// The file.
    pub path: Utf8PathBuf,
    /// What went wrong.
    pub reason: String,
}

/// Outcome of the post-install fixups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixupReport {
    /// Scripts whose shebang line was rewritten.
    pub rewritten: Vec<Utf8PathBuf>,
    /// Number of entries whose permissions changed.
    pub permissions_changed: usize,
    /// Files that could not be fixed.
    pub failures: Vec<FixupFailure>,
}

impl FixupReport {
    fn fail(&mut self, path: &Utf8Path, reason: &dyn std::fmt::Display) {
        let reason = reason.to_string();
        warn!("cannot fix up {path}: {reason}");
        self.failures.push(FixupFailure {
            path: path.to_owned(),
            reason,
        });
    }
}

/// Run every fixup against the staged prefix of `context`.
#[must_use]
pub fn apply_fixups(context: &InstallationContext, runtime: &str) -> FixupReport {
    let mut report = FixupReport::default();
    let interpreter = context.prefix().join("bin").join(runtime);
    rewrite_shebangs(
        &context.installed_bin_dir(),
        runtime,
        &interpreter,
        &mut report,
    );
    normalize_permissions(&context.staged_prefix(), &mut report);
    report
}

/// Whether a shebang line invokes `runtime`, directly or through `env`.
///
/// # Examples
///
/// ```
/// use ree_installer::fixup::shebang_references;
///
/// assert!(shebang_references("#!/usr/local/bin/ruby", "ruby"));
/// assert!(shebang_references("#!/usr/bin/env ruby -w", "ruby"));
/// assert!(!shebang_references("#!/bin/sh", "ruby"));
/// assert!(!shebang_references("# ruby", "ruby"));
/// ```
#[must_use]
pub fn shebang_references(first_line: &str, runtime: &str) -> bool {
    runtime_token(first_line, runtime).is_some()
}

fn runtime_token(first_line: &str, runtime: &str) -> Option<usize> {
    let command = first_line.strip_prefix("#!")?;
    command
        .split_whitespace()
        .position(|token| Utf8Path::new(token).file_name() == Some(runtime))
}

/// Rewrite the shebang line of `contents` to invoke `interpreter`.
///
/// Arguments after the runtime are kept. Returns `None` when the file has
/// no shebang naming `runtime` or already names `interpreter`.
#[must_use]
pub fn rewrite_shebang(contents: &[u8], runtime: &str, interpreter: &Utf8Path) -> Option<Vec<u8>> {
    if !contents.starts_with(b"#!") {
        return None;
    }
    let line_end = contents
        .iter()
        .position(|byte| *byte == b'\n')
        .unwrap_or(contents.len());
    let (first, rest) = contents.split_at(line_end);
    let first_line = std::str::from_utf8(first).ok()?.trim_end_matches('\r');

    let index = runtime_token(first_line, runtime)?;
    let mut words = vec![interpreter.as_str()];
    words.extend(
        first_line
            .strip_prefix("#!")?
            .split_whitespace()
            .skip(index + 1),
    );
    let new_line = format!("#!{}", words.join(" "));
    if new_line == first_line {
        return None;
    }

    let mut rewritten = new_line.into_bytes();
    rewritten.extend_from_slice(rest);
    Some(rewritten)
}

/// Point every runtime script directly under `bin_dir` at `interpreter`.
///
/// Only visible, executable regular files are considered, and only their
/// first line is read unless it needs rewriting.
pub fn rewrite_shebangs(
    bin_dir: &Utf8Path,
    runtime: &str,
    interpreter: &Utf8Path,
    report: &mut FixupReport,
) {
    let entries = match fs::read_dir(bin_dir) {
        Ok(entries) => entries,
        Err(err) => {
            report.fail(bin_dir, &err);
            return;
        }
    };

    for entry in entries {
        let path = match entry.map(|entry| Utf8PathBuf::from_path_buf(entry.path())) {
            Ok(Ok(path)) => path,
            Ok(Err(path)) => {
                warn!("skipping non-UTF-8 path {}", path.display());
                continue;
            }
            Err(err) => {
                report.fail(bin_dir, &err);
                continue;
            }
        };
        if path.file_name().is_none_or(|name| name.starts_with('.')) {
            continue;
        }
        match fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_file() && metadata.permissions().mode() & 0o111 != 0 => {}
            Ok(_) => continue,
            Err(err) => {
                report.fail(&path, &err);
                continue;
            }
        }
        match rewrite_file(&path, runtime, interpreter) {
            Ok(true) => {
                debug!("rewrote interpreter line of {path}");
                report.rewritten.push(path);
            }
            Ok(false) => {}
            Err(err) => report.fail(&path, &err),
        }
    }
    report.rewritten.sort();
}

fn rewrite_file(path: &Utf8Path, runtime: &str, interpreter: &Utf8Path) -> std::io::Result<bool> {
    let mut reader = BufReader::new(File::open(path)?);
    if !reader.fill_buf()?.starts_with(b"#!") {
        return Ok(false);
    }
    let mut first_line = Vec::new();
    reader.read_until(b'\n', &mut first_line)?;
    let Some(rewritten) = rewrite_shebang(&first_line, runtime, interpreter) else {
        return Ok(false);
    };

    let permissions = fs::metadata(path)?.permissions();
    let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut replacement = NamedTempFile::new_in(dir)?;
    replacement.write_all(&rewritten)?;
    io::copy(&mut reader, &mut replacement)?;
    replacement.as_file().set_permissions(permissions)?;
    replacement.persist(path).map_err(|err| err.error)?;
    Ok(true)
}

/// Make every entry below `root` world-readable and not world-writable.
///
/// Directories also become world-searchable. Symbolic links are left alone.
pub fn normalize_permissions(root: &Utf8Path, report: &mut FixupReport) {
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .and_then(Utf8Path::from_path)
                    .unwrap_or(root)
                    .to_owned();
                report.fail(&path, &err);
                continue;
            }
        };
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }

        let path = entry.path();
        let result = fs::metadata(path).and_then(|metadata| {
            let mode = metadata.permissions().mode();
            let wanted = normalized_mode(mode, file_type.is_dir());
            if wanted == mode {
                return Ok(false);
            }
            fs::set_permissions(path, fs::Permissions::from_mode(wanted)).map(|()| true)
        });
        match result {
            Ok(true) => report.permissions_changed += 1,
            Ok(false) => {}
            Err(err) => {
                let path = Utf8Path::from_path(path).unwrap_or(root).to_owned();
                report.fail(&path, &err);
            }
        }
    }
}

/// The permission bits `mode` is normalised to.
///
/// # Examples
///
/// ```
/// use ree_installer::fixup::normalized_mode;
///
/// assert_eq!(normalized_mode(0o600, false), 0o644);
/// assert_eq!(normalized_mode(0o777, false), 0o775);
/// assert_eq!(normalized_mode(0o700, true), 0o755);
/// ```
#[must_use]
pub const fn normalized_mode(mode: u32, is_dir: bool) -> u32 {
    let readable = if is_dir { 0o055 } else { 0o044 };
    (mode | readable) & !0o002
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    const INTERPRETER: &str = "/opt/x/bin/ruby";

    #[fixture]
    fn bin_dir() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp dir not UTF-8");
        (dir, path)
    }

    fn write_script(path: &Utf8Path, contents: &str, mode: u32) {
        fs::write(path, contents).expect("write script");
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod script");
    }

    fn mode_of(path: &Utf8Path) -> u32 {
        fs::symlink_metadata(path)
            .expect("metadata")
            .permissions()
            .mode()
            & 0o777
    }

    #[rstest]
    #[case::absolute("#!/usr/local/bin/ruby\nputs 1\n", "#!/opt/x/bin/ruby\nputs 1\n")]
    #[case::env("#!/usr/bin/env ruby\nputs 1\n", "#!/opt/x/bin/ruby\nputs 1\n")]
    #[case::with_flags("#!/usr/bin/env ruby -w\nputs 1\n", "#!/opt/x/bin/ruby -w\nputs 1\n")]
    #[case::no_trailing_newline("#!/usr/bin/ruby", "#!/opt/x/bin/ruby")]
    fn runtime_shebangs_are_rewritten(#[case] before: &str, #[case] after: &str) {
        let rewritten = rewrite_shebang(before.as_bytes(), "ruby", Utf8Path::new(INTERPRETER));
        assert_eq!(rewritten.as_deref(), Some(after.as_bytes()));
    }

    #[rstest]
    #[case::shell("#!/bin/sh\necho ruby\n")]
    #[case::no_shebang("ruby is mentioned here\n")]
    #[case::similar_name("#!/usr/bin/rubyx\n")]
    #[case::already_rewritten("#!/opt/x/bin/ruby -w\n")]
    #[case::binary("\u{7f}ELF\u{2}\u{1}")]
    fn other_files_are_left_alone(#[case] contents: &str) {
        assert_eq!(
            rewrite_shebang(contents.as_bytes(), "ruby", Utf8Path::new(INTERPRETER)),
            None
        );
    }

    #[rstest]
    fn rewrite_shebangs_touches_only_runtime_scripts(bin_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = bin_dir;
        let gem = dir.join("gem");
        let shell = dir.join("helper");
        write_script(&gem, "#!/usr/bin/env ruby\nrequire 'rubygems'\n", 0o755);
        write_script(&shell, "#!/bin/sh\nexec ruby \"$@\"\n", 0o755);
        let mut report = FixupReport::default();

        rewrite_shebangs(&dir, "ruby", Utf8Path::new(INTERPRETER), &mut report);

        assert_eq!(report.rewritten, [gem.clone()]);
        assert!(report.failures.is_empty());
        assert_eq!(
            fs::read_to_string(&gem).expect("read gem"),
            "#!/opt/x/bin/ruby\nrequire 'rubygems'\n"
        );
        assert_eq!(
            fs::read_to_string(&shell).expect("read helper"),
            "#!/bin/sh\nexec ruby \"$@\"\n"
        );
        assert_eq!(mode_of(&gem), 0o755);
    }

    #[rstest]
    #[case::hidden(".irbrc", 0o755)]
    #[case::not_executable("notes.rb", 0o644)]
    fn rewrite_shebangs_skips_hidden_and_non_executable_files(
        bin_dir: (TempDir, Utf8PathBuf),
        #[case] name: &str,
        #[case] mode: u32,
    ) {
        let (_guard, dir) = bin_dir;
        let script = dir.join(name);
        write_script(&script, "#!/usr/bin/ruby\nx\n", mode);
        let mut report = FixupReport::default();

        rewrite_shebangs(&dir, "ruby", Utf8Path::new(INTERPRETER), &mut report);

        assert!(report.rewritten.is_empty(), "{:?}", report.rewritten);
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(
            fs::read_to_string(&script).expect("read script"),
            "#!/usr/bin/ruby\nx\n"
        );
    }

    #[rstest]
    fn rewrite_shebangs_keeps_large_bodies_intact(bin_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = bin_dir;
        let script = dir.join("rake");
        let body = "puts 1\n".repeat(20_000);
        write_script(&script, &format!("#!/usr/bin/ruby\n{body}"), 0o755);
        let mut report = FixupReport::default();

        rewrite_shebangs(&dir, "ruby", Utf8Path::new(INTERPRETER), &mut report);

        assert_eq!(report.rewritten, [script.clone()]);
        assert_eq!(
            fs::read_to_string(&script).expect("read script"),
            format!("#!/opt/x/bin/ruby\n{body}")
        );
    }

    #[rstest]
    fn rewrite_shebangs_reports_missing_bin_dir(bin_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = bin_dir;
        let missing = dir.join("bin");
        let mut report = FixupReport::default();

        rewrite_shebangs(&missing, "ruby", Utf8Path::new(INTERPRETER), &mut report);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures.first().map(|f| &f.path), Some(&missing));
    }

    #[rstest]
    fn permissions_become_world_readable(bin_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = bin_dir;
        let lib = root.join("lib");
        fs::create_dir(&lib).expect("mkdir lib");
        fs::set_permissions(&lib, fs::Permissions::from_mode(0o700)).expect("chmod lib");
        let private = lib.join("libruby.so");
        write_script(&private, "", 0o600);
        let open = root.join("open.rb");
        write_script(&open, "", 0o666);
        std::os::unix::fs::symlink(&private, root.join("link")).expect("symlink");
        let mut report = FixupReport::default();

        normalize_permissions(&root, &mut report);

        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(mode_of(&lib), 0o755);
        assert_eq!(mode_of(&private), 0o644);
        assert_eq!(mode_of(&open), 0o664);
        assert!(report.permissions_changed >= 3);
    }

    #[rstest]
    #[case(0o644, false, 0o644)]
    #[case(0o640, false, 0o644)]
    #[case(0o755, true, 0o755)]
    #[case(0o777, true, 0o775)]
    #[case(0o750, true, 0o755)]
    fn normalized_modes(#[case] mode: u32, #[case] is_dir: bool, #[case] expected: u32) {
        assert_eq!(normalized_mode(mode, is_dir), expected);
    }
}
