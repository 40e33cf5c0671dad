//! Tests for installer CLI parsing and default behaviours.

use super::*;
use rstest::rstest;

#[test]
fn cli_parses_defaults() {
    let cli = Cli::parse_from(["ree-installer"]);
    assert!(cli.auto.is_none());
    assert!(cli.destdir.is_none());
    assert!(!cli.no_tcmalloc);
    assert!(!cli.extra_packages);
    assert_eq!(cli.dist_dir, Utf8PathBuf::from("."));
    assert_eq!(cli.verbosity, 0);
    assert!(!cli.quiet);
    assert!(!cli.is_non_interactive());
}

#[test]
fn cli_parses_auto_prefix() {
    let cli = Cli::parse_from(["ree-installer", "--auto", "/opt/ree"]);
    assert_eq!(cli.auto.as_deref(), Some("/opt/ree"));
    assert!(cli.is_non_interactive());
}

#[test]
fn cli_parses_dist_dir() {
    let cli = Cli::parse_from(["ree-installer", "--dist-dir", "/src/ree"]);
    assert_eq!(cli.dist_dir, Utf8PathBuf::from("/src/ree"));
}

#[rstest]
#[case::absent(&["ree-installer"], None)]
#[case::empty(&["ree-installer", "--destdir", ""], None)]
#[case::set(&["ree-installer", "--destdir", "/tmp/stage"], Some("/tmp/stage"))]
fn staging_root_ignores_empty_destdir(#[case] args: &[&str], #[case] expected: Option<&str>) {
    let cli = Cli::parse_from(args);
    assert_eq!(cli.staging_root().map(Utf8Path::as_str), expected);
}

#[test]
fn install_options_carry_flags() {
    let cli = Cli::parse_from([
        "ree-installer",
        "--destdir",
        "/tmp/stage",
        "--no-tcmalloc",
        "--extra-packages",
    ]);
    let options = cli.install_options();
    assert_eq!(options.staging_root, Some(Utf8PathBuf::from("/tmp/stage")));
    assert!(options.allocator_opt_out);
    assert!(options.extra_packages);
}

/// Parameterised tests for boolean CLI flags.
#[rstest]
#[case::no_tcmalloc(&["ree-installer", "--no-tcmalloc"], |cli: &Cli| cli.no_tcmalloc)]
#[case::extra_packages(&["ree-installer", "--extra-packages"], |cli: &Cli| cli.extra_packages)]
#[case::verbose(&["ree-installer", "-v"], |cli: &Cli| cli.verbosity > 0)]
#[case::quiet(&["ree-installer", "-q"], |cli: &Cli| cli.quiet)]
fn cli_parses_boolean_flags(#[case] args: &[&str], #[case] check: fn(&Cli) -> bool) {
    let cli = Cli::parse_from(args);
    assert!(check(&cli));
}

#[rstest]
#[case::default(&["ree-installer"], LevelFilter::Warn)]
#[case::quiet(&["ree-installer", "-q"], LevelFilter::Error)]
#[case::verbose(&["ree-installer", "-v"], LevelFilter::Info)]
#[case::double(&["ree-installer", "-vv"], LevelFilter::Debug)]
#[case::triple(&["ree-installer", "--verbose", "--verbose", "--verbose"], LevelFilter::Trace)]
fn log_level_follows_verbosity(#[case] args: &[&str], #[case] expected: LevelFilter) {
    assert_eq!(Cli::parse_from(args).log_level(), expected);
}

#[rstest]
#[case::verbose_with_quiet(&["ree-installer", "--verbose", "--quiet"])]
#[case::auto_without_prefix(&["ree-installer", "--auto"])]
#[case::unknown_flag(&["ree-installer", "--lint", "x"])]
fn cli_rejects_invalid_arguments(#[case] args: &[&str]) {
    Cli::try_parse_from(args).expect_err("expected clap to reject the arguments");
}

#[test]
fn default_matches_empty_command_line() {
    let parsed = Cli::parse_from(["ree-installer"]);
    let default = Cli::default();
    assert_eq!(parsed.dist_dir, default.dist_dir);
    assert_eq!(parsed.install_options(), default.install_options());
}
