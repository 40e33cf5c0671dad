//! Tests for host platform detection.

use super::*;
use crate::test_utils::{RecordingExecutor, failure_output, stdout_output};
use rstest::rstest;
use std::fs;
use tempfile::TempDir;

fn marker_root(files: &[(&str, &str)]) -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp dir not UTF-8");
    fs::create_dir_all(root.join("etc")).expect("failed to create etc");
    for (name, contents) in files {
        fs::write(root.join("etc").join(name), contents).expect("failed to write marker");
    }
    (dir, root)
}

#[rstest]
#[case::ubuntu(&[("lsb-release", "DISTRIB_ID=Ubuntu\n"), ("debian_version", "lenny")], DistroIdentity::Ubuntu)]
#[case::debian(&[("debian_version", "4.0")], DistroIdentity::Debian)]
#[case::centos(&[("redhat-release", "CentOS release 5.2 (Final)")], DistroIdentity::CentOs)]
#[case::fedora(&[("redhat-release", "Fedora release 9 (Sulphur)")], DistroIdentity::Fedora)]
#[case::rhel(&[("redhat-release", "Red Hat Enterprise Linux Server release 5.1 (Tikanga)")], DistroIdentity::Rhel)]
#[case::suse(&[("suse-release", "")], DistroIdentity::Suse)]
#[case::gentoo(&[("gentoo-release", "")], DistroIdentity::Gentoo)]
#[case::unknown(&[], DistroIdentity::Unknown)]
fn classifies_linux_distributions(#[case] files: &[(&str, &str)], #[case] expected: DistroIdentity) {
    let (_guard, root) = marker_root(files);
    assert_eq!(discover_distro(&root, OsFamily::Linux), expected);
}

#[test]
fn lsb_release_without_ubuntu_falls_through() {
    let (_guard, root) = marker_root(&[("lsb-release", "DISTRIB_ID=Mint\n"), ("debian_version", "")]);
    assert_eq!(discover_distro(&root, OsFamily::Linux), DistroIdentity::Debian);
}

#[test]
fn non_linux_hosts_are_not_classified() {
    let (_guard, root) = marker_root(&[("debian_version", "")]);
    assert_eq!(discover_distro(&root, OsFamily::MacOs), DistroIdentity::NotLinux);
}

#[rstest]
#[case::linux(OsFamily::Linux, "so", "so")]
#[case::macos(OsFamily::MacOs, "dylib", "bundle")]
#[case::freebsd(OsFamily::FreeBsd, "so", "so")]
fn library_extensions_follow_os_family(
    #[case] os: OsFamily,
    #[case] library: &str,
    #[case] extension: &str,
) {
    assert_eq!(os.library_extension(), library);
    assert_eq!(os.extension_suffix(), extension);
}

#[test]
fn only_macos_uses_two_level_namespace() {
    assert!(OsFamily::MacOs.uses_two_level_namespace());
    assert!(!OsFamily::Linux.uses_two_level_namespace());
    assert_eq!(OsFamily::MacOs.linker_path_var(), "DYLD_LIBRARY_PATH");
    assert_eq!(OsFamily::Linux.linker_path_var(), "LD_LIBRARY_PATH");
}

#[rstest]
#[case("x86_64\n", true)]
#[case("ia64", true)]
#[case("i686", false)]
#[case("armv7l", false)]
fn architecture_bits_classifies_uname_output(#[case] uname: &str, #[case] is_64bit: bool) {
    let executor = RecordingExecutor::new().responding("uname -m", stdout_output(uname));
    let arch = architecture_bits(&executor);
    assert_eq!(arch.is_64bit(), is_64bit);
    assert_eq!(arch.machine(), uname.trim());
    assert_eq!(executor.count_matching("uname -m"), 1);
}

#[test]
fn architecture_bits_falls_back_to_build_architecture() {
    let executor = RecordingExecutor::new().responding("uname", failure_output("boom"));
    let arch = architecture_bits(&executor);
    assert_eq!(arch.machine(), std::env::consts::ARCH);
}

#[test]
fn compiler_override_wins() {
    let found = find_compiler(Some("/opt/cc/bin/clang"), &["gcc"], None);
    assert_eq!(found, Some(Utf8PathBuf::from("/opt/cc/bin/clang")));
}

#[test]
fn blank_override_is_ignored() {
    let found = find_compiler(Some("  "), &["gcc"], None);
    assert_eq!(found, None);
}

#[cfg(unix)]
#[test]
fn compiler_search_returns_first_candidate_found() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().expect("failed to create temp dir");
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    fs::create_dir_all(&first).expect("mkdir");
    fs::create_dir_all(&second).expect("mkdir");
    let cc = second.join("cc");
    fs::write(&cc, "#!/bin/sh\n").expect("write cc");
    fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).expect("chmod cc");

    let search_path = std::env::join_paths([&first, &second]).expect("join paths");
    let found = find_compiler(None, &["gcc", "cc"], Some(search_path.as_os_str()));

    let expected = Utf8PathBuf::try_from(cc).expect("path not UTF-8");
    assert_eq!(found, Some(expected));
}

#[test]
fn compiler_search_without_matches_is_none() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let found = find_compiler(None, &["gcc", "cc"], Some(dir.path().as_os_str()));
    assert_eq!(found, None);
}

#[test]
fn discover_compiler_honours_environment_override() {
    temp_env::with_var("CC", Some("/usr/local/bin/my-cc"), || {
        assert_eq!(
            discover_compiler(CompilerKind::C),
            Some(Utf8PathBuf::from("/usr/local/bin/my-cc"))
        );
    });
}

#[test]
fn invoker_privilege_names_the_user() {
    let invoker = Invoker {
        privileged: false,
        user: "deploy".to_owned(),
    };
    assert_eq!(invoker.privilege(), Privilege::User("deploy".to_owned()));
    let root = Invoker {
        privileged: true,
        user: "root".to_owned(),
    };
    assert_eq!(root.privilege(), Privilege::Root);
}

#[test]
fn current_invoker_prefers_user_variable() {
    temp_env::with_var("USER", Some("builder"), || {
        let executor = RecordingExecutor::new();
        let invoker = current_invoker(&executor);
        assert_eq!(invoker.user, "builder");
        assert_eq!(executor.count_matching("whoami"), 0);
    });
}

#[test]
fn current_invoker_falls_back_to_whoami() {
    temp_env::with_vars([("USER", None::<&str>), ("LOGNAME", None)], || {
        let executor = RecordingExecutor::new().responding("whoami", stdout_output("operator\n"));
        let invoker = current_invoker(&executor);
        assert_eq!(invoker.user, "operator");
    });
}

#[test]
fn probe_uses_injected_marker_root_and_os() {
    let (_guard, root) = marker_root(&[("gentoo-release", "")]);
    let executor = RecordingExecutor::new().responding("uname -m", stdout_output("i686\n"));
    let info = PlatformProbe::new()
        .with_marker_root(root)
        .with_os(OsFamily::Linux)
        .detect(&executor);

    assert_eq!(info.distro, DistroIdentity::Gentoo);
    assert_eq!(info.architecture.machine(), "i686");
    assert_eq!(info.library_extension(), "so");
}
