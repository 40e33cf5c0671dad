//! User-facing screens for the installer.
//!
//! Every screen writes plain text to an injected writer so sessions can be
//! captured in tests. Progress detail goes through `log`; only what the user
//! must read or act on is written here.

use crate::deps::{Advice, MissingDependency};
use crate::error::Privilege;
use crate::executor::SoftFailure;
use crate::fixup::FixupFailure;
use camino::Utf8Path;
use std::io::Write;

/// Horizontal rule printed above each screen.
pub const RULE: &str = "--------------------------------------------";

/// Website of the application server that consumes the installed runtime.
pub const PASSENGER_WEBSITE: &str = "http://www.modrails.com";

/// Project website shown on the final screen.
pub const PROJECT_WEBSITE: &str = "http://www.rubyenterpriseedition.com";

/// Write one line, ignoring failures.
pub fn write_line(out: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(out, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

fn banner(out: &mut dyn Write, title: &str) {
    write_line(out, RULE);
    write_line(out, title);
}

/// The introduction shown before anything happens.
pub fn welcome_screen(out: &mut dyn Write, name: &str, version: &str) {
    banner(out, &format!("Welcome to the {name} installer"));
    write_line(out, format!("This installer will help you install {name} {version}."));
    write_line(
        out,
        "Don't worry, none of your system files will be touched if you don't want them",
    );
    write_line(out, "to, so there is no risk that things will screw up.");
    write_line(out, "");
    write_line(out, "You can expect this from the installation process:");
    write_line(out, "");
    write_line(out, format!("  1. {name} will be compiled and optimized for speed for this"));
    write_line(out, "     system.");
    write_line(out, format!("  2. Ruby on Rails will be installed for {name}."));
    write_line(out, format!("  3. You will learn how to tell Passenger to use {name}"));
    write_line(out, "     instead of regular Ruby.");
    write_line(out, "");
    write_line(out, "Press Enter to continue, or Ctrl-C to abort.");
}

/// The header printed before the prefix prompt.
pub fn target_directory_screen(out: &mut dyn Write, name: &str) {
    banner(out, "Target directory");
    write_line(out, "");
    write_line(out, format!("Where would you like to install {name} to?"));
    write_line(out, format!("(All {name} files will be put inside that directory.)"));
    write_line(out, "");
}

/// The header printed before the build starts.
pub fn build_screen(out: &mut dyn Write, name: &str) {
    banner(out, &format!("Compiling and optimizing {name}"));
    write_line(out, "In the mean time, feel free to grab a cup of coffee.");
    write_line(out, "");
}

/// Render one piece of remediation advice for `name`.
///
/// # Examples
///
/// ```
/// use ree_installer::deps::Advice;
/// use ree_installer::output::advice_text;
///
/// let advice = Advice::Command("apt-get install zlib1g-dev".to_owned());
/// assert_eq!(
///     advice_text("Zlib development headers", &advice),
///     "Please run apt-get install zlib1g-dev as root."
/// );
/// assert!(advice_text("GNU make", &Advice::Generic).contains("GNU make"));
/// ```
#[must_use]
pub fn advice_text(name: &str, advice: &Advice) -> String {
    match advice {
        Advice::Command(command) => format!("Please run {command} as root."),
        Advice::Instructions(instructions) => instructions.clone(),
        Advice::Website(website) => format!("Please download it from {website}"),
        Advice::Generic => format!("Search Google for \"{name}\"."),
    }
}

/// Every missing dependency with its remediation, then a closing hint.
pub fn missing_dependencies_screen(out: &mut dyn Write, missing: &[MissingDependency]) {
    banner(out, "Some required software is not installed.");
    write_line(out, "But don't worry, this installer will tell you how to install them.");
    write_line(out, "");
    for dependency in missing {
        write_line(out, format!(" * To install {}:", dependency.name));
        write_line(out, format!("   {}", advice_text(&dependency.name, &dependency.advice)));
        write_line(out, "");
    }
    write_line(out, "If the aforementioned instructions didn't solve your problem, then please");
    write_line(out, "ask for help on the project's mailing list or issue tracker.");
}

/// Guidance after an install step could not write to the prefix.
pub fn permission_failure_screen(
    out: &mut dyn Write,
    name: &str,
    prefix: &Utf8Path,
    privilege: &Privilege,
) {
    write_line(out, "");
    banner(out, &format!("Cannot install {name}"));
    write_line(out, "");
    write_line(
        out,
        format!("This installer was able to compile {name}, but could not"),
    );
    write_line(out, format!("install the files to {prefix}."));
    write_line(out, "");
    let advice = match privilege {
        Privilege::Root => "This installer probably doesn't have permission to write to that \
                            folder, even though it's running as root. Please fix the \
                            permissions, and re-run this installer."
            .to_owned(),
        Privilege::User(user) => format!(
            "This installer probably doesn't have permission to write to that folder, \
             because it's running as {user}. Please re-run this installer as root."
        ),
    };
    write_line(out, advice);
}

/// Packages that failed to install, with the command to retry each.
///
/// Writes nothing when `failures` is empty.
pub fn soft_failure_summary(out: &mut dyn Write, failures: &[SoftFailure]) {
    if failures.is_empty() {
        return;
    }
    banner(out, "Some optional packages could not be installed.");
    write_line(
        out,
        "This usually means their development headers are missing. You can install",
    );
    write_line(out, "them later by running:");
    write_line(out, "");
    for failure in failures {
        write_line(out, format!("  {}", failure.command));
    }
    write_line(out, "");
}

/// Installed files the fixup pass could not adjust.
///
/// Writes nothing when `failures` is empty.
pub fn fixup_failure_summary(out: &mut dyn Write, failures: &[FixupFailure]) {
    if failures.is_empty() {
        return;
    }
    write_line(out, "Warning: some installed files could not be adjusted:");
    for failure in failures {
        write_line(out, format!("  {}: {}", failure.path, failure.reason));
    }
    write_line(out, "");
}

/// The closing screen after a successful installation.
pub fn finalization_screen(out: &mut dyn Write, name: &str, prefix: &Utf8Path, runtime: &str) {
    banner(out, &format!("{name} is successfully installed!"));
    write_line(
        out,
        format!("If you're using Phusion Passenger ({PASSENGER_WEBSITE}),"),
    );
    write_line(
        out,
        format!("and you want it to use {name}, then edit your Apache"),
    );
    write_line(out, "configuration file, and change the 'RailsRuby' option:");
    write_line(out, "");
    write_line(out, format!("  RailsRuby {prefix}/bin/{runtime}"));
    write_line(out, "");
    write_line(
        out,
        format!("If you ever want to uninstall {name}, simply remove this"),
    );
    write_line(out, "directory:");
    write_line(out, "");
    write_line(out, format!("  {prefix}"));
    write_line(out, "");
    write_line(out, "If you have any questions, feel free to visit our website:");
    write_line(out, "");
    write_line(out, format!("  {PROJECT_WEBSITE}"));
    write_line(out, "");
}
