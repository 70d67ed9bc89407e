use std::env;
use std::ffi::OsString;
use std::process::{Child, Command};

use tracing::debug;

use crate::settings::PopenSettings;

/// `<shell> <flag> <command>` with every stdio left for the caller to set.
pub(super) fn shell_command(command: &str, settings: &PopenSettings) -> Command {
    let (shell, flag) = shell_and_flag(settings);
    let mut cmd = Command::new(shell);
    cmd.arg(flag);
    push_command(&mut cmd, command);
    cmd
}

fn shell_and_flag(settings: &PopenSettings) -> (OsString, String) {
    let shell = if !settings.shell.is_empty() {
        OsString::from(&settings.shell)
    } else if cfg!(windows) {
        env::var_os("COMSPEC")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| OsString::from("cmd.exe"))
    } else {
        OsString::from("/bin/sh")
    };
    let flag = if !settings.shell_flag.is_empty() {
        settings.shell_flag.clone()
    } else if cfg!(windows) {
        "/c".to_string()
    } else {
        "-c".to_string()
    };
    (shell, flag)
}

#[cfg(windows)]
fn push_command(cmd: &mut Command, command: &str) {
    use std::os::windows::process::CommandExt;

    // cmd.exe parses its own command line; pass it through unquoted.
    cmd.raw_arg(command);
}

#[cfg(not(windows))]
fn push_command(cmd: &mut Command, command: &str) {
    cmd.arg(command);
}

/// Roll back a spawned child whose plumbing could not be completed.
pub(super) fn kill_and_wait(mut child: Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "kill failed");
    }
    if let Err(e) = child.wait() {
        debug!(error = %e, "wait after kill failed");
    }
}

/// Exit code, or -1 when the process ended without one (e.g. by signal).
pub(super) fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{parse_settings_toml, DEFAULT_SETTINGS_TOML};

    #[test]
    fn default_shell() {
        let settings = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap().popen;
        let (shell, flag) = shell_and_flag(&settings);
        if cfg!(windows) {
            assert_eq!(flag, "/c");
        } else {
            assert_eq!(shell, OsString::from("/bin/sh"));
            assert_eq!(flag, "-c");
        }
    }

    #[test]
    fn configured_shell() {
        let mut settings = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap().popen;
        settings.shell = "/bin/bash".into();
        settings.shell_flag = "-lc".into();
        let (shell, flag) = shell_and_flag(&settings);
        assert_eq!(shell, OsString::from("/bin/bash"));
        assert_eq!(flag, "-lc");
    }
}
