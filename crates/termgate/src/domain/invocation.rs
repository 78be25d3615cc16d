//! Invocation requests and launch-command resolution.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Interpreter used to run an explicit `--command` string.
pub const COMMAND_SHELL: &str = "/bin/sh";

pub type Environment = BTreeMap<String, String>;

/// What a client launch sends to the running instance.
///
/// The environment and working directory are the client's own, captured at launch,
/// never the long-running daemon's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub env: Environment,
    pub cwd: PathBuf,
}

impl InvocationRequest {
    pub fn new(command: Option<String>, env: Environment, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command,
            env,
            cwd: cwd.into(),
        }
    }

    /// Snapshot of the calling process: its environment and current directory.
    ///
    /// Also returns the names of variables left out because they are not valid UTF-8.
    pub fn capture(command: Option<String>) -> std::io::Result<(Self, Vec<String>)> {
        let (env, skipped) = environment_from_os(std::env::vars_os());
        let cwd = std::env::current_dir()?;
        Ok((Self::new(command, env, cwd), skipped))
    }

    pub fn shell(&self) -> Option<&str> {
        self.env.get("SHELL").map(String::as_str)
    }

    pub fn launch_command(&self) -> LaunchCommand {
        LaunchCommand::resolve(self.command.as_deref(), &self.env)
    }
}

/// Argument vector handed to the terminal host.
///
/// An empty vector is a legal value: it stands for "no program", which the host
/// reports back as a spawn failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchCommand {
    argv: Vec<String>,
}

/// Splits an OS environment into the UTF-8 part and the names of the rest.
pub fn environment_from_os(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> (Environment, Vec<String>) {
    let mut env = Environment::new();
    let mut skipped = Vec::new();
    for (key, value) in vars {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => {
                env.insert(key, value);
            }
            (Ok(key), Err(_)) => skipped.push(key),
            (Err(key), _) => skipped.push(key.to_string_lossy().into_owned()),
        }
    }
    (env, skipped)
}

impl LaunchCommand {
    /// A blank explicit command resolves to no program at all, never to the shell fallback.
    pub fn resolve(explicit: Option<&str>, env: &Environment) -> Self {
        let argv = match explicit {
            Some(command) if command.trim().is_empty() => Vec::new(),
            Some(command) => vec![
                COMMAND_SHELL.to_string(),
                "-c".to_string(),
                command.to_string(),
            ],
            None => env
                .get("SHELL")
                .filter(|shell| !shell.trim().is_empty())
                .map(|shell| vec![shell.clone()])
                .unwrap_or_default(),
        };
        Self { argv }
    }

    pub fn from_argv(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// The user's command string when this is a `/bin/sh -c` wrapper.
    pub fn shell_payload(&self) -> Option<&str> {
        match self.argv.as_slice() {
            [shell, flag, payload] if shell == COMMAND_SHELL && flag == "-c" => {
                Some(payload.as_str())
            }
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        if let Some(payload) = self.shell_payload() {
            return payload.to_string();
        }
        if self.argv.is_empty() {
            return "<none>".to_string();
        }
        self.argv.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn explicit_command_is_wrapped_in_shell() {
        let launch = LaunchCommand::resolve(Some("ls -la"), &env(&[("SHELL", "/bin/zsh")]));
        assert_eq!(launch.program(), Some(COMMAND_SHELL));
        assert_eq!(launch.args(), ["-c".to_string(), "ls -la".to_string()]);
        assert_eq!(launch.shell_payload(), Some("ls -la"));
        assert_eq!(launch.display(), "ls -la");
    }

    #[test]
    fn missing_command_falls_back_to_client_shell() {
        let launch = LaunchCommand::resolve(None, &env(&[("SHELL", "/bin/zsh")]));
        assert_eq!(launch.program(), Some("/bin/zsh"));
        assert!(launch.args().is_empty());
        assert_eq!(launch.shell_payload(), None);
    }

    #[test]
    fn unset_shell_resolves_to_empty_launch() {
        let launch = LaunchCommand::resolve(None, &Environment::new());
        assert!(launch.is_empty());
        assert_eq!(launch.program(), None);
        assert_eq!(launch.display(), "<none>");
    }

    #[test]
    fn blank_explicit_command_resolves_to_no_program() {
        let shell = env(&[("SHELL", "/bin/zsh")]);
        for command in ["", "   ", "\t\n"] {
            let launch = LaunchCommand::resolve(Some(command), &shell);
            assert!(launch.is_empty(), "{command:?} should not launch anything");
            assert_eq!(launch.shell_payload(), None);
        }
    }

    #[test]
    fn non_utf8_variables_are_reported_not_captured() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("HOME"), OsString::from("/home/a")),
            (OsString::from("BLOB"), OsString::from_vec(vec![0x66, 0xff])),
            (OsString::from_vec(vec![0xfe, 0x4b]), OsString::from("x")),
        ];
        let (captured, skipped) = environment_from_os(vars);

        assert_eq!(captured, env(&[("HOME", "/home/a")]));
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0], "BLOB");
        assert!(skipped[1].ends_with('K'));
    }

    #[test]
    fn blank_shell_is_treated_as_unset() {
        let launch = LaunchCommand::resolve(None, &env(&[("SHELL", "  ")]));
        assert!(launch.is_empty());
    }

    #[test]
    fn request_round_trips_without_command_field() {
        let request = InvocationRequest::new(None, env(&[("HOME", "/home/a")]), "/tmp");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("command").is_none());
        let parsed: InvocationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn shell_comes_from_captured_environment() {
        let request = InvocationRequest::new(None, env(&[("SHELL", "/bin/fish")]), "/");
        assert_eq!(request.shell(), Some("/bin/fish"));
        assert_eq!(request.launch_command().program(), Some("/bin/fish"));
    }
}
