use std::path::Path;

use mission_core::SessionDefinition;
use portable_pty::CommandBuilder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("program command is empty")]
    EmptyProgram,
    #[error("cannot quote {what} for the login shell: {source}")]
    Quote {
        what: &'static str,
        source: shlex::QuoteError,
    },
}

/// Shell script run by the login shell: enter the workspace, run the setup
/// commands, then replace the shell with the session program.
pub fn session_script(
    workdir: &Path,
    setup_commands: &[String],
    program: &[String],
) -> Result<String, LaunchError> {
    if program.is_empty() {
        return Err(LaunchError::EmptyProgram);
    }
    let workdir = workdir.to_string_lossy();
    let cd = shlex::try_quote(&workdir).map_err(|source| LaunchError::Quote {
        what: "workdir",
        source,
    })?;
    let exec = shlex::try_join(program.iter().map(String::as_str)).map_err(|source| {
        LaunchError::Quote {
            what: "program",
            source,
        }
    })?;

    let mut script = format!("cd {cd}");
    for setup in setup_commands.iter().filter(|cmd| !cmd.trim().is_empty()) {
        script.push_str(" && ");
        script.push_str(setup);
    }
    script.push_str(" && exec ");
    script.push_str(&exec);
    Ok(script)
}

/// Program, arguments and extra environment for the session pty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// `su -l <user> --session-command <script>` with a 256-colour terminal.
    pub fn login_session(
        user: &str,
        workdir: &Path,
        definition: &SessionDefinition,
    ) -> Result<Self, LaunchError> {
        let script = session_script(workdir, &definition.setup_commands, &definition.program)?;
        Ok(Self {
            program: "su".into(),
            args: vec![
                "-l".into(),
                user.into(),
                "--session-command".into(),
                script,
            ],
            env: vec![("TERM".into(), "xterm-256color".into())],
        })
    }

    pub(crate) fn to_command(&self) -> CommandBuilder {
        let mut command = CommandBuilder::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn script_chains_setup_before_exec() {
        let script = session_script(
            Path::new("/home/student"),
            &strings(&["pip install -q rich", "export GREETING=hi"]),
            &strings(&["python3", "-i"]),
        )
        .unwrap();
        assert_eq!(
            script,
            "cd /home/student && pip install -q rich && export GREETING=hi && exec python3 -i"
        );
    }

    #[test]
    fn script_quotes_workdir_and_program() {
        let script = session_script(
            &PathBuf::from("/srv/my work"),
            &[],
            &strings(&["bash", "--rcfile", "it's.rc"]),
        )
        .unwrap();
        let words = shlex::split(&script).unwrap();
        assert_eq!(
            words,
            strings(&["cd", "/srv/my work", "&&", "exec", "bash", "--rcfile", "it's.rc"])
        );
    }

    #[test]
    fn empty_program_is_rejected() {
        assert!(matches!(
            session_script(Path::new("/app"), &[], &[]),
            Err(LaunchError::EmptyProgram)
        ));
    }

    #[test]
    fn login_session_switches_user() {
        let definition = SessionDefinition {
            program: strings(&["bash"]),
            setup_commands: Vec::new(),
            missions: Vec::new(),
        };
        let launch = LaunchSpec::login_session("student", Path::new("/app"), &definition).unwrap();
        assert_eq!(launch.program, "su");
        assert_eq!(
            launch.args,
            strings(&["-l", "student", "--session-command", "cd /app && exec bash"])
        );
        assert_eq!(
            launch.env,
            vec![("TERM".to_string(), "xterm-256color".to_string())]
        );
    }
}
