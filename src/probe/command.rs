use super::{ProbeFailure, ProbeResult, Prober};
use crate::config::ServiceTarget;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;

/// A command line with `{host}` and `{port}` placeholders.
///
/// The template is split into an argument vector once, when it is parsed,
/// using shell-like quoting (single quotes, double quotes, backslash
/// escapes). Rendering substitutes placeholders inside each argument and the
/// result is executed directly, never re-parsed by a shell, so a substituted
/// value can never introduce new arguments.
///
/// ```
/// use entrygate::probe::CommandTemplate;
/// use entrygate::config::ServiceTarget;
///
/// let template: CommandTemplate = "pg_isready -h {host} -p '{port}'".parse().unwrap();
/// let target: ServiceTarget = "db:5432".parse().unwrap();
/// assert_eq!(
///     template.render(&target),
///     vec!["pg_isready", "-h", "db", "-p", "5432"]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    argv: Vec<String>,
}

impl CommandTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let argv = split_command_line(template)?;
        if argv.is_empty() {
            return Err(Error::InvalidArgument(
                "command template must not be empty".to_string(),
            ));
        }
        Ok(Self {
            source: template.to_string(),
            argv,
        })
    }

    /// Argument vector with `{host}` and `{port}` replaced.
    pub fn render(&self, target: &ServiceTarget) -> Vec<String> {
        let port = target.port().to_string();
        self.argv
            .iter()
            .map(|arg| arg.replace("{host}", target.host()).replace("{port}", &port))
            .collect()
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

impl FromStr for CommandTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split a command line into words using POSIX-shell-like quoting rules.
///
/// No expansion of any kind happens: `$VAR`, globs and `;` are literal.
pub fn split_command_line(line: &str) -> Result<Vec<String>> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => {
                        return Err(Error::InvalidArgument(format!(
                            "unterminated escape in '{}'",
                            line
                        )))
                    }
                },
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => match chars.next() {
                    Some(next) => {
                        current.push(next);
                        in_word = true;
                    }
                    None => {
                        return Err(Error::InvalidArgument(format!(
                            "trailing backslash in '{}'",
                            line
                        )))
                    }
                },
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote != Quote::None {
        return Err(Error::InvalidArgument(format!(
            "unterminated quote in '{}'",
            line
        )));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Prober that runs a user-supplied command; exit code 0 means reachable.
pub struct CommandProber {
    template: CommandTemplate,
}

impl CommandProber {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

#[async_trait]
impl Prober for CommandProber {
    async fn probe(&self, target: &ServiceTarget, attempt_timeout: Duration) -> ProbeResult {
        let argv = self.template.render(target);
        let (program, args) = match argv.split_first() {
            Some(split) => split,
            None => return Err(ProbeFailure::ToolUnavailable("empty command".to_string())),
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ProbeFailure::ToolUnavailable(format!("{}: {}", program, e))
                }
                _ => ProbeFailure::Io(e.to_string()),
            })?;

        match tokio::time::timeout(attempt_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ProbeFailure::CheckFailed(status.code())),
            Ok(Err(e)) => Err(ProbeFailure::Io(e.to_string())),
            Err(_) => {
                let _ = child.start_kill();
                Err(ProbeFailure::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ServiceTarget {
        ServiceTarget::parse("db:5432").unwrap()
    }

    #[test]
    fn splits_plain_words() {
        assert_eq!(
            split_command_line("  nc -z  host 80 ").unwrap(),
            vec!["nc", "-z", "host", "80"]
        );
    }

    #[test]
    fn honours_quotes_and_escapes() {
        assert_eq!(
            split_command_line(r#"sh -c 'echo "$1"; exit 0' "a b" c\ d """#).unwrap(),
            vec!["sh", "-c", r#"echo "$1"; exit 0"#, "a b", "c d", ""]
        );
        assert_eq!(
            split_command_line(r#"echo "say \"hi\" \n""#).unwrap(),
            vec!["echo", r#"say "hi" \n"#]
        );
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(split_command_line("echo 'oops").is_err());
        assert!(split_command_line("echo \"oops").is_err());
        assert!(split_command_line("echo oops\\").is_err());
        assert!(CommandTemplate::parse("   ").is_err());
    }

    #[test]
    fn substituted_values_stay_single_arguments() {
        let template = CommandTemplate::parse("check --addr={host}:{port}").unwrap();
        let hostile = ServiceTarget::new("db;rm", 5432, Default::default()).unwrap();
        assert_eq!(template.render(&hostile), vec!["check", "--addr=db;rm:5432"]);
    }

    #[test]
    fn display_keeps_source() {
        let template = CommandTemplate::parse("pg_isready -h {host}").unwrap();
        assert_eq!(template.to_string(), "pg_isready -h {host}");
        assert_eq!(template.program(), "pg_isready");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_zero_means_success() {
        let prober = CommandProber::new(CommandTemplate::parse("true {host} {port}").unwrap());
        assert_eq!(prober.probe(&target(), Duration::from_secs(5)).await, Ok(()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_check_failure() {
        let prober =
            CommandProber::new(CommandTemplate::parse("sh -c 'exit 3'").unwrap());
        assert_eq!(
            prober.probe(&target(), Duration::from_secs(5)).await,
            Err(ProbeFailure::CheckFailed(Some(3)))
        );
    }

    #[tokio::test]
    async fn missing_binary_is_tool_unavailable() {
        let prober = CommandProber::new(
            CommandTemplate::parse("definitely-not-a-real-binary-xyz {host}").unwrap(),
        );
        assert!(matches!(
            prober.probe(&target(), Duration::from_secs(5)).await,
            Err(ProbeFailure::ToolUnavailable(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_check_times_out() {
        let prober = CommandProber::new(CommandTemplate::parse("sleep 5").unwrap());
        assert_eq!(
            prober.probe(&target(), Duration::from_millis(100)).await,
            Err(ProbeFailure::Timeout)
        );
    }
}
