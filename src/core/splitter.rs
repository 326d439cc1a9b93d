//! Separates leading global flags from the command name and its arguments

use tracing::debug;

/// Result of splitting one argv
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitArgs {
    /// Leading tokens that start with `-`
    pub global: Vec<String>,
    /// First token not starting with `-`
    pub command: Option<String>,
    /// Everything after the command name
    pub args: Vec<String>,
}

/// Split argv into global tokens, command name and command arguments
pub fn split<S: AsRef<str>>(argv: &[S]) -> SplitArgs {
    let boundary = argv
        .iter()
        .position(|token| !token.as_ref().starts_with('-'));

    let split = match boundary {
        Some(index) => SplitArgs {
            global: argv[..index].iter().map(|t| t.as_ref().to_string()).collect(),
            command: Some(argv[index].as_ref().to_string()),
            args: argv[index + 1..]
                .iter()
                .map(|t| t.as_ref().to_string())
                .collect(),
        },
        None => SplitArgs {
            global: argv.iter().map(|t| t.as_ref().to_string()).collect(),
            command: None,
            args: Vec::new(),
        },
    };

    debug!(
        "Split argv: global={:?}, command={:?}, args={:?}",
        split.global, split.command, split.args
    );
    split
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_globals_command_args() {
        let argv = ["--verbose", "-Dfoo=bar", "deploy", "--force", "staging"];
        let split = split(&argv);
        assert_eq!(split.global, vec!["--verbose", "-Dfoo=bar"]);
        assert_eq!(split.command.as_deref(), Some("deploy"));
        assert_eq!(split.args, vec!["--force", "staging"]);
    }

    #[test]
    fn test_dash_tokens_never_become_command() {
        let split = split(&["-", "--force"]);
        assert_eq!(split.global, vec!["-", "--force"]);
        assert_eq!(split.command, None);
        assert!(split.args.is_empty());
    }

    #[test]
    fn test_empty_argv() {
        let empty: [&str; 0] = [];
        assert_eq!(split(&empty), SplitArgs::default());
    }

    #[test]
    fn test_input_is_untouched() {
        let argv = vec!["run".to_string(), "--x".to_string()];
        let split = split(&argv);
        assert_eq!(argv, vec!["run", "--x"]);
        assert!(split.global.is_empty());
        assert_eq!(split.args, vec!["--x"]);
    }
}
