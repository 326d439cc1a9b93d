//! Error types for the binding engine
//!
//! Build-time errors (catalog and registry) are fatal before any invocation runs.
//! Everything else aborts only the invocation that raised it.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error carried as the cause of converter and target failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the binding engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Tokenizer could not make sense of the raw line
    #[error("Malformed input: {message}")]
    MalformedInput { message: String, delimiter: Option<char> },

    /// Nothing to run: empty line, empty pipeline stage or no command name
    #[error("Empty command")]
    EmptyCommand,

    /// No command with that name is registered
    #[error("Unknown command: {name}{}", .suggestion.as_deref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    UnknownCommand {
        name: String,
        suggestion: Option<String>,
    },

    /// A required parameter received no value
    #[error("Missing argument '{parameter}': {message}")]
    MissingArgument { parameter: String, message: String },

    /// An option token matched no declared option
    #[error("Unknown option: {option}")]
    UnknownOption { option: String },

    /// A positional token was left over after every plain parameter was bound
    #[error("Unexpected argument: {value}")]
    UnexpectedArgument { value: String },

    /// Two options share a name in one command's flattened parameter set
    #[error("Duplicate option name '--{option}' in command '{command}'")]
    DuplicateOptionName { command: String, option: String },

    /// Two commands share a name
    #[error("Duplicate command name: {name}")]
    DuplicateCommand { name: String },

    /// A declaration is structurally invalid
    #[error("Invalid declaration for '{command}': {message}")]
    InvalidDeclaration { command: String, message: String },

    /// Value conversion failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A substitution expression re-references itself
    #[error("Cyclic substitution: {chain}")]
    CyclicSubstitution { chain: String },

    /// The validator rejected the bound values
    #[error("Validation failed: {}", .violations.join("; "))]
    Validation { violations: Vec<String> },

    /// An interceptor reference could not be resolved to a handle
    #[error("Unresolved interceptor '{interceptor}' for command '{command}'")]
    UnresolvedInterceptor { command: String, interceptor: String },

    /// The target action returned an error
    #[error("Command '{command}' failed")]
    Execution {
        command: String,
        #[source]
        source: BoxError,
    },

    /// Errors related to catalog loading
    #[error("Catalog error: {message}")]
    Catalog {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<BoxError>,
    },

    /// File system operation errors
    #[error("File system error: {operation} failed on {path}")]
    FileSystem {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Process execution errors
    #[error("Process error: {command} failed")]
    Process {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Conversion failures raised by the type converter
#[derive(Error, Debug)]
pub enum ConversionError {
    /// A non-text value does not match the target type
    #[error("Type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// No converter is registered for the target type
    #[error("No converter registered for type '{target}' (parameter '{name}')")]
    NoConverter { name: String, target: String },

    /// Text does not name a constant of the target enum
    #[error("Invalid value '{value}' for '{name}': not a constant of {enum_name} ({})", .constants.join(", "))]
    EnumLookupFailure {
        name: String,
        value: String,
        enum_name: String,
        constants: Vec<String>,
    },

    /// A registered converter raised an error
    #[error("Cannot convert '{value}' to {target} for '{name}'")]
    Failed {
        name: String,
        value: String,
        target: String,
        #[source]
        source: BoxError,
    },
}

impl EngineError {
    /// Create a new malformed input error
    pub fn malformed(message: impl Into<String>, delimiter: Option<char>) -> Self {
        Self::MalformedInput {
            message: message.into(),
            delimiter,
        }
    }

    /// Create a new unknown command error
    pub fn unknown_command(name: impl Into<String>, suggestion: Option<String>) -> Self {
        Self::UnknownCommand {
            name: name.into(),
            suggestion,
        }
    }

    /// Create a new missing argument error
    pub fn missing_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a new unknown option error
    pub fn unknown_option(option: impl Into<String>) -> Self {
        Self::UnknownOption {
            option: option.into(),
        }
    }

    /// Create a new invalid declaration error
    pub fn invalid_declaration(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a new catalog error
    pub fn catalog<P: Into<PathBuf>>(message: impl Into<String>, path: P) -> Self {
        Self::Catalog {
            message: message.into(),
            path: path.into(),
            source: None,
        }
    }

    /// Create a new file system error
    pub fn file_system<P: Into<PathBuf>>(
        operation: impl Into<String>,
        path: P,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystem {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a new process error
    pub fn process(
        command: impl Into<String>,
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Process {
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap an error returned by a target action.
    ///
    /// Engine errors raised from inside a target pass through unchanged so that
    /// nested invocations keep their original classification.
    pub fn execution(command: impl Into<String>, error: anyhow::Error) -> Self {
        match error.downcast::<EngineError>() {
            Ok(engine_error) => engine_error,
            Err(other) => Self::Execution {
                command: command.into(),
                source: other.into(),
            },
        }
    }

    /// Whether the error is raised while building the catalog or registry
    pub fn is_build_time(&self) -> bool {
        matches!(
            self,
            Self::DuplicateOptionName { .. }
                | Self::DuplicateCommand { .. }
                | Self::InvalidDeclaration { .. }
                | Self::Catalog { .. }
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;
