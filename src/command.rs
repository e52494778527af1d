use std::fmt::{self, Display};

use thiserror::Error;

use crate::envelope::{is_valid_opcode, MAX_MESSAGE_LENGTH};
use crate::error::ErrorCode;

pub const MAX_ARGUMENTS: usize = 12;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid opcode '{0}'")]
    InvalidOpcode(char),
    #[error("too many arguments: {0} > 12")]
    TooManyArguments(usize),
    #[error("at most one string argument is allowed")]
    TooManyStrings,
    #[error("command too long: {0} > 58")]
    TooLong(usize),
}

impl CommandError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CommandError::InvalidOpcode(_) => ErrorCode::InvalidOpcode,
            CommandError::TooManyArguments(_) => ErrorCode::VectorTooLong,
            CommandError::TooManyStrings => ErrorCode::TooManyStrings,
            CommandError::TooLong(_) => ErrorCode::ClientTooLong,
        }
    }
}

// The firmware's request grammar accepts integers and strings, nothing
// else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Str(String),
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(value) => write!(f, "{}", value),
            Arg::Str(value) => write!(f, "\"{}\"", value),
        }
    }
}

// Renders an opcode and arguments as command text, `o[1,2,"s"]`; a
// command without arguments is the bare opcode.
pub fn format_command(opcode: char, args: &[Arg]) -> Result<String, CommandError> {
    if !opcode.is_ascii() || !is_valid_opcode(opcode as u8) {
        return Err(CommandError::InvalidOpcode(opcode));
    }
    if args.len() > MAX_ARGUMENTS {
        return Err(CommandError::TooManyArguments(args.len()));
    }
    let strings = args.iter().filter(|arg| matches!(arg, Arg::Str(_))).count();
    if strings > 1 {
        return Err(CommandError::TooManyStrings);
    }

    let mut command = opcode.to_string();
    if !args.is_empty() {
        let rendered = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(",");
        command.push('[');
        command.push_str(&rendered);
        command.push(']');
    }

    if command.len() > MAX_MESSAGE_LENGTH {
        return Err(CommandError::TooLong(command.len()));
    }
    Ok(command)
}
