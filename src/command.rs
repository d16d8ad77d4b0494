//! Parsing for the two line-command surfaces: the chat wire protocol the
//! server reads, and the console commands the client REPL accepts.

use thiserror::Error;

/// Prefix of the machine-parseable reply to `!lookupSilent`.
pub const LOOKUP_RESULT_PREFIX: &str = "!lookupResult ";
/// Payload of a `!lookupResult` reply when no address is registered.
pub const LOOKUP_RESULT_ERROR: &str = "error";
/// Datagram request for the online-user list.
pub const LIST_REQUEST: &str = "!list";
/// Datagram reply to any request other than [`LIST_REQUEST`].
pub const UNKNOWN_DATAGRAM_REPLY: &str = "!unknown";

/// A parse failure whose rendering is the exact reply line sent back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid command!")]
    Unknown,
    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// One command line received by the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Login { username: String, secret: String },
    Logout,
    Send { text: String },
    Register { address: String },
    Lookup { username: String },
    LookupSilent { username: String },
    LastMsg,
    Exit,
}

impl ChatCommand {
    /// Parses one line of the chat wire protocol.
    ///
    /// Command tokens are case-sensitive. Trailing text after a
    /// zero-argument command is ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (token, rest) = split_token(line);
        match token {
            "!login" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(username), Some(secret), None) => Ok(Self::Login {
                        username: username.to_string(),
                        secret: secret.to_string(),
                    }),
                    _ => Err(ParseError::Usage("!login <username> <secret>")),
                }
            }
            "!logout" => Ok(Self::Logout),
            "!send" => {
                if rest.is_empty() {
                    return Err(ParseError::Usage("!send <message>"));
                }
                Ok(Self::Send {
                    text: rest.to_string(),
                })
            }
            "!register" => single_arg(rest, "!register <host:port>")
                .map(|address| Self::Register { address }),
            "!lookup" => {
                single_arg(rest, "!lookup <username>").map(|username| Self::Lookup { username })
            }
            "!lookupSilent" => single_arg(rest, "!lookupSilent <username>")
                .map(|username| Self::LookupSilent { username }),
            "!lastMsg" => Ok(Self::LastMsg),
            "!exit" => Ok(Self::Exit),
            _ => Err(ParseError::Unknown),
        }
    }
}

/// One line typed at the client console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Login { username: String, secret: String },
    Logout,
    Send { text: String },
    Register { address: String },
    Lookup { username: String },
    LastMsg,
    List,
    Msg { recipient: String, text: String },
    Exit,
}

impl ConsoleCommand {
    /// Parses one line of console input.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (token, rest) = split_token(line);
        match token {
            "!login" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(username), Some(secret), None) => Ok(Self::Login {
                        username: username.to_string(),
                        secret: secret.to_string(),
                    }),
                    _ => Err(ParseError::Usage("!login <username> <secret>")),
                }
            }
            "!logout" => Ok(Self::Logout),
            "!send" => {
                if rest.is_empty() {
                    return Err(ParseError::Usage("!send <message>"));
                }
                Ok(Self::Send {
                    text: rest.to_string(),
                })
            }
            "!register" => single_arg(rest, "!register <host:port>")
                .map(|address| Self::Register { address }),
            "!lookup" => {
                single_arg(rest, "!lookup <username>").map(|username| Self::Lookup { username })
            }
            "!lastMsg" => Ok(Self::LastMsg),
            "!list" => Ok(Self::List),
            "!msg" => match rest.split_once(' ') {
                Some((recipient, text)) if !text.trim().is_empty() => Ok(Self::Msg {
                    recipient: recipient.to_string(),
                    text: text.trim().to_string(),
                }),
                _ => Err(ParseError::Usage("!msg <username> <message>")),
            },
            "!exit" => Ok(Self::Exit),
            _ => Err(ParseError::Unknown),
        }
    }
}

fn split_token(line: &str) -> (&str, &str) {
    let trimmed = line.trim();
    match trimmed.split_once(' ') {
        Some((token, rest)) => (token, rest.trim()),
        None => (trimmed, ""),
    }
}

fn single_arg(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    let mut args = rest.split_whitespace();
    match (args.next(), args.next()) {
        (Some(arg), None) => Ok(arg.to_string()),
        _ => Err(ParseError::Usage(usage)),
    }
}
