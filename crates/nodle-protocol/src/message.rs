//! Server-to-client protocol messages.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Prefix of relayed chat lines.
const MESSAGE_PREFIX: &str = "MESSAGE ";

/// Messages sent from the server to a client, one per line.
///
/// The `Display` form is the exact wire text (without the trailing newline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Asks for an account name; also restarts the login dialogue
    SubmitName,

    /// The account exists, asks for its password
    SubmitPass,

    /// The account does not exist, asks whether to create it
    InvalidName,

    /// Asks for the new account's password
    SubmitNewPass,

    /// Asks for the new password again
    VerifyPass,

    /// The two new passwords differed
    MismatchPass,

    /// The new account was written
    AccountCreated,

    /// Password verified and name claimed
    AccountAccepted,

    /// The session is now in the chat relay
    NameAccepted,

    /// A chat line relayed from an authenticated client
    Message {
        /// Sender's account name
        name: String,
        /// Line as the sender typed it
        text: String,
    },
}

impl ServerMessage {
    /// Creates a relayed chat message.
    pub fn message(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Returns the bare token for fixed messages, `None` for chat lines.
    pub fn token(&self) -> Option<&'static str> {
        match self {
            Self::SubmitName => Some("SUBMITNAME"),
            Self::SubmitPass => Some("SUBMITPASS"),
            Self::InvalidName => Some("INVALIDNAME"),
            Self::SubmitNewPass => Some("SUBMITNEWPASS"),
            Self::VerifyPass => Some("VERIFYPASS"),
            Self::MismatchPass => Some("MISMATCHPASS"),
            Self::AccountCreated => Some("ACCOUNTCREATED"),
            Self::AccountAccepted => Some("ACCOUNTACCEPTED"),
            Self::NameAccepted => Some("NAMEACCEPTED"),
            Self::Message { .. } => None,
        }
    }

    /// Whether the server expects a line from the client after this message.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Self::SubmitName
                | Self::SubmitPass
                | Self::InvalidName
                | Self::SubmitNewPass
                | Self::VerifyPass
        )
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { name, text } => write!(f, "{MESSAGE_PREFIX}{name}: {text}"),
            fixed => f.write_str(fixed.token().unwrap_or_default()),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(rest) = line.strip_prefix(MESSAGE_PREFIX) {
            let (name, text) = rest
                .split_once(": ")
                .ok_or_else(|| ProtocolError::MalformedMessage(line.to_string()))?;
            return Ok(Self::message(name, text));
        }

        match line {
            "SUBMITNAME" => Ok(Self::SubmitName),
            "SUBMITPASS" => Ok(Self::SubmitPass),
            "INVALIDNAME" => Ok(Self::InvalidName),
            "SUBMITNEWPASS" => Ok(Self::SubmitNewPass),
            "VERIFYPASS" => Ok(Self::VerifyPass),
            "MISMATCHPASS" => Ok(Self::MismatchPass),
            "ACCOUNTCREATED" => Ok(Self::AccountCreated),
            "ACCOUNTACCEPTED" => Ok(Self::AccountAccepted),
            "NAMEACCEPTED" => Ok(Self::NameAccepted),
            other => Err(ProtocolError::UnknownToken(other.to_string())),
        }
    }
}

/// Errors reading a server line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown server token: {0:?}")]
    UnknownToken(String),

    #[error("Malformed chat message: {0:?}")]
    MalformedMessage(String),
}
