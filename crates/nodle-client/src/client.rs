//! Line-protocol chat client.
//!
//! The client keeps track of whether the server's last message was a
//! `SUBMITNAME` prompt, so [`ChatClient::login`] and
//! [`ChatClient::register`] can be called back to back: each starts from
//! the name prompt, consuming it first if it has not arrived yet.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::debug;

use nodle_protocol::ServerMessage;

use crate::error::{ClientError, Result};

/// Longest server line accepted, in bytes.
const MAX_SERVER_LINE: usize = 64 * 1024;

/// Result of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Logged in; chat lines can now be sent
    Accepted,
    /// Wrong password, name already logged in, invalid name or unreadable record
    Rejected,
    /// No such account; the creation offer was declined
    UnknownAccount,
}

/// Result of an account creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The account was written; log in next
    Created,
    /// The server reported the confirmation did not match
    Mismatch,
    /// The account already exists; the name prompt is pending
    AlreadyExists,
    /// The account already exists with an empty password, and backing out
    /// of its password prompt logged in
    LoggedIn,
    /// The server returned to the name prompt without creating the account
    Failed,
}

/// Chat client over a split byte stream.
pub struct ChatClient<R, W> {
    lines: FramedRead<R, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,

    /// Last message received was `SUBMITNAME` and has not been answered
    at_name_prompt: bool,
}

/// Chat client over a TCP connection.
pub type TcpChatClient = ChatClient<OwnedReadHalf, OwnedWriteHalf>;

impl TcpChatClient {
    /// Connects to a chat server.
    pub async fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let label = addr.to_string();
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::Connect {
                addr: label.clone(),
                error: e.to_string(),
            })?;

        debug!(addr = %label, "Connected to chat server");
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer))
    }
}

impl<R, W> ChatClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a client over an already-open stream.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_SERVER_LINE)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            at_name_prompt: false,
        }
    }

    /// Receives the next server message.
    ///
    /// Returns `Ok(None)` once the server has closed the connection.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        let line = match self.lines.next().await {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                return Err(ClientError::Io("server line too long".to_string()));
            }
            Some(Err(LinesCodecError::Io(e))) => return Err(ClientError::Io(e.to_string())),
            None => return Ok(None),
        };

        let msg: ServerMessage = line.parse()?;
        self.at_name_prompt = msg == ServerMessage::SubmitName;
        Ok(Some(msg))
    }

    /// Sends one line to the server.
    ///
    /// Once logged in, every line is a chat message.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.at_name_prompt = false;
        self.writer
            .send(line)
            .await
            .map_err(|e| ClientError::Io(e.to_string()))
    }

    /// Logs in as an existing account.
    pub async fn login(&mut self, name: &str, password: &str) -> Result<LoginOutcome> {
        self.submit_name(name).await?;

        match self.recv_required().await? {
            ServerMessage::SubmitPass => {}
            ServerMessage::SubmitName => return Ok(LoginOutcome::Rejected),
            ServerMessage::InvalidName => {
                self.send_line("no").await?;
                return Ok(LoginOutcome::UnknownAccount);
            }
            other => return Err(unexpected("SUBMITPASS", other)),
        }

        self.send_line(password).await?;

        match self.recv_required().await? {
            ServerMessage::AccountAccepted => {}
            ServerMessage::SubmitName => return Ok(LoginOutcome::Rejected),
            other => return Err(unexpected("ACCOUNTACCEPTED", other)),
        }

        match self.recv_required().await? {
            ServerMessage::NameAccepted => Ok(LoginOutcome::Accepted),
            other => Err(unexpected("NAMEACCEPTED", other)),
        }
    }

    /// Creates a new account. Does not log in.
    pub async fn register(&mut self, name: &str, password: &str) -> Result<RegisterOutcome> {
        self.register_confirmed(name, password, password).await
    }

    /// Creates a new account, sending `confirmation` as the repeated password.
    pub async fn register_confirmed(
        &mut self,
        name: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<RegisterOutcome> {
        self.submit_name(name).await?;

        match self.recv_required().await? {
            ServerMessage::InvalidName => {}
            ServerMessage::SubmitName => return Ok(RegisterOutcome::Failed),
            ServerMessage::SubmitPass => return self.back_out_of_login().await,
            other => return Err(unexpected("INVALIDNAME", other)),
        }

        self.send_line("yes").await?;
        self.expect(ServerMessage::SubmitNewPass).await?;
        self.send_line(password).await?;
        self.expect(ServerMessage::VerifyPass).await?;
        self.send_line(confirmation).await?;

        match self.recv_required().await? {
            ServerMessage::AccountCreated => Ok(RegisterOutcome::Created),
            ServerMessage::MismatchPass => Ok(RegisterOutcome::Mismatch),
            ServerMessage::SubmitName => Ok(RegisterOutcome::Failed),
            other => Err(unexpected("ACCOUNTCREATED", other)),
        }
    }

    /// Answers an unwanted password prompt with an empty password.
    ///
    /// An account whose stored password is empty accepts it, which leaves
    /// the session logged in.
    async fn back_out_of_login(&mut self) -> Result<RegisterOutcome> {
        self.send_line("").await?;

        match self.recv_required().await? {
            ServerMessage::SubmitName => Ok(RegisterOutcome::AlreadyExists),
            ServerMessage::AccountAccepted => {
                self.expect(ServerMessage::NameAccepted).await?;
                Ok(RegisterOutcome::LoggedIn)
            }
            other => Err(unexpected("SUBMITNAME", other)),
        }
    }

    /// Waits for the name prompt unless it is already pending, then answers it.
    async fn submit_name(&mut self, name: &str) -> Result<()> {
        if !self.at_name_prompt {
            self.expect(ServerMessage::SubmitName).await?;
        }
        self.send_line(name).await
    }

    async fn expect(&mut self, expected: ServerMessage) -> Result<()> {
        let got = self.recv_required().await?;
        if got == expected {
            Ok(())
        } else {
            Err(unexpected(expected.token().unwrap_or("MESSAGE"), got))
        }
    }

    async fn recv_required(&mut self) -> Result<ServerMessage> {
        self.recv().await?.ok_or(ClientError::Disconnected)
    }
}

fn unexpected(expected: &'static str, got: ServerMessage) -> ClientError {
    ClientError::Unexpected {
        expected,
        got: got.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    enum Step {
        /// Server writes this line
        Say(&'static str),
        /// Server reads a line and checks it
        Expect(&'static str),
    }
    use Step::{Expect, Say};

    type TestClient = ChatClient<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    /// Plays a fixed server script against the client, then hangs up.
    fn scripted(script: Vec<Step>) -> (TestClient, JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, mut server_write) = tokio::io::split(server);

        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            for step in script {
                match step {
                    Say(line) => {
                        server_write.write_all(line.as_bytes()).await.unwrap();
                        server_write.write_all(b"\n").await.unwrap();
                    }
                    Expect(line) => {
                        let got = lines.next_line().await.unwrap();
                        assert_eq!(got.as_deref(), Some(line));
                    }
                }
            }
        });

        let (read, write) = tokio::io::split(client);
        (ChatClient::new(read, write), task)
    }

    #[tokio::test]
    async fn test_login_accepted() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("alice"),
            Say("SUBMITPASS"),
            Expect("hunter2"),
            Say("ACCOUNTACCEPTED"),
            Say("NAMEACCEPTED"),
            Expect("hello"),
            Say("MESSAGE alice: hello"),
        ]);

        assert_eq!(client.login("alice", "hunter2").await.unwrap(), LoginOutcome::Accepted);
        client.send_line("hello").await.unwrap();
        assert_eq!(
            client.recv().await.unwrap(),
            Some(ServerMessage::message("alice", "hello"))
        );

        server.await.unwrap();
        assert_eq!(client.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejected_login_then_retry() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("alice"),
            Say("SUBMITPASS"),
            Expect("wrong"),
            Say("SUBMITNAME"),
            // The pending prompt is reused, not waited for again
            Expect("alice"),
            Say("SUBMITPASS"),
            Expect("hunter2"),
            Say("ACCOUNTACCEPTED"),
            Say("NAMEACCEPTED"),
        ]);

        assert_eq!(client.login("alice", "wrong").await.unwrap(), LoginOutcome::Rejected);
        assert_eq!(client.login("alice", "hunter2").await.unwrap(), LoginOutcome::Accepted);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_unknown_account_declines_creation() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("ghost"),
            Say("INVALIDNAME"),
            Expect("no"),
            Say("SUBMITNAME"),
        ]);

        assert_eq!(
            client.login("ghost", "pw").await.unwrap(),
            LoginOutcome::UnknownAccount
        );
        assert_eq!(client.recv().await.unwrap(), Some(ServerMessage::SubmitName));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_created() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("alice"),
            Say("INVALIDNAME"),
            Expect("yes"),
            Say("SUBMITNEWPASS"),
            Expect("pw"),
            Say("VERIFYPASS"),
            Expect("pw"),
            Say("ACCOUNTCREATED"),
            Say("SUBMITNAME"),
        ]);

        assert_eq!(
            client.register("alice", "pw").await.unwrap(),
            RegisterOutcome::Created
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_mismatch() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("alice"),
            Say("INVALIDNAME"),
            Expect("yes"),
            Say("SUBMITNEWPASS"),
            Expect("one"),
            Say("VERIFYPASS"),
            Expect("two"),
            Say("MISMATCHPASS"),
        ]);

        assert_eq!(
            client.register_confirmed("alice", "one", "two").await.unwrap(),
            RegisterOutcome::Mismatch
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_existing_account_backs_out() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("alice"),
            Say("SUBMITPASS"),
            Expect(""),
            Say("SUBMITNAME"),
        ]);

        assert_eq!(
            client.register("alice", "pw").await.unwrap(),
            RegisterOutcome::AlreadyExists
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_existing_account_then_login() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("alice"),
            Say("SUBMITPASS"),
            Expect(""),
            Say("SUBMITNAME"),
            Expect("alice"),
            Say("SUBMITPASS"),
            Expect("pw"),
            Say("ACCOUNTACCEPTED"),
            Say("NAMEACCEPTED"),
        ]);

        assert_eq!(
            client.register("alice", "other").await.unwrap(),
            RegisterOutcome::AlreadyExists
        );
        assert_eq!(
            client.login("alice", "pw").await.unwrap(),
            LoginOutcome::Accepted
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_empty_password_account_logs_in() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("bob"),
            Say("SUBMITPASS"),
            Expect(""),
            Say("ACCOUNTACCEPTED"),
            Say("NAMEACCEPTED"),
            Expect("hi"),
        ]);

        assert_eq!(
            client.register("bob", "pw").await.unwrap(),
            RegisterOutcome::LoggedIn
        );
        client.send_line("hi").await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_mid_dialogue() {
        let (mut client, server) = scripted(vec![Say("SUBMITNAME"), Expect("alice")]);

        let err = client.login("alice", "pw").await.unwrap_err();
        assert!(matches!(err, ClientError::Disconnected));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_token_is_protocol_error() {
        let (mut client, server) = scripted(vec![Say("HELLO")]);

        let err = client.recv().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_out_of_order_message() {
        let (mut client, server) = scripted(vec![
            Say("SUBMITNAME"),
            Expect("alice"),
            Say("NAMEACCEPTED"),
        ]);

        let err = client.login("alice", "pw").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Unexpected {
                expected: "SUBMITPASS",
                ..
            }
        ));
        server.await.unwrap();
    }
}
