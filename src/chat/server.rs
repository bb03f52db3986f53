/// Chat server core — shared registries, client handling, command dispatch.
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use super::codec::{CodecError, LineCodec, Outbound};
use super::command::{Command, CommandError};
use super::reply::{Category, Reply};

/// Help summary sent in the welcome banner.
const HELP_SUMMARY: &str =
    "Available commands: REGISTER, BROADCAST, JOIN, LEAVE, GROUPCAST, STATUS, QUIT, HELP";

/// Per-command help, one reply line each.
const HELP_LINES: [&str; 8] = [
    "Commands:",
    "  REGISTER <username> - Register your username",
    "  BROADCAST <message> - Send message to all users",
    "  JOIN <group> - Join a group",
    "  LEAVE <group> - Leave a group",
    "  GROUPCAST <group> <message> - Send message to group",
    "  STATUS - Show your current status",
    "  QUIT - Disconnect from server",
];

/// Handle to push reply lines to a connected client.
///
/// The receiving half lives in the owning connection task, which writes
/// whole lines between its own responses — pushed lines may interleave
/// with responses but never tear mid-line.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub username: String,
    pub addr: SocketAddr,
    pub tx: mpsc::UnboundedSender<Reply>,
}

/// Outcome of a register attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    InvalidFormat,
    NameTaken,
}

/// Shared server state: who is online, and which groups exist.
///
/// Compound check-then-mutate operations are single methods here, so a
/// caller holding the write lock performs them atomically with respect
/// to every other connection task.
#[derive(Debug, Default)]
pub struct ServerState {
    /// Registered sessions: username → sender handle.
    sessions: HashMap<String, SessionHandle>,
    /// Groups: group name → member usernames. A group is created on
    /// first JOIN and never destroyed; empty groups persist.
    groups: HashMap<String, HashSet<String>>,
}

/// Shared, thread-safe server state.
pub type SharedState = Arc<RwLock<ServerState>>;

/// Create a fresh shared server state.
pub fn new_state() -> SharedState {
    Arc::new(RwLock::new(ServerState::default()))
}

/// Username format: 1-20 characters from `[A-Za-z0-9_]`.
pub fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 20
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ServerState {
    /// Bind a username to a session if the format is valid and the name
    /// is free.
    pub fn register(&mut self, handle: SessionHandle) -> RegisterOutcome {
        if !valid_username(&handle.username) {
            return RegisterOutcome::InvalidFormat;
        }
        if self.sessions.contains_key(&handle.username) {
            return RegisterOutcome::NameTaken;
        }
        self.sessions.insert(handle.username.clone(), handle);
        RegisterOutcome::Registered
    }

    /// Remove a departing session from the session table and from every
    /// group's member set.
    pub fn remove_session(&mut self, username: &str) {
        self.sessions.remove(username);
        for members in self.groups.values_mut() {
            members.remove(username);
        }
    }

    /// Add a user to a group, creating the group on first join.
    /// Returns `false` if the user was already a member.
    pub fn join(&mut self, username: &str, group: &str) -> bool {
        self.groups
            .entry(group.to_owned())
            .or_default()
            .insert(username.to_owned())
    }

    /// Remove a user from a group. Returns `false` if the user was not a
    /// member (or the group has never been created).
    pub fn leave(&mut self, username: &str, group: &str) -> bool {
        self.groups
            .get_mut(group)
            .is_some_and(|members| members.remove(username))
    }

    pub fn is_member(&self, username: &str, group: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(username))
    }

    pub fn session(&self, username: &str) -> Option<&SessionHandle> {
        self.sessions.get(username)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionHandle> {
        self.sessions.values()
    }

    /// Current members of a group, if it exists.
    pub fn group_members(&self, group: &str) -> Option<&HashSet<String>> {
        self.groups.get(group)
    }

    /// Sorted usernames of everyone online.
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.sessions.keys().cloned().collect();
        users.sort();
        users
    }

    /// Sorted names of the groups a user belongs to.
    pub fn groups_of(&self, username: &str) -> Vec<String> {
        let mut groups: Vec<String> = self
            .groups
            .iter()
            .filter(|(_, members)| members.contains(username))
            .map(|(name, _)| name.clone())
            .collect();
        groups.sort();
        groups
    }
}

/// Run the chat server on the given addresses.
///
/// Binds every address in the slice and accepts connections on all of
/// them, sharing one registry. Bind failure is fatal at startup.
pub async fn run(addrs: &[&str]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = new_state();

    // Bind all listeners first, so we fail fast on port conflicts.
    let mut listeners = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let listener = TcpListener::bind(addr).await?;
        info!("cove listening on {addr}");
        listeners.push(listener);
    }

    let mut handles = Vec::new();
    for listener in listeners {
        let state = Arc::clone(&state);
        handles.push(tokio::spawn(serve(listener, state)));
    }

    // Wait for any listener to exit (they shouldn't).
    for handle in handles {
        handle.await??;
    }

    Ok(())
}

/// Accept loop for a single bound listener.
pub async fn serve(
    listener: TcpListener,
    state: SharedState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (socket, addr) = listener.accept().await?;
        info!(%addr, "new connection");
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            handle_client(socket, addr, state).await;
            info!(%addr, "disconnected");
        });
    }
}

/// Handle a single client connection.
///
/// Session cleanup runs on every exit path — QUIT, end-of-stream, or an
/// I/O error inside the read loop.
async fn handle_client(socket: TcpStream, addr: SocketAddr, state: SharedState) {
    let mut framed = Framed::new(socket, LineCodec);
    let (tx, rx) = mpsc::unbounded_channel::<Reply>();
    let mut username: Option<String> = None;

    if let Err(e) = drive(&mut framed, &mut username, &tx, rx, addr, &state).await {
        warn!(%addr, "connection error: {e}");
    }

    if let Some(name) = username {
        let mut st = state.write().await;
        st.remove_session(&name);
        info!(username = %name, "unregistered");
    }
}

/// Result of handling one command.
enum CommandResult {
    Continue,
    Quit,
}

/// The connection's request/response loop.
async fn drive(
    framed: &mut Framed<TcpStream, LineCodec>,
    username: &mut Option<String>,
    tx: &mpsc::UnboundedSender<Reply>,
    mut rx: mpsc::UnboundedReceiver<Reply>,
    addr: SocketAddr,
    state: &SharedState,
) -> Result<(), CodecError> {
    framed
        .send(Outbound::Line(
            Reply::new(100, Category::Info, "CONNECTED").arg("Welcome to Cove"),
        ))
        .await?;
    framed
        .send(Outbound::Line(
            Reply::new(100, Category::Info, "HELP").arg(HELP_SUMMARY),
        ))
        .await?;
    framed.send(Outbound::Prompt).await?;

    loop {
        tokio::select! {
            // One command line from the client's own socket.
            frame = framed.next() => {
                let line = match frame {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!(%addr, "framing error: {e}");
                        break;
                    }
                    None => break, // Connection closed.
                };

                match handle_line(framed, username, tx, addr, state, &line).await? {
                    CommandResult::Continue => framed.send(Outbound::Prompt).await?,
                    CommandResult::Quit => break,
                }
            }

            // A line pushed by another connection (broadcast, group message).
            Some(reply) = rx.recv() => {
                framed.send(Outbound::Line(reply)).await?;
            }
        }
    }

    Ok(())
}

/// Parse one line and run the command against the shared registries.
async fn handle_line(
    framed: &mut Framed<TcpStream, LineCodec>,
    username: &mut Option<String>,
    tx: &mpsc::UnboundedSender<Reply>,
    addr: SocketAddr,
    state: &SharedState,
    line: &str,
) -> Result<CommandResult, CodecError> {
    let cmd = match Command::parse(line) {
        Ok(Some(cmd)) => cmd,
        // A blank line warrants no response, just a fresh prompt.
        Ok(None) => return Ok(CommandResult::Continue),
        Err(CommandError::Unknown) => {
            framed.send(Outbound::Line(Reply::unknown_command())).await?;
            return Ok(CommandResult::Continue);
        }
        Err(CommandError::BadArity) => {
            framed.send(Outbound::Line(Reply::invalid_format())).await?;
            return Ok(CommandResult::Continue);
        }
    };

    match cmd {
        Command::Register { username: name } => {
            let reply = {
                let mut st = state.write().await;
                match st.register(SessionHandle {
                    username: name.clone(),
                    addr,
                    tx: tx.clone(),
                }) {
                    RegisterOutcome::Registered => {
                        // A connection that re-registers abandons its old name.
                        if let Some(old) = username.replace(name.clone()) {
                            st.remove_session(&old);
                        }
                        info!(username = %name, %addr, "registered");
                        Reply::new(200, Category::Ok, "REGISTERED").arg(name.as_str())
                    }
                    RegisterOutcome::InvalidFormat => {
                        Reply::new(401, Category::Error, "INVALID_USERNAME_FORMAT")
                    }
                    RegisterOutcome::NameTaken => {
                        Reply::new(400, Category::Error, "USERNAME_ALREADY_EXISTS")
                    }
                }
            };
            framed.send(Outbound::Line(reply)).await?;
        }

        Command::Broadcast { text } => match username.as_deref() {
            None => framed.send(Outbound::Line(Reply::not_registered())).await?,
            Some(sender) => {
                let push = Reply::new(100, Category::Info, "BROADCAST_MESSAGE")
                    .arg(sender)
                    .arg(text.as_str());
                {
                    let st = state.read().await;
                    for handle in st.sessions().filter(|h| h.username != sender) {
                        let _ = handle.tx.send(push.clone());
                    }
                }
                info!(username = %sender, "broadcast");
                // The sender's own copy, then the response.
                framed.send(Outbound::Line(push)).await?;
                framed
                    .send(Outbound::Line(Reply::new(200, Category::Ok, "MESSAGE_SENT")))
                    .await?;
            }
        },

        Command::Join { group } => {
            let reply = match username.as_deref() {
                None => Reply::not_registered(),
                Some(sender) => {
                    let mut st = state.write().await;
                    if st.join(sender, &group) {
                        info!(username = %sender, group = %group, "joined");
                        Reply::new(200, Category::Ok, "JOINED").arg(group.as_str())
                    } else {
                        Reply::new(402, Category::Error, "ALREADY_JOINED").arg(group.as_str())
                    }
                }
            };
            framed.send(Outbound::Line(reply)).await?;
        }

        Command::Leave { group } => {
            let reply = match username.as_deref() {
                None => Reply::not_registered(),
                Some(sender) => {
                    let mut st = state.write().await;
                    if st.leave(sender, &group) {
                        info!(username = %sender, group = %group, "left");
                        Reply::new(200, Category::Ok, "LEFT").arg(group.as_str())
                    } else {
                        Reply::new(404, Category::Error, "NOT_IN_GROUP").arg(group.as_str())
                    }
                }
            };
            framed.send(Outbound::Line(reply)).await?;
        }

        Command::Groupcast { group, text } => match username.as_deref() {
            None => framed.send(Outbound::Line(Reply::not_registered())).await?,
            Some(sender) => {
                let delivered = {
                    let st = state.read().await;
                    if !st.is_member(sender, &group) {
                        false
                    } else {
                        let push = Reply::new(100, Category::Info, "GROUP_MESSAGE")
                            .arg(group.as_str())
                            .arg(sender)
                            .arg(text.as_str());
                        if let Some(members) = st.group_members(&group) {
                            for member in members.iter().filter(|m| *m != sender) {
                                if let Some(handle) = st.session(member) {
                                    let _ = handle.tx.send(push.clone());
                                }
                            }
                        }
                        true
                    }
                };
                if delivered {
                    info!(username = %sender, group = %group, "group message");
                    let own = Reply::new(100, Category::Info, "GROUP_MESSAGE")
                        .arg(group.as_str())
                        .arg(sender)
                        .arg(text.as_str());
                    framed.send(Outbound::Line(own)).await?;
                    framed
                        .send(Outbound::Line(Reply::new(
                            200,
                            Category::Ok,
                            "GROUP_MESSAGE_SENT",
                        )))
                        .await?;
                } else {
                    framed
                        .send(Outbound::Line(
                            Reply::new(404, Category::Error, "NOT_IN_GROUP").arg(group.as_str()),
                        ))
                        .await?;
                }
            }
        },

        Command::Status => match username.as_deref() {
            None => framed.send(Outbound::Line(Reply::not_registered())).await?,
            Some(sender) => {
                let (users, groups) = {
                    let st = state.read().await;
                    (st.online_users(), st.groups_of(sender))
                };
                for text in [
                    format!("Connected as: {sender}"),
                    format!("Online users: {}", bracket_list(&users)),
                    format!("Joined groups: {}", bracket_list(&groups)),
                ] {
                    framed
                        .send(Outbound::Line(
                            Reply::new(100, Category::Info, "STATUS").arg(text),
                        ))
                        .await?;
                }
            }
        },

        Command::Help => {
            for line in HELP_LINES {
                framed
                    .send(Outbound::Line(
                        Reply::new(100, Category::Info, "HELP").arg(line),
                    ))
                    .await?;
            }
        }

        Command::Quit => {
            framed
                .send(Outbound::Line(Reply::new(200, Category::Ok, "GOODBYE")))
                .await?;
            return Ok(CommandResult::Quit);
        }
    }

    Ok(CommandResult::Continue)
}

/// Render a list the way STATUS prints it: `[a, b, c]`.
fn bracket_list(items: &[String]) -> String {
    format!("[{}]", items.join(", "))
}
