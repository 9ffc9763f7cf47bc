//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for managing readers, their teams, and
//! login sessions.

use crate::error::Result;
use crate::models::{ClientIdentity, User, DEFAULT_SESSION_LIFETIME_DAYS};
use crate::ranking::RankingAggregator;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use quill_rankings::{Scope, Team};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Register a reader
    AddUser {
        email: String,
        first_name: String,
        #[serde(default)]
        team: Option<String>,
    },
    /// Move a reader to another team
    SetTeam { user_id: String, team: String },
    /// List all readers
    ListUsers,
    /// Log a reader in; the returned ID goes in the session cookie
    OpenSession { user_id: String },
    /// Log a session out
    CloseSession { session_id: String },
    /// Posts a reader has read
    ReaderReads { user_id: String },
    /// Ping (health check)
    Ping,
}

/// One post in a reader's history.
#[derive(Debug, Serialize)]
pub struct ReadEntry {
    pub slug: String,
    pub last_read: DateTime<Utc>,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    User { user: User },
    Users { users: Vec<User> },
    Session { session_id: String, expires_at: DateTime<Utc> },
    Reads { reads: Vec<ReadEntry> },
    Pong,
}

impl AdminResponse {
    fn error(e: impl ToString) -> Self {
        AdminResponse::Error {
            error: e.to_string(),
        }
    }
}

/// Admin socket server.
pub struct AdminSocket {
    storage: Arc<Storage>,
    socket_path: PathBuf,
    aggregator: Option<RankingAggregator>,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(storage: Arc<Storage>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            socket_path: socket_path.into(),
            aggregator: None,
        }
    }

    /// Drop cached rankings affected by team changes.
    pub fn with_aggregator(mut self, aggregator: RankingAggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let storage = Arc::clone(&self.storage);
                    let aggregator = self.aggregator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, storage, aggregator).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(
    stream: UnixStream,
    storage: Arc<Storage>,
    aggregator: Option<RankingAggregator>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &storage, aggregator.as_ref()).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

/// Invalidate the overall board and every post the user has read.
async fn invalidate_rankings_for(
    storage: &Storage,
    aggregator: Option<&RankingAggregator>,
    user_id: &str,
) {
    let Some(aggregator) = aggregator else {
        return;
    };
    aggregator.invalidate(&Scope::Overall).await;
    match storage.reads_by(&ClientIdentity::User(user_id.to_string())) {
        Ok(reads) => {
            for (slug, _) in reads {
                aggregator.invalidate(&Scope::Post(slug)).await;
            }
        }
        Err(e) => tracing::warn!("Cannot list reads of {}: {}", user_id, e),
    }
}

async fn execute_command(
    cmd: AdminCommand,
    storage: &Storage,
    aggregator: Option<&RankingAggregator>,
) -> AdminResponse {
    match cmd {
        AdminCommand::AddUser {
            email,
            first_name,
            team,
        } => {
            let team = match team.as_deref().map(str::parse::<Team>).transpose() {
                Ok(team) => team.unwrap_or_default(),
                Err(e) => return AdminResponse::error(e),
            };
            let user = User::new(email, first_name, team);
            match storage.put_user(&user) {
                Ok(()) => {
                    tracing::info!("Added user {} on team {}", user.id, user.team);
                    AdminResponse::User { user }
                }
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::SetTeam { user_id, team } => {
            let team = match team.parse::<Team>() {
                Ok(team) => team,
                Err(e) => return AdminResponse::error(e),
            };
            match storage.set_team(&user_id, team) {
                Ok(user) => {
                    tracing::info!("Moved user {} to team {}", user.id, user.team);
                    invalidate_rankings_for(storage, aggregator, &user.id).await;
                    AdminResponse::User { user }
                }
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::ListUsers => match storage.list_users() {
            Ok(users) => AdminResponse::Users { users },
            Err(e) => AdminResponse::error(e),
        },

        AdminCommand::OpenSession { user_id } => {
            let lifetime = chrono::Duration::days(DEFAULT_SESSION_LIFETIME_DAYS);
            match storage.open_session(&user_id, lifetime) {
                Ok(session) => {
                    tracing::info!("Opened session for user {}", user_id);
                    AdminResponse::Session {
                        session_id: session.id,
                        expires_at: session.expires_at,
                    }
                }
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::CloseSession { session_id } => match storage.close_session(&session_id) {
            Ok(()) => AdminResponse::Ok {
                message: "Session closed".to_string(),
            },
            Err(e) => AdminResponse::error(e),
        },

        AdminCommand::ReaderReads { user_id } => {
            match storage.reads_by(&ClientIdentity::User(user_id)) {
                Ok(reads) => AdminResponse::Reads {
                    reads: reads
                        .into_iter()
                        .map(|(slug, last_read)| ReadEntry { slug, last_read })
                        .collect(),
                },
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    }
}
