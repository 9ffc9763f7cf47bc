//! quill-admin CLI tool
//!
//! Manages readers, teams, and login sessions for the Quill node.
//!
//! Usage:
//!   quill-admin add-user <email> <first_name> [team]
//!   quill-admin set-team <user_id> <team>
//!   quill-admin list-users
//!   quill-admin open-session <user_id>
//!   quill-admin close-session <session_id>
//!   quill-admin reader-reads <user_id>
//!   quill-admin ping

use chrono::{DateTime, Utc};
use quill_site::models::User;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    AddUser {
        email: String,
        first_name: String,
        team: Option<String>,
    },
    SetTeam { user_id: String, team: String },
    ListUsers,
    OpenSession { user_id: String },
    CloseSession { session_id: String },
    ReaderReads { user_id: String },
    Ping,
}

#[derive(Debug, Deserialize)]
struct ReadEntry {
    slug: String,
    last_read: DateTime<Utc>,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    User { user: User },
    Users { users: Vec<User> },
    Session { session_id: String, expires_at: DateTime<Utc> },
    Reads { reads: Vec<ReadEntry> },
    Pong,
}

fn print_usage() {
    eprintln!("quill-admin - Manage Quill readers and teams");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  quill-admin add-user <email> <first_name> [team]  Register a reader");
    eprintln!("  quill-admin set-team <user_id> <team>             Move a reader to a team");
    eprintln!("  quill-admin list-users                            List all readers");
    eprintln!("  quill-admin open-session <user_id>                Log a reader in");
    eprintln!("  quill-admin close-session <session_id>            Log a session out");
    eprintln!("  quill-admin reader-reads <user_id>                Posts a reader has read");
    eprintln!("  quill-admin ping                                  Check if daemon is running");
    eprintln!();
    eprintln!("Teams: BLUE, RED, YELLOW");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUILL_SOCKET  Path to admin socket (default: ./quill-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("QUILL_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./quill-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to quill-site at {:?}: {}\n\
             Is quill-site running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn required(args: &[String], index: usize, what: &str, command: &str) -> String {
    match args.get(index) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a {} argument", command, what);
            std::process::exit(1);
        }
    }
}

fn print_user(user: &User) {
    println!(
        "{}  {:<8} {} <{}>",
        user.id, user.team.as_str(), user.first_name, user.email
    );
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = args[1].as_str();
    let cmd = match command {
        "add-user" => AdminCommand::AddUser {
            email: required(&args, 2, "email", command),
            first_name: required(&args, 3, "first_name", command),
            team: args.get(4).cloned(),
        },
        "set-team" => AdminCommand::SetTeam {
            user_id: required(&args, 2, "user_id", command),
            team: required(&args, 3, "team", command),
        },
        "list-users" => AdminCommand::ListUsers,
        "open-session" => AdminCommand::OpenSession {
            user_id: required(&args, 2, "user_id", command),
        },
        "close-session" => AdminCommand::CloseSession {
            session_id: required(&args, 2, "session_id", command),
        },
        "reader-reads" => AdminCommand::ReaderReads {
            user_id: required(&args, 2, "user_id", command),
        },
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::User { user } => print_user(&user),
            AdminResponse::Users { users } => {
                if users.is_empty() {
                    println!("(none)");
                }
                for user in &users {
                    print_user(user);
                }
            }
            AdminResponse::Session {
                session_id,
                expires_at,
            } => {
                println!("quill_session={}", session_id);
                println!("expires {}", expires_at.to_rfc3339());
            }
            AdminResponse::Reads { reads } => {
                if reads.is_empty() {
                    println!("(none)");
                }
                for entry in reads {
                    println!("{}  {}", entry.last_read.to_rfc3339(), entry.slug);
                }
            }
            AdminResponse::Pong => {
                println!("pong - quill-site is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
