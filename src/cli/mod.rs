//! CLI module - Command-line interface for MediaMirror
//!
//! Account administration from the shell, plus the `serve` entry point.

mod commands;

use clap::{Parser, Subcommand};

/// MediaMirror - multi-user web service
#[derive(Parser)]
#[command(name = "mediamirror")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web server (default)
    #[command(alias = "daemon", alias = "web")]
    Serve,

    /// Create a user
    CreateUser {
        username: String,
        /// Password for the new user
        #[arg(long, env = "APP_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Delete a user with their sessions, grants and API keys
    #[command(alias = "rm-user")]
    DeleteUser { username: String },

    /// List users and their permissions
    #[command(alias = "ls")]
    Users {
        /// Case-insensitive username filter
        #[arg(long)]
        filter: Option<String>,
    },

    /// Grant permissions to a user
    Grant {
        username: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Revoke permissions from a user
    Revoke {
        username: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Register a new permission
    CreatePermission { key: String, description: String },

    /// List registered permissions
    #[command(alias = "perms")]
    Permissions,

    /// Issue an API key for a user
    CreateApiKey {
        username: String,
        #[arg(long)]
        expires_in_days: Option<i64>,
    },

    /// Write a default config file
    Init,
}

pub use commands::*;
