use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Other(raw) => raw,
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "admin" => Self::Admin,
            "user" => Self::User,
            _ => Self::Other(raw),
        })
    }
}

fn default_role() -> Role {
    Role::User
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default)]
    pub name: Option<String>,

    pub email: String,

    #[serde(default = "default_role")]
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("please login first")]
    NotLoggedIn,

    #[error("only administrators can {action}")]
    NotAdmin { action: &'static str },
}

/// Who is acting. Passed explicitly to every command that needs identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub user: Option<User>,

    /// `name=value` pairs replayed as the `Cookie` header.
    #[serde(default)]
    pub cookie: Option<String>,
}

impl Session {
    pub fn logged_in(user: User, cookie: Option<String>) -> Self {
        Self {
            user: Some(user),
            cookie,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_admin)
    }

    pub fn require_user(&self) -> Result<&User, SessionError> {
        self.user.as_ref().ok_or(SessionError::NotLoggedIn)
    }

    pub fn require_admin(&self, action: &'static str) -> Result<&User, SessionError> {
        let user = self.require_user()?;
        if user.is_admin() {
            Ok(user)
        } else {
            Err(SessionError::NotAdmin { action })
        }
    }
}

/// On-disk home of the session between invocations.
#[derive(Debug)]
pub struct SessionStore {
    pub session_path: PathBuf,
}

impl SessionStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let session_path = data_dir.join("session.json");

        info!(
            data_dir = %data_dir.display(),
            session = %session_path.display(),
            "opened session store"
        );

        Ok(Self { session_path })
    }

    /// A missing or empty file is an anonymous session.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Session> {
        if !self.session_path.exists() {
            debug!("no session file; anonymous session");
            return Ok(Session::default());
        }

        let raw = fs::read_to_string(&self.session_path)
            .with_context(|| format!("failed reading {}", self.session_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Session::default());
        }

        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.session_path.display()))
    }

    #[tracing::instrument(skip(self, session))]
    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        debug!(file = %self.session_path.display(), "saving session atomically");

        let dir = self
            .session_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, session)?;
        writeln!(temp)?;
        temp.flush()?;

        temp.persist(&self.session_path).map_err(|err| {
            anyhow!(
                "failed to persist {}: {}",
                self.session_path.display(),
                err
            )
        })?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> anyhow::Result<()> {
        if self.session_path.exists() {
            fs::remove_file(&self.session_path).with_context(|| {
                format!("failed removing {}", self.session_path.display())
            })?;
        }
        Ok(())
    }
}
