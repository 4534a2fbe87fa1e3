//! Identifier grammars shared by run creation and keyin handlers.
//!
//! | Identifier | Length | Characters            |
//! |------------|--------|-----------------------|
//! | run-id     | 1–12   | `A-Z a-z 0-9`         |
//! | project-id | 1–12   | `A-Z a-z 0-9 - $`     |
//! | qualifier  | 1–12   | `A-Z a-z 0-9 - $`     |
//! | filename   | 1–12   | `A-Z a-z 0-9 - $`     |
//! | account-id | 1–12   | `A-Z a-z 0-9 - .`     |
//! | user-id    | 1–12   | `A-Z a-z 0-9 - .`     |
//! | read/write key | 1–6 | [`KEY_CHARSET`]      |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ExecError, Result};

/// Maximum length of every identifier except keys.
pub const MAX_IDENT_LEN: usize = 12;
/// Maximum length of a read or write key.
pub const MAX_KEY_LEN: usize = 6;

/// Punctuation allowed in read/write keys, in addition to letters and digits.
pub const KEY_PUNCTUATION: &str = "!#$%&-";

/// The 68 characters accepted in read/write keys.
pub const KEY_CHARSET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#$%&-";

/// Which grammar an identifier is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentKind {
    RunId,
    AccountId,
    ProjectId,
    UserId,
    Qualifier,
    Filename,
    Key,
}

impl IdentKind {
    pub fn field_name(self) -> &'static str {
        match self {
            IdentKind::RunId => "run-id",
            IdentKind::AccountId => "account-id",
            IdentKind::ProjectId => "project-id",
            IdentKind::UserId => "user-id",
            IdentKind::Qualifier => "qualifier",
            IdentKind::Filename => "filename",
            IdentKind::Key => "key",
        }
    }

    fn max_len(self) -> usize {
        match self {
            IdentKind::Key => MAX_KEY_LEN,
            _ => MAX_IDENT_LEN,
        }
    }

    fn allows(self, c: char) -> bool {
        match self {
            IdentKind::RunId => c.is_ascii_alphanumeric(),
            IdentKind::ProjectId | IdentKind::Qualifier | IdentKind::Filename => {
                c.is_ascii_alphanumeric() || c == '-' || c == '$'
            }
            IdentKind::AccountId | IdentKind::UserId => {
                c.is_ascii_alphanumeric() || c == '-' || c == '.'
            }
            IdentKind::Key => c.is_ascii_alphanumeric() || KEY_PUNCTUATION.contains(c),
        }
    }

    /// Check `value` against this grammar.
    pub fn validate(self, value: &str) -> Result<()> {
        let field = self.field_name();
        if value.is_empty() {
            return Err(ExecError::invalid(field, "must not be empty"));
        }
        let len = value.chars().count();
        if len > self.max_len() {
            return Err(ExecError::invalid(
                field,
                format!("'{value}' is {len} characters, maximum is {}", self.max_len()),
            ));
        }
        if let Some(bad) = value.chars().find(|c| !self.allows(*c)) {
            return Err(ExecError::invalid(
                field,
                format!("'{value}' contains illegal character {bad:?}"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for IdentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

impl FromStr for IdentKind {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "run-id" | "run" | "runid" => Ok(IdentKind::RunId),
            "account-id" | "account" => Ok(IdentKind::AccountId),
            "project-id" | "project" => Ok(IdentKind::ProjectId),
            "user-id" | "user" => Ok(IdentKind::UserId),
            "qualifier" => Ok(IdentKind::Qualifier),
            "filename" | "file" => Ok(IdentKind::Filename),
            "key" => Ok(IdentKind::Key),
            other => Err(ExecError::invalid("identifier kind", format!("unknown kind '{other}'"))),
        }
    }
}

pub fn validate_run_id(value: &str) -> Result<()> {
    IdentKind::RunId.validate(value)
}

pub fn validate_account_id(value: &str) -> Result<()> {
    IdentKind::AccountId.validate(value)
}

pub fn validate_project_id(value: &str) -> Result<()> {
    IdentKind::ProjectId.validate(value)
}

pub fn validate_user_id(value: &str) -> Result<()> {
    IdentKind::UserId.validate(value)
}

pub fn validate_qualifier(value: &str) -> Result<()> {
    IdentKind::Qualifier.validate(value)
}

pub fn validate_filename(value: &str) -> Result<()> {
    IdentKind::Filename.validate(value)
}

pub fn validate_key(value: &str) -> Result<()> {
    IdentKind::Key.validate(value)
}
