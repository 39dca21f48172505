// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Gateway wire protocol
//!
//! One JSON object per line in each direction. The server speaks first
//! with a `hello` carrying the authentication challenge; after that every
//! request gets exactly one response. Binary payloads travel as base64.
//!
//! ```text
//! <- {"type":"hello","challenge":"...","furl":"pb://..."}
//! -> {"op":"auth_password","username":"alice","password":"password"}
//! <- {"type":"ok","username":"alice"}
//! -> {"op":"listdir"}
//! <- {"type":"ok","names":[]}
//! -> {"op":"rmdir","path":"nope"}
//! <- {"type":"error","code":"not_found","message":"No such file or directory: /nope"}
//! ```

use crate::domain::vfs::{FileStat, FsError, HandleId, OpenMode};
use serde::{Deserialize, Serialize};

/// Longest accepted frame
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Error code for frames that are not valid requests
pub const BAD_REQUEST: &str = "bad_request";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOpenMode {
    Read,
    Write,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    AuthPassword {
        username: String,
        password: String,
    },
    AuthPublicKey {
        username: String,
        /// `ssh-ed25519 <base64>` or bare base64
        public_key: String,
        /// Base64 Ed25519 signature over the challenge message
        signature: String,
    },
    Open {
        path: String,
        mode: WireOpenMode,
        #[serde(default)]
        truncate: bool,
    },
    Read {
        handle: HandleId,
        #[serde(default)]
        offset: Option<u64>,
        length: usize,
    },
    Write {
        handle: HandleId,
        #[serde(default)]
        offset: Option<u64>,
        data: String,
    },
    Close {
        handle: HandleId,
    },
    Mkdir {
        path: String,
    },
    Rmdir {
        path: String,
    },
    Remove {
        path: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Listdir {
        #[serde(default)]
        path: Option<String>,
    },
    Stat {
        path: String,
    },
    Chdir {
        #[serde(default)]
        path: Option<String>,
    },
    Bye,
}

impl Request {
    pub fn open_mode(mode: WireOpenMode, truncate: bool) -> OpenMode {
        match mode {
            WireOpenMode::Read => OpenMode::Read,
            WireOpenMode::Write => OpenMode::Write { truncate },
        }
    }
}

/// Payload of a successful response; only the fields an operation produces are set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<HandleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<FileStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Hello {
        challenge: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        furl: Option<String>,
    },
    Ok(Reply),
    Error {
        code: String,
        message: String,
    },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(Reply::default())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Response::Error {
            code: BAD_REQUEST.to_string(),
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Response::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<FsError> for Response {
    fn from(err: FsError) -> Self {
        Response::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
