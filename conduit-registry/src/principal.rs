//! The resolved caller identity the router reasons about (spec.md §1
//! "AuthContext"). Authentication itself is an external collaborator;
//! `conduit-server` resolves bearer tokens/API keys into one of these and
//! passes it in as a plain value, so the core stays auth-agnostic.

use conduit_core::UserRecord;

#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    User(UserRecord),
}

impl Principal {
    pub fn username(&self) -> Option<&str> {
        match self {
            Principal::Anonymous => None,
            Principal::User(u) => Some(&u.username),
        }
    }

    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Principal::Anonymous => None,
            Principal::User(u) => Some(u),
        }
    }
}
