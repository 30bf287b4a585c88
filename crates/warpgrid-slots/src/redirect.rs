//! Cluster redirect replies.

use crate::error::SlotsError;
use crate::hash::HASH_SLOTS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectKind {
    /// The slot now lives on another node; refresh the table.
    Moved,
    /// The slot is migrating; retry this one command on the target with
    /// `ASKING` first.
    Ask,
}

/// A parsed `MOVED <slot> <addr>` or `ASK <slot> <addr>` error reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub slot: u16,
    pub addr: String,
}

impl Redirect {
    /// Parse an error reply, with or without the leading `-`.
    pub fn parse(reply: &str) -> Result<Self, SlotsError> {
        let invalid = || SlotsError::InvalidRedirect(reply.to_string());
        let mut parts = reply.trim().trim_start_matches('-').split_whitespace();

        let kind = match parts.next() {
            Some("MOVED") => RedirectKind::Moved,
            Some("ASK") => RedirectKind::Ask,
            _ => return Err(invalid()),
        };
        let slot: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .filter(|&slot| usize::from(slot) < HASH_SLOTS)
            .ok_or_else(invalid)?;
        let addr = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() || !is_node_addr(addr) {
            return Err(invalid());
        }

        Ok(Self {
            kind,
            slot,
            addr: addr.to_string(),
        })
    }

    /// Whether `reply` looks like a redirect at all.
    pub fn is_redirect(reply: &str) -> bool {
        let reply = reply.trim_start_matches('-');
        reply.starts_with("MOVED ") || reply.starts_with("ASK ")
    }
}

/// `host:port` with a non-empty host and a numeric port.
pub(crate) fn is_node_addr(addr: &str) -> bool {
    addr.rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}
