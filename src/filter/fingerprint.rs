//! Canonical filter text and query fingerprints
//!
//! The canonical form sorts AND/OR children and IN-list values, so
//! logically identical filters written in different orders render the
//! same text. The fingerprint is the SHA-256 of that text.

use std::fmt;

use sha2::{Digest, Sha256};

use super::ast::Filter;
use crate::value::Value;

/// Canonical text of a filter
pub fn canonical_text(filter: &Filter) -> String {
    match filter {
        Filter::Comparison { field, op, value } => {
            format!("{:?}{}{}", field, op.symbol(), value.canonical())
        }
        Filter::InList { field, values } => {
            let mut sorted: Vec<&Value> = values.iter().collect();
            sorted.sort();
            sorted.dedup();
            let rendered: Vec<String> = sorted.iter().map(|v| v.canonical()).collect();
            format!("{:?} in [{}]", field, rendered.join(","))
        }
        Filter::Rank { field, op, rank } => format!("rank({:?}){}{}", field, op.symbol(), rank),
        Filter::Not(child) => format!("not({})", canonical_text(child)),
        Filter::And(children) => format!("and({})", sorted_children(children)),
        Filter::Or(children) => format!("or({})", sorted_children(children)),
    }
}

fn sorted_children(children: &[Filter]) -> String {
    let mut rendered: Vec<String> = children.iter().map(canonical_text).collect();
    rendered.sort();
    rendered.join(",")
}

/// SHA-256 digest of a canonical query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(canonical: &str) -> Self {
        let digest = Sha256::digest(canonical.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Build from raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 8 bytes are enough for log lines
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
