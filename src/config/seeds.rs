//! Seed file loader.
//!
//! One node per line as `id, address, port`. Lines starting with `#` and
//! blank lines are skipped. A bad line is logged and dropped; the file as a
//! whole only fails when it cannot be read or yields no nodes.

use crate::codec::NodeRecord;

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: expected `id, address, port`")]
    InvalidFormat { line: usize },

    #[error("line {line}: id {id} is already assigned")]
    DuplicateId { line: usize, id: u16 },

    #[error("line {line}: `{value}` is not a valid IPv4 address or hostname")]
    InvalidAddress { line: usize, value: String },

    #[error("line {line}: `{value}` is not a valid port number")]
    InvalidPort { line: usize, value: String },

    #[error("no nodes provided in seed file")]
    Empty,
}

pub fn load_seed_file(path: impl AsRef<Path>) -> Result<Vec<NodeRecord>, SeedError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let nodes = parse_seeds(&contents)?;

    tracing::info!(
        "Loaded {} seed node(s) from {}",
        nodes.len(),
        path.as_ref().display()
    );

    Ok(nodes)
}

pub fn parse_seeds(contents: &str) -> Result<Vec<NodeRecord>, SeedError> {
    let mut nodes = Vec::new();
    let mut ids = HashSet::new();

    for (index, raw) in contents.lines().enumerate() {
        let line = index + 1;

        match parse_line(line, raw, &ids) {
            Ok(Some(node)) => {
                ids.insert(node.id);
                nodes.push(node);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Skipping seed entry: {}", e);
            }
        }
    }

    if nodes.is_empty() {
        return Err(SeedError::Empty);
    }

    Ok(nodes)
}

fn parse_line(line: usize, raw: &str, ids: &HashSet<u16>) -> Result<Option<NodeRecord>, SeedError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let tokens: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    if tokens.len() < 3 {
        return Err(SeedError::InvalidFormat { line });
    }

    let id: u16 = tokens[0]
        .parse()
        .map_err(|_| SeedError::InvalidFormat { line })?;
    if ids.contains(&id) {
        return Err(SeedError::DuplicateId { line, id });
    }

    let port: u16 = tokens[2].parse().map_err(|_| SeedError::InvalidPort {
        line,
        value: tokens[2].to_string(),
    })?;

    let address = resolve_ipv4(tokens[1], port).ok_or_else(|| SeedError::InvalidAddress {
        line,
        value: tokens[1].to_string(),
    })?;

    Ok(Some(NodeRecord::new(id, SocketAddrV4::new(address, port))))
}

fn resolve_ipv4(host: &str, port: u16) -> Option<Ipv4Addr> {
    if let Ok(address) = host.parse::<Ipv4Addr>() {
        return Some(address);
    }

    (host, port)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
}
