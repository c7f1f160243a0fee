//! Socket table enumeration from procfs.
//!
//! Reads `/proc/net/{tcp,tcp6,udp,udp6}` and joins socket inodes to owning
//! pids through `/proc/<pid>/fd`. Sockets owned by processes we may not
//! inspect come back without a pid.

use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;
#[cfg(target_os = "linux")]
use tracing::debug;

use super::{ConnState, ConnectionFact, ConnectionSource};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to read socket table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("connection enumeration is not supported on this platform")]
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// One row of a `/proc/net/*` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub inode: u64,
    pub state: ConnState,
    pub has_remote_address: bool,
}

/// Kernel TCP state codes (include/net/tcp_states.h).
const TCP_ESTABLISHED: u8 = 0x01;
const TCP_LISTEN: u8 = 0x0A;

/// Parse the body of a `/proc/net/{tcp,udp}[6]` file.
///
/// Malformed rows are skipped. UDP sockets carry no connection state.
pub fn parse_socket_table(contents: &str, transport: Transport) -> Vec<SocketEntry> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let remote = fields[2];
            let state = u8::from_str_radix(fields[3], 16).ok()?;
            let inode = fields[9].parse::<u64>().ok()?;

            let state = match (transport, state) {
                (Transport::Tcp, TCP_LISTEN) => ConnState::Listen,
                (Transport::Tcp, TCP_ESTABLISHED) => ConnState::Established,
                _ => ConnState::Other,
            };

            Some(SocketEntry {
                inode,
                state,
                has_remote_address: !is_unspecified(remote),
            })
        })
        .collect()
}

/// `00000000:0000` style addresses mean "no peer".
fn is_unspecified(addr: &str) -> bool {
    match addr.split_once(':') {
        Some((ip, port)) => ip.bytes().all(|b| b == b'0') && port.bytes().all(|b| b == b'0'),
        None => true,
    }
}

/// Extract the inode from a `socket:[12345]` fd link target.
pub fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Join socket entries to owners; sockets without a known owner keep `None`.
pub fn attach_owners(entries: Vec<SocketEntry>, owners: &HashMap<u64, u32>) -> Vec<ConnectionFact> {
    entries
        .into_iter()
        .map(|entry| ConnectionFact {
            owning_pid: owners.get(&entry.inode).copied(),
            state: entry.state,
            has_remote_address: entry.has_remote_address,
        })
        .collect()
}

/// Connection source backed by Linux procfs.
#[derive(Debug, Clone)]
pub struct ProcfsConnections {
    root: PathBuf,
}

impl Default for ProcfsConnections {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }
}

impl ProcfsConnections {
    /// Read from an alternate procfs mount (containers, tests).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[cfg(target_os = "linux")]
    fn socket_owners(&self) -> HashMap<u64, u32> {
        let mut owners = HashMap::new();
        let Ok(dir) = std::fs::read_dir(&self.root) else {
            return owners;
        };

        for entry in dir.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            // Other users' fd tables are unreadable without privileges.
            let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            for fd in fds.flatten() {
                if let Ok(target) = std::fs::read_link(fd.path()) {
                    if let Some(inode) = target.to_str().and_then(socket_inode) {
                        owners.entry(inode).or_insert(pid);
                    }
                }
            }
        }
        owners
    }

    #[cfg(target_os = "linux")]
    fn read_table(path: &Path, transport: Transport) -> Result<Vec<SocketEntry>, ConnectionError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConnectionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(parse_socket_table(&contents, transport))
    }
}

impl ConnectionSource for ProcfsConnections {
    #[cfg(target_os = "linux")]
    fn connections(&self) -> Result<Vec<ConnectionFact>, ConnectionError> {
        let net = self.root.join("net");

        // IPv4 TCP must be readable; the rest may be absent (no IPv6, etc).
        let mut entries = Self::read_table(&net.join("tcp"), Transport::Tcp)?;
        for (file, transport) in [
            ("tcp6", Transport::Tcp),
            ("udp", Transport::Udp),
            ("udp6", Transport::Udp),
        ] {
            match Self::read_table(&net.join(file), transport) {
                Ok(more) => entries.extend(more),
                Err(e) => debug!(error = %e, "optional socket table unavailable"),
            }
        }

        let owners = self.socket_owners();
        Ok(attach_owners(entries, &owners))
    }

    #[cfg(not(target_os = "linux"))]
    fn connections(&self) -> Result<Vec<ConnectionFact>, ConnectionError> {
        Err(ConnectionError::Unsupported)
    }
}
