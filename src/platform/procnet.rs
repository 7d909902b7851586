//! Linux inet socket tables (`/proc/net/{tcp,tcp6,udp,udp6}`) and the
//! socket-inode to pid mapping from `/proc/<pid>/fd`.

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;

use log::{debug, warn};

use crate::core::system_monitor::{ConnectionStatus, NetworkConnection, Protocol};
use crate::core::task_runner::CancelToken;
use crate::error::{Result, SysdashError};

const TABLES: [(&str, Protocol); 4] = [
    ("tcp", Protocol::Tcp),
    ("tcp6", Protocol::Tcp),
    ("udp", Protocol::Udp),
    ("udp6", Protocol::Udp),
];

/// One row of a socket table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketRow {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: Option<SocketAddr>,
    pub status: ConnectionStatus,
    pub inode: u64,
}

/// Every inet socket under `proc_root`, at most `cap` of them.
pub fn read_connections(
    proc_root: &Path,
    cap: usize,
    cancel: &CancelToken,
) -> Result<Vec<NetworkConnection>> {
    let mut rows = Vec::new();
    let mut readable = 0;

    for (file, protocol) in TABLES {
        let path = proc_root.join("net").join(file);
        match fs::read_to_string(&path) {
            Ok(content) => {
                readable += 1;
                rows.extend(parse_table(&content, protocol));
            }
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
        cancel.check()?;
    }

    if readable == 0 {
        return Err(SysdashError::unsupported(format!(
            "no socket tables under {}",
            proc_root.display()
        )));
    }

    rows.truncate(cap);
    let owners = socket_owners(proc_root, cancel)?;

    Ok(rows
        .into_iter()
        .map(|row| NetworkConnection {
            protocol: row.protocol,
            local_addr: row.local,
            remote_addr: row.remote,
            status: row.status,
            pid: owners.get(&row.inode).copied(),
        })
        .collect())
}

/// Parse a whole table, header line included. Malformed rows are skipped.
pub fn parse_table(content: &str, protocol: Protocol) -> Vec<SocketRow> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let row = parse_row(line, protocol);
            if row.is_none() && !line.trim().is_empty() {
                warn!("Unparsable socket table row: {}", line.trim());
            }
            row
        })
        .collect()
}

pub fn parse_row(line: &str, protocol: Protocol) -> Option<SocketRow> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 {
        return None;
    }

    let local = parse_endpoint(fields[1])?;
    let remote = parse_endpoint(fields[2])?;
    let code = u8::from_str_radix(fields[3], 16).ok()?;
    let inode = fields[9].parse().ok()?;

    let remote = if remote.port() == 0 && remote.ip().is_unspecified() {
        None
    } else {
        Some(remote)
    };

    let status = match protocol {
        Protocol::Tcp => tcp_state(code),
        Protocol::Udp => ConnectionStatus::None,
    };

    Some(SocketRow {
        protocol,
        local,
        remote,
        status,
        inode,
    })
}

/// `0100007F:0035` style endpoint. The kernel prints each 32-bit word of
/// the address in host byte order.
fn parse_endpoint(field: &str) -> Option<SocketAddr> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let ip = match addr_hex.len() {
        8 => IpAddr::V4(Ipv4Addr::from(hex_word(addr_hex)?)),
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_mut(4).enumerate() {
                chunk.copy_from_slice(&hex_word(&addr_hex[i * 8..i * 8 + 8])?);
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };

    Some(SocketAddr::new(ip, port))
}

fn hex_word(hex: &str) -> Option<[u8; 4]> {
    u32::from_str_radix(hex, 16).ok().map(u32::to_ne_bytes)
}

fn tcp_state(code: u8) -> ConnectionStatus {
    match code {
        0x01 => ConnectionStatus::Established,
        0x02 => ConnectionStatus::SynSent,
        0x03 => ConnectionStatus::SynRecv,
        0x04 => ConnectionStatus::FinWait1,
        0x05 => ConnectionStatus::FinWait2,
        0x06 => ConnectionStatus::TimeWait,
        0x07 => ConnectionStatus::Close,
        0x08 => ConnectionStatus::CloseWait,
        0x09 => ConnectionStatus::LastAck,
        0x0A => ConnectionStatus::Listen,
        0x0B => ConnectionStatus::Closing,
        0x0C => ConnectionStatus::NewSynRecv,
        _ => ConnectionStatus::Unknown,
    }
}

/// Map socket inodes to the pid holding them. Processes whose fd table we
/// may not read are left out.
pub fn socket_owners(proc_root: &Path, cancel: &CancelToken) -> Result<HashMap<u64, u32>> {
    let entries =
        fs::read_dir(proc_root).map_err(|e| SysdashError::from_os_read(e, "process table"))?;

    let mut owners = HashMap::new();
    for entry in entries.filter_map(|e| e.ok()) {
        cancel.check()?;

        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };

        for fd in fds.filter_map(|fd| fd.ok()) {
            if let Some(inode) = fs::read_link(fd.path())
                .ok()
                .and_then(|target| socket_inode(&target.to_string_lossy()))
            {
                owners.entry(inode).or_insert(pid);
            }
        }
    }
    Ok(owners)
}

fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}
