use std::collections::BTreeSet;

use crate::core::task_runner::CancelToken;
use crate::error::Result;
#[cfg(not(target_os = "linux"))]
use crate::error::SysdashError;

use super::metrics::{ConnectionStatus, NetworkConnection, Protocol};

/// Open inet sockets (TCP and UDP, v4 and v6), at most `cap` of them.
pub fn list_connections(cap: usize, cancel: &CancelToken) -> Result<Vec<NetworkConnection>> {
    #[cfg(target_os = "linux")]
    {
        crate::platform::procnet::read_connections(std::path::Path::new("/proc"), cap, cancel)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (cap, cancel);
        Err(SysdashError::unsupported(
            "connection listing is only available on Linux",
        ))
    }
}

pub fn filter_protocol(
    connections: &[NetworkConnection],
    protocol: Protocol,
) -> Vec<NetworkConnection> {
    connections
        .iter()
        .filter(|c| c.protocol == protocol)
        .cloned()
        .collect()
}

/// Local ports with a listening TCP socket or a bound UDP socket
pub fn listening_ports(connections: &[NetworkConnection]) -> Vec<(Protocol, u16)> {
    let ports: BTreeSet<(u8, u16)> = connections
        .iter()
        .filter(|c| match c.protocol {
            Protocol::Tcp => c.status == ConnectionStatus::Listen,
            Protocol::Udp => c.remote_addr.is_none(),
        })
        .map(|c| (protocol_rank(c.protocol), c.local_addr.port()))
        .collect();

    ports
        .into_iter()
        .map(|(rank, port)| {
            let protocol = if rank == 0 { Protocol::Tcp } else { Protocol::Udp };
            (protocol, port)
        })
        .collect()
}

fn protocol_rank(protocol: Protocol) -> u8 {
    match protocol {
        Protocol::Tcp => 0,
        Protocol::Udp => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(
        protocol: Protocol,
        local: &str,
        remote: Option<&str>,
        status: ConnectionStatus,
    ) -> NetworkConnection {
        NetworkConnection {
            protocol,
            local_addr: local.parse().unwrap(),
            remote_addr: remote.map(|r| r.parse().unwrap()),
            status,
            pid: None,
        }
    }

    fn sample() -> Vec<NetworkConnection> {
        vec![
            conn(Protocol::Tcp, "0.0.0.0:22", None, ConnectionStatus::Listen),
            conn(Protocol::Tcp, "[::]:22", None, ConnectionStatus::Listen),
            conn(
                Protocol::Tcp,
                "10.0.0.2:51000",
                Some("1.1.1.1:443"),
                ConnectionStatus::Established,
            ),
            conn(Protocol::Udp, "0.0.0.0:5353", None, ConnectionStatus::None),
            conn(Protocol::Udp, "10.0.0.2:40000", Some("8.8.8.8:53"), ConnectionStatus::None),
        ]
    }

    #[test]
    fn test_filter_protocol() {
        let connections = sample();
        assert_eq!(filter_protocol(&connections, Protocol::Tcp).len(), 3);
        assert_eq!(filter_protocol(&connections, Protocol::Udp).len(), 2);
    }

    #[test]
    fn test_listening_ports_dedup_and_order() {
        let ports = listening_ports(&sample());
        assert_eq!(ports, vec![(Protocol::Tcp, 22), (Protocol::Udp, 5353)]);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_list_connections_caps() {
        let connections = list_connections(3, &CancelToken::new()).unwrap();
        assert!(connections.len() <= 3);
    }
}
