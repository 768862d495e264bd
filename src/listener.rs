//! Port acquisition
//! Binds the preferred port, falling back to an ascending scan of the configured range

use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;
use tracing::{debug, warn};

/// The single listening socket owned by the relay
#[derive(Debug)]
pub struct BoundListener {
    port: u16,
    listener: TcpListener,
}

impl BoundListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub(crate) fn into_inner(self) -> TcpListener {
        self.listener
    }
}

/// Result of a port scan
#[derive(Debug)]
pub enum BindOutcome {
    Bound(BoundListener),
    Exhausted { attempted: Vec<u16> },
}

/// Try each candidate port in order and keep the first one that binds.
///
/// `on_attempt` is called before each bind so callers can report progress.
/// Nothing stays bound when every candidate fails.
pub async fn acquire<F>(addr: IpAddr, candidates: &[u16], mut on_attempt: F) -> BindOutcome
where
    F: FnMut(u16),
{
    let mut attempted = Vec::with_capacity(candidates.len());

    for &port in candidates {
        on_attempt(port);
        attempted.push(port);

        match TcpListener::bind(SocketAddr::new(addr, port)).await {
            Ok(listener) => {
                debug!("Bound relay listener on {}:{}", addr, port);
                return BindOutcome::Bound(BoundListener { port, listener });
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                warn!("Port {} is busy, trying alternative ports...", port);
            }
            Err(e) => {
                warn!("Failed to bind port {}: {}, trying alternative ports...", port, e);
            }
        }
    }

    BindOutcome::Exhausted { attempted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Reserve `n` consecutive ports by holding listeners on them
    fn occupy_consecutive(n: u16) -> (u16, Vec<std::net::TcpListener>) {
        'search: for base in (20000..60000).step_by(97) {
            let mut held = Vec::new();
            for port in base..base + n {
                match std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
                    Ok(l) => held.push(l),
                    Err(_) => continue 'search,
                }
            }
            return (base, held);
        }
        panic!("no free port block found");
    }

    #[tokio::test]
    async fn test_binds_first_free_candidate() {
        let (base, mut held) = occupy_consecutive(3);
        // Free the last two so only the first candidate stays busy
        held.truncate(1);

        let mut seen = Vec::new();
        let outcome = acquire(LOCALHOST, &[base, base + 1, base + 2], |p| seen.push(p)).await;

        match outcome {
            BindOutcome::Bound(listener) => {
                assert_eq!(listener.port(), base + 1);
                assert_eq!(listener.local_addr().unwrap().port(), base + 1);
            }
            BindOutcome::Exhausted { .. } => panic!("expected a bound listener"),
        }
        assert_eq!(seen, vec![base, base + 1]);
    }

    #[tokio::test]
    async fn test_exhausted_when_all_busy() {
        let (base, held) = occupy_consecutive(3);

        let outcome = acquire(LOCALHOST, &[base, base + 1, base + 2], |_| {}).await;

        match outcome {
            BindOutcome::Exhausted { attempted } => {
                assert_eq!(attempted, vec![base, base + 1, base + 2]);
            }
            BindOutcome::Bound(l) => panic!("unexpectedly bound port {}", l.port()),
        }
        drop(held);
    }
}
