//! TCP connect probes and the bounded readiness wait.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::debug;

/// Errors from a bounded readiness wait.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("ports {ports:?} on {address} not ready after {waited:?}")]
    NeverReady {
        address: String,
        ports: Vec<u16>,
        waited: Duration,
    },

    #[error("readiness wait cancelled")]
    Cancelled,
}

/// Check whether `address:port` accepts a TCP connection. The stream is
/// dropped as soon as the connect resolves; every failure, including
/// timeout, reads as not-open.
pub async fn port_open(address: &str, port: u16, connect_timeout: Duration) -> bool {
    let target = format!("{}:{}", address, port);
    match tokio::time::timeout(connect_timeout, TcpStream::connect(&target)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!(%target, error = %e, "probe connect failed");
            false
        }
        Err(_) => {
            debug!(%target, "probe connect timed out");
            false
        }
    }
}

/// Waits for a node to answer on all of its service ports.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    connect_timeout: Duration,
    interval: Duration,
    timeout: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        ReadinessProbe {
            connect_timeout: Duration::from_secs(5),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

impl ReadinessProbe {
    pub fn new(connect_timeout: Duration, interval: Duration, timeout: Duration) -> Self {
        ReadinessProbe {
            connect_timeout,
            interval,
            timeout,
        }
    }

    /// Probe every port once per pass until all answer in the same pass.
    /// Returns `NeverReady` once `timeout` elapses without a full pass
    /// succeeding, `Cancelled` when the shutdown channel fires.
    pub async fn wait_ready(
        &self,
        address: &str,
        ports: &[u16],
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ProbeError> {
        let started = Instant::now();

        loop {
            let mut all_open = true;
            for port in ports {
                if !port_open(address, *port, self.connect_timeout).await {
                    all_open = false;
                    break;
                }
            }
            if all_open {
                debug!(%address, ?ports, waited_ms = started.elapsed().as_millis() as u64, "ports ready");
                return Ok(());
            }

            if started.elapsed() >= self.timeout {
                return Err(ProbeError::NeverReady {
                    address: address.to_string(),
                    ports: ports.to_vec(),
                    waited: started.elapsed(),
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    return Err(ProbeError::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_reads_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_open("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn closed_port_reads_closed_without_error() {
        // bind then drop to get a port that is very likely closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!port_open("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn wait_ready_succeeds_when_all_ports_listen() {
        let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ports = [
            a.local_addr().unwrap().port(),
            b.local_addr().unwrap().port(),
        ];

        let probe = ReadinessProbe::new(
            Duration::from_secs(1),
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        let (_tx, rx) = watch::channel(false);
        probe.wait_ready("127.0.0.1", &ports, rx).await.unwrap();
    }

    #[tokio::test]
    async fn wait_ready_times_out_against_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = ReadinessProbe::new(
            Duration::from_millis(100),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        let (_tx, rx) = watch::channel(false);
        let err = probe
            .wait_ready("127.0.0.1", &[port], rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::NeverReady { .. }));
    }

    #[tokio::test]
    async fn wait_ready_cancels_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = ReadinessProbe::new(
            Duration::from_millis(100),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            probe.wait_ready("127.0.0.1", &[port], rx).await
        });
        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), Err(ProbeError::Cancelled));
    }
}
