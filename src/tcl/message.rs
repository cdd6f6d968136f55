//! The client/server wire protocol: a 4-byte big-endian length prefix
//! followed by that many bytes of a `serde_yaml`-encoded payload.

use crate::error::TaskmasterError;
use crate::MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A request issued by a client against the supervision engine's
/// External-facing API (SPEC_FULL.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Status,
    Start(String),
    Stop(String),
    Restart(String),
    Reload,
}

/// The server's reply to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Success(String),
    Error(String),
    Status(StatusReport),
}

/// One line of `status()`'s snapshot: every declared program and the
/// state of each of its instances, in instance order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub programs: BTreeMap<String, ProgramStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramStatus {
    pub numprocs: usize,
    pub states: Vec<String>,
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Success(msg) => writeln!(f, "{msg}"),
            Response::Error(msg) => writeln!(f, "error: {msg}"),
            Response::Status(report) => {
                for (name, status) in &report.programs {
                    writeln!(f, "{name:<20} {:?}", status.states)?;
                }
                Ok(())
            }
        }
    }
}

pub async fn send<T: Serialize>(stream: &mut TcpStream, message: &T) -> Result<(), TaskmasterError> {
    let payload = serde_yaml::to_string(message)?;

    let length = payload.len();
    if length as u32 > MAX_MESSAGE_SIZE {
        return Err(TaskmasterError::MessageTooLong);
    }

    stream.write_all(&(length as u32).to_be_bytes()).await?;
    stream.write_all(payload.as_bytes()).await?;
    Ok(())
}

pub async fn receive<T: for<'a> Deserialize<'a>>(
    stream: &mut TcpStream,
) -> Result<T, TaskmasterError> {
    let mut length_bytes = [0u8; 4];
    stream.read_exact(&mut length_bytes).await?;
    let length = u32::from_be_bytes(length_bytes);

    if length > MAX_MESSAGE_SIZE {
        return Err(TaskmasterError::MessageTooLong);
    }

    let mut buffer = vec![0u8; length as usize];
    stream.read_exact(&mut buffer).await?;

    Ok(serde_yaml::from_slice(&buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let (server, _) = listener.accept().await.unwrap();
        (server, client.await.unwrap())
    }

    #[tokio::test]
    async fn round_trips_a_request() {
        let (mut server, mut client) = loopback_pair().await;
        send(&mut client, &Request::Start("web".to_owned()))
            .await
            .unwrap();
        let received: Request = receive(&mut server).await.unwrap();
        assert!(matches!(received, Request::Start(name) if name == "web"));
    }

    #[tokio::test]
    async fn rejects_an_oversized_frame() {
        let (mut server, mut client) = loopback_pair().await;
        // forge a length prefix bigger than MAX_MESSAGE_SIZE directly, bypassing send()
        client.write_all(&(MAX_MESSAGE_SIZE + 1).to_be_bytes()).await.unwrap();
        let result: Result<Request, _> = receive(&mut server).await;
        assert!(matches!(result, Err(TaskmasterError::MessageTooLong)));
    }
}
