//! The established byte stream after the hole punch.
//!
//! Demonstration payload: the active (dialing) side writes one timestamped
//! text frame per second, inbound frames are logged. The only contract is
//! that a bidirectional ordered stream exists once the session runs.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct DataSession {
    stream: TcpStream,
    name: String,
    active: bool,
}

impl DataSession {
    pub fn new(stream: TcpStream, name: String, active: bool) -> Self {
        Self {
            stream,
            name,
            active,
        }
    }

    pub async fn run(self) {
        let (mut reader, writer) = self.stream.into_split();
        // the passive side keeps its write half open without using it
        let mut _write_guard = None;
        if self.active {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut writer = writer;
                let mut seq = 1u64;
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                loop {
                    ticker.tick().await;
                    let millis = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis();
                    let frame = format!("from client{name} - {seq} - {millis}\n");
                    seq += 1;
                    if let Err(e) = writer.write_all(frame.as_bytes()).await {
                        log::warn!("session write: {e:?}");
                        break;
                    }
                }
            });
        } else {
            _write_guard = Some(writer);
        }

        let mut buf = [0u8; 2048];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    log::info!("{}: session closed by peer", self.name);
                    break;
                }
                Ok(n) => log::info!(
                    "{}: session data: {}",
                    self.name,
                    String::from_utf8_lossy(&buf[..n]).trim_end()
                ),
                Err(e) => {
                    log::warn!("session read: {e:?}");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn active_side_emits_frames() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (dialed, accepted) = tokio::join!(TcpStream::connect(addr), async {
            listener.accept().await.unwrap().0
        });
        let session = DataSession::new(dialed.unwrap(), "a".to_string(), true);
        tokio::spawn(session.run());

        let mut accepted = accepted;
        let mut buf = [0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(3), accepted.read(&mut buf))
            .await
            .expect("frame within a second")
            .unwrap();
        let frame = String::from_utf8_lossy(&buf[..n]);
        assert!(frame.starts_with("from clienta - 1 - "), "frame: {frame}");
    }
}
