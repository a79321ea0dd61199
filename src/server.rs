//! Serves the ingestion line protocol over TCP.
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::IngestError;
use crate::line_reader::{LineReader, ReadError};
use crate::service::IngestionService;
use crate::types::protocol::{IngestCommand, IngestResponse};
use crate::types::serialisable::WireSerialisable;
use crate::util::bytes_to_human_str;

/// Accepts connections until `cancel` fires, handling each on its own task.
/// Every connection task holds a clone of `shutdown_hold` until it ends.
pub async fn serve(
    listener: TcpListener,
    service: Arc<IngestionService>,
    max_line_len: usize,
    cancel: CancellationToken,
    shutdown_hold: mpsc::Sender<()>,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "listening");

    loop {
        let conn = match select! {
            accept = listener.accept() => accept,
            _ = cancel.cancelled() => break,
        } {
            Ok((conn, _)) => conn,
            Err(error) => {
                warn!(%error, "failed to accept connection");
                continue;
            },
        };

        tokio::spawn(begin_handle(
            Arc::clone(&service),
            max_line_len,
            cancel.clone(),
            shutdown_hold.clone(),
            conn,
        ));
    }

    Ok(())
}

#[instrument(name = "handle", err, fields(peer = %conn.peer_addr()?), skip_all)]
async fn begin_handle(
    service: Arc<IngestionService>,
    max_line_len: usize,
    cancel: CancellationToken,
    _shutdown_hold: mpsc::Sender<()>,
    mut conn: TcpStream,
) -> Result<()> {
    debug!("accepted connection");

    conn.set_nodelay(true).context("setting NODELAY")?;

    let ret = handle_conn(&service, max_line_len, &cancel, &mut conn).await;

    conn.shutdown().await.context("during shutdown")?;

    debug!("closed connection");

    ret
}

/// Reads request lines from `conn` and answers each in order until the
/// client quits or disconnects, or `cancel` fires.
pub async fn handle_conn<S>(
    service: &IngestionService,
    max_line_len: usize,
    cancel: &CancellationToken,
    conn: S,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (r, mut w) = tokio::io::split(conn);
    let mut r = LineReader::new(r, max_line_len);

    loop {
        let line = select! {
            x = r.read_line() => match x {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(()),
                Err(ReadError::LineTooLong { max_len }) => {
                    warn!(max_len, "closing connection after over-long line");
                    let resp = IngestResponse::LineTooLong.serialise_wire();
                    select! {
                        x = w.write_all(&resp) => x?,
                        _ = cancel.cancelled() => {},
                    }
                    return Ok(());
                },
                Err(ReadError::Io(error)) => {
                    return Err(error).context("reading request");
                },
            },
            _ = cancel.cancelled() => return Ok(()),
        };

        trace!(line = bytes_to_human_str(&line), "processing command");

        let resp = match IngestCommand::try_from(&line as &[u8]) {
            Ok(cmd) => match respond(service, cmd) {
                Some(resp) => resp,
                None => return Ok(()),
            },
            Err(error) => {
                debug!(%error, "rejected request");
                error.into()
            },
        };
        let resp = resp.serialise_wire();

        // Each write races cancellation so shutdown is never held up by a
        // client that stopped reading.
        select! {
            x = w.write_all(&resp) => x?,
            _ = cancel.cancelled() => return Ok(()),
        };
        select! {
            x = w.flush() => x?,
            _ = cancel.cancelled() => return Ok(()),
        };
    }
}

/// Runs a parsed command against the service. Returns None for `quit`,
/// which has no response of its own and ends the connection.
pub fn respond(
    service: &IngestionService,
    cmd: IngestCommand,
) -> Option<IngestResponse> {
    use IngestCommand::*;

    let resp = match cmd {
        Submit {
            priority,
            identifiers,
        } => match service.submit_job(&identifiers, priority) {
            Ok(job_id) => IngestResponse::Submitted { job_id },
            Err(error) => {
                error!(%error, "failed to accept job");
                IngestResponse::InternalError
            },
        },
        Status { job_id } => match service.get_status(&job_id) {
            Ok(data) => IngestResponse::OkStatus { data },
            Err(IngestError::NotFound(_)) => IngestResponse::NotFound,
            Err(error) => {
                error!(%error, "failed to read job status");
                IngestResponse::InternalError
            },
        },
        Stats => IngestResponse::OkStats {
            data: service.stats(),
        },
        Quit => return None,
    };

    Some(resp)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::{self, DuplexStream, ReadHalf, WriteHalf};

    use super::*;

    use crate::config::Config;
    use crate::processor::testing::RecordingProcessor;
    use crate::store::MemoryJobStore;

    struct Client {
        r: LineReader<ReadHalf<DuplexStream>>,
        w: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            self.w.write_all(line.as_bytes()).await.unwrap();
            self.w.write_all(b"\r\n").await.unwrap();
        }

        async fn recv(&mut self) -> Option<Bytes> {
            self.r.read_line().await.unwrap()
        }

        async fn recv_str(&mut self) -> String {
            String::from_utf8(self.recv().await.unwrap().to_vec()).unwrap()
        }

        /// Reads an `OK <n>` header and its YAML body.
        async fn recv_yaml(&mut self) -> serde_yaml::Value {
            let header = self.recv_str().await;
            let n: usize = header.strip_prefix("OK ").unwrap().parse().unwrap();

            let body = self.recv_str().await;
            assert_eq!(body.len(), n);

            serde_yaml::from_str(&body).unwrap()
        }
    }

    fn connect(
        service: Arc<IngestionService>,
        max_line_len: usize,
        cancel: CancellationToken,
    ) -> (Client, tokio::task::JoinHandle<Result<()>>) {
        let (client, server) = io::duplex(4096);

        let task = tokio::spawn(async move {
            handle_conn(&service, max_line_len, &cancel, server).await
        });

        let (r, w) = io::split(client);
        let client = Client {
            r: LineReader::new(r, 1 << 16),
            w,
        };

        (client, task)
    }

    fn service() -> Arc<IngestionService> {
        Arc::new(
            IngestionService::new(
                &Config::default(),
                Arc::new(MemoryJobStore::new()),
                Arc::new(RecordingProcessor::new(Duration::from_secs(1))),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_submit_then_status() {
        let service = service();
        let (mut client, task) =
            connect(service.clone(), 1024, CancellationToken::new());

        client.send("submit HIGH 1 2 3 4 5").await;
        let resp = client.recv_str().await;
        let job_id = resp.strip_prefix("SUBMITTED ").unwrap().to_owned();

        client.send(&format!("status {job_id}")).await;
        let status = client.recv_yaml().await;

        assert_eq!(status["job-id"].as_str(), Some(&*job_id));
        assert_eq!(status["priority"].as_str(), Some("HIGH"));
        assert_eq!(status["status"].as_str(), Some("not_started"));

        let batches = status["batches"].as_sequence().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0]["identifiers"].as_sequence().unwrap().len(), 3);
        assert_eq!(batches[1]["identifiers"].as_sequence().unwrap().len(), 2);
        assert_eq!(batches[1]["status"].as_str(), Some("not_started"));

        client.send("stats").await;
        let stats = client.recv_yaml().await;
        assert_eq!(stats["total-jobs"].as_u64(), Some(1));
        assert_eq!(stats["current-batches-queued"].as_u64(), Some(2));

        client.send("quit").await;
        assert!(client.recv().await.is_none());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_respond() {
        let service = service();

        assert!(respond(&service, IngestCommand::Quit).is_none());
        assert!(matches!(
            respond(
                &service,
                IngestCommand::Status {
                    job_id: crate::types::job::JobId::new()
                }
            ),
            Some(IngestResponse::NotFound)
        ));
        assert!(matches!(
            respond(&service, IngestCommand::Stats),
            Some(IngestResponse::OkStats { .. })
        ));
    }

    #[tokio::test]
    async fn test_plain_reply_after_yaml_reply() {
        let (mut client, task) =
            connect(service(), 1024, CancellationToken::new());

        // Each reply is written from an owned buffer, whatever its length.
        client.send("stats").await;
        assert_eq!(client.recv_yaml().await["total-jobs"].as_u64(), Some(0));
        client.send("submit 1 2 3").await;
        assert!(client.recv_str().await.starts_with("SUBMITTED "));

        client.send("quit").await;
        assert!(client.recv().await.is_none());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rejections() {
        let (mut client, _task) =
            connect(service(), 1024, CancellationToken::new());

        client.send("status invalid-uuid").await;
        assert_eq!(client.recv_str().await, "BAD_FORMAT");

        client.send(&format!("status {}", crate::types::job::JobId::new()))
            .await;
        assert_eq!(client.recv_str().await, "NOT_FOUND");

        client.send("submit URGENT 1 2").await;
        assert_eq!(client.recv_str().await, "BAD_FORMAT");

        client.send("reserve").await;
        assert_eq!(client.recv_str().await, "UNKNOWN_COMMAND");

        // Pipelined requests are answered in order.
        client.send("bogus\r\nstats").await;
        assert_eq!(client.recv_str().await, "UNKNOWN_COMMAND");
        assert!(client.recv_str().await.starts_with("OK "));
    }

    #[tokio::test]
    async fn test_line_too_long_closes() {
        let (mut client, task) =
            connect(service(), 16, CancellationToken::new());

        client.send("submit LOW 1 2 3 4 5 6 7 8 9").await;
        assert_eq!(client.recv_str().await, "LINE_TOO_LONG");

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_ends_connection() {
        let cancel = CancellationToken::new();
        let (_client, task) = connect(service(), 1024, cancel.clone());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let (shutdown_hold, mut shutdown_wait) = mpsc::channel::<()>(1);

        let server = tokio::spawn(serve(
            listener,
            service(),
            1024,
            cancel.clone(),
            shutdown_hold,
        ));

        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(b"submit medium 1\r\nstatus nope\r\n")
            .await
            .unwrap();

        let (r, _w) = conn.split();
        let mut r = LineReader::new(r, 1024);
        let submitted = r.read_line().await.unwrap().unwrap();
        assert!(submitted.starts_with(b"SUBMITTED "));
        assert_eq!(r.read_line().await.unwrap().unwrap(), "BAD_FORMAT");

        cancel.cancel();
        server.await.unwrap().unwrap();

        // Resolves once every connection task has dropped its hold.
        assert!(shutdown_wait.recv().await.is_none());
    }
}
