//! Smart-protocol handlers: ref advertisement and stateless RPC.
//!
//! Both run `git` in its own process group and stream its output into the
//! response body from a spawned task.  That task owns the [`ProcessGroup`],
//! so when it ends, normally or because the client went away and a write
//! failed, the whole group is killed.

use std::io;

use anyhow::{anyhow, Context as _, Result};
use async_compression::tokio::bufread::GzipDecoder;
use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use prometheus_client::metrics::gauge::Gauge;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use super::context::RequestContext;
use super::handler::AppError;
use super::pktline::service_advertisement;
use super::stream::{body_channel, FlushingWriter};
use crate::git::commands::{git_stateless_rpc, Rpc, RpcMode};
use crate::git::process_group::ProcessGroup;
use crate::metrics::RpcLabels;
use crate::server::GitServer;

// ---------------------------------------------------------------------------
// info/refs
// ---------------------------------------------------------------------------

/// `GET /<repo>/info/refs?service=<rpc>`
///
/// Any `service` other than the two smart-protocol services is a 404.
pub async fn info_refs(server: &GitServer, ctx: &RequestContext) -> Result<Response, AppError> {
    const CONTEXT: &str = "get-info-refs";

    let rpc = ctx
        .query_param("service")
        .as_deref()
        .and_then(Rpc::from_service)
        .ok_or(AppError::NotFound)?;

    let advertisement =
        service_advertisement(rpc.service_name()).map_err(AppError::internal(CONTEXT))?;
    let process =
        spawn(server, rpc, RpcMode::AdvertiseRefs, ctx).map_err(AppError::internal(CONTEXT))?;

    let body = stream_output(server, process, advertisement, CONTEXT);
    Ok(git_response(body, format!("application/x-{rpc}-advertisement")))
}

// ---------------------------------------------------------------------------
// Stateless RPC
// ---------------------------------------------------------------------------

/// `POST /<repo>/git-upload-pack` and `POST /<repo>/git-receive-pack`
///
/// The request body is written to `git` in full before any output is read.
/// Failures up to that point are a 500; later ones truncate the response.
pub async fn post_rpc(
    server: &GitServer,
    rpc: Rpc,
    ctx: &RequestContext,
    body: Body,
) -> Result<Response, AppError> {
    const CONTEXT: &str = "post-rpc";

    let mut process =
        spawn(server, rpc, RpcMode::Negotiate, ctx).map_err(AppError::internal(CONTEXT))?;

    let mut input = request_reader(ctx, body);
    feed_stdin(&mut process, &mut input)
        .await
        .map_err(AppError::internal(CONTEXT))?;

    let body = stream_output(server, process, Vec::new(), CONTEXT);
    Ok(git_response(body, format!("application/x-{rpc}-result")))
}

/// The request body as a byte stream, gunzipped when the client says so.
fn request_reader(ctx: &RequestContext, body: Body) -> Box<dyn AsyncRead + Send + Unpin> {
    let gzip = ctx
        .headers
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes() == b"gzip");

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));
    let reader = StreamReader::new(stream);
    if gzip {
        debug!("decoding gzip request body");
        Box::new(GzipDecoder::new(reader))
    } else {
        Box::new(reader)
    }
}

/// Copy `input` into the child's stdin, then close it so `git` sees EOF.
async fn feed_stdin<R>(process: &mut ProcessGroup, input: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut stdin = process.take_stdin().context("git stdin already taken")?;
    let n = tokio::io::copy(input, &mut stdin)
        .await
        .context("failed to write request body to git")?;
    stdin.shutdown().await.context("failed to close git stdin")?;
    drop(stdin);
    debug!(bytes = n, "request body forwarded");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output streaming
// ---------------------------------------------------------------------------

fn spawn(
    server: &GitServer,
    rpc: Rpc,
    mode: RpcMode,
    ctx: &RequestContext,
) -> Result<ProcessGroup> {
    let process = git_stateless_rpc(&server.config.git_path, rpc, mode, &ctx.repo_path)?;
    server
        .metrics
        .metrics
        .git_processes_total
        .get_or_create(&RpcLabels { rpc: rpc.into() })
        .inc();
    Ok(process)
}

fn git_response(body: Body, content_type: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

/// Start a task that writes `prefix` and then everything `git` prints into
/// the returned body.  The task waits for `git` once its output ends, and
/// gives up as soon as the body is dropped.
fn stream_output(
    server: &GitServer,
    mut process: ProcessGroup,
    prefix: Vec<u8>,
    context: &'static str,
) -> Body {
    let (writer, body) = body_channel();
    let active = ActiveStream::new(server.metrics.metrics.active_streams.clone());

    let client_gone = writer.closed();

    tokio::spawn(async move {
        let _active = active;
        let mut sink = FlushingWriter::new(writer);

        let copied = tokio::select! {
            res = copy_output(&mut process, &mut sink, &prefix) => res,
            () = client_gone => Err(anyhow!("client disconnected")),
        };
        if let Err(e) = copied {
            warn!(context = context, error = %format!("{e:#}"), "response truncated");
            return;
        }

        match process.wait().await {
            Ok(status) if status.success() => debug!(context = context, "git finished"),
            Ok(status) => warn!(context = context, %status, "git exited unsuccessfully"),
            Err(e) => warn!(context = context, error = %e, "failed to wait for git"),
        }
    });

    body
}

async fn copy_output<W>(process: &mut ProcessGroup, sink: &mut W, prefix: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut output = process.take_output().context("git output already taken")?;
    sink.write_all(prefix)
        .await
        .context("failed to write advertisement header")?;
    tokio::io::copy(&mut output, sink)
        .await
        .context("failed to stream git output")?;
    sink.shutdown().await.context("failed to finish response body")?;
    Ok(())
}

/// Holds the active-stream gauge up for as long as it lives.
struct ActiveStream(Gauge);

impl ActiveStream {
    fn new(gauge: Gauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.0.dec();
    }
}
