//! Streaming HTTP GET with throttled progress, run on a blocking thread.
//!
//! The body is counted and discarded. Updates are pushed through an
//! unbounded channel so the async side can publish them in order.

use std::cell::{Cell, RefCell};
use std::str;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::FetchError;
use super::headers::ResponseHead;
use super::rate::{average_rate, ProgressThrottle};
use super::ExecutorSettings;

/// Progress observed during a transfer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TransferUpdate {
    /// Success headers received; the body is about to stream.
    Started { total_bytes: Option<u64> },
    /// Periodic report while the body streams.
    Progress {
        total_bytes: Option<u64>,
        downloaded: u64,
        bytes_per_second: f64,
    },
}

/// Final counters of a completed transfer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TransferSummary {
    pub(crate) total_bytes: Option<u64>,
    pub(crate) downloaded: u64,
    pub(crate) bytes_per_second: f64,
}

/// Fetches `url` to completion. Blocks the calling thread; call from
/// `spawn_blocking`. Returns `Cancelled` as soon as `cancel` fires.
pub(crate) fn fetch(
    url: &str,
    settings: &ExecutorSettings,
    cancel: &CancellationToken,
    updates: mpsc::UnboundedSender<TransferUpdate>,
) -> Result<TransferSummary, FetchError> {
    let fetch_start = Instant::now();
    let head = RefCell::new(ResponseHead::default());
    let total = Cell::new(None::<u64>);
    let started = Cell::new(false);
    let downloaded = Cell::new(0u64);
    let throttle = RefCell::new(ProgressThrottle::new(settings.progress_interval, fetch_start));

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.fail_on_error(true)?;
    easy.buffer_size(settings.buffer_size)?;
    easy.connect_timeout(settings.connect_timeout)?;
    easy.timeout(settings.transfer_timeout)?;
    easy.progress(true)?;

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            let Ok(line) = str::from_utf8(data) else {
                return true;
            };
            let mut head = head.borrow_mut();
            if head.feed(line) && head.is_final_success() {
                // A later successful block is the real response if the first
                // was an unrecognised proxy reply.
                total.set(head.content_length);
                if !started.get() {
                    started.set(true);
                    throttle.borrow_mut().reset(Instant::now());
                    let _ = updates.send(TransferUpdate::Started {
                        total_bytes: head.content_length,
                    });
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            if cancel.is_cancelled() {
                // Short write aborts the transfer.
                return Ok(0);
            }
            let done = downloaded.get() + data.len() as u64;
            downloaded.set(done);
            let now = Instant::now();
            if throttle.borrow_mut().ready(now) {
                let _ = updates.send(TransferUpdate::Progress {
                    total_bytes: total.get(),
                    downloaded: done,
                    bytes_per_second: average_rate(done, now.duration_since(fetch_start)),
                });
            }
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform()
    };

    if let Err(e) = performed {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if e.is_http_returned_error() {
            let code = easy
                .response_code()
                .ok()
                .filter(|c| *c != 0)
                .or(head.borrow().status);
            if let Some(code) = code {
                return Err(FetchError::Http(code));
            }
        }
        return Err(FetchError::Curl(e));
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }

    let downloaded = downloaded.get();
    Ok(TransferSummary {
        total_bytes: total.get(),
        downloaded,
        bytes_per_second: average_rate(downloaded, fetch_start.elapsed()),
    })
}
