//! Incremental parsing of curl header callbacks.

/// Status and length of the response currently being received. A new status
/// line (e.g. after a redirect) starts a fresh block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub(crate) status: Option<u32>,
    pub(crate) content_length: Option<u64>,
    /// The block is a proxy's reply to CONNECT, not the origin's response.
    pub(crate) tunnel: bool,
}

impl ResponseHead {
    /// Feeds one raw header line. Returns true when the line ends a header
    /// block (the blank line after a status line).
    pub(crate) fn feed(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return self.status.is_some();
        }
        if line.starts_with("HTTP/") {
            let mut parts = line.splitn(3, ' ');
            parts.next();
            self.status = parts.next().and_then(|c| c.trim().parse().ok());
            let reason = parts.next().unwrap_or("").trim();
            self.tunnel = self.status == Some(200) && reason.eq_ignore_ascii_case("connection established");
            self.content_length = None;
            return false;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse::<u64>().ok();
            }
        }
        false
    }

    pub(crate) fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }

    /// A completed block that is the origin's successful response.
    pub(crate) fn is_final_success(&self) -> bool {
        self.is_success() && !self.tunnel
    }
}
