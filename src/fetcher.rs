//! Prefix feed fetcher.
//!
//! Downloads the provider's plain-text list and parses it as a stream of
//! whitespace-separated CIDR tokens. The feed is not line oriented: WEDOS
//! publishes `ips.txt` space separated on a single line, so any run of
//! Unicode whitespace separates tokens.
//!
//! A fetch is all-or-nothing. The first token that fails to parse aborts the
//! whole fetch and nothing is returned.

use async_trait::async_trait;
use reqwest::Client;
use std::borrow::Cow;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cidr::parse_cidr;
use crate::error::FetchError;
use crate::types::NetworkPrefix;

/// Longest token accepted from the feed, in bytes.
pub const MAX_TOKEN_LEN: usize = 64 * 1024;

/// User agent sent with every feed request.
pub const USER_AGENT: &str = concat!("wedos-ip-source/", env!("CARGO_PKG_VERSION"));

/// Source of prefix lists.
///
/// Implementations must return either the complete list from one response or
/// an error, never a partial list.
#[async_trait]
pub trait PrefixFetcher: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<NetworkPrefix>, FetchError>;
}

/// Incremental whitespace tokenizer that parses each completed token.
///
/// Tokens may be split across any number of `feed` calls, and so may the
/// UTF-8 encoding of a single character. Any Unicode whitespace separates
/// tokens.
#[derive(Debug, Default)]
pub struct PrefixScanner {
    partial: String,
    /// Leading bytes of a character whose encoding continues in the next chunk
    pending: Vec<u8>,
}

impl PrefixScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of body bytes, appending every completed prefix to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<NetworkPrefix>) -> Result<(), FetchError> {
        let buf: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let text = match std::str::from_utf8(&buf) {
            Ok(text) => text,
            // Incomplete sequence at the end: decode what we have, keep the rest.
            Err(e) if e.error_len().is_none() => {
                let (valid, rest) = buf.split_at(e.valid_up_to());
                self.pending.extend_from_slice(rest);
                std::str::from_utf8(valid).map_err(|_| FetchError::InvalidUtf8)?
            }
            Err(_) => return Err(FetchError::InvalidUtf8),
        };

        for c in text.chars() {
            if c.is_whitespace() {
                self.flush(out)?;
            } else {
                if self.partial.len() + c.len_utf8() > MAX_TOKEN_LEN {
                    return Err(FetchError::TokenTooLong {
                        len: self.partial.len() + c.len_utf8(),
                    });
                }
                self.partial.push(c);
            }
        }
        Ok(())
    }

    /// Flush the trailing token, if the body did not end in whitespace.
    pub fn finish(mut self, out: &mut Vec<NetworkPrefix>) -> Result<(), FetchError> {
        if !self.pending.is_empty() {
            return Err(FetchError::InvalidUtf8);
        }
        self.flush(out)
    }

    fn flush(&mut self, out: &mut Vec<NetworkPrefix>) -> Result<(), FetchError> {
        if self.partial.is_empty() {
            return Ok(());
        }
        out.push(parse_cidr(&self.partial)?);
        self.partial.clear();
        Ok(())
    }
}

/// Parse a complete feed body held in memory.
pub fn parse_prefix_list(body: &str) -> Result<Vec<NetworkPrefix>, FetchError> {
    let mut prefixes = Vec::new();
    let mut scanner = PrefixScanner::new();
    scanner.feed(body.as_bytes(), &mut prefixes)?;
    scanner.finish(&mut prefixes)?;
    Ok(prefixes)
}

/// Fetches the prefix list over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    url: String,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    /// Build a fetcher with its own client. `timeout` of `None` means no deadline
    /// other than the caller's cancellation.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(client, url, timeout))
    }

    pub fn with_client(client: Client, url: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn fetch_body(&self) -> Result<Vec<NetworkPrefix>, FetchError> {
        let mut response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let mut prefixes = Vec::new();
        let mut scanner = PrefixScanner::new();
        while let Some(chunk) = response.chunk().await? {
            scanner.feed(&chunk, &mut prefixes)?;
        }
        scanner.finish(&mut prefixes)?;

        Ok(prefixes)
    }
}

#[async_trait]
impl PrefixFetcher for HttpFetcher {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<NetworkPrefix>, FetchError> {
        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.fetch_body())
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Timeout(limit))),
                None => self.fetch_body().await,
            }
        };

        // Dropping `bounded` aborts the in-flight request.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = bounded => result,
        }
    }
}
