//! Addressing: mapping entity references to store keys ("channels") and back.
//!
//! A channel is `prefix + escape(id) + "/" + escape(band)`. Only the
//! characters in [`ESCAPED_CHARS`] are percent-encoded on the way in; decoding
//! reverses any percent-encoding so keys written by other clients with a
//! broader escaping still resolve.


use std::fmt::Write;

use percent_encoding::percent_decode_str;

use crate::constants::CHANNEL_SEPARATOR;
use crate::constants::ESCAPED_CHARS;
use crate::constants::WILDCARD;

/// Pluggable channel naming.
///
/// Implementations must be deterministic and `unchannel` must invert
/// `channel` for every fully specified `(id, band)`. The transport checks this
/// with a probe reference when it is built.
pub trait AddressScheme: Send + Sync + 'static {
    /// Builds a channel. Absent trailing segments are omitted so the result
    /// can serve as a scan prefix.
    fn channel(
        &self,
        id: Option<&str>,
        band: Option<&str>,
    ) -> String;

    /// Recovers `(id, band)` from a channel, or `None` if the key does not
    /// belong to this scheme. `None` means "skip", never an error.
    fn unchannel(
        &self,
        channel: &str,
    ) -> Option<(String, String)>;

    /// Glob used to enumerate keys under an entity, or under the whole
    /// prefix when `id` is absent.
    fn scan_pattern(
        &self,
        id: Option<&str>,
    ) -> String {
        let base = self.channel(id, None);
        if id.is_none() && (base.is_empty() || base.ends_with(CHANNEL_SEPARATOR)) {
            format!("{base}{WILDCARD}")
        } else {
            format!("{base}{CHANNEL_SEPARATOR}{WILDCARD}")
        }
    }

    /// Glob subscribed to for change notices. Absent filters become `*`.
    fn subscribe_pattern(
        &self,
        id: Option<&str>,
        band: Option<&str>,
    ) -> String {
        self.channel(Some(id.unwrap_or(WILDCARD)), Some(band.unwrap_or(WILDCARD)))
    }
}

/// Default `prefix/id/band` layout.
///
/// Wildcards passed as a segment (`"*"`) are not escaped, which is what lets
/// [`AddressScheme::subscribe_pattern`] build globs from the same function.
#[derive(Debug, Clone)]
pub struct PathScheme {
    prefix: String,
}

impl PathScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn root(&self) -> String {
        if self.prefix.is_empty() || self.prefix.ends_with(CHANNEL_SEPARATOR) {
            self.prefix.clone()
        } else {
            format!("{}{CHANNEL_SEPARATOR}", self.prefix)
        }
    }
}

impl AddressScheme for PathScheme {
    fn channel(
        &self,
        id: Option<&str>,
        band: Option<&str>,
    ) -> String {
        let Some(id) = id else {
            return self.prefix.clone();
        };

        let mut channel = self.root();
        channel.push_str(&escape_segment(id));
        if let Some(band) = band {
            channel.push(CHANNEL_SEPARATOR);
            channel.push_str(&escape_segment(band));
        }
        channel
    }

    fn unchannel(
        &self,
        channel: &str,
    ) -> Option<(String, String)> {
        let rest = channel.strip_prefix(self.prefix.as_str())?;
        let rest = if !self.prefix.is_empty() && !self.prefix.ends_with(CHANNEL_SEPARATOR) {
            rest.strip_prefix(CHANNEL_SEPARATOR)?
        } else {
            rest
        };

        let mut segments = rest.split(CHANNEL_SEPARATOR);
        let (id, band) = match (segments.next(), segments.next(), segments.next()) {
            (Some(id), Some(band), None) if !id.is_empty() && !band.is_empty() => (id, band),
            _ => return None,
        };

        Some((unescape_segment(id)?, unescape_segment(band)?))
    }
}

/// Percent-encodes the structurally significant characters of one segment.
/// The wildcard passes through untouched.
pub fn escape_segment(segment: &str) -> String {
    if segment == WILDCARD {
        return segment.to_string();
    }

    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if ESCAPED_CHARS.contains(&c) {
            // ESCAPED_CHARS are all ASCII, so a single byte
            let _ = write!(escaped, "%{:02x}", c as u32);
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Reverses percent-encoding. `None` if the decoded bytes are not UTF-8.
pub fn unescape_segment(segment: &str) -> Option<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}
