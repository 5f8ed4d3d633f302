//! Session cookie capture and replay.

use parking_lot::RwLock;

/// Holds the session cookie set by the server.
///
/// The cookies of the first response carrying `Set-Cookie` are kept and
/// replayed on every later request until [`CookieJar::reset`].
#[derive(Debug, Default)]
pub struct CookieJar {
    header: RwLock<Option<String>>,
}

impl CookieJar {
    /// Creates an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the given `Set-Cookie` header values.
    ///
    /// Returns true if the cookies were captured, false if the jar already
    /// holds cookies or no usable value was given.
    pub fn capture<'a, I>(&self, set_cookie_values: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut header = self.header.write();
        if header.is_some() {
            return false;
        }

        let pairs: Vec<&str> = set_cookie_values
            .into_iter()
            .filter_map(|value| value.split(';').next())
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .collect();
        if pairs.is_empty() {
            return false;
        }

        let joined = pairs.join("; ");
        tracing::debug!(cookies = pairs.len(), "captured session cookies");
        *header = Some(joined);
        true
    }

    /// Returns the `Cookie` header value to send, if any.
    pub fn header(&self) -> Option<String> {
        self.header.read().clone()
    }

    /// Returns true if cookies have been captured.
    pub fn is_empty(&self) -> bool {
        self.header.read().is_none()
    }

    /// Forgets the captured cookies.
    pub fn reset(&self) {
        *self.header.write() = None;
    }
}
