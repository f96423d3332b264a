//! Tuning knobs for [`Mux`](super::Mux).

/// Default size of each socket's read buffer (64 KiB).
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;
/// Smallest read buffer accepted (4 KiB).
pub const MIN_READ_BUFFER: usize = 4 * 1024;
/// Largest read buffer accepted (16 MiB).
pub const MAX_READ_BUFFER: usize = 16 * 1024 * 1024;
/// Default number of readiness events fetched per wait.
pub const DEFAULT_MAX_EVENTS: usize = 64;

/// Multiplexer configuration.
///
/// # Examples
///
/// ```
/// use nlmux::mux::{MAX_READ_BUFFER, MuxConfig};
///
/// let config = MuxConfig::default().read_buffer(usize::MAX).max_events(8);
/// assert_eq!(config.read_buffer_len(), MAX_READ_BUFFER);
/// assert_eq!(config.max_events_per_wait(), 8);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MuxConfig {
    read_buffer: usize,
    max_events: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            read_buffer: DEFAULT_READ_BUFFER,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

impl MuxConfig {
    /// Size of the buffer each socket reads a batch into.
    ///
    /// Values are clamped to
    /// [`MIN_READ_BUFFER`]`..=`[`MAX_READ_BUFFER`]. Datagrams longer than the
    /// buffer are truncated by the kernel, so dumps of large tables need the
    /// default or more.
    #[must_use]
    pub fn read_buffer(mut self, len: usize) -> Self {
        self.read_buffer = len.clamp(MIN_READ_BUFFER, MAX_READ_BUFFER);
        self
    }

    /// Maximum number of ready sockets handled per wakeup; at least one.
    #[must_use]
    pub fn max_events(mut self, count: usize) -> Self {
        self.max_events = count.max(1);
        self
    }

    /// Configured read buffer size.
    #[must_use]
    pub fn read_buffer_len(&self) -> usize { self.read_buffer }

    /// Configured events per wait.
    #[must_use]
    pub fn max_events_per_wait(&self) -> usize { self.max_events }
}
