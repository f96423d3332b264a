//! Utilities for exercising `nlmux` without a kernel.
//!
//! [`mock_pair`] returns a [`MockConnection`] that implements the crate's
//! socket capabilities over one end of a Unix datagram pair, and a
//! [`MockKernel`] holding the other end. Tests drive the kernel side by hand
//! or hand it a responder closure.
//!
//! ```rust
//! use nlmux::{Client, Mux, Request};
//! use nlmux_testing::{mock_pair, reply_ack};
//!
//! # async fn example() -> std::io::Result<()> {
//! let (conn, kernel) = mock_pair()?;
//! let mux = Mux::new().expect("mux");
//! tokio::spawn({
//!     let mux = mux.clone();
//!     async move { mux.serve().await }
//! });
//! tokio::spawn(kernel.respond(|request| vec![vec![reply_ack(request, 0)]]));
//!
//! let client = Client::new(mux, conn);
//! let replies = client.call(&mut Request::new(20, 0)).await.expect("ack");
//! assert!(replies.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod kernel;
pub mod logging;

pub use kernel::{
    KERNEL_PID,
    MockConnection,
    MockKernel,
    mock_pair,
    reply_ack,
    reply_data,
    reply_done,
};
pub use logging::{LoggerHandle, logger};
