//! Page-driver capability for dealscout.
//!
//! Scrapers and the proxy prober talk to sites only through the
//! [`PageDriver`] and [`PageSession`] traits. [`ChromiumDriver`] is the
//! production implementation; tests substitute in-memory fakes.

pub mod driver;
pub mod engine;
pub mod error;
pub mod fingerprint;

pub use driver::{PageDriver, PageSession};
pub use engine::ChromiumDriver;
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
