//! Broker credential acquisition
//!
//! Cached credential first, then an automated browser login, then the
//! placeholder credential.

pub mod acquirer;
pub mod browser;
pub mod cache;
pub mod webdriver;

pub use acquirer::{AcquisitionStage, Attempt, CredentialAcquirer, CredentialStrategy, LoginSettings};
pub use browser::{BrowserDriver, BrowserSession};
pub use cache::{CacheStatus, CredentialCache};
pub use webdriver::{SessionOptions, WebDriverClient};
