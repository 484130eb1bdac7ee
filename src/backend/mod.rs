//! Spreadsheet compute backend
//!
//! The adapter drives the option-chain workbook through an engine session and
//! substitutes synthetic data whenever the workbook cannot be reached.

pub mod adapter;
pub mod bridge;
pub mod engine;
pub mod expiry;
pub mod layout;
pub mod synthetic;

pub use adapter::{ComputeBackendAdapter, ConnectAttempt, RawOutput};
pub use bridge::HttpBridgeConnector;
pub use engine::{Attachment, CellValue, ComputeEngine, EngineConnector};
pub use synthetic::{index_profile, IndexProfile, SyntheticChain, SyntheticChainGenerator};
