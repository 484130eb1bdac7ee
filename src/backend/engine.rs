//! Compute engine seam
//!
//! A [`ComputeEngine`] is a live session on the spreadsheet workbook: cells
//! can be written, the sheet recalculated and regions read back. An
//! [`EngineConnector`] produces one, either by attaching to a workbook that is
//! already open or by opening it.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::Path;

use crate::error::EngineResult;

/// Value of a single spreadsheet cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            CellValue::Number(n) => Decimal::from_f64(*n),
            CellValue::Text(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    /// Non-negative integer reading; fractional values are truncated
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            CellValue::Number(n) if n.is_finite() && *n >= 0.0 => Some(n.trunc() as u64),
            CellValue::Text(s) => s.trim().replace(',', "").parse::<f64>().ok().and_then(|n| {
                if n.is_finite() && n >= 0.0 {
                    Some(n.trunc() as u64)
                } else {
                    None
                }
            }),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) if !s.trim().is_empty() => Some(s.clone()),
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty => Value::Null,
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(b),
            Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
            Value::String(s) => CellValue::Text(s),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<u32> for CellValue {
    fn from(value: u32) -> Self {
        CellValue::Number(value as f64)
    }
}

/// How a connector obtained its engine session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Workbook was already open and matched by name
    Reused,
    /// Workbook was opened by this connector
    Opened,
}

/// Live session on the option-chain workbook
#[async_trait]
pub trait ComputeEngine: Send + Sync {
    fn workbook_name(&self) -> &str;

    async fn write_cell(&self, address: &str, value: CellValue) -> EngineResult<()>;

    /// Rectangular read, row-major
    async fn read_range(&self, address: &str) -> EngineResult<Vec<Vec<CellValue>>>;

    async fn read_cell(&self, address: &str) -> EngineResult<CellValue> {
        let values = self.read_range(address).await?;
        Ok(values
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(CellValue::Empty))
    }

    /// Force recalculation of the sheet
    async fn calculate(&self) -> EngineResult<()>;

    /// Whether the last recalculation has finished
    async fn calculation_done(&self) -> EngineResult<bool>;

    /// Data-validation list formula attached to a cell, if any
    async fn validation_formula(&self, address: &str) -> EngineResult<Option<String>>;

    /// Tear the session down. Called exactly once by the owner.
    async fn release(&self) -> EngineResult<()>;
}

/// Strategy for obtaining an engine session
#[async_trait]
pub trait EngineConnector: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self, workbook: &Path)
        -> EngineResult<(Box<dyn ComputeEngine>, Attachment)>;
}
