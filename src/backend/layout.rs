//! Fixed cell layout of the option-chain workbook
//!
//! These addresses are part of the workbook contract and must match the
//! sheet exactly.

/// Broker user id input
pub const USER_ID_CELL: &str = "F587";
/// Encrypted session token input
pub const ENC_TOKEN_CELL: &str = "F615";

pub const SYMBOL_CELL: &str = "B2";
pub const OPTION_EXPIRY_CELL: &str = "B3";
pub const FUTURE_EXPIRY_CELL: &str = "B4";
pub const CHAIN_LENGTH_CELL: &str = "B6";
pub const UNDERLYING_PRICE_CELL: &str = "F2";

/// First row of the option-chain output region
pub const OUTPUT_START_ROW: u32 = 10;
pub const OUTPUT_FIRST_COLUMN: char = 'A';
pub const OUTPUT_LAST_COLUMN: char = 'G';

/// Columns of one output row, left to right
pub const OUTPUT_COLUMNS: [&str; 7] = [
    "strike",
    "call_ltp",
    "call_volume",
    "call_oi",
    "put_ltp",
    "put_volume",
    "put_oi",
];

/// Address of the output region for `chain_length` rows, e.g. `A10:G29`
pub fn output_range(chain_length: u32) -> String {
    let end_row = OUTPUT_START_ROW.saturating_add(chain_length.max(1) - 1);
    format!(
        "{}{}:{}{}",
        OUTPUT_FIRST_COLUMN, OUTPUT_START_ROW, OUTPUT_LAST_COLUMN, end_row
    )
}

/// Accepts `A1` and `A1:B2` style addresses
pub fn is_valid_address(address: &str) -> bool {
    let valid_cell = |cell: &str| {
        let letters = cell.chars().take_while(|c| c.is_ascii_uppercase()).count();
        let digits = &cell[letters..];
        letters > 0
            && !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0')
    };

    match address.split_once(':') {
        Some((start, end)) => valid_cell(start) && valid_cell(end),
        None => valid_cell(address),
    }
}
