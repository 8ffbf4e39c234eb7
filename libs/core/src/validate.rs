//! Input validation for identifiers and command arguments.

use crate::error::InventoryError;

pub const STORE_ID_MAX_LEN: usize = 20;
pub const SKU_MAX_LEN: usize = 50;

pub fn validate_store_id(raw: &str) -> Result<(), InventoryError> {
    if raw.is_empty() || raw.len() > STORE_ID_MAX_LEN {
        return Err(InventoryError::validation(format!(
            "storeId must be 1-{STORE_ID_MAX_LEN} characters"
        )));
    }
    if raw.trim() != raw {
        return Err(InventoryError::validation(
            "storeId must not contain leading or trailing whitespace",
        ));
    }
    Ok(())
}

pub fn validate_sku(raw: &str) -> Result<(), InventoryError> {
    if raw.is_empty() || raw.len() > SKU_MAX_LEN {
        return Err(InventoryError::validation(format!(
            "sku must be 1-{SKU_MAX_LEN} characters"
        )));
    }
    if raw.trim() != raw {
        return Err(InventoryError::validation(
            "sku must not contain leading or trailing whitespace",
        ));
    }
    Ok(())
}

/// Reserve quantities must be non-negative; zero is accepted and commits a
/// version bump without changing stock.
pub fn validate_reserve_qty(qty: i64) -> Result<(), InventoryError> {
    if qty < 0 {
        return Err(InventoryError::validation(
            "qty must be a non-negative integer",
        ));
    }
    Ok(())
}
