/// Inventory stack arithmetic. Pure functions over a stack list; no store access.
use super::errors::EconomyError;
use super::types::ItemStack;

// ============================================================================
// Inventory Operations
// ============================================================================

/// Add `amount` of `name`, merging into an existing stack or appending a new one.
pub fn increment(
    inventory: &[ItemStack],
    name: &str,
    amount: u32,
) -> Result<Vec<ItemStack>, EconomyError> {
    if amount == 0 {
        return Err(EconomyError::InvalidAmount);
    }

    let mut updated = inventory.to_vec();
    if let Some(stack) = updated.iter_mut().find(|s| s.name == name) {
        stack.quantity = stack.quantity.saturating_add(amount);
    } else {
        updated.push(ItemStack::new(name, amount));
    }
    Ok(updated)
}

/// Remove `amount` of `name`. A stack that reaches zero is dropped; the remaining stacks
/// keep their order.
pub fn decrement(
    inventory: &[ItemStack],
    name: &str,
    amount: u32,
) -> Result<Vec<ItemStack>, EconomyError> {
    if amount == 0 {
        return Err(EconomyError::InvalidAmount);
    }

    let Some(index) = inventory.iter().position(|s| s.name == name) else {
        return Err(EconomyError::InsufficientQuantity);
    };
    let held = inventory[index].quantity;
    if held < amount {
        return Err(EconomyError::InsufficientQuantity);
    }

    let mut updated = inventory.to_vec();
    if held == amount {
        updated.remove(index);
    } else {
        updated[index].quantity = held - amount;
    }
    Ok(updated)
}

/// Quantity of `name` held, `0` when there is no stack.
pub fn quantity_of(inventory: &[ItemStack], name: &str) -> u32 {
    inventory
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.quantity)
        .unwrap_or(0)
}

/// Check whether at least `quantity` of `name` is held.
pub fn has_item(inventory: &[ItemStack], name: &str, quantity: u32) -> bool {
    quantity_of(inventory, name) >= quantity
}

// ============================================================================
// Unit Tests
// ============================================================================
