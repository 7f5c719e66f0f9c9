// Record identifiers are UUIDv7 strings generated app-side so rows sort
// by creation time without a separate sequence.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a new record id as text.
pub fn new_id() -> String {
    uuidv7().to_string()
}
