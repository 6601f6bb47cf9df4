//! UUID utilities

use crate::{Error, Result};
use uuid::Uuid;

/// Parse a UUID loaded from a TEXT database column.
///
/// A malformed value indicates store corruption, not bad user input.
pub fn parse_db(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))
}
