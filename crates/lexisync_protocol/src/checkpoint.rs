//! Resume positions for paginated feeds.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The position a client presents to resume a feed.
///
/// A checkpoint means "the client has seen everything up to and including
/// this `(updated_at, id)` pair, in collection order". It is produced from
/// the last record of a page and is opaque to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Id of the last record the client has seen.
    pub id: String,
    /// `updated_at` of the last record the client has seen.
    pub updated_at: f64,
}

impl Checkpoint {
    /// Creates a checkpoint.
    pub fn new(id: impl Into<String>, updated_at: f64) -> Self {
        Self {
            id: id.into(),
            updated_at,
        }
    }

    /// Builds a checkpoint from the raw cursor fields of a pull call.
    ///
    /// `cursor_updated_at <= 0` means "from the beginning" and yields `None`.
    pub fn from_cursor(cursor_id: &str, cursor_updated_at: f64) -> Option<Self> {
        if cursor_updated_at.is_nan() || cursor_updated_at <= 0.0 {
            None
        } else {
            Some(Self::new(cursor_id, cursor_updated_at))
        }
    }

    /// Compares a record position `(updated_at, id)` against this checkpoint's
    /// timestamp only.
    pub fn cmp_timestamp(&self, updated_at: f64) -> Ordering {
        updated_at.total_cmp(&self.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_cursor_means_origin() {
        assert_eq!(Checkpoint::from_cursor("", -1.0), None);
        assert_eq!(Checkpoint::from_cursor("abc", 0.0), None);
        assert_eq!(Checkpoint::from_cursor("abc", f64::NAN), None);
    }

    #[test]
    fn positive_cursor_is_kept_verbatim() {
        let cp = Checkpoint::from_cursor("b", 10.0).unwrap();
        assert_eq!(cp.id, "b");
        assert_eq!(cp.updated_at, 10.0);
    }

    #[test]
    fn timestamp_comparison() {
        let cp = Checkpoint::new("b", 10.0);
        assert_eq!(cp.cmp_timestamp(9.5), Ordering::Less);
        assert_eq!(cp.cmp_timestamp(10.0), Ordering::Equal);
        assert_eq!(cp.cmp_timestamp(20.0), Ordering::Greater);
    }
}
