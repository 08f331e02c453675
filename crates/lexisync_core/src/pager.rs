//! Cursor-based pagination over any collection.
//!
//! Every synchronized collection pages the same way: records are ordered by
//! `(updated_at, id)` and a page resumes strictly after the checkpoint the
//! client presents. Records sharing an `updated_at` are tie-broken by id, so
//! a page boundary falling inside a run of equal timestamps neither skips
//! nor duplicates a record.
//!
//! ```
//! use lexisync_core::pager;
//! use lexisync_protocol::Checkpoint;
//! use lexisync_store::StoredRecord;
//!
//! let rows = vec![
//!     StoredRecord::new("b", 10.0, serde_json::Value::Null),
//!     StoredRecord::new("a", 10.0, serde_json::Value::Null),
//!     StoredRecord::new("c", 20.0, serde_json::Value::Null),
//! ];
//! let first = pager::page(rows.clone(), None, Some(2)).unwrap();
//! assert_eq!(first.checkpoint, Some(Checkpoint::new("b", 10.0)));
//!
//! let second = pager::page(rows, first.checkpoint.as_ref(), Some(2)).unwrap();
//! assert_eq!(second.records.len(), 1);
//! assert_eq!(second.records[0].id, "c");
//! ```

use crate::error::{CoreError, CoreResult};
use lexisync_protocol::{Checkpoint, WireRecord};
use lexisync_store::{DayCounter, StoredRecord};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A record that can be served through the pager.
pub trait Paged {
    /// Collection-unique id, compared as text for string collections and
    /// as a number for numeric ones.
    type Id: Ord + Clone + fmt::Display + FromStr;

    /// Modification timestamp used for ordering.
    fn updated_at(&self) -> f64;

    /// The id used to break `updated_at` ties and to build checkpoints.
    fn cursor_id(&self) -> Self::Id;

    /// Whether this record is a tombstone.
    fn is_tombstone(&self) -> bool;

    /// The `(updated_at, id)` position of this record.
    fn order_key(&self) -> OrderKey<Self::Id> {
        OrderKey::new(self.updated_at(), self.cursor_id())
    }
}

impl<T: Paged + ?Sized> Paged for Arc<T> {
    type Id = T::Id;

    fn updated_at(&self) -> f64 {
        (**self).updated_at()
    }

    fn cursor_id(&self) -> Self::Id {
        (**self).cursor_id()
    }

    fn is_tombstone(&self) -> bool {
        (**self).is_tombstone()
    }
}

/// A totally ordered `(updated_at, id)` position.
#[derive(Debug, Clone)]
pub struct OrderKey<I> {
    /// Modification timestamp.
    pub updated_at: f64,
    /// Tie-breaking id.
    pub id: I,
}

impl<I> OrderKey<I> {
    /// Creates a position.
    pub fn new(updated_at: f64, id: I) -> Self {
        Self { updated_at, id }
    }
}

impl<I: FromStr> OrderKey<I> {
    /// Interprets a client checkpoint in this collection's id space.
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> CoreResult<Self> {
        let id = checkpoint
            .id
            .parse::<I>()
            .map_err(|_| CoreError::InvalidCheckpoint {
                id: checkpoint.id.clone(),
                reason: "id does not belong to this collection".to_string(),
            })?;
        Ok(Self::new(checkpoint.updated_at, id))
    }
}

impl<I: fmt::Display> OrderKey<I> {
    /// The checkpoint that resumes right after this position.
    pub fn to_checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.id.to_string(), self.updated_at)
    }
}

impl<I: Ord> Ord for OrderKey<I> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.updated_at
            .total_cmp(&other.updated_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl<I: Ord> PartialOrd for OrderKey<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I: Ord> PartialEq for OrderKey<I> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<I: Ord> Eq for OrderKey<I> {}

/// One page of a collection plus the checkpoint to resume after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    /// Records in `(updated_at, id)` order.
    pub records: Vec<R>,
    /// Position of the last record, or the incoming checkpoint if the page
    /// is empty.
    pub checkpoint: Option<Checkpoint>,
}

impl<R> Page<R> {
    /// An empty page that echoes `checkpoint`.
    pub fn empty(checkpoint: Option<Checkpoint>) -> Self {
        Self {
            records: Vec::new(),
            checkpoint,
        }
    }

    /// Converts every record, keeping the checkpoint.
    pub fn map<T>(self, f: impl FnMut(R) -> T) -> Page<T> {
        Page {
            records: self.records.into_iter().map(f).collect(),
            checkpoint: self.checkpoint,
        }
    }

    /// Number of records on the page.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the page has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Returns true if `key` lies strictly after `checkpoint`.
fn is_after<I: Ord>(key: &OrderKey<I>, checkpoint: &Checkpoint, checkpoint_id: &I) -> bool {
    match checkpoint.cmp_timestamp(key.updated_at) {
        Ordering::Greater => true,
        Ordering::Equal => key.id > *checkpoint_id,
        Ordering::Less => false,
    }
}

/// Selects the page of `records` that follows `checkpoint`.
///
/// Keeps records strictly after the checkpoint, sorts them by
/// `(updated_at, id)` and truncates to `limit`. `None` as checkpoint means
/// "from the beginning" and `None` as limit means "everything".
///
/// # Errors
///
/// Returns `InvalidCheckpoint` if the checkpoint id can not be parsed as
/// this collection's id type.
pub fn page<R, I>(
    records: I,
    checkpoint: Option<&Checkpoint>,
    limit: Option<usize>,
) -> CoreResult<Page<R>>
where
    R: Paged,
    I: IntoIterator<Item = R>,
{
    let after = checkpoint
        .map(|cp| OrderKey::<R::Id>::from_checkpoint(cp).map(|key| (cp, key.id)))
        .transpose()?;

    let mut keyed: Vec<(OrderKey<R::Id>, R)> = records
        .into_iter()
        .map(|record| (record.order_key(), record))
        .filter(|(key, _)| match &after {
            Some((cp, id)) => is_after(key, cp, id),
            None => true,
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some(limit) = limit {
        keyed.truncate(limit);
    }

    let next = match keyed.last() {
        Some((key, _)) => Some(key.to_checkpoint()),
        None => checkpoint.cloned(),
    };
    Ok(Page {
        records: keyed.into_iter().map(|(_, record)| record).collect(),
        checkpoint: next,
    })
}

/// Drops tombstones, for collections that only ever serve live rows.
pub fn live_only<R: Paged>(records: impl IntoIterator<Item = R>) -> Vec<R> {
    records
        .into_iter()
        .filter(|record| !record.is_tombstone())
        .collect()
}

impl Paged for StoredRecord {
    type Id = String;

    fn updated_at(&self) -> f64 {
        self.updated_at
    }

    fn cursor_id(&self) -> String {
        self.id.clone()
    }

    fn is_tombstone(&self) -> bool {
        self.deleted
    }
}

impl Paged for WireRecord {
    type Id = String;

    fn updated_at(&self) -> f64 {
        self.updated_at
    }

    fn cursor_id(&self) -> String {
        self.id.clone()
    }

    fn is_tombstone(&self) -> bool {
        self.deleted
    }
}

impl Paged for DayCounter {
    type Id = i64;

    fn updated_at(&self) -> f64 {
        self.updated_at
    }

    fn cursor_id(&self) -> i64 {
        self.day
    }

    fn is_tombstone(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    fn rec(id: &str, updated_at: f64) -> StoredRecord {
        StoredRecord::new(id, updated_at, Value::Null)
    }

    fn ids(page: &Page<StoredRecord>) -> Vec<&str> {
        page.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn tie_break_across_pages() {
        let rows = vec![rec("b", 10.0), rec("a", 10.0), rec("c", 20.0)];

        let first = page(rows.clone(), None, Some(2)).unwrap();
        assert_eq!(ids(&first), vec!["a", "b"]);
        assert_eq!(first.checkpoint, Some(Checkpoint::new("b", 10.0)));

        let second = page(rows, first.checkpoint.as_ref(), Some(2)).unwrap();
        assert_eq!(ids(&second), vec!["c"]);
        assert_eq!(second.checkpoint, Some(Checkpoint::new("c", 20.0)));
    }

    #[test]
    fn empty_page_echoes_checkpoint() {
        let rows = vec![rec("a", 10.0)];
        let cp = Checkpoint::new("a", 10.0);
        let next = page(rows, Some(&cp), Some(5)).unwrap();
        assert!(next.is_empty());
        assert_eq!(next.checkpoint, Some(cp));

        let nothing = page(Vec::<StoredRecord>::new(), None, None).unwrap();
        assert!(nothing.is_empty());
        assert_eq!(nothing.checkpoint, None);
    }

    #[test]
    fn no_limit_returns_everything() {
        let rows: Vec<_> = (0..50).map(|i| rec(&format!("r{i:02}"), f64::from(i))).collect();
        let all = page(rows, None, None).unwrap();
        assert_eq!(all.len(), 50);
    }

    #[test]
    fn tombstones_are_paged_like_live_rows() {
        let mut gone = rec("gone", 5.0);
        gone.deleted = true;
        let rows = vec![gone, rec("live", 6.0)];
        let all = page(rows.clone(), None, None).unwrap();
        assert_eq!(ids(&all), vec!["gone", "live"]);
        assert_eq!(live_only(rows).len(), 1);
    }

    #[test]
    fn numeric_ids_compare_as_numbers() {
        let days = vec![
            DayCounter {
                user_id: "u".into(),
                day: 10,
                seen: 1,
                checked: 0,
                updated_at: 7.0,
            },
            DayCounter {
                user_id: "u".into(),
                day: 9,
                seen: 1,
                checked: 0,
                updated_at: 7.0,
            },
        ];
        let first = page(days.clone(), None, Some(1)).unwrap();
        assert_eq!(first.records[0].day, 9);
        let second = page(days, first.checkpoint.as_ref(), Some(1)).unwrap();
        assert_eq!(second.records[0].day, 10);
    }

    #[test]
    fn non_numeric_checkpoint_is_rejected_for_numeric_ids() {
        let days: Vec<DayCounter> = Vec::new();
        let err = page(days, Some(&Checkpoint::new("abc", 3.0)), None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCheckpoint { .. }));
    }

    proptest! {
        #[test]
        fn paging_visits_every_record_exactly_once(
            stamps in prop::collection::vec(0u8..6, 0..40),
            limit in 1usize..7,
        ) {
            let rows: Vec<StoredRecord> = stamps
                .iter()
                .enumerate()
                .map(|(i, ts)| rec(&format!("id{i:03}"), f64::from(*ts) + 1.0))
                .collect();

            let mut seen = Vec::new();
            let mut checkpoint: Option<Checkpoint> = None;
            loop {
                let next = page(rows.clone(), checkpoint.as_ref(), Some(limit)).unwrap();
                if next.is_empty() {
                    prop_assert_eq!(next.checkpoint.clone(), checkpoint.clone());
                    break;
                }
                prop_assert!(next.len() <= limit);
                seen.extend(next.records.iter().map(|r| r.id.clone()));
                checkpoint = next.checkpoint;
            }

            let mut expected: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            expected.sort();
            let mut got = seen.clone();
            got.sort();
            prop_assert_eq!(got, expected);

            let mut deduped = seen.clone();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), seen.len());
        }
    }
}
