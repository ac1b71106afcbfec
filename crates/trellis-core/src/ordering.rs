//! Priority ordering for board columns.
//!
//! Columns are kept sorted by descending priority. A new card goes in
//! front of the first card with a strictly lower priority, so cards of
//! equal priority keep the order in which they arrived.

use crate::task::Priority;

/// Index at which a card of `priority` belongs in `cards`.
pub fn insertion_index<T, F>(cards: &[T], priority: Priority, priority_of: F) -> usize
where
    F: Fn(&T) -> Priority,
{
    cards
        .iter()
        .position(|existing| priority > priority_of(existing))
        .unwrap_or(cards.len())
}

/// Inserts `card` in priority order and returns where it landed.
pub fn insert_by_priority<T, F>(
    cards: &mut Vec<T>,
    card: T,
    priority: Priority,
    priority_of: F,
) -> usize
where
    F: Fn(&T) -> Priority,
{
    let idx = insertion_index(cards, priority, priority_of);
    cards.insert(idx, card);
    idx
}
