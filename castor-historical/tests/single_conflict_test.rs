//! Conflict resolution for single-valued attributes, replayed in and out of
//! order.
//!
//! Each test drives the engine the way the replay path does: replay the
//! modification, apply the decision to the entry, then check the entry and
//! the encoded history.

use std::sync::Arc;

use castor_core::csn::Csn;
use castor_core::dn::Dn;
use castor_core::entry::{AttributeDescription, Entry};
use castor_core::modification::{Modification, ModificationType};
use castor_core::schema::Schema;
use castor_historical::entry_history::EntryHistory;
use uuid::Uuid;

const DISPLAY_NAME: &str = "displayname";

fn csn(t: u64) -> Csn {
    Csn::new(t, 0, 0)
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::with_single_valued(["displayname", "employeenumber"]))
}

fn new_entry() -> Entry {
    Entry::new(Dn::parse("o=test").unwrap(), Uuid::new_v4())
}

fn modification(mod_type: ModificationType, attr: &str, values: &[&str]) -> Modification {
    Modification::of(mod_type, attr, values)
}

/// Replay one modification at time `t`; apply whatever survives to the
/// entry; assert whether the change was kept (possibly rewritten).
fn test_modify(
    entry: &mut Entry,
    hist: &mut EntryHistory,
    t: u64,
    expect_kept: bool,
    modification: Modification,
) {
    let replayed = hist.replay_modifications(csn(t), vec![modification], entry);
    assert_eq!(
        !replayed.mods.is_empty(),
        expect_kept,
        "keep/drop mismatch at t={t}"
    );
    entry.apply_modifications(&replayed.mods);
}

fn assert_hist(hist: &EntryHistory, expected: &[&str]) {
    assert_eq!(hist.encode_values(), expected);
}

fn assert_only_value(entry: &Entry, attr: &str, expected: &str) {
    let values = entry
        .get(&AttributeDescription::new(attr))
        .unwrap_or_default();
    assert_eq!(values, [expected.to_string()]);
}

// =============================================================================
// Replace then older add: the replace wins
// =============================================================================

#[test]
fn replace_then_older_add() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 10, true,
        modification(ModificationType::Replace, DISPLAY_NAME, &["init value"]));
    let repl = format!("displayname:{}:repl:init value", csn(10));
    assert_hist(&hist, &[&repl]);

    // Older adds must be discarded, twice to prove history is kept.
    test_modify(&mut entry, &mut hist, 1, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["older value"]));
    assert_hist(&hist, &[&repl]);
    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["older value"]));
    assert_hist(&hist, &[&repl]);

    // A later add also loses: the slot is taken by the replace.
    test_modify(&mut entry, &mut hist, 11, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["new value"]));
    assert_hist(&hist, &[&repl]);
    assert_only_value(&entry, DISPLAY_NAME, "init value");
}

// =============================================================================
// Replace with no value acts as a delete
// =============================================================================

#[test]
fn replace_with_no_value_then_adds() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 3, true,
        modification(ModificationType::Replace, DISPLAY_NAME, &[]));
    let attr_del = format!("displayname:{}:attrDel", csn(3));
    assert_hist(&hist, &[&attr_del]);

    test_modify(&mut entry, &mut hist, 1, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["older value"]));
    assert_hist(&hist, &[&attr_del]);
    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["older value"]));
    assert_hist(&hist, &[&attr_del]);

    // An add newer than the delete goes through.
    test_modify(&mut entry, &mut hist, 4, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["new value"]));
    let add = format!("displayname:{}:add:new value", csn(4));
    assert_hist(&hist, &[&attr_del, &add]);
    assert_only_value(&entry, DISPLAY_NAME, "new value");
}

// =============================================================================
// A replace older than the recorded add is superseded
// =============================================================================

#[test]
fn add_then_older_replace_is_dropped() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 10, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["A"]));
    let add = format!("displayname:{}:add:A", csn(10));
    assert_hist(&hist, &[&add]);

    // A remote replace stamped before the add lost the race.
    test_modify(&mut entry, &mut hist, 5, false,
        modification(ModificationType::Replace, DISPLAY_NAME, &["B"]));
    assert_hist(&hist, &[&add]);
    assert_only_value(&entry, DISPLAY_NAME, "A");
}

#[test]
fn add_then_newer_replace_wins() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 2, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["init value"]));
    test_modify(&mut entry, &mut hist, 3, true,
        modification(ModificationType::Replace, DISPLAY_NAME, &["newer value"]));
    let repl = format!("displayname:{}:repl:newer value", csn(3));
    assert_hist(&hist, &[&repl]);
    assert_only_value(&entry, DISPLAY_NAME, "newer value");
}

// =============================================================================
// Delete then add
// =============================================================================

#[test]
fn delete_then_adds_in_both_directions() {
    let mut entry = new_entry();
    entry.put(AttributeDescription::new(DISPLAY_NAME), vec!["value1".into()]);
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 3, true,
        modification(ModificationType::Delete, DISPLAY_NAME, &[]));
    let attr_del = format!("displayname:{}:attrDel", csn(3));
    assert_hist(&hist, &[&attr_del]);

    test_modify(&mut entry, &mut hist, 1, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["older value"]));
    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["older value"]));
    assert_hist(&hist, &[&attr_del]);

    test_modify(&mut entry, &mut hist, 4, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["new value"]));
    let add = format!("displayname:{}:add:new value", csn(4));
    assert_hist(&hist, &[&attr_del, &add]);
}

#[test]
fn delete_older_than_replace_is_dropped() {
    let mut entry = new_entry();
    entry.put(AttributeDescription::new(DISPLAY_NAME), vec!["value1".into()]);
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 4, true,
        modification(ModificationType::Delete, DISPLAY_NAME, &[]));
    // A replace generated before the delete must not resurrect the value.
    test_modify(&mut entry, &mut hist, 3, false,
        modification(ModificationType::Replace, DISPLAY_NAME, &["new value"]));
    let attr_del = format!("displayname:{}:attrDel", csn(4));
    assert_hist(&hist, &[&attr_del]);
}

// =============================================================================
// Delete of the attribute vs delete of a value
// =============================================================================

#[test]
fn delete_attribute_then_delete_value() {
    let mut entry = new_entry();
    entry.put(
        AttributeDescription::new("employeenumber"),
        vec!["value1".into()],
    );
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 1, true,
        modification(ModificationType::Delete, "employeenumber", &[]));
    assert_hist(&hist, &[&format!("employeenumber:{}:attrDel", csn(1))]);

    // The value is already gone: record the newer delete time, drop the mod.
    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Delete, "employeenumber", &["value1"]));
    assert_hist(&hist, &[&format!("employeenumber:{}:attrDel", csn(2))]);
}

#[test]
fn delete_value_then_delete_attribute() {
    let mut entry = new_entry();
    entry.put(
        AttributeDescription::new("employeenumber"),
        vec!["value1".into()],
    );
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 1, true,
        modification(ModificationType::Delete, "employeenumber", &["value1"]));
    assert_hist(&hist, &[&format!("employeenumber:{}:attrDel", csn(1))]);

    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Delete, "employeenumber", &[]));
    assert_hist(&hist, &[&format!("employeenumber:{}:attrDel", csn(2))]);
}

// =============================================================================
// Racing adds
// =============================================================================

#[test]
fn older_add_rewrites_to_replace_and_takes_the_slot() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 10, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["init value"]));

    // An add stamped earlier on another replica: it becomes the authoritative
    // value and the modification is rewritten as a replace so the entry ends
    // up with a single value.
    let replayed = hist.replay_modifications(
        csn(1),
        vec![modification(ModificationType::Add, DISPLAY_NAME, &["older value"])],
        &entry,
    );
    assert!(replayed.conflict);
    assert_eq!(replayed.mods.len(), 1);
    assert_eq!(replayed.mods[0].mod_type, ModificationType::Replace);
    assert_eq!(replayed.mods[0].attribute.values, ["older value"]);
    entry.apply_modifications(&replayed.mods);

    assert_hist(&hist, &[&format!("displayname:{}:add:older value", csn(1))]);
    assert_only_value(&entry, DISPLAY_NAME, "older value");

    // And a later concurrent add still loses to the occupied slot.
    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["new value"]));
    assert_hist(&hist, &[&format!("displayname:{}:add:older value", csn(1))]);
}

#[test]
fn add_between_delete_and_later_add_is_dropped() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 1, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["init value"]));
    test_modify(&mut entry, &mut hist, 3, true,
        modification(ModificationType::Delete, DISPLAY_NAME, &["init value"]));
    assert_hist(&hist, &[&format!("displayname:{}:attrDel", csn(3))]);

    // From another replica, between the add and the delete.
    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["second value"]));
    assert_hist(&hist, &[&format!("displayname:{}:attrDel", csn(3))]);
}

#[test]
fn first_add_wins_and_shields_its_value_from_deletes() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 1, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["first value"]));
    // A concurrent later add does not get in.
    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Add, DISPLAY_NAME, &["second value"]));
    // Deleting the value that never got in does nothing.
    test_modify(&mut entry, &mut hist, 2, false,
        modification(ModificationType::Delete, DISPLAY_NAME, &["second value"]));
    assert_hist(&hist, &[&format!("displayname:{}:add:first value", csn(1))]);
    assert_only_value(&entry, DISPLAY_NAME, "first value");
}

// =============================================================================
// Same-CSN sequences from a single originating operation
// =============================================================================

#[test]
fn add_then_delete_at_the_same_csn() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 1, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["aValue"]));
    test_modify(&mut entry, &mut hist, 1, true,
        modification(ModificationType::Delete, DISPLAY_NAME, &["aValue"]));
    assert!(!entry.has_attribute(&AttributeDescription::new(DISPLAY_NAME)));
}

#[test]
fn delete_then_add_at_the_same_csn() {
    let mut entry = new_entry();
    let mut hist = EntryHistory::new(schema());

    test_modify(&mut entry, &mut hist, 1, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["aValue"]));
    test_modify(&mut entry, &mut hist, 2, true,
        modification(ModificationType::Delete, DISPLAY_NAME, &["aValue"]));
    // Delete and re-add carried by one originating operation share the CSN.
    test_modify(&mut entry, &mut hist, 2, true,
        modification(ModificationType::Add, DISPLAY_NAME, &["back"]));
    assert_only_value(&entry, DISPLAY_NAME, "back");
}
