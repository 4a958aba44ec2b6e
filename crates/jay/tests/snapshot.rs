//! Snapshot save/execute tests, including rejection of corrupt input.

use jay::{Context, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, run_snapshot, save_snapshot};
use pretty_assertions::assert_eq;

#[test]
fn snapshot_round_trip_returns_the_completion_value() {
    let mut ctx = Context::new();
    let bytes = save_snapshot(&mut ctx, "(function () { return 'string from snapshot'; }) ();", false).unwrap();
    assert_eq!(&bytes[..4], &SNAPSHOT_MAGIC);

    let result = run_snapshot(&mut ctx, &bytes).unwrap();
    assert_eq!(ctx.get_string(result).as_deref(), Some("string from snapshot"));
    assert_eq!(ctx.get_string_size(result), Some(20));
    ctx.release_value(result);
}

#[test]
fn snapshots_execute_in_a_different_context() {
    let bytes = {
        let mut saver = Context::new();
        save_snapshot(&mut saver, "var greeting = 'from elsewhere'; greeting", false).unwrap()
    };

    let mut runner = Context::new();
    // Populate the runner's interner differently so id remapping matters.
    runner.register_magic_strings(&["unrelated", "strings", "first"]);
    let result = run_snapshot(&mut runner, &bytes).unwrap();
    assert_eq!(runner.get_string(result).as_deref(), Some("from elsewhere"));
    runner.release_value(result);
}

#[test]
fn eval_mode_snapshots_work() {
    let mut ctx = Context::new();
    let bytes = save_snapshot(&mut ctx, "6 * 7", true).unwrap();
    let result = run_snapshot(&mut ctx, &bytes).unwrap();
    assert_eq!(ctx.get_number_value(result), Some(42.0));
    ctx.release_value(result);
}

#[test]
fn nested_functions_survive_the_round_trip() {
    let mut ctx = Context::new();
    let bytes = save_snapshot(
        &mut ctx,
        "function make(n) { return function () { return n * 2; }; } make(21)()",
        false,
    )
    .unwrap();
    let result = run_snapshot(&mut ctx, &bytes).unwrap();
    assert_eq!(ctx.get_number_value(result), Some(42.0));
    ctx.release_value(result);
}

#[test]
fn bad_magic_is_rejected() {
    let mut ctx = Context::new();
    let mut bytes = save_snapshot(&mut ctx, "1", false).unwrap();
    bytes[0] ^= 0xFF;
    let error = run_snapshot(&mut ctx, &bytes).unwrap_err();
    assert!(error.message.contains("bad magic"), "{}", error.message);
}

#[test]
fn wrong_version_is_rejected() {
    let mut ctx = Context::new();
    let mut bytes = save_snapshot(&mut ctx, "1", false).unwrap();
    let bumped = (SNAPSHOT_VERSION + 1).to_le_bytes();
    bytes[4] = bumped[0];
    bytes[5] = bumped[1];
    let error = run_snapshot(&mut ctx, &bytes).unwrap_err();
    assert!(error.message.contains("version"), "{}", error.message);
}

#[test]
fn truncated_payloads_are_rejected() {
    let mut ctx = Context::new();
    let bytes = save_snapshot(&mut ctx, "1 + 2", false).unwrap();
    let error = run_snapshot(&mut ctx, &bytes[..bytes.len() / 2]).unwrap_err();
    assert!(error.message.contains("rejected"), "{}", error.message);
}

#[test]
fn corrupt_payload_offsets_are_rejected() {
    let mut ctx = Context::new();
    let bytes = save_snapshot(&mut ctx, "'payload'", false).unwrap();

    // Byte 6 is the root blob id: pointing it at a non-existent blob must
    // be caught by the loader.
    let mut corrupted = bytes.clone();
    corrupted[6] = corrupted[6].wrapping_add(0x41);
    assert!(run_snapshot(&mut ctx, &corrupted).is_err());

    // Byte 7 starts the string table length: inflating it truncates the
    // decode.
    let mut corrupted = bytes.clone();
    corrupted[7] = corrupted[7].wrapping_add(0x41);
    assert!(run_snapshot(&mut ctx, &corrupted).is_err());
}
