// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for the wire envelopes.

use proptest::prelude::*;
use serde_json::{Map, Value, json};

use docpipe_core::{ContentHasher, ExecutionContext, ExecutionResult, Operation, sha256_hex};

// ── Strategies ─────────────────────────────────────────────────────

fn arb_short_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,31}"
}

fn arb_opaque_id() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9\\-]{1,48}"
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop::sample::select(Operation::ALL.to_vec())
}

fn arb_json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,32}".prop_map(Value::from),
    ]
}

fn arb_params() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(arb_short_name(), arb_json_leaf(), 0..6).prop_map(|m| {
        m.into_iter().collect()
    })
}

// ── Context properties ─────────────────────────────────────────────

proptest! {
    #[test]
    fn context_round_trips(
        executor in arb_short_name(),
        op in arb_operation(),
        run_id in arb_opaque_id(),
        org in prop::option::of(arb_opaque_id()),
        params in arb_params(),
    ) {
        let mut ctx = ExecutionContext::new(executor, op, run_id, "tool")
            .unwrap()
            .with_params(params);
        if let Some(org) = org {
            ctx = ctx.with_organization(org);
        }

        let wire = ctx.to_wire().unwrap();
        // Wire form is a pure JSON object: survives a text round-trip.
        let text = serde_json::to_string(&wire).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        let restored = ExecutionContext::from_wire(reparsed).unwrap();
        prop_assert_eq!(restored, ctx);
    }

    #[test]
    fn enum_and_string_forms_store_identically(op in arb_operation()) {
        let from_enum = ExecutionContext::new("legacy", op, "run-1", "tool").unwrap();
        let from_str = ExecutionContext::new("legacy", op.as_str(), "run-1", "tool").unwrap();
        prop_assert_eq!(from_enum.operation, from_str.operation);
    }
}

// ── Result properties ──────────────────────────────────────────────

proptest! {
    #[test]
    fn result_round_trips(data in arb_params(), metadata in arb_params()) {
        let mut result = ExecutionResult::ok(data);
        result.metadata = metadata;

        let restored = ExecutionResult::from_wire(result.to_wire().unwrap()).unwrap();
        prop_assert_eq!(restored, result);
    }

    #[test]
    fn failure_always_carries_error(msg in "[ -~]{1,64}") {
        let result = ExecutionResult::failure(msg);
        prop_assert!(!result.success);
        prop_assert!(result.validate().is_ok());
        let wire = result.to_wire().unwrap();
        prop_assert!(wire.get("error").is_some());
    }
}

// ── Hashing properties ─────────────────────────────────────────────

proptest! {
    #[test]
    fn chunked_hash_equals_one_pass(
        content in prop::collection::vec(any::<u8>(), 0..8192),
        chunk_size in 1usize..512,
    ) {
        let mut hasher = ContentHasher::new();
        for chunk in content.chunks(chunk_size) {
            hasher.update(chunk);
        }
        prop_assert_eq!(hasher.finish(), sha256_hex(&content));
    }
}

#[test]
fn context_wire_form_has_no_native_types() {
    let ctx = ExecutionContext::new("legacy", Operation::Summarize, "run-9", "api")
        .unwrap()
        .with_params({
            let mut m = Map::new();
            m.insert("chunk_size".into(), json!(512));
            m
        });
    let wire = ctx.to_wire().unwrap();
    assert!(wire.is_object());
    for (_, v) in wire.as_object().unwrap() {
        assert!(
            v.is_null() || v.is_string() || v.is_object() || v.is_number() || v.is_boolean(),
            "unexpected wire value: {v:?}"
        );
    }
}
