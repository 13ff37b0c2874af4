//! Property tests for argument binding and interception.
//!
//! Uses proptest to verify:
//! 1. Keyword order never changes the bound result
//! 2. Any positional/keyword split of a full call binds the same way
//! 3. Interception captures exactly what binding produces

use pipelab_core::intercept::intercept;
use pipelab_core::symbols::{BoundArgs, CallArgs, Function, Registry, Signature};
use pipelab_core::Value;
use proptest::prelude::*;

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

fn signature() -> Signature {
    Signature::positional(&NAMES).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_values() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-1000_i64..1000, NAMES.len())
}

fn arb_call() -> impl Strategy<Value = (Vec<i64>, usize, Vec<usize>)> {
    (arb_values(), 0..=NAMES.len()).prop_flat_map(|(values, split)| {
        let keyword_count = NAMES.len() - split;
        let order = Just((0..keyword_count).collect::<Vec<_>>()).prop_shuffle();
        (Just(values), Just(split), order)
    })
}

/// The first `split` values go positionally, the rest as keywords in `order`.
fn build_call(values: &[i64], split: usize, order: &[usize]) -> CallArgs {
    let mut args = CallArgs::new();
    for value in &values[..split] {
        args = args.arg(*value);
    }
    for i in order {
        let index = split + i;
        args = args.kwarg(NAMES[index], values[index]);
    }
    args
}

fn expected(values: &[i64]) -> Vec<(String, Value)> {
    NAMES
        .iter()
        .zip(values)
        .map(|(n, v)| (n.to_string(), Value::Int(*v)))
        .collect()
}

fn entries(bound: &BoundArgs) -> Vec<(String, Value)> {
    bound.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
}

// ── 1 & 2. Binding is independent of how the call is spelled ─────────

proptest! {
    #[test]
    fn binding_ignores_call_shape((values, split, order) in arb_call()) {
        let bound = signature().bind(build_call(&values, split, &order)).unwrap();
        prop_assert_eq!(entries(&bound), expected(&values));
    }
}

// ── 3. Interception agrees with binding ──────────────────────────────

proptest! {
    #[test]
    fn interception_matches_binding((values, split, order) in arb_call()) {
        let registry = Registry::new();
        registry.define(
            "pipelab.sample_functions",
            "f",
            Function::new("f", signature(), |_| Ok(Value::Null)),
        );

        let mut sink = BoundArgs::new();
        intercept(&registry, "pipelab.sample_functions.f", &mut sink, || {
            registry.call("pipelab.sample_functions.f", build_call(&values, split, &order))
        })
        .unwrap();

        let bound = signature().bind(build_call(&values, split, &order)).unwrap();
        prop_assert_eq!(sink, bound);
    }
}
