//! Behavior tests for batch result aggregation.

use parcelport_core::{BatchResponse, BatchSubject, ItemError, ItemOutcome};
use proptest::prelude::*;
use serde_json::json;

fn outcome(index: usize, succeeded: bool) -> ItemOutcome {
    if succeeded {
        ItemOutcome::succeeded(format!("P{index}"), "created", json!({ "index": index }))
    } else {
        ItemOutcome::failed(
            vec![ItemError::for_field("weight", "required", "weight is required")],
            json!({ "index": index }),
        )
    }
}

proptest! {
    #[test]
    fn counts_and_flags_hold_for_any_mix(flags in proptest::collection::vec(any::<bool>(), 0..64)) {
        let batch = BatchResponse::from_outcomes(
            BatchSubject::Parcel,
            flags.iter().enumerate().map(|(index, ok)| outcome(index, *ok)),
        );

        prop_assert_eq!(batch.total_count(), flags.len());
        prop_assert_eq!(batch.success_count() + batch.failure_count(), batch.total_count());
        prop_assert_eq!(batch.success_count(), flags.iter().filter(|ok| **ok).count());

        let raised = [batch.all_succeeded(), batch.all_failed(), batch.some_failed()]
            .iter()
            .filter(|flag| **flag)
            .count();
        if flags.is_empty() {
            prop_assert_eq!(raised, 0);
        } else {
            prop_assert_eq!(raised, 1);
        }

        for (index, item) in batch.results().iter().enumerate() {
            prop_assert_eq!(item.is_success(), flags[index]);
            prop_assert_eq!(&item.raw()["index"], &json!(index));
        }
    }
}

#[test]
fn two_successes_and_one_failure_is_a_mixed_result() {
    // Given: three parcels where the middle one is rejected
    let outcomes = vec![outcome(0, true), outcome(1, false), outcome(2, true)];

    // When: the results are aggregated
    let batch = BatchResponse::from_outcomes(BatchSubject::Parcel, outcomes);

    // Then: the batch reports a partial failure
    assert!(batch.some_failed());
    assert!(!batch.all_succeeded());
    assert!(!batch.all_failed());
    assert!(batch.summary().contains("2 succeeded, 1 failed"));
    assert_eq!(batch.http_status(), 207);

    // And: the failure keeps its structured error in place
    assert_eq!(batch.results()[1].status(), "failed");
    assert_eq!(batch.results()[1].errors()[0].field.as_deref(), Some("weight"));
    assert_eq!(batch.successes().count(), 2);
    assert_eq!(batch.failures().count(), 1);
}

#[test]
fn empty_input_is_not_an_error() {
    let batch = BatchResponse::from_outcomes(BatchSubject::Label, Vec::new());

    assert_eq!(batch.total_count(), 0);
    assert_eq!(batch.success_count(), 0);
    assert_eq!(batch.failure_count(), 0);
    assert!(!batch.all_succeeded() && !batch.all_failed() && !batch.some_failed());
    assert_eq!(batch.summary(), "No items to process");
}

#[test]
fn batch_serializes_to_the_shared_wire_shape() {
    let batch = BatchResponse::from_outcomes(
        BatchSubject::Label,
        vec![outcome(0, true), outcome(1, false)],
    )
    .with_raw_carrier_response(json!({ "items": [] }));

    let wire = serde_json::to_value(&batch).expect("serializes");

    for key in [
        "results",
        "successCount",
        "failureCount",
        "totalCount",
        "allSucceeded",
        "allFailed",
        "someFailed",
        "summary",
        "rawCarrierResponse",
    ] {
        assert!(wire.get(key).is_some(), "missing {key}");
    }
    assert_eq!(wire["results"][0]["carrierId"], "P0");
    assert_eq!(wire["results"][1]["status"], "failed");
    assert_eq!(wire["results"][1]["errors"][0]["code"], "required");
}

#[test]
fn item_without_identifier_or_errors_fails_with_missing_carrier_id() {
    let batch = BatchResponse::from_outcomes(
        BatchSubject::Parcel,
        vec![ItemOutcome {
            status: Some(String::from("accepted")),
            raw: json!({ "status": "accepted" }),
            ..ItemOutcome::default()
        }],
    );

    assert!(batch.all_failed());
    assert_eq!(batch.results()[0].errors()[0].code, "missing_carrier_id");
    assert_eq!(batch.http_status(), 400);
}
