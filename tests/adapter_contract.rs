//! Behavior tests for the capability-gated adapter contract.

mod support;

use std::sync::Arc;

use parcelport_core::{
    AdapterContext, Capability, CapabilitySet, CanonicalHttpAdapter, CarrierAdapter,
    CloseShipmentRequest, CreateLabelRequest, CreateLabelsRequest, CreateParcelRequest,
    CreateParcelsRequest, CreateShipmentRequest, Credentials, ErrorCategory, HttpResponse,
    LabelFormat, LabelItem, PickupPointsRequest, PickupRequest, RatesRequest, Requirement,
    TrackRequest, VoidLabelRequest,
};

use support::{parcel, sender, ScriptedHttpClient};

fn gateway(capabilities: CapabilitySet) -> CanonicalHttpAdapter {
    CanonicalHttpAdapter::new("gateway", "https://gateway.test", capabilities)
}

#[tokio::test]
async fn every_undeclared_operation_fails_with_permanent_error_and_no_traffic() {
    // Given: an adapter that declares nothing
    let http = Arc::new(ScriptedHttpClient::default());
    let ctx = AdapterContext::new(http.clone());
    let adapter = gateway(CapabilitySet::empty());

    // When: every operation is invoked anyway
    let errors = vec![
        (
            Capability::CreateParcel,
            adapter
                .create_parcel(
                    CreateParcelRequest {
                        credentials: Credentials::None,
                        shipment_id: None,
                        parcel: parcel("a"),
                    },
                    &ctx,
                )
                .await
                .err(),
        ),
        (
            Capability::CreateParcels,
            adapter
                .create_parcels(
                    CreateParcelsRequest {
                        credentials: Credentials::None,
                        shipment_id: None,
                        parcels: vec![parcel("a"), parcel("b")],
                    },
                    &ctx,
                )
                .await
                .err(),
        ),
        (
            Capability::CreateLabel,
            adapter
                .create_label(
                    CreateLabelRequest {
                        credentials: Credentials::None,
                        shipment_id: None,
                        format: LabelFormat::Pdf,
                        item: LabelItem {
                            parcel_id: Some(String::from("P1")),
                            parcel: parcel("a"),
                        },
                    },
                    &ctx,
                )
                .await
                .err(),
        ),
        (
            Capability::Track,
            adapter
                .track(TrackRequest::new(Credentials::None, "3S1").expect("valid"), &ctx)
                .await
                .err(),
        ),
        (
            Capability::ListPickupPoints,
            adapter
                .fetch_pickup_points(
                    PickupPointsRequest::new(Credentials::None, "1011AB", "NL", 5).expect("valid"),
                    &ctx,
                )
                .await
                .err(),
        ),
        (
            Capability::RequestPickup,
            adapter
                .request_pickup(
                    PickupRequest {
                        credentials: Credentials::None,
                        address: sender(),
                        parcel_ids: vec![String::from("P1")],
                        earliest: None,
                        latest: None,
                    },
                    &ctx,
                )
                .await
                .err(),
        ),
        (
            Capability::GetRates,
            adapter
                .get_rates(
                    RatesRequest {
                        credentials: Credentials::None,
                        sender: sender(),
                        parcels: vec![parcel("a")],
                    },
                    &ctx,
                )
                .await
                .err(),
        ),
        (
            Capability::VoidLabel,
            adapter
                .void_label(
                    VoidLabelRequest {
                        credentials: Credentials::None,
                        label_id: String::from("L1"),
                    },
                    &ctx,
                )
                .await
                .err(),
        ),
        (
            Capability::CreateShipment,
            adapter
                .create_shipment(
                    CreateShipmentRequest {
                        credentials: Credentials::None,
                        sender: sender(),
                        reference: None,
                    },
                    &ctx,
                )
                .await
                .err(),
        ),
        (
            Capability::CloseShipment,
            adapter
                .close_shipment(
                    CloseShipmentRequest {
                        credentials: Credentials::None,
                        shipment_id: String::from("S1"),
                    },
                    &ctx,
                )
                .await
                .err(),
        ),
    ];

    // Then: each one fails loudly, naming the capability and the adapter
    for (capability, error) in errors {
        let error = error.unwrap_or_else(|| panic!("{capability} must fail"));
        assert_eq!(error.category(), ErrorCategory::Permanent, "{capability}");
        assert!(error.message().contains(capability.as_str()), "{}", error.message());
        assert!(error.message().contains("gateway"), "{}", error.message());
        assert_eq!(error.carrier_code(), Some("capability.not_implemented"));
    }

    // And: no request ever reached the carrier
    assert!(http.requests().is_empty());
}

#[tokio::test]
async fn create_labels_batch_requires_batch_capability_for_several_items() {
    let http = Arc::new(ScriptedHttpClient::default());
    let ctx = AdapterContext::new(http.clone());
    let adapter = gateway(CapabilitySet::new(&[Capability::CreateLabel]));

    let error = adapter
        .create_labels(
            CreateLabelsRequest {
                credentials: Credentials::None,
                shipment_id: None,
                format: LabelFormat::Zpl,
                items: vec![
                    LabelItem {
                        parcel_id: Some(String::from("P1")),
                        parcel: parcel("a"),
                    },
                    LabelItem {
                        parcel_id: Some(String::from("P2")),
                        parcel: parcel("b"),
                    },
                ],
            },
            &ctx,
        )
        .await
        .expect_err("CREATE_LABELS not declared");

    assert!(error.message().contains("CREATE_LABELS"));
    assert!(http.requests().is_empty());
}

#[tokio::test]
async fn single_item_call_matches_batch_call_for_the_same_input() {
    // Given: the carrier answers the same way to both shapes of the request
    let body = r#"{"items":[{"errors":[{"field":"recipient.postalCode","code":"invalid_postcode","message":"unknown postcode"}]}]}"#;
    let success = r#"{"items":[{"id":"P-77","status":"registered","metadata":{"zone":"3"}}]}"#;
    let http = Arc::new(ScriptedHttpClient::responding(vec![
        HttpResponse::ok_json(body),
        HttpResponse::ok_json(body),
        HttpResponse::ok_json(success),
        HttpResponse::ok_json(success),
    ]));
    let ctx = AdapterContext::new(http.clone());
    let adapter = gateway(CapabilitySet::new(&[
        Capability::CreateParcel,
        Capability::CreateParcels,
    ]));

    for _ in 0..2 {
        // When: the same parcel goes through the single and the batch operation
        let single = adapter
            .create_parcel(
                CreateParcelRequest {
                    credentials: Credentials::basic("shop", "secret"),
                    shipment_id: Some(String::from("S1")),
                    parcel: parcel("order-9"),
                },
                &ctx,
            )
            .await
            .expect("single call");
        let batch = adapter
            .create_parcels(
                CreateParcelsRequest {
                    credentials: Credentials::basic("shop", "secret"),
                    shipment_id: Some(String::from("S1")),
                    parcels: vec![parcel("order-9")],
                },
                &ctx,
            )
            .await
            .expect("batch call");

        // Then: the per-item outcome is identical
        assert_eq!(batch.total_count(), 1);
        assert_eq!(&single, &batch.results()[0]);
    }

    // And: both paths sent the same request
    let requests = http.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0], requests[1]);
    assert_eq!(requests[2], requests[3]);
}

#[tokio::test]
async fn single_item_call_rejects_carrier_answering_with_several_items() {
    let http = Arc::new(ScriptedHttpClient::responding(vec![HttpResponse::ok_json(
        r#"{"items":[{"id":"P1"},{"id":"P2"}]}"#,
    )]));
    let ctx = AdapterContext::new(http);

    let error = gateway(CapabilitySet::new(&[Capability::CreateParcel]))
        .create_parcel(
            CreateParcelRequest {
                credentials: Credentials::None,
                shipment_id: None,
                parcel: parcel("a"),
            },
            &ctx,
        )
        .await
        .expect_err("two results for one parcel");

    assert_eq!(error.category(), ErrorCategory::Permanent);
}

#[tokio::test]
async fn batch_answer_with_fewer_results_than_parcels_is_malformed() {
    // Given: a carrier acknowledging only the first of three parcels
    let http = Arc::new(ScriptedHttpClient::responding(vec![HttpResponse::ok_json(
        r#"{"items":[{"id":"P1"}]}"#,
    )]));
    let ctx = AdapterContext::new(http);

    // When: three parcels are submitted as a batch
    let error = gateway(CapabilitySet::new(&[Capability::CreateParcels]))
        .create_parcels(
            CreateParcelsRequest {
                credentials: Credentials::None,
                shipment_id: Some(String::from("S1")),
                parcels: vec![parcel("a"), parcel("b"), parcel("c")],
            },
            &ctx,
        )
        .await
        .expect_err("two parcels have no result");

    // Then: the answer is rejected instead of reported as a full success
    assert_eq!(error.category(), ErrorCategory::Permanent);
    assert!(error.message().contains("1 results for 3"));
    assert!(error.raw().is_some());
}

#[test]
fn capabilities_and_requirements_are_discoverable_before_invocation() {
    let adapter = gateway(CapabilitySet::new(&[
        Capability::CreateLabel,
        Capability::CloseShipment,
    ]))
    .with_requirements(vec![Requirement::new(
        Capability::CreateLabel,
        Capability::CloseShipment,
    )]);

    assert!(adapter.capabilities().supports(Capability::CreateLabel));
    assert!(!adapter.capabilities().supports(Capability::Track));
    assert_eq!(
        adapter.capabilities().supported_capabilities(),
        vec!["CREATE_LABEL", "CLOSE_SHIPMENT"]
    );
    assert!(parcelport_core::capability::requires(
        adapter.requirements(),
        Capability::CreateLabel,
        Capability::CloseShipment
    ));
}
