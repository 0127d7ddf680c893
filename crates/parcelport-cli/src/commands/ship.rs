use std::io::{self, Write};
use std::path::Path;

use parcelport_core::{
    Address, AdapterRegistry, CoreConfig, FlowError, FlowOrchestrator, LabelFlowRequest,
    LabelFormat, MemoryStore, Parcel, Store,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::cli::{LabelFormatArg, ShipArgs};
use crate::error::CliError;

use super::CommandOutcome;

/// Contents of the `--input` file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipInput {
    sender: Address,
    #[serde(default)]
    reference: Option<String>,
    parcels: Vec<Parcel>,
}

pub async fn run(
    args: &ShipArgs,
    config: &CoreConfig,
    registry: &AdapterRegistry,
    pretty: bool,
) -> Result<CommandOutcome, CliError> {
    let carrier = config
        .carrier(&args.carrier)
        .ok_or_else(|| CliError::Usage(format!("carrier '{}' is not configured", args.carrier)))?;
    let input = read_input(&args.input)?;
    let credentials = carrier.credentials_from_env()?;
    let (adapter, ctx) = registry.resolve(&args.carrier)?;

    let store = args.dry_store.then(MemoryStore::new);
    let request = LabelFlowRequest {
        credentials,
        sender: input.sender,
        reference: input.reference,
        parcels: input.parcels,
        format: to_label_format(args.format),
    };

    let result = FlowOrchestrator::new()
        .create_labels(
            adapter.as_ref(),
            &ctx,
            request,
            store.as_ref().map(|store| store as &dyn Store),
        )
        .await;

    match result {
        Ok(outcome) => {
            let labels = outcome.labels_batch();
            let exit_code = match labels.http_status() {
                207 => 5,
                400 => 3,
                _ => 0,
            };
            let data = json!({
                "outcome": serde_json::to_value(&outcome)?,
                "labels": serde_json::to_value(&labels)?,
                "stored": stored_keys(store.as_ref()),
            });
            Ok(CommandOutcome::ok(data).with_exit_code(exit_code))
        }
        Err(failure) => {
            let stdout = io::stdout();
            write_failure(&mut stdout.lock(), &failure, store.as_ref(), pretty)?;
            Err(CliError::Carrier(failure.error))
        }
    }
}

/// Writes what an aborted flow already produced, so the caller can compensate.
fn write_failure<W: Write>(
    writer: &mut W,
    failure: &FlowError,
    store: Option<&MemoryStore>,
    pretty: bool,
) -> Result<(), CliError> {
    let report = json!({
        "failedStep": failure.step,
        "error": serde_json::to_value(&failure.error)?,
        "partial": serde_json::to_value(&failure.partial)?,
        "stored": stored_keys(store),
    });
    crate::output::write_json(writer, &report, pretty)
}

fn read_input(path: &Path) -> Result<ShipInput, CliError> {
    let contents = std::fs::read_to_string(path)?;
    let input: ShipInput = serde_json::from_str(&contents)?;
    input.sender.validate()?;
    for parcel in &input.parcels {
        parcel.validate()?;
    }
    Ok(input)
}

fn stored_keys(store: Option<&MemoryStore>) -> Value {
    match store {
        Some(store) => Value::from(
            store
                .records()
                .into_iter()
                .map(|(key, _)| key)
                .collect::<Vec<_>>(),
        ),
        None => Value::Null,
    }
}

fn to_label_format(format: LabelFormatArg) -> LabelFormat {
    match format {
        LabelFormatArg::Pdf => LabelFormat::Pdf,
        LabelFormatArg::Zpl => LabelFormat::Zpl,
        LabelFormatArg::Png => LabelFormat::Png,
    }
}

#[cfg(test)]
mod tests {
    use parcelport_core::{CarrierError, FlowOutcome, FlowStep};

    use super::*;

    #[test]
    fn input_file_is_validated() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{
                "sender": {{"name":"Shop","street":"Dock 4","postalCode":"3011AA","city":"Rotterdam","country":"NL"}},
                "parcels": [{{
                    "reference": "order-1",
                    "recipient": {{"name":"Ada","street":"Main St 1","postalCode":"1011AB","city":"Amsterdam","country":"NL"}},
                    "weightGrams": 0
                }}]
            }}"#
        )
        .expect("write input");

        let error = read_input(file.path()).expect_err("zero weight rejected");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn stored_keys_are_listed_in_order() {
        let store = MemoryStore::new();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        rt.block_on(async {
            store.save("s/shipment", json!({})).await.expect("saved");
            store.save("s/labels/0", json!({})).await.expect("saved");
        });

        assert_eq!(stored_keys(Some(&store)), json!(["s/shipment", "s/labels/0"]));
        assert_eq!(stored_keys(None), Value::Null);
    }

    #[test]
    fn failure_report_honors_pretty_flag() {
        // Given: a flow that stopped at the close step after creating a shipment
        let failure = FlowError {
            step: FlowStep::CloseShipment,
            error: CarrierError::transient("gateway timeout"),
            partial: FlowOutcome {
                shipment_id: Some(String::from("S-1")),
                ..FlowOutcome::default()
            },
        };

        // When: the report is written in both modes
        let mut pretty = Vec::new();
        write_failure(&mut pretty, &failure, None, true).expect("writes");
        let mut compact = Vec::new();
        write_failure(&mut compact, &failure, None, false).expect("writes");

        // Then: only the pretty report spans several lines
        let pretty = String::from_utf8(pretty).expect("utf8");
        let compact = String::from_utf8(compact).expect("utf8");
        assert!(pretty.lines().count() > 1);
        assert_eq!(compact.lines().count(), 1);

        // And: both carry the same report
        let report: Value = serde_json::from_str(&pretty).expect("json");
        assert_eq!(report, serde_json::from_str::<Value>(&compact).expect("json"));
        assert_eq!(report["failedStep"], "close_shipment");
        assert_eq!(report["partial"]["shipmentId"], "S-1");
    }
}
