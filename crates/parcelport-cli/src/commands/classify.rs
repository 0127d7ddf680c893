use parcelport_core::{ErrorClassifier, HttpError, HttpErrorKind, HttpResponse};
use serde_json::json;

use crate::cli::{ClassifyArgs, TransportKind};
use crate::error::CliError;

use super::CommandOutcome;

pub fn run(args: &ClassifyArgs) -> Result<CommandOutcome, CliError> {
    let classifier = ErrorClassifier::default();

    let error = match (args.status, args.transport) {
        (Some(status), None) => {
            let mut response = HttpResponse::new(status, args.body.clone().unwrap_or_default());
            for header in &args.headers {
                let (name, value) = parse_header(header)?;
                response = response.with_header(name, value);
            }
            classifier.classify_response(&response)
        }
        (None, Some(kind)) => {
            let kind = to_error_kind(kind);
            classifier.classify_transport(&HttpError::new(kind, format!("{kind:?} failure")))
        }
        _ => {
            return Err(CliError::Usage(String::from(
                "pass exactly one of --status or --transport",
            )))
        }
    };

    Ok(CommandOutcome::ok(json!({
        "error": serde_json::to_value(&error)?,
        "code": error.code(),
        "retryable": error.retryable(),
    })))
}

fn parse_header(raw: &str) -> Result<(&str, &str), CliError> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| CliError::Usage(format!("header must be name=value: '{raw}'")))
}

fn to_error_kind(kind: TransportKind) -> HttpErrorKind {
    match kind {
        TransportKind::Connect => HttpErrorKind::Connect,
        TransportKind::Dns => HttpErrorKind::Dns,
        TransportKind::Timeout => HttpErrorKind::Timeout,
        TransportKind::Interrupted => HttpErrorKind::Interrupted,
        TransportKind::TokenExchange => HttpErrorKind::TokenExchange,
        TransportKind::Request => HttpErrorKind::Request,
    }
}
