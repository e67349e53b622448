use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use opcmsg_codec::{to_json, Event, Notification, ParamId, ParamValue, Status};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Bare values, one per line.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ParamOutput {
    param_id: String,
    #[serde(rename = "type")]
    type_name: &'static str,
    value: Value,
}

impl ParamOutput {
    fn new(id: &ParamId, value: &ParamValue) -> Self {
        Self {
            param_id: id.to_string(),
            type_name: value.type_name(),
            value: to_json(value),
        }
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    operation: &'a str,
    param_id: String,
    status: &'a str,
}

#[derive(Serialize)]
struct CallOutput {
    method_id: String,
    param_id: String,
    results: Vec<Value>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PushOutput {
    Notification {
        correlation_id: u32,
        params: Vec<ParamOutput>,
    },
    Event {
        correlation_id: u32,
        event_type_id: String,
        param_id: String,
        timestamp: i64,
        severity: i32,
        message: String,
        params: Vec<ParamOutput>,
    },
}

fn print_json<T: Serialize>(out: &T) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn params_table(params: &[(ParamId, ParamValue)]) -> Table {
    let mut out = table(vec!["PARAM", "TYPE", "VALUE"]);
    for (id, value) in params {
        out.add_row(vec![
            id.to_string(),
            value.type_name().to_string(),
            value.to_string(),
        ]);
    }
    out
}

pub fn print_value(id: &ParamId, value: &ParamValue, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ParamOutput::new(id, value)),
        OutputFormat::Table => println!("{}", params_table(&[(id.clone(), value.clone())])),
        OutputFormat::Pretty => println!("{id} ({}) = {value}", value.type_name()),
        OutputFormat::Raw => println!("{value}"),
    }
}

pub fn print_status(operation: &str, id: &ParamId, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatusOutput {
            operation,
            param_id: id.to_string(),
            status: Status::Success.name(),
        }),
        OutputFormat::Table => {
            let mut out = table(vec!["OPERATION", "PARAM", "STATUS"]);
            out.add_row(vec![
                operation.to_string(),
                id.to_string(),
                Status::Success.name().to_string(),
            ]);
            println!("{out}");
        }
        OutputFormat::Pretty => println!("{operation} {id}: {}", Status::Success.name()),
        OutputFormat::Raw => {}
    }
}

pub fn print_call(method_id: &ParamId, param_id: &ParamId, values: &[ParamValue], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&CallOutput {
            method_id: method_id.to_string(),
            param_id: param_id.to_string(),
            results: values.iter().map(to_json).collect(),
        }),
        OutputFormat::Table => {
            let mut out = table(vec!["#", "TYPE", "VALUE"]);
            for (index, value) in values.iter().enumerate() {
                out.add_row(vec![
                    index.to_string(),
                    value.type_name().to_string(),
                    value.to_string(),
                ]);
            }
            println!("{out}");
        }
        OutputFormat::Pretty => {
            let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
            println!("{method_id} on {param_id} -> [{}]", rendered.join(", "));
        }
        OutputFormat::Raw => {
            for value in values {
                println!("{value}");
            }
        }
    }
}

pub fn print_notification(notification: &Notification, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PushOutput::Notification {
            correlation_id: notification.correlation_id,
            params: notification
                .params
                .iter()
                .map(|(id, value)| ParamOutput::new(id, value))
                .collect(),
        }),
        OutputFormat::Table => println!("{}", params_table(&notification.params)),
        OutputFormat::Pretty => {
            println!("notification #{}", notification.correlation_id);
            for (id, value) in &notification.params {
                println!("  {id} ({}) = {value}", value.type_name());
            }
        }
        OutputFormat::Raw => {
            for (id, value) in &notification.params {
                println!("{id} {value}");
            }
        }
    }
}

pub fn print_event(event: &Event, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PushOutput::Event {
            correlation_id: event.correlation_id,
            event_type_id: event.event_type_id.to_string(),
            param_id: event.param_id.to_string(),
            timestamp: event.timestamp,
            severity: event.severity,
            message: event.message.clone(),
            params: event
                .params
                .iter()
                .map(|(id, value)| ParamOutput::new(id, value))
                .collect(),
        }),
        OutputFormat::Table => {
            let mut out = table(vec!["EVENT", "PARAM", "SEVERITY", "TIMESTAMP", "MESSAGE"]);
            out.add_row(vec![
                event.event_type_id.to_string(),
                event.param_id.to_string(),
                event.severity.to_string(),
                event.timestamp.to_string(),
                event.message.clone(),
            ]);
            println!("{out}");
            if !event.params.is_empty() {
                println!("{}", params_table(&event.params));
            }
        }
        OutputFormat::Pretty => {
            println!(
                "event #{} {} on {} severity={} at={}: {}",
                event.correlation_id,
                event.event_type_id,
                event.param_id,
                event.severity,
                event.timestamp,
                event.message
            );
            for (id, value) in &event.params {
                println!("  {id} ({}) = {value}", value.type_name());
            }
        }
        OutputFormat::Raw => println!("{} {} {}", event.event_type_id, event.severity, event.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_output_is_tagged_by_kind() {
        let out = PushOutput::Notification {
            correlation_id: 7,
            params: vec![ParamOutput::new(&ParamId::string(2, "speed"), &ParamValue::Int(3))],
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["kind"], "notification");
        assert_eq!(json["params"][0]["param_id"], "ns=2;s=speed");
        assert_eq!(json["params"][0]["type"], "int");
        assert_eq!(json["params"][0]["value"], 3);
    }
}
