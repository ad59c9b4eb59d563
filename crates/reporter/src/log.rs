//! Step naming and request details derived from command log entries

use serde_json::Value;

use crate::event::CommandLog;

/// Name produced by an empty BDD callback, which never becomes a step
pub const EMPTY_CALLBACK: &str = "function(){} then";

/// Log names whose step keeps the name it was created with
const KEEP_NAME: [&str; 7] = ["request", "step", "GET", "POST", "PUT", "DELETE", "PATCH"];

/// Step name for a log entry
pub fn step_name(log: &CommandLog) -> String {
    let lookup = if log.name.starts_with("stub") {
        "stub"
    } else {
        log.name.as_str()
    };
    match lookup {
        "xhr" => {
            let stubbed = log.console_str("Stubbed") == Some("Yes");
            format!(
                "{}{} {}",
                if stubbed { "STUBBED " } else { "" },
                log.console_str("Method").unwrap_or_default(),
                log.console_str("URL").unwrap_or_default()
            )
        }
        "step" => format!(
            "{}{}",
            log.display_name.as_deref().unwrap_or_default(),
            log.message.replace('*', "")
        ),
        "stub" => {
            let name = format!(
                "{} [ function: {} ]",
                log.name,
                log.function_name.as_deref().unwrap_or_default()
            );
            match &log.alias {
                Some(alias) => format!("{} as {}", name, alias),
                None => name,
            }
        }
        "route" => format!(
            "{} {} {}",
            log.name,
            log.method.as_deref().unwrap_or_default(),
            log.url.as_deref().unwrap_or_default()
        ),
        _ if !log.message.is_empty() => format!("{} {}", log.message, log.name),
        _ => log.name.clone(),
    }
}

/// Name a closed step should take from its log: `name message`
pub fn closing_name(log: &CommandLog) -> Option<String> {
    if log.name.is_empty() || log.message.is_empty() || KEEP_NAME.contains(&log.name.as_str()) {
        return None;
    }
    Some(format!("{} {}", log.name, log.message))
}

/// BDD doc string argument carried by a `step` entry, as (type, content)
pub fn doc_string(log: &CommandLog) -> Option<(String, String)> {
    let argument = log.console_value("step")?.get("argument")?;
    let content = argument.get("content")?.as_str().filter(|c| !c.is_empty())?;
    let kind = argument
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("DocString");
    Some((kind.to_string(), content.to_string()))
}

/// Parameter rendering of assertion values
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

/// Request and response details found in a log entry's console output
#[derive(Debug, Default, PartialEq)]
pub struct RequestDetails {
    /// New step name, when the entry provides one
    pub title: Option<String>,
    /// (attachment name, content) pairs in attachment order
    pub parts: Vec<(&'static str, Value)>,
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

fn last_of(value: Option<&Value>) -> Option<&Value> {
    present(value)?.as_array()?.last()
}

/// Extract request details from `request` output or an API plugin's
/// yielded request/response list
pub fn request_details(log: &CommandLog) -> Option<RequestDetails> {
    let props = log.console_props.as_ref()?;
    let yielded_all = props
        .get("yielded")
        .and_then(|y| y.get("allRequestResponses"))
        .and_then(Value::as_array)
        .filter(|all| !all.is_empty());
    let is_request =
        present(props.get("Request")).is_some() || present(props.get("Requests")).is_some();
    if !is_request && yielded_all.is_none() {
        return None;
    }

    let mut details = RequestDetails {
        title: log
            .render_props
            .as_ref()
            .and_then(|r| r.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string),
        parts: Vec::new(),
    };
    if yielded_all.is_some() {
        let yielded = &props["yielded"];
        details.title = Some(format!(
            "{} \"{}\" - {} | {}",
            log.name,
            log.message,
            display_value(&yielded["status"]),
            display_value(&yielded["statusText"])
        ));
    }

    let api_last = props
        .get("yielded")
        .and_then(|y| last_of(y.get("allRequestResponses")));
    let request = present(props.get("Request"))
        .or_else(|| last_of(props.get("Requests")))
        .or(api_last);
    let response = present(props.get("Yielded")).or(api_last);

    if let Some(request) = request {
        push_part(&mut details, "requestHeaders", request.get("Request Headers"));
        push_part(&mut details, "request", request.get("Request Body"));
    }
    if let Some(response) = response {
        push_part(
            &mut details,
            "responseHeaders",
            present(response.get("headers")).or(response.get("Response Headers")),
        );
        push_part(
            &mut details,
            "response",
            present(response.get("body")).or(response.get("Response Body")),
        );
    }
    Some(details)
}

fn push_part(details: &mut RequestDetails, name: &'static str, content: Option<&Value>) {
    if let Some(content) = present(content) {
        details.parts.push((name, content.clone()));
    }
}

/// Attachment body and content type: pretty JSON when the content is JSON
/// (or a string holding JSON), plain text otherwise
pub fn attachment_body(content: &Value) -> (String, &'static str) {
    let parsed = match content {
        Value::String(s) => serde_json::from_str::<Value>(s).ok(),
        other => Some(other.clone()),
    };
    match parsed.and_then(|v| serde_json::to_string_pretty(&v).ok()) {
        Some(json) => (json, "application/json"),
        None => (display_value(content), "text/plain"),
    }
}
