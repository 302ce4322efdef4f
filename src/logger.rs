use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

// One JSON object per line on stdout. println! locks stdout per call, which
// keeps records whole under concurrent handlers.
fn emit(message: &str, data: Value) {
    let record = json!({
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        "message": message,
        "data": data,
    });
    println!("{record}");
}

pub fn server_started(address: &str, port: u16) {
    emit(
        "server started",
        json!({ "port": port, "address": address }),
    );
}

pub fn server_exited(code: i32) {
    emit("server exited", json!({ "code": code }));
}

pub fn server_exited_with_error(error: &anyhow::Error) {
    emit(
        "server exited",
        json!({ "code": "EXIT_FAILURE", "exception": format!("{error:#}") }),
    );
}

pub fn request_received(ip: &str, method: &str, uri: &str) {
    emit(
        "request received",
        json!({ "ip": ip, "URI": uri, "method": method }),
    );
}

pub fn response_sent(ip: &str, response_time_ms: u128, code: u16, content_type: Option<&str>) {
    emit(
        "response sent",
        json!({
            "ip": ip,
            "response_time": response_time_ms as u64,
            "code": code,
            "content_type": content_type,
        }),
    );
}

pub fn error(location: &str, text: &str) {
    emit("error", json!({ "where": location, "text": text }));
}
