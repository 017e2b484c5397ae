//! ---
//! iot_section: "05-cli"
//! iot_subsection: "binary"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Control CLI for operators sending actions to IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use iot_link_common::config::AppConfig;

/// Print the configured boxes in file order.
pub fn run(config: &AppConfig) {
    if config.boxes.is_empty() {
        println!("no boxes configured");
        return;
    }
    println!("{:<6} {:<16} IDENTIFIER", "ID", "IP");
    for (id, record) in &config.boxes {
        println!("{:<6} {:<16} {}", id.trim(), record.ip, record.identifier);
    }
}
