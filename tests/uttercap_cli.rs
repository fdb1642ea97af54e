use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn uttercap_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_uttercap").expect("uttercap test binary not built")
}

#[test]
fn uttercap_help_mentions_purpose() {
    let output = Command::new(uttercap_bin())
        .arg("--help")
        .output()
        .expect("run uttercap --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("VAD-gated"));
    assert!(combined.contains("--silence-timeout-ms"));
}

#[test]
fn uttercap_rejects_invalid_chunk_duration() {
    let output = Command::new(uttercap_bin())
        .args(["--chunk-duration-ms", "25"])
        .output()
        .expect("run uttercap with bad chunk duration");
    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("--chunk-duration-ms must be 10, 20, or 30"));
}

#[test]
fn uttercap_list_input_devices_prints_message() {
    let output = Command::new(uttercap_bin())
        .arg("--list-input-devices")
        .output()
        .expect("run uttercap --list-input-devices");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("audio input devices")
            || combined.contains("Failed to list audio input devices")
    );
}
