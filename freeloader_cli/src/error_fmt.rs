//! Human-readable error descriptions and structured JSON error formatting.

use freeloader_core::error::{BuildError, FreeloaderError};

/// Stable name for the error class, used in JSON output.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(fe) = err.downcast_ref::<FreeloaderError>() {
        return match fe {
            FreeloaderError::Connection(_) => "Connection",
            FreeloaderError::Communication(_) => "Communication",
            FreeloaderError::Parse(_) => "Parse",
            FreeloaderError::State(_) => "State",
            FreeloaderError::Io(_) => "Io",
            FreeloaderError::Export(_) => "Export",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Config";
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.contains("invalid configuration") || lower.contains("read config") {
        return "Config";
    }
    "Error"
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingRig => {
                "What happened: No rig was given to the acquisition loop.\nLikely causes: Devices were not connected before starting the run.\nHow to fix: Run `freeloader self-check` and start the run again.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in [motion] or [safety], or a bad command-line override.\nHow to fix: Edit the config file or the flags, then rerun."
            ),
        };
    }

    if let Some(fe) = err.downcast_ref::<FreeloaderError>() {
        return match fe {
            FreeloaderError::Connection(msg) => format!(
                "What happened: Could not connect to a device ({msg}).\nLikely causes: Wrong serial port, baud rate or motor id in the config; cable unplugged; port held by another program.\nHow to fix: Check [motor] and [load_cell] in the config and that both devices are powered, then retry."
            ),
            FreeloaderError::Communication(msg) => format!(
                "What happened: A device stopped answering during the run ({msg}).\nLikely causes: Loose cable, power loss on the servo bus, or a read timeout set too low.\nHow to fix: Check cabling and power. Samples recorded before the failure are in the data file."
            ),
            FreeloaderError::State(msg) => format!(
                "What happened: Operation not possible right now ({msg}).\nLikely causes: A device was disconnected or a run was not started.\nHow to fix: Reconnect the rig and try again."
            ),
            FreeloaderError::Io(msg) => format!(
                "What happened: Could not write run output ({msg}).\nLikely causes: Output directory is read-only or the disk is full.\nHow to fix: Pick a writable --output-dir and rerun."
            ),
            FreeloaderError::Export(msg) => format!(
                "What happened: The data file could not be read ({msg}).\nLikely causes: The file was edited by hand or truncated.\nHow to fix: Re-export the run or repair the listed line."
            ),
            FreeloaderError::Parse(msg) => format!(
                "What happened: The load cell sent an unreadable value ({msg:?}).\nLikely causes: Wrong baud rate or electrical noise on the line.\nHow to fix: Check load_cell.baud_rate and the cable shielding."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read ({msg}).\nLikely causes: Wrong --config path.\nHow to fix: Pass --config with the path of your rig TOML."
        );
    }

    if lower.contains("invalid configuration") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Missing [motor] or [load_cell] port, or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error class.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<FreeloaderError>() {
        Some(FreeloaderError::Connection(_)) => 3,
        Some(FreeloaderError::Communication(_)) => 4,
        Some(FreeloaderError::State(_)) => 5,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let cases = [
            (FreeloaderError::Connection("COM3".into()), 3),
            (FreeloaderError::Communication("read weight".into()), 4),
            (FreeloaderError::State("run not begun".into()), 5),
            (FreeloaderError::Io("disk full".into()), 1),
        ];
        for (e, code) in cases {
            assert_eq!(exit_code_for_error(&eyre::Report::new(e)), code);
        }
        assert_eq!(exit_code_for_error(&eyre::eyre!("other")), 1);
    }

    #[test]
    fn json_error_names_the_class() {
        let e = eyre::Report::new(FreeloaderError::Connection("COM9: no such port".into()));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Connection");
        assert_eq!(v["exit_code"], 3);
        assert!(v["message"].as_str().unwrap().contains("COM9"));
    }

    #[test]
    fn config_errors_get_config_advice() {
        let e = eyre::eyre!("invalid configuration: missing field `load_cell`");
        assert!(humanize(&e).contains("[motor] or [load_cell]"));
        assert_eq!(reason_name(&e), "Config");
    }
}
