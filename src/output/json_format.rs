//! JSON output formatting.

use super::ReportContext;
use crate::scanner::ScanResult;
use serde::Serialize;
use std::io::{self, Write};

/// The JSON document: program identity plus the flattened scan result.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub name: &'static str,
    pub version: &'static str,
    pub cmdline: &'a str,
    #[serde(flatten)]
    pub result: &'a ScanResult,
}

impl<'a> JsonReport<'a> {
    pub fn new(result: &'a ScanResult, cmdline: &'a str) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            cmdline,
            result,
        }
    }
}

/// Write the result as pretty-printed JSON.
pub fn write_json<W: Write>(out: &mut W, result: &ScanResult, ctx: &ReportContext) -> io::Result<()> {
    let report = JsonReport::new(result, &ctx.cmdline);
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::sample_result;

    #[test]
    fn test_json_document() {
        let ctx = ReportContext {
            total_ports: 2,
            verbose: true,
            cmdline: "portsweep 10.0.0.0/30 -v".to_string(),
            styled: false,
        };
        let mut out = Vec::new();
        write_json(&mut out, &sample_result(true), &ctx).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["name"], "portsweep");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["cmdline"], "portsweep 10.0.0.0/30 -v");
        assert!(json["elapsed"].is_f64());
        assert_eq!(json["hosts"]["10.0.0.1"].as_array().unwrap().len(), 2);
        assert_eq!(json["hosts"]["10.0.0.2"][0]["status"], -1);
        assert_eq!(json["hosts"]["10.0.0.2"][0]["protocol"], "tcp");
        assert!(json["errors"]["task"].as_array().unwrap().is_empty());
    }
}
