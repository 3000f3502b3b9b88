//! Control messages exchanged between the supervisor and its worker.
//!
//! Messages travel as newline-delimited JSON over the worker's stdio. The
//! worker sends [`ControlMessage::Reset`] and [`ControlMessage::Uptime`]; the
//! supervisor answers uptime queries with [`ControlMessage::UptimeReply`] and
//! forwards operator input as [`ControlMessage::Operator`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
	/// Terminate the current worker and spawn a replacement.
	Reset,
	/// Ask the supervisor for its uptime.
	Uptime,
	/// Supervisor uptime in seconds.
	UptimeReply { seconds: f64 },
	/// A line typed by the operator at the supervisor's terminal.
	Operator { line: String },
}

impl ControlMessage {
	/// Parses one line of the control channel.
	///
	/// Accepts the JSON form as well as the bare `reset` / `uptime` tokens.
	pub fn parse_line(line: &str) -> Option<Self> {
		let line = line.trim();
		match line {
			"" => None,
			"reset" => Some(ControlMessage::Reset),
			"uptime" => Some(ControlMessage::Uptime),
			_ => serde_json::from_str(line).ok(),
		}
	}

	/// Serializes the message as a single channel line (without the newline).
	pub fn to_line(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bare_tokens_parse() {
		assert_eq!(ControlMessage::parse_line("reset\n"), Some(ControlMessage::Reset));
		assert_eq!(ControlMessage::parse_line("  uptime "), Some(ControlMessage::Uptime));
		assert_eq!(ControlMessage::parse_line(""), None);
		assert_eq!(ControlMessage::parse_line("restart please"), None);
	}

	#[test]
	fn json_lines_round_trip() {
		let msg = ControlMessage::UptimeReply { seconds: 12.5 };
		let line = msg.to_line().unwrap();
		assert_eq!(line, r#"{"type":"uptime_reply","seconds":12.5}"#);
		assert_eq!(ControlMessage::parse_line(&line), Some(msg));

		let operator = ControlMessage::Operator { line: "reset".into() };
		assert_eq!(ControlMessage::parse_line(&operator.to_line().unwrap()), Some(operator));
	}
}
