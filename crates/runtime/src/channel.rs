//! Newline-delimited control channel.
//!
//! One [`ControlMessage`] per line, in the JSON form of
//! [`ControlMessage::to_line`]. Readers also accept the bare `reset` and
//! `uptime` tokens and skip lines they cannot parse.

use pair_protocol::ControlMessage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::Result;

/// Writes one message and flushes.
pub async fn write_message<W>(writer: &mut W, message: &ControlMessage) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let line = message.to_line()?;
	writer.write_all(format!("{line}\n").as_bytes()).await?;
	writer.flush().await?;
	Ok(())
}

/// Reads the next message, or `None` at end of stream.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<ControlMessage>>
where
	R: AsyncBufRead + Unpin,
{
	let mut line = String::new();
	loop {
		line.clear();
		if reader.read_line(&mut line).await? == 0 {
			return Ok(None);
		}
		match ControlMessage::parse_line(&line) {
			Some(message) => {
				debug!(target = "pair.supervisor", ?message, "control message");
				return Ok(Some(message));
			}
			None if line.trim().is_empty() => {}
			None => warn!(target = "pair.supervisor", line = %line.trim(), "ignoring unparseable control line"),
		}
	}
}

#[cfg(test)]
mod tests {
	use tokio::io::BufReader;

	use super::*;

	#[tokio::test]
	async fn messages_cross_a_pipe_in_order() {
		let (mut client, server) = tokio::io::duplex(256);
		let mut reader = BufReader::new(server);

		write_message(&mut client, &ControlMessage::Reset).await.unwrap();
		write_message(&mut client, &ControlMessage::UptimeReply { seconds: 1.5 })
			.await
			.unwrap();
		drop(client);

		assert_eq!(read_message(&mut reader).await.unwrap(), Some(ControlMessage::Reset));
		assert_eq!(
			read_message(&mut reader).await.unwrap(),
			Some(ControlMessage::UptimeReply { seconds: 1.5 })
		);
		assert_eq!(read_message(&mut reader).await.unwrap(), None);
	}

	#[tokio::test]
	async fn bare_tokens_and_noise_are_handled() {
		let input: &[u8] = b"\nhello there\nuptime\n{\"type\":\"reset\"}\n";
		let mut reader = BufReader::new(input);

		assert_eq!(read_message(&mut reader).await.unwrap(), Some(ControlMessage::Uptime));
		assert_eq!(read_message(&mut reader).await.unwrap(), Some(ControlMessage::Reset));
		assert_eq!(read_message(&mut reader).await.unwrap(), None);
	}
}
