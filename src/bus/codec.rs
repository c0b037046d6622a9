//! JSON-lines framing for bus traffic over process pipes.
//!
//! One message per line. Lines that are empty, malformed, or carry an
//! unknown `type` are dropped at debug level; the pipe itself stays open.

use super::BusMessage;
use futures::stream::{Stream, StreamExt};
use std::io;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

pub fn encode_line(message: &BusMessage) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line(line: &str) -> Option<BusMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!("Ignoring bus line ({}): {}", e, line);
            None
        }
    }
}

pub async fn write_message<W>(writer: &mut W, message: &BusMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_line(message).map_err(io::Error::other)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Decoded messages from a line-oriented reader. Ends at EOF or on a read error.
pub fn read_messages<R>(reader: R) -> impl Stream<Item = BusMessage> + Send
where
    R: AsyncBufRead + Unpin + Send,
{
    use tokio::io::AsyncBufReadExt;

    LinesStream::new(reader.lines())
        .take_while(|line| {
            let keep = match line {
                Ok(_) => true,
                Err(e) => {
                    debug!("Bus pipe read failed: {}", e);
                    false
                }
            };
            futures::future::ready(keep)
        })
        .filter_map(|line| futures::future::ready(line.ok().and_then(|l| decode_line(&l))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Advice, MarketPulse};
    use alloy::primitives::Address;
    use tokio::io::BufReader;

    #[test]
    fn test_decode_whale_signal() {
        let line = r#"{"type":"WHALE_SIGNAL","chainId":1,"target":"0x1111111111111111111111111111111111111111"}"#;
        assert_eq!(
            decode_line(line),
            Some(BusMessage::WhaleSignal {
                chain_id: 1,
                target: Address::repeat_byte(0x11),
            })
        );
    }

    #[test]
    fn test_decode_market_pulse_with_snake_case_multiplier() {
        let line = r#"{"type":"MARKET_PULSE","data":{"advice":"BUY","confidence":0.7,"margin_multiplier":1.3}}"#;
        match decode_line(line) {
            Some(BusMessage::MarketPulse { data }) => {
                assert_eq!(data.advice, Advice::Buy);
                assert_eq!(data.margin_multiplier, 1.3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_lines_ignored() {
        assert_eq!(decode_line(""), None);
        assert_eq!(decode_line("   "), None);
        assert_eq!(decode_line("not json"), None);
        assert_eq!(decode_line(r#"{"type":"LOG","msg":"hello"}"#), None);
        assert_eq!(decode_line(r#"{"type":"WHALE_SIGNAL","chainId":"x"}"#), None);
    }

    #[tokio::test]
    async fn test_pipe_round_trip_skips_garbage() {
        let pulse = BusMessage::MarketPulse {
            data: MarketPulse::default(),
        };
        let whale = BusMessage::WhaleSignal {
            chain_id: 42161,
            target: Address::repeat_byte(0x42),
        };

        let mut buf: Vec<u8> = Vec::new();
        write_message(&mut buf, &pulse).await.unwrap();
        buf.extend_from_slice(b"garbage line\n\n");
        write_message(&mut buf, &whale).await.unwrap();

        let messages: Vec<BusMessage> = read_messages(BufReader::new(buf.as_slice()))
            .collect()
            .await;
        assert_eq!(messages, vec![pulse, whale]);
    }
}
