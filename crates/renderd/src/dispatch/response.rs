//! Response encoding and delivery.

use std::io::Write;

use renderd_config::FramingMode;
use renderd_types::RenderResult;

use crate::transport::write_message;

use super::errors::DispatchError;

/// Encodes `result` as JSON: `success` plus exactly the populated field.
///
/// # Errors
///
/// Returns [`DispatchError::SerializeResponse`] when serialisation fails.
pub fn encode(result: &RenderResult) -> Result<Vec<u8>, DispatchError> {
    serde_json::to_vec(result).map_err(DispatchError::SerializeResponse)
}

/// Writes encoded results to the client in the configured framing.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    writer: W,
    mode: FramingMode,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a writer over `writer`.
    pub const fn new(writer: W, mode: FramingMode) -> Self {
        Self { writer, mode }
    }

    /// Encodes and writes one result as a single framed message.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write_result(&mut self, result: &RenderResult) -> Result<(), DispatchError> {
        let payload = encode(result)?;
        write_message(&mut self.writer, self.mode, &payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    fn written(mode: FramingMode, result: &RenderResult) -> Vec<u8> {
        let mut output = Vec::new();
        ResponseWriter::new(&mut output, mode)
            .write_result(result)
            .expect("write result");
        output
    }

    #[rstest]
    fn success_carries_only_rendered_text() {
        let output = written(FramingMode::ShortRead, &RenderResult::success("Hello World"));
        let value: Value = serde_json::from_slice(&output).expect("json");
        assert_eq!(
            value,
            json!({"success": true, "renderedTemplate": "Hello World"})
        );
    }

    #[rstest]
    fn failure_carries_only_the_message() {
        let output = written(
            FramingMode::ShortRead,
            &RenderResult::failure("Must provide template"),
        );
        let value: Value = serde_json::from_slice(&output).expect("json");
        assert_eq!(
            value,
            json!({"success": false, "message": "Must provide template"})
        );
    }

    #[rstest]
    fn length_prefixed_responses_carry_a_header() {
        let output = written(FramingMode::LengthPrefixed, &RenderResult::success("x"));
        let payload = encode(&RenderResult::success("x")).expect("encode");
        let header = u32::try_from(payload.len()).expect("small payload").to_be_bytes();
        assert_eq!(&output[..4], header.as_slice());
        assert_eq!(&output[4..], payload.as_slice());
    }
}
