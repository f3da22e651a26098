use std::fmt::Debug;

use super::OrderRequest;

/// Opcode for the dispense instruction, the only instruction the peripheral understands.
pub const OPCODE_DISPENSE: u8 = 10;

/// The fixed-size frame sent to the peripheral: `[opcode, resource code, quantity]`.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct CommandFrame {
    bytes: [u8; 3],
}

impl Debug for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hexdump(&self.bytes))
    }
}

impl CommandFrame {
    /// Encodes a validated order. Total over [`OrderRequest`], since the quantity is already bounded.
    pub fn encode(order: &OrderRequest) -> Self {
        CommandFrame {
            bytes: [OPCODE_DISPENSE, order.resource().code(), order.quantity()],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl From<&OrderRequest> for CommandFrame {
    fn from(order: &OrderRequest) -> Self {
        CommandFrame::encode(order)
    }
}

/// A text message received from the peripheral, currently always a weight in grams.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InboundMessage {
    pub text: String,
}

impl InboundMessage {
    /// Decodes a raw chunk. Never fails: invalid UTF-8 is replaced rather than rejected.
    pub fn decode(bytes: &[u8]) -> Self {
        InboundMessage {
            text: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// The message rendered as a weight reading.
    pub fn as_weight(&self) -> String {
        format!("{} g", self.text)
    }
}

/// Dumps a packet to a readable hex form.
pub fn hexdump(buffer: &[u8]) -> String {
    let maybe_space = |i| if i > 0 && i % 8 == 0 { " " } else { "" };
    let s1: String = buffer
        .iter()
        .enumerate()
        .map(|(i, b)| format!("{}{:02x}", maybe_space(i), b))
        .collect::<String>();
    let s2: String = buffer
        .iter()
        .map(|b| {
            if *b >= 32 && *b < 127 {
                *b as char
            } else {
                '.'
            }
        })
        .collect::<String>();
    format!("|{}| |{}|", s1, s2)
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::protocol::{ResourceType, MAX_QUANTITY, MIN_QUANTITY};
    use rstest::*;

    pub fn from_hex_str(s: &str) -> Vec<u8> {
        hex::decode(s.replace(' ', "")).unwrap()
    }

    #[test]
    fn encode_every_order() {
        for resource in ResourceType::all() {
            for quantity in MIN_QUANTITY..=MAX_QUANTITY {
                let order = OrderRequest::new(resource, quantity as i64).unwrap();
                assert_eq!(
                    [OPCODE_DISPENSE, resource.code(), quantity],
                    CommandFrame::encode(&order).as_bytes()
                );
            }
        }
    }

    #[test]
    fn encode_wire_bytes() {
        let order = OrderRequest::new(ResourceType::Wheat, 75).unwrap();
        assert_eq!(from_hex_str("0a 01 4b"), CommandFrame::from(&order).to_vec());
    }

    #[rstest]
    #[case(b"42", "42")]
    #[case(b"", "")]
    #[case(b"12.5", "12.5")]
    #[case(b"4\xff2", "4\u{fffd}2")]
    #[case(b"\xc3", "\u{fffd}")]
    fn decode_lossy(#[case] bytes: &[u8], #[case] expected: &str) {
        assert_eq!(expected, InboundMessage::decode(bytes).text);
    }

    #[test]
    fn weight_text() {
        assert_eq!("42 g", InboundMessage::decode(b"42").as_weight());
    }

    #[test]
    fn hexdump_frame() {
        assert_eq!("|0a014b| |..K|", hexdump(&[10, 1, 75]));
    }
}
