
use ieee802154::mac::*;

/// aMaxPHYPacketSize, the largest frame an 802.15.4 PHY will carry
pub const MAX_PAYLOAD_LEN: usize = 127;

/// IEEE 802.15.4 frame with owned storage.
///
/// The transmit queue owns frames of this type; the transmit path borrows
/// them and dropping one releases its buffer.
#[derive(Clone, Debug)]
pub struct Packet {
    pub header: Header,

    pub content: FrameContent,

    payload: [u8; MAX_PAYLOAD_LEN],
    payload_len: usize,
}

impl PartialEq for Packet {
    fn eq(&self, o: &Self) -> bool {
        self.header == o.header && self.content == o.content && self.payload() == o.payload()
    }
}

impl Packet {
    /// Build a data frame bound for `dest`.
    pub fn data(dest: Address, source: Address, seq: u8, data: &[u8], ack: bool) -> Self {
        debug_assert!(data.len() <= MAX_PAYLOAD_LEN);

        let n = data.len().min(MAX_PAYLOAD_LEN);
        let mut payload = [0u8; MAX_PAYLOAD_LEN];
        payload[..n].copy_from_slice(&data[..n]);

        Packet {
            header: Header {
                frame_type: FrameType::Data,
                frame_pending: false,
                security: Security::None,
                ack_request: ack,
                pan_id_compress: false,
                version: FrameVersion::Ieee802154_2006,
                destination: dest,
                source,
                seq,
            },
            content: FrameContent::Data,
            payload,
            payload_len: n,
        }
    }

    /// Serialize into `buf`, returning the encoded length.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut len = 0;

        // Write header
        len += self.header.encode(&mut buf[len..]);

        // Write content
        len += self.content.encode(&mut buf[len..]);

        // Write payload
        buf[len..len + self.payload_len].copy_from_slice(&self.payload[..self.payload_len]);
        len += self.payload_len;

        len
    }

    /// Parse a frame (no trailing footer).
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        // First decode the header
        let (header, header_len) = Header::decode(buf)?;

        // Decode the FrameContent from the body
        let body = &buf[header_len..];
        let (content, used) = FrameContent::decode(body, &header)?;

        // Copy out the payload
        let data = &body[used..];
        let n = data.len().min(MAX_PAYLOAD_LEN);
        let mut payload = [0u8; MAX_PAYLOAD_LEN];
        payload[..n].copy_from_slice(&data[..n]);

        Ok(Packet {
            header,
            content,
            payload,
            payload_len: n,
        })
    }

    /// Frame payload
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn data_frame_round_trip() {
        let p = Packet::data(
            Address::Short(PanId(1), ShortAddress(2)),
            Address::Short(PanId(1), ShortAddress(3)),
            7,
            &[0xaa, 0xbb, 0xcc],
            true,
        );

        let mut buf = [0u8; MAX_PAYLOAD_LEN];
        let n = p.encode(&mut buf);

        let d = Packet::decode(&buf[..n]).unwrap();
        assert_eq!(p, d);
        assert_eq!(d.payload(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(d.header.seq, 7);
    }
}
