use crate::error::MalformedPacket;

/// Little-endian writer used by the packet and frame layouts.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// LEB128, at most 5 bytes for a `u32`.
    pub fn varint(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }
}

#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], MalformedPacket> {
        let remaining = self.remaining();
        if remaining < N {
            return Err(MalformedPacket::Truncated {
                needed: N,
                remaining,
            });
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8, MalformedPacket> {
        self.take::<1>().map(|b| b[0])
    }

    pub fn u16(&mut self) -> Result<u16, MalformedPacket> {
        self.take().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, MalformedPacket> {
        self.take().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Result<u64, MalformedPacket> {
        self.take().map(u64::from_le_bytes)
    }

    pub fn i16(&mut self) -> Result<i16, MalformedPacket> {
        self.take().map(i16::from_le_bytes)
    }

    pub fn i32(&mut self) -> Result<i32, MalformedPacket> {
        self.take().map(i32::from_le_bytes)
    }

    pub fn f64(&mut self) -> Result<f64, MalformedPacket> {
        self.take().map(f64::from_le_bytes)
    }

    pub fn varint(&mut self) -> Result<u32, MalformedPacket> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.u8()?;
            let bits = (byte & 0x7f) as u32;
            if i == 4 && bits > 0x0f {
                return Err(MalformedPacket::VarintOverflow);
            }
            value |= bits << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(MalformedPacket::VarintOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_lengths() {
        for (value, len) in [(0u32, 1), (127, 1), (128, 2), (16_383, 2), (16_384, 3), (u32::MAX, 5)] {
            let mut writer = WireWriter::new();
            writer.varint(value);
            assert_eq!(writer.len(), len, "value {value}");

            let bytes = writer.into_bytes();
            let mut reader = WireReader::new(&bytes);
            assert_eq!(reader.varint().unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn varint_overflow_is_malformed() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x7f];
        assert_eq!(
            WireReader::new(&bytes).varint(),
            Err(MalformedPacket::VarintOverflow)
        );
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert_eq!(
            WireReader::new(&bytes).varint(),
            Err(MalformedPacket::VarintOverflow)
        );
    }

    #[test]
    fn little_endian_layout() {
        let mut writer = WireWriter::new();
        writer.u16(0x0102);
        writer.i16(-2);
        writer.u64(1);
        assert_eq!(
            writer.into_bytes(),
            vec![0x02, 0x01, 0xfe, 0xff, 1, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn truncation_reports_sizes() {
        let mut reader = WireReader::new(&[1, 2]);
        assert_eq!(
            reader.u32(),
            Err(MalformedPacket::Truncated {
                needed: 4,
                remaining: 2
            })
        );
    }
}
