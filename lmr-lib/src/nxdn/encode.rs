//! Transmit side frame construction, used to produce test vectors.
use super::frame::{cac_layout, Layout, FACCH1, FACCH2, SACCH};
use super::{sequence_for, Lich, BODY_BITS, FRAME_BITS, FRAME_SYNC, LICH_SEQUENCE, SYNC_BITS};
use crate::bits::{BitBuffer, Field};
use crate::coding::{conv_encode, Derandomizer};
use crate::{Error, Result};

/// Builds a complete 384 bit frame field by field.
///
/// ```
/// use lmr::bits::BitBuffer;
/// use lmr::nxdn::{FrameDecoder, FrameEncoder};
///
/// let frame = FrameEncoder::new(0x01)?
///     .cac(5, &BitBuffer::new(144))?
///     .build()?;
/// let messages = FrameDecoder::default().decode(&frame, None)?;
/// assert_eq!(messages.len(), 1);
/// # Ok::<(), lmr::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    lich: Lich,
    body: BitBuffer,
}

impl FrameEncoder {
    /// # Errors
    /// [Error::UnsupportedClassifier] if `lich` is not a defined LICH value.
    pub fn new(lich: u8) -> Result<Self> {
        let defined =
            Lich::from_value(lich).ok_or(Error::UnsupportedClassifier(u32::from(lich)))?;
        let mut body = BitBuffer::new(BODY_BITS);
        Lich::encode(lich, &mut body)?;
        Ok(FrameEncoder {
            lich: defined,
            body,
        })
    }

    #[must_use]
    pub fn lich(&self) -> &Lich {
        &self.lich
    }

    fn signalling(&mut self, layout: &Layout, offset: usize, data: &BitBuffer) -> Result<()> {
        let table = layout.crc.table();
        if data.len() > table.data_bits() {
            return Err(Error::InvalidLength {
                expected: table.data_bits(),
                actual: data.len(),
            });
        }
        let mut payload = BitBuffer::new(layout.protected.width());
        payload.copy_from(0, data)?;
        layout.crc.encode(&mut payload, layout.protected)?;
        let coded = conv_encode(&payload);
        let tx = layout.puncture.puncture(&coded);
        let interleaved = layout.interleaver.interleave(&tx, 0)?;
        self.body.copy_from(offset, &interleaved)
    }

    /// Header byte (structure and RAN) followed by a layer 3 payload.
    fn with_header(layout: &Layout, structure: u8, ran: u8, layer3: &BitBuffer) -> Result<BitBuffer> {
        let width = layout.layer3.map_or(0, |f| f.width());
        if layer3.len() > width {
            return Err(Error::InvalidLength {
                expected: width,
                actual: layer3.len(),
            });
        }
        let mut data = BitBuffer::new(8 + width);
        data.load(Field::range(0, 2), u64::from(structure))?;
        data.load(Field::range(2, 8), u64::from(ran))?;
        data.copy_from(8, layer3)?;
        Ok(data)
    }

    /// Control channel field, long or short form chosen from the LICH.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `layer3` does not fit.
    pub fn cac(mut self, ran: u8, layer3: &BitBuffer) -> Result<Self> {
        let layout = cac_layout(&self.lich);
        let data = Self::with_header(layout, 0, ran, layer3)?;
        self.signalling(layout, 16, &data)?;
        Ok(self)
    }

    /// SACCH with 18 payload bits.
    ///
    /// # Errors
    /// Structural errors only.
    pub fn sacch(mut self, structure: u8, ran: u8, payload: u32) -> Result<Self> {
        let mut data = BitBuffer::new(26);
        data.load(Field::range(0, 2), u64::from(structure))?;
        data.load(Field::range(2, 8), u64::from(ran))?;
        data.load(Field::range(8, 26), u64::from(payload))?;
        self.signalling(&SACCH, 16, &data)?;
        Ok(self)
    }

    /// FACCH1 in the first or second half of the frame.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `layer3` is over 80 bits.
    pub fn facch1(mut self, second: bool, layer3: &BitBuffer) -> Result<Self> {
        let offset = if second { 220 } else { 76 };
        self.signalling(&FACCH1, offset, layer3)?;
        Ok(self)
    }

    /// FACCH2/UDCH field.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `layer3` is over 176 bits.
    pub fn facch2(mut self, ran: u8, layer3: &BitBuffer) -> Result<Self> {
        let data = Self::with_header(&FACCH2, 0, ran, layer3)?;
        self.signalling(&FACCH2, 16, &data)?;
        Ok(self)
    }

    /// Two 72 bit codec frames in the first or second half of the frame.
    ///
    /// # Errors
    /// [Error::InvalidLength] if a frame is longer than 72 bits.
    pub fn voice(mut self, second: bool, frames: [&BitBuffer; 2]) -> Result<Self> {
        let start = if second { 220 } else { 76 };
        for (i, frame) in frames.iter().enumerate() {
            if frame.len() > 72 {
                return Err(Error::InvalidLength {
                    expected: 72,
                    actual: frame.len(),
                });
            }
            self.body.copy_from(start + 72 * i, frame)?;
        }
        Ok(self)
    }

    /// Scramble and prepend the frame sync.
    ///
    /// # Errors
    /// Structural errors only.
    pub fn build(mut self) -> Result<BitBuffer> {
        sequence_for(&self.lich).derandomize(&mut self.body)?;
        LICH_SEQUENCE.derandomize(&mut self.body)?;
        let mut frame = BitBuffer::new(FRAME_BITS);
        frame.load(Field::range(0, SYNC_BITS), FRAME_SYNC)?;
        frame.copy_from(SYNC_BITS, &self.body)?;
        Ok(frame)
    }
}
