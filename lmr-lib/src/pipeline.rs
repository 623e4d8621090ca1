//! Per channel decode pipelines.
//!
//! A [ChannelPipeline] owns everything that carries over from one frame to the next on a
//! single radio channel, so frames of one channel must go through one pipeline in arrival
//! order. Independent channels can be decoded in parallel with [decode_channels].
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver};
use rayon::prelude::*;
use tracing::{debug, span, warn, Level};
use typed_builder::TypedBuilder;

use crate::bits::BitBuffer;
use crate::dmr::{BurstDecoder, BurstKind};
use crate::fec::Integrity;
use crate::message::{Decoded, Message};
use crate::nxdn::{ChannelHint, FrameDecoder};
use crate::p25::{self, DataUnit};
use crate::Result;

/// Air interface of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Protocol {
    Nxdn,
    Dmr,
    P25Tsbk,
    #[cfg_attr(feature = "serde", serde(rename = "p25-hdu"))]
    P25Header,
}

/// Out of band classification supplied with a frame, used only when the frame's own
/// classifier cannot be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FrameHint {
    Nxdn(ChannelHint),
    Dmr(BurstKind),
}

/// One synchronized frame as delivered by the demodulator.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    pub bits: BitBuffer,
    /// Milliseconds, monotonically increasing per channel.
    pub timestamp: u64,
    pub hint: Option<FrameHint>,
}

impl RawFrame {
    #[must_use]
    pub fn new(bits: BitBuffer, timestamp: u64) -> Self {
        RawFrame {
            bits,
            timestamp,
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: FrameHint) -> Self {
        self.hint = Some(hint);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Name attached to every message from this channel.
    #[builder(default = String::from("channel"), setter(into))]
    pub channel: String,
    #[builder(default = Protocol::Nxdn)]
    pub protocol: Protocol,
    /// Used for frames that arrive without a hint of their own.
    #[builder(default, setter(strip_option))]
    pub hint: Option<FrameHint>,
    /// Forward voice payloads even when the signalling carried with them fails its
    /// checksum.
    #[builder(default = true)]
    pub forward_voice_on_failure: bool,
    /// Decoded messages allowed in flight between a [ChannelPipeline::stream] thread and
    /// its consumer.
    #[builder(default = 1024)]
    pub buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig::builder().build()
    }
}

/// Counts of what a pipeline has produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Stats {
    pub frames: u64,
    /// Frames rejected outright, e.g., for having the wrong length.
    pub rejected: u64,
    pub messages: u64,
    pub passed: u64,
    pub corrected: u64,
    pub failed: u64,
}

impl Stats {
    fn count(&mut self, integrity: Integrity) {
        self.messages += 1;
        match integrity {
            Integrity::Passed => self.passed += 1,
            Integrity::Corrected => self.corrected += 1,
            Integrity::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone)]
enum ProtocolDecoder {
    Nxdn(FrameDecoder),
    Dmr(BurstDecoder),
    P25(DataUnit),
}

#[derive(Debug, Clone)]
pub struct ChannelPipeline {
    config: PipelineConfig,
    decoder: ProtocolDecoder,
    stats: Stats,
}

impl ChannelPipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let decoder = match config.protocol {
            Protocol::Nxdn => {
                ProtocolDecoder::Nxdn(FrameDecoder::new(config.forward_voice_on_failure))
            }
            Protocol::Dmr => ProtocolDecoder::Dmr(BurstDecoder::new()),
            Protocol::P25Tsbk => ProtocolDecoder::P25(DataUnit::Tsbk),
            Protocol::P25Header => ProtocolDecoder::P25(DataUnit::Header),
        };
        ChannelPipeline {
            config,
            decoder,
            stats: Stats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    fn decode_frame(&mut self, frame: &RawFrame) -> Result<Vec<Decoded>> {
        let hint = frame.hint.or(self.config.hint);
        match &mut self.decoder {
            ProtocolDecoder::Nxdn(decoder) => {
                let hint = match hint {
                    Some(FrameHint::Nxdn(hint)) => Some(hint),
                    _ => None,
                };
                decoder.decode(&frame.bits, hint)
            }
            ProtocolDecoder::Dmr(decoder) => {
                let hint = match hint {
                    Some(FrameHint::Dmr(kind)) => Some(kind),
                    _ => None,
                };
                decoder.decode(&frame.bits, hint)
            }
            ProtocolDecoder::P25(unit) => Ok(vec![p25::decode(*unit, &frame.bits)?]),
        }
    }

    /// Decode one frame, handing each message to `sink` in order.
    ///
    /// # Errors
    /// A fatal problem with this frame, e.g., the wrong length. The pipeline stays usable
    /// for the next frame.
    pub fn process<F>(&mut self, frame: &RawFrame, sink: &mut F) -> Result<()>
    where
        F: FnMut(Message),
    {
        let span = span!(
            Level::DEBUG,
            "frame",
            channel = %self.config.channel,
            timestamp = frame.timestamp
        );
        let _guard = span.enter();

        self.stats.frames += 1;
        let decoded = match self.decode_frame(frame) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.stats.rejected += 1;
                debug!(%err, "frame rejected");
                return Err(err);
            }
        };
        for d in decoded {
            self.stats.count(d.integrity);
            sink(Message::new(frame.timestamp, self.config.channel.as_str(), d));
        }
        Ok(())
    }

    /// [ChannelPipeline::process] collecting the messages.
    ///
    /// # Errors
    /// See [ChannelPipeline::process].
    pub fn decode(&mut self, frame: &RawFrame) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        self.process(frame, &mut |msg| out.push(msg))?;
        Ok(out)
    }

    /// Forget all state carried between frames.
    pub fn reset(&mut self) {
        match &mut self.decoder {
            ProtocolDecoder::Nxdn(decoder) => decoder.reset(),
            ProtocolDecoder::Dmr(decoder) => decoder.reset(),
            ProtocolDecoder::P25(_) => {}
        }
    }

    /// Decode `frames` on a background thread.
    ///
    /// Messages, and errors for rejected frames, are available from the returned iterator
    /// in frame order. Dropping the iterator stops the thread after its current frame.
    ///
    /// # Errors
    /// [crate::Error::Io] if the thread could not be started.
    pub fn stream<I>(mut self, frames: I) -> Result<MessageStream>
    where
        I: IntoIterator<Item = RawFrame>,
        I::IntoIter: Send + 'static,
    {
        let frames = frames.into_iter();
        let (tx, rx) = bounded(self.config.buffer_size.max(1));
        let name = format!("lmr::{}", self.config.channel);

        let handle = thread::Builder::new().name(name).spawn(move || {
            for frame in frames {
                let mut sent = Vec::new();
                let result = self.process(&frame, &mut |msg| sent.push(Ok(msg)));
                if let Err(err) = result {
                    sent.push(Err(err));
                }
                for item in sent {
                    if tx.send(item).is_err() {
                        debug!("message stream consumer went away");
                        return self.stats;
                    }
                }
            }
            self.stats
        })?;

        Ok(MessageStream {
            messages: rx,
            handle: Some(handle),
        })
    }
}

/// Messages produced by [ChannelPipeline::stream].
pub struct MessageStream {
    messages: Receiver<Result<Message>>,
    handle: Option<JoinHandle<Stats>>,
}

impl MessageStream {
    /// Wait for the decode thread and return its counts. Undelivered messages are
    /// discarded.
    #[must_use]
    pub fn finish(mut self) -> Stats {
        // drain so a blocked sender can finish
        while self.messages.recv().is_ok() {}
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                warn!("decode thread panicked");
                Stats::default()
            }
            None => Stats::default(),
        }
    }
}

impl Iterator for MessageStream {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.messages.recv().ok()
    }
}

/// Decode independent channels in parallel, one rayon task per channel.
///
/// Returns, for each channel in input order, its messages in frame order. Rejected frames
/// are logged and skipped.
#[must_use]
pub fn decode_channels(channels: Vec<(ChannelPipeline, Vec<RawFrame>)>) -> Vec<Vec<Message>> {
    channels
        .into_par_iter()
        .map(|(mut pipeline, frames)| {
            let mut out = Vec::new();
            for frame in &frames {
                let result = pipeline.process(frame, &mut |msg| out.push(msg));
                if let Err(err) = result {
                    warn!(channel = %pipeline.config.channel, %err, "skipping frame");
                }
            }
            out
        })
        .collect()
}
