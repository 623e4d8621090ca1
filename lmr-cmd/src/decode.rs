use std::fs::File;
use std::io::{stdin, stdout, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lmr::bits::BitBuffer;
use lmr::pipeline::{ChannelPipeline, PipelineConfig, Protocol, RawFrame};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub enum ProtocolArg {
    Nxdn,
    Dmr,
    P25Tsbk,
    P25Hdu,
}

impl clap::ValueEnum for ProtocolArg {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Nxdn, Self::Dmr, Self::P25Tsbk, Self::P25Hdu]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Nxdn => Some(clap::builder::PossibleValue::new("nxdn")),
            Self::Dmr => Some(clap::builder::PossibleValue::new("dmr")),
            Self::P25Tsbk => Some(clap::builder::PossibleValue::new("p25-tsbk")),
            Self::P25Hdu => Some(clap::builder::PossibleValue::new("p25-hdu")),
        }
    }
}

impl From<ProtocolArg> for Protocol {
    fn from(value: ProtocolArg) -> Self {
        match value {
            ProtocolArg::Nxdn => Protocol::Nxdn,
            ProtocolArg::Dmr => Protocol::Dmr,
            ProtocolArg::P25Tsbk => Protocol::P25Tsbk,
            ProtocolArg::P25Hdu => Protocol::P25Header,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Format {
    Bits,
    Hex,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Bits, Self::Hex]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Bits => Some(clap::builder::PossibleValue::new("bits")),
            Self::Hex => Some(clap::builder::PossibleValue::new("hex")),
        }
    }
}

pub fn load_config(
    path: Option<&PathBuf>,
    protocol: Option<ProtocolArg>,
    channel: Option<String>,
) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening config {path:?}"))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing config {path:?}"))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(protocol) = protocol {
        config.protocol = protocol.into();
    }
    if let Some(channel) = channel {
        config.channel = channel;
    }
    Ok(config)
}

/// Split a line into its optional `time:` prefix and frame text.
fn parse_line(line: &str, number: u64) -> (u64, &str) {
    match line.split_once(':') {
        Some((time, rest)) => match time.trim().parse::<u64>() {
            Ok(time) => (time, rest.trim()),
            Err(_) => (number, line),
        },
        None => (number, line),
    }
}

fn parse_frame(text: &str, format: &Format) -> lmr::Result<BitBuffer> {
    match format {
        Format::Bits => text.parse(),
        Format::Hex => BitBuffer::from_hex(text),
    }
}

fn reader(input: &Path) -> Result<Box<dyn BufRead>> {
    if input == Path::new("-") {
        return Ok(Box::new(BufReader::new(stdin())));
    }
    let file = File::open(input).with_context(|| format!("opening input {input:?}"))?;
    Ok(Box::new(BufReader::new(file)))
}

pub fn decode(
    input: &Path,
    format: &Format,
    config: PipelineConfig,
    valid_only: bool,
) -> Result<()> {
    info!(
        channel = %config.channel,
        protocol = ?config.protocol,
        "decoding {input:?}"
    );
    let mut pipeline = ChannelPipeline::new(config);
    let mut out = stdout().lock();
    let mut unparsed = 0u64;

    for (idx, line) in reader(input)?.lines().enumerate() {
        let line = line.context("reading input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = idx as u64 + 1;
        let (timestamp, text) = parse_line(line, number);
        let bits = match parse_frame(text, format) {
            Ok(bits) => bits,
            Err(err) => {
                warn!(line = number, %err, "skipping unparseable frame");
                unparsed += 1;
                continue;
            }
        };

        let mut write_err = None;
        let result = pipeline.process(&RawFrame::new(bits, timestamp), &mut |msg| {
            if write_err.is_some() || (valid_only && !msg.is_valid()) {
                return;
            }
            let written = serde_json::to_writer(&mut out, &msg)
                .map_err(anyhow::Error::from)
                .and_then(|()| writeln!(out).map_err(anyhow::Error::from));
            if let Err(err) = written {
                write_err = Some(err);
            }
        });
        if let Some(err) = write_err {
            return Err(err.context("writing message"));
        }
        if let Err(err) = result {
            warn!(line = number, %err, "frame rejected");
        }
    }
    out.flush()?;

    let stats = pipeline.stats();
    info!(
        frames = stats.frames,
        rejected = stats.rejected,
        unparsed,
        messages = stats.messages,
        passed = stats.passed,
        corrected = stats.corrected,
        failed = stats.failed,
        "done"
    );
    Ok(())
}
