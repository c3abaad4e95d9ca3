//! Listing files hand a set of records from `list` to a later `send`.
//!
//! Two layouts are read and written: one JSON record per line, or a single JSON array.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use clap::ValueEnum;
use serde::Deserializer as _;
use serde::de::{IgnoredAny, SeqAccess, Visitor};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::types::ObjectRecord;

const READ_CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ListingFormat {
    #[default]
    Ndjson,
    Json,
}

/// Drains `receiver` into `writer`. Returns the number of records written.
pub async fn write_listing<W>(
    receiver: Receiver<ObjectRecord>,
    writer: &mut W,
    format: ListingFormat,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;

    if format == ListingFormat::Json {
        writer.write_all(b"[").await?;
    }

    while let Ok(record) = receiver.recv().await {
        let line = serde_json::to_string(&record)?;
        match format {
            ListingFormat::Ndjson => {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            ListingFormat::Json => {
                let separator: &[u8] = if written == 0 { b"\n  " } else { b",\n  " };
                writer.write_all(separator).await?;
                writer.write_all(line.as_bytes()).await?;
            }
        }
        written += 1;
    }

    if format == ListingFormat::Json {
        let end: &[u8] = if written == 0 { b"]\n" } else { b"\n]\n" };
        writer.write_all(end).await?;
    }
    writer.flush().await?;

    trace!(records = written, "listing has been written.");

    Ok(written)
}

/// Streams the records of a listing file. The layout is detected from the first
/// non-blank byte. The handle resolves to the number of records sent.
pub fn read_listing(path: &Path) -> (Receiver<ObjectRecord>, JoinHandle<Result<u64>>) {
    let (sender, receiver) = async_channel::bounded(READ_CHANNEL_CAPACITY);
    let path = path.to_path_buf();

    let handle = tokio::task::spawn_blocking(move || read_listing_blocking(&path, &sender));

    (receiver, handle)
}

fn read_listing_blocking(path: &Path, sender: &Sender<ObjectRecord>) -> Result<u64> {
    let file = File::open(path)
        .with_context(|| format!("failed to open listing file: {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let count = match first_non_whitespace(&mut reader)? {
        None => 0,
        Some(b'[') => read_json_array(reader, sender)
            .with_context(|| format!("invalid listing file: {}", path.display()))?,
        Some(_) => read_ndjson(reader, sender)
            .with_context(|| format!("invalid listing file: {}", path.display()))?,
    };

    debug!(
        path = path.display().to_string(),
        records = count,
        "listing file has been read."
    );

    Ok(count)
}

fn first_non_whitespace<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    loop {
        let buffer = reader.fill_buf()?;
        if buffer.is_empty() {
            return Ok(None);
        }

        match buffer.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(position) => {
                let byte = buffer[position];
                reader.consume(position);
                return Ok(Some(byte));
            }
            None => {
                let length = buffer.len();
                reader.consume(length);
            }
        }
    }
}

fn read_ndjson<R: BufRead>(reader: R, sender: &Sender<ObjectRecord>) -> Result<u64> {
    let mut count = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: ObjectRecord = serde_json::from_str(&line)
            .with_context(|| format!("line {}", index + 1))?;
        if sender.send_blocking(record).is_err() {
            break;
        }
        count += 1;
    }

    Ok(count)
}

fn read_json_array<R: io::Read>(reader: R, sender: &Sender<ObjectRecord>) -> Result<u64> {
    let mut count = 0;

    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    (&mut deserializer).deserialize_seq(RecordSender {
        sender,
        count: &mut count,
    })?;
    deserializer.end()?;

    Ok(count)
}

struct RecordSender<'a> {
    sender: &'a Sender<ObjectRecord>,
    count: &'a mut u64,
}

impl<'de> Visitor<'de> for RecordSender<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of object records")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(record) = seq.next_element::<ObjectRecord>()? {
            if self.sender.send_blocking(record).is_err() {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                break;
            }
            *self.count += 1;
        }

        Ok(())
    }
}
