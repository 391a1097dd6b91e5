use std::io::Write;

use indicatif::{ProgressBar, ProgressStyle};

use super::record::StreamRecord;
use crate::error::SinkClosed;

/// Consumer of stream records. An error means the consumer is gone.
pub trait RecordSink {
    fn emit(&mut self, record: &StreamRecord) -> Result<(), SinkClosed>;
}

impl RecordSink for Vec<StreamRecord> {
    fn emit(&mut self, record: &StreamRecord) -> Result<(), SinkClosed> {
        self.push(record.clone());
        Ok(())
    }
}

/// Newline-delimited JSON, flushed per record.
pub struct NdjsonSink<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for NdjsonSink<W> {
    fn emit(&mut self, record: &StreamRecord) -> Result<(), SinkClosed> {
        serde_json::to_writer(&mut self.writer, record).map_err(|e| SinkClosed(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .map_err(|e| SinkClosed(e.to_string()))
    }
}

/// Mirrors stream progress on a terminal progress bar.
pub struct ProgressSink<S: RecordSink> {
    inner: S,
    bar: ProgressBar,
}

impl<S: RecordSink> ProgressSink<S> {
    pub fn new(inner: S) -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { inner, bar }
    }
}

impl<S: RecordSink> RecordSink for ProgressSink<S> {
    fn emit(&mut self, record: &StreamRecord) -> Result<(), SinkClosed> {
        let result = self.inner.emit(record);
        self.bar.set_position(record.progress() as u64);
        let message = match record {
            StreamRecord::ProcessingChunk {
                chunk_index,
                total_chunks,
                ..
            } => format!("chunk {}/{}", chunk_index, total_chunks),
            other => other.status().replace('_', " "),
        };
        if record.is_terminal() || result.is_err() {
            self.bar.finish_with_message(message);
        } else {
            self.bar.set_message(message);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_one_line_per_record() {
        let mut sink = NdjsonSink::new(Vec::new());
        sink.emit(&StreamRecord::Starting { progress: 0 }).unwrap();
        sink.emit(&StreamRecord::LoadingAudio { progress: 5 }).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec![
            r#"{"status":"starting","progress":0}"#,
            r#"{"status":"loading_audio","progress":5}"#,
        ]);
    }

    #[test]
    fn broken_pipe_closes_sink() {
        let mut sink = NdjsonSink::new(BrokenPipe);
        assert!(sink.emit(&StreamRecord::Starting { progress: 0 }).is_err());
    }

    #[test]
    fn progress_sink_forwards_records() {
        let mut sink = ProgressSink::new(Vec::new());
        sink.emit(&StreamRecord::Starting { progress: 0 }).unwrap();
        sink.emit(&StreamRecord::Complete { progress: 100, summary: None }).unwrap();
        assert_eq!(sink.inner.len(), 2);
    }
}
